use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use signal_core::{MarketDataSource, SourceError, SourceRole, SymbolKey};
use std::time::Duration;

use crate::config::SourceSpec;

/// A feed served over HTTP: `GET {url}?symbol=..&timeframe=..` returning a
/// JSON object fragment.
#[derive(Clone)]
pub struct HttpMarketDataSource {
    name: String,
    role: SourceRole,
    url: String,
    client: Client,
}

impl HttpMarketDataSource {
    pub fn new(
        name: impl Into<String>,
        role: SourceRole,
        url: impl Into<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            name: name.into(),
            role,
            url: url.into(),
            client,
        })
    }

    pub fn from_spec(spec: &SourceSpec, timeout: Duration) -> reqwest::Result<Self> {
        Self::new(spec.name.clone(), spec.role, spec.url.clone(), timeout)
    }
}

#[async_trait]
impl MarketDataSource for HttpMarketDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> SourceRole {
        self.role
    }

    async fn fetch(&self, key: &SymbolKey) -> Result<Value, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("symbol", key.symbol.as_str()), ("timeframe", key.timeframe.as_str())])
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            let message = format!("HTTP {}: {}", status, snippet);
            return Err(match status {
                StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::BAD_GATEWAY
                | StatusCode::GATEWAY_TIMEOUT => SourceError::Unavailable(message),
                _ => SourceError::Api(message),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SourceError::InvalidData(e.to_string()))?;
        tracing::debug!("{} answered for {}", self.name, key);
        Ok(body)
    }
}
