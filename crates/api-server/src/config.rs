use anyhow::{bail, Context, Result};
use confidence_scorer::{ConfidenceWeights, ScorerConfig};
use risk_manager::RiskParameters;
use rust_decimal::Decimal;
use signal_core::SourceRole;
use signal_orchestrator::{ChangeDetectorConfig, OrchestratorConfig};
use std::net::SocketAddr;
use std::str::FromStr;

/// One upstream feed from `DATA_SOURCES`, written `name=role@url`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub name: String,
    pub role: SourceRole,
    pub url: String,
}

impl FromStr for SourceSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, rest) = s
            .split_once('=')
            .with_context(|| format!("data source '{}' is not name=role@url", s))?;
        let (role, url) = rest
            .split_once('@')
            .with_context(|| format!("data source '{}' is not name=role@url", s))?;

        let name = name.trim();
        let url = url.trim();
        if name.is_empty() || url.is_empty() {
            bail!("data source '{}' has an empty name or url", s);
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("data source '{}' url must be http(s)", name);
        }

        Ok(Self {
            name: name.to_string(),
            role: role
                .parse()
                .with_context(|| format!("data source '{}' has an unknown role", name))?,
            url: url.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// `None` keeps decisions in memory
    pub database_url: Option<String>,
    pub sources: Vec<SourceSpec>,
    pub risk: RiskParameters,
    pub scorer: ScorerConfig,
    pub change_detector: ChangeDetectorConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: None,
            sources: Vec::new(),
            risk: RiskParameters::default(),
            scorer: ScorerConfig::default(),
            change_detector: ChangeDetectorConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unset or blank keys keep the
    /// defaults; set keys must parse and pass validation.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(addr) = var("BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("BIND_ADDR '{}' is not host:port", addr))?;
        }
        config.database_url = var("DATABASE_URL");

        if let Some(list) = var("DATA_SOURCES") {
            config.sources = list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(SourceSpec::from_str)
                .collect::<Result<_>>()?;
        }

        if let Some(balance) = var("ACCOUNT_BALANCE") {
            let balance = Decimal::from_str(&balance).context("ACCOUNT_BALANCE must be a number")?;
            if balance <= Decimal::ZERO {
                bail!("ACCOUNT_BALANCE must be positive, got {}", balance);
            }
            config.orchestrator.default_account_balance = balance;
        }
        if let Some(fraction) = var("MAX_RISK_FRACTION") {
            config.risk.max_risk_fraction =
                Decimal::from_str(&fraction).context("MAX_RISK_FRACTION must be a number")?;
        }
        if let Some(multiplier) = var("ATR_MULTIPLIER") {
            config.risk.atr_multiplier =
                Decimal::from_str(&multiplier).context("ATR_MULTIPLIER must be a number")?;
        }
        config.risk.validate().context("invalid risk parameters")?;

        if let Some(weights) = var("CONFIDENCE_WEIGHTS") {
            config.scorer.weights = parse_weights(&weights)?;
        }
        config.scorer.validate().context("invalid confidence settings")?;

        if let Some(secs) = var("FETCH_TIMEOUT_SECS") {
            config.orchestrator.fetch_timeout_secs =
                secs.parse().context("FETCH_TIMEOUT_SECS must be a whole number")?;
        }
        if let Some(secs) = var("PERSISTENCE_TIMEOUT_SECS") {
            config.orchestrator.persistence_timeout_secs =
                secs.parse().context("PERSISTENCE_TIMEOUT_SECS must be a whole number")?;
        }
        if config.orchestrator.fetch_timeout_secs == 0
            || config.orchestrator.persistence_timeout_secs == 0
        {
            bail!("timeouts must be at least one second");
        }
        if let Some(limit) = var("MAX_SETTLED_SIGNALS") {
            config.orchestrator.max_settled_signals =
                limit.parse().context("MAX_SETTLED_SIGNALS must be a whole number")?;
        }

        if let Some(pct) = var("PRICE_CHANGE_THRESHOLD_PCT") {
            let pct: f64 = pct.parse().context("PRICE_CHANGE_THRESHOLD_PCT must be a number")?;
            if !pct.is_finite() || pct <= 0.0 {
                bail!("PRICE_CHANGE_THRESHOLD_PCT must be positive, got {}", pct);
            }
            config.change_detector.price_threshold_pct = pct;
        }

        Ok(config)
    }
}

/// `technical,sentiment,on_chain,risk`
fn parse_weights(raw: &str) -> Result<ConfidenceWeights> {
    let values: Vec<f64> = raw
        .split(',')
        .map(|w| w.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("CONFIDENCE_WEIGHTS '{}' must be numbers", raw))?;

    match values.as_slice() {
        [technical, sentiment, on_chain, risk] => {
            ConfidenceWeights::new(*technical, *sentiment, *on_chain, *risk)
                .context("invalid CONFIDENCE_WEIGHTS")
        }
        _ => bail!(
            "CONFIDENCE_WEIGHTS needs 4 values (technical,sentiment,on_chain,risk), got {}",
            values.len()
        ),
    }
}
