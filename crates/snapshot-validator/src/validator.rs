//! Market Snapshot Validator
//!
//! Gate in front of the whole pipeline. Price and liveness must be real;
//! every secondary field degrades to an explicit placeholder instead.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use signal_core::{
    BollingerBands, DataQuality, MarketSnapshot, OnChainMetrics, PriceZone, RiskMetrics,
    SentimentMetrics, SourceFailure, SourceReport, SymbolKey, TechnicalIndicators,
    ValidationError,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::normalizer;

#[derive(Debug, Clone, Default)]
pub struct MarketSnapshotValidator;

impl MarketSnapshotValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a raw provider payload for `key`.
    ///
    /// Fails with `MissingPriceData` when neither `currentPrice` nor
    /// `marketData.price` holds a number, and with `NotLiveData` unless
    /// `isLiveData` is literally `true`. Nothing is constructed on failure.
    pub fn validate(
        &self,
        key: &SymbolKey,
        raw: &Value,
    ) -> Result<MarketSnapshot, ValidationError> {
        let price = match extract_price(raw) {
            Ok(price) => price,
            Err(e) => {
                warn!("Rejecting payload for {}: {}", key, e);
                return Err(e);
            }
        };

        if raw.get("isLiveData").and_then(Value::as_bool) != Some(true) {
            warn!("Rejecting payload for {}: {}", key, ValidationError::NotLiveData);
            return Err(ValidationError::NotLiveData);
        }

        let market = raw.get("marketData");
        let enhanced = raw.get("enhancedMarketData");

        let technical_raw = section(raw.get("technicalIndicators"));
        let sentiment_raw = section(raw.get("marketSentiment"));
        let on_chain_raw = section(
            enhanced
                .and_then(|e| e.get("onChain").or_else(|| e.get("onChainData")))
                .or_else(|| raw.get("onChainData")),
        );
        let risk_raw = section(
            enhanced
                .and_then(|e| e.get("risk").or_else(|| e.get("riskMetrics")))
                .or_else(|| raw.get("riskMetrics")),
        );

        let mut technical = technical_indicators(technical_raw);
        if technical.atr.is_none() {
            technical.atr = normalizer::number(enhanced.and_then(|e| e.get("atr")))
                .filter(|v| *v > 0.0);
        }
        // An ATR at or above the price itself is not a usable stop distance
        technical.atr = technical.atr.filter(|atr| *atr < price);

        let presence = Presence {
            technical: technical_raw.is_some(),
            sentiment: sentiment_raw.is_some(),
            on_chain: on_chain_raw.is_some(),
            risk: risk_raw.is_some(),
        };

        let snapshot = MarketSnapshot {
            symbol: key.symbol.clone(),
            timeframe: key.timeframe,
            price,
            is_live: true,
            price_change_24h: normalizer::number(
                market
                    .and_then(|m| m.get("change24h").or_else(|| m.get("priceChange24h")))
                    .or_else(|| raw.get("priceChange24h")),
            ),
            volume_24h: normalizer::number(
                market.and_then(|m| m.get("volume24h").or_else(|| m.get("volume"))),
            ),
            technical,
            sentiment: sentiment_metrics(sentiment_raw),
            on_chain: on_chain_metrics(on_chain_raw),
            risk: risk_metrics(risk_raw),
            data_quality: data_quality(raw.get("dataQuality"), &presence),
            predictions: raw.get("predictions").filter(|v| !v.is_null()).cloned(),
            news_context: raw
                .get("newsContext")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            last_updated: timestamp(raw.get("lastUpdated"))
                .or_else(|| timestamp(raw.get("timestamp"))),
            validated_at: Utc::now(),
        };

        debug!(
            "Validated snapshot for {} at {} (quality {:.0}%, defaulted: {:?})",
            key,
            snapshot.price,
            snapshot.data_quality.overall,
            snapshot.defaulted_fields()
        );

        Ok(snapshot)
    }
}

fn extract_price(raw: &Value) -> Result<f64, ValidationError> {
    let candidate = raw
        .get("currentPrice")
        .filter(|v| !v.is_null())
        .or_else(|| raw.get("marketData").and_then(|m| m.get("price")).filter(|v| !v.is_null()));

    let price = normalizer::number(candidate).ok_or(ValidationError::MissingPriceData)?;
    if price <= 0.0 {
        return Err(ValidationError::NonPositivePrice(price));
    }
    Ok(price)
}

/// A section counts as present only when it is a non-empty object.
fn section(raw: Option<&Value>) -> Option<&Map<String, Value>> {
    raw.and_then(Value::as_object).filter(|m| !m.is_empty())
}

fn field<'a>(obj: Option<&'a Map<String, Value>>, names: &[&str]) -> Option<&'a Value> {
    let obj = obj?;
    names
        .iter()
        .filter_map(|name| obj.get(*name))
        .find(|v| !v.is_null())
}

fn technical_indicators(raw: Option<&Map<String, Value>>) -> TechnicalIndicators {
    let Some(obj) = raw else {
        return TechnicalIndicators::default();
    };
    let raw = Some(obj);

    let bands = field(raw, &["bollingerBands", "bollinger"]).and_then(Value::as_object);
    let levels = field(raw, &["supportResistance", "keyLevels"]).and_then(Value::as_object);

    TechnicalIndicators {
        rsi: normalizer::rsi_reading(field(raw, &["rsi", "RSI"])),
        macd: normalizer::macd_reading(field(raw, &["macd", "MACD"])),
        bollinger: BollingerBands {
            upper: positive(field(bands, &["upper"])),
            middle: positive(field(bands, &["middle", "basis"])),
            lower: positive(field(bands, &["lower"])),
        },
        support: positive(field(raw, &["support"]).or_else(|| field(levels, &["support"]))),
        resistance: positive(
            field(raw, &["resistance"]).or_else(|| field(levels, &["resistance"])),
        ),
        supply_zones: zones(field(raw, &["supplyZones"])),
        demand_zones: zones(field(raw, &["demandZones"])),
        atr: positive(field(raw, &["atr", "ATR"])),
        trend: normalizer::label(field(raw, &["trend", "overallTrend"])),
        score: normalizer::score(field(raw, &["score", "technicalScore", "overallScore"])),
    }
}

fn positive(raw: Option<&Value>) -> Option<f64> {
    normalizer::number(raw).filter(|v| *v > 0.0)
}

fn zones(raw: Option<&Value>) -> Vec<PriceZone> {
    let Some(items) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let (low, high) = match item {
                Value::Object(o) => (
                    normalizer::number(o.get("low").or_else(|| o.get("min"))),
                    normalizer::number(o.get("high").or_else(|| o.get("max"))),
                ),
                Value::Array(pair) if pair.len() == 2 => (
                    normalizer::number(pair.first()),
                    normalizer::number(pair.get(1)),
                ),
                _ => (None, None),
            };
            let (low, high) = (low?, high?);
            Some(PriceZone {
                low: low.min(high),
                high: low.max(high),
            })
        })
        .collect()
}

fn breakdown(raw: Option<&Value>) -> BTreeMap<String, f64> {
    raw.and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| normalizer::number(Some(v)).map(|n| (k.clone(), n)))
                .collect()
        })
        .unwrap_or_default()
}

fn sentiment_metrics(raw: Option<&Map<String, Value>>) -> SentimentMetrics {
    if raw.is_none() {
        return SentimentMetrics::default();
    }

    SentimentMetrics {
        score: normalizer::score(field(
            raw,
            &["score", "overallScore", "sentimentScore", "overall"],
        )),
        fear_greed_index: normalizer::score(field(raw, &["fearGreedIndex", "fearAndGreed"])),
        label: normalizer::label(field(raw, &["label", "sentiment", "overall", "signal"])),
        breakdown: breakdown(field(raw, &["breakdown", "sources"])),
    }
}

fn on_chain_metrics(raw: Option<&Map<String, Value>>) -> OnChainMetrics {
    if raw.is_none() {
        return OnChainMetrics::default();
    }

    OnChainMetrics {
        score: normalizer::score(field(raw, &["score", "onChainScore", "overallScore"])),
        exchange_net_flow: normalizer::number(field(raw, &["exchangeNetFlow", "netFlow"])),
        whale_activity: normalizer::number(field(raw, &["whaleActivity"])),
        active_addresses: normalizer::number(field(raw, &["activeAddresses"])),
        label: normalizer::label(field(raw, &["label", "signal", "trend"])),
        breakdown: breakdown(field(raw, &["breakdown"])),
    }
}

fn risk_metrics(raw: Option<&Map<String, Value>>) -> RiskMetrics {
    if raw.is_none() {
        return RiskMetrics::default();
    }

    RiskMetrics {
        score: normalizer::score(field(raw, &["score", "riskScore"])),
        volatility_pct: positive(field(raw, &["volatility", "volatilityPct"]))
            .filter(|v| *v <= 100.0),
        max_drawdown_pct: normalizer::number(field(raw, &["maxDrawdown", "maxDrawdownPct"])),
        level: field(raw, &["level", "riskLevel"])
            .and_then(Value::as_str)
            .map(|s| s.trim().to_uppercase()),
    }
}

struct Presence {
    technical: bool,
    sentiment: bool,
    on_chain: bool,
    risk: bool,
}

fn percent(present: bool) -> f64 {
    if present {
        100.0
    } else {
        0.0
    }
}

/// Availability flag as a percentage; accepts booleans or 0-100 numbers.
fn availability(raw: Option<&Value>) -> Option<f64> {
    match raw? {
        Value::Bool(b) => Some(percent(*b)),
        other => normalizer::number(Some(other)).map(|v| v.clamp(0.0, 100.0)),
    }
}

fn data_quality(raw: Option<&Value>, presence: &Presence) -> DataQuality {
    let reported = raw.and_then(Value::as_object);
    let get = |name: &str| availability(reported.and_then(|o| o.get(name)));

    let market = get("market").unwrap_or(100.0);
    let technical = get("technical").unwrap_or_else(|| percent(presence.technical));
    let sentiment = get("sentiment").unwrap_or_else(|| percent(presence.sentiment));
    let on_chain = get("onChain").unwrap_or_else(|| percent(presence.on_chain));
    let risk = get("risk").unwrap_or_else(|| percent(presence.risk));
    let overall = get("overall")
        .unwrap_or_else(|| (market + technical + sentiment + on_chain + risk) / 5.0);

    DataQuality {
        overall,
        market,
        technical,
        sentiment,
        on_chain,
        risk,
        sources: source_report(reported.and_then(|o| o.get("sources"))),
    }
}

fn source_report(raw: Option<&Value>) -> SourceReport {
    let Some(obj) = raw.and_then(Value::as_object) else {
        return SourceReport::default();
    };

    let successful = obj
        .get("successful")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let failed = obj
        .get("failed")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(name) => Some(SourceFailure {
                        source: name.clone(),
                        reason: "unknown".to_string(),
                    }),
                    Value::Object(o) => Some(SourceFailure {
                        source: o.get("source")?.as_str()?.to_string(),
                        reason: o
                            .get("reason")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                            .to_string(),
                    }),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    SourceReport { successful, failed }
}

fn timestamp(raw: Option<&Value>) -> Option<DateTime<Utc>> {
    match raw? {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}
