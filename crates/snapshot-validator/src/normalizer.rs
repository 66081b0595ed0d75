//! Indicator Normalizer
//!
//! Upstream feeds deliver the same indicator in several shapes: a bare
//! number, a numeric string, or an object carrying a (often string-encoded)
//! value next to a signal label. Every shape is parsed into `IndicatorValue`
//! first and then reduced to one canonical number, so the "parse, then
//! default" rule lives in exactly one place.

use serde::Deserialize;
use serde_json::Value;
use signal_core::{MacdReading, Provenance, Reading, SignalLabel};

/// RSI placeholder. 0 would read as deeply oversold.
pub const NEUTRAL_RSI: f64 = 50.0;

const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;

/// A scalar as it may arrive: JSON number or numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => finite(*n),
            Scalar::Text(s) => parse_numeric_str(s),
        }
    }
}

/// The shapes an indicator field takes upstream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IndicatorValue {
    Number(f64),
    Text(String),
    Labeled {
        #[serde(default)]
        value: Option<Scalar>,
        #[serde(default, alias = "label", alias = "trend")]
        signal: Option<String>,
    },
}

impl IndicatorValue {
    /// Parses any JSON value into one of the known shapes. `null`, arrays and
    /// booleans are not indicator shapes.
    pub fn parse(raw: &Value) -> Option<Self> {
        match raw {
            Value::Number(_) | Value::String(_) | Value::Object(_) => {
                serde_json::from_value(raw.clone()).ok()
            }
            _ => None,
        }
    }

    pub fn numeric(&self) -> Option<f64> {
        match self {
            IndicatorValue::Number(n) => finite(*n),
            IndicatorValue::Text(s) => parse_numeric_str(s),
            IndicatorValue::Labeled { value, .. } => value.as_ref().and_then(Scalar::to_f64),
        }
    }

    pub fn label(&self) -> Option<SignalLabel> {
        match self {
            IndicatorValue::Number(_) => None,
            IndicatorValue::Text(s) => parse_label(s),
            IndicatorValue::Labeled { signal, .. } => signal.as_deref().and_then(parse_label),
        }
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn parse_numeric_str(s: &str) -> Option<f64> {
    let cleaned = s.trim().trim_end_matches('%').replace(',', "");
    cleaned.parse::<f64>().ok().and_then(finite)
}

/// Maps the vocabulary used by the feeds onto `SignalLabel`.
pub fn parse_label(s: &str) -> Option<SignalLabel> {
    let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
    match normalized.as_str() {
        "bullish" | "buy" | "strong_buy" | "positive" | "up" | "uptrend" | "greed"
        | "extreme_greed" => Some(SignalLabel::Bullish),
        "bearish" | "sell" | "strong_sell" | "negative" | "down" | "downtrend" | "fear"
        | "extreme_fear" => Some(SignalLabel::Bearish),
        "neutral" | "hold" | "sideways" | "flat" => Some(SignalLabel::Neutral),
        "overbought" => Some(SignalLabel::Overbought),
        "oversold" => Some(SignalLabel::Oversold),
        _ => None,
    }
}

/// Any indicator field to a number, regardless of shape.
pub fn number(raw: Option<&Value>) -> Option<f64> {
    raw.and_then(IndicatorValue::parse)
        .and_then(|v| v.numeric())
}

/// Any indicator field to a label, regardless of shape.
pub fn label(raw: Option<&Value>) -> Option<SignalLabel> {
    raw.and_then(IndicatorValue::parse).and_then(|v| v.label())
}

/// A 0-100 score. Values outside the scale are treated as unknown.
pub fn score(raw: Option<&Value>) -> Option<f64> {
    number(raw).filter(|v| (0.0..=100.0).contains(v))
}

/// RSI on the 0-100 scale. Absent, unparseable or out-of-range input yields
/// the neutral 50.
pub fn normalize_rsi(raw: Option<&Value>) -> f64 {
    rsi_reading(raw).value
}

pub fn rsi_reading(raw: Option<&Value>) -> Reading {
    let parsed = raw.and_then(IndicatorValue::parse);
    let value = parsed
        .as_ref()
        .and_then(IndicatorValue::numeric)
        .filter(|v| (0.0..=100.0).contains(v));

    match value {
        Some(v) => {
            let signal = parsed
                .as_ref()
                .and_then(IndicatorValue::label)
                .unwrap_or_else(|| rsi_label(v));
            Reading::reported(v, signal)
        }
        None => Reading::neutral(NEUTRAL_RSI),
    }
}

pub fn rsi_label(value: f64) -> SignalLabel {
    if value >= RSI_OVERBOUGHT {
        SignalLabel::Overbought
    } else if value <= RSI_OVERSOLD {
        SignalLabel::Oversold
    } else {
        SignalLabel::Neutral
    }
}

/// MACD arrives as a number, a label string, or an object such as
/// `{"value": "12.3", "signal": "BULLISH"}` or
/// `{"macd": 12.3, "signal": 10.1, "histogram": 2.2}` where `signal` is the
/// signal line.
pub fn macd_reading(raw: Option<&Value>) -> MacdReading {
    let Some(raw) = raw.filter(|v| !v.is_null()) else {
        return MacdReading::neutral();
    };

    let (value, histogram, signal_line, explicit) = match raw {
        Value::Object(obj) => {
            let value = number(obj.get("value"))
                .or_else(|| number(obj.get("macd")))
                .or_else(|| number(obj.get("line")));
            let histogram = number(obj.get("histogram")).or_else(|| number(obj.get("hist")));
            let signal_field = obj.get("signal");
            let signal_line = signal_field.filter(|v| v.is_number()).and_then(|v| number(Some(v)));
            let explicit = label(signal_field)
                .or_else(|| label(obj.get("label")))
                .or_else(|| label(obj.get("trend")));
            (value, histogram, signal_line, explicit)
        }
        other => (number(Some(other)), None, None, label(Some(other))),
    };

    if value.is_none() && histogram.is_none() && explicit.is_none() {
        return MacdReading::neutral();
    }

    let derived = histogram
        .or_else(|| value.zip(signal_line).map(|(v, s)| v - s))
        .map(|h| {
            if h > 0.0 {
                SignalLabel::Bullish
            } else if h < 0.0 {
                SignalLabel::Bearish
            } else {
                SignalLabel::Neutral
            }
        });

    MacdReading {
        value,
        histogram,
        signal: explicit.or(derived).unwrap_or(SignalLabel::Neutral),
        provenance: Provenance::Reported,
    }
}
