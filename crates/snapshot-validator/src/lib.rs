//! Snapshot validation: the only way raw provider payloads become a
//! `MarketSnapshot`.

pub mod normalizer;
pub mod validator;

pub use normalizer::{
    macd_reading, normalize_rsi, rsi_reading, IndicatorValue, Scalar, NEUTRAL_RSI,
};
pub use validator::MarketSnapshotValidator;
