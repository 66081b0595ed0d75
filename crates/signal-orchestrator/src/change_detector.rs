//! Diff between the snapshot a signal was built from and a fresh one.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use signal_core::{ChangeReport, MarketSnapshot, SignalLabel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDetectorConfig {
    /// Absolute price move (%) that counts as a change
    pub price_threshold_pct: f64,
    /// Absolute move in a 0-100 dimension score that counts as a change
    pub score_threshold: f64,
}

impl Default for ChangeDetectorConfig {
    fn default() -> Self {
        Self {
            price_threshold_pct: 0.5,
            score_threshold: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    config: ChangeDetectorConfig,
}

impl ChangeDetector {
    pub fn new(config: ChangeDetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChangeDetectorConfig {
        &self.config
    }

    pub fn detect(&self, previous: &MarketSnapshot, current: &MarketSnapshot) -> ChangeReport {
        let price_delta = current.price - previous.price;
        let price_delta_pct = if previous.price > 0.0 {
            price_delta / previous.price * 100.0
        } else {
            0.0
        };
        let price_changed = price_delta_pct.abs() >= self.config.price_threshold_pct;

        let (prev_t, cur_t) = (&previous.technical, &current.technical);
        let mut indicators_changed = Vec::new();
        if prev_t.rsi.signal != cur_t.rsi.signal {
            indicators_changed.push("rsi".to_string());
        }
        if prev_t.macd.signal != cur_t.macd.signal {
            indicators_changed.push("macd".to_string());
        }
        if prev_t.trend != cur_t.trend {
            indicators_changed.push("trend".to_string());
        }
        if self.score_moved(prev_t.score, cur_t.score) {
            indicators_changed.push("technicalScore".to_string());
        }

        let sentiment_changed = label_flipped(previous.sentiment.label, current.sentiment.label)
            || self.score_moved(previous.sentiment.score, current.sentiment.score);
        let on_chain_changed = label_flipped(previous.on_chain.label, current.on_chain.label)
            || self.score_moved(previous.on_chain.score, current.on_chain.score);

        let significant_changes =
            price_changed
                || !indicators_changed.is_empty()
                || sentiment_changed
                || on_chain_changed;

        ChangeReport {
            price_changed,
            price_delta,
            price_delta_pct,
            indicators_changed,
            sentiment_changed,
            on_chain_changed,
            significant_changes,
            detected_at: Utc::now(),
        }
    }

    /// A score appearing or disappearing counts as movement.
    fn score_moved(&self, before: Option<f64>, after: Option<f64>) -> bool {
        match (before, after) {
            (Some(a), Some(b)) => (b - a).abs() >= self.config.score_threshold,
            (None, None) => false,
            _ => true,
        }
    }
}

fn label_flipped(before: Option<SignalLabel>, after: Option<SignalLabel>) -> bool {
    before.is_some() && after.is_some() && before != after
}
