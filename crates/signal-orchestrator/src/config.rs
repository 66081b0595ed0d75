use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Hard deadline for the whole source fan-out
    pub fetch_timeout_secs: u64,
    pub persistence_timeout_secs: u64,
    /// Used when a generation request names no balance
    pub default_account_balance: Decimal,
    /// Saved, decided signals kept in memory; older ones are evicted
    pub max_settled_signals: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 15,
            persistence_timeout_secs: 5,
            default_account_balance: dec!(10000),
            max_settled_signals: 1000,
        }
    }
}

impl OrchestratorConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_secs(self.persistence_timeout_secs)
    }
}
