use async_trait::async_trait;

use crate::{ApprovalDecision, SourceError, SourceRole, StoreError, SymbolKey, TradeSignal};

/// One upstream feed. Returns a JSON fragment that is merged into the raw
/// payload handed to the validator.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn name(&self) -> &str;

    fn role(&self) -> SourceRole;

    async fn fetch(&self, key: &SymbolKey) -> Result<serde_json::Value, SourceError>;
}

/// Durable record of review outcomes. Invoked on every terminal transition.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    async fn record(
        &self,
        signal: &TradeSignal,
        decision: &ApprovalDecision,
    ) -> Result<(), StoreError>;
}
