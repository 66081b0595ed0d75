use async_trait::async_trait;
use dashmap::DashMap;
use signal_core::{ApprovalDecision, DecisionStore, StoreError, TradeSignal};
use uuid::Uuid;

/// Process-local decision store for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryDecisionStore {
    records: DashMap<Uuid, (TradeSignal, ApprovalDecision)>,
}

impl InMemoryDecisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, signal_id: &Uuid) -> Option<ApprovalDecision> {
        self.records.get(signal_id).map(|r| r.value().1.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl DecisionStore for InMemoryDecisionStore {
    async fn record(
        &self,
        signal: &TradeSignal,
        decision: &ApprovalDecision,
    ) -> Result<(), StoreError> {
        self.records
            .insert(decision.signal_id, (signal.clone(), decision.clone()));
        Ok(())
    }
}
