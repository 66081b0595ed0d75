use serde::{Deserialize, Serialize};
use signal_core::SignalStatus;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleError {
    #[error("Cannot {action} signal {signal_id}: it is {from}")]
    InvalidStateTransition {
        signal_id: Uuid,
        from: SignalStatus,
        action: String,
    },

    #[error("Successor {successor_id} does not descend from signal {signal_id}")]
    LineageMismatch { signal_id: Uuid, successor_id: Uuid },

    #[error("Signal {0} has no decision to persist")]
    NoDecision(Uuid),
}
