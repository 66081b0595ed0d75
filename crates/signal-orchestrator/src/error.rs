use risk_manager::RiskError;
use signal_core::{ApprovalDecision, SymbolKey, ValidationError};
use signal_lifecycle::LifecycleError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Data fetch for {key} exceeded {timeout_ms}ms")]
    TimeoutExceeded { key: SymbolKey, timeout_ms: u64 },

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Decision on signal {} was made but not saved: {reason}", decision.signal_id)]
    PersistenceFailure {
        decision: ApprovalDecision,
        reason: String,
    },

    #[error("A generation for {0} is already in progress")]
    GenerationInProgress(SymbolKey),

    #[error("Signal {0} not found")]
    SignalNotFound(Uuid),

    #[error("Signal {0} has no decision to persist")]
    NothingToPersist(Uuid),
}

impl PipelineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(ValidationError::MissingPriceData) => "MISSING_PRICE_DATA",
            PipelineError::Validation(ValidationError::NotLiveData) => "NOT_LIVE_DATA",
            PipelineError::Validation(ValidationError::NonPositivePrice(_)) => "INVALID_PRICE",
            PipelineError::TimeoutExceeded { .. } => "TIMEOUT_EXCEEDED",
            PipelineError::Risk(_) => "RISK_ENGINE_ERROR",
            PipelineError::Lifecycle(LifecycleError::InvalidStateTransition { .. }) => {
                "INVALID_STATE_TRANSITION"
            }
            PipelineError::Lifecycle(LifecycleError::LineageMismatch { .. }) => "LINEAGE_MISMATCH",
            PipelineError::Lifecycle(LifecycleError::NoDecision(_)) => "NOTHING_TO_PERSIST",
            PipelineError::PersistenceFailure { .. } => "PERSISTENCE_FAILURE",
            PipelineError::GenerationInProgress(_) => "GENERATION_IN_PROGRESS",
            PipelineError::SignalNotFound(_) => "SIGNAL_NOT_FOUND",
            PipelineError::NothingToPersist(_) => "NOTHING_TO_PERSIST",
        }
    }

    /// Whether the same request may succeed if sent again. A persistence
    /// failure is retried through `retry_persistence`, not by reviewing again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Validation(_)
                | PipelineError::TimeoutExceeded { .. }
                | PipelineError::GenerationInProgress(_)
                | PipelineError::PersistenceFailure { .. }
        )
    }
}
