//! Signal Lifecycle
//!
//! Approval state machine for a constructed trade signal. Every transition
//! out of `PendingReview` is an explicit human action that yields exactly one
//! `ApprovalDecision`; terminal states carry that decision.

pub mod error;
pub mod lifecycle;

pub use error::LifecycleError;
pub use lifecycle::{
    PersistenceStatus, ReviewAction, SignalLifecycle, StateChange, TrackedSignal,
};
