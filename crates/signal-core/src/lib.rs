//! Shared domain types for the signal pipeline: validated snapshots, trade
//! signals, review decisions, and the collaborator traits the pipeline calls.

pub mod error;
pub mod traits;
pub mod types;

pub use error::*;
pub use traits::*;
pub use types::*;
