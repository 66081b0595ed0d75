//! Confidence Scorer Module
//!
//! Aggregates the four analytical dimensions into one overall confidence and
//! a display level, with data quality demoting the level rather than the number.

pub mod config;
pub mod level;
pub mod scorer;

pub use config::{ConfidenceWeights, ScorerConfig, ScorerError};
pub use level::ConfidenceLevel;
pub use scorer::{ConfidenceAssessment, ConfidenceScorer, Dimension, DimensionScores};
