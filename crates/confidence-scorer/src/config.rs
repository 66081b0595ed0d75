use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScorerError {
    #[error("Invalid weight for {0}: {1}")]
    InvalidWeight(&'static str, f64),

    #[error("Confidence weights must not all be zero")]
    ZeroWeightSum,

    #[error("Invalid quality thresholds: insufficient ({insufficient}) must not exceed degraded ({degraded})")]
    InvalidThresholds { degraded: f64, insufficient: f64 },
}

/// Relative weight of each dimension in the overall confidence.
///
/// Weights need not sum to 1; they are normalized before use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceWeights {
    pub technical: f64,
    pub sentiment: f64,
    pub on_chain: f64,
    pub risk: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            technical: 0.25,
            sentiment: 0.25,
            on_chain: 0.25,
            risk: 0.25,
        }
    }
}

impl ConfidenceWeights {
    pub fn new(
        technical: f64,
        sentiment: f64,
        on_chain: f64,
        risk: f64,
    ) -> Result<Self, ScorerError> {
        let weights = Self {
            technical,
            sentiment,
            on_chain,
            risk,
        };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<(), ScorerError> {
        for (name, w) in self.entries() {
            if !w.is_finite() || w < 0.0 {
                return Err(ScorerError::InvalidWeight(name, w));
            }
        }
        if self.sum() <= 0.0 {
            return Err(ScorerError::ZeroWeightSum);
        }
        Ok(())
    }

    pub fn sum(&self) -> f64 {
        self.technical + self.sentiment + self.on_chain + self.risk
    }

    /// Weights scaled to sum to 1.
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        Self {
            technical: self.technical / sum,
            sentiment: self.sentiment / sum,
            on_chain: self.on_chain / sum,
            risk: self.risk / sum,
        }
    }

    fn entries(&self) -> [(&'static str, f64); 4] {
        [
            ("technical", self.technical),
            ("sentiment", self.sentiment),
            ("on_chain", self.on_chain),
            ("risk", self.risk),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorerConfig {
    pub weights: ConfidenceWeights,
    /// Overall data quality (%) below which the level is demoted
    pub degraded_below: f64,
    /// Overall data quality (%) below which the recommendation is insufficient
    pub insufficient_below: f64,
    /// Stand-in for a dimension the snapshot carries no score for
    pub default_dimension_score: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            weights: ConfidenceWeights::default(),
            degraded_below: 90.0,
            insufficient_below: 70.0,
            default_dimension_score: 50.0,
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> Result<(), ScorerError> {
        self.weights.validate()?;
        if self.insufficient_below > self.degraded_below {
            return Err(ScorerError::InvalidThresholds {
                degraded: self.degraded_below,
                insufficient: self.insufficient_below,
            });
        }
        Ok(())
    }
}
