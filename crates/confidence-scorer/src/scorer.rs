//! Weighted aggregation of dimension scores.
//!
//! Each dimension arrives already on the 0-100 scale; this module only
//! combines them and frames the result against the snapshot's data quality.

use serde::{Deserialize, Serialize};
use signal_core::{Confidence, MarketSnapshot, QualityFlag};
use tracing::debug;

use crate::config::{ScorerConfig, ScorerError};
use crate::level::ConfidenceLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    Technical,
    Sentiment,
    OnChain,
    Risk,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Technical => "technical",
            Dimension::Sentiment => "sentiment",
            Dimension::OnChain => "onChain",
            Dimension::Risk => "risk",
        }
    }
}

/// Per-dimension inputs; `None` means the snapshot carried no score.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DimensionScores {
    pub technical: Option<f64>,
    pub sentiment: Option<f64>,
    pub on_chain: Option<f64>,
    pub risk: Option<f64>,
}

impl DimensionScores {
    pub fn from_snapshot(snapshot: &MarketSnapshot) -> Self {
        Self {
            technical: snapshot.technical.score,
            sentiment: snapshot.sentiment.score,
            on_chain: snapshot.on_chain.score,
            risk: snapshot.risk.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceAssessment {
    pub confidence: Confidence,
    /// Level implied by the overall number alone
    pub raw_level: ConfidenceLevel,
    /// Level to display, after any data-quality demotion
    pub level: ConfidenceLevel,
    pub display_label: String,
    pub data_quality: f64,
    pub quality_flag: QualityFlag,
    pub defaulted_dimensions: Vec<Dimension>,
    pub recommendation: String,
}

impl ConfidenceAssessment {
    pub fn is_demoted(&self) -> bool {
        self.level != self.raw_level
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    config: ScorerConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ScorerConfig) -> Result<Self, ScorerError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn score(&self, snapshot: &MarketSnapshot) -> ConfidenceAssessment {
        let assessment = self.score_dimensions(
            DimensionScores::from_snapshot(snapshot),
            snapshot.data_quality.overall,
        );
        debug!(
            "Confidence for {}@{}: {:.1} ({}, quality {:.0}%)",
            snapshot.symbol,
            snapshot.timeframe,
            assessment.confidence.overall,
            assessment.display_label,
            assessment.data_quality
        );
        assessment
    }

    pub fn score_dimensions(
        &self,
        scores: DimensionScores,
        data_quality: f64,
    ) -> ConfidenceAssessment {
        let mut defaulted = Vec::new();
        let fallback = self.config.default_dimension_score;
        let mut resolve = |value: Option<f64>, dimension: Dimension| match value {
            Some(v) if v.is_finite() => v.clamp(0.0, 100.0),
            _ => {
                defaulted.push(dimension);
                fallback
            }
        };

        let technical = resolve(scores.technical, Dimension::Technical);
        let sentiment = resolve(scores.sentiment, Dimension::Sentiment);
        let on_chain = resolve(scores.on_chain, Dimension::OnChain);
        let risk = resolve(scores.risk, Dimension::Risk);

        let w = self.config.weights.normalized();
        let overall = (technical * w.technical
            + sentiment * w.sentiment
            + on_chain * w.on_chain
            + risk * w.risk)
            .clamp(0.0, 100.0);

        let data_quality = if data_quality.is_finite() {
            data_quality.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let quality_flag = self.quality_flag(data_quality);

        let raw_level = ConfidenceLevel::from_score(overall);
        let level = match quality_flag {
            QualityFlag::Sufficient => raw_level,
            QualityFlag::Degraded | QualityFlag::Insufficient => raw_level.demoted(),
        };

        let display_label = match quality_flag {
            QualityFlag::Sufficient => level.as_str().to_string(),
            QualityFlag::Degraded => format!("{} (degraded data)", level.as_str()),
            QualityFlag::Insufficient => format!("{} (insufficient data)", level.as_str()),
        };

        ConfidenceAssessment {
            confidence: Confidence {
                overall,
                technical,
                sentiment,
                on_chain,
                risk,
            },
            raw_level,
            level,
            display_label,
            data_quality,
            quality_flag,
            recommendation: recommendation(level, quality_flag, data_quality),
            defaulted_dimensions: defaulted,
        }
    }

    pub fn quality_flag(&self, data_quality: f64) -> QualityFlag {
        if data_quality < self.config.insufficient_below {
            QualityFlag::Insufficient
        } else if data_quality < self.config.degraded_below {
            QualityFlag::Degraded
        } else {
            QualityFlag::Sufficient
        }
    }
}

fn recommendation(level: ConfidenceLevel, flag: QualityFlag, data_quality: f64) -> String {
    match flag {
        QualityFlag::Insufficient => format!(
            "Insufficient data ({:.0}% available). Do not act on this signal without independent confirmation.",
            data_quality
        ),
        QualityFlag::Degraded => format!(
            "Data quality is {:.0}%; confidence shown one level lower. Review missing sources before approving.",
            data_quality
        ),
        QualityFlag::Sufficient => match level {
            ConfidenceLevel::High => "Strong agreement across dimensions.".to_string(),
            ConfidenceLevel::Medium => "Moderate agreement; size conservatively.".to_string(),
            ConfidenceLevel::Low => "Weak agreement; treat as informational.".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfidenceWeights;

    fn scores(t: f64, s: f64, o: f64, r: f64) -> DimensionScores {
        DimensionScores {
            technical: Some(t),
            sentiment: Some(s),
            on_chain: Some(o),
            risk: Some(r),
        }
    }

    #[test]
    fn test_equal_weight_mean() {
        let scorer = ConfidenceScorer::default();
        let a = scorer.score_dimensions(scores(90.0, 70.0, 80.0, 80.0), 100.0);
        assert!((a.confidence.overall - 80.0).abs() < 1e-9);
        assert_eq!(a.level, ConfidenceLevel::High);
        assert_eq!(a.quality_flag, QualityFlag::Sufficient);
        assert_eq!(a.display_label, "High");
        assert!(a.defaulted_dimensions.is_empty());
    }

    #[test]
    fn test_custom_weights() {
        let config = ScorerConfig {
            weights: ConfidenceWeights::new(1.0, 0.0, 0.0, 1.0).unwrap(),
            ..Default::default()
        };
        let scorer = ConfidenceScorer::new(config).unwrap();
        let a = scorer.score_dimensions(scores(90.0, 0.0, 0.0, 70.0), 100.0);
        assert!((a.confidence.overall - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_degraded_quality_demotes_level_not_number() {
        let scorer = ConfidenceScorer::default();
        let a = scorer.score_dimensions(scores(85.0, 85.0, 85.0, 85.0), 85.0);
        assert!((a.confidence.overall - 85.0).abs() < 1e-9);
        assert_eq!(a.raw_level, ConfidenceLevel::High);
        assert_eq!(a.level, ConfidenceLevel::Medium);
        assert!(a.is_demoted());
        assert_eq!(a.quality_flag, QualityFlag::Degraded);
        assert!(a.display_label.contains("degraded"));
    }

    #[test]
    fn test_insufficient_quality_is_surfaced() {
        let scorer = ConfidenceScorer::default();
        let a = scorer.score_dimensions(scores(65.0, 65.0, 65.0, 65.0), 60.0);
        assert_eq!(a.quality_flag, QualityFlag::Insufficient);
        assert_eq!(a.level, ConfidenceLevel::Low);
        assert!(a.recommendation.starts_with("Insufficient data"));
    }

    #[test]
    fn test_quality_boundaries() {
        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.quality_flag(90.0), QualityFlag::Sufficient);
        assert_eq!(scorer.quality_flag(89.9), QualityFlag::Degraded);
        assert_eq!(scorer.quality_flag(70.0), QualityFlag::Degraded);
        assert_eq!(scorer.quality_flag(69.9), QualityFlag::Insufficient);
    }

    #[test]
    fn test_missing_dimensions_default_and_are_listed() {
        let scorer = ConfidenceScorer::default();
        let a = scorer.score_dimensions(
            DimensionScores {
                technical: Some(90.0),
                ..Default::default()
            },
            100.0,
        );
        assert_eq!(a.confidence.sentiment, 50.0);
        assert!((a.confidence.overall - 60.0).abs() < 1e-9);
        assert_eq!(
            a.defaulted_dimensions,
            vec![Dimension::Sentiment, Dimension::OnChain, Dimension::Risk]
        );
    }

    #[test]
    fn test_out_of_range_scores_are_clamped() {
        let scorer = ConfidenceScorer::default();
        let a = scorer.score_dimensions(scores(140.0, -5.0, 50.0, 50.0), 100.0);
        assert_eq!(a.confidence.technical, 100.0);
        assert_eq!(a.confidence.sentiment, 0.0);
        for v in [a.confidence.overall, a.confidence.on_chain, a.confidence.risk] {
            assert!((0.0..=100.0).contains(&v));
        }
    }
}
