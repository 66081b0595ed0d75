use serde::{Deserialize, Serialize};

/// Qualitative confidence level. Display framing only, never a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 80.0 => ConfidenceLevel::High,
            s if s >= 60.0 => ConfidenceLevel::Medium,
            _ => ConfidenceLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "High",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::Low => "Low",
        }
    }

    /// One step down; `Low` stays `Low`.
    pub fn demoted(&self) -> Self {
        match self {
            ConfidenceLevel::High => ConfidenceLevel::Medium,
            ConfidenceLevel::Medium | ConfidenceLevel::Low => ConfidenceLevel::Low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_thresholds() {
        assert_eq!(ConfidenceLevel::from_score(80.0), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(79.99), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(60.0), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(59.9), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.0), ConfidenceLevel::Low);
    }

    #[test]
    fn test_demotion_floors_at_low() {
        assert_eq!(ConfidenceLevel::High.demoted(), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::Medium.demoted(), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::Low.demoted(), ConfidenceLevel::Low);
    }
}
