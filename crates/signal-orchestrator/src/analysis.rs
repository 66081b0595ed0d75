use chrono::{DateTime, Utc};
use confidence_scorer::ConfidenceAssessment;
use risk_manager::RiskPlan;
use serde::Serialize;
use signal_core::{ChangeReport, DataQuality, MarketSnapshot};
use signal_lifecycle::TrackedSignal;
use uuid::Uuid;

/// Everything the pipeline derived on the way to a signal.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensiveAnalysis {
    pub snapshot: MarketSnapshot,
    pub confidence: ConfidenceAssessment,
    pub risk_plan: RiskPlan,
    /// Direction came from the vote rather than the request
    pub direction_inferred: bool,
    pub defaulted_fields: Vec<String>,
}

/// A signal as presented for review.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalView {
    #[serde(flatten)]
    pub tracked: TrackedSignal,
    pub analysis: ComprehensiveAnalysis,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub success: bool,
    pub data_quality: DataQuality,
    /// `None` when the symbol has no earlier snapshot to compare with
    pub changes: Option<ChangeReport>,
    pub annotated_signal: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}
