//! Signal Orchestrator
//!
//! Runs the pipeline end to end: concurrent fetch, validation, confidence
//! scoring, risk planning, and the review lifecycle that follows.

pub mod analysis;
pub mod change_detector;
pub mod config;
pub mod direction;
pub mod error;
pub mod fetch;
pub mod inflight;
pub mod store;

pub use analysis::{ComprehensiveAnalysis, RefreshReport, SignalView};
pub use change_detector::{ChangeDetector, ChangeDetectorConfig};
pub use config::OrchestratorConfig;
pub use direction::infer_direction;
pub use error::PipelineError;
pub use inflight::{InFlightGuard, InFlightRegistry};
pub use store::InMemoryDecisionStore;

use chrono::{DateTime, Utc};
use confidence_scorer::ConfidenceScorer;
use dashmap::DashMap;
use risk_manager::RiskEngine;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use signal_core::{
    ApprovalDecision, DecisionStore, Lineage, MarketDataSource, MarketSnapshot, PositionType,
    SignalAdjustments, SignalStatus, SymbolKey, Timeframe, TradeSignal,
};
use signal_lifecycle::{ReviewAction, TrackedSignal};
use snapshot_validator::MarketSnapshotValidator;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Inferred from the snapshot when absent
    #[serde(default)]
    pub position_type: Option<PositionType>,
    #[serde(default)]
    pub account_balance: Option<Decimal>,
    #[serde(default)]
    pub max_risk_fraction: Option<Decimal>,
}

impl GenerateRequest {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            position_type: None,
            account_balance: None,
            max_risk_fraction: None,
        }
    }

    pub fn key(&self) -> SymbolKey {
        SymbolKey::new(&self.symbol, self.timeframe)
    }
}

/// Result of a successful review, including a saved decision.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub decision: ApprovalDecision,
    pub signal: SignalView,
    pub successor: Option<SignalView>,
}

struct SignalRecord {
    tracked: TrackedSignal,
    analysis: ComprehensiveAnalysis,
}

impl SignalRecord {
    fn view(&self) -> SignalView {
        SignalView {
            tracked: self.tracked.clone(),
            analysis: self.analysis.clone(),
        }
    }
}

/// Per symbol+timeframe state. Never shared across keys.
#[derive(Default)]
struct SymbolState {
    /// Snapshot the latest signal was built from; the refresh baseline
    last_snapshot: Option<MarketSnapshot>,
    last_signal_id: Option<Uuid>,
    last_refreshed: Option<DateTime<Utc>>,
}

pub struct SignalOrchestrator {
    sources: Vec<Arc<dyn MarketDataSource>>,
    validator: MarketSnapshotValidator,
    scorer: ConfidenceScorer,
    risk_engine: RiskEngine,
    change_detector: ChangeDetector,
    store: Arc<dyn DecisionStore>,
    config: OrchestratorConfig,
    in_flight: InFlightRegistry,
    symbols: DashMap<SymbolKey, SymbolState>,
    signals: DashMap<Uuid, SignalRecord>,
}

impl SignalOrchestrator {
    pub fn new(sources: Vec<Arc<dyn MarketDataSource>>, store: Arc<dyn DecisionStore>) -> Self {
        Self {
            sources,
            validator: MarketSnapshotValidator::new(),
            scorer: ConfidenceScorer::default(),
            risk_engine: RiskEngine::default(),
            change_detector: ChangeDetector::default(),
            store,
            config: OrchestratorConfig::default(),
            in_flight: InFlightRegistry::new(),
            symbols: DashMap::new(),
            signals: DashMap::new(),
        }
    }

    pub fn with_scorer(mut self, scorer: ConfidenceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_risk_engine(mut self, risk_engine: RiskEngine) -> Self {
        self.risk_engine = risk_engine;
        self
    }

    pub fn with_change_detector(mut self, change_detector: ChangeDetector) -> Self {
        self.change_detector = change_detector;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    /// Fetches from every source and runs the full pipeline. On any failure
    /// before the risk plan exists, no signal and no lifecycle are created.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<SignalView, PipelineError> {
        let key = request.key();
        let _guard = self
            .in_flight
            .try_acquire(&key, "generate")
            .ok_or_else(|| PipelineError::GenerationInProgress(key.clone()))?;

        info!("Generating signal for {} from {} sources", key, self.sources.len());
        let outcome = fetch::fetch_payload(&self.sources, &key, self.config.fetch_timeout()).await?;
        if !outcome.failed.is_empty() {
            warn!(
                "{} of {} sources failed for {}; continuing with degraded data",
                outcome.failed.len(),
                self.sources.len(),
                key
            );
        }

        self.build_signal(&key, request, &outcome.payload)
    }

    /// Runs the pipeline on a payload the caller already holds.
    pub fn generate_from_payload(
        &self,
        request: &GenerateRequest,
        raw: &Value,
    ) -> Result<SignalView, PipelineError> {
        let key = request.key();
        let _guard = self
            .in_flight
            .try_acquire(&key, "generate")
            .ok_or_else(|| PipelineError::GenerationInProgress(key.clone()))?;

        self.build_signal(&key, request, raw)
    }

    fn build_signal(
        &self,
        key: &SymbolKey,
        request: &GenerateRequest,
        raw: &Value,
    ) -> Result<SignalView, PipelineError> {
        let snapshot = self.validator.validate(key, raw)?;
        let assessment = self.scorer.score(&snapshot);

        let (position_type, direction_inferred) = match request.position_type {
            Some(p) => (p, false),
            None => (infer_direction(&snapshot), true),
        };
        let balance = request
            .account_balance
            .unwrap_or(self.config.default_account_balance);
        let plan = self.risk_engine.build_risk_plan(
            &snapshot,
            position_type,
            balance,
            request.max_risk_fraction,
        )?;

        let signal = TradeSignal {
            id: Uuid::new_v4(),
            symbol: key.symbol.clone(),
            timeframe: key.timeframe,
            position_type,
            entry: plan.entry,
            stop_loss: plan.stop_loss,
            take_profits: plan.take_profits,
            confidence: assessment.confidence,
            risk_reward: plan.risk_reward,
            position_size: plan.position_size,
            max_loss: plan.max_loss,
            data_quality: assessment.data_quality,
            quality_flag: assessment.quality_flag,
            lineage: None,
            created_at: Utc::now(),
        };

        if signal.is_flagged() {
            warn!(
                "Signal {} for {} built from {:.0}% data quality ({})",
                signal.id,
                key,
                signal.data_quality,
                signal.quality_flag.as_str()
            );
        }
        info!(
            "Signal {} for {}: {} entry {} stop {} confidence {:.1} ({}) R:R {:.2}",
            signal.id,
            key,
            position_type,
            signal.entry,
            signal.stop_loss,
            signal.confidence.overall,
            assessment.display_label,
            signal.risk_reward
        );

        let analysis = ComprehensiveAnalysis {
            defaulted_fields: snapshot
                .defaulted_fields()
                .into_iter()
                .map(str::to_string)
                .collect(),
            snapshot: snapshot.clone(),
            confidence: assessment,
            risk_plan: plan,
            direction_inferred,
        };

        let id = signal.id;
        let record = SignalRecord {
            tracked: TrackedSignal::pending(signal),
            analysis,
        };
        let view = record.view();
        self.signals.insert(id, record);

        let mut state = self.symbols.entry(key.clone()).or_default();
        state.last_snapshot = Some(snapshot);
        state.last_signal_id = Some(id);

        Ok(view)
    }

    /// Applies a reviewer's action. A decision that is made but cannot be
    /// saved comes back as `PersistenceFailure`; the decision stands and
    /// `retry_persistence` re-sends it.
    pub async fn review(
        &self,
        signal_id: Uuid,
        action: ReviewAction,
        reason: Option<String>,
    ) -> Result<ReviewOutcome, PipelineError> {
        let successor = match &action {
            ReviewAction::Modify { adjustments } => {
                Some(self.plan_successor(signal_id, adjustments)?)
            }
            ReviewAction::Approve | ReviewAction::Reject => None,
        };

        let (decision, signal) = {
            let mut record = self
                .signals
                .get_mut(&signal_id)
                .ok_or(PipelineError::SignalNotFound(signal_id))?;
            let decision = match (&action, &successor) {
                (_, Some(next)) => record.tracked.modify(next.tracked.signal(), reason)?,
                (ReviewAction::Reject, None) => record.tracked.reject(reason)?,
                (_, None) => record.tracked.approve(reason)?,
            };
            (decision, record.tracked.signal().clone())
        };
        info!(
            "Signal {} {} by reviewer",
            signal_id,
            decision.outcome.as_str()
        );

        let successor_view = match successor {
            Some(mut next) => {
                next.tracked.submit_for_review()?;
                let id = next.tracked.id();
                let key = next.tracked.signal().key();
                let record = SignalRecord {
                    tracked: next.tracked,
                    analysis: next.analysis,
                };
                let view = record.view();
                self.signals.insert(id, record);
                self.symbols.entry(key).or_default().last_signal_id = Some(id);
                Some(view)
            }
            None => None,
        };

        self.persist(&signal, &decision).await?;

        let outcome = ReviewOutcome {
            decision,
            signal: self.view(signal_id)?,
            successor: successor_view,
        };
        self.evict_settled();
        Ok(outcome)
    }

    /// Re-plans a pending signal from reviewer adjustments. Nothing is
    /// stored until the parent transition succeeds.
    fn plan_successor(
        &self,
        parent_id: Uuid,
        adjustments: &SignalAdjustments,
    ) -> Result<SuccessorDraft, PipelineError> {
        let record = self
            .signals
            .get(&parent_id)
            .ok_or(PipelineError::SignalNotFound(parent_id))?;
        record.tracked.ensure_reviewable("modify")?;

        let parent = record.tracked.signal();
        let plan = self.risk_engine.replan(&record.analysis.risk_plan, adjustments)?;

        let signal = TradeSignal {
            id: Uuid::new_v4(),
            entry: plan.entry,
            stop_loss: plan.stop_loss,
            take_profits: plan.take_profits,
            risk_reward: plan.risk_reward,
            position_size: plan.position_size,
            max_loss: plan.max_loss,
            lineage: Some(Lineage::descend_from(parent)),
            created_at: Utc::now(),
            ..parent.clone()
        };

        let analysis = ComprehensiveAnalysis {
            risk_plan: plan,
            ..record.analysis.clone()
        };

        Ok(SuccessorDraft {
            tracked: TrackedSignal::generated(signal),
            analysis,
        })
    }

    async fn persist(
        &self,
        signal: &TradeSignal,
        decision: &ApprovalDecision,
    ) -> Result<(), PipelineError> {
        let saved = tokio::time::timeout(
            self.config.persistence_timeout(),
            self.store.record(signal, decision),
        )
        .await;

        let failure = match saved {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "store did not answer within {}s",
                self.config.persistence_timeout_secs
            )),
        };

        let mut record = self
            .signals
            .get_mut(&decision.signal_id)
            .ok_or(PipelineError::SignalNotFound(decision.signal_id))?;

        match failure {
            None => {
                record.tracked.mark_persisted()?;
                info!("Decision for signal {} saved", decision.signal_id);
                Ok(())
            }
            Some(reason) => {
                record.tracked.mark_persistence_failed(reason.clone())?;
                error!(
                    "Decision for signal {} not saved: {}",
                    decision.signal_id, reason
                );
                Err(PipelineError::PersistenceFailure {
                    decision: decision.clone(),
                    reason,
                })
            }
        }
    }

    /// Re-sends a decision whose save failed. Already-saved decisions are
    /// returned as-is without touching the store.
    pub async fn retry_persistence(
        &self,
        signal_id: Uuid,
    ) -> Result<ApprovalDecision, PipelineError> {
        let (signal, decision, persisted) = {
            let record = self
                .signals
                .get(&signal_id)
                .ok_or(PipelineError::SignalNotFound(signal_id))?;
            let decision = record
                .tracked
                .decision()
                .cloned()
                .ok_or(PipelineError::NothingToPersist(signal_id))?;
            (
                record.tracked.signal().clone(),
                decision,
                record.tracked.is_persisted(),
            )
        };

        if !persisted {
            info!("Retrying save of decision for signal {}", signal_id);
            self.persist(&signal, &decision).await?;
            self.evict_settled();
        }
        Ok(decision)
    }

    /// Drops the oldest saved decisions beyond `max_settled_signals`. Pending
    /// signals and decisions still waiting on a save are always kept.
    fn evict_settled(&self) {
        let limit = self.config.max_settled_signals;
        let mut settled: Vec<(DateTime<Utc>, Uuid)> = self
            .signals
            .iter()
            .filter(|record| record.tracked.is_persisted())
            .filter_map(|record| {
                record
                    .tracked
                    .decision()
                    .map(|decision| (decision.timestamp, *record.key()))
            })
            .collect();
        if settled.len() <= limit {
            return;
        }

        settled.sort_unstable();
        let excess = settled.len() - limit;
        for (_, id) in settled.into_iter().take(excess) {
            self.signals.remove(&id);
        }
        debug!("Evicted {} settled signals", excess);
    }

    /// Re-runs fetch and validation for `key` and diffs against the snapshot
    /// of the symbol's latest signal. A pending signal is annotated, never
    /// replaced or invalidated.
    pub async fn refresh(&self, key: &SymbolKey) -> Result<RefreshReport, PipelineError> {
        let _guard = self
            .in_flight
            .try_acquire(key, "refresh")
            .ok_or_else(|| PipelineError::GenerationInProgress(key.clone()))?;

        let started = Instant::now();
        let outcome = fetch::fetch_payload(&self.sources, key, self.config.fetch_timeout()).await?;
        let snapshot = self.validator.validate(key, &outcome.payload)?;

        let (baseline, last_signal_id) = {
            let mut state = self.symbols.entry(key.clone()).or_default();
            state.last_refreshed = Some(Utc::now());
            (state.last_snapshot.clone(), state.last_signal_id)
        };

        let changes = baseline.map(|prev| self.change_detector.detect(&prev, &snapshot));

        let annotated_signal = match (&changes, last_signal_id) {
            (Some(report), Some(id)) => self.signals.get_mut(&id).and_then(|mut record| {
                record
                    .tracked
                    .annotate_changes(report.clone())
                    .then_some(id)
            }),
            _ => None,
        };

        if let Some(report) = &changes {
            info!(
                "Refresh for {}: price {:+.2}% significant={} indicators={:?}",
                key, report.price_delta_pct, report.significant_changes, report.indicators_changed
            );
        }

        Ok(RefreshReport {
            success: true,
            data_quality: snapshot.data_quality,
            changes,
            annotated_signal,
            timestamp: Utc::now(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    pub fn last_refreshed(&self, key: &SymbolKey) -> Option<DateTime<Utc>> {
        self.symbols.get(key).and_then(|s| s.last_refreshed)
    }

    pub fn get_signal(&self, signal_id: Uuid) -> Option<SignalView> {
        self.signals.get(&signal_id).map(|r| r.view())
    }

    fn view(&self, signal_id: Uuid) -> Result<SignalView, PipelineError> {
        self.get_signal(signal_id)
            .ok_or(PipelineError::SignalNotFound(signal_id))
    }

    /// Signals awaiting review, oldest first.
    pub fn pending_signals(&self) -> Vec<SignalView> {
        let mut pending: Vec<SignalView> = self
            .signals
            .iter()
            .filter(|r| r.tracked.status() == SignalStatus::PendingReview)
            .map(|r| r.view())
            .collect();
        pending.sort_by_key(|v| v.tracked.signal().created_at);
        pending
    }

    /// The chain `signal_id` belongs to, root first: ancestors through
    /// lineage, then successors through MODIFIED decisions.
    pub fn lineage(&self, signal_id: Uuid) -> Result<Vec<SignalView>, PipelineError> {
        let start = self.view(signal_id)?;

        let mut ancestors = Vec::new();
        let mut parent = start.tracked.signal().lineage.map(|l| l.parent_id);
        while let Some(id) = parent {
            let Some(view) = self.get_signal(id) else {
                break;
            };
            parent = view.tracked.signal().lineage.map(|l| l.parent_id);
            ancestors.push(view);
        }
        ancestors.reverse();

        let mut next = start.tracked.decision().and_then(|d| d.successor_id);
        ancestors.push(start);
        while let Some(id) = next {
            let Some(view) = self.get_signal(id) else {
                break;
            };
            next = view.tracked.decision().and_then(|d| d.successor_id);
            ancestors.push(view);
        }

        Ok(ancestors)
    }
}

struct SuccessorDraft {
    tracked: TrackedSignal,
    analysis: ComprehensiveAnalysis,
}
