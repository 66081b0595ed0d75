use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_core::{
    ApprovalDecision, ChangeReport, DecisionOutcome, SignalAdjustments, SignalStatus, TradeSignal,
};
use tracing::info;
use uuid::Uuid;

use crate::error::LifecycleError;

/// Refresh diffs kept per signal; older ones are dropped first.
pub const MAX_CHANGE_ANNOTATIONS: usize = 20;

/// Current state of one signal instance. Terminal states own their decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalLifecycle {
    Generated,
    PendingReview { since: DateTime<Utc> },
    Approved { decision: ApprovalDecision },
    Rejected { decision: ApprovalDecision },
    Modified { decision: ApprovalDecision, successor_id: Uuid },
}

impl SignalLifecycle {
    pub fn status(&self) -> SignalStatus {
        match self {
            SignalLifecycle::Generated => SignalStatus::Generated,
            SignalLifecycle::PendingReview { .. } => SignalStatus::PendingReview,
            SignalLifecycle::Approved { .. } => SignalStatus::Approved,
            SignalLifecycle::Rejected { .. } => SignalStatus::Rejected,
            SignalLifecycle::Modified { .. } => SignalStatus::Modified,
        }
    }

    pub fn decision(&self) -> Option<&ApprovalDecision> {
        match self {
            SignalLifecycle::Approved { decision }
            | SignalLifecycle::Rejected { decision }
            | SignalLifecycle::Modified { decision, .. } => Some(decision),
            SignalLifecycle::Generated | SignalLifecycle::PendingReview { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.decision().is_some()
    }
}

/// A reviewer's disposition of a pending signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
    Modify {
        #[serde(default)]
        adjustments: SignalAdjustments,
    },
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewAction::Approve => "approve",
            ReviewAction::Reject => "reject",
            ReviewAction::Modify { .. } => "modify",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub from: Option<SignalStatus>,
    pub to: SignalStatus,
    pub at: DateTime<Utc>,
}

/// Whether the decision made on a signal has reached the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PersistenceStatus {
    /// No decision yet
    NotRequired,
    Pending,
    Persisted { at: DateTime<Utc> },
    Failed { reason: String, attempts: u32 },
}

/// A signal plus its lifecycle, audit trail and refresh annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedSignal {
    signal: TradeSignal,
    state: SignalLifecycle,
    history: Vec<StateChange>,
    change_annotations: Vec<ChangeReport>,
    persistence: PersistenceStatus,
}

impl TrackedSignal {
    /// Enters `Generated`. Only a completed pipeline run may call this.
    pub fn generated(signal: TradeSignal) -> Self {
        info!("Signal {} generated for {}", signal.id, signal.key());
        Self {
            history: vec![StateChange {
                from: None,
                to: SignalStatus::Generated,
                at: signal.created_at,
            }],
            signal,
            state: SignalLifecycle::Generated,
            change_annotations: Vec::new(),
            persistence: PersistenceStatus::NotRequired,
        }
    }

    /// `Generated` followed immediately by `PendingReview`.
    pub fn pending(signal: TradeSignal) -> Self {
        let mut tracked = Self::generated(signal);
        tracked.state = SignalLifecycle::PendingReview { since: Utc::now() };
        tracked.record(SignalStatus::Generated, SignalStatus::PendingReview);
        tracked
    }

    pub fn submit_for_review(&mut self) -> Result<(), LifecycleError> {
        if self.state != SignalLifecycle::Generated {
            return Err(self.invalid("submit"));
        }
        self.state = SignalLifecycle::PendingReview { since: Utc::now() };
        self.record(SignalStatus::Generated, SignalStatus::PendingReview);
        Ok(())
    }

    pub fn approve(&mut self, reason: Option<String>) -> Result<ApprovalDecision, LifecycleError> {
        let decision = self.decide(DecisionOutcome::Approved, reason, None, "approve")?;
        self.state = SignalLifecycle::Approved {
            decision: decision.clone(),
        };
        self.record(SignalStatus::PendingReview, SignalStatus::Approved);
        Ok(decision)
    }

    pub fn reject(&mut self, reason: Option<String>) -> Result<ApprovalDecision, LifecycleError> {
        let decision = self.decide(DecisionOutcome::Rejected, reason, None, "reject")?;
        self.state = SignalLifecycle::Rejected {
            decision: decision.clone(),
        };
        self.record(SignalStatus::PendingReview, SignalStatus::Rejected);
        Ok(decision)
    }

    /// Supersedes this signal with `successor`, which must name it as parent.
    pub fn modify(
        &mut self,
        successor: &TradeSignal,
        reason: Option<String>,
    ) -> Result<ApprovalDecision, LifecycleError> {
        self.ensure_reviewable("modify")?;
        if successor.lineage.map(|l| l.parent_id) != Some(self.signal.id) {
            return Err(LifecycleError::LineageMismatch {
                signal_id: self.signal.id,
                successor_id: successor.id,
            });
        }

        let decision = self.decide(
            DecisionOutcome::Modified,
            reason,
            Some(successor.id),
            "modify",
        )?;
        self.state = SignalLifecycle::Modified {
            decision: decision.clone(),
            successor_id: successor.id,
        };
        self.record(SignalStatus::PendingReview, SignalStatus::Modified);
        Ok(decision)
    }

    /// Fails unless a reviewer may still act on this signal.
    pub fn ensure_reviewable(&self, action: &str) -> Result<(), LifecycleError> {
        if self.state.status() != SignalStatus::PendingReview {
            return Err(self.invalid(action));
        }
        Ok(())
    }

    /// Builds the decision after checking the signal is still under review.
    /// State is untouched on error.
    fn decide(
        &mut self,
        outcome: DecisionOutcome,
        reason: Option<String>,
        successor_id: Option<Uuid>,
        action: &str,
    ) -> Result<ApprovalDecision, LifecycleError> {
        self.ensure_reviewable(action)?;
        self.persistence = PersistenceStatus::Pending;
        Ok(ApprovalDecision {
            signal_id: self.signal.id,
            outcome,
            reason: reason.filter(|r| !r.trim().is_empty()),
            successor_id,
            timestamp: Utc::now(),
        })
    }

    fn invalid(&self, action: &str) -> LifecycleError {
        LifecycleError::InvalidStateTransition {
            signal_id: self.signal.id,
            from: self.state.status(),
            action: action.to_string(),
        }
    }

    fn record(&mut self, from: SignalStatus, to: SignalStatus) {
        info!("Signal {} {} -> {}", self.signal.id, from, to);
        self.history.push(StateChange {
            from: Some(from),
            to,
            at: Utc::now(),
        });
    }

    /// Attaches a refresh diff. Only a signal still under review is annotated.
    pub fn annotate_changes(&mut self, report: ChangeReport) -> bool {
        if self.state.status() != SignalStatus::PendingReview {
            return false;
        }
        self.change_annotations.push(report);
        if self.change_annotations.len() > MAX_CHANGE_ANNOTATIONS {
            let excess = self.change_annotations.len() - MAX_CHANGE_ANNOTATIONS;
            self.change_annotations.drain(..excess);
        }
        true
    }

    pub fn mark_persisted(&mut self) -> Result<(), LifecycleError> {
        if self.state.decision().is_none() {
            return Err(LifecycleError::NoDecision(self.signal.id));
        }
        self.persistence = PersistenceStatus::Persisted { at: Utc::now() };
        Ok(())
    }

    pub fn mark_persistence_failed(
        &mut self,
        reason: impl Into<String>,
    ) -> Result<(), LifecycleError> {
        if self.state.decision().is_none() {
            return Err(LifecycleError::NoDecision(self.signal.id));
        }
        let attempts = match &self.persistence {
            PersistenceStatus::Failed { attempts, .. } => attempts + 1,
            _ => 1,
        };
        self.persistence = PersistenceStatus::Failed {
            reason: reason.into(),
            attempts,
        };
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.signal.id
    }

    pub fn signal(&self) -> &TradeSignal {
        &self.signal
    }

    pub fn state(&self) -> &SignalLifecycle {
        &self.state
    }

    pub fn status(&self) -> SignalStatus {
        self.state.status()
    }

    pub fn decision(&self) -> Option<&ApprovalDecision> {
        self.state.decision()
    }

    pub fn history(&self) -> &[StateChange] {
        &self.history
    }

    pub fn change_annotations(&self) -> &[ChangeReport] {
        &self.change_annotations
    }

    pub fn has_changes(&self) -> bool {
        self.change_annotations.iter().any(|c| c.significant_changes)
    }

    pub fn persistence(&self) -> &PersistenceStatus {
        &self.persistence
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self.persistence, PersistenceStatus::Persisted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use signal_core::{
        Confidence, Lineage, PositionType, QualityFlag, TakeProfitLadder, Timeframe,
    };

    fn signal() -> TradeSignal {
        TradeSignal {
            id: Uuid::new_v4(),
            symbol: "ETHUSDT".to_string(),
            timeframe: Timeframe::Hour1,
            position_type: PositionType::Long,
            entry: dec!(3000),
            stop_loss: dec!(2940),
            take_profits: TakeProfitLadder::from_prices([dec!(3090), dec!(3150), dec!(3240)]),
            confidence: Confidence {
                overall: 72.0,
                technical: 75.0,
                sentiment: 70.0,
                on_chain: 68.0,
                risk: 75.0,
            },
            risk_reward: 2.3,
            position_size: dec!(3.33333333),
            max_loss: dec!(200),
            data_quality: 95.0,
            quality_flag: QualityFlag::Sufficient,
            lineage: None,
            created_at: Utc::now(),
        }
    }

    fn successor_of(parent: &TradeSignal) -> TradeSignal {
        TradeSignal {
            id: Uuid::new_v4(),
            entry: dec!(2980),
            lineage: Some(Lineage::descend_from(parent)),
            ..parent.clone()
        }
    }

    fn report(significant: bool) -> ChangeReport {
        ChangeReport {
            price_changed: significant,
            price_delta: 20.0,
            price_delta_pct: 0.67,
            indicators_changed: vec![],
            sentiment_changed: false,
            on_chain_changed: false,
            significant_changes: significant,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_pending_passes_through_generated() {
        let tracked = TrackedSignal::pending(signal());
        assert_eq!(tracked.status(), SignalStatus::PendingReview);
        let path: Vec<_> = tracked.history().iter().map(|h| h.to).collect();
        assert_eq!(path, vec![SignalStatus::Generated, SignalStatus::PendingReview]);
        assert_eq!(tracked.persistence(), &PersistenceStatus::NotRequired);
    }

    #[test]
    fn test_approve_produces_one_decision() {
        let mut tracked = TrackedSignal::pending(signal());
        let decision = tracked.approve(Some("clean setup".to_string())).unwrap();

        assert_eq!(decision.outcome, DecisionOutcome::Approved);
        assert_eq!(decision.signal_id, tracked.id());
        assert_eq!(decision.reason.as_deref(), Some("clean setup"));
        assert_eq!(tracked.status(), SignalStatus::Approved);
        assert_eq!(tracked.decision(), Some(&decision));
        assert_eq!(tracked.persistence(), &PersistenceStatus::Pending);
    }

    #[test]
    fn test_terminal_states_reject_further_transitions() {
        let mut approved = TrackedSignal::pending(signal());
        approved.approve(None).unwrap();
        let mut rejected = TrackedSignal::pending(signal());
        rejected.reject(Some("late entry".to_string())).unwrap();
        let mut modified = TrackedSignal::pending(signal());
        let successor = successor_of(modified.signal());
        modified.modify(&successor, None).unwrap();

        for tracked in [&mut approved, &mut rejected, &mut modified] {
            let before = tracked.state().clone();
            let history_len = tracked.history().len();
            let stray_successor = successor_of(tracked.signal());

            assert!(matches!(
                tracked.approve(None),
                Err(LifecycleError::InvalidStateTransition { .. })
            ));
            assert!(matches!(
                tracked.reject(None),
                Err(LifecycleError::InvalidStateTransition { .. })
            ));
            assert!(matches!(
                tracked.modify(&stray_successor, None),
                Err(LifecycleError::InvalidStateTransition { .. })
            ));
            assert!(tracked.submit_for_review().is_err());

            assert_eq!(tracked.state(), &before);
            assert_eq!(tracked.history().len(), history_len);
        }
    }

    #[test]
    fn test_generated_cannot_be_decided() {
        let mut tracked = TrackedSignal::generated(signal());
        let err = tracked.approve(None).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidStateTransition {
                signal_id: tracked.id(),
                from: SignalStatus::Generated,
                action: "approve".to_string(),
            }
        );
        tracked.submit_for_review().unwrap();
        assert!(tracked.approve(None).is_ok());
    }

    #[test]
    fn test_modify_links_successor() {
        let mut tracked = TrackedSignal::pending(signal());
        let successor = successor_of(tracked.signal());
        let decision = tracked.modify(&successor, Some("tighter entry".to_string())).unwrap();

        assert_eq!(decision.outcome, DecisionOutcome::Modified);
        assert_eq!(decision.successor_id, Some(successor.id));
        match tracked.state() {
            SignalLifecycle::Modified { successor_id, .. } => assert_eq!(*successor_id, successor.id),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_modify_requires_lineage() {
        let mut tracked = TrackedSignal::pending(signal());
        let unrelated = signal();
        assert!(matches!(
            tracked.modify(&unrelated, None),
            Err(LifecycleError::LineageMismatch { .. })
        ));
        assert_eq!(tracked.status(), SignalStatus::PendingReview);
    }

    #[test]
    fn test_annotations_only_while_pending() {
        let mut tracked = TrackedSignal::pending(signal());
        assert!(tracked.annotate_changes(report(false)));
        assert!(!tracked.has_changes());
        assert!(tracked.annotate_changes(report(true)));
        assert!(tracked.has_changes());

        tracked.reject(None).unwrap();
        assert!(!tracked.annotate_changes(report(true)));
        assert_eq!(tracked.change_annotations().len(), 2);
    }

    #[test]
    fn test_annotations_keep_only_latest() {
        let mut tracked = TrackedSignal::pending(signal());
        for _ in 0..MAX_CHANGE_ANNOTATIONS {
            assert!(tracked.annotate_changes(report(false)));
        }
        assert!(tracked.annotate_changes(report(true)));

        let kept = tracked.change_annotations();
        assert_eq!(kept.len(), MAX_CHANGE_ANNOTATIONS);
        assert!(kept.last().unwrap().significant_changes);
        assert!(tracked.has_changes());
    }

    #[test]
    fn test_persistence_tracking() {
        let mut tracked = TrackedSignal::pending(signal());
        assert!(tracked.mark_persisted().is_err());

        tracked.approve(None).unwrap();
        tracked.mark_persistence_failed("db locked").unwrap();
        tracked.mark_persistence_failed("db locked").unwrap();
        assert_eq!(
            tracked.persistence(),
            &PersistenceStatus::Failed {
                reason: "db locked".to_string(),
                attempts: 2
            }
        );

        tracked.mark_persisted().unwrap();
        assert!(tracked.is_persisted());
        assert_eq!(tracked.status(), SignalStatus::Approved);
    }

    #[test]
    fn test_review_action_wire_format() {
        let action: ReviewAction = serde_json::from_str(r#"{"action":"approve"}"#).unwrap();
        assert_eq!(action, ReviewAction::Approve);

        let action: ReviewAction = serde_json::from_str(
            r#"{"action":"modify","adjustments":{"entry":2980,"stopLoss":"2920"}}"#,
        )
        .unwrap();
        match action {
            ReviewAction::Modify { adjustments } => {
                assert_eq!(adjustments.entry, Some(dec!(2980)));
                assert_eq!(adjustments.stop_loss, Some(dec!(2920)));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }
}
