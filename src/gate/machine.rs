use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::criteria::{Decision, DecisionContext, ValidationOutcome, evaluate_hold, evaluate_kill};
use super::drift::DriftDetector;
use super::rollback::{RollbackEngine, RollbackResult, RollbackTrigger};
use super::{GateRecord, GateStatus, PipelineState, Stage};
use crate::config::GateConfig;
use crate::error::{GateError, Result};
use crate::notification::{GateEventType, PipelineEvent};

/// What an accepted transition request means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRequest {
    /// Move to the next stage after validating the current one.
    Advance,
    /// Re-validate the current stage in place.
    Revalidate,
}

/// Outcome of evaluating a validation result against the decision
/// algorithm. `Decided` carries a decision to record; the other variants
/// are statuses that resolve later (review) or invite a retry (blocked).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "adjudication", rename_all = "snake_case")]
pub enum Adjudication {
    Decided(Decision),
    PendingReview,
    Blocked { errors: Vec<String>, can_retry: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Approved,
    Rejected,
    Bypassed,
}

/// The sequential pipeline controller for one work item.
///
/// Owns `PipelineState` exclusively. All decide-and-mutate sequences run on
/// `&mut self`, so a shared machine must sit behind a single lock
/// (`SharedGateMachine`); independent work items get independent machines
/// and never contend.
pub struct GateStateMachine {
    state: PipelineState,
    config: GateConfig,
    events: Vec<PipelineEvent>,
}

/// Single-writer handle for a machine shared between workers.
pub type SharedGateMachine = Arc<Mutex<GateStateMachine>>;

impl GateStateMachine {
    pub fn new(work_item_id: impl Into<String>, config: GateConfig) -> Self {
        Self {
            state: PipelineState::new(work_item_id),
            config,
            events: Vec::new(),
        }
    }

    /// Rehydrate from persisted state.
    pub fn from_state(state: PipelineState, config: GateConfig) -> Self {
        Self {
            state,
            config,
            events: Vec::new(),
        }
    }

    pub fn shared(self) -> SharedGateMachine {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn into_state(self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn current_stage(&self) -> Stage {
        self.state.current_stage
    }

    /// Queued outbound events since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<PipelineEvent> {
        std::mem::take(&mut self.events)
    }

    fn push_event(&mut self, event: PipelineEvent) {
        self.events.push(event);
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.state.is_killed() {
            return Err(GateError::PipelineKilled {
                stage: self.state.killed_at().unwrap_or(self.state.current_stage),
            });
        }
        Ok(())
    }

    /// Validate a transition request against the sequencing invariants.
    ///
    /// Accepts the next stage (advance) or the current stage (idempotent
    /// re-validation); anything else fails with no side effects.
    pub fn request_transition(&self, target: Stage) -> Result<TransitionRequest> {
        self.ensure_alive()?;
        let current = self.state.current_stage;

        if target == current {
            return Ok(TransitionRequest::Revalidate);
        }
        if Some(target) == current.next() {
            return Ok(TransitionRequest::Advance);
        }
        if target < current {
            return Err(GateError::BackwardTransition {
                from: current,
                to: target,
            });
        }
        Err(GateError::SequenceViolation {
            from: current,
            to: target,
            skipped: current.stages_between(target),
        })
    }

    /// True when the pipeline is not where the caller expects it to be.
    pub fn get_drift(&self, expected: Stage) -> bool {
        self.state.current_stage != expected
    }

    /// The decision algorithm, evaluated for the current stage. Pure: no
    /// state mutation, callers apply the result via `adjudicate` or
    /// `record_decision`.
    ///
    /// Kill criteria run first and always win. Hold criteria run second;
    /// at a stage configured without Hold they escalate to Blocked rather
    /// than silently advancing. Rework with a prior retry recycles. A pass
    /// goes straight through or parks for review, per stage configuration.
    pub fn evaluate(&self, outcome: &ValidationOutcome, context: &DecisionContext) -> Adjudication {
        let stage = self.state.current_stage;

        if let Some(criterion) = evaluate_kill(outcome, context, &self.config) {
            return Adjudication::Decided(Decision::kill(criterion.reason()));
        }

        let held = evaluate_hold(context, &self.config);
        if !held.is_empty() {
            let reasons: Vec<String> = held.iter().map(|c| c.reason().to_string()).collect();
            if self.config.allows_hold(stage) {
                return Adjudication::Decided(Decision::hold(reasons));
            }
            return Adjudication::Blocked {
                errors: reasons,
                can_retry: outcome.retry_count < self.config.max_retries,
            };
        }

        if outcome.requires_rework && outcome.retry_count > 0 {
            let target = outcome
                .recycle_target
                .or_else(|| Stage::from_index(stage.index().saturating_sub(1)))
                .unwrap_or(Stage::Research);
            return Adjudication::Decided(Decision::Recycle { target });
        }

        if outcome.passed {
            if self.config.requires_review(stage) {
                return Adjudication::PendingReview;
            }
            return Adjudication::Decided(Decision::Go);
        }

        Adjudication::Blocked {
            errors: outcome.errors.clone(),
            can_retry: outcome.retry_count < self.config.max_retries,
        }
    }

    /// Evaluate a validation result and commit the outcome in one step.
    ///
    /// The whole mutation happens here, after validation has already
    /// completed: a cancelled validation never touches `PipelineState`.
    pub fn adjudicate(
        &mut self,
        outcome: &ValidationOutcome,
        context: &DecisionContext,
    ) -> Result<Adjudication> {
        self.adjudicate_with_lock(outcome, context, None)
    }

    /// As `adjudicate`, locking the stage against `checksum` on Go or
    /// PendingReview so the drift detector has a baseline.
    pub fn adjudicate_with_lock(
        &mut self,
        outcome: &ValidationOutcome,
        context: &DecisionContext,
        checksum: Option<u32>,
    ) -> Result<Adjudication> {
        self.ensure_alive()?;
        let stage = self.state.current_stage;

        // The attempt itself is part of the audit trail.
        self.state.append(
            GateRecord::new(stage, GateStatus::Validating)
                .with_retry_count(outcome.retry_count),
        );

        let adjudication = self.evaluate(outcome, context);
        debug!(
            work_item = %self.state.work_item_id,
            stage = %stage,
            adjudication = ?adjudication,
            "Gate adjudicated"
        );

        match &adjudication {
            Adjudication::Decided(decision) => {
                self.record_decision_with(
                    stage,
                    decision.clone(),
                    checksum,
                    outcome.author.clone(),
                )?;
            }
            Adjudication::PendingReview => {
                let mut record = GateRecord::new(stage, GateStatus::PendingReview)
                    .with_retry_count(outcome.retry_count);
                record.checksum = checksum;
                record.author = outcome.author.clone();
                self.state.append(record);
                self.push_event(PipelineEvent::new(
                    GateEventType::PendingReview,
                    &self.state.work_item_id,
                    stage,
                ));
            }
            Adjudication::Blocked { errors, can_retry } => {
                self.state.append(
                    GateRecord::new(stage, GateStatus::Blocked)
                        .with_retry_count(outcome.retry_count.saturating_add(1))
                        .with_reason(errors.join("; ")),
                );
                let event =
                    PipelineEvent::new(GateEventType::Blocked, &self.state.work_item_id, stage)
                        .with_reason(format!(
                            "{} (can_retry: {})",
                            errors.join("; "),
                            can_retry
                        ));
                self.push_event(event);
            }
        }

        Ok(adjudication)
    }

    /// Record a Blocked status for the current stage outside the decision
    /// algorithm, e.g. when an external validator timed out. A timed-out
    /// transition must fail as Blocked with the timeout reason, never
    /// resolve as Go.
    pub fn block_current(&mut self, reason: impl Into<String>) -> Adjudication {
        let stage = self.state.current_stage;
        let reason = reason.into();
        let retry_count = self.state.current_retry_count();
        let can_retry = retry_count < self.config.max_retries;

        self.state.append(
            GateRecord::new(stage, GateStatus::Blocked)
                .with_retry_count(retry_count.saturating_add(1))
                .with_reason(reason.clone()),
        );
        let event = PipelineEvent::new(GateEventType::Blocked, &self.state.work_item_id, stage)
            .with_reason(reason.clone());
        self.push_event(event);

        Adjudication::Blocked {
            errors: vec![reason],
            can_retry,
        }
    }

    /// Record a decision for the current stage.
    pub fn record_decision(&mut self, stage: Stage, decision: Decision) -> Result<()> {
        self.record_decision_with(stage, decision, None, None)
    }

    pub fn record_decision_with(
        &mut self,
        stage: Stage,
        decision: Decision,
        checksum: Option<u32>,
        author: Option<String>,
    ) -> Result<()> {
        self.ensure_alive()?;
        if stage != self.state.current_stage {
            return Err(GateError::DecisionStageMismatch {
                current: self.state.current_stage,
                stage,
            });
        }

        match decision {
            Decision::Go => self.apply_go(stage, checksum, author),
            Decision::Kill { reason } => self.apply_kill(stage, reason),
            Decision::Hold { reasons } => self.apply_hold(stage, reasons),
            Decision::Recycle { target } => self.apply_recycle(stage, target)?,
        }
        Ok(())
    }

    fn apply_go(&mut self, stage: Stage, checksum: Option<u32>, author: Option<String>) {
        let mut record = GateRecord::new(stage, GateStatus::Ready);
        record.checksum = checksum;
        record.author = author;
        self.state.append(record);
        self.state.locked_at = Some(Utc::now());

        if let Some(next) = stage.next() {
            self.state.current_stage = next;
            self.state.append(GateRecord::new(next, GateStatus::Idle));
            info!(
                work_item = %self.state.work_item_id,
                from = %stage,
                to = %next,
                "Gate passed, pipeline advanced"
            );
        } else {
            info!(
                work_item = %self.state.work_item_id,
                stage = %stage,
                "Final gate passed, pipeline complete"
            );
        }

        let event = PipelineEvent::new(GateEventType::Go, &self.state.work_item_id, stage);
        self.push_event(event);
    }

    fn apply_kill(&mut self, stage: Stage, reason: String) {
        warn!(
            work_item = %self.state.work_item_id,
            stage = %stage,
            reason = %reason,
            "Pipeline killed"
        );
        self.state
            .append(GateRecord::new(stage, GateStatus::Killed).with_reason(reason.clone()));
        let event = PipelineEvent::new(GateEventType::Kill, &self.state.work_item_id, stage)
            .with_reason(reason);
        self.push_event(event);
    }

    fn apply_hold(&mut self, stage: Stage, reasons: Vec<String>) {
        let retry_count = self.state.current_retry_count();
        let reason = reasons.join("; ");

        if !self.config.allows_hold(stage) {
            // No-hold stages never pause silently; the pause becomes an
            // explicit block the operator has to clear.
            self.state.append(
                GateRecord::new(stage, GateStatus::Blocked)
                    .with_retry_count(retry_count)
                    .with_reason(format!("hold not permitted at {}: {}", stage, reason)),
            );
            let event =
                PipelineEvent::new(GateEventType::Blocked, &self.state.work_item_id, stage)
                    .with_reason(reason);
            self.push_event(event);
            return;
        }

        self.state.append(
            GateRecord::new(stage, GateStatus::Hold)
                .with_retry_count(retry_count)
                .with_reason(reason.clone()),
        );
        let event = PipelineEvent::new(GateEventType::Hold, &self.state.work_item_id, stage)
            .with_reason(reason);
        self.push_event(event);
    }

    fn apply_recycle(&mut self, stage: Stage, target: Stage) -> Result<()> {
        if target >= stage {
            return Err(GateError::InvalidRecycleTarget {
                current: stage,
                target,
            });
        }

        self.state.recycle_count += 1;
        self.state.append(
            GateRecord::new(stage, GateStatus::Recycle)
                .with_reason(format!("recycled to {}", target)),
        );

        // The only sanctioned backward movement: the target is redone from
        // Idle and everything validated on top of it is invalidated.
        self.state.append(
            GateRecord::new(target, GateStatus::Idle)
                .with_reason(format!("recycle target (from {})", stage)),
        );
        let affected = RollbackEngine::cascade_invalidate(
            &mut self.state,
            target,
            RollbackTrigger::Recycle,
            "recycled for rework",
        );
        self.state.current_stage = target;
        self.state.locked_at = None;

        info!(
            work_item = %self.state.work_item_id,
            from = %stage,
            target = %target,
            recycle_count = self.state.recycle_count,
            "Pipeline recycled"
        );

        let event = PipelineEvent::new(GateEventType::Recycle, &self.state.work_item_id, stage)
            .with_reason(format!("recycled to {}", target))
            .with_affected_stages(affected);
        self.push_event(event);
        Ok(())
    }

    /// Resolve a pending human review.
    ///
    /// The independence check lives here, not in the caller: on stages
    /// configured for independent verification the reviewer must differ
    /// from the identity that produced the work.
    pub fn resolve_review(
        &mut self,
        stage: Stage,
        outcome: ReviewOutcome,
        reviewer: &str,
    ) -> Result<Decision> {
        self.ensure_alive()?;
        let record = self
            .state
            .latest_record(stage)
            .ok_or(GateError::RecordNotFound { stage })?;
        if record.status != GateStatus::PendingReview {
            return Err(GateError::NoPendingReview { stage });
        }

        if self.config.requires_independent_review(stage)
            && record.author.as_deref() == Some(reviewer)
        {
            return Err(GateError::ReviewerNotIndependent {
                stage,
                reviewer: reviewer.to_string(),
            });
        }

        let checksum = record.checksum;
        let author = record.author.clone();

        let decision = match outcome {
            ReviewOutcome::Approved | ReviewOutcome::Bypassed => Decision::Go,
            ReviewOutcome::Rejected => Decision::kill(format!("review rejected by {}", reviewer)),
        };
        self.record_decision_with(stage, decision.clone(), checksum, author)?;
        Ok(decision)
    }

    /// Confirmation-gated reset back to the initial stage. History is
    /// retained in full for audit; only the cursor and counters reset.
    pub fn reset(&mut self, confirm: bool) -> Result<()> {
        if !confirm {
            return Err(GateError::ConfirmationRequired);
        }

        let previous = self.state.current_stage;
        self.state.current_stage = Stage::Research;
        self.state.locked_at = None;
        self.state.recycle_count = 0;
        self.state.append(GateRecord::reset_marker(Stage::Research));

        info!(
            work_item = %self.state.work_item_id,
            from = %previous,
            "Pipeline reset"
        );
        let event = PipelineEvent::new(GateEventType::Reset, &self.state.work_item_id, previous);
        self.push_event(event);
        Ok(())
    }

    /// Manual rollback with event emission.
    pub fn rollback(
        &mut self,
        stage: Stage,
        trigger: RollbackTrigger,
        reason: impl Into<String>,
    ) -> Result<RollbackResult> {
        self.ensure_alive()?;
        let result = RollbackEngine::rollback(&mut self.state, stage, trigger, reason)?;
        let event = PipelineEvent::new(GateEventType::Rollback, &self.state.work_item_id, stage)
            .with_reason(result.reason.clone())
            .with_affected_stages(result.affected_stages.clone());
        self.push_event(event);
        Ok(result)
    }

    /// Drift check with the configured policy applied: advisory by
    /// default, cascading invalidation when auto-fix is enabled. Returns
    /// the affected stages when a fix ran.
    pub fn check_and_fix_drift<A: AsRef<[u8]>>(
        &mut self,
        detector: &DriftDetector,
        stage: Stage,
        current_inputs: &[A],
    ) -> Result<Option<Vec<Stage>>> {
        self.ensure_alive()?;
        let check = detector.check_drift(&self.state, stage, current_inputs)?;
        if !check.drifted {
            return Ok(None);
        }

        let event =
            PipelineEvent::new(GateEventType::DriftDetected, &self.state.work_item_id, stage)
                .with_reason(format!(
                    "stored {:?}, current {}",
                    check.stored_checksum, check.current_checksum
                ));
        self.push_event(event);

        if !detector.auto_fix_enabled() {
            return Ok(None);
        }

        let affected = detector.auto_fix(&mut self.state, stage)?;
        let event = PipelineEvent::new(GateEventType::Rollback, &self.state.work_item_id, stage)
            .with_reason("drift auto-fix")
            .with_affected_stages(affected.clone());
        self.push_event(event);
        Ok(Some(affected))
    }
}
