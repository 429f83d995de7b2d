use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{GateRecord, GateStatus, PipelineState, Stage};
use crate::error::{GateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackTrigger {
    DriftDetected,
    Recycle,
    Manual,
}

impl RollbackTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DriftDetected => "drift_detected",
            Self::Recycle => "recycle",
            Self::Manual => "manual",
        }
    }
}

/// Audit record of one rollback: the reverted stage and the full blast
/// radius of downstream invalidation, never just the triggering stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResult {
    pub stage: Stage,
    pub trigger: RollbackTrigger,
    pub reason: String,
    pub affected_stages: Vec<Stage>,
    pub rolled_back_at: DateTime<Utc>,
}

/// Reverts gate state and cascades invalidation to dependent stages.
///
/// Dependents are the transitive closure under the fixed stage ordering:
/// every later stage was validated against this stage's outputs. The
/// correctness property: after a rollback, no later stage is left Ready
/// while an earlier stage it depends on is Idle or Blocked.
pub struct RollbackEngine;

impl RollbackEngine {
    /// A stage can only be rolled back out of advanced work. Killed and
    /// Blocked records are already not advanced.
    pub fn can_rollback(state: &PipelineState, stage: Stage) -> Result<()> {
        match state.status_of(stage) {
            Some(status) if status.is_rollbackable() => Ok(()),
            Some(status) => Err(GateError::RollbackNotPermitted { stage, status }),
            None => Err(GateError::RecordNotFound { stage }),
        }
    }

    pub fn rollback(
        state: &mut PipelineState,
        stage: Stage,
        trigger: RollbackTrigger,
        reason: impl Into<String>,
    ) -> Result<RollbackResult> {
        Self::can_rollback(state, stage)?;
        let reason = reason.into();

        state.append(
            GateRecord::new(stage, GateStatus::Idle)
                .with_reason(format!("rolled back ({}): {}", trigger.as_str(), reason)),
        );
        let affected = Self::cascade_invalidate(state, stage, trigger, &reason);

        if state.current_stage > stage {
            state.current_stage = stage;
        }
        state.locked_at = None;

        info!(
            work_item = %state.work_item_id,
            stage = %stage,
            trigger = trigger.as_str(),
            affected = affected.len(),
            "Rollback complete"
        );

        Ok(RollbackResult {
            stage,
            trigger,
            reason,
            affected_stages: affected,
            rolled_back_at: Utc::now(),
        })
    }

    /// Append a Blocked record for every stage after `from`, each reason
    /// naming the stage that triggered the invalidation. Returns the
    /// affected list for audit and notification.
    pub(crate) fn cascade_invalidate(
        state: &mut PipelineState,
        from: Stage,
        trigger: RollbackTrigger,
        reason: &str,
    ) -> Vec<Stage> {
        let downstream = from.downstream();
        for dependent in &downstream {
            state.append(GateRecord::new(*dependent, GateStatus::Blocked).with_reason(format!(
                "invalidated by {} at {}: {}",
                trigger.as_str(),
                from,
                reason
            )));
        }
        downstream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advanced_state() -> PipelineState {
        let mut state = PipelineState::new("wi-1");
        state.append(GateRecord::new(Stage::Research, GateStatus::Ready));
        state.append(GateRecord::new(Stage::Plan, GateStatus::Ready));
        state.append(GateRecord::new(Stage::TestFirst, GateStatus::Ready));
        state.current_stage = Stage::Branch;
        state.append(GateRecord::new(Stage::Branch, GateStatus::Idle));
        state
    }

    #[test]
    fn test_rollback_blocks_every_downstream_stage() {
        let mut state = advanced_state();
        let result =
            RollbackEngine::rollback(&mut state, Stage::Plan, RollbackTrigger::Manual, "stale")
                .unwrap();

        assert_eq!(state.status_of(Stage::Plan), Some(GateStatus::Idle));
        assert_eq!(result.affected_stages, Stage::Plan.downstream());
        for stage in &result.affected_stages {
            assert_eq!(state.status_of(*stage), Some(GateStatus::Blocked));
        }
        assert_eq!(state.current_stage, Stage::Plan);
    }

    #[test]
    fn test_no_ready_stage_survives_past_rollback_point() {
        let mut state = advanced_state();
        RollbackEngine::rollback(&mut state, Stage::Research, RollbackTrigger::Manual, "redo")
            .unwrap();
        for stage in Stage::Research.downstream() {
            assert_ne!(state.status_of(stage), Some(GateStatus::Ready));
        }
    }

    #[test]
    fn test_cannot_rollback_blocked_or_killed() {
        let mut state = PipelineState::new("wi-1");
        state.append(GateRecord::new(Stage::Research, GateStatus::Blocked));
        assert!(matches!(
            RollbackEngine::rollback(&mut state, Stage::Research, RollbackTrigger::Manual, "x"),
            Err(GateError::RollbackNotPermitted { .. })
        ));

        state.append(GateRecord::new(Stage::Research, GateStatus::Killed));
        assert!(RollbackEngine::can_rollback(&state, Stage::Research).is_err());
    }

    #[test]
    fn test_rollback_never_entered_stage_fails() {
        let state = PipelineState::new("wi-1");
        assert!(matches!(
            RollbackEngine::can_rollback(&state, Stage::Implement),
            Err(GateError::RecordNotFound { .. })
        ));
    }
}
