use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::rollback::{RollbackEngine, RollbackTrigger};
use super::{GateRecord, GateStatus, PipelineState, Stage};
use crate::config::DriftConfig;
use crate::error::{GateError, Result};

/// Result of comparing a stage's lock-time checksum against the inputs as
/// they stand now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftCheck {
    pub stage: Stage,
    pub drifted: bool,
    pub stored_checksum: Option<u32>,
    pub current_checksum: u32,
}

/// Detects divergence between the inputs a stage was validated against and
/// their current state.
///
/// Advisory by default: callers decide what to do with a positive check.
/// With `auto_fix` configured, a mismatch invalidates the stage and every
/// dependent downstream of it.
pub struct DriftDetector {
    config: DriftConfig,
}

impl DriftDetector {
    pub fn new(config: DriftConfig) -> Self {
        Self { config }
    }

    pub fn auto_fix_enabled(&self) -> bool {
        self.config.auto_fix
    }

    /// Checksum over the gate-relevant input artifacts, in order. Each
    /// artifact is length-prefixed so boundary shifts between artifacts
    /// change the digest.
    pub fn checksum<A: AsRef<[u8]>>(artifacts: &[A]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for artifact in artifacts {
            let bytes = artifact.as_ref();
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        hasher.finalize()
    }

    /// Recompute the input checksum and compare against the one stored at
    /// lock time. Idempotent: repeated calls without a checksum-affecting
    /// mutation return the same result.
    pub fn check_drift<A: AsRef<[u8]>>(
        &self,
        state: &PipelineState,
        stage: Stage,
        current_inputs: &[A],
    ) -> Result<DriftCheck> {
        let record = state
            .latest_record(stage)
            .ok_or(GateError::RecordNotFound { stage })?;

        let current_checksum = Self::checksum(current_inputs);
        let drifted = record.checksum != Some(current_checksum);

        if drifted {
            warn!(
                work_item = %state.work_item_id,
                stage = %stage,
                stored = ?record.checksum,
                current = current_checksum,
                "Drift detected"
            );
        } else {
            debug!(stage = %stage, checksum = current_checksum, "No drift");
        }

        Ok(DriftCheck {
            stage,
            drifted,
            stored_checksum: record.checksum,
            current_checksum,
        })
    }

    /// Invalidate a drifted stage and cascade to its dependents.
    ///
    /// The stage goes to Blocked with its checksum cleared; every downstream
    /// stage is blocked with a reason naming this stage. The checksum is
    /// never regenerated here — that only happens when the stage is
    /// re-validated from scratch. Returns the full affected list, the
    /// drifted stage first.
    pub fn auto_fix(&self, state: &mut PipelineState, stage: Stage) -> Result<Vec<Stage>> {
        if state.latest_record(stage).is_none() {
            return Err(GateError::RecordNotFound { stage });
        }

        state.append(
            GateRecord::new(stage, GateStatus::Blocked)
                .with_reason("invalidated: inputs drifted since lock"),
        );
        let downstream = RollbackEngine::cascade_invalidate(
            state,
            stage,
            RollbackTrigger::DriftDetected,
            "inputs drifted since lock",
        );

        if state.current_stage > stage {
            state.current_stage = stage;
        }
        state.locked_at = None;

        let mut affected = vec![stage];
        affected.extend(downstream);
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_order_and_boundary_sensitive() {
        let a = DriftDetector::checksum(&["abc", "def"]);
        let b = DriftDetector::checksum(&["def", "abc"]);
        let c = DriftDetector::checksum(&["abcd", "ef"]);
        let d = DriftDetector::checksum(&["abc", "def"]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, d);
    }

    #[test]
    fn test_check_drift_idempotent() {
        let detector = DriftDetector::new(DriftConfig::default());
        let mut state = PipelineState::new("wi-1");
        let inputs = ["requirements v1"];
        let checksum = DriftDetector::checksum(&inputs);
        state.append(GateRecord::new(Stage::Research, GateStatus::Ready).with_checksum(checksum));

        let first = detector.check_drift(&state, Stage::Research, &inputs).unwrap();
        let second = detector.check_drift(&state, Stage::Research, &inputs).unwrap();
        assert!(!first.drifted);
        assert_eq!(first, second);
    }

    #[test]
    fn test_drift_on_changed_inputs() {
        let detector = DriftDetector::new(DriftConfig::default());
        let mut state = PipelineState::new("wi-1");
        let checksum = DriftDetector::checksum(&["requirements v1"]);
        state.append(GateRecord::new(Stage::Research, GateStatus::Ready).with_checksum(checksum));

        let check = detector
            .check_drift(&state, Stage::Research, &["requirements v2"])
            .unwrap();
        assert!(check.drifted);
        assert_eq!(check.stored_checksum, Some(checksum));
    }

    #[test]
    fn test_missing_lock_checksum_counts_as_drift() {
        let detector = DriftDetector::new(DriftConfig::default());
        let state = PipelineState::new("wi-1");
        // Initial Idle record has no checksum yet.
        let check = detector
            .check_drift(&state, Stage::Research, &["anything"])
            .unwrap();
        assert!(check.drifted);
        assert_eq!(check.stored_checksum, None);
    }

    #[test]
    fn test_auto_fix_clears_checksum_and_cascades() {
        let detector = DriftDetector::new(DriftConfig::default());
        let mut state = PipelineState::new("wi-1");
        state.append(GateRecord::new(Stage::Plan, GateStatus::Ready).with_checksum(7));
        state.current_stage = Stage::TestFirst;
        state.append(GateRecord::new(Stage::TestFirst, GateStatus::Idle));

        let affected = detector.auto_fix(&mut state, Stage::Plan).unwrap();

        assert_eq!(affected[0], Stage::Plan);
        assert_eq!(affected.len(), 1 + Stage::Plan.downstream().len());
        let record = state.latest_record(Stage::Plan).unwrap();
        assert_eq!(record.status, GateStatus::Blocked);
        assert_eq!(record.checksum, None);
        assert_eq!(state.current_stage, Stage::Plan);
    }
}
