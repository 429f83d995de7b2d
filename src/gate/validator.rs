use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::criteria::{DecisionContext, ValidationOutcome};
use super::machine::{Adjudication, SharedGateMachine};
use super::stage::Stage;
use crate::error::Result;

/// External validation backing a transition request: build/test runners,
/// safety scorers, anything that decides whether a stage's work holds up.
#[async_trait]
pub trait StageValidator: Send + Sync {
    async fn validate(&self, stage: Stage, work_item_id: &str) -> ValidationOutcome;
}

/// Drive one transition request through external validation and commit the
/// result.
///
/// The validator runs with no lock held; the decide-and-mutate sequence
/// only happens after it completes, under the machine's lock, so the
/// transition either fully commits or leaves the pipeline untouched. A
/// caller cancelling this future mid-validation mutates nothing. On
/// timeout the transition fails as Blocked with the timeout reason.
pub async fn run_validation(
    machine: &SharedGateMachine,
    target: Stage,
    validator: &dyn StageValidator,
    context: &DecisionContext,
    timeout: Duration,
    lock_checksum: Option<u32>,
) -> Result<Adjudication> {
    let (stage, work_item_id) = {
        let m = machine.lock();
        m.request_transition(target)?;
        (m.current_stage(), m.state().work_item_id.clone())
    };

    let outcome = match tokio::time::timeout(timeout, validator.validate(stage, &work_item_id)).await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(
                work_item = %work_item_id,
                stage = %stage,
                timeout_secs = timeout.as_secs(),
                "Stage validation timed out"
            );
            let mut m = machine.lock();
            return Ok(m.block_current(format!(
                "validation timed out after {}s",
                timeout.as_secs()
            )));
        }
    };

    let mut m = machine.lock();
    // The pipeline may have moved while the validator ran; re-check the
    // request so a stale result cannot commit against the wrong stage.
    m.request_transition(target)?;
    m.adjudicate_with_lock(&outcome, context, lock_checksum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::gate::{Decision, GateStateMachine, GateStatus};

    struct PassingValidator;

    #[async_trait]
    impl StageValidator for PassingValidator {
        async fn validate(&self, _stage: Stage, _work_item_id: &str) -> ValidationOutcome {
            ValidationOutcome::passed()
        }
    }

    struct SlowValidator;

    #[async_trait]
    impl StageValidator for SlowValidator {
        async fn validate(&self, _stage: Stage, _work_item_id: &str) -> ValidationOutcome {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ValidationOutcome::passed()
        }
    }

    #[tokio::test]
    async fn test_validation_commits_go() {
        let machine = GateStateMachine::new("wi-1", GateConfig::default()).shared();
        let adjudication = run_validation(
            &machine,
            Stage::Plan,
            &PassingValidator,
            &DecisionContext::default(),
            Duration::from_secs(5),
            Some(99),
        )
        .await
        .unwrap();

        assert_eq!(adjudication, Adjudication::Decided(Decision::Go));
        let m = machine.lock();
        assert_eq!(m.current_stage(), Stage::Plan);
        assert_eq!(
            m.state().latest_record(Stage::Research).unwrap().checksum,
            Some(99)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_blocks_and_never_goes() {
        let machine = GateStateMachine::new("wi-1", GateConfig::default()).shared();
        let adjudication = run_validation(
            &machine,
            Stage::Plan,
            &SlowValidator,
            &DecisionContext::default(),
            Duration::from_secs(1),
            None,
        )
        .await
        .unwrap();

        assert!(matches!(adjudication, Adjudication::Blocked { .. }));
        let m = machine.lock();
        assert_eq!(m.current_stage(), Stage::Research);
        assert_eq!(m.state().status_of(Stage::Research), Some(GateStatus::Blocked));
    }

    #[tokio::test]
    async fn test_cancellation_leaves_state_untouched() {
        let machine = GateStateMachine::new("wi-1", GateConfig::default()).shared();
        let ctx = DecisionContext::default();
        let fut = run_validation(
            &machine,
            Stage::Plan,
            &SlowValidator,
            &ctx,
            Duration::from_secs(60),
            None,
        );
        // Drop the in-flight validation without polling it to completion.
        drop(fut);

        let m = machine.lock();
        assert_eq!(m.current_stage(), Stage::Research);
        assert_eq!(m.state().history.len(), 1);
    }

    #[tokio::test]
    async fn test_bad_target_fails_before_validation() {
        let machine = GateStateMachine::new("wi-1", GateConfig::default()).shared();
        let result = run_validation(
            &machine,
            Stage::Implement,
            &PassingValidator,
            &DecisionContext::default(),
            Duration::from_secs(5),
            None,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(machine.lock().state().history.len(), 1);
    }
}
