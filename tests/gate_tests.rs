use stagegate::config::GateConfig;
use stagegate::error::GateError;
use stagegate::gate::{
    Adjudication, Decision, DecisionContext, GateStateMachine, GateStatus, ReviewOutcome, Stage,
    TransitionRequest, ValidationOutcome,
};

fn machine() -> GateStateMachine {
    GateStateMachine::new("wi-test", GateConfig::default())
}

fn advance_to(machine: &mut GateStateMachine, stage: Stage) {
    while machine.current_stage() < stage {
        let current = machine.current_stage();
        machine.record_decision(current, Decision::Go).unwrap();
    }
    machine.drain_events();
}

// ========== Sequencing Properties ==========

#[test]
fn test_accepted_sequence_never_skips_forward() {
    let m = machine();
    for target in Stage::ALL {
        let result = m.request_transition(target);
        match target {
            Stage::Research => assert_eq!(result.unwrap(), TransitionRequest::Revalidate),
            Stage::Plan => assert_eq!(result.unwrap(), TransitionRequest::Advance),
            _ => assert!(matches!(result, Err(GateError::SequenceViolation { .. }))),
        }
    }
}

#[test]
fn test_full_pipeline_walk() {
    let mut m = machine();
    for stage in Stage::ALL {
        assert_eq!(m.current_stage(), stage);
        if let Some(next) = stage.next() {
            assert_eq!(m.request_transition(next).unwrap(), TransitionRequest::Advance);
        }
        m.record_decision(stage, Decision::Go).unwrap();
    }
    // Final gate passed; pipeline complete at the last stage.
    assert_eq!(m.current_stage(), Stage::MergeDeploy);
    assert_eq!(m.state().status_of(Stage::MergeDeploy), Some(GateStatus::Ready));
}

#[test]
fn test_failed_request_has_no_side_effects() {
    let m = machine();
    let before = m.state().history.len();
    assert!(m.request_transition(Stage::Validate).is_err());
    assert!(m.request_transition(Stage::MergeDeploy).is_err());
    assert_eq!(m.state().history.len(), before);
    assert_eq!(m.current_stage(), Stage::Research);
}

#[test]
fn test_sequence_violation_names_every_skipped_stage() {
    let mut m = machine();
    advance_to(&mut m, Stage::Plan);
    match m.request_transition(Stage::SafetyCheck) {
        Err(GateError::SequenceViolation { from, to, skipped }) => {
            assert_eq!(from, Stage::Plan);
            assert_eq!(to, Stage::SafetyCheck);
            assert_eq!(
                skipped,
                vec![Stage::TestFirst, Stage::Branch, Stage::Implement, Stage::Refactor]
            );
        }
        other => panic!("expected SequenceViolation, got {:?}", other.map(|_| ())),
    }
}

// ========== Reset Properties ==========

#[test]
fn test_reset_without_confirmation_never_mutates() {
    let mut m = machine();
    advance_to(&mut m, Stage::Branch);
    let history_len = m.state().history.len();

    assert!(matches!(m.reset(false), Err(GateError::ConfirmationRequired)));
    assert_eq!(m.current_stage(), Stage::Branch);
    assert_eq!(m.state().history.len(), history_len);
}

#[test]
fn test_reset_preserves_history_monotonically() {
    let mut m = machine();
    advance_to(&mut m, Stage::Implement);
    let before = m.state().history.len();

    m.reset(true).unwrap();
    assert_eq!(m.current_stage(), Stage::Research);
    assert!(m.state().history.len() > before);
    assert!(m.state().history.last().unwrap().reset_marker);

    // Repeated resets keep growing history, never shrink it.
    let len_after_first = m.state().history.len();
    m.reset(true).unwrap();
    assert!(m.state().history.len() > len_after_first);
}

// ========== Decision Recording ==========

#[test]
fn test_decision_for_wrong_stage_is_rejected() {
    let mut m = machine();
    advance_to(&mut m, Stage::Plan);
    assert!(matches!(
        m.record_decision(Stage::Implement, Decision::Go),
        Err(GateError::DecisionStageMismatch { .. })
    ));
}

#[test]
fn test_hold_then_revalidate_carries_no_retry_penalty() {
    let mut m = machine();
    advance_to(&mut m, Stage::Refactor);

    m.record_decision(Stage::Refactor, Decision::hold(vec!["awaiting input".into()]))
        .unwrap();
    assert_eq!(m.state().current_retry_count(), 0);

    // Hold resolved externally; a later pass goes straight through.
    let outcome = ValidationOutcome::passed();
    let adjudication = m.adjudicate(&outcome, &DecisionContext::default()).unwrap();
    assert_eq!(adjudication, Adjudication::Decided(Decision::Go));
    assert_eq!(m.current_stage(), Stage::SafetyCheck);
}

#[test]
fn test_blocked_allows_retry_until_kill() {
    let mut m = machine();
    let config_max = m.config().max_retries;

    for attempt in 0..config_max {
        let outcome =
            ValidationOutcome::failed(vec![format!("attempt {}", attempt)]).with_retry_count(attempt);
        let adjudication = m.adjudicate(&outcome, &DecisionContext::default()).unwrap();
        assert!(matches!(adjudication, Adjudication::Blocked { .. }));
    }

    // The next attempt arrives at the retry ceiling and kills.
    let outcome = ValidationOutcome::failed(vec!["final".into()]).with_retry_count(config_max);
    let adjudication = m.adjudicate(&outcome, &DecisionContext::default()).unwrap();
    assert!(matches!(
        adjudication,
        Adjudication::Decided(Decision::Kill { .. })
    ));
}

// ========== Review Gates ==========

#[test]
fn test_pending_review_requires_external_resolution() {
    let mut m = machine();
    advance_to(&mut m, Stage::SafetyCheck);

    let outcome = ValidationOutcome::passed().with_author("builder-agent");
    let adjudication = m.adjudicate(&outcome, &DecisionContext::default()).unwrap();
    assert_eq!(adjudication, Adjudication::PendingReview);

    // No automatic advancement while the review is pending.
    assert_eq!(m.current_stage(), Stage::SafetyCheck);

    // Independent verification: the author cannot approve their own work.
    assert!(matches!(
        m.resolve_review(Stage::SafetyCheck, ReviewOutcome::Approved, "builder-agent"),
        Err(GateError::ReviewerNotIndependent { .. })
    ));

    m.resolve_review(Stage::SafetyCheck, ReviewOutcome::Approved, "human-lead")
        .unwrap();
    assert_eq!(m.current_stage(), Stage::Validate);
}

#[test]
fn test_bypassed_review_still_checks_independence() {
    let mut m = machine();
    advance_to(&mut m, Stage::SafetyCheck);
    let outcome = ValidationOutcome::passed().with_author("builder-agent");
    m.adjudicate(&outcome, &DecisionContext::default()).unwrap();

    assert!(matches!(
        m.resolve_review(Stage::SafetyCheck, ReviewOutcome::Bypassed, "builder-agent"),
        Err(GateError::ReviewerNotIndependent { .. })
    ));
    m.resolve_review(Stage::SafetyCheck, ReviewOutcome::Bypassed, "operator")
        .unwrap();
    assert_eq!(m.current_stage(), Stage::Validate);
}

#[test]
fn test_non_independent_stage_allows_self_review() {
    let mut m = machine();
    advance_to(&mut m, Stage::MergeDeploy);

    // MergeDeploy requires review but not independence by default.
    let outcome = ValidationOutcome::passed().with_author("builder-agent");
    m.adjudicate(&outcome, &DecisionContext::default()).unwrap();
    let decision = m
        .resolve_review(Stage::MergeDeploy, ReviewOutcome::Approved, "builder-agent")
        .unwrap();
    assert_eq!(decision, Decision::Go);
}

// ========== Drift Cursor ==========

#[test]
fn test_get_drift_is_idempotent() {
    let mut m = machine();
    advance_to(&mut m, Stage::TestFirst);
    for _ in 0..5 {
        assert!(!m.get_drift(Stage::TestFirst));
        assert!(m.get_drift(Stage::Plan));
    }
}
