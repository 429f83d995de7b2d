//! The gate sequencing engine: stage ordering, pipeline state, the decision
//! algorithm, drift detection, and rollback.

mod criteria;
mod drift;
mod machine;
mod record;
mod rollback;
mod stage;
mod validator;

pub use criteria::{
    Decision, DecisionContext, HoldCriterion, KillCriterion, ValidationOutcome, evaluate_hold,
    evaluate_kill,
};
pub use drift::{DriftCheck, DriftDetector};
pub use machine::{
    Adjudication, GateStateMachine, ReviewOutcome, SharedGateMachine, TransitionRequest,
};
pub use record::{GateRecord, GateStatus, PipelineState};
pub use rollback::{RollbackEngine, RollbackResult, RollbackTrigger};
pub use stage::Stage;
pub use validator::{StageValidator, run_validation};
