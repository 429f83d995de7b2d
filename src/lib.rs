pub mod budget;
pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod notification;
pub mod persistence;
pub mod utils;

pub use budget::{BudgetStatus, BudgetTracker, BudgetWindow};
pub use config::StagegateConfig;
pub use context::{ContextCache, ProjectState, PrunedState, StatePruner};
pub use error::{GateError, Result};
pub use gate::{
    Adjudication, Decision, DecisionContext, DriftDetector, GateStateMachine, GateStatus,
    PipelineState, ReviewOutcome, RollbackEngine, Stage, StageValidator, ValidationOutcome,
};
pub use notification::{Notifier, PipelineEvent};
pub use persistence::PipelineStore;
