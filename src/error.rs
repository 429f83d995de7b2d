use thiserror::Error;

use crate::gate::{GateStatus, Stage};

#[derive(Error, Debug)]
pub enum GateError {
    #[error("sequence violation: {from} -> {to} (skipped: {})", format_stages(.skipped))]
    SequenceViolation {
        from: Stage,
        to: Stage,
        skipped: Vec<Stage>,
    },

    #[error("backward transition {from} -> {to} requires a Recycle decision")]
    BackwardTransition { from: Stage, to: Stage },

    #[error("reset requires explicit confirmation")]
    ConfirmationRequired,

    #[error("pipeline killed at {stage}; reset required before further transitions")]
    PipelineKilled { stage: Stage },

    #[error("no gate record for stage {stage}")]
    RecordNotFound { stage: Stage },

    #[error("decision targets {stage} but the pipeline is at {current}")]
    DecisionStageMismatch { current: Stage, stage: Stage },

    #[error("stage {stage} has no pending review to resolve")]
    NoPendingReview { stage: Stage },

    #[error("reviewer '{reviewer}' produced the work under review at {stage}")]
    ReviewerNotIndependent { stage: Stage, reviewer: String },

    #[error("cannot rollback {stage} from status {status}")]
    RollbackNotPermitted { stage: Stage, status: GateStatus },

    #[error("recycle target {target} is not earlier than {current}")]
    InvalidRecycleTarget { current: Stage, target: Stage },

    #[error("budget halted: {reason}")]
    BudgetHalt { reason: String },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_bw::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

fn format_stages(stages: &[Stage]) -> String {
    if stages.is_empty() {
        return "none".to_string();
    }
    stages
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, GateError>;
