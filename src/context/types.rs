use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gate::Stage;

/// One decision in a project's history, as seen by pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEntry {
    pub stage: Stage,
    pub decision: String,
    pub decided_at: DateTime<Utc>,
}

impl DecisionEntry {
    pub fn new(stage: Stage, decision: impl Into<String>) -> Self {
        Self {
            stage,
            decision: decision.into(),
            decided_at: Utc::now(),
        }
    }
}

/// A file reference with a relevance score assigned by whoever gathered it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRef {
    pub path: String,
    pub relevance: f64,
}

impl FileRef {
    pub fn new(path: impl Into<String>, relevance: f64) -> Self {
        Self {
            path: path.into(),
            relevance,
        }
    }
}

/// Verbose record of a completed stage: the part of a snapshot that grows
/// without bound and that pruning discards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedStageDetail {
    pub stage: Stage,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<String>,
}

/// Full project-state snapshot as assembled by the driver. Stages never see
/// this directly; the pruner reduces it to `PrunedState` first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectState {
    pub project_id: String,
    pub current_stage: Stage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub in_progress_work_items: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decision_history: Vec<DecisionEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_refs: Vec<FileRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completed_stage_details: Vec<CompletedStageDetail>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completed_work_items: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ProjectState {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.in_progress_work_items.is_empty()
            && self.decision_history.is_empty()
            && self.file_refs.is_empty()
            && self.completed_stage_details.is_empty()
            && self.completed_work_items.is_empty()
            && self.notes.is_empty()
    }
}

/// The bounded snapshot a pipeline stage actually operates on: the
/// allow-listed essentials, nothing else.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrunedState {
    pub project_id: String,
    pub current_stage: Stage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub in_progress_work_items: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_decisions: Vec<DecisionEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_refs: Vec<FileRef>,
}
