use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    #[default]
    Idle,
    Validating,
    Ready,
    Hold,
    Blocked,
    Killed,
    Recycle,
    PendingReview,
}

impl GateStatus {
    /// Whether a stage in this status counts as advanced work that a
    /// rollback can revert. Killed and Blocked records are already not
    /// advanced, so there is nothing to roll back.
    pub fn is_rollbackable(&self) -> bool {
        matches!(self, Self::Ready | Self::Hold | Self::PendingReview)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Killed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Ready => "ready",
            Self::Hold => "hold",
            Self::Blocked => "blocked",
            Self::Killed => "killed",
            Self::Recycle => "recycle",
            Self::PendingReview => "pending_review",
        }
    }
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in the pipeline's append-only history.
///
/// A record is created when a stage is first entered and a new one is
/// appended on every subsequent status change. History is never reordered or
/// truncated, so the full audit trail of a work item survives resets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateRecord {
    pub stage: Stage,
    pub status: GateStatus,
    pub entered_at: DateTime<Utc>,
    /// Checksum of the inputs this stage was validated against, set at lock
    /// time. Cleared when drift invalidates the stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<u32>,
    #[serde(default)]
    pub retry_count: u32,
    /// Identity of the agent that produced the work, used by the
    /// independent-verification check on review resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Marks the synthetic record appended by a confirmed reset.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reset_marker: bool,
}

impl GateRecord {
    pub fn new(stage: Stage, status: GateStatus) -> Self {
        Self {
            stage,
            status,
            entered_at: Utc::now(),
            checksum: None,
            retry_count: 0,
            author: None,
            reason: None,
            reset_marker: false,
        }
    }

    pub fn with_checksum(mut self, checksum: u32) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn reset_marker(stage: Stage) -> Self {
        let mut record = Self::new(stage, GateStatus::Idle);
        record.reset_marker = true;
        record.reason = Some("pipeline reset".to_string());
        record
    }
}

/// The complete state of one work item's pipeline.
///
/// Owned exclusively by a single `GateStateMachine`; callers hold a handle to
/// the machine, never to ambient global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub work_item_id: String,
    pub current_stage: Stage,
    pub history: Vec<GateRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recycle_count: u32,
    pub created_at: DateTime<Utc>,
}

impl PipelineState {
    pub fn new(work_item_id: impl Into<String>) -> Self {
        let mut state = Self {
            work_item_id: work_item_id.into(),
            current_stage: Stage::Research,
            history: Vec::new(),
            locked_at: None,
            recycle_count: 0,
            created_at: Utc::now(),
        };
        state.append(GateRecord::new(Stage::Research, GateStatus::Idle));
        state
    }

    pub fn append(&mut self, record: GateRecord) {
        self.history.push(record);
    }

    /// The most recent record for `stage`, if the stage was ever entered.
    pub fn latest_record(&self, stage: Stage) -> Option<&GateRecord> {
        self.history.iter().rev().find(|r| r.stage == stage)
    }

    /// Current effective status of `stage`, derived from the latest record.
    pub fn status_of(&self, stage: Stage) -> Option<GateStatus> {
        self.latest_record(stage).map(|r| r.status)
    }

    /// The retry count carried by the latest record of the current stage.
    pub fn current_retry_count(&self) -> u32 {
        self.latest_record(self.current_stage)
            .map(|r| r.retry_count)
            .unwrap_or(0)
    }

    pub fn is_killed(&self) -> bool {
        self.status_of(self.current_stage) == Some(GateStatus::Killed)
    }

    /// Stage of the most recent Kill record, if the pipeline is killed.
    pub fn killed_at(&self) -> Option<Stage> {
        self.history
            .iter()
            .rev()
            .find(|r| r.status == GateStatus::Killed)
            .map(|r| r.stage)
    }
}
