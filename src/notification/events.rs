use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gate::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateEventType {
    Go,
    Kill,
    Hold,
    Blocked,
    Recycle,
    Rollback,
    Reset,
    PendingReview,
    DriftDetected,
}

impl GateEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "gate.go",
            Self::Kill => "gate.kill",
            Self::Hold => "gate.hold",
            Self::Blocked => "gate.blocked",
            Self::Recycle => "gate.recycle",
            Self::Rollback => "gate.rollback",
            Self::Reset => "gate.reset",
            Self::PendingReview => "gate.pending_review",
            Self::DriftDetected => "gate.drift_detected",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Kill | Self::Blocked | Self::DriftDetected)
    }
}

/// Structured event emitted at every gate decision an external consumer
/// cares about. The core knows nothing about delivery channels; this record
/// is the whole contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub id: uuid::Uuid,
    pub event_type: GateEventType,
    pub work_item_id: String,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_stages: Vec<Stage>,
}

impl PipelineEvent {
    pub fn new(event_type: GateEventType, work_item_id: impl Into<String>, stage: Stage) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            event_type,
            work_item_id: work_item_id.into(),
            stage,
            created_at: Utc::now(),
            reason: None,
            affected_stages: Vec::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_affected_stages(mut self, stages: Vec<Stage>) -> Self {
        self.affected_stages = stages;
        self
    }

    /// One-line summary for log output.
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{} at {}", self.event_type.as_str(), self.stage)];
        if let Some(reason) = &self.reason {
            parts.push(reason.clone());
        }
        if !self.affected_stages.is_empty() {
            parts.push(format!(
                "affects: {}",
                self.affected_stages
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        parts.join(" | ")
    }
}
