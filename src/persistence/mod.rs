//! Durable storage for pipeline and budget state.
//!
//! One directory per work item under a base directory, YAML files written
//! atomically (temp file + rename). History ordering round-trips exactly.
//! The context cache is intentionally not persisted; it rebuilds on demand.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use crate::budget::BudgetWindow;
use crate::error::{GateError, Result};
use crate::gate::PipelineState;

pub struct PipelineStore {
    base_dir: PathBuf,
}

impl PipelineStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn work_item_dir(&self, work_item_id: &str) -> PathBuf {
        self.base_dir.join(work_item_id)
    }

    fn pipeline_file(&self, work_item_id: &str) -> PathBuf {
        self.work_item_dir(work_item_id).join("pipeline-state.yaml")
    }

    fn budget_file(&self, work_item_id: &str) -> PathBuf {
        self.work_item_dir(work_item_id).join("budget-window.yaml")
    }

    /// Directory for the append-only event log, shared with the notifier.
    pub fn event_log_dir(&self, work_item_id: &str) -> PathBuf {
        self.work_item_dir(work_item_id).join("events")
    }

    pub async fn exists(&self, work_item_id: &str) -> bool {
        self.pipeline_file(work_item_id).exists()
    }

    pub async fn save_pipeline(&self, state: &PipelineState) -> Result<()> {
        let dir = self.work_item_dir(&state.work_item_id);
        fs::create_dir_all(&dir).await?;

        let yaml = serde_yaml_bw::to_string(state)?;
        write_atomic(&self.pipeline_file(&state.work_item_id), &yaml).await?;

        info!(
            work_item = %state.work_item_id,
            history_len = state.history.len(),
            "Pipeline state saved"
        );
        Ok(())
    }

    pub async fn load_pipeline(&self, work_item_id: &str) -> Result<PipelineState> {
        let content = fs::read_to_string(self.pipeline_file(work_item_id)).await?;
        let state: PipelineState = serde_yaml_bw::from_str(&content)?;
        if state.work_item_id != work_item_id {
            return Err(GateError::Persistence(format!(
                "state file for '{}' contains work item '{}'",
                work_item_id, state.work_item_id
            )));
        }
        Ok(state)
    }

    pub async fn load_or_init_pipeline(&self, work_item_id: &str) -> Result<PipelineState> {
        if self.exists(work_item_id).await {
            self.load_pipeline(work_item_id).await
        } else {
            let state = PipelineState::new(work_item_id);
            self.save_pipeline(&state).await?;
            Ok(state)
        }
    }

    pub async fn save_budget(&self, work_item_id: &str, window: &BudgetWindow) -> Result<()> {
        let dir = self.work_item_dir(work_item_id);
        fs::create_dir_all(&dir).await?;

        let yaml = serde_yaml_bw::to_string(window)?;
        write_atomic(&self.budget_file(work_item_id), &yaml).await
    }

    pub async fn load_budget(&self, work_item_id: &str) -> Result<Option<BudgetWindow>> {
        let path = self.budget_file(work_item_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        let window: BudgetWindow = serde_yaml_bw::from_str(&content)?;
        Ok(Some(window))
    }
}

/// Serialize to a temp file, then rename into place so a crash mid-write
/// never leaves a torn state file behind.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let temp_path = path.with_extension("yaml.tmp");
    fs::write(&temp_path, contents).await?;
    fs::rename(&temp_path, path).await.inspect_err(|_| {
        let _ = std::fs::remove_file(&temp_path);
    })?;
    Ok(())
}
