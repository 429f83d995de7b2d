use std::path::PathBuf;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::PipelineEvent;
use crate::config::NotificationConfig;

/// Forwards pipeline events to an append-only JSONL log and an optional
/// hook command. Delivery beyond that (chat, alerting) is somebody else's
/// job; the hook receives the full event as JSON.
#[derive(Clone)]
pub struct Notifier {
    config: NotificationConfig,
    log_dir: Option<PathBuf>,
}

impl Notifier {
    pub fn new(config: NotificationConfig, log_dir: Option<PathBuf>) -> Self {
        Self { config, log_dir }
    }

    pub async fn notify(&self, event: &PipelineEvent) {
        if !self.config.enabled {
            return;
        }

        if self.config.event_log {
            self.append_event_log(event).await;
        }

        if let Some(hook) = &self.config.hook_command {
            self.run_hook(hook, event).await;
        }
    }

    pub async fn notify_all(&self, events: &[PipelineEvent]) {
        for event in events {
            self.notify(event).await;
        }
    }

    async fn append_event_log(&self, event: &PipelineEvent) {
        let Some(log_dir) = &self.log_dir else {
            return;
        };

        let line = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize event");
                return;
            }
        };

        if let Err(e) = tokio::fs::create_dir_all(log_dir).await {
            warn!(error = %e, "Failed to create event log directory");
            return;
        }

        let log_path = log_dir.join(format!("{}.events.jsonl", event.work_item_id));
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await;

        match result {
            Ok(mut file) => {
                if let Err(e) = file.write_all(format!("{}\n", line).as_bytes()).await {
                    warn!(error = %e, "Failed to write event log");
                }
            }
            Err(e) => {
                warn!(error = %e, path = %log_path.display(), "Failed to open event log");
            }
        }
    }

    async fn run_hook(&self, hook_cmd: &str, event: &PipelineEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => j,
            Err(_) => return,
        };

        let result = Command::new("sh")
            .args(["-c", hook_cmd])
            .env("STAGEGATE_EVENT", event.event_type.as_str())
            .env("STAGEGATE_WORK_ITEM", &event.work_item_id)
            .env("STAGEGATE_STAGE", event.stage.as_str())
            .env("STAGEGATE_EVENT_JSON", &json)
            .output()
            .await;

        if let Err(e) = result {
            debug!(error = %e, hook = %hook_cmd, "Failed to run event hook");
        }
    }
}
