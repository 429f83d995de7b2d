use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::estimator::estimate_state_tokens;
use super::types::{ProjectState, PrunedState};
use crate::config::{PrunerConfig, TokenizerConfig};

/// Before/after accounting for one pruning pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneReport {
    pub original_tokens: usize,
    pub pruned_tokens: usize,
    pub reduction_ratio: f32,
    pub decisions_dropped: usize,
    pub file_refs_dropped: usize,
}

/// Reduces a full project-state snapshot to the essential subset a stage
/// is allowed to see.
///
/// Retention is an allow-list, not a deny-list: the current-stage pointer,
/// the most recent decisions, in-progress work-item ids, and the
/// highest-relevance file references survive. Completed-stage detail,
/// exhaustive file listings, and verbose notes are discarded wholesale.
pub struct StatePruner {
    config: PrunerConfig,
    tokenizer: TokenizerConfig,
}

impl StatePruner {
    pub fn new(config: PrunerConfig, tokenizer: TokenizerConfig) -> Self {
        Self { config, tokenizer }
    }

    pub fn prune(&self, state: &ProjectState) -> (PrunedState, PruneReport) {
        let original_tokens = estimate_state_tokens(state, &self.tokenizer);

        if state.is_empty() {
            debug!("Pruning degenerate input; returning empty snapshot");
            let pruned = PrunedState {
                project_id: state.project_id.clone(),
                current_stage: state.current_stage,
                ..PrunedState::default()
            };
            let pruned_tokens = estimate_state_tokens(&pruned, &self.tokenizer);
            return (
                pruned,
                PruneReport {
                    original_tokens,
                    pruned_tokens,
                    reduction_ratio: 0.0,
                    decisions_dropped: 0,
                    file_refs_dropped: 0,
                },
            );
        }

        let keep_decisions = self.config.max_recent_decisions;
        let recent_decisions: Vec<_> = state
            .decision_history
            .iter()
            .rev()
            .take(keep_decisions)
            .rev()
            .cloned()
            .collect();
        let decisions_dropped = state.decision_history.len() - recent_decisions.len();

        // Most relevant first, capped.
        let mut ranked = state.file_refs.clone();
        ranked.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(self.config.max_file_refs);
        let file_refs_dropped = state.file_refs.len() - ranked.len();

        let pruned = PrunedState {
            project_id: state.project_id.clone(),
            current_stage: state.current_stage,
            in_progress_work_items: state.in_progress_work_items.clone(),
            recent_decisions,
            file_refs: ranked,
        };

        let pruned_tokens = estimate_state_tokens(&pruned, &self.tokenizer);
        let reduction_ratio = if original_tokens > 0 {
            1.0 - (pruned_tokens as f32 / original_tokens as f32)
        } else {
            0.0
        };

        info!(
            original_tokens,
            pruned_tokens,
            reduction_pct = (reduction_ratio * 100.0) as u32,
            decisions_dropped,
            file_refs_dropped,
            "Project state pruned"
        );

        (
            pruned,
            PruneReport {
                original_tokens,
                pruned_tokens,
                reduction_ratio,
                decisions_dropped,
                file_refs_dropped,
            },
        )
    }
}
