use serde::{Deserialize, Serialize};

use crate::gate::Stage;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StagegateConfig {
    pub gate: GateConfig,
    pub budget: BudgetConfig,
    pub cache: CacheConfig,
    pub pruner: PrunerConfig,
    pub drift: DriftConfig,
    pub tokenizer: TokenizerConfig,
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Retry ceiling per stage before a Kill decision.
    pub max_retries: u32,
    /// Fraction of the budget threshold at which estimated cost triggers Hold.
    pub cost_hold_fraction: f64,
    /// Risk score above which a transition is held for review.
    pub risk_ceiling: f64,
    /// Stages that require a human review gate before Go.
    pub review_stages: Vec<Stage>,
    /// Review stages where the reviewer must differ from the author.
    pub independent_review_stages: Vec<Stage>,
    /// Stages where Hold is not permitted; a Hold decision there records
    /// Blocked instead. Default: no hold at launch.
    pub no_hold_stages: Vec<Stage>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            cost_hold_fraction: 0.8,
            risk_ceiling: 0.7,
            review_stages: vec![Stage::SafetyCheck, Stage::MergeDeploy],
            independent_review_stages: vec![Stage::SafetyCheck],
            no_hold_stages: vec![Stage::MergeDeploy],
        }
    }
}

impl GateConfig {
    pub fn requires_review(&self, stage: Stage) -> bool {
        self.review_stages.contains(&stage)
    }

    pub fn requires_independent_review(&self, stage: Stage) -> bool {
        self.independent_review_stages.contains(&stage)
    }

    pub fn allows_hold(&self, stage: Stage) -> bool {
        !self.no_hold_stages.contains(&stage)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Token rate ceiling for the rolling minute window.
    pub tokens_per_minute: u64,
    /// Cost ceiling for the daily window, in USD.
    pub daily_cost_limit: f64,
    /// Fraction of a limit at which `check_budget` reports Warning.
    pub alert_threshold: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            tokens_per_minute: 100_000,
            daily_cost_limit: 50.0,
            alert_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total size ceiling for cached artifacts, in estimated tokens.
    pub ceiling_tokens: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ceiling_tokens: 50_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrunerConfig {
    /// Decision-history entries retained by a pruned snapshot.
    pub max_recent_decisions: usize,
    /// File references retained by a pruned snapshot.
    pub max_file_refs: usize,
}

impl Default for PrunerConfig {
    fn default() -> Self {
        Self {
            max_recent_decisions: 10,
            max_file_refs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// When true, a positive drift check triggers the cascading rollback
    /// automatically instead of staying advisory.
    pub auto_fix: bool,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self { auto_fix: false }
    }
}

/// Token counting strategy.
///
/// The heuristic is the crate default: budget decisions tolerate ~±10% error
/// and must not pay for a tokenizer pass on every snapshot. The tiktoken
/// encodings remain available for callers that want tighter estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEncoding {
    #[default]
    Heuristic,
    Cl100kBase,
    O200kBase,
    P50kBase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub encoding: TokenEncoding,
    /// Chars per token for heuristic mode.
    pub heuristic_chars_per_token: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            encoding: TokenEncoding::Heuristic,
            heuristic_chars_per_token: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub event_log: bool,
    pub hook_command: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            event_log: true,
            hook_command: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hold_policy() {
        let config = GateConfig::default();
        assert!(config.allows_hold(Stage::Implement));
        assert!(!config.allows_hold(Stage::MergeDeploy));
    }

    #[test]
    fn test_default_review_gates() {
        let config = GateConfig::default();
        assert!(config.requires_review(Stage::SafetyCheck));
        assert!(config.requires_independent_review(Stage::SafetyCheck));
        assert!(config.requires_review(Stage::MergeDeploy));
        assert!(!config.requires_independent_review(Stage::MergeDeploy));
        assert!(!config.requires_review(Stage::Implement));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = StagegateConfig::default();
        let yaml = serde_yaml_bw::to_string(&config).unwrap();
        let restored: StagegateConfig = serde_yaml_bw::from_str(&yaml).unwrap();
        assert_eq!(restored.gate.max_retries, config.gate.max_retries);
        assert_eq!(restored.budget.tokens_per_minute, config.budget.tokens_per_minute);
        assert_eq!(restored.tokenizer.encoding, TokenEncoding::Heuristic);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: StagegateConfig = serde_yaml_bw::from_str("gate:\n  max_retries: 5\n").unwrap();
        assert_eq!(config.gate.max_retries, 5);
        assert_eq!(config.gate.cost_hold_fraction, 0.8);
        assert_eq!(config.budget.daily_cost_limit, 50.0);
    }
}
