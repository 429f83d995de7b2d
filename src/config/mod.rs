//! Configuration types.
//!
//! Provides all configuration structures for stagegate:
//! - `StagegateConfig`: top-level configuration
//! - Domain configs: gate, budget, cache, pruner, drift, tokenizer,
//!   notification

mod settings;

pub use settings::{
    BudgetConfig, CacheConfig, DriftConfig, GateConfig, NotificationConfig, PrunerConfig,
    StagegateConfig, TokenEncoding, TokenizerConfig,
};
