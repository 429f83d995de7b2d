//! Bounded-context management: what each pipeline stage gets to see, and
//! at what cost.

mod cache;
mod estimator;
mod pruner;
mod types;

pub use cache::{CacheEntry, CacheWarning, ContextCache, Loaded};
pub use estimator::estimate_state_tokens;
pub use pruner::{PruneReport, StatePruner};
pub use types::{CompletedStageDetail, DecisionEntry, FileRef, ProjectState, PrunedState};
