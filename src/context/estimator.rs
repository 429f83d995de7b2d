use serde::Serialize;
use tracing::warn;

use crate::config::TokenizerConfig;
use crate::utils::estimate_tokens_with_encoding;

/// Estimate the token footprint of any serializable state.
///
/// Serializes to JSON and applies the configured counting strategy — an
/// O(serialized-size) pass, no tokenizer call on the default heuristic
/// path. Unserializable input estimates as zero rather than failing:
/// estimation feeds advisory budget decisions, never correctness.
pub fn estimate_state_tokens<T: Serialize>(value: &T, config: &TokenizerConfig) -> usize {
    match serde_json::to_string(value) {
        Ok(json) => estimate_tokens_with_encoding(
            &json,
            config.encoding,
            config.heuristic_chars_per_token,
        ),
        Err(e) => {
            warn!(error = %e, "Failed to serialize state for token estimation");
            0
        }
    }
}
