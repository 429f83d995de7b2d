//! Token counting utilities for context size estimation.
//!
//! The default strategy is a character-length heuristic: budget planning
//! tolerates roughly ±10% error and runs on every snapshot, so it must stay
//! O(serialized-size) with no tokenizer pass. Tiktoken encodings are
//! available for callers that opt into tighter counts.

use std::sync::OnceLock;

use tiktoken_rs::{CoreBPE, cl100k_base, o200k_base, p50k_base};

use crate::config::TokenEncoding;

static CL100K: OnceLock<CoreBPE> = OnceLock::new();
static O200K: OnceLock<CoreBPE> = OnceLock::new();
static P50K: OnceLock<CoreBPE> = OnceLock::new();

fn get_cl100k() -> &'static CoreBPE {
    CL100K.get_or_init(|| cl100k_base().expect("Failed to load cl100k_base tokenizer"))
}

fn get_o200k() -> &'static CoreBPE {
    O200K.get_or_init(|| o200k_base().expect("Failed to load o200k_base tokenizer"))
}

fn get_p50k() -> &'static CoreBPE {
    P50K.get_or_init(|| p50k_base().expect("Failed to load p50k_base tokenizer"))
}

/// Estimates token count using the specified encoding.
pub fn estimate_tokens_with_encoding(
    text: &str,
    encoding: TokenEncoding,
    heuristic_chars_per_token: usize,
) -> usize {
    match encoding {
        TokenEncoding::Heuristic => heuristic_estimate(text, heuristic_chars_per_token),
        TokenEncoding::Cl100kBase => get_cl100k().encode_with_special_tokens(text).len(),
        TokenEncoding::O200kBase => get_o200k().encode_with_special_tokens(text).len(),
        TokenEncoding::P50kBase => get_p50k().encode_with_special_tokens(text).len(),
    }
}

/// Fast heuristic token estimation: tokens ≈ chars / chars_per_token.
fn heuristic_estimate(text: &str, chars_per_token: usize) -> usize {
    let chars_per_token = chars_per_token.max(1);
    text.len().div_ceil(chars_per_token)
}

/// Default token estimation using the heuristic encoding.
pub fn estimate_tokens(text: &str) -> usize {
    estimate_tokens_with_encoding(text, TokenEncoding::Heuristic, 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_estimate() {
        let text = "twelve chars"; // 12 chars
        assert_eq!(estimate_tokens(text), 3);
    }

    #[test]
    fn test_heuristic_rounds_up() {
        assert_eq!(estimate_tokens("abcde"), 2); // 5 / 4, rounded up
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_tiktoken_encodings_available() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let cl100k = estimate_tokens_with_encoding(text, TokenEncoding::Cl100kBase, 4);
        let o200k = estimate_tokens_with_encoding(text, TokenEncoding::O200kBase, 4);
        let p50k = estimate_tokens_with_encoding(text, TokenEncoding::P50kBase, 4);
        assert!(cl100k > 0);
        assert!(o200k > 0);
        assert!(p50k > 0);
    }

    #[test]
    fn test_heuristic_within_error_band_of_exact() {
        // Representative English prose: heuristic should land near the exact
        // count, well inside the accepted error band for budget planning.
        let text = "Pipeline stages advance one at a time, and every decision \
                    is recorded in an append-only history for later audit.";
        let heuristic = estimate_tokens(text);
        let exact = estimate_tokens_with_encoding(text, TokenEncoding::Cl100kBase, 4);
        let ratio = heuristic as f64 / exact as f64;
        assert!((0.5..=2.0).contains(&ratio), "ratio {} out of band", ratio);
    }
}
