mod tokenizer;

pub use tokenizer::{estimate_tokens, estimate_tokens_with_encoding};
