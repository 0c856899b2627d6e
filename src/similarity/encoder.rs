//! The embedding backend seam.

use crate::error::Result;

/// Default token window for BERT-sized encoders.
pub const DEFAULT_TOKEN_BUDGET: usize = 512;

/// A text encoder split into its two halves: tokenization and encoding of a
/// single token window.
///
/// `encode` returns the representation of the window's aggregate position
/// (the leading `[CLS]`-style pseudo-token); callers never look inside.
pub trait Encoder {
    /// Tokenize `text` without special tokens.
    fn tokenize(&self, text: &str) -> Result<Vec<u32>>;

    /// Embed one window of at most [`Encoder::token_budget`] tokens.
    fn encode(&self, tokens: &[u32]) -> Result<Vec<f32>>;

    /// Maximum number of tokens per window.
    fn token_budget(&self) -> usize {
        DEFAULT_TOKEN_BUDGET
    }
}

impl<E: Encoder + ?Sized> Encoder for &E {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        (**self).tokenize(text)
    }

    fn encode(&self, tokens: &[u32]) -> Result<Vec<f32>> {
        (**self).encode(tokens)
    }

    fn token_budget(&self) -> usize {
        (**self).token_budget()
    }
}
