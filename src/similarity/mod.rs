//! Semantic similarity scoring.
//!
//! This module provides:
//! - The [`Encoder`] seam over a tokenizer plus text encoder
//! - Lossless token windowing, mean pooling and cosine similarity
//! - The scorer that turns a merged analysis table into `{model}_cosine` columns
//! - A local BERT encoder (candle + tokenizers) behind the `embeddings` feature

pub mod chunking;
pub mod encoder;
pub mod scorer;

#[cfg(feature = "embeddings")]
pub mod bert;

#[cfg(feature = "embeddings")]
pub use bert::BertEncoder;
pub use chunking::{chunk_tokens, cosine_similarity, embed_text, mean_pool};
pub use encoder::{DEFAULT_TOKEN_BUDGET, Encoder};
pub use scorer::{
    ModelScores, ScoringPlan, SimilarityReport, SimilarityRow, SimilarityScorer,
    default_output_path,
};
