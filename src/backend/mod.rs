//! Inference backend integration.
//!
//! Provides the [`Generator`] seam the runner and judge call through, and
//! an Ollama-compatible HTTP implementation of it.

mod client;

pub use client::{GenerateOptions, Generator, OllamaClient};
