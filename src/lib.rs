//! Answer evaluation pipeline for locally served language models.
//!
//! Three stages share one reference dataset of questions and official
//! solutions:
//! 1. A batch runner sends every question to a model and records the answer,
//!    the model id and the wall-clock latency
//! 2. A similarity scorer embeds each model answer and the official solution
//!    and records their cosine similarity
//! 3. A blind judge shows an arbiter model all candidate answers under
//!    randomly drawn labels and records the ranking it returns
//!
//! # Quick Start
//!
//! ```no_run
//! use answer_eval::{
//!     backend::OllamaClient,
//!     config::Config,
//!     dataset::{ColumnNames, QuestionSource, load_prompt},
//!     runner::{AnswerSink, BatchRunner, SinkLayout, WriteMode},
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let source = QuestionSource::from_path("math.db", "math_questions", ColumnNames::default());
//!     let questions = source.load()?;
//!     let template = load_prompt(Path::new("prompt.txt"))?;
//!
//!     let mut sink = AnswerSink::open(
//!         Path::new("results/answers.csv"),
//!         WriteMode::Reset,
//!         SinkLayout::default(),
//!     )?;
//!
//!     let runner = BatchRunner::new(OllamaClient::new(&config.backend)?);
//!     let summary = runner
//!         .run("qwen2.5:1.5b", &questions, &template, None, &mut sink)
//!         .await?;
//!
//!     println!("{} answers, {} failed", summary.processed, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Generator**: async text-generation seam, implemented by [`OllamaClient`]
//! - **BatchRunner**: question loop writing one CSV row per question
//! - **SimilarityScorer**: chunked embeddings and cosine scores per model
//! - **BlindJudge**: anonymized ranking with retry, persisted by [`JudgeRun`]

pub mod backend;
pub mod config;
pub mod dataset;
pub mod error;
pub mod interrupt;
pub mod judge;
pub mod runner;
pub mod similarity;

// Re-export commonly used types
pub use backend::{Generator, OllamaClient};
pub use config::Config;
pub use dataset::{QuestionRecord, RowRange, Table};
pub use error::{EvalError, Result};
pub use interrupt::Interrupt;
pub use judge::{BlindJudge, JudgeOutcome, JudgeRun, PlacementStats};
pub use runner::{AnswerSink, BatchRunner, RunSummary};
pub use similarity::{Encoder, SimilarityReport, SimilarityScorer};
