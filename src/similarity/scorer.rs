//! Semantic similarity between model reasoning and reference solutions.
//!
//! For every model in the plan and every row of the merged analysis table,
//! the `{model}_reasoning` text and the reference solution are embedded
//! (chunked and mean-pooled) and compared by cosine similarity. Anything
//! that prevents a meaningful number yields NaN instead of aborting.

use super::chunking::{cosine_similarity, embed_text};
use super::encoder::Encoder;
use crate::dataset::{Column, Table};
use crate::error::{EvalError, Result};
use crate::interrupt::Interrupt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Identifier columns carried through to the output, in preference order.
pub const ID_COLUMNS: [&str; 3] = ["uuid", "QuestionID", "id"];

/// Category column carried through for math and proof datasets.
pub const CATEGORY_COLUMN: &str = "problem_type";

/// One (question, model) similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityRow {
    pub question_id: String,
    pub model_id: String,
    /// Cosine similarity, or NaN when it could not be computed.
    pub cosine_similarity: f64,
    /// `{model}_time` value from the input, if the column exists.
    pub elapsed_seconds: Option<String>,
}

/// Columns for one candidate model.
#[derive(Debug, Clone)]
struct CandidateColumns {
    model: String,
    reasoning: Option<Column>,
    time: Option<Column>,
}

/// Column accessors resolved once against the input table.
#[derive(Debug, Clone)]
pub struct ScoringPlan {
    reference: Column,
    id: Option<Column>,
    category: Option<Column>,
    candidates: Vec<CandidateColumns>,
}

impl ScoringPlan {
    /// Resolve the plan for `models` against `table`.
    ///
    /// The reference column is matched ignoring case and must exist. A model
    /// without a `{model}_reasoning` column scores NaN on every row.
    /// `keep_category` passes `problem_type` through when present.
    pub fn resolve(
        table: &Table,
        models: &[String],
        reference_column: &str,
        keep_category: bool,
    ) -> Result<Self> {
        let reference = table.column_ci(reference_column)?;

        let candidates = models
            .iter()
            .map(|model| {
                let reasoning = table.find(&format!("{}_reasoning", model));
                if reasoning.is_none() {
                    warn!(model = %model, "No '{}_reasoning' column; every row will score NaN", model);
                }
                CandidateColumns {
                    model: model.clone(),
                    reasoning,
                    time: table.find(&format!("{}_time", model)),
                }
            })
            .collect();

        Ok(Self {
            reference,
            id: table.first_present(&ID_COLUMNS),
            category: if keep_category {
                table.find(CATEGORY_COLUMN)
            } else {
                None
            },
            candidates,
        })
    }

    pub fn reference_column(&self) -> &str {
        self.reference.name()
    }
}

/// Scores for one model, aligned with the input rows.
#[derive(Debug, Clone)]
pub struct ModelScores {
    pub model: String,
    pub scores: Vec<f64>,
    pub times: Option<Vec<String>>,
}

/// Wide similarity result: passthrough columns plus one score column per model.
#[derive(Debug, Clone)]
pub struct SimilarityReport {
    id_column: Option<(String, Vec<String>)>,
    category_column: Option<(String, Vec<String>)>,
    row_count: usize,
    models: Vec<ModelScores>,
    /// False when an interrupt stopped scoring early.
    pub complete: bool,
}

impl SimilarityReport {
    pub fn models(&self) -> &[ModelScores] {
        &self.models
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Long-format rows, grouped by model in plan order.
    pub fn rows(&self) -> Vec<SimilarityRow> {
        let ids = self.id_column.as_ref().map(|(_, v)| v);
        self.models
            .iter()
            .flat_map(|m| {
                m.scores.iter().enumerate().map(move |(i, score)| SimilarityRow {
                    question_id: ids
                        .and_then(|v| v.get(i).cloned())
                        .unwrap_or_else(|| i.to_string()),
                    model_id: m.model.clone(),
                    cosine_similarity: *score,
                    elapsed_seconds: m.times.as_ref().and_then(|t| t.get(i).cloned()),
                })
            })
            .collect()
    }

    /// Write the wide CSV: id, category, then `{model}_cosine` (and
    /// `{model}_time` when present) per model. NaN is written as `NaN`;
    /// rows an interrupted run never reached are left empty.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
            }
        }

        let mut writer = csv::Writer::from_path(path)?;

        let mut header: Vec<String> = Vec::new();
        if let Some((name, _)) = &self.id_column {
            header.push(name.clone());
        }
        if let Some((name, _)) = &self.category_column {
            header.push(name.clone());
        }
        for m in &self.models {
            header.push(format!("{}_cosine", m.model));
            if m.times.is_some() {
                header.push(format!("{}_time", m.model));
            }
        }
        writer.write_record(&header)?;

        for i in 0..self.row_count {
            let mut record: Vec<String> = Vec::with_capacity(header.len());
            if let Some((_, values)) = &self.id_column {
                record.push(values[i].clone());
            }
            if let Some((_, values)) = &self.category_column {
                record.push(values[i].clone());
            }
            for m in &self.models {
                record.push(m.scores.get(i).map(|s| format_score(*s)).unwrap_or_default());
                if let Some(times) = &m.times {
                    record.push(times[i].clone());
                }
            }
            writer.write_record(&record)?;
        }

        writer.flush().map_err(|e| EvalError::io(path, e))?;
        Ok(())
    }
}

fn format_score(score: f64) -> String {
    if score.is_nan() {
        "NaN".to_string()
    } else {
        score.to_string()
    }
}

/// Default output path: `<input stem>_cosine.csv` next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("similarity");
    input.with_file_name(format!("{}_cosine.csv", stem))
}

/// Embedding-based scorer.
pub struct SimilarityScorer<E: Encoder> {
    encoder: E,
    interrupt: Interrupt,
    progress_every: usize,
}

impl<E: Encoder> SimilarityScorer<E> {
    pub fn new(encoder: E) -> Self {
        Self {
            encoder,
            interrupt: Interrupt::new(),
            progress_every: 100,
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Similarity of one candidate/reference pair.
    ///
    /// Empty or whitespace-only input short-circuits to NaN without touching
    /// the encoder. Encoder errors and non-finite embeddings also give NaN.
    pub fn similarity(&self, candidate: &str, reference: &str) -> f64 {
        if candidate.trim().is_empty() || reference.trim().is_empty() {
            return f64::NAN;
        }

        let pooled = embed_text(&self.encoder, candidate)
            .and_then(|c| embed_text(&self.encoder, reference).map(|r| (c, r)));

        match pooled {
            Ok((c, r)) => {
                if c.iter().chain(r.iter()).any(|x| !x.is_finite()) {
                    warn!("Non-finite embedding component; recording NaN");
                    f64::NAN
                } else {
                    cosine_similarity(&c, &r)
                }
            }
            Err(e) => {
                warn!(error = %e, "Embedding failed; recording NaN");
                f64::NAN
            }
        }
    }

    /// Score every planned model against every row, one model at a time.
    pub fn score(&self, table: &Table, plan: &ScoringPlan) -> SimilarityReport {
        let rows = table.rows();
        let mut report = SimilarityReport {
            id_column: plan
                .id
                .as_ref()
                .map(|c| (c.name().to_string(), rows.iter().map(|r| c.get(r).to_string()).collect())),
            category_column: plan
                .category
                .as_ref()
                .map(|c| (c.name().to_string(), rows.iter().map(|r| c.get(r).to_string()).collect())),
            row_count: rows.len(),
            models: Vec::with_capacity(plan.candidates.len()),
            complete: true,
        };

        'models: for candidate in &plan.candidates {
            info!(model = %candidate.model, "Scoring model");
            let mut scores = Vec::with_capacity(rows.len());
            let times = candidate
                .time
                .as_ref()
                .map(|c| rows.iter().map(|r| c.get(r).to_string()).collect());

            for (i, row) in rows.iter().enumerate() {
                if self.interrupt.is_triggered() {
                    report.complete = false;
                    report.models.push(ModelScores {
                        model: candidate.model.clone(),
                        scores,
                        times,
                    });
                    break 'models;
                }

                if i % self.progress_every == 0 {
                    info!("Processing row {} for model {}", i, candidate.model);
                }

                let reasoning = candidate.reasoning.as_ref().map(|c| c.get(row)).unwrap_or("");
                let reference = plan.reference.get(row);
                scores.push(self.similarity(reasoning, reference));
            }

            report.models.push(ModelScores {
                model: candidate.model.clone(),
                scores,
                times,
            });
        }

        report
    }
}
