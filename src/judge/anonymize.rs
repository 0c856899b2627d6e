//! Model-to-label anonymization for blind judging.

use crate::error::{EvalError, Result};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default models under comparison.
pub const DEFAULT_MODELS: [&str; 4] = [
    "deepseek-r1:1.5b",
    "deepseek-r1:14b",
    "qwen2.5:1.5b",
    "qwen2.5:14b",
];

/// Opaque labels shown to the arbiter, in canonical order.
pub const DEFAULT_LABELS: [&str; 4] = ["Alpha", "Beta", "Gamma", "Delta"];

/// The fixed models under comparison and the labels that hide them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgePanel {
    models: Vec<String>,
    labels: Vec<String>,
}

impl JudgePanel {
    /// Validate a panel: same number of models and labels, no duplicates,
    /// and no label contained in another (the ranking parser matches labels
    /// by substring).
    pub fn new(models: Vec<String>, labels: Vec<String>) -> Result<Self> {
        if models.is_empty() {
            return Err(EvalError::Config("judge panel needs at least one model".to_string()));
        }
        if models.len() != labels.len() {
            return Err(EvalError::Config(format!(
                "judge panel has {} models but {} labels",
                models.len(),
                labels.len()
            )));
        }
        if models.iter().collect::<HashSet<_>>().len() != models.len() {
            return Err(EvalError::Config("duplicate model in judge panel".to_string()));
        }
        for (i, a) in labels.iter().enumerate() {
            if a.trim().is_empty() {
                return Err(EvalError::Config("judge labels must not be empty".to_string()));
            }
            for (j, b) in labels.iter().enumerate() {
                if i != j && b.contains(a.as_str()) {
                    return Err(EvalError::Config(format!(
                        "label '{}' is contained in label '{}'",
                        a, b
                    )));
                }
            }
        }
        Ok(Self { models, labels })
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Draw a fresh uniformly random bijection for one question.
    pub fn anonymize<R: Rng + ?Sized>(&self, rng: &mut R) -> Anonymization {
        Anonymization::draw(rng, &self.models, &self.labels)
    }
}

impl Default for JudgePanel {
    fn default() -> Self {
        Self {
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// One label and the model hiding behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelAssignment {
    pub label: String,
    pub model: String,
}

/// A label-to-model bijection, stored in canonical label order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Anonymization {
    assignments: Vec<LabelAssignment>,
}

impl Anonymization {
    /// Shuffle `labels` and pair the result with `models` position by
    /// position. Extra entries on either side are dropped.
    pub fn draw<R: Rng + ?Sized>(rng: &mut R, models: &[String], labels: &[String]) -> Self {
        let mut shuffled: Vec<&String> = labels.iter().collect();
        shuffled.shuffle(rng);

        let mut assignments: Vec<LabelAssignment> = shuffled
            .into_iter()
            .zip(models)
            .map(|(label, model)| LabelAssignment {
                label: label.clone(),
                model: model.clone(),
            })
            .collect();
        assignments.sort_by_key(|a| labels.iter().position(|l| *l == a.label));

        Self { assignments }
    }

    /// Assignments in canonical label order.
    pub fn assignments(&self) -> &[LabelAssignment] {
        &self.assignments
    }

    pub fn model_for(&self, label: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|a| a.label == label)
            .map(|a| a.model.as_str())
    }

    pub fn label_for(&self, model: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|a| a.model == model)
            .map(|a| a.label.as_str())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.assignments.iter().map(|a| a.label.as_str())
    }

    /// Models in canonical label order, which identifies the permutation.
    pub fn permutation(&self) -> Vec<&str> {
        self.assignments.iter().map(|a| a.model.as_str()).collect()
    }
}
