//! Persistence for judge runs.
//!
//! A run produces two files: the full outcome list as JSON, and a flat CSV
//! with one row per question and two columns per ranking position.

use super::ranking::RankSlot;
use super::run::{JudgeOutcome, Verdict};
use crate::error::{EvalError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const OUTCOMES_PREFIX: &str = "judge_outputs";
pub const SUMMARY_PREFIX: &str = "evaluation_results";
pub const NOT_RANKED: &str = "Not ranked";

/// Where a finalized run was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedRun {
    pub outcomes_path: PathBuf,
    pub summary_path: PathBuf,
}

impl SavedRun {
    pub(crate) fn in_dir(dir: &Path, stamp: &str) -> Self {
        Self {
            outcomes_path: dir.join(format!("{}_{}.json", OUTCOMES_PREFIX, stamp)),
            summary_path: dir.join(format!("{}_{}.csv", SUMMARY_PREFIX, stamp)),
        }
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Save outcomes as pretty-printed JSON.
pub fn save_outcomes(outcomes: &[JudgeOutcome], path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(outcomes)?;
    fs::write(path, json).map_err(|e| EvalError::io(path, e))
}

/// Load outcomes written by [`save_outcomes`].
pub fn load_outcomes(path: &Path) -> Result<Vec<JudgeOutcome>> {
    if !path.exists() {
        return Err(EvalError::SourceNotFound(path.to_path_buf()));
    }
    let json = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    serde_json::from_str(&json).map_err(|e| EvalError::Serialization(e.to_string()))
}

fn summary_header(positions: usize) -> Vec<String> {
    let mut header = vec![
        "QuestionID".to_string(),
        "Status".to_string(),
        "Judge_Reasoning".to_string(),
    ];
    for n in 1..=positions {
        header.push(format!("Position_{}_Model", n));
        header.push(format!("Position_{}_Letter", n));
    }
    header
}

fn summary_record(outcome: &JudgeOutcome, positions: usize) -> Vec<String> {
    let status = match outcome.verdict {
        Verdict::Ranked { .. } => "ranked",
        Verdict::Unjudged { .. } => "unjudged",
    };
    let mut record = vec![
        outcome.question_id.clone(),
        status.to_string(),
        outcome.response().to_string(),
    ];

    let ranking = outcome.ranking().unwrap_or_default();
    for n in 0..positions {
        match ranking.get(n) {
            Some(RankSlot::Label(label)) => {
                let model = outcome.label_to_model.model_for(label).unwrap_or("Unknown");
                record.push(model.to_string());
                record.push(label.clone());
            }
            Some(RankSlot::Unranked) | None => {
                record.push(NOT_RANKED.to_string());
                record.push(NOT_RANKED.to_string());
            }
        }
    }
    record
}

/// Write the per-question summary CSV.
pub fn write_summary(outcomes: &[JudgeOutcome], positions: usize, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let file = fs::File::create(path).map_err(|e| EvalError::io(path, e))?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record(summary_header(positions))?;
    for outcome in outcomes {
        writer.write_record(summary_record(outcome, positions))?;
    }
    writer.flush().map_err(|e| EvalError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Table;
    use crate::judge::anonymize::JudgePanel;
    use chrono::Utc;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::TempDir;

    fn outcomes() -> Vec<JudgeOutcome> {
        let panel = JudgePanel::default();
        let mut rng = StdRng::seed_from_u64(4);
        vec![
            JudgeOutcome {
                question_id: "q1".to_string(),
                label_to_model: panel.anonymize(&mut rng),
                verdict: Verdict::Ranked {
                    response: "1. Beta\n2. Alpha".to_string(),
                    ranking: vec![
                        RankSlot::Label("Beta".to_string()),
                        RankSlot::Label("Alpha".to_string()),
                        RankSlot::Unranked,
                        RankSlot::Unranked,
                    ],
                },
                timestamp: Utc::now(),
            },
            JudgeOutcome {
                question_id: "q2".to_string(),
                label_to_model: panel.anonymize(&mut rng),
                verdict: Verdict::Unjudged {
                    reason: "timeout".to_string(),
                },
                timestamp: Utc::now(),
            },
        ]
    }

    #[test]
    fn test_outcomes_json_is_readable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.json");
        let outcomes = outcomes();

        save_outcomes(&outcomes, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"status\": \"ranked\""));
        assert!(text.contains("\"status\": \"unjudged\""));
        assert!(text.contains("\"unranked\""));

        assert_eq!(load_outcomes(&path).unwrap(), outcomes);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            load_outcomes(Path::new("/nonexistent/judge.json")),
            Err(EvalError::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_summary_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.csv");
        let outcomes = outcomes();

        write_summary(&outcomes, 4, &path).unwrap();
        let table = Table::from_csv_path(&path).unwrap();

        assert_eq!(table.headers().len(), 3 + 8);
        assert_eq!(table.headers()[3], "Position_1_Model");
        assert_eq!(table.headers()[10], "Position_4_Letter");

        let q1 = &table.rows()[0];
        assert_eq!(q1[1], "ranked");
        assert_eq!(q1[2], "1. Beta\n2. Alpha");
        assert_eq!(q1[3], outcomes[0].label_to_model.model_for("Beta").unwrap());
        assert_eq!(q1[4], "Beta");
        assert_eq!(q1[7], NOT_RANKED);

        let q2 = &table.rows()[1];
        assert_eq!(q2[1], "unjudged");
        assert_eq!(q2[2], "");
        assert!(q2[3..].iter().all(|cell| cell == NOT_RANKED));
    }

    #[test]
    fn test_file_names() {
        let saved = SavedRun::in_dir(Path::new("results"), "20250101_120000");
        assert_eq!(saved.outcomes_path, Path::new("results/judge_outputs_20250101_120000.json"));
        assert_eq!(saved.summary_path, Path::new("results/evaluation_results_20250101_120000.csv"));
    }
}
