//! Blind ranking judge.
//!
//! For every question the candidate answers of a fixed set of models are
//! relabeled with a freshly drawn random assignment of opaque labels, shown
//! to an arbiter model, and the arbiter's free-text ranking is parsed and
//! mapped back to model names.

pub mod anonymize;
pub mod output;
pub mod prompt;
pub mod ranking;
pub mod run;
pub mod stats;

pub use anonymize::{Anonymization, DEFAULT_LABELS, DEFAULT_MODELS, JudgePanel, LabelAssignment};
pub use output::{NOT_RANKED, SavedRun, load_outcomes, save_outcomes, write_summary};
pub use prompt::{CandidateAnswer, JudgeColumns, JudgeQuestion, JudgeSchema, build_judge_prompt};
pub use ranking::{RankSlot, deanonymize, parse_ranking};
pub use run::{BlindJudge, JudgeOutcome, JudgeRun, JudgeSettings, JudgeSummary, Verdict};
pub use stats::PlacementStats;
