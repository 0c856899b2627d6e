//! The judging loop and its outcomes.

use super::anonymize::{Anonymization, JudgePanel};
use super::output::{self, SavedRun};
use super::prompt::{JudgeQuestion, build_judge_prompt};
use super::ranking::{RankSlot, deanonymize, parse_ranking};
use crate::backend::Generator;
use crate::config::JudgeConfig;
use crate::error::Result;
use crate::interrupt::Interrupt;
use chrono::{DateTime, Local, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the arbiter produced for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Ranked {
        response: String,
        ranking: Vec<RankSlot>,
    },
    /// Every attempt failed.
    Unjudged { reason: String },
}

/// The judged result for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeOutcome {
    pub question_id: String,
    pub label_to_model: Anonymization,
    #[serde(flatten)]
    pub verdict: Verdict,
    pub timestamp: DateTime<Utc>,
}

impl JudgeOutcome {
    /// Raw arbiter text; empty when unjudged.
    pub fn response(&self) -> &str {
        match &self.verdict {
            Verdict::Ranked { response, .. } => response,
            Verdict::Unjudged { .. } => "",
        }
    }

    pub fn ranking(&self) -> Option<&[RankSlot]> {
        match &self.verdict {
            Verdict::Ranked { ranking, .. } => Some(ranking),
            Verdict::Unjudged { .. } => None,
        }
    }

    pub fn is_ranked(&self) -> bool {
        matches!(self.verdict, Verdict::Ranked { .. })
    }

    /// Model at each position, best first. Empty when unjudged.
    pub fn ranked_models(&self) -> Vec<Option<&str>> {
        self.ranking()
            .map(|ranking| deanonymize(ranking, &self.label_to_model))
            .unwrap_or_default()
    }
}

/// Arbiter call settings.
#[derive(Debug, Clone)]
pub struct JudgeSettings {
    pub arbiter_model: String,
    pub system_prompt: String,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub question_delay: Duration,
}

impl JudgeSettings {
    pub fn from_config(config: &JudgeConfig, system_prompt: impl Into<String>) -> Self {
        Self {
            arbiter_model: config.arbiter_model.clone(),
            system_prompt: system_prompt.into(),
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            question_delay: Duration::from_millis(config.question_delay_ms),
        }
    }

    /// Delay after failed attempt `attempt` (0-based).
    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Outcome of a whole judging pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JudgeSummary {
    pub ranked: usize,
    pub unjudged: usize,
    pub interrupted: bool,
}

/// Ranks anonymized candidate answers with an arbiter model.
///
/// Each question gets its own freshly drawn label assignment, so labels
/// carry no information about models across questions.
pub struct BlindJudge<G: Generator, R: Rng> {
    backend: G,
    panel: JudgePanel,
    settings: JudgeSettings,
    rng: R,
    interrupt: Interrupt,
}

impl<G: Generator, R: Rng> BlindJudge<G, R> {
    pub fn new(backend: G, panel: JudgePanel, settings: JudgeSettings, rng: R) -> Self {
        Self {
            backend,
            panel,
            settings,
            rng,
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn panel(&self) -> &JudgePanel {
        &self.panel
    }

    /// Judge one question. Returns `None` only if interrupted.
    pub async fn judge(&mut self, question: &JudgeQuestion) -> Option<JudgeOutcome> {
        let anonymization = self.panel.anonymize(&mut self.rng);
        let prompt = build_judge_prompt(question, &anonymization);
        debug!(question_id = %question.id, chars = prompt.len(), "Built judge prompt");

        let verdict = match self.ask(&question.id, &prompt).await? {
            Ok(response) => {
                let ranking = parse_ranking(&response, self.panel.labels());
                Verdict::Ranked { response, ranking }
            }
            Err(reason) => Verdict::Unjudged { reason },
        };

        Some(JudgeOutcome {
            question_id: question.id.clone(),
            label_to_model: anonymization,
            verdict,
            timestamp: Utc::now(),
        })
    }

    /// Call the arbiter with retries. The inner `Err` is the last failure.
    async fn ask(&self, question_id: &str, prompt: &str) -> Option<std::result::Result<String, String>> {
        let system = Some(self.settings.system_prompt.as_str()).filter(|s| !s.is_empty());
        let mut last_error = String::new();

        for attempt in 0..self.settings.max_attempts {
            let result = tokio::select! {
                biased;
                _ = self.interrupt.cancelled() => return None,
                result = self.backend.generate(&self.settings.arbiter_model, prompt, system) => result,
            };

            match result {
                Ok(response) => return Some(Ok(response)),
                Err(e) => {
                    warn!(
                        question_id,
                        attempt = attempt + 1,
                        max_attempts = self.settings.max_attempts,
                        error = %e,
                        "Arbiter call failed"
                    );
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < self.settings.max_attempts
                && !self.pause(self.settings.backoff(attempt)).await
            {
                return None;
            }
        }

        Some(Err(last_error))
    }

    /// Sleep unless interrupted. Returns `false` on interrupt.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.interrupt.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Judge every question in order, recording outcomes into `run`.
    ///
    /// Stops early on interrupt; outcomes recorded so far stay in `run`.
    pub async fn judge_all(&mut self, questions: &[JudgeQuestion], run: &mut JudgeRun) -> JudgeSummary {
        let mut summary = JudgeSummary::default();

        for (i, question) in questions.iter().enumerate() {
            if self.interrupt.is_triggered() {
                summary.interrupted = true;
                break;
            }
            if i > 0 && !self.pause(self.settings.question_delay).await {
                summary.interrupted = true;
                break;
            }

            info!(question_id = %question.id, "Judging question ({}/{})", i + 1, questions.len());

            let Some(outcome) = self.judge(question).await else {
                summary.interrupted = true;
                break;
            };

            if outcome.is_ranked() {
                summary.ranked += 1;
            } else {
                summary.unjudged += 1;
                warn!(question_id = %question.id, "Question left unjudged");
            }
            run.record(outcome);
        }

        if summary.interrupted {
            warn!(judged = run.len(), "Judging interrupted");
        }

        summary
    }
}

/// Outcomes collected over one judging run.
#[derive(Debug, Clone)]
pub struct JudgeRun {
    positions: usize,
    outcomes: Vec<JudgeOutcome>,
}

impl JudgeRun {
    /// `positions` is the number of ranking slots (one per model).
    pub fn new(positions: usize) -> Self {
        Self {
            positions,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: JudgeOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[JudgeOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Write the outcome JSON and the summary CSV into `dir`, named with
    /// the local time.
    pub fn finalize(&self, dir: &Path) -> Result<SavedRun> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let saved = SavedRun::in_dir(dir, &stamp);

        output::save_outcomes(&self.outcomes, &saved.outcomes_path)?;
        output::write_summary(&self.outcomes, self.positions, &saved.summary_path)?;

        info!(
            outcomes = %saved.outcomes_path.display(),
            summary = %saved.summary_path.display(),
            count = self.outcomes.len(),
            "Saved judge results"
        );
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use crate::judge::prompt::CandidateAnswer;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Fails the first `failures` calls, then ranks the candidates in the
    /// reverse of their prompt order.
    struct ScriptedArbiter {
        failures: usize,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedArbiter {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Generator for ScriptedArbiter {
        async fn generate(&self, _model: &str, prompt: &str, _system: Option<&str>) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if call < self.failures {
                return Err(EvalError::Backend("model overloaded".to_string()));
            }

            let labels: Vec<&str> = prompt
                .lines()
                .filter_map(|line| line.strip_prefix("# Candidate answer "))
                .collect();
            let ranking: Vec<String> = labels
                .iter()
                .rev()
                .enumerate()
                .map(|(i, label)| format!("{}. {}", i + 1, label))
                .collect();
            Ok(format!("Ranking:\n{}", ranking.join("\n")))
        }
    }

    fn settings() -> JudgeSettings {
        JudgeSettings {
            arbiter_model: "arbiter".to_string(),
            system_prompt: "Rank the candidates.".to_string(),
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
            question_delay: Duration::ZERO,
        }
    }

    fn question(id: &str) -> JudgeQuestion {
        let panel = JudgePanel::default();
        JudgeQuestion {
            id: id.to_string(),
            text: "Prove it".to_string(),
            solution: "QED".to_string(),
            candidates: panel
                .models()
                .iter()
                .map(|m| CandidateAnswer {
                    model: m.clone(),
                    reasoning: format!("steps of {}", m.len()),
                    solution: "42".to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_ranking_is_deanonymized() {
        let arbiter = ScriptedArbiter::new(0);
        let mut judge = BlindJudge::new(&arbiter, JudgePanel::default(), settings(), StdRng::seed_from_u64(5));

        let outcome = judge.judge(&question("q1")).await.unwrap();
        let expected: Vec<Option<&str>> = ["Delta", "Gamma", "Beta", "Alpha"]
            .iter()
            .map(|label| outcome.label_to_model.model_for(label))
            .collect();

        assert!(outcome.is_ranked());
        assert_eq!(outcome.ranked_models(), expected);
        assert!(outcome.response().starts_with("Ranking:"));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let arbiter = ScriptedArbiter::new(2);
        let mut judge = BlindJudge::new(&arbiter, JudgePanel::default(), settings(), StdRng::seed_from_u64(5));

        let outcome = judge.judge(&question("q1")).await.unwrap();
        assert!(outcome.is_ranked());
        assert_eq!(arbiter.calls(), 3);

        // retries reuse the same anonymized prompt
        let prompts = arbiter.prompts.lock().unwrap();
        assert!(prompts.iter().all(|p| p == &prompts[0]));
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_unjudged() {
        let arbiter = ScriptedArbiter::new(usize::MAX);
        let mut judge = BlindJudge::new(&arbiter, JudgePanel::default(), settings(), StdRng::seed_from_u64(5));
        let mut run = JudgeRun::new(4);

        let summary = judge.judge_all(&[question("q1"), question("q2")], &mut run).await;

        assert_eq!(arbiter.calls(), 6);
        assert_eq!(summary.unjudged, 2);
        assert_eq!(run.len(), 2);
        assert!(run.outcomes().iter().all(|o| !o.is_ranked()));
        assert!(matches!(
            &run.outcomes()[0].verdict,
            Verdict::Unjudged { reason } if reason.contains("overloaded")
        ));
    }

    #[tokio::test]
    async fn test_each_question_draws_new_labels() {
        let arbiter = ScriptedArbiter::new(0);
        let mut judge = BlindJudge::new(&arbiter, JudgePanel::default(), settings(), StdRng::seed_from_u64(8));
        let mut run = JudgeRun::new(4);
        let questions: Vec<_> = (0..30).map(|i| question(&format!("q{}", i))).collect();

        let summary = judge.judge_all(&questions, &mut run).await;
        assert_eq!(summary.ranked, 30);

        let first = run.outcomes()[0].label_to_model.clone();
        assert!(run.outcomes().iter().any(|o| o.label_to_model != first));

        for prompt in arbiter.prompts.lock().unwrap().iter() {
            for model in JudgePanel::default().models() {
                assert!(!prompt.contains(model.as_str()));
            }
        }
    }

    #[tokio::test]
    async fn test_interrupt_keeps_partial_run() {
        let arbiter = ScriptedArbiter::new(0);
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let mut judge = BlindJudge::new(&arbiter, JudgePanel::default(), settings(), StdRng::seed_from_u64(1))
            .with_interrupt(interrupt);
        let mut run = JudgeRun::new(4);

        let summary = judge.judge_all(&[question("q1")], &mut run).await;

        assert!(summary.interrupted);
        assert!(run.is_empty());
        assert_eq!(arbiter.calls(), 0);

        let dir = TempDir::new().unwrap();
        let saved = run.finalize(dir.path()).unwrap();
        assert!(saved.outcomes_path.exists());
        assert!(saved.summary_path.exists());
    }

    #[tokio::test]
    async fn test_finalize_writes_both_files() {
        let arbiter = ScriptedArbiter::new(0);
        let mut judge = BlindJudge::new(&arbiter, JudgePanel::default(), settings(), StdRng::seed_from_u64(2));
        let mut run = JudgeRun::new(4);
        judge.judge_all(&[question("q1"), question("q2")], &mut run).await;

        let dir = TempDir::new().unwrap();
        let saved = run.finalize(dir.path()).unwrap();

        let name = saved.outcomes_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("judge_outputs_") && name.ends_with(".json"));

        let loaded = output::load_outcomes(&saved.outcomes_path).unwrap();
        assert_eq!(loaded, run.outcomes());
    }

    #[test]
    fn test_backoff_doubles() {
        let s = JudgeSettings {
            backoff_base: Duration::from_secs(1),
            ..settings()
        };
        assert_eq!(s.backoff(0), Duration::from_secs(1));
        assert_eq!(s.backoff(1), Duration::from_secs(2));
        assert_eq!(s.backoff(2), Duration::from_secs(4));
    }
}
