//! Placement counts over judged questions.

use super::run::JudgeOutcome;
use std::collections::BTreeSet;
use std::fmt;

/// How often each model finished in each position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementStats {
    models: Vec<String>,
    /// `counts[model][position]`
    counts: Vec<Vec<usize>>,
    ranked: usize,
    unjudged: usize,
}

impl PlacementStats {
    /// Tally placements for `models`. Unjudged outcomes and unranked slots
    /// add nothing; models not in `models` are ignored.
    pub fn from_outcomes(outcomes: &[JudgeOutcome], models: &[String]) -> Self {
        let positions = models.len();
        let mut counts = vec![vec![0; positions]; models.len()];
        let mut ranked = 0;
        let mut unjudged = 0;

        for outcome in outcomes {
            if !outcome.is_ranked() {
                unjudged += 1;
                continue;
            }
            ranked += 1;

            for (position, model) in outcome.ranked_models().into_iter().enumerate().take(positions) {
                let Some(model) = model else { continue };
                if let Some(index) = models.iter().position(|m| m == model) {
                    counts[index][position] += 1;
                }
            }
        }

        Self {
            models: models.to_vec(),
            counts,
            ranked,
            unjudged,
        }
    }

    /// Every model named in the outcomes' label assignments, sorted.
    pub fn models_in(outcomes: &[JudgeOutcome]) -> Vec<String> {
        outcomes
            .iter()
            .flat_map(|o| o.label_to_model.assignments())
            .map(|a| a.model.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Times `model` finished at `place` (1 = best).
    pub fn count(&self, model: &str, place: usize) -> usize {
        let Some(index) = self.models.iter().position(|m| m == model) else {
            return 0;
        };
        place
            .checked_sub(1)
            .and_then(|p| self.counts[index].get(p))
            .copied()
            .unwrap_or(0)
    }

    pub fn ranked(&self) -> usize {
        self.ranked
    }

    pub fn unjudged(&self) -> usize {
        self.unjudged
    }
}

fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

impl fmt::Display for PlacementStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.models.iter().map(|m| m.len()).max().unwrap_or(5).max(5);

        write!(f, "{:<width$}", "Model", width = width)?;
        for place in 1..=self.models.len() {
            write!(f, " {:>6}", ordinal(place))?;
        }
        writeln!(f)?;

        for (model, counts) in self.models.iter().zip(&self.counts) {
            write!(f, "{:<width$}", model, width = width)?;
            for count in counts {
                write!(f, " {:>6}", count)?;
            }
            writeln!(f)?;
        }

        write!(f, "Ranked: {}  Unjudged: {}", self.ranked, self.unjudged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::anonymize::JudgePanel;
    use crate::judge::ranking::RankSlot;
    use crate::judge::run::Verdict;
    use chrono::Utc;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn outcome(panel: &JudgePanel, rng: &mut StdRng, first: &str, second: &str) -> JudgeOutcome {
        let anon = panel.anonymize(rng);
        let ranking = vec![
            RankSlot::Label(anon.label_for(first).unwrap().to_string()),
            RankSlot::Label(anon.label_for(second).unwrap().to_string()),
        ];
        JudgeOutcome {
            question_id: "q".to_string(),
            label_to_model: anon,
            verdict: Verdict::Ranked {
                response: String::new(),
                ranking,
            },
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_counts_follow_models_not_labels() {
        let models = vec!["a".to_string(), "b".to_string()];
        let panel = JudgePanel::new(models.clone(), vec!["X".into(), "Y".into()]).unwrap();
        let mut rng = StdRng::seed_from_u64(12);

        let mut outcomes = vec![
            outcome(&panel, &mut rng, "a", "b"),
            outcome(&panel, &mut rng, "a", "b"),
            outcome(&panel, &mut rng, "b", "a"),
        ];
        outcomes.push(JudgeOutcome {
            verdict: Verdict::Unjudged {
                reason: "failed".to_string(),
            },
            ..outcomes[0].clone()
        });

        let stats = PlacementStats::from_outcomes(&outcomes, &models);
        assert_eq!(stats.count("a", 1), 2);
        assert_eq!(stats.count("a", 2), 1);
        assert_eq!(stats.count("b", 1), 1);
        assert_eq!(stats.count("b", 2), 2);
        assert_eq!(stats.count("a", 0), 0);
        assert_eq!(stats.count("missing", 1), 0);
        assert_eq!(stats.ranked(), 3);
        assert_eq!(stats.unjudged(), 1);

        assert_eq!(PlacementStats::models_in(&outcomes), models);

        let table = stats.to_string();
        assert!(table.contains("1st"));
        assert!(table.contains("Unjudged: 1"));
    }

    #[test]
    fn test_ordinals() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(22), "22nd");
    }
}
