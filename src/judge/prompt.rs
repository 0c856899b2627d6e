//! Judge input rows and prompt assembly.

use super::anonymize::Anonymization;
use crate::dataset::{Column, Table};
use crate::error::Result;
use tracing::warn;

pub const MISSING_REASONING: &str = "No reasoning provided";
pub const MISSING_SOLUTION: &str = "No solution provided";

/// Column names read from the merged answer table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeColumns {
    pub id: String,
    pub question: String,
    pub solution: String,
}

impl Default for JudgeColumns {
    fn default() -> Self {
        Self {
            id: "QuestionID".to_string(),
            question: "Answer".to_string(),
            solution: "Solution".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CandidateColumns {
    model: String,
    reasoning: Option<Column>,
    solution: Option<Column>,
}

/// Column positions for judging, resolved once per table.
#[derive(Debug, Clone)]
pub struct JudgeSchema {
    id: Column,
    question: Column,
    solution: Column,
    candidates: Vec<CandidateColumns>,
}

impl JudgeSchema {
    /// Resolve the id, question and official solution columns (all
    /// required) and each model's `{model}_reasoning` and `{model}_solution`
    /// columns (optional; absent ones render as placeholders).
    pub fn resolve(table: &Table, columns: &JudgeColumns, models: &[String]) -> Result<Self> {
        let id = table.column_ci(&columns.id)?;
        let question = table.column_ci(&columns.question)?;
        let solution = table.column_ci(&columns.solution)?;

        let candidates = models
            .iter()
            .map(|model| {
                let reasoning = table.find(&format!("{}_reasoning", model));
                let solution = table.find(&format!("{}_solution", model));
                if reasoning.is_none() && solution.is_none() {
                    warn!("No answer columns for model '{}' in {}", model, table.name());
                }
                CandidateColumns {
                    model: model.clone(),
                    reasoning,
                    solution,
                }
            })
            .collect();

        Ok(Self {
            id,
            question,
            solution,
            candidates,
        })
    }

    pub fn question(&self, row: &[String]) -> JudgeQuestion {
        let candidates = self
            .candidates
            .iter()
            .map(|c| CandidateAnswer {
                model: c.model.clone(),
                reasoning: cell_or(c.reasoning.as_ref(), row, MISSING_REASONING),
                solution: cell_or(c.solution.as_ref(), row, MISSING_SOLUTION),
            })
            .collect();

        JudgeQuestion {
            id: self.id.get(row).to_string(),
            text: self.question.get(row).to_string(),
            solution: self.solution.get(row).to_string(),
            candidates,
        }
    }

    /// All rows of `table` as judge questions, in table order.
    pub fn questions(&self, table: &Table) -> Vec<JudgeQuestion> {
        table.rows().iter().map(|row| self.question(row)).collect()
    }
}

fn cell_or(column: Option<&Column>, row: &[String], placeholder: &str) -> String {
    match column.map(|c| c.get(row)) {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ => placeholder.to_string(),
    }
}

/// One model's answer to a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateAnswer {
    pub model: String,
    pub reasoning: String,
    pub solution: String,
}

/// Everything the arbiter needs for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeQuestion {
    pub id: String,
    pub text: String,
    pub solution: String,
    pub candidates: Vec<CandidateAnswer>,
}

impl JudgeQuestion {
    fn candidate(&self, model: &str) -> Option<&CandidateAnswer> {
        self.candidates.iter().find(|c| c.model == model)
    }
}

/// Build the arbiter prompt. Candidates appear in canonical label order and
/// are identified only by label.
pub fn build_judge_prompt(question: &JudgeQuestion, anonymization: &Anonymization) -> String {
    let mut prompt = format!(
        "# Question\nQuestion ID: {}\n{}\n\n# Solution\n{}\n\n",
        question.id, question.text, question.solution
    );

    for assignment in anonymization.assignments() {
        let (reasoning, solution) = match question.candidate(&assignment.model) {
            Some(c) => (c.reasoning.as_str(), c.solution.as_str()),
            None => (MISSING_REASONING, MISSING_SOLUTION),
        };
        prompt.push_str(&format!(
            "# Candidate answer {}\nReasoning: {}\nFinal Answer: {}\n\n",
            assignment.label, reasoning, solution
        ));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::anonymize::JudgePanel;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn models() -> Vec<String> {
        vec!["small-model".to_string(), "large-model".to_string()]
    }

    fn table() -> Table {
        let csv = "\
QuestionID,Answer,Solution,small-model_reasoning,small-model_solution,large-model_solution
q1,What is 2+2?,4,Added the numbers,4,four
q2,What is 3*3?,9,,9,9
";
        Table::from_reader("merged.csv", csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_schema_reads_candidates_with_placeholders() {
        let table = table();
        let schema = JudgeSchema::resolve(&table, &JudgeColumns::default(), &models()).unwrap();
        let questions = schema.questions(&table);

        assert_eq!(questions.len(), 2);
        let q1 = &questions[0];
        assert_eq!(q1.id, "q1");
        assert_eq!(q1.text, "What is 2+2?");
        assert_eq!(q1.solution, "4");
        assert_eq!(q1.candidates[0].reasoning, "Added the numbers");
        assert_eq!(q1.candidates[1].reasoning, MISSING_REASONING);
        assert_eq!(q1.candidates[1].solution, "four");

        // empty cell falls back too
        assert_eq!(questions[1].candidates[0].reasoning, MISSING_REASONING);
    }

    #[test]
    fn test_schema_requires_solution_column() {
        let table = Table::from_reader("t.csv", "QuestionID,Answer\nq1,x\n".as_bytes()).unwrap();
        assert!(JudgeSchema::resolve(&table, &JudgeColumns::default(), &models()).is_err());
    }

    #[test]
    fn test_prompt_layout_and_blindness() {
        let table = table();
        let schema = JudgeSchema::resolve(&table, &JudgeColumns::default(), &models()).unwrap();
        let question = schema.question(&table.rows()[0]);

        let panel = JudgePanel::new(models(), vec!["Alpha".into(), "Beta".into()]).unwrap();
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..20 {
            let anon = panel.anonymize(&mut rng);
            let prompt = build_judge_prompt(&question, &anon);

            assert!(prompt.starts_with("# Question\nQuestion ID: q1\nWhat is 2+2?\n\n# Solution\n4\n\n"));
            for model in models() {
                assert!(!prompt.contains(&model), "prompt leaks {}", model);
            }

            let alpha = prompt.find("# Candidate answer Alpha").unwrap();
            let beta = prompt.find("# Candidate answer Beta").unwrap();
            assert!(alpha < beta);

            // the answer under Alpha belongs to whichever model drew Alpha
            let alpha_model = anon.model_for("Alpha").unwrap();
            let expected = question
                .candidates
                .iter()
                .find(|c| c.model == alpha_model)
                .unwrap();
            let block = format!(
                "# Candidate answer Alpha\nReasoning: {}\nFinal Answer: {}\n\n",
                expected.reasoning, expected.solution
            );
            assert!(prompt.contains(&block));
        }
    }
}
