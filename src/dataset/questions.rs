//! Question sets and prompt templates.
//!
//! Supports:
//! - SQLite question stores (`SELECT id, text [, solution] FROM <table>`)
//! - CSV question pools with a header row

use super::table::{Column, Table};
use crate::error::{EvalError, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A single question as loaded from the reference store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Identifier, unique within the dataset.
    pub id: String,
    /// The question body sent to the model.
    pub prompt_text: String,
    /// Reference answer, if the source carries one.
    pub official_solution: Option<String>,
    /// Domain tag (e.g. the `problem_type` of a math question).
    pub category: Option<String>,
}

impl QuestionRecord {
    pub fn new(id: impl Into<String>, prompt_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt_text: prompt_text.into(),
            official_solution: None,
            category: None,
        }
    }
}

/// Names of the columns a question source exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub id: String,
    pub text: String,
    pub solution: Option<String>,
    pub category: Option<String>,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            text: "problem".to_string(),
            solution: None,
            category: None,
        }
    }
}

/// Validated accessors for a question table.
#[derive(Debug, Clone)]
pub struct QuestionSchema {
    id: Column,
    text: Column,
    solution: Option<Column>,
    category: Option<Column>,
}

impl QuestionSchema {
    /// Resolve every named column against `table` (ignoring case), failing
    /// on the first one that is missing.
    pub fn resolve(table: &Table, names: &ColumnNames) -> Result<Self> {
        Ok(Self {
            id: table.column_ci(&names.id)?,
            text: table.column_ci(&names.text)?,
            solution: names
                .solution
                .as_deref()
                .map(|n| table.column_ci(n))
                .transpose()?,
            category: names
                .category
                .as_deref()
                .map(|n| table.column_ci(n))
                .transpose()?,
        })
    }

    /// Build a record from one table row.
    pub fn record(&self, row: &[String]) -> QuestionRecord {
        QuestionRecord {
            id: self.id.get(row).to_string(),
            prompt_text: self.text.get(row).to_string(),
            official_solution: self.solution.as_ref().map(|c| c.get(row).to_string()),
            category: self.category.as_ref().map(|c| c.get(row).to_string()),
        }
    }
}

/// Where questions come from.
#[derive(Debug, Clone)]
pub enum QuestionSource {
    /// CSV file with a header row.
    Csv { path: PathBuf, columns: ColumnNames },
    /// SQLite database table.
    Sqlite {
        path: PathBuf,
        table: String,
        columns: ColumnNames,
    },
}

impl QuestionSource {
    /// Pick the source kind from the file extension: `.db`, `.sqlite` and
    /// `.sqlite3` are SQLite stores, anything else is read as CSV.
    pub fn from_path(path: impl Into<PathBuf>, table: impl Into<String>, columns: ColumnNames) -> Self {
        let path = path.into();
        match path.extension().and_then(|e| e.to_str()) {
            Some("db") | Some("sqlite") | Some("sqlite3") => QuestionSource::Sqlite {
                path,
                table: table.into(),
                columns,
            },
            _ => QuestionSource::Csv { path, columns },
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            QuestionSource::Csv { path, .. } | QuestionSource::Sqlite { path, .. } => path,
        }
    }

    /// Load every question, in source order.
    pub fn load(&self) -> Result<Vec<QuestionRecord>> {
        if !self.path().exists() {
            return Err(EvalError::SourceNotFound(self.path().to_path_buf()));
        }

        match self {
            QuestionSource::Csv { path, columns } => load_csv_questions(path, columns),
            QuestionSource::Sqlite {
                path,
                table,
                columns,
            } => load_sqlite_questions(path, table, columns),
        }
    }
}

fn load_csv_questions(path: &Path, columns: &ColumnNames) -> Result<Vec<QuestionRecord>> {
    let table = Table::from_csv_path(path)?;
    let schema = QuestionSchema::resolve(&table, columns)?;
    Ok(table.rows().iter().map(|row| schema.record(row)).collect())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn load_sqlite_questions(
    path: &Path,
    table: &str,
    columns: &ColumnNames,
) -> Result<Vec<QuestionRecord>> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let mut selected = vec![quote_ident(&columns.id), quote_ident(&columns.text)];
    if let Some(solution) = &columns.solution {
        selected.push(quote_ident(solution));
    }
    if let Some(category) = &columns.category {
        selected.push(quote_ident(category));
    }
    let sql = format!(
        "SELECT {} FROM {}",
        selected.join(", "),
        quote_ident(table)
    );

    let mut stmt = conn.prepare(&sql)?;
    let solution_idx = columns.solution.as_ref().map(|_| 2);
    let category_idx = columns
        .category
        .as_ref()
        .map(|_| if solution_idx.is_some() { 3 } else { 2 });

    let rows = stmt.query_map([], |row| {
        let optional = |idx: Option<usize>| -> rusqlite::Result<Option<String>> {
            idx.map(|i| row.get_ref(i).map(value_to_string)).transpose()
        };
        Ok(QuestionRecord {
            id: value_to_string(row.get_ref(0)?),
            prompt_text: value_to_string(row.get_ref(1)?),
            official_solution: optional(solution_idx)?,
            category: optional(category_idx)?,
        })
    })?;

    let mut questions = Vec::new();
    for row in rows {
        questions.push(row?);
    }
    Ok(questions)
}

/// Integer ids are common in SQLite stores; everything is carried as text.
fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
    }
}

/// Load a prompt template, trimmed of surrounding whitespace.
pub fn load_prompt(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(EvalError::PromptNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_csv_questions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("verbal_questions_pool.csv");
        std::fs::write(&path, "ID,Problem,Solution\n1,What is 2+2?,4\n2,\"Define, briefly.\",ok\n").unwrap();

        let columns = ColumnNames {
            solution: Some("solution".to_string()),
            ..Default::default()
        };
        let questions = QuestionSource::from_path(&path, "unused", columns).load().unwrap();

        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].id, "1");
        assert_eq!(questions[1].prompt_text, "Define, briefly.");
        assert_eq!(questions[0].official_solution.as_deref(), Some("4"));
        assert!(questions[0].category.is_none());
    }

    #[test]
    fn test_csv_missing_text_column_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pool.csv");
        std::fs::write(&path, "id,question\n1,hi\n").unwrap();

        let err = QuestionSource::from_path(&path, "", ColumnNames::default())
            .load()
            .unwrap_err();
        assert!(matches!(err, EvalError::MissingColumn { .. }));
    }

    #[test]
    fn test_load_sqlite_questions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("math_questions.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE math_questions (id INTEGER PRIMARY KEY, problem TEXT, solution TEXT, problem_type TEXT);
                 INSERT INTO math_questions VALUES (7, 'Integrate x', 'x^2/2', 'calculus');
                 INSERT INTO math_questions VALUES (9, 'Factor 12', '2*2*3', 'algebra');",
            )
            .unwrap();
        }

        let columns = ColumnNames {
            solution: Some("solution".to_string()),
            category: Some("problem_type".to_string()),
            ..Default::default()
        };
        let source = QuestionSource::from_path(&path, "math_questions", columns);
        assert!(matches!(source, QuestionSource::Sqlite { .. }));

        let questions = source.load().unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].id, "7");
        assert_eq!(questions[0].prompt_text, "Integrate x");
        assert_eq!(questions[0].official_solution.as_deref(), Some("x^2/2"));
        assert_eq!(questions[1].category.as_deref(), Some("algebra"));
    }

    #[test]
    fn test_missing_source() {
        let source = QuestionSource::from_path("/nonexistent/q.db", "t", ColumnNames::default());
        assert!(matches!(source.load(), Err(EvalError::SourceNotFound(_))));
    }

    #[test]
    fn test_load_prompt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("math_question_prompt.txt");
        std::fs::write(&path, "\n  Solve step by step.\n\n").unwrap();
        assert_eq!(load_prompt(&path).unwrap(), "Solve step by step.");

        let missing = dir.path().join("nope.txt");
        assert!(matches!(load_prompt(&missing), Err(EvalError::PromptNotFound(_))));
    }
}
