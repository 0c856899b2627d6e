//! In-memory view of a delimited file with a header row.
//!
//! Columns are resolved by name once, up front, into [`Column`] accessors.
//! After that, reading a field is an index lookup that cannot fail: short
//! rows read as empty strings.

use crate::error::{EvalError, Result};
use std::io::Read;
use std::path::Path;

/// A resolved column: its position in the header plus its header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    index: usize,
    name: String,
}

impl Column {
    /// Header name as it appears in the file.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Field value for this column in `row`, or "" if the row is short.
    pub fn get<'a>(&self, row: &'a [String]) -> &'a str {
        row.get(self.index).map(String::as_str).unwrap_or("")
    }
}

/// Header plus string rows.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table from parts (mostly for tests).
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Load a CSV file with a header row.
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EvalError::SourceNotFound(path.to_path_buf()));
        }
        let file = std::fs::File::open(path).map_err(|e| EvalError::io(path, e))?;
        Self::from_reader(path.display().to_string(), file)
    }

    /// Read CSV data with a header row from any reader.
    pub fn from_reader<R: Read>(name: impl Into<String>, reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self {
            name: name.into(),
            headers,
            rows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a column by exact header name.
    pub fn find(&self, name: &str) -> Option<Column> {
        self.headers
            .iter()
            .position(|h| h == name)
            .map(|index| Column {
                index,
                name: self.headers[index].clone(),
            })
    }

    /// Look up a column ignoring ASCII case. An exact match wins if present.
    pub fn find_ci(&self, name: &str) -> Option<Column> {
        self.find(name).or_else(|| {
            self.headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .map(|index| Column {
                    index,
                    name: self.headers[index].clone(),
                })
        })
    }

    /// Like [`Table::find`], but a missing column is an error.
    pub fn column(&self, name: &str) -> Result<Column> {
        self.find(name)
            .ok_or_else(|| EvalError::missing_column(name, &self.name))
    }

    /// Like [`Table::find_ci`], but a missing column is an error.
    pub fn column_ci(&self, name: &str) -> Result<Column> {
        self.find_ci(name)
            .ok_or_else(|| EvalError::missing_column(name, &self.name))
    }

    /// First of `names` that exists (exact match), in the order given.
    pub fn first_present(&self, names: &[&str]) -> Option<Column> {
        names.iter().find_map(|name| self.find(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let data = "QuestionID,Solution,qwen2.5:14b_reasoning\nq1,42,because\nq2,7\n";
        Table::from_reader("sample.csv", data.as_bytes()).unwrap()
    }

    #[test]
    fn test_reads_headers_and_rows() {
        let table = sample();
        assert_eq!(table.len(), 2);
        assert_eq!(table.headers()[2], "qwen2.5:14b_reasoning");
    }

    #[test]
    fn test_short_rows_read_empty() {
        let table = sample();
        let reasoning = table.column("qwen2.5:14b_reasoning").unwrap();
        assert_eq!(reasoning.get(&table.rows()[0]), "because");
        assert_eq!(reasoning.get(&table.rows()[1]), "");
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let table = sample();
        assert!(table.find("solution").is_none());
        let col = table.column_ci("solution").unwrap();
        assert_eq!(col.name(), "Solution");
        assert_eq!(col.index(), 1);
    }

    #[test]
    fn test_missing_column_is_error() {
        let table = sample();
        let err = table.column_ci("answer").unwrap_err();
        assert!(matches!(err, EvalError::MissingColumn { .. }));
        assert!(err.to_string().contains("sample.csv"));
    }

    #[test]
    fn test_first_present_respects_order() {
        let table = Table::new(
            "t",
            vec!["id".into(), "uuid".into()],
            vec![],
        );
        assert_eq!(table.first_present(&["uuid", "QuestionID", "id"]).unwrap().name(), "uuid");
        assert!(table.first_present(&["QuestionID"]).is_none());
    }

    #[test]
    fn test_quoted_multiline_fields() {
        let data = "id,response\n1,\"line one\nline two, with comma\"\n";
        let table = Table::from_reader("quoted", data.as_bytes()).unwrap();
        let response = table.column("response").unwrap();
        assert_eq!(response.get(&table.rows()[0]), "line one\nline two, with comma");
    }
}
