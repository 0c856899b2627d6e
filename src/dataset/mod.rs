//! Reference data access.
//!
//! This module provides:
//! - Question loading from SQLite stores and CSV pools
//! - Prompt template loading
//! - Header-resolved tables for the merged answer files the scorer and judge read
//! - `--range` parsing and slicing

pub mod questions;
pub mod range;
pub mod table;

pub use questions::{ColumnNames, QuestionRecord, QuestionSchema, QuestionSource, load_prompt};
pub use range::{RowRange, select};
pub use table::{Column, Table};
