//! Closed, 0-indexed row ranges (`--range start:end`).

use crate::error::{EvalError, Result};
use std::fmt;
use std::str::FromStr;

/// A closed interval `[start, end]` of 0-based row positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    start: usize,
    end: usize,
}

impl RowRange {
    /// Create a range, rejecting `start > end`.
    pub fn new(start: usize, end: usize) -> Result<Self> {
        if start > end {
            return Err(EvalError::invalid_range(
                format!("{}:{}", start, end),
                "begin must not be greater than end",
            ));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// The part of `items` inside the range. `end` past the last item is clamped.
    pub fn apply<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        if self.start >= items.len() {
            return &[];
        }
        let end = (self.end + 1).min(items.len());
        &items[self.start..end]
    }
}

/// Apply an optional range; `None` selects everything.
pub fn select<T>(items: &[T], range: Option<RowRange>) -> &[T] {
    match range {
        Some(range) => range.apply(items),
        None => items,
    }
}

impl FromStr for RowRange {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 {
            return Err(EvalError::invalid_range(
                s,
                "expected two values separated by ':' (e.g. \"0:99\")",
            ));
        }

        let parse = |part: &str| -> Result<usize> {
            let value: i64 = part
                .trim()
                .parse()
                .map_err(|_| EvalError::invalid_range(s, format!("'{}' is not an integer", part)))?;
            usize::try_from(value)
                .map_err(|_| EvalError::invalid_range(s, "values must be non-negative"))
        };

        let start = parse(parts[0])?;
        let end = parse(parts[1])?;
        Self::new(start, end).map_err(|_| {
            EvalError::invalid_range(s, "begin must not be greater than end")
        })
    }
}

impl fmt::Display for RowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}
