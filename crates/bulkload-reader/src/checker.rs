//! Encoding and constraint checks applied to loaded rows.

use std::fmt;
use std::sync::Arc;

use crate::error::{ReaderError, Result};
use crate::types::{Datum, RowShape};

/// Client encodings a loader can be told its input uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Latin1,
    SqlAscii,
}

impl Encoding {
    pub fn from_name(name: &str) -> Option<Self> {
        let folded: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match folded.as_str() {
            "UTF8" | "UNICODE" => Some(Encoding::Utf8),
            "LATIN1" | "ISO88591" => Some(Encoding::Latin1),
            "SQLASCII" => Some(Encoding::SqlAscii),
            _ => None,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Utf8 => f.write_str("UTF8"),
            Encoding::Latin1 => f.write_str("LATIN1"),
            Encoding::SqlAscii => f.write_str("SQL_ASCII"),
        }
    }
}

/// Row predicate for a CHECK constraint.
pub type CheckPredicate = Arc<dyn Fn(&[Datum]) -> bool + Send + Sync>;

#[derive(Clone)]
struct CheckConstraint {
    name: String,
    predicate: CheckPredicate,
}

/// Validation state shared by a parser and the reader driver.
#[derive(Clone)]
pub struct Checker {
    /// Encoding named by `ENCODING`, if any.
    pub encoding: Option<Encoding>,
    /// Encoding rows are stored in.
    pub db_encoding: Encoding,
    /// Whether CHECK constraints run (`CHECK_CONSTRAINTS`).
    pub check_constraints: bool,
    constraints: Vec<CheckConstraint>,
}

impl Default for Checker {
    fn default() -> Self {
        Self {
            encoding: None,
            db_encoding: Encoding::Utf8,
            check_constraints: false,
            constraints: Vec::new(),
        }
    }
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named CHECK constraint.
    pub fn add_constraint<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&[Datum]) -> bool + Send + Sync + 'static,
    {
        self.constraints.push(CheckConstraint {
            name: name.into(),
            predicate: Arc::new(predicate),
        });
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Whether input must be checked (and converted) from a foreign encoding.
    pub fn needs_encoding_check(&self) -> bool {
        self.encoding.is_some_and(|e| e != self.db_encoding)
    }

    /// Apply NOT NULL and, when enabled, CHECK constraints to one row.
    pub fn check_row(&self, shape: &RowShape, values: &[Datum]) -> Result<()> {
        for (i, (column, value)) in shape.columns.iter().zip(values).enumerate() {
            if column.not_null && value.is_null() {
                return Err(ReaderError::Constraint {
                    field: i,
                    message: format!(
                        "null value in column \"{}\" violates not-null constraint",
                        column.name
                    ),
                });
            }
        }

        if self.check_constraints {
            if let Some(failed) = self.constraints.iter().find(|c| !(c.predicate)(values)) {
                return Err(ReaderError::Constraint {
                    field: 0,
                    message: format!("row violates check constraint \"{}\"", failed.name),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Checker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.constraints.iter().map(|c| c.name.as_str()).collect();
        f.debug_struct("Checker")
            .field("encoding", &self.encoding)
            .field("db_encoding", &self.db_encoding)
            .field("check_constraints", &self.check_constraints)
            .field("constraints", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, DataType};

    fn shape() -> RowShape {
        RowShape::anonymous(vec![
            Column::new("id", DataType::Int4).not_null(),
            Column::new("qty", DataType::Int4),
        ])
    }

    #[test]
    fn encoding_names() {
        assert_eq!(Encoding::from_name("utf-8"), Some(Encoding::Utf8));
        assert_eq!(Encoding::from_name("sql_ascii"), Some(Encoding::SqlAscii));
        assert_eq!(Encoding::from_name("ISO_8859_1"), Some(Encoding::Latin1));
        assert_eq!(Encoding::from_name("EBCDIC"), None);
    }

    #[test]
    fn not_null_always_enforced() {
        let checker = Checker::new();
        let err = checker
            .check_row(&shape(), &[Datum::Null, Datum::Int4(1)])
            .unwrap_err();
        assert!(matches!(err, ReaderError::Constraint { field: 0, .. }));
        checker
            .check_row(&shape(), &[Datum::Int4(1), Datum::Null])
            .unwrap();
    }

    #[test]
    fn check_constraints_only_when_enabled() {
        let mut checker = Checker::new();
        checker.add_constraint("qty_positive", |values| {
            !matches!(values.get(1), Some(Datum::Int4(q)) if *q <= 0)
        });
        let row = [Datum::Int4(1), Datum::Int4(-5)];

        checker.check_row(&shape(), &row).unwrap();

        checker.check_constraints = true;
        let err = checker.check_row(&shape(), &row).unwrap_err();
        assert!(err.to_string().contains("qty_positive"));
    }

    #[test]
    fn encoding_check_only_for_foreign_encodings() {
        let mut checker = Checker::new();
        assert!(!checker.needs_encoding_check());
        checker.encoding = Some(Encoding::Utf8);
        assert!(!checker.needs_encoding_check());
        checker.encoding = Some(Encoding::Latin1);
        assert!(checker.needs_encoding_check());
    }
}
