//! Columnar frame.

use std::collections::HashSet;

use crate::column::{Cell, Column, ColumnType};
use crate::error::{FrameError, Result};
use crate::schema::Schema;

/// Named, equal-length columns in a fixed order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Frame {
    /// Build a frame. Names must be unique and columns equally long.
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self> {
        let mut frame = Frame::default();
        for (name, column) in columns {
            frame.push_column(name, column)?;
        }
        Ok(frame)
    }

    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.names.iter().any(|n| *n == name) {
            return Err(FrameError::DuplicateColumn(name));
        }
        if let Some(first) = self.columns.first() {
            if first.len() != column.len() {
                return Err(FrameError::LengthMismatch {
                    column: name,
                    expected: first.len(),
                    actual: column.len(),
                });
            }
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    pub fn nrows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_at(&self, index: usize) -> Option<(&str, &Column)> {
        Some((self.names.get(index)?.as_str(), self.columns.get(index)?))
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Column by name, failing with `UnknownColumn` when absent.
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.position(name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| FrameError::UnknownColumn {
                column: name.to_string(),
                context: "frame".to_string(),
            })
    }

    pub fn cell(&self, row: usize, col: usize) -> Cell<'_> {
        self.columns.get(col).map_or(Cell::Missing, |c| c.cell(row))
    }

    pub fn schema(&self) -> Schema {
        let columns = self
            .names
            .iter()
            .cloned()
            .zip(self.columns.iter().map(Column::column_type))
            .collect();
        // names are unique by construction
        Schema::new(columns).unwrap_or_default()
    }

    /// Coerce `name` to categorical.
    ///
    /// Idempotent: returns `false` when the column was already categorical.
    pub fn as_factor(&mut self, name: &str) -> Result<bool> {
        let index = self.position(name).ok_or_else(|| FrameError::UnknownColumn {
            column: name.to_string(),
            context: "as_factor".to_string(),
        })?;
        let column = &mut self.columns[index];
        if column.column_type() == ColumnType::Categorical {
            return Ok(false);
        }
        *column = column.to_categorical();
        Ok(true)
    }

    /// New frame with the named columns, in the given order.
    pub fn select<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<Frame> {
        let mut out = Frame::default();
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                return Err(FrameError::DuplicateColumn(name.to_string()));
            }
            out.push_column(name, self.column(name)?.clone())?;
        }
        Ok(out)
    }

    /// New frame with rows `indices`, in that order.
    pub fn take_rows(&self, indices: &[usize]) -> Frame {
        Frame {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::new(vec![
            ("age".into(), Column::from_f64([50.0, 61.0, f64::NAN])),
            ("C2".into(), Column::from_f64([0.0, 1.0, 1.0])),
            ("surgery".into(), Column::from_labels(["yes", "no", "no"])),
        ])
        .unwrap()
    }

    #[test]
    fn test_shape_and_lookup() {
        let frame = sample();
        assert_eq!(frame.nrows(), 3);
        assert_eq!(frame.ncols(), 3);
        assert_eq!(frame.cell(0, 0), Cell::Number(50.0));
        assert!(frame.cell(2, 0).is_missing());
        assert!(frame.column("agee").is_err());
        assert_eq!(frame.schema().column_type("surgery"), Some(ColumnType::Categorical));
    }

    #[test]
    fn test_as_factor_is_idempotent() {
        let mut frame = sample();
        assert!(frame.as_factor("C2").unwrap());
        let once = frame.clone();
        assert!(!frame.as_factor("C2").unwrap());
        assert_eq!(frame, once);
        assert_eq!(frame.column("C2").unwrap().levels().unwrap(), vec!["0", "1"]);
        assert!(!frame.as_factor("surgery").unwrap());
    }

    #[test]
    fn test_as_factor_unknown_column() {
        let mut frame = sample();
        let err = frame.as_factor("C9").unwrap_err();
        assert!(matches!(err, FrameError::UnknownColumn { ref context, .. } if context == "as_factor"));
    }

    #[test]
    fn test_length_and_duplicate_checks() {
        let err = Frame::new(vec![
            ("a".into(), Column::from_f64([1.0])),
            ("b".into(), Column::from_f64([1.0, 2.0])),
        ])
        .unwrap_err();
        assert!(matches!(err, FrameError::LengthMismatch { expected: 1, actual: 2, .. }));

        let err = sample().select(["age", "age"]).unwrap_err();
        assert!(matches!(err, FrameError::DuplicateColumn(_)));
    }

    #[test]
    fn test_select_and_take_rows() {
        let frame = sample();
        let picked = frame.select(["surgery", "age"]).unwrap();
        assert_eq!(picked.names(), &["surgery".to_string(), "age".to_string()]);
        let rows = picked.take_rows(&[1]);
        assert_eq!(rows.nrows(), 1);
        assert_eq!(rows.cell(0, 0), Cell::Label("no"));
    }
}
