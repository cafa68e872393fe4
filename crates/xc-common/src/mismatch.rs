//! Structured detail attached to failed comparisons.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of disagreement was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Row counts differ between the two tables.
    RowCount,
    /// Column counts or names differ between the two tables.
    Columns,
    /// A numeric difference exceeded the tolerance.
    Value,
    /// Categorical labels differ.
    Label,
    /// One side is missing where the other is not.
    Missingness,
    /// A per-row threshold predicate did not hold.
    Threshold,
    /// A derived scalar metric is outside tolerance of its reference.
    Scalar,
    /// Rank agreement fell below the required minimum.
    Ordering,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MismatchKind::RowCount => "row_count",
            MismatchKind::Columns => "columns",
            MismatchKind::Value => "value",
            MismatchKind::Label => "label",
            MismatchKind::Missingness => "missingness",
            MismatchKind::Threshold => "threshold",
            MismatchKind::Scalar => "scalar",
            MismatchKind::Ordering => "ordering",
        };
        write!(f, "{}", s)
    }
}

/// The worst (or first structural) disagreement found by a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MismatchDetail {
    pub kind: MismatchKind,

    /// Offending row index (0-based), when the mismatch is row-local.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,

    /// Offending column name, when the mismatch is column-local.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    /// Rendered value on the left/expected side.
    pub expected: String,

    /// Rendered value on the right/actual side.
    pub actual: String,

    /// Magnitude of the discrepancy under the active measure.
    pub magnitude: f64,

    /// Tolerance the magnitude was checked against.
    pub tolerance: f64,
}

impl MismatchDetail {
    pub fn new(kind: MismatchKind, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        MismatchDetail {
            kind,
            row: None,
            column: None,
            expected: expected.into(),
            actual: actual.into(),
            magnitude: f64::INFINITY,
            tolerance: 0.0,
        }
    }

    pub fn at_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    pub fn in_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_magnitude(mut self, magnitude: f64, tolerance: f64) -> Self {
        self.magnitude = magnitude;
        self.tolerance = tolerance;
        self
    }
}

impl fmt::Display for MismatchDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mismatch", self.kind)?;
        if let Some(row) = self.row {
            write!(f, " at row {}", row)?;
        }
        if let Some(column) = &self.column {
            write!(f, " in column '{}'", column)?;
        }
        write!(f, ": expected {}, got {}", self.expected, self.actual)?;
        if self.magnitude.is_finite() {
            write!(
                f,
                " (discrepancy {:e} > tolerance {:e})",
                self.magnitude, self.tolerance
            )?;
        }
        Ok(())
    }
}
