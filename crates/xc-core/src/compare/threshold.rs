//! Per-row threshold predicates on a single prediction column.
//!
//! These are smoke assertions ("row 0 looks anomalous, row 5 does not"),
//! not equivalence checks. Calibrated against one backend build.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use xc_common::{Error, MismatchDetail, MismatchKind, Result};
use xc_frame::{format_number, PredictionTable};

use super::result::{ComparisonKind, ComparisonResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdOp {
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
}

impl ThresholdOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ThresholdOp::Ge => ">=",
            ThresholdOp::Le => "<=",
            ThresholdOp::Gt => ">",
            ThresholdOp::Lt => "<",
        }
    }

    pub fn holds(self, value: f64, bound: f64) -> bool {
        match self {
            ThresholdOp::Ge => value >= bound,
            ThresholdOp::Le => value <= bound,
            ThresholdOp::Gt => value > bound,
            ThresholdOp::Lt => value < bound,
        }
    }
}

/// `table[row][column] <op> value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdAssertion {
    pub row: usize,
    pub op: ThresholdOp,
    pub value: f64,
}

impl ThresholdAssertion {
    pub fn new(row: usize, op: ThresholdOp, value: f64) -> Self {
        Self { row, op, value }
    }

    pub fn at_least(row: usize, value: f64) -> Self {
        Self::new(row, ThresholdOp::Ge, value)
    }

    pub fn at_most(row: usize, value: f64) -> Self {
        Self::new(row, ThresholdOp::Le, value)
    }
}

impl fmt::Display for ThresholdAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.row, self.op.symbol(), format_number(self.value))
    }
}

impl FromStr for ThresholdAssertion {
    type Err = String;

    /// Parse `"<row><op><value>"`, e.g. `"0>=0.6"` or `"33 <= 0.55"`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // two-character operators first so ">=" is not read as ">"
        let ops = [
            ThresholdOp::Ge,
            ThresholdOp::Le,
            ThresholdOp::Gt,
            ThresholdOp::Lt,
        ];
        let (op, at) = ops
            .iter()
            .find_map(|op| s.find(op.symbol()).map(|at| (*op, at)))
            .ok_or_else(|| format!("no comparison operator in '{}'", s))?;

        let row = s[..at]
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid row in '{}': {}", s, e))?;
        let value = s[at + op.symbol().len()..]
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid value in '{}': {}", s, e))?;
        Ok(Self { row, op, value })
    }
}

/// Evaluate every assertion against `column` of `table`.
///
/// An unknown column, a non-numeric column or a row past the end is a
/// structural failure (`Err`), never a silent skip.
pub fn evaluate_thresholds(
    table: &PredictionTable,
    column: &str,
    assertions: &[ThresholdAssertion],
) -> Result<ComparisonResult> {
    let values = table.numeric(column).map_err(|e| {
        Error::from(
            MismatchDetail::new(MismatchKind::Columns, format!("numeric column '{}'", column), e.to_string())
                .in_column(column),
        )
    })?;

    let mut result = ComparisonResult::new(ComparisonKind::Thresholds, 0.0);
    for assertion in assertions {
        let value = *values.get(assertion.row).ok_or_else(|| {
            Error::from(
                MismatchDetail::new(
                    MismatchKind::RowCount,
                    format!("row {}", assertion.row),
                    format!("{} rows", values.len()),
                )
                .in_column(column),
            )
        })?;

        let held = !value.is_nan() && assertion.op.holds(value, assertion.value);
        let margin = if value.is_nan() {
            f64::INFINITY
        } else if held {
            0.0
        } else {
            (value - assertion.value).abs()
        };

        result.rows_compared += 1;
        result.cells_compared += 1;
        result.observe(margin, !held, || {
            MismatchDetail::new(
                MismatchKind::Threshold,
                format!("{} {}", assertion.op.symbol(), format_number(assertion.value)),
                format_number(value),
            )
            .at_row(assertion.row)
            .in_column(column)
            .with_magnitude(margin, 0.0)
        });
    }
    Ok(result)
}
