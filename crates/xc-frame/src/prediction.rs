//! Prediction output of either scoring path.

use std::path::Path;

use crate::column::Column;
use crate::csv::{read_csv, read_csv_str, CsvOptions};
use crate::error::{FrameError, Result};
use crate::frame::Frame;

/// Predictions, row-aligned with the scored dataset.
///
/// Classification output has a categorical `predict` column followed by
/// per-class probabilities; regression and survival output has numeric
/// columns only.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTable {
    frame: Frame,
}

impl PredictionTable {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }

    /// Parse scorer output.
    pub fn from_csv_str(text: &str) -> Result<Self> {
        read_csv_str(text, &CsvOptions::default()).map(Self::new)
    }

    pub fn read(path: &Path) -> Result<Self> {
        read_csv(path, &CsvOptions::default()).map(Self::new)
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }

    pub fn nrows(&self) -> usize {
        self.frame.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.frame.ncols()
    }

    pub fn names(&self) -> &[String] {
        self.frame.names()
    }

    /// Values of a numeric column, missing as NaN.
    pub fn numeric(&self, name: &str) -> Result<Vec<f64>> {
        let column = self.frame.column(name)?;
        column.to_f64_vec().ok_or_else(|| FrameError::TypeMismatch {
            column: name.to_string(),
            expected: "numeric".to_string(),
            actual: column.column_type().to_string(),
        })
    }

    /// Single-column numeric table (e.g. a linear predictor).
    pub fn from_values(name: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        let mut frame = Frame::default();
        // a single fresh column cannot collide or mismatch
        let _ = frame.push_column(name, Column::from_f64(values));
        Self { frame }
    }
}

impl From<Frame> for PredictionTable {
    fn from(frame: Frame) -> Self {
        Self::new(frame)
    }
}
