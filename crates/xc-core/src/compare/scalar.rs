//! Comparison of a derived scalar against a reference value.

use serde::{Deserialize, Serialize};
use xc_common::{MismatchDetail, MismatchKind};
use xc_frame::format_number;

use super::result::{ComparisonKind, ComparisonResult};

/// Which side of the reference is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// `|candidate - reference| < tolerance`.
    #[default]
    TwoSided,
    /// `candidate - reference < tolerance`: the candidate may be arbitrarily
    /// better (smaller) than the reference, but not worse by more than the
    /// tolerance.
    NotWorse,
}

/// A scalar pair plus its acceptance rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarCheck {
    pub name: String,
    pub candidate: f64,
    pub reference: f64,
    pub tolerance: f64,
    #[serde(default)]
    pub direction: Direction,
}

impl ScalarCheck {
    pub fn new(name: impl Into<String>, candidate: f64, reference: f64, tolerance: f64) -> Self {
        Self {
            name: name.into(),
            candidate,
            reference,
            tolerance,
            direction: Direction::TwoSided,
        }
    }

    pub fn not_worse(mut self) -> Self {
        self.direction = Direction::NotWorse;
        self
    }

    /// Signed or absolute gap, depending on direction. NaN on either side is
    /// an infinite gap.
    pub fn discrepancy(&self) -> f64 {
        if self.candidate.is_nan() || self.reference.is_nan() {
            return f64::INFINITY;
        }
        match self.direction {
            Direction::TwoSided => (self.candidate - self.reference).abs(),
            Direction::NotWorse => self.candidate - self.reference,
        }
    }
}

/// The gap must fall strictly below the tolerance. A gap of zero or less
/// always passes, so a zero tolerance demands an exact match.
pub fn compare_scalars(check: &ScalarCheck) -> ComparisonResult {
    let mut result = ComparisonResult::new(ComparisonKind::Reference, check.tolerance);
    let gap = check.discrepancy();
    let failed = gap.is_nan() || (gap > 0.0 && gap >= check.tolerance);

    result.cells_compared = 1;
    result.observe(gap.max(0.0), failed, || {
        MismatchDetail::new(
            MismatchKind::Scalar,
            format_number(check.reference),
            format_number(check.candidate),
        )
        .in_column(check.name.clone())
        .with_magnitude(gap, check.tolerance)
    });
    result
}
