//! Outcome of a single comparison.

use serde::{Deserialize, Serialize};
use std::fmt;
use xc_common::{Error, MismatchDetail, Result};
use xc_math::DiffMeasure;

/// Which pair of values a comparison looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonKind {
    /// In-process predictions vs. the exported artifact's predictions.
    ArtifactParity,
    /// Two prediction tables supplied directly.
    Tables,
    /// A derived scalar vs. an independent reference value.
    Reference,
    /// Per-row threshold predicates on one column.
    Thresholds,
    /// Two in-process fits of the same configuration.
    Reproducibility,
}

impl fmt::Display for ComparisonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComparisonKind::ArtifactParity => "artifact_parity",
            ComparisonKind::Tables => "tables",
            ComparisonKind::Reference => "reference",
            ComparisonKind::Thresholds => "thresholds",
            ComparisonKind::Reproducibility => "reproducibility",
        };
        write!(f, "{}", s)
    }
}

/// Pass/fail plus enough detail to act on a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub kind: ComparisonKind,

    pub passed: bool,

    /// Largest discrepancy seen under the active measure. Infinite when a
    /// label or missingness mismatch was found.
    pub max_discrepancy: f64,

    pub tolerance: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure: Option<DiffMeasure>,

    /// The worst offending cell (or the first, among equally bad ones).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst: Option<MismatchDetail>,

    pub rows_compared: usize,

    pub rows_skipped: usize,

    pub cells_compared: usize,

    /// Number of cells (or predicates) outside tolerance.
    pub failures: usize,
}

impl ComparisonResult {
    pub fn new(kind: ComparisonKind, tolerance: f64) -> Self {
        Self {
            kind,
            passed: true,
            max_discrepancy: 0.0,
            tolerance,
            measure: None,
            worst: None,
            rows_compared: 0,
            rows_skipped: 0,
            cells_compared: 0,
            failures: 0,
        }
    }

    /// Record a discrepancy; failures beyond the worst one are only counted.
    pub fn observe(&mut self, magnitude: f64, failed: bool, detail: impl FnOnce() -> MismatchDetail) {
        if magnitude > self.max_discrepancy || magnitude.is_nan() {
            self.max_discrepancy = if magnitude.is_nan() {
                f64::INFINITY
            } else {
                magnitude
            };
            if failed {
                self.worst = Some(detail());
            }
        } else if failed && self.worst.is_none() {
            self.worst = Some(detail());
        }
        if failed {
            self.failures += 1;
            self.passed = false;
        }
    }

    /// `Ok(self)` when passed, otherwise a `ComparisonFailure` carrying the
    /// worst mismatch.
    pub fn into_verdict(self) -> Result<ComparisonResult> {
        if self.passed {
            return Ok(self);
        }
        let detail = self.worst.clone().unwrap_or_else(|| {
            MismatchDetail::new(
                xc_common::MismatchKind::Value,
                "agreement",
                format!("{} failures", self.failures),
            )
            .with_magnitude(self.max_discrepancy, self.tolerance)
        });
        Err(Error::from(detail))
    }

    /// One-line summary for human output.
    pub fn summary_line(&self) -> String {
        let status = if self.passed { "PASS" } else { "FAIL" };
        let mut line = format!(
            "{} {}: max discrepancy {:e} (tolerance {:e}",
            status, self.kind, self.max_discrepancy, self.tolerance
        );
        if let Some(measure) = self.measure {
            line.push_str(&format!(", {}", measure));
        }
        line.push(')');
        if self.rows_compared > 0 || self.rows_skipped > 0 {
            line.push_str(&format!(
                ", {} rows compared, {} skipped",
                self.rows_compared, self.rows_skipped
            ));
        }
        if let Some(worst) = &self.worst {
            line.push_str(&format!("; worst: {}", worst));
        }
        line
    }
}
