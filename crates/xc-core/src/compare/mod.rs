//! Comparators: tables row-by-row, scalars against references, threshold
//! predicates and rank agreement.
//!
//! Every comparator returns a [`ComparisonResult`]. Structural problems (row
//! or column counts that differ, unknown columns, rows past the end) are
//! `Err(ComparisonFailure)` so they can never pass silently; value
//! disagreements come back as `Ok` with `passed == false` and are turned into
//! errors with [`ComparisonResult::into_verdict`].

pub mod ordering;
pub mod result;
pub mod rowwise;
pub mod scalar;
pub mod threshold;

pub use ordering::compare_ordering;
pub use result::{ComparisonKind, ComparisonResult};
pub use rowwise::{compare_tables, CompareOptions};
pub use scalar::{compare_scalars, Direction, ScalarCheck};
pub use threshold::{evaluate_thresholds, ThresholdAssertion, ThresholdOp};
