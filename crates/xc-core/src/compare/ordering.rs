//! Rank agreement between two score columns.

use xc_common::{Error, MismatchDetail, MismatchKind, Result};
use xc_frame::PredictionTable;
use xc_math::{spearman, within_tolerance, NaMode};

use super::result::{ComparisonKind, ComparisonResult};

fn numeric_column(table: &PredictionTable, column: &str) -> Result<Vec<f64>> {
    table.numeric(column).map_err(|e| {
        Error::from(
            MismatchDetail::new(
                MismatchKind::Columns,
                format!("numeric column '{}'", column),
                e.to_string(),
            )
            .in_column(column),
        )
    })
}

/// Spearman correlation of `column` in `a` and `b` must reach `min_rho`.
///
/// Rows with a missing score on either side are dropped. `max_discrepancy`
/// reports `1 - rho`, so a perfect agreement shows as zero.
pub fn compare_ordering(
    a: &PredictionTable,
    b: &PredictionTable,
    column: &str,
    min_rho: f64,
) -> Result<ComparisonResult> {
    let left = numeric_column(a, column)?;
    let right = numeric_column(b, column)?;
    if left.len() != right.len() {
        return Err(Error::from(MismatchDetail::new(
            MismatchKind::RowCount,
            format!("{} rows", left.len()),
            format!("{} rows", right.len()),
        )));
    }

    let rho = spearman(&left, &right, NaMode::CompleteObs).map_err(|e| {
        Error::from(
            MismatchDetail::new(MismatchKind::Ordering, "rank correlation", e.to_string())
                .in_column(column),
        )
    })?;

    let complete = left
        .iter()
        .zip(&right)
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .count();

    let tolerance = 1.0 - min_rho;
    let mut result = ComparisonResult::new(ComparisonKind::Reproducibility, tolerance);
    result.rows_compared = complete;
    result.rows_skipped = left.len() - complete;
    result.cells_compared = complete;

    // constant scores give NaN rho; only acceptable when both sides are identical
    let gap = if rho.is_nan() {
        let identical = left
            .iter()
            .zip(&right)
            .all(|(x, y)| x == y || (x.is_nan() && y.is_nan()));
        if identical {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        1.0 - rho
    };
    let failed = !within_tolerance(gap, tolerance);
    result.observe(gap, failed, || {
        MismatchDetail::new(
            MismatchKind::Ordering,
            format!("spearman >= {}", min_rho),
            format!("spearman = {}", rho),
        )
        .in_column(column)
        .with_magnitude(gap, tolerance)
    });
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(values: &[f64]) -> PredictionTable {
        PredictionTable::from_values("anomaly_score", values.iter().copied())
    }

    #[test]
    fn test_same_order_passes() {
        let a = scores(&[0.71, 0.42, 0.48, 0.55]);
        let b = scores(&[0.69, 0.40, 0.47, 0.58]);
        let result = compare_ordering(&a, &b, "anomaly_score", 0.95).unwrap();
        assert!(result.passed);
        assert!(result.max_discrepancy < 1e-12);
        assert_eq!(result.rows_compared, 4);
    }

    #[test]
    fn test_reversed_order_fails() {
        let a = scores(&[0.1, 0.2, 0.3, 0.4]);
        let b = scores(&[0.4, 0.3, 0.2, 0.1]);
        let result = compare_ordering(&a, &b, "anomaly_score", 0.9).unwrap();
        assert!(!result.passed);
        assert_eq!(result.worst.unwrap().kind, MismatchKind::Ordering);
    }

    #[test]
    fn test_missing_scores_dropped() {
        let a = scores(&[0.1, f64::NAN, 0.3, 0.4]);
        let b = scores(&[0.2, 0.5, 0.3, 0.9]);
        let result = compare_ordering(&a, &b, "anomaly_score", 0.99).unwrap();
        assert!(result.passed);
        assert_eq!(result.rows_skipped, 1);
    }

    #[test]
    fn test_constant_scores_with_na_match_themselves() {
        let a = scores(&[0.5, f64::NAN, 0.5]);
        let result = compare_ordering(&a, &a.clone(), "anomaly_score", 0.9).unwrap();
        assert!(result.passed);
        assert_eq!(result.max_discrepancy, 0.0);
        assert_eq!(result.rows_skipped, 1);
    }

    #[test]
    fn test_constant_scores_differing_in_na_fail() {
        let a = scores(&[0.5, f64::NAN, 0.5]);
        let b = scores(&[0.5, 0.5, f64::NAN]);
        let result = compare_ordering(&a, &b, "anomaly_score", 0.9).unwrap();
        assert!(!result.passed);
    }

    #[test]
    fn test_length_mismatch_is_structural() {
        let a = scores(&[0.1, 0.2]);
        let b = scores(&[0.1]);
        let err = compare_ordering(&a, &b, "anomaly_score", 0.9).unwrap_err();
        assert_eq!(err.mismatch().unwrap().kind, MismatchKind::RowCount);
    }
}
