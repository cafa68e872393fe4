//! Ranking and Spearman rank correlation.
//!
//! Ties share the rank of their first sorted position (competition ranking),
//! and the coefficient is the full Pearson formula over the ranks rather than
//! the `1 - 6Σd²/(n(n²-1))` shortcut, so repeated values do not bias it.

use crate::math::summary::{complete_pairs, nan_mean, population_variance};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How missing (NaN) observations are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaMode {
    /// Any NaN makes the coefficient NaN.
    Everything,
    /// Any NaN is an error.
    AllObs,
    /// Pairs with a NaN on either side are dropped.
    #[default]
    CompleteObs,
}

#[derive(Debug, Error, PartialEq)]
pub enum RankError {
    #[error("vectors have different lengths: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("mode is 'all_obs' but NAs are present")]
    NaPresent,

    #[error("no complete observations")]
    Empty,
}

/// Competition ranks (0-based) of `values` in ascending order.
///
/// Equal values receive the rank of the first of them in sorted order.
/// NaN values must be removed by the caller.
pub fn competition_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut skipped = 0usize;
    let mut last = f64::NAN;
    for (i, &idx) in order.iter().enumerate() {
        if values[idx] == last {
            skipped += 1;
        } else {
            skipped = 0;
        }
        last = values[idx];
        ranks[idx] = (i - skipped) as f64;
    }
    ranks
}

/// Pearson correlation with population standard deviations.
fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mx = nan_mean(x);
    let my = nan_mean(y);
    let sx = population_variance(x, mx).sqrt();
    let sy = population_variance(y, my).sqrt();
    let xy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    (xy - n * mx * my) / (n * sx * sy)
}

/// Spearman rank correlation coefficient between `x` and `y`.
///
/// Returns NaN when either ranked vector is constant.
pub fn spearman(x: &[f64], y: &[f64], mode: NaMode) -> Result<f64, RankError> {
    if x.len() != y.len() {
        return Err(RankError::LengthMismatch {
            left: x.len(),
            right: y.len(),
        });
    }

    let has_na = x.iter().chain(y).any(|v| v.is_nan());
    let (x, y) = match (mode, has_na) {
        (NaMode::Everything, true) => return Ok(f64::NAN),
        (NaMode::AllObs, true) => return Err(RankError::NaPresent),
        (NaMode::CompleteObs, true) => complete_pairs(x, y),
        (_, false) => (x.to_vec(), y.to_vec()),
    };

    if x.is_empty() {
        return Err(RankError::Empty);
    }

    let rx = competition_ranks(&x);
    let ry = competition_ranks(&y);
    Ok(pearson(&rx, &ry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_competition_ranks_with_ties() {
        assert_eq!(
            competition_ranks(&[10.0, 30.0, 20.0, 20.0]),
            vec![0.0, 3.0, 1.0, 1.0]
        );
        assert_eq!(competition_ranks(&[5.0, 5.0, 5.0]), vec![0.0, 0.0, 0.0]);
        assert!(competition_ranks(&[]).is_empty());
    }

    #[test]
    fn test_spearman_monotone_is_one() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 4.0, 9.0, 16.0, 25.0];
        let rho = spearman(&x, &y, NaMode::AllObs).unwrap();
        assert!((rho - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_spearman_reversed_is_minus_one() {
        let x = [0.1, 0.5, 0.9, 0.3];
        let y = [-0.1, -0.5, -0.9, -0.3];
        let rho = spearman(&x, &y, NaMode::AllObs).unwrap();
        assert!((rho + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_spearman_na_modes() {
        let x = [1.0, f64::NAN, 3.0, 4.0];
        let y = [2.0, 3.0, 5.0, 7.0];
        assert!(spearman(&x, &y, NaMode::Everything).unwrap().is_nan());
        assert_eq!(spearman(&x, &y, NaMode::AllObs), Err(RankError::NaPresent));
        let rho = spearman(&x, &y, NaMode::CompleteObs).unwrap();
        assert!((rho - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_spearman_length_mismatch_and_empty() {
        assert_eq!(
            spearman(&[1.0], &[1.0, 2.0], NaMode::CompleteObs),
            Err(RankError::LengthMismatch { left: 1, right: 2 })
        );
        assert_eq!(
            spearman(&[f64::NAN], &[1.0], NaMode::CompleteObs),
            Err(RankError::Empty)
        );
    }

    #[test]
    fn test_spearman_constant_is_nan() {
        let rho = spearman(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0], NaMode::AllObs).unwrap();
        assert!(rho.is_nan());
    }
}
