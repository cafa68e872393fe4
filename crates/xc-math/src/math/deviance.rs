//! GLM deviance and the residual/null deviance ratio.
//!
//! The ratio is the scale-free goodness-of-fit figure used to compare a
//! backend-fitted GLM with an independent reference fit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Probabilities are clamped to `[EPS, 1 - EPS]` before taking logs.
const EPS: f64 = 1e-15;

/// Response distribution family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Binomial,
    Gaussian,
    Poisson,
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::Binomial => write!(f, "binomial"),
            Family::Gaussian => write!(f, "gaussian"),
            Family::Poisson => write!(f, "poisson"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DevianceError {
    #[error("response and prediction lengths differ: {response} vs {predicted}")]
    LengthMismatch { response: usize, predicted: usize },

    #[error("no observations")]
    Empty,

    #[error("response value {value} at row {row} is invalid for the {family} family")]
    InvalidResponse {
        row: usize,
        value: f64,
        family: Family,
    },

    #[error("null deviance is zero; the ratio is undefined")]
    ZeroNullDeviance,
}

fn unit_deviance(family: Family, y: f64, mu: f64) -> f64 {
    match family {
        Family::Binomial => {
            let p = mu.clamp(EPS, 1.0 - EPS);
            -2.0 * (y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        }
        Family::Gaussian => (y - mu).powi(2),
        Family::Poisson => {
            let mu = mu.max(EPS);
            let term = if y > 0.0 { y * (y / mu).ln() } else { 0.0 };
            2.0 * (term - (y - mu))
        }
    }
}

fn check_response(family: Family, response: &[f64]) -> Result<(), DevianceError> {
    for (row, &y) in response.iter().enumerate() {
        let valid = match family {
            Family::Binomial => y == 0.0 || y == 1.0,
            Family::Gaussian => y.is_finite(),
            Family::Poisson => y.is_finite() && y >= 0.0,
        };
        if !valid {
            return Err(DevianceError::InvalidResponse {
                row,
                value: y,
                family,
            });
        }
    }
    Ok(())
}

/// Residual deviance of fitted means `predicted` against `response`.
pub fn residual_deviance(
    family: Family,
    response: &[f64],
    predicted: &[f64],
) -> Result<f64, DevianceError> {
    if response.len() != predicted.len() {
        return Err(DevianceError::LengthMismatch {
            response: response.len(),
            predicted: predicted.len(),
        });
    }
    if response.is_empty() {
        return Err(DevianceError::Empty);
    }
    check_response(family, response)?;
    Ok(response
        .iter()
        .zip(predicted)
        .map(|(&y, &mu)| unit_deviance(family, y, mu))
        .sum())
}

/// Deviance of the intercept-only model (every fitted mean is `mean(y)`).
pub fn null_deviance(family: Family, response: &[f64]) -> Result<f64, DevianceError> {
    if response.is_empty() {
        return Err(DevianceError::Empty);
    }
    check_response(family, response)?;
    let mean = response.iter().sum::<f64>() / response.len() as f64;
    Ok(response
        .iter()
        .map(|&y| unit_deviance(family, y, mean))
        .sum())
}

/// Residual deviance divided by null deviance.
pub fn deviance_ratio(residual: f64, null: f64) -> Result<f64, DevianceError> {
    if null == 0.0 {
        return Err(DevianceError::ZeroNullDeviance);
    }
    Ok(residual / null)
}

/// Residual/null deviance ratio computed directly from fitted means.
pub fn deviance_ratio_from_fit(
    family: Family,
    response: &[f64],
    predicted: &[f64],
) -> Result<f64, DevianceError> {
    let residual = residual_deviance(family, response, predicted)?;
    let null = null_deviance(family, response)?;
    deviance_ratio(residual, null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binomial_null_deviance_balanced() {
        // mean = 0.5, each row contributes -2 ln 0.5
        let y = [0.0, 1.0, 0.0, 1.0];
        let d = null_deviance(Family::Binomial, &y).unwrap();
        assert!((d - 8.0 * std::f64::consts::LN_2).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_gaussian_fit_has_zero_residual() {
        let y = [1.0, 2.0, 3.0];
        assert_eq!(residual_deviance(Family::Gaussian, &y, &y).unwrap(), 0.0);
        assert_eq!(deviance_ratio_from_fit(Family::Gaussian, &y, &y).unwrap(), 0.0);
    }

    #[test]
    fn test_binomial_ratio_below_one_for_informative_fit() {
        let y = [0.0, 0.0, 1.0, 1.0];
        let p = [0.1, 0.2, 0.8, 0.9];
        let ratio = deviance_ratio_from_fit(Family::Binomial, &y, &p).unwrap();
        assert!(ratio > 0.0 && ratio < 1.0);
    }

    #[test]
    fn test_binomial_rejects_non_binary_response() {
        let err = null_deviance(Family::Binomial, &[0.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            DevianceError::InvalidResponse {
                row: 1,
                value: 2.0,
                family: Family::Binomial
            }
        );
    }

    #[test]
    fn test_poisson_zero_counts() {
        let d = residual_deviance(Family::Poisson, &[0.0, 2.0], &[1.0, 2.0]).unwrap();
        // row 0: 2 * (0 - (0 - 1)) = 2, row 1: 0
        assert!((d - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_ratio_errors() {
        assert_eq!(deviance_ratio(1.0, 0.0), Err(DevianceError::ZeroNullDeviance));
        assert_eq!(
            residual_deviance(Family::Gaussian, &[1.0], &[]),
            Err(DevianceError::LengthMismatch {
                response: 1,
                predicted: 0
            })
        );
        assert_eq!(null_deviance(Family::Gaussian, &[]), Err(DevianceError::Empty));
    }
}
