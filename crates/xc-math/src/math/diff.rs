//! Element-wise difference measures used by prediction comparisons.

use serde::{Deserialize, Serialize};

/// How the discrepancy between two values is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMeasure {
    /// `|a - b|`
    Absolute,
    /// `|a - b| / max(|a|, |b|)`, zero when both are zero.
    Relative,
    /// `|a - b| / max(1, |a|, |b|)`: absolute near zero, relative for large values.
    #[default]
    Hybrid,
}

impl std::str::FromStr for DiffMeasure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "absolute" | "abs" => Ok(DiffMeasure::Absolute),
            "relative" | "rel" => Ok(DiffMeasure::Relative),
            "hybrid" | "mixed" => Ok(DiffMeasure::Hybrid),
            _ => Err(format!("unknown difference measure: {}", s)),
        }
    }
}

impl std::fmt::Display for DiffMeasure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffMeasure::Absolute => write!(f, "absolute"),
            DiffMeasure::Relative => write!(f, "relative"),
            DiffMeasure::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl DiffMeasure {
    /// Discrepancy between `a` and `b` under this measure.
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            DiffMeasure::Absolute => abs_diff(a, b),
            DiffMeasure::Relative => relative_diff(a, b),
            DiffMeasure::Hybrid => hybrid_diff(a, b),
        }
    }
}

/// Absolute difference with IEEE special cases resolved.
///
/// Two NaNs or two equal infinities are treated as identical (0.0).
/// A single NaN or a single infinity is an infinite discrepancy.
pub fn abs_diff(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return if a.is_nan() && b.is_nan() {
            0.0
        } else {
            f64::INFINITY
        };
    }
    if a.is_infinite() || b.is_infinite() {
        return if a == b { 0.0 } else { f64::INFINITY };
    }
    (a - b).abs()
}

/// Relative difference `|a - b| / max(|a|, |b|)`.
pub fn relative_diff(a: f64, b: f64) -> f64 {
    let diff = abs_diff(a, b);
    if diff == 0.0 || diff.is_infinite() {
        return diff;
    }
    diff / a.abs().max(b.abs())
}

/// Hybrid difference `|a - b| / max(1, |a|, |b|)`.
pub fn hybrid_diff(a: f64, b: f64) -> f64 {
    let diff = abs_diff(a, b);
    if diff == 0.0 || diff.is_infinite() {
        return diff;
    }
    diff / 1.0_f64.max(a.abs()).max(b.abs())
}

/// A discrepancy passes when it does not exceed the tolerance.
pub fn within_tolerance(discrepancy: f64, tolerance: f64) -> bool {
    !discrepancy.is_nan() && discrepancy <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abs_diff_special_values() {
        assert_eq!(abs_diff(1.0, 1.5), 0.5);
        assert_eq!(abs_diff(f64::NAN, f64::NAN), 0.0);
        assert_eq!(abs_diff(f64::NAN, 1.0), f64::INFINITY);
        assert_eq!(abs_diff(f64::INFINITY, f64::INFINITY), 0.0);
        assert_eq!(abs_diff(f64::INFINITY, f64::NEG_INFINITY), f64::INFINITY);
        assert_eq!(abs_diff(f64::INFINITY, 1e300), f64::INFINITY);
    }

    #[test]
    fn test_relative_diff_scales() {
        assert!((relative_diff(100.0, 101.0) - 1.0 / 101.0).abs() < 1e-15);
        assert_eq!(relative_diff(0.0, 0.0), 0.0);
        assert_eq!(relative_diff(0.0, 1e-12), 1.0);
    }

    #[test]
    fn test_hybrid_diff_is_absolute_near_zero() {
        assert!((hybrid_diff(1e-3, 2e-3) - 1e-3).abs() < 1e-18);
        assert!((hybrid_diff(1000.0, 1001.0) - 1.0 / 1001.0).abs() < 1e-15);
    }

    #[test]
    fn test_measure_parse_and_display() {
        assert_eq!("abs".parse::<DiffMeasure>().unwrap(), DiffMeasure::Absolute);
        assert_eq!("Relative".parse::<DiffMeasure>().unwrap(), DiffMeasure::Relative);
        assert_eq!("hybrid".parse::<DiffMeasure>().unwrap(), DiffMeasure::Hybrid);
        assert!("euclid".parse::<DiffMeasure>().is_err());
        assert_eq!(DiffMeasure::default().to_string(), "hybrid");
    }

    #[test]
    fn test_within_tolerance_boundary() {
        assert!(within_tolerance(1e-10, 1e-10));
        assert!(!within_tolerance(1.1e-10, 1e-10));
        assert!(!within_tolerance(f64::NAN, 1.0));
        assert!(!within_tolerance(f64::INFINITY, 1e300));
    }
}
