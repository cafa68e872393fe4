//! What a check loads, trains and compares.
//!
//! Plans are plain serde types so a check can be written as JSON and run
//! with `xc-core check plan.json`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use xc_common::{Error, Result};
use xc_config::ComparisonDefaults;
use xc_frame::DataSource;

use crate::backend::{Coercion, ModelConfig};
use crate::compare::{CompareOptions, Direction, ThresholdAssertion};

/// One column coercion applied after import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCoercion {
    pub column: String,
    pub coercion: Coercion,
}

/// The dataset a check runs against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub source: DataSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coercions: Vec<ColumnCoercion>,
}

impl DatasetSpec {
    pub fn new(source: DataSource) -> Self {
        Self {
            source,
            coercions: Vec::new(),
        }
    }

    /// Treat `column` as categorical.
    pub fn with_factor(mut self, column: impl Into<String>) -> Self {
        self.coercions.push(ColumnCoercion {
            column: column.into(),
            coercion: Coercion::AsFactor,
        });
        self
    }
}

/// Compare a backend metric against an independent reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePolicy {
    /// Metric name as understood by `ModelMetrics::get`.
    pub metric: String,
    pub tolerance: f64,
    #[serde(default)]
    pub direction: Direction,
    /// Fixed reference value; when absent a `ReferenceImplementation` must
    /// be supplied with the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl ReferencePolicy {
    pub fn new(metric: impl Into<String>, tolerance: f64) -> Self {
        Self {
            metric: metric.into(),
            tolerance,
            direction: Direction::TwoSided,
            value: None,
        }
    }

    pub fn not_worse(mut self) -> Self {
        self.direction = Direction::NotWorse;
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }
}

/// Per-row predicates on one prediction column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub column: String,
    pub assertions: Vec<ThresholdAssertion>,
}

/// How a second in-process fit is compared with the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Reproducibility {
    /// Tables must be tolerance-equal under the policy's compare options.
    Equal,
    /// Spearman correlation of `column` must reach `min_rho`.
    Ordering { column: String, min_rho: f64 },
}

/// Which comparisons a check performs, and how.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonPolicy {
    /// Score the exported artifact out of process and compare with the
    /// in-process predictions.
    pub artifact_parity: bool,

    /// Row-wise comparison settings, used by artifact parity and
    /// `Reproducibility::Equal`.
    pub options: CompareOptions,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferencePolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<ThresholdPolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reproducibility: Option<Reproducibility>,
}

impl ComparisonPolicy {
    /// Policy that requests nothing yet, with options from the settings.
    pub fn from_defaults(defaults: &ComparisonDefaults) -> Self {
        Self {
            options: CompareOptions::from_defaults(defaults),
            ..Self::default()
        }
    }

    pub fn with_artifact_parity(mut self) -> Self {
        self.artifact_parity = true;
        self
    }

    pub fn with_options(mut self, options: CompareOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_reference(mut self, reference: ReferencePolicy) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_thresholds(
        mut self,
        column: impl Into<String>,
        assertions: impl IntoIterator<Item = ThresholdAssertion>,
    ) -> Self {
        self.thresholds = Some(ThresholdPolicy {
            column: column.into(),
            assertions: assertions.into_iter().collect(),
        });
        self
    }

    pub fn with_reproducibility(mut self, mode: Reproducibility) -> Self {
        self.reproducibility = Some(mode);
        self
    }

    /// True when at least one comparison is requested.
    pub fn requests_any(&self) -> bool {
        self.artifact_parity
            || self.reference.is_some()
            || self.thresholds.is_some()
            || self.reproducibility.is_some()
    }

    /// Reject policies that cannot produce a verdict.
    pub fn validate(&self) -> Result<()> {
        if !self.requests_any() {
            return Err(Error::InvalidPlan(
                "comparison policy requests no comparison".to_string(),
            ));
        }
        let tolerances = [
            Some(self.options.tolerance),
            self.reference.as_ref().map(|r| r.tolerance),
        ];
        if tolerances.iter().flatten().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(Error::InvalidPlan(
                "tolerances must be finite and non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.options.sample_probability)
            || self.options.sample_probability == 0.0
        {
            return Err(Error::InvalidPlan(format!(
                "sample probability must be in (0, 1], got {}",
                self.options.sample_probability
            )));
        }
        if let Some(thresholds) = &self.thresholds {
            if thresholds.assertions.is_empty() {
                return Err(Error::InvalidPlan(format!(
                    "no threshold assertions for column '{}'",
                    thresholds.column
                )));
            }
        }
        if let Some(Reproducibility::Ordering { min_rho, .. }) = &self.reproducibility {
            if !(-1.0..=1.0).contains(min_rho) {
                return Err(Error::InvalidPlan(format!(
                    "min_rho must be in [-1, 1], got {}",
                    min_rho
                )));
            }
        }
        Ok(())
    }
}

/// A complete, runnable check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckPlan {
    pub name: String,
    pub dataset: DatasetSpec,
    pub model: ModelConfig,
    pub policy: ComparisonPolicy,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanFile {
    Many(Vec<CheckPlan>),
    One(Box<CheckPlan>),
}

impl CheckPlan {
    /// Parse a plan file holding one plan or an array of plans.
    pub fn parse_all(json: &str) -> Result<Vec<CheckPlan>> {
        let plans = match serde_json::from_str::<PlanFile>(json) {
            Ok(PlanFile::Many(plans)) => plans,
            Ok(PlanFile::One(plan)) => vec![*plan],
            // reparse as a single plan for a precise error location
            Err(_) => vec![serde_json::from_str::<CheckPlan>(json)
                .map_err(|e| Error::InvalidPlan(e.to_string()))?],
        };
        if plans.is_empty() {
            return Err(Error::InvalidPlan("plan file holds no checks".to_string()));
        }
        Ok(plans)
    }

    pub fn load_all(path: &Path) -> Result<Vec<CheckPlan>> {
        let text = std::fs::read_to_string(path)?;
        Self::parse_all(&text)
    }
}
