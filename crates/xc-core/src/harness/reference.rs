//! Independent reference values for scalar comparisons.

use xc_common::Result;
use xc_frame::DataSource;

use crate::backend::ModelConfig;

/// Computes the expected value of a model metric without the backend, e.g.
/// a deviance ratio from a separate statistics package.
pub trait ReferenceImplementation {
    fn name(&self) -> &str;

    /// Reference value of `metric` for `config` fitted on `source`.
    fn compute(&self, metric: &str, source: &DataSource, config: &ModelConfig) -> Result<f64>;
}

/// A value computed once, elsewhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedReference(pub f64);

impl ReferenceImplementation for FixedReference {
    fn name(&self) -> &str {
        "fixed"
    }

    fn compute(&self, _metric: &str, _source: &DataSource, _config: &ModelConfig) -> Result<f64> {
        Ok(self.0)
    }
}

/// Closure-backed reference.
pub struct FnReference<F> {
    name: String,
    compute: F,
}

impl<F> FnReference<F>
where
    F: Fn(&str, &DataSource, &ModelConfig) -> Result<f64>,
{
    pub fn new(name: impl Into<String>, compute: F) -> Self {
        Self {
            name: name.into(),
            compute,
        }
    }
}

impl<F> ReferenceImplementation for FnReference<F>
where
    F: Fn(&str, &DataSource, &ModelConfig) -> Result<f64>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, metric: &str, source: &DataSource, config: &ModelConfig) -> Result<f64> {
        (self.compute)(metric, source, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Algorithm;
    use xc_common::Error;

    #[test]
    fn test_fixed_and_fn_references() {
        let source = DataSource::file("prostate.csv");
        let config = ModelConfig::new(Algorithm::Glm);
        assert_eq!(FixedReference(0.81).compute("deviance_ratio", &source, &config).unwrap(), 0.81);

        let reference = FnReference::new("statsmodels", |metric: &str, _: &DataSource, _: &ModelConfig| {
            match metric {
                "deviance_ratio" => Ok(0.8),
                other => Err(Error::Training(format!("no reference for {}", other))),
            }
        });
        assert_eq!(reference.name(), "statsmodels");
        assert_eq!(reference.compute("deviance_ratio", &source, &config).unwrap(), 0.8);
        assert!(reference.compute("loglik", &source, &config).is_err());
    }
}
