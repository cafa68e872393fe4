//! Model configuration, column roles and the handles a backend hands back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use xc_common::{Error, FrameId, ModelId, Result};
use xc_frame::{ColumnType, DataSource, Schema};
use xc_math::deviance::Family;

/// Model families the harness knows how to configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[serde(alias = "coxph")]
    CoxPh,
    Glm,
    #[serde(alias = "eif", alias = "extendedisolationforest")]
    ExtendedIsolationForest,
}

impl Algorithm {
    /// Builder path segment on the backend.
    pub fn builder_name(&self) -> &'static str {
        match self {
            Algorithm::CoxPh => "coxph",
            Algorithm::Glm => "glm",
            Algorithm::ExtendedIsolationForest => "extendedisolationforest",
        }
    }

    /// Prefix of generated model ids.
    pub fn model_prefix(&self) -> &'static str {
        match self {
            Algorithm::CoxPh => "CoxPH",
            Algorithm::Glm => "GLM",
            Algorithm::ExtendedIsolationForest => "ExtendedIsolationForest",
        }
    }

    /// Whether two fits on the same data are expected to agree exactly.
    pub fn is_deterministic(&self) -> bool {
        !matches!(self, Algorithm::ExtendedIsolationForest)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.builder_name())
    }
}

/// Two predictors whose joint effect is modelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionPair(pub String, pub String);

impl InteractionPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self(a.into(), b.into())
    }
}

/// Column-level coercions applied after import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coercion {
    /// Mark the column categorical.
    AsFactor,
}

/// Algorithm, hyperparameters and column roles.
///
/// Roles are checked against the dataset schema before training; the
/// hyperparameters are passed through to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub algorithm: Algorithm,

    /// Requested model id; the backend generates one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<ModelId>,

    /// Predictor columns. Empty means every non-role column.
    #[serde(default, alias = "x")]
    pub predictors: Vec<String>,

    /// Response column (the event column for survival models).
    #[serde(default, alias = "y", skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_column: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interaction_pairs: Vec<InteractionPair>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stratify_by: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<Family>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lambda: Option<f64>,

    /// Tie handling for survival models ("efron" or "breslow").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ties: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntrees: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_level: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Extra builder parameters, passed through verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl ModelConfig {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            model_id: None,
            predictors: Vec::new(),
            response: None,
            start_column: None,
            stop_column: None,
            interaction_pairs: Vec::new(),
            stratify_by: Vec::new(),
            family: None,
            link: None,
            alpha: None,
            lambda: None,
            ties: None,
            ntrees: None,
            sample_size: None,
            extension_level: None,
            seed: None,
            params: BTreeMap::new(),
        }
    }

    pub fn with_predictors<S: Into<String>>(mut self, predictors: impl IntoIterator<Item = S>) -> Self {
        self.predictors = predictors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn with_interval(mut self, start: impl Into<String>, stop: impl Into<String>) -> Self {
        self.start_column = Some(start.into());
        self.stop_column = Some(stop.into());
        self
    }

    pub fn with_interaction_pair(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.interaction_pairs.push(InteractionPair::new(a, b));
        self
    }

    pub fn with_family(mut self, family: Family) -> Self {
        self.family = Some(family);
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Every (role, column) the config names, in declaration order.
    pub fn column_roles(&self) -> Vec<(&'static str, &str)> {
        let mut roles = Vec::new();
        roles.extend(self.predictors.iter().map(|c| ("predictor", c.as_str())));
        if let Some(c) = &self.response {
            roles.push(("response", c.as_str()));
        }
        if let Some(c) = &self.start_column {
            roles.push(("start_column", c.as_str()));
        }
        if let Some(c) = &self.stop_column {
            roles.push(("stop_column", c.as_str()));
        }
        for pair in &self.interaction_pairs {
            roles.push(("interaction_pair", pair.0.as_str()));
            roles.push(("interaction_pair", pair.1.as_str()));
        }
        roles.extend(self.stratify_by.iter().map(|c| ("stratify_by", c.as_str())));
        roles
    }

    /// Predictors actually used: the declared list, or every column that has
    /// no other role.
    pub fn effective_predictors(&self, schema: &Schema) -> Vec<String> {
        if !self.predictors.is_empty() {
            return self.predictors.clone();
        }
        let reserved: Vec<&str> = [&self.response, &self.start_column, &self.stop_column]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        schema
            .names()
            .filter(|n| !reserved.contains(n))
            .map(str::to_string)
            .collect()
    }

    /// Check roles against the dataset schema and the algorithm's needs.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        for (role, column) in self.column_roles() {
            if !schema.contains(column) {
                return Err(Error::InvalidModelConfig(format!(
                    "{} column '{}' is not in the dataset",
                    role, column
                )));
            }
        }

        for pair in &self.interaction_pairs {
            if pair.0 == pair.1 {
                return Err(Error::InvalidModelConfig(format!(
                    "interaction pair ({}, {}) names the same column twice",
                    pair.0, pair.1
                )));
            }
        }

        match self.algorithm {
            Algorithm::CoxPh => {
                if self.stop_column.is_none() {
                    return Err(Error::InvalidModelConfig(
                        "coxph requires a stop column".to_string(),
                    ));
                }
                if self.response.is_none() {
                    return Err(Error::InvalidModelConfig(
                        "coxph requires an event (response) column".to_string(),
                    ));
                }
                if let Some(ties) = &self.ties {
                    if ties != "efron" && ties != "breslow" {
                        return Err(Error::InvalidModelConfig(format!(
                            "ties must be 'efron' or 'breslow', got '{}'",
                            ties
                        )));
                    }
                }
            }
            Algorithm::Glm => {
                let response = self.response.as_deref().ok_or_else(|| {
                    Error::InvalidModelConfig("glm requires a response column".to_string())
                })?;
                if self.family == Some(Family::Binomial)
                    && schema.column_type(response) == Some(ColumnType::Str)
                {
                    return Err(Error::InvalidModelConfig(format!(
                        "binomial response '{}' must be numeric or categorical",
                        response
                    )));
                }
                if let Some(alpha) = self.alpha {
                    if !(0.0..=1.0).contains(&alpha) {
                        return Err(Error::InvalidModelConfig(format!(
                            "alpha must be in [0, 1], got {}",
                            alpha
                        )));
                    }
                }
                if self.lambda.is_some_and(|l| l < 0.0) {
                    return Err(Error::InvalidModelConfig("lambda must be >= 0".to_string()));
                }
            }
            Algorithm::ExtendedIsolationForest => {
                if self.response.is_some() {
                    return Err(Error::InvalidModelConfig(
                        "extended isolation forest is unsupervised; remove the response".to_string(),
                    ));
                }
                if self.ntrees == Some(0) || self.sample_size == Some(0) {
                    return Err(Error::InvalidModelConfig(
                        "ntrees and sample_size must be positive".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Tabular data resident in the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetHandle {
    pub frame_id: FrameId,
    pub source: DataSource,
    pub schema: Schema,
    pub nrows: usize,
}

impl DatasetHandle {
    pub fn ncols(&self) -> usize {
        self.schema.len()
    }
}

/// A fitted model and the config it was fitted with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModelHandle {
    pub model_id: ModelId,
    pub config: ModelConfig,
    pub training_frame: FrameId,
}

impl TrainedModelHandle {
    pub fn algorithm(&self) -> Algorithm {
        self.config.algorithm
    }
}

/// Training metrics reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residual_deviance: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_deviance: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loglik: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concordance: Option<f64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub other: BTreeMap<String, f64>,
}

impl ModelMetrics {
    /// Residual over null deviance.
    pub fn deviance_ratio(&self) -> Option<f64> {
        let residual = self.residual_deviance?;
        let null = self.null_deviance?;
        xc_math::deviance::deviance_ratio(residual, null).ok()
    }

    /// Look a metric up by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "residual_deviance" => self.residual_deviance,
            "null_deviance" => self.null_deviance,
            "deviance_ratio" => self.deviance_ratio(),
            "loglik" => self.loglik,
            "concordance" => self.concordance,
            other => self.other.get(other).copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heart_schema() -> Schema {
        Schema::new(vec![
            ("start".into(), ColumnType::Numeric),
            ("stop".into(), ColumnType::Numeric),
            ("event".into(), ColumnType::Numeric),
            ("age".into(), ColumnType::Numeric),
            ("C1".into(), ColumnType::Categorical),
            ("C2".into(), ColumnType::Categorical),
        ])
        .unwrap()
    }

    fn coxph() -> ModelConfig {
        ModelConfig::new(Algorithm::CoxPh)
            .with_predictors(["age", "C1", "C2"])
            .with_response("event")
            .with_interval("start", "stop")
            .with_interaction_pair("C1", "C2")
            .with_interaction_pair("age", "C2")
    }

    #[test]
    fn test_valid_coxph_config() {
        coxph().validate(&heart_schema()).unwrap();
    }

    #[test]
    fn test_unknown_interaction_column_is_training_error() {
        let config = coxph().with_interaction_pair("C1", "C3");
        let err = config.validate(&heart_schema()).unwrap_err();
        assert_eq!(err.category(), xc_common::ErrorCategory::Training);
        assert!(err.to_string().contains("'C3'"));
    }

    #[test]
    fn test_algorithm_requirements() {
        let mut config = coxph();
        config.stop_column = None;
        assert!(config.validate(&heart_schema()).is_err());

        let glm = ModelConfig::new(Algorithm::Glm).with_predictors(["age"]);
        assert!(glm.validate(&heart_schema()).is_err());

        let eif = ModelConfig::new(Algorithm::ExtendedIsolationForest).with_response("event");
        assert!(eif.validate(&heart_schema()).is_err());
    }

    #[test]
    fn test_effective_predictors_skip_roles() {
        let config = ModelConfig::new(Algorithm::CoxPh)
            .with_response("event")
            .with_interval("start", "stop");
        assert_eq!(
            config.effective_predictors(&heart_schema()),
            vec!["age", "C1", "C2"]
        );
    }

    #[test]
    fn test_config_json_shape() {
        let config: ModelConfig = serde_json::from_str(
            r#"{
                "algorithm": "coxph",
                "x": ["age", "C1"],
                "y": "event",
                "start_column": "start",
                "stop_column": "stop",
                "interaction_pairs": [["C1", "C2"], ["age", "C2"]],
                "ties": "breslow"
            }"#,
        )
        .unwrap();
        assert_eq!(config.algorithm, Algorithm::CoxPh);
        assert_eq!(config.interaction_pairs[1], InteractionPair::new("age", "C2"));
        assert_eq!(config.response.as_deref(), Some("event"));
    }

    #[test]
    fn test_metrics_ratio() {
        let metrics = ModelMetrics {
            residual_deviance: Some(50.0),
            null_deviance: Some(200.0),
            ..ModelMetrics::default()
        };
        assert_eq!(metrics.get("deviance_ratio"), Some(0.25));
        assert_eq!(metrics.get("auc"), None);
    }
}
