//! Harness settings (crosscheck.json).
//!
//! Every section is optional in the file; missing sections and fields take
//! the defaults below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use xc_math::DiffMeasure;

use crate::validate::ValidationError;

/// Top-level settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessSettings {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Standalone artifact scorer invocation.
    #[serde(default)]
    pub scorer: ScorerSettings,

    /// Defaults applied to comparisons that do not override them.
    #[serde(default)]
    pub comparison: ComparisonDefaults,

    /// Scratch directory handling for artifact parity checks.
    #[serde(default)]
    pub sandbox: SandboxSettings,

    /// Remote compute backend connection.
    #[serde(default)]
    pub backend: BackendSettings,
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            scorer: ScorerSettings::default(),
            comparison: ComparisonDefaults::default(),
            sandbox: SandboxSettings::default(),
            backend: BackendSettings::default(),
        }
    }
}

impl HarnessSettings {
    /// Load settings from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_str(&content)
    }

    /// Parse settings from a JSON string.
    pub fn from_str(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }
}

/// How the standalone scorer process is launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerSettings {
    /// Java launcher.
    pub java: String,

    /// Path to the genmodel jar holding the scorer main class.
    pub genmodel_jar: PathBuf,

    /// Extra JVM options placed after the classpath.
    pub java_options: Vec<String>,

    /// Scorer entry point.
    pub main_class: String,

    /// Pass `--decimal` so predictions are written at full precision.
    pub decimal: bool,

    /// Full argv override. Elements may contain `{input}`, `{output}` and
    /// `{artifact}`; when set, the java fields above are ignored.
    pub command: Option<Vec<String>>,

    /// Kill the scorer after this many seconds.
    pub timeout_secs: Option<u64>,

    /// Cap on captured stdout/stderr bytes each.
    pub max_output_bytes: usize,
}

impl Default for ScorerSettings {
    fn default() -> Self {
        Self {
            java: "java".to_string(),
            genmodel_jar: PathBuf::from("h2o-genmodel.jar"),
            java_options: vec![
                "-Xmx12g".to_string(),
                "-XX:ReservedCodeCacheSize=256m".to_string(),
            ],
            main_class: "hex.genmodel.tools.PredictCsv".to_string(),
            decimal: true,
            command: None,
            timeout_secs: Some(600),
            max_output_bytes: 1024 * 1024,
        }
    }
}

/// What happens to rows where a compared cell is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Drop the row when any compared cell is missing on either side.
    #[default]
    Exclude,
    /// Missing on one side only is a failure; missing on both sides is a match.
    RequireMatchingPattern,
}

impl std::str::FromStr for MissingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "exclude" | "skip" => Ok(MissingPolicy::Exclude),
            "require_matching_pattern" | "match" | "require" => {
                Ok(MissingPolicy::RequireMatchingPattern)
            }
            _ => Err(format!("unknown missing-value policy: {}", s)),
        }
    }
}

impl std::fmt::Display for MissingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingPolicy::Exclude => write!(f, "exclude"),
            MissingPolicy::RequireMatchingPattern => write!(f, "require_matching_pattern"),
        }
    }
}

/// How columns of two tables are paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnAlignment {
    /// i-th column against i-th column; names may differ.
    #[default]
    ByPosition,
    /// Every left column must exist on the right under the same name.
    ByName,
}

impl std::str::FromStr for ColumnAlignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "by_position" | "position" => Ok(ColumnAlignment::ByPosition),
            "by_name" | "name" => Ok(ColumnAlignment::ByName),
            _ => Err(format!("unknown column alignment: {}", s)),
        }
    }
}

impl std::fmt::Display for ColumnAlignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnAlignment::ByPosition => write!(f, "by_position"),
            ColumnAlignment::ByName => write!(f, "by_name"),
        }
    }
}

/// Comparison defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonDefaults {
    pub tolerance: f64,
    pub measure: DiffMeasure,
    pub missing: MissingPolicy,
    pub align: ColumnAlignment,

    /// Probability that a row is included in a row-wise comparison.
    pub sample_probability: f64,

    /// Seed for row sampling.
    pub seed: u64,
}

impl Default for ComparisonDefaults {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            measure: DiffMeasure::Hybrid,
            missing: MissingPolicy::Exclude,
            align: ColumnAlignment::ByPosition,
            sample_probability: 1.0,
            seed: 12345,
        }
    }
}

/// Sandbox directory settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Parent directory for sandboxes; the system temp dir when unset.
    pub root: Option<PathBuf>,

    /// Keep the sandbox on disk after a failed comparison.
    pub keep_on_failure: bool,
}

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub url: String,
    pub request_timeout_secs: u64,

    /// Interval between job status polls.
    pub poll_interval_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            request_timeout_secs: 300,
            poll_interval_ms: 200,
        }
    }
}
