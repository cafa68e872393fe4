//! Error types for crosscheck.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification separating infrastructure failures from
//!   comparison failures
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Artifact Scoring Error
//!   Reason: artifact scorer failed: exit status 1
//!   Fix: Check the scorer's captured output and the genmodel jar path in crosscheck.json.
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 70,
//!   "category": "comparison",
//!   "message": "comparison failed: value mismatch at row 3 in column 'lp' ...",
//!   "infrastructure": false,
//!   "context": { "row": 3, "column": "lp" }
//! }
//! ```

use crate::mismatch::MismatchDetail;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for crosscheck operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Settings file and check-plan errors.
    Config,
    /// Dataset import and column coercion errors.
    DataLoad,
    /// Model training errors.
    Training,
    /// In-process prediction errors.
    Prediction,
    /// Artifact or dataset export errors.
    Export,
    /// Standalone artifact scorer errors.
    ArtifactScoring,
    /// Numerical or structural disagreement (the expected "test failed" outcome).
    Comparison,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::DataLoad => write!(f, "data_load"),
            ErrorCategory::Training => write!(f, "training"),
            ErrorCategory::Prediction => write!(f, "prediction"),
            ErrorCategory::Export => write!(f, "export"),
            ErrorCategory::ArtifactScoring => write!(f, "artifact_scoring"),
            ErrorCategory::Comparison => write!(f, "comparison"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for crosscheck.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid check plan: {0}")]
    InvalidPlan(String),

    // Data load errors (20-29)
    #[error("data load failed: {0}")]
    DataLoad(String),

    #[error("unknown column '{column}' in {context}")]
    UnknownColumn { column: String, context: String },

    #[error("malformed data at line {line}: {message}")]
    MalformedData { line: usize, message: String },

    // Training errors (30-39)
    #[error("training failed: {0}")]
    Training(String),

    #[error("invalid model configuration: {0}")]
    InvalidModelConfig(String),

    // Prediction errors (40-49)
    #[error("prediction failed: {0}")]
    Prediction(String),

    // Export errors (50-59)
    #[error("export failed: {0}")]
    Export(String),

    // Artifact scoring errors (60-69)
    #[error("artifact scorer failed: {0}")]
    ArtifactScoring(String),

    #[error("artifact scorer produced malformed output: {0}")]
    MalformedScorerOutput(String),

    // Comparison failures (70-79)
    #[error("comparison failed: {0}")]
    ComparisonFailure(Box<MismatchDetail>),

    // I/O errors (80-89)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<MismatchDetail> for Error {
    fn from(detail: MismatchDetail) -> Self {
        Error::ComparisonFailure(Box::new(detail))
    }
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Data load errors
    /// - 30-39: Training errors
    /// - 40-49: Prediction errors
    /// - 50-59: Export errors
    /// - 60-69: Artifact scoring errors
    /// - 70-79: Comparison failures
    /// - 80-89: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidPlan(_) => 11,
            Error::DataLoad(_) => 20,
            Error::UnknownColumn { .. } => 21,
            Error::MalformedData { .. } => 22,
            Error::Training(_) => 30,
            Error::InvalidModelConfig(_) => 31,
            Error::Prediction(_) => 40,
            Error::Export(_) => 50,
            Error::ArtifactScoring(_) => 60,
            Error::MalformedScorerOutput(_) => 61,
            Error::ComparisonFailure(_) => 70,
            Error::Io(_) => 80,
            Error::Json(_) => 81,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidPlan(_) => ErrorCategory::Config,

            Error::DataLoad(_) | Error::UnknownColumn { .. } | Error::MalformedData { .. } => {
                ErrorCategory::DataLoad
            }

            Error::Training(_) | Error::InvalidModelConfig(_) => ErrorCategory::Training,

            Error::Prediction(_) => ErrorCategory::Prediction,

            Error::Export(_) => ErrorCategory::Export,

            Error::ArtifactScoring(_) | Error::MalformedScorerOutput(_) => {
                ErrorCategory::ArtifactScoring
            }

            Error::ComparisonFailure(_) => ErrorCategory::Comparison,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is an infrastructure failure.
    ///
    /// Infrastructure failures abort a check before a verdict exists; only
    /// `ComparisonFailure` means the check ran and the predictions disagree.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, Error::ComparisonFailure(_))
    }

    /// Mismatch detail, for comparison failures.
    pub fn mismatch(&self) -> Option<&MismatchDetail> {
        match self {
            Error::ComparisonFailure(detail) => Some(detail),
            _ => None,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'xc-core config validate' to check crosscheck.json, or remove it to use defaults."
            }
            Error::InvalidPlan(_) => {
                "Fix the check plan JSON. Every plan needs a dataset, a model and at least one comparison."
            }

            Error::DataLoad(_) => {
                "Check that the dataset path (or archive member) exists and is readable by the backend."
            }
            Error::UnknownColumn { .. } => {
                "The named column is not in the dataset header. Column names are case-sensitive."
            }
            Error::MalformedData { .. } => {
                "The delimited file has a row with the wrong number of fields or broken quoting."
            }

            Error::Training(_) => {
                "The backend rejected or failed to fit the model. See the backend message above."
            }
            Error::InvalidModelConfig(_) => {
                "Check column roles (predictors, response, start/stop, interaction pairs) against the dataset schema."
            }

            Error::Prediction(_) => "The backend prediction call failed. See the backend message above.",

            Error::Export(_) => {
                "Check disk space and permissions of the sandbox directory, and that the backend can export this model."
            }

            Error::ArtifactScoring(_) => {
                "Check the scorer's captured output and the genmodel jar path in crosscheck.json."
            }
            Error::MalformedScorerOutput(_) => {
                "The scorer finished but its CSV could not be parsed. Inspect the kept sandbox output."
            }

            Error::ComparisonFailure(_) => {
                "The two prediction paths disagree. Inspect the reported row/column and the tolerance."
            }

            Error::Io(_) => "Check disk space, permissions, and that the paths exist. Retry the operation.",
            Error::Json(_) => "Invalid JSON. Check syntax with 'jq . <file>'.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidPlan(_) => "Invalid Check Plan",
            Error::DataLoad(_) => "Data Load Error",
            Error::UnknownColumn { .. } => "Unknown Column",
            Error::MalformedData { .. } => "Malformed Data",
            Error::Training(_) => "Training Error",
            Error::InvalidModelConfig(_) => "Invalid Model Configuration",
            Error::Prediction(_) => "Prediction Error",
            Error::Export(_) => "Export Error",
            Error::ArtifactScoring(_) => "Artifact Scoring Error",
            Error::MalformedScorerOutput(_) => "Malformed Scorer Output",
            Error::ComparisonFailure(_) => "Comparison Failed",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the check aborted before producing a verdict.
    pub infrastructure: bool,

    /// Additional structured context (e.g., row, column).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::UnknownColumn { column, context: ctx } => {
                context.insert("column".to_string(), serde_json::json!(column));
                context.insert("context".to_string(), serde_json::json!(ctx));
            }
            Error::MalformedData { line, .. } => {
                context.insert("line".to_string(), serde_json::json!(line));
            }
            Error::ComparisonFailure(detail) => {
                if let Some(row) = detail.row {
                    context.insert("row".to_string(), serde_json::json!(row));
                }
                if let Some(column) = &detail.column {
                    context.insert("column".to_string(), serde_json::json!(column));
                }
                context.insert("kind".to_string(), serde_json::json!(detail.kind));
                if detail.magnitude.is_finite() {
                    context.insert("magnitude".to_string(), serde_json::json!(detail.magnitude));
                }
                context.insert("tolerance".to_string(), serde_json::json!(detail.tolerance));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            infrastructure: err.is_infrastructure(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mismatch::MismatchKind;

    #[test]
    fn test_codes_are_grouped_by_category() {
        let cases: Vec<(Error, ErrorCategory)> = vec![
            (Error::Config("x".into()), ErrorCategory::Config),
            (Error::DataLoad("x".into()), ErrorCategory::DataLoad),
            (
                Error::UnknownColumn {
                    column: "agee".into(),
                    context: "coercion".into(),
                },
                ErrorCategory::DataLoad,
            ),
            (Error::Training("x".into()), ErrorCategory::Training),
            (Error::Prediction("x".into()), ErrorCategory::Prediction),
            (Error::Export("x".into()), ErrorCategory::Export),
            (Error::ArtifactScoring("x".into()), ErrorCategory::ArtifactScoring),
            (
                MismatchDetail::new(MismatchKind::Value, "1", "2").into(),
                ErrorCategory::Comparison,
            ),
        ];
        for (err, category) in cases {
            assert_eq!(err.category(), category, "{err}");
            let base = match category {
                ErrorCategory::Config => 10,
                ErrorCategory::DataLoad => 20,
                ErrorCategory::Training => 30,
                ErrorCategory::Prediction => 40,
                ErrorCategory::Export => 50,
                ErrorCategory::ArtifactScoring => 60,
                ErrorCategory::Comparison => 70,
                ErrorCategory::Io => 80,
            };
            assert!((base..base + 10).contains(&err.code()), "{err}");
        }
    }

    #[test]
    fn test_only_comparison_failure_is_not_infrastructure() {
        let failure: Error = MismatchDetail::new(MismatchKind::Value, "1", "2").into();
        assert!(!failure.is_infrastructure());
        assert!(failure.mismatch().is_some());
        assert!(Error::Training("no convergence".into()).is_infrastructure());
        assert!(Error::Training("no convergence".into()).mismatch().is_none());
    }

    #[test]
    fn test_external_message_is_preserved() {
        let err = Error::Training("Illegal argument: interaction column C9 not found".into());
        assert!(err
            .to_string()
            .ends_with("Illegal argument: interaction column C9 not found"));
    }

    #[test]
    fn test_structured_error_carries_mismatch_location() {
        let err: Error = MismatchDetail::new(MismatchKind::Value, "0.1", "0.2")
            .at_row(7)
            .in_column("lp")
            .with_magnitude(0.1, 1e-10)
            .into();
        let structured = StructuredError::from(&err);
        assert_eq!(structured.code, 70);
        assert!(!structured.infrastructure);
        assert_eq!(structured.context["row"], serde_json::json!(7));
        assert_eq!(structured.context["column"], serde_json::json!("lp"));
        assert_eq!(structured.context["kind"], serde_json::json!("value"));
    }

    #[test]
    fn test_format_error_human_plain() {
        let err = Error::Export("disk full".into());
        let text = format_error_human(&err, false);
        assert!(text.starts_with("✗ Export Error"));
        assert!(text.contains("Reason: export failed: disk full"));
        assert!(text.contains("Fix: "));
    }
}
