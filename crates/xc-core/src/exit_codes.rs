//! Exit codes for the xc-core CLI.
//!
//! Exit codes communicate the check outcome without requiring output parsing.
//!
//! Exit code ranges:
//! - 0-1: Verdicts (the check ran to completion)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors (bugs, should be reported)

use xc_common::{Error, ErrorCategory};

/// Exit codes for xc-core operations.
///
/// These codes are a stable contract for test runners and CI scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Verdicts (0-1)
    // ========================================================================
    /// Every requested comparison passed
    Pass = 0,

    /// At least one comparison failed
    ComparisonFailed = 1,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Settings file or check plan invalid
    ConfigError = 11,

    /// Dataset unreadable or a named column is absent
    DataLoadError = 12,

    /// Backend rejected the model configuration or failed to fit
    TrainingError = 13,

    /// In-process prediction failed
    PredictionError = 14,

    /// Artifact or dataset export failed
    ExportError = 15,

    /// Standalone scorer failed or produced malformed output
    ArtifactScoringError = 16,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates a passing check.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Pass)
    }

    /// Check if this exit code is a verdict (codes 0-1).
    /// A failed comparison is a result, not an error.
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        let code = self as i32;
        (10..20).contains(&code)
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        let code = self as i32;
        code >= 20
    }

    /// Check if this exit code means the check aborted before a verdict.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Pass => "OK_PASS",
            ExitCode::ComparisonFailed => "FAIL_COMPARISON",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::DataLoadError => "ERR_DATA_LOAD",
            ExitCode::TrainingError => "ERR_TRAINING",
            ExitCode::PredictionError => "ERR_PREDICTION",
            ExitCode::ExportError => "ERR_EXPORT",
            ExitCode::ArtifactScoringError => "ERR_ARTIFACT_SCORING",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Exit code for a harness error.
    pub fn for_error(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::DataLoad => ExitCode::DataLoadError,
            ErrorCategory::Training => ExitCode::TrainingError,
            ErrorCategory::Prediction => ExitCode::PredictionError,
            ErrorCategory::Export => ExitCode::ExportError,
            ErrorCategory::ArtifactScoring => ExitCode::ArtifactScoringError,
            ErrorCategory::Comparison => ExitCode::ComparisonFailed,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        ExitCode::for_error(err)
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xc_common::{MismatchDetail, MismatchKind};

    #[test]
    fn test_ranges() {
        assert!(ExitCode::Pass.is_success());
        assert!(ExitCode::ComparisonFailed.is_operational());
        assert!(!ExitCode::ComparisonFailed.is_error());
        assert!(ExitCode::ArtifactScoringError.is_user_error());
        assert!(ExitCode::IoError.is_internal_error());
        assert!(!ExitCode::ConfigError.is_internal_error());
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            ExitCode::for_error(&Error::Training("singular".into())).as_i32(),
            13
        );
        assert_eq!(
            ExitCode::for_error(&Error::MalformedScorerOutput("empty".into())),
            ExitCode::ArtifactScoringError
        );
        let failure: Error = MismatchDetail::new(MismatchKind::Value, "1", "2").into();
        assert_eq!(ExitCode::from(&failure), ExitCode::ComparisonFailed);
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::ExportError.to_string(), "ERR_EXPORT (15)");
        assert_eq!(i32::from(ExitCode::Pass), 0);
    }
}
