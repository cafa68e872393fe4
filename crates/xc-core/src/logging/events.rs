//! Event vocabulary for structured logging.
//!
//! Every event carries the correlation ids held by [`LogContext`] and the
//! [`Stage`] of the check that emitted it. See the `log_event!` macro.

use serde::{Deserialize, Serialize};

/// Stages of a single model check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and settings resolution.
    Init,
    /// Dataset import and column coercion.
    Load,
    /// Model training.
    Train,
    /// In-process prediction.
    Predict,
    /// Artifact and dataset export.
    Export,
    /// Standalone artifact scoring.
    Score,
    /// Comparison of prediction paths.
    Compare,
    /// Verdict rendering.
    Report,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Load => "load",
            Stage::Train => "train",
            Stage::Predict => "predict",
            Stage::Export => "export",
            Stage::Score => "score",
            Stage::Compare => "compare",
            Stage::Report => "report",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Check lifecycle
    pub const CHECK_STARTED: &str = "check.started";
    pub const CHECK_FINISHED: &str = "check.finished";

    // Load stage
    pub const LOAD_IMPORTED: &str = "load.imported";
    pub const LOAD_COERCED: &str = "load.coerced";

    // Train stage
    pub const TRAIN_STARTED: &str = "train.started";
    pub const TRAIN_FINISHED: &str = "train.finished";

    // Predict stage
    pub const PREDICT_FINISHED: &str = "predict.finished";

    // Export stage
    pub const EXPORT_ARTIFACT: &str = "export.artifact";
    pub const EXPORT_DATASET: &str = "export.dataset";
    pub const SANDBOX_KEPT: &str = "export.sandbox_kept";

    // Score stage
    pub const SCORE_STARTED: &str = "score.started";
    pub const SCORE_FINISHED: &str = "score.finished";

    // Compare stage
    pub const COMPARE_RESULT: &str = "compare.result";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";
    pub const CONFIG_ERROR: &str = "config.error";
}

/// Correlation ids stamped onto every `log_event!`.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub check_id: Option<String>,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            check_id: None,
            host_id: host_id.into(),
        }
    }

    pub fn with_check_id(mut self, check_id: impl Into<String>) -> Self {
        self.check_id = Some(check_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_carries_check_id() {
        let ctx = LogContext::new("run-abc", "host-xyz").with_check_id("glm-prostate");
        assert_eq!(ctx.run_id, "run-abc");
        assert_eq!(ctx.host_id, "host-xyz");
        assert_eq!(ctx.check_id.as_deref(), Some("glm-prostate"));
    }

    #[test]
    fn test_event_names_are_stage_scoped() {
        assert!(event_names::SANDBOX_KEPT.starts_with("export."));
        assert!(event_names::SCORE_FINISHED.starts_with("score."));
        assert!(event_names::COMPARE_RESULT.starts_with("compare."));
    }

    #[test]
    fn test_stage_display_matches_serde() {
        for stage in [Stage::Load, Stage::Score, Stage::Compare] {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage));
        }
    }
}
