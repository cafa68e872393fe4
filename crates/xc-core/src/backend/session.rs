//! Explicit session object passed to every harness call.

use xc_config::HarnessSettings;

use crate::backend::Backend;
use crate::logging::{get_host_id, generate_run_id, LogContext};
use crate::scorer::{ArtifactScorer, PredictCsvScorer};

/// Everything a check needs besides its own inputs.
///
/// Owns the backend connection, the standalone scorer, the settings and the
/// logging context. Checks borrow it read-only, so one session serves any
/// number of checks.
pub struct Session {
    backend: Box<dyn Backend>,
    scorer: Box<dyn ArtifactScorer>,
    settings: HarnessSettings,
    log: LogContext,
}

impl Session {
    /// Session with the `PredictCsv` scorer configured from `settings`.
    pub fn new(backend: Box<dyn Backend>, settings: HarnessSettings) -> Self {
        let scorer = Box::new(PredictCsvScorer::new(settings.scorer.clone()));
        Self::with_scorer(backend, scorer, settings)
    }

    pub fn with_scorer(
        backend: Box<dyn Backend>,
        scorer: Box<dyn ArtifactScorer>,
        settings: HarnessSettings,
    ) -> Self {
        Self {
            backend,
            scorer,
            settings,
            log: LogContext::new(generate_run_id(), get_host_id()),
        }
    }

    pub fn with_log_context(mut self, log: LogContext) -> Self {
        self.log = log;
        self
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn scorer(&self) -> &dyn ArtifactScorer {
        self.scorer.as_ref()
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    pub fn log(&self) -> &LogContext {
        &self.log
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.backend.name())
            .field("run_id", &self.log.run_id)
            .finish()
    }
}
