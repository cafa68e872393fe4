//! The boundary to the compute backend that imports data, trains and predicts.
//!
//! Every operation is a single blocking call. Implementations carry the
//! backend's own error message unmodified inside the matching error category.

pub mod model;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

#[cfg(feature = "rest")]
pub mod rest;

use std::path::{Path, PathBuf};

use xc_common::{Error, Result};
use xc_frame::{DataSource, FrameError, PredictionTable};

pub use model::{
    Algorithm, Coercion, DatasetHandle, InteractionPair, ModelConfig, ModelMetrics,
    TrainedModelHandle,
};
pub use session::Session;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{FailurePoint, MemoryBackend};

#[cfg(feature = "rest")]
pub use rest::RestBackend;

/// Operations the harness needs from a compute backend.
pub trait Backend {
    /// Short name for logs and reports.
    fn name(&self) -> &str;

    /// Import a delimited dataset.
    fn import_frame(&self, source: &DataSource) -> Result<DatasetHandle>;

    /// Apply a coercion to one column, updating the handle's schema.
    ///
    /// Idempotent: returns `false` when the column already had the target
    /// type and nothing changed.
    fn coerce_column(
        &self,
        dataset: &mut DatasetHandle,
        column: &str,
        coercion: Coercion,
    ) -> Result<bool>;

    fn train(&self, dataset: &DatasetHandle, config: &ModelConfig) -> Result<TrainedModelHandle>;

    /// Predict every row of `dataset`, row-aligned with it.
    fn predict(
        &self,
        model: &TrainedModelHandle,
        dataset: &DatasetHandle,
    ) -> Result<PredictionTable>;

    /// Write the portable scoring artifact into `dir`, returning its path.
    ///
    /// The file is named `<mojo_name(model_id)>.zip`.
    fn download_artifact(&self, model: &TrainedModelHandle, dir: &Path) -> Result<PathBuf>;

    /// Write `dataset` as delimited text with a header row, columns in load
    /// order.
    fn export_frame(&self, dataset: &DatasetHandle, path: &Path) -> Result<()>;

    fn model_metrics(&self, model: &TrainedModelHandle) -> Result<ModelMetrics>;
}

/// Classify a local frame error raised while loading a dataset.
pub(crate) fn data_load_error(source: &DataSource, err: FrameError) -> Error {
    match err {
        FrameError::Malformed { line, message } => Error::MalformedData {
            line,
            message: format!("{}: {}", source, message),
        },
        other => Error::DataLoad(format!("{}: {}", source, other)),
    }
}
