//! Scripted in-process backend for tests.
//!
//! Frames are loaded locally and "models" are a caller-supplied predictor
//! closure. The artifact it writes is the serialized model handle, and
//! [`ReplayScorer`] scores it by re-reading the exported CSV and calling the
//! same closure, so the whole export → score → parse path runs for real.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use xc_common::{Error, FrameId, ModelId, Result};
use xc_frame::{
    load_frame, read_csv, write_csv, Column, CsvOptions, DataSource, Frame, PredictionTable,
};
use xc_math::deviance::{null_deviance, residual_deviance, Family};

use super::{
    data_load_error, Backend, Coercion, DatasetHandle, ModelConfig, ModelMetrics,
    TrainedModelHandle,
};
use crate::scorer::{read_scorer_output, ArtifactScorer};

/// Produces predictions for a frame from a trained model.
pub type Predictor = Rc<dyn Fn(&Frame, &TrainedModelHandle) -> Result<PredictionTable>>;

/// Where an injected failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Import,
    Coerce,
    Train,
    Predict,
    Download,
    Export,
    Metrics,
}

pub struct MemoryBackend {
    predictor: Predictor,
    frames: RefCell<HashMap<FrameId, Frame>>,
    fits: Cell<u32>,
    failure: Option<(FailurePoint, String)>,
    calls: RefCell<Vec<String>>,
}

impl MemoryBackend {
    pub fn new<F>(predictor: F) -> Self
    where
        F: Fn(&Frame, &TrainedModelHandle) -> Result<PredictionTable> + 'static,
    {
        Self {
            predictor: Rc::new(predictor),
            frames: RefCell::new(HashMap::new()),
            fits: Cell::new(0),
            failure: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Make the given operation fail with `message`.
    pub fn fail_at(mut self, point: FailurePoint, message: impl Into<String>) -> Self {
        self.failure = Some((point, message.into()));
        self
    }

    /// Scorer that replays this backend's predictor against exported files.
    pub fn replay_scorer(&self) -> ReplayScorer {
        ReplayScorer {
            predictor: Rc::clone(&self.predictor),
        }
    }

    /// Operations performed so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Number of models trained so far.
    pub fn fit_count(&self) -> u32 {
        self.fits.get()
    }

    /// Current contents of an imported frame.
    pub fn frame(&self, id: &FrameId) -> Option<Frame> {
        self.frames.borrow().get(id).cloned()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn check_failure(&self, point: FailurePoint) -> Option<String> {
        match &self.failure {
            Some((p, message)) if *p == point => Some(message.clone()),
            _ => None,
        }
    }

    fn with_frame<T>(&self, id: &FrameId, f: impl FnOnce(&Frame) -> Result<T>) -> Result<T> {
        let frames = self.frames.borrow();
        let frame = frames
            .get(id)
            .ok_or_else(|| Error::DataLoad(format!("frame '{}' is not loaded", id)))?;
        f(frame)
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn import_frame(&self, source: &DataSource) -> Result<DatasetHandle> {
        self.record(format!("import {}", source));
        if let Some(message) = self.check_failure(FailurePoint::Import) {
            return Err(Error::DataLoad(message));
        }
        let frame = load_frame(source, &CsvOptions::default())
            .map_err(|e| data_load_error(source, e))?;
        let frame_id = FrameId::new(format!("{}.hex", source.file_name()));
        let handle = DatasetHandle {
            frame_id: frame_id.clone(),
            source: source.clone(),
            schema: frame.schema(),
            nrows: frame.nrows(),
        };
        self.frames.borrow_mut().insert(frame_id, frame);
        Ok(handle)
    }

    fn coerce_column(
        &self,
        dataset: &mut DatasetHandle,
        column: &str,
        coercion: Coercion,
    ) -> Result<bool> {
        self.record(format!("coerce {} {:?}", column, coercion));
        if let Some(message) = self.check_failure(FailurePoint::Coerce) {
            return Err(Error::DataLoad(message));
        }
        let mut frames = self.frames.borrow_mut();
        let frame = frames
            .get_mut(&dataset.frame_id)
            .ok_or_else(|| Error::DataLoad(format!("frame '{}' is not loaded", dataset.frame_id)))?;
        let changed = match coercion {
            Coercion::AsFactor => frame.as_factor(column)?,
        };
        dataset.schema = frame.schema();
        Ok(changed)
    }

    fn train(&self, dataset: &DatasetHandle, config: &ModelConfig) -> Result<TrainedModelHandle> {
        self.record(format!("train {}", config.algorithm));
        if let Some(message) = self.check_failure(FailurePoint::Train) {
            return Err(Error::Training(message));
        }
        self.with_frame(&dataset.frame_id, |_| Ok(()))?;
        let n = self.fits.get() + 1;
        self.fits.set(n);
        let model_id = config.model_id.clone().unwrap_or_else(|| {
            ModelId::new(format!("{}_model_memory_{}", config.algorithm.model_prefix(), n))
        });
        Ok(TrainedModelHandle {
            model_id,
            config: config.clone(),
            training_frame: dataset.frame_id.clone(),
        })
    }

    fn predict(
        &self,
        model: &TrainedModelHandle,
        dataset: &DatasetHandle,
    ) -> Result<PredictionTable> {
        self.record(format!("predict {}", model.model_id));
        if let Some(message) = self.check_failure(FailurePoint::Predict) {
            return Err(Error::Prediction(message));
        }
        self.with_frame(&dataset.frame_id, |frame| (self.predictor)(frame, model))
    }

    fn download_artifact(&self, model: &TrainedModelHandle, dir: &Path) -> Result<PathBuf> {
        self.record(format!("download {}", model.model_id));
        if let Some(message) = self.check_failure(FailurePoint::Download) {
            return Err(Error::Export(message));
        }
        let path = dir.join(model.model_id.artifact_file_name());
        let body = serde_json::to_vec_pretty(model)?;
        std::fs::write(&path, body)
            .map_err(|e| Error::Export(format!("{}: {}", path.display(), e)))?;
        Ok(path)
    }

    fn export_frame(&self, dataset: &DatasetHandle, path: &Path) -> Result<()> {
        self.record(format!("export {}", dataset.frame_id));
        if let Some(message) = self.check_failure(FailurePoint::Export) {
            return Err(Error::Export(message));
        }
        self.with_frame(&dataset.frame_id, |frame| {
            write_csv(frame, path, &CsvOptions::default())
                .map_err(|e| Error::Export(format!("{}: {}", path.display(), e)))
        })
    }

    fn model_metrics(&self, model: &TrainedModelHandle) -> Result<ModelMetrics> {
        self.record(format!("metrics {}", model.model_id));
        if let Some(message) = self.check_failure(FailurePoint::Metrics) {
            return Err(Error::Prediction(message));
        }
        let family = model.config.family.ok_or_else(|| {
            Error::Prediction(format!("model '{}' has no deviance metrics", model.model_id))
        })?;
        let response = model.config.response.as_deref().ok_or_else(|| {
            Error::Prediction(format!("model '{}' has no response", model.model_id))
        })?;

        self.with_frame(&model.training_frame, |frame| {
            let y = numeric_values(frame.column(response)?);
            let predictions = (self.predictor)(frame, model)?;
            let mu = predictions.numeric(fitted_column(family, &predictions))?;

            let (y, mu): (Vec<f64>, Vec<f64>) = y
                .into_iter()
                .zip(mu)
                .filter(|(a, b)| a.is_finite() && b.is_finite())
                .unzip();
            let residual = residual_deviance(family, &y, &mu)
                .map_err(|e| Error::Prediction(e.to_string()))?;
            let null = null_deviance(family, &y).map_err(|e| Error::Prediction(e.to_string()))?;
            Ok(ModelMetrics {
                residual_deviance: Some(residual),
                null_deviance: Some(null),
                ..ModelMetrics::default()
            })
        })
    }
}

/// Column holding the fitted mean for a family.
fn fitted_column(family: Family, predictions: &PredictionTable) -> &str {
    let names = predictions.names();
    let preferred = match family {
        Family::Binomial => "p1",
        Family::Gaussian | Family::Poisson => "predict",
    };
    names
        .iter()
        .find(|n| *n == preferred)
        .or_else(|| names.last())
        .map_or(preferred, String::as_str)
}

/// Numeric view of a column; categorical labels are parsed.
pub fn numeric_values(column: &Column) -> Vec<f64> {
    match column {
        Column::Categorical(labels) | Column::Str(labels) => labels
            .iter()
            .map(|l| l.as_deref().and_then(|s| s.parse().ok()).unwrap_or(f64::NAN))
            .collect(),
        other => other.to_f64_vec().unwrap_or_default(),
    }
}

/// Standalone scorer for [`MemoryBackend`] artifacts.
pub struct ReplayScorer {
    predictor: Predictor,
}

impl ArtifactScorer for ReplayScorer {
    fn score(&self, artifact: &Path, input: &Path, output: &Path) -> Result<PredictionTable> {
        let body = std::fs::read(artifact)
            .map_err(|e| Error::ArtifactScoring(format!("{}: {}", artifact.display(), e)))?;
        let model: TrainedModelHandle = serde_json::from_slice(&body)
            .map_err(|e| Error::ArtifactScoring(format!("unreadable artifact: {}", e)))?;

        // The scorer only sees the file, so categorical columns come back
        // with inferred types, as they would for a real standalone scorer.
        let frame = read_csv(input, &CsvOptions::default())
            .map_err(|e| Error::ArtifactScoring(format!("{}: {}", input.display(), e)))?;

        let predictions = (self.predictor)(&frame, &model)?;
        write_csv(predictions.frame(), output, &CsvOptions::default())
            .map_err(|e| Error::ArtifactScoring(format!("{}: {}", output.display(), e)))?;
        read_scorer_output(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Algorithm;
    use tempfile::TempDir;
    use xc_frame::{Cell as FrameCell, ColumnType};

    fn age_predictor() -> MemoryBackend {
        MemoryBackend::new(|frame: &Frame, _model: &TrainedModelHandle| {
            let age = numeric_values(frame.column("age")?);
            Ok(PredictionTable::from_values("lp", age.into_iter().map(|a| a * 0.1)))
        })
    }

    fn dataset(dir: &TempDir) -> DataSource {
        let path = dir.path().join("heart.csv");
        std::fs::write(&path, "age,C2,event\n50,0,1\n61,1,0\n").unwrap();
        DataSource::file(path)
    }

    #[test]
    fn test_import_coerce_train_predict() {
        let dir = TempDir::new().unwrap();
        let backend = age_predictor();
        let mut handle = backend.import_frame(&dataset(&dir)).unwrap();
        assert_eq!(handle.frame_id.as_str(), "heart.csv.hex");
        assert_eq!(handle.nrows, 2);

        assert!(backend.coerce_column(&mut handle, "C2", Coercion::AsFactor).unwrap());
        assert!(!backend.coerce_column(&mut handle, "C2", Coercion::AsFactor).unwrap());
        assert_eq!(handle.schema.column_type("C2"), Some(ColumnType::Categorical));

        let model = backend
            .train(&handle, &ModelConfig::new(Algorithm::Glm).with_response("event"))
            .unwrap();
        assert_eq!(model.model_id.as_str(), "GLM_model_memory_1");
        let predictions = backend.predict(&model, &handle).unwrap();
        let lp = predictions.numeric("lp").unwrap();
        assert_eq!(lp.len(), 2);
        assert!((lp[1] - 6.1).abs() < 1e-12);
    }

    #[test]
    fn test_injected_failure_keeps_category() {
        let dir = TempDir::new().unwrap();
        let backend = age_predictor().fail_at(FailurePoint::Train, "singular matrix");
        let handle = backend.import_frame(&dataset(&dir)).unwrap();
        let err = backend
            .train(&handle, &ModelConfig::new(Algorithm::CoxPh))
            .unwrap_err();
        assert!(matches!(err, Error::Training(ref m) if m == "singular matrix"));
    }

    #[test]
    fn test_replay_scorer_roundtrip() {
        let dir = TempDir::new().unwrap();
        let backend = age_predictor();
        let handle = backend.import_frame(&dataset(&dir)).unwrap();
        let model = backend
            .train(&handle, &ModelConfig::new(Algorithm::Glm).with_response("event"))
            .unwrap();

        let artifact = backend.download_artifact(&model, dir.path()).unwrap();
        assert!(artifact.ends_with("GLM_model_memory_1.zip"));
        let input = dir.path().join("in.csv");
        backend.export_frame(&handle, &input).unwrap();

        let scored = backend
            .replay_scorer()
            .score(&artifact, &input, &dir.path().join("out_mojo.csv"))
            .unwrap();
        assert_eq!(scored, backend.predict(&model, &handle).unwrap());
        assert_eq!(scored.frame().cell(0, 0), FrameCell::Number(5.0));
    }

    #[test]
    fn test_binomial_metrics() {
        let dir = TempDir::new().unwrap();
        let backend = MemoryBackend::new(|frame: &Frame, _m: &TrainedModelHandle| {
            let n = frame.nrows();
            Ok(PredictionTable::new(Frame::new(vec![
                ("predict".into(), Column::from_f64(vec![1.0; n])),
                ("p1".into(), Column::from_f64(vec![0.5; n])),
            ])?))
        });
        let handle = backend.import_frame(&dataset(&dir)).unwrap();
        let config = ModelConfig::new(Algorithm::Glm)
            .with_response("event")
            .with_family(Family::Binomial);
        let model = backend.train(&handle, &config).unwrap();
        let metrics = backend.model_metrics(&model).unwrap();
        // p = 0.5 everywhere equals the mean response, so residual == null
        assert!((metrics.deviance_ratio().unwrap() - 1.0).abs() < 1e-12);
    }
}
