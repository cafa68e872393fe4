//! Single-model cross-validation check.
//!
//! Loads a dataset through the session's backend, trains one model, predicts
//! in process, and then runs whatever comparisons the policy asks for:
//! artifact parity (export + standalone scorer), a reference scalar,
//! per-row thresholds and reproducibility of a second fit.
//!
//! Infrastructure failures stop the check immediately and are returned as
//! `Err`. Comparison results, passing or not, are collected in the
//! [`CheckOutcome`].

pub mod plan;
pub mod reference;
pub mod sandbox;

pub use plan::{
    CheckPlan, ColumnCoercion, ComparisonPolicy, DatasetSpec, ReferencePolicy, Reproducibility,
    ThresholdPolicy,
};
pub use reference::{FixedReference, FnReference, ReferenceImplementation};
pub use sandbox::Sandbox;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use xc_common::{Error, FrameId, ModelId, Result};
use xc_frame::PredictionTable;

use crate::backend::{Algorithm, DatasetHandle, ModelConfig, Session, TrainedModelHandle};
use crate::compare::rowwise::compare_tables_as;
use crate::compare::{
    compare_ordering, compare_scalars, evaluate_thresholds, ComparisonKind, ComparisonResult,
    ScalarCheck,
};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};

/// File the dataset is exported to inside the sandbox.
pub const EXPORTED_DATASET: &str = "in.csv";

/// File the standalone scorer writes inside the sandbox.
pub const SCORER_OUTPUT: &str = "out_mojo.csv";

/// Every comparison one check produced.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub check_id: String,
    pub backend: String,
    pub algorithm: Algorithm,
    pub model_id: ModelId,
    pub frame_id: FrameId,
    pub rows: usize,
    pub results: Vec<ComparisonResult>,
    /// Sandbox retained after a failed artifact comparison.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kept_sandbox: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn result(&self, kind: ComparisonKind) -> Option<&ComparisonResult> {
        self.results.iter().find(|r| r.kind == kind)
    }

    /// `Ok(())` when every comparison passed, otherwise the first failure as
    /// a `ComparisonFailure`.
    pub fn verdict(&self) -> Result<()> {
        match self.results.iter().find(|r| !r.passed) {
            Some(failed) => failed.clone().into_verdict().map(|_| ()),
            None => Ok(()),
        }
    }
}

fn missing_reference(policy: &ReferencePolicy) -> Error {
    Error::InvalidPlan(format!(
        "reference comparison of '{}' has neither a value nor an implementation",
        policy.metric
    ))
}

fn new_check_id() -> String {
    format!("chk-{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}

/// Run one check with the reference value (if any) taken from the policy.
pub fn run_single_model_check(
    session: &Session,
    dataset: &DatasetSpec,
    config: &ModelConfig,
    policy: &ComparisonPolicy,
) -> Result<CheckOutcome> {
    run_check_with_reference(session, dataset, config, policy, None)
}

/// Run one check, computing the reference scalar with `reference` when
/// given. A reference supplied here takes precedence over a fixed value in
/// the policy.
pub fn run_check_with_reference(
    session: &Session,
    dataset: &DatasetSpec,
    config: &ModelConfig,
    policy: &ComparisonPolicy,
    reference: Option<&dyn ReferenceImplementation>,
) -> Result<CheckOutcome> {
    policy.validate()?;
    if let Some(rp) = &policy.reference {
        if reference.is_none() && rp.value.is_none() {
            return Err(missing_reference(rp));
        }
    }

    let started_at = Utc::now();
    let timer = Instant::now();
    let check_id = new_check_id();
    let log = session.log().clone().with_check_id(check_id.clone());
    let backend = session.backend();

    log_event!(
        log,
        INFO,
        event_names::CHECK_STARTED,
        Stage::Init,
        "check started",
        backend = backend.name(),
        algorithm = tracing::field::display(config.algorithm),
        source = tracing::field::display(&dataset.source)
    );

    let handle = load_dataset(session, &log, dataset)?;

    config.validate(&handle.schema)?;
    log_event!(log, DEBUG, event_names::TRAIN_STARTED, Stage::Train, "training", algorithm = tracing::field::display(config.algorithm));
    let model = backend.train(&handle, config)?;
    log_event!(log, INFO, event_names::TRAIN_FINISHED, Stage::Train, "model trained", model_id = model.model_id.as_str());

    let predictions = predict(session, &log, &model, &handle)?;

    let mut results = Vec::new();
    let mut kept_sandbox = None;

    if policy.artifact_parity {
        let (result, kept) = artifact_parity(session, &log, &model, &handle, &predictions, policy)?;
        kept_sandbox = kept;
        results.push(result);
    }

    if let Some(rp) = &policy.reference {
        let metrics = backend.model_metrics(&model)?;
        let candidate = metrics.get(&rp.metric).ok_or_else(|| {
            Error::Training(format!(
                "backend reported no '{}' metric for {}",
                rp.metric, model.model_id
            ))
        })?;
        let expected = match reference {
            Some(implementation) => implementation.compute(&rp.metric, &dataset.source, config)?,
            None => rp.value.ok_or_else(|| missing_reference(rp))?,
        };
        let mut check = ScalarCheck::new(rp.metric.clone(), candidate, expected, rp.tolerance);
        check.direction = rp.direction;
        results.push(compare_scalars(&check));
    }

    if let Some(thresholds) = &policy.thresholds {
        results.push(evaluate_thresholds(
            &predictions,
            &thresholds.column,
            &thresholds.assertions,
        )?);
    }

    if let Some(mode) = &policy.reproducibility {
        let refit = backend.train(&handle, config)?;
        log_event!(log, INFO, event_names::TRAIN_FINISHED, Stage::Train, "model refitted", model_id = refit.model_id.as_str());
        let again = predict(session, &log, &refit, &handle)?;
        let result = match mode {
            Reproducibility::Equal => compare_tables_as(
                ComparisonKind::Reproducibility,
                &predictions,
                &again,
                &policy.options,
            )?,
            Reproducibility::Ordering { column, min_rho } => {
                compare_ordering(&predictions, &again, column, *min_rho)?
            }
        };
        results.push(result);
    }

    for result in &results {
        if result.passed {
            log_event!(log, INFO, event_names::COMPARE_RESULT, Stage::Compare, result.summary_line(), kind = tracing::field::display(result.kind), passed = true, max_discrepancy = result.max_discrepancy);
        } else {
            log_event!(log, WARN, event_names::COMPARE_RESULT, Stage::Compare, result.summary_line(), kind = tracing::field::display(result.kind), passed = false, max_discrepancy = result.max_discrepancy);
        }
    }

    let outcome = CheckOutcome {
        check_id,
        backend: backend.name().to_string(),
        algorithm: config.algorithm,
        model_id: model.model_id,
        frame_id: handle.frame_id,
        rows: handle.nrows,
        results,
        kept_sandbox,
        started_at,
        duration_ms: timer.elapsed().as_millis() as u64,
    };
    log_event!(
        log,
        INFO,
        event_names::CHECK_FINISHED,
        Stage::Report,
        "check finished",
        passed = outcome.passed(),
        comparisons = outcome.results.len(),
        duration_ms = outcome.duration_ms
    );
    Ok(outcome)
}

/// Import the dataset and apply its coercions.
///
/// Every coercion column is checked against the imported schema before any
/// coercion is applied.
pub fn load_dataset(
    session: &Session,
    log: &LogContext,
    spec: &DatasetSpec,
) -> Result<DatasetHandle> {
    let backend = session.backend();
    let mut handle = backend.import_frame(&spec.source)?;
    log_event!(
        log,
        INFO,
        event_names::LOAD_IMPORTED,
        Stage::Load,
        "dataset imported",
        frame_id = handle.frame_id.as_str(),
        rows = handle.nrows,
        columns = handle.ncols()
    );

    if let Some(unknown) = spec
        .coercions
        .iter()
        .find(|c| !handle.schema.contains(&c.column))
    {
        return Err(Error::UnknownColumn {
            column: unknown.column.clone(),
            context: format!("coercions for {}", spec.source),
        });
    }

    for coercion in &spec.coercions {
        let changed = backend.coerce_column(&mut handle, &coercion.column, coercion.coercion)?;
        log_event!(
            log,
            DEBUG,
            event_names::LOAD_COERCED,
            Stage::Load,
            "column coerced",
            column = coercion.column.as_str(),
            changed = changed
        );
    }
    Ok(handle)
}

fn predict(
    session: &Session,
    log: &LogContext,
    model: &TrainedModelHandle,
    handle: &DatasetHandle,
) -> Result<PredictionTable> {
    let table = session.backend().predict(model, handle)?;
    if table.nrows() != handle.nrows {
        return Err(Error::Prediction(format!(
            "{} returned {} prediction rows for {} input rows",
            model.model_id,
            table.nrows(),
            handle.nrows
        )));
    }
    log_event!(
        log,
        DEBUG,
        event_names::PREDICT_FINISHED,
        Stage::Predict,
        "in-process predictions ready",
        rows = table.nrows(),
        columns = table.ncols()
    );
    Ok(table)
}

/// Export artifact and dataset into a sandbox, score out of process and
/// compare with the in-process table.
fn artifact_parity(
    session: &Session,
    log: &LogContext,
    model: &TrainedModelHandle,
    handle: &DatasetHandle,
    predictions: &PredictionTable,
    policy: &ComparisonPolicy,
) -> Result<(ComparisonResult, Option<PathBuf>)> {
    let backend = session.backend();
    let sandbox = Sandbox::create(&session.settings().sandbox)?;

    let artifact = backend.download_artifact(model, sandbox.path())?;
    log_event!(log, DEBUG, event_names::EXPORT_ARTIFACT, Stage::Export, "artifact downloaded", path = tracing::field::display(artifact.display()));

    let input = sandbox.join(EXPORTED_DATASET);
    backend.export_frame(handle, &input)?;
    log_event!(log, DEBUG, event_names::EXPORT_DATASET, Stage::Export, "dataset exported", path = tracing::field::display(input.display()));

    let output = sandbox.join(SCORER_OUTPUT);
    log_event!(log, INFO, event_names::SCORE_STARTED, Stage::Score, "scoring artifact out of process", artifact = tracing::field::display(artifact.display()));
    let scored = session.scorer().score(&artifact, &input, &output)?;
    log_event!(log, INFO, event_names::SCORE_FINISHED, Stage::Score, "artifact scored", rows = scored.nrows());

    let compared = compare_tables_as(
        ComparisonKind::ArtifactParity,
        predictions,
        &scored,
        &policy.options,
    );
    let passed = matches!(&compared, Ok(result) if result.passed);
    let kept = sandbox.finish(passed);
    if let Some(path) = &kept {
        log_event!(log, WARN, event_names::SANDBOX_KEPT, Stage::Export, "sandbox kept for inspection", path = tracing::field::display(path.display()));
    }
    Ok((compared?, kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::compare::ThresholdAssertion;
    use std::fs;
    use tempfile::TempDir;
    use xc_config::HarnessSettings;
    use xc_frame::{DataSource, Frame};

    fn lp_backend() -> MemoryBackend {
        MemoryBackend::new(|frame: &Frame, _model: &TrainedModelHandle| {
            let x = crate::backend::memory::numeric_values(frame.column("x")?);
            Ok(PredictionTable::from_values("lp", x.iter().map(|v| 0.5 * v)))
        })
    }

    fn session_with(backend: MemoryBackend, root: &std::path::Path) -> Session {
        let mut settings = HarnessSettings::default();
        settings.sandbox.root = Some(root.to_path_buf());
        let scorer = Box::new(backend.replay_scorer());
        Session::with_scorer(Box::new(backend), scorer, settings)
    }

    fn dataset(dir: &TempDir) -> DatasetSpec {
        let path = dir.path().join("data.csv");
        fs::write(&path, "x,y,g\n1,0,a\n2,1,b\n3,1,a\n4,0,b\n").unwrap();
        DatasetSpec::new(DataSource::file(path))
    }

    fn config() -> ModelConfig {
        ModelConfig::new(Algorithm::Glm)
            .with_predictors(["x"])
            .with_response("y")
    }

    #[test]
    fn test_artifact_parity_passes() {
        let dir = TempDir::new().unwrap();
        let session = session_with(lp_backend(), dir.path());
        let policy = ComparisonPolicy::default().with_artifact_parity();

        let outcome = run_single_model_check(&session, &dataset(&dir), &config(), &policy).unwrap();
        assert!(outcome.passed());
        assert!(outcome.verdict().is_ok());
        assert_eq!(outcome.rows, 4);
        let parity = outcome.result(ComparisonKind::ArtifactParity).unwrap();
        assert_eq!(parity.rows_compared, 4);
        assert!(outcome.check_id.starts_with("chk-"));
    }

    #[test]
    fn test_empty_policy_fails_before_import() {
        let dir = TempDir::new().unwrap();
        let backend = lp_backend();
        let session = session_with(backend, dir.path());
        let err = run_single_model_check(
            &session,
            &dataset(&dir),
            &config(),
            &ComparisonPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPlan(_)));
    }

    #[test]
    fn test_unknown_coercion_column() {
        let dir = TempDir::new().unwrap();
        let session = session_with(lp_backend(), dir.path());
        let spec = dataset(&dir).with_factor("g").with_factor("missing");
        let policy = ComparisonPolicy::default().with_artifact_parity();

        let err = run_single_model_check(&session, &spec, &config(), &policy).unwrap_err();
        match err {
            Error::UnknownColumn { column, .. } => assert_eq!(column, "missing"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_predictor_is_training_error() {
        let dir = TempDir::new().unwrap();
        let session = session_with(lp_backend(), dir.path());
        let policy = ComparisonPolicy::default().with_artifact_parity();
        let bad = config().with_predictors(["x", "age"]);

        let err = run_single_model_check(&session, &dataset(&dir), &bad, &policy).unwrap_err();
        assert_eq!(err.category(), xc_common::ErrorCategory::Training);
    }

    #[test]
    fn test_reference_needs_a_value() {
        let dir = TempDir::new().unwrap();
        let session = session_with(lp_backend(), dir.path());
        let policy =
            ComparisonPolicy::default().with_reference(ReferencePolicy::new("deviance_ratio", 0.01));
        let err = run_single_model_check(&session, &dataset(&dir), &config(), &policy).unwrap_err();
        assert!(matches!(err, Error::InvalidPlan(_)));
    }

    #[test]
    fn test_failing_threshold_reported_in_outcome() {
        let dir = TempDir::new().unwrap();
        let session = session_with(lp_backend(), dir.path());
        let policy = ComparisonPolicy::default().with_thresholds(
            "lp",
            [
                ThresholdAssertion::at_least(3, 1.5),
                ThresholdAssertion::at_most(0, 0.1),
            ],
        );

        let outcome = run_single_model_check(&session, &dataset(&dir), &config(), &policy).unwrap();
        assert!(!outcome.passed());
        let err = outcome.verdict().unwrap_err();
        let detail = err.mismatch().unwrap();
        assert_eq!(detail.row, Some(0));
        assert_eq!(detail.column.as_deref(), Some("lp"));
    }
}
