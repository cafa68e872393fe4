//! Backend over an H2O-3 style REST API.
//!
//! Every call is a blocking HTTP request; long-running work (parse, model
//! build) is started as a job and polled until it finishes. Error messages
//! reported by the server are passed through unmodified.

use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};
use xc_common::{Error, FrameId, ModelId, Result};
use xc_config::BackendSettings;
use xc_frame::{ColumnType, DataSource, PredictionTable, Schema};

use super::{Backend, Coercion, DatasetHandle, ModelConfig, ModelMetrics, TrainedModelHandle};

/// Constructs an error of one category from a message.
type ErrorKind = fn(String) -> Error;

pub struct RestBackend {
    base_url: String,
    agent: ureq::Agent,
    poll_interval: Duration,
}

impl RestBackend {
    pub fn new(settings: &BackendSettings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build();
        Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            agent,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get_json(&self, path: &str, query: &[(&str, &str)], kind: ErrorKind) -> Result<Value> {
        trace!(path, "GET");
        let mut request = self.agent.get(&self.url(path));
        for (key, value) in query {
            request = request.query(key, value);
        }
        let response = request.call().map_err(|e| transport_error(e, kind))?;
        response
            .into_json()
            .map_err(|e| kind(format!("{}: unreadable response: {}", path, e)))
    }

    fn post_form(&self, path: &str, form: &[(&str, &str)], kind: ErrorKind) -> Result<Value> {
        trace!(path, "POST");
        let response = self
            .agent
            .post(&self.url(path))
            .send_form(form)
            .map_err(|e| transport_error(e, kind))?;
        response
            .into_json()
            .map_err(|e| kind(format!("{}: unreadable response: {}", path, e)))
    }

    fn get_bytes(&self, path: &str, query: &[(&str, &str)], kind: ErrorKind) -> Result<Vec<u8>> {
        let mut request = self.agent.get(&self.url(path));
        for (key, value) in query {
            request = request.query(key, value);
        }
        let response = request.call().map_err(|e| transport_error(e, kind))?;
        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| kind(format!("{}: {}", path, e)))?;
        Ok(body)
    }

    /// Poll a job until it leaves the running state.
    fn wait_for_job(&self, job: &str, kind: ErrorKind) -> Result<Value> {
        let path = format!("/3/Jobs/{}", job);
        loop {
            let body = self.get_json(&path, &[], kind)?;
            match job_status(&body) {
                JobStatus::Done => return Ok(body),
                JobStatus::Running(progress) => {
                    trace!(job, progress, "job running");
                    thread::sleep(self.poll_interval);
                }
                JobStatus::Failed(message) => return Err(kind(message)),
            }
        }
    }

    fn download_frame(&self, frame: &str, kind: ErrorKind) -> Result<Vec<u8>> {
        self.get_bytes(
            "/3/DownloadDataset",
            &[("frame_id", frame), ("hex_string", "false")],
            kind,
        )
    }

    fn frame_schema(&self, frame: &str) -> Result<(Schema, usize)> {
        let body = self.get_json(
            &format!("/3/Frames/{}", frame),
            &[("row_count", "0")],
            Error::DataLoad,
        )?;
        parse_frame_summary(&body).map_err(Error::DataLoad)
    }
}

fn transport_error(err: ureq::Error, kind: ErrorKind) -> Error {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            kind(server_message(code, &body))
        }
        ureq::Error::Transport(transport) => kind(transport.to_string()),
    }
}

/// The server's own message for a failed request.
fn server_message(code: u16, body: &str) -> String {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["exception_msg", "msg"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
    });
    match message {
        Some(m) => format!("HTTP {}: {}", code, m),
        None => format!("HTTP {}: {}", code, body.trim()),
    }
}

#[derive(Debug, PartialEq)]
enum JobStatus {
    Running(f64),
    Done,
    Failed(String),
}

fn job_status(body: &Value) -> JobStatus {
    let job = &body["jobs"][0];
    match job["status"].as_str() {
        Some("DONE") => JobStatus::Done,
        Some("FAILED") | Some("CANCELLED") => JobStatus::Failed(
            job["exception"]
                .as_str()
                .or_else(|| job["warnings"][0].as_str())
                .unwrap_or("job failed without a message")
                .to_string(),
        ),
        Some(_) => JobStatus::Running(job["progress"].as_f64().unwrap_or(0.0)),
        None => JobStatus::Failed(format!("unexpected job response: {}", body)),
    }
}

fn column_type(h2o_type: &str) -> ColumnType {
    match h2o_type {
        "enum" => ColumnType::Categorical,
        "time" => ColumnType::Time,
        "string" | "uuid" => ColumnType::Str,
        _ => ColumnType::Numeric,
    }
}

fn parse_frame_summary(body: &Value) -> std::result::Result<(Schema, usize), String> {
    let frame = &body["frames"][0];
    let columns = frame["columns"]
        .as_array()
        .ok_or_else(|| format!("frame summary has no columns: {}", body))?;
    let schema = Schema::new(
        columns
            .iter()
            .map(|c| {
                (
                    c["label"].as_str().unwrap_or_default().to_string(),
                    column_type(c["type"].as_str().unwrap_or("real")),
                )
            })
            .collect(),
    )
    .map_err(|e| e.to_string())?;
    let rows = frame["rows"].as_u64().unwrap_or(0) as usize;
    Ok((schema, rows))
}

fn json_list(values: &[String]) -> String {
    Value::from(values.to_vec()).to_string()
}

/// Form parameters for a model build.
fn training_params(config: &ModelConfig, frame: &FrameId, schema: &Schema) -> Vec<(String, String)> {
    let mut params = vec![("training_frame".to_string(), frame.to_string())];
    let mut push = |key: &str, value: String| params.push((key.to_string(), value));

    if let Some(id) = &config.model_id {
        push("model_id", id.to_string());
    }
    if let Some(response) = &config.response {
        push("response_column", response.clone());
    }
    if let Some(start) = &config.start_column {
        push("start_column", start.clone());
    }
    if let Some(stop) = &config.stop_column {
        push("stop_column", stop.clone());
    }

    // the builders take ignored columns rather than predictors
    if !config.predictors.is_empty() {
        let used: Vec<&str> = config
            .column_roles()
            .into_iter()
            .map(|(_, c)| c)
            .chain(config.predictors.iter().map(String::as_str))
            .collect();
        let ignored: Vec<String> = schema
            .names()
            .filter(|n| !used.contains(n))
            .map(str::to_string)
            .collect();
        if !ignored.is_empty() {
            push("ignored_columns", json_list(&ignored));
        }
    }

    if !config.interaction_pairs.is_empty() {
        let pairs: Vec<Value> = config
            .interaction_pairs
            .iter()
            .map(|p| serde_json::json!({"a": p.0, "b": p.1}))
            .collect();
        push("interaction_pairs", Value::from(pairs).to_string());
    }
    if !config.stratify_by.is_empty() {
        push("stratify_by", json_list(&config.stratify_by));
    }
    if let Some(family) = config.family {
        push("family", family.to_string());
    }
    if let Some(link) = &config.link {
        push("link", link.clone());
    }
    if let Some(alpha) = config.alpha {
        push("alpha", format!("[{}]", alpha));
    }
    if let Some(lambda) = config.lambda {
        push("lambda", format!("[{}]", lambda));
    }
    if let Some(ties) = &config.ties {
        push("ties", ties.clone());
    }
    if let Some(ntrees) = config.ntrees {
        push("ntrees", ntrees.to_string());
    }
    if let Some(sample_size) = config.sample_size {
        push("sample_size", sample_size.to_string());
    }
    if let Some(level) = config.extension_level {
        push("extension_level", level.to_string());
    }
    if let Some(seed) = config.seed {
        push("seed", seed.to_string());
    }
    for (key, value) in &config.params {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        push(key.as_str(), rendered);
    }
    params
}

fn as_form(params: &[(String, String)]) -> Vec<(&str, &str)> {
    params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

fn job_key(body: &Value) -> Option<&str> {
    body["job"]["key"]["name"].as_str()
}

/// Training metrics from a `/3/Models/{id}` response.
fn parse_metrics(body: &Value) -> ModelMetrics {
    let metrics = &body["models"][0]["output"]["training_metrics"];
    let number = |key: &str| metrics[key].as_f64();
    let mut parsed = ModelMetrics {
        residual_deviance: number("residual_deviance"),
        null_deviance: number("null_deviance"),
        loglik: number("loglik"),
        concordance: number("concordance"),
        ..ModelMetrics::default()
    };
    if let Some(object) = metrics.as_object() {
        for (key, value) in object {
            if let Some(v) = value.as_f64() {
                parsed.other.entry(key.clone()).or_insert(v);
            }
        }
    }
    parsed
}

impl Backend for RestBackend {
    fn name(&self) -> &str {
        "h2o-rest"
    }

    fn import_frame(&self, source: &DataSource) -> Result<DatasetHandle> {
        let path = match source {
            DataSource::File { path } => path,
            // the server unpacks single-member archives itself
            DataSource::ArchiveMember { archive, .. } => archive,
        };
        let path = path.to_string_lossy();
        let imported = self.get_json("/3/ImportFiles", &[("path", &*path)], Error::DataLoad)?;
        let raw = imported["destination_frames"][0]
            .as_str()
            .ok_or_else(|| Error::DataLoad(format!("{}: nothing imported ({})", source, imported)))?
            .to_string();

        let setup = self.post_form(
            "/3/ParseSetup",
            &[("source_frames", json_list(&[raw.clone()]).as_str())],
            Error::DataLoad,
        )?;
        let destination = format!("{}.hex", source.file_name());
        let mut form: Vec<(String, String)> = vec![
            ("destination_frame".into(), destination.clone()),
            ("source_frames".into(), json_list(&[raw])),
            ("delete_on_done".into(), "true".into()),
            ("blocking".into(), "false".into()),
        ];
        for key in [
            "parse_type",
            "separator",
            "number_columns",
            "single_quotes",
            "column_names",
            "column_types",
            "check_header",
            "chunk_size",
        ] {
            if let Some(value) = setup.get(key).filter(|v| !v.is_null()) {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                form.push((key.to_string(), rendered));
            }
        }
        let parse = self.post_form("/3/Parse", &as_form(&form), Error::DataLoad)?;
        if let Some(job) = job_key(&parse) {
            self.wait_for_job(job, Error::DataLoad)?;
        }

        let (schema, nrows) = self.frame_schema(&destination)?;
        debug!(frame = %destination, rows = nrows, columns = schema.len(), "frame parsed");
        Ok(DatasetHandle {
            frame_id: FrameId::new(destination),
            source: source.clone(),
            schema,
            nrows,
        })
    }

    fn coerce_column(
        &self,
        dataset: &mut DatasetHandle,
        column: &str,
        coercion: Coercion,
    ) -> Result<bool> {
        let column_ref = dataset.schema.resolve(column, "coercion")?;
        match coercion {
            Coercion::AsFactor => {
                if column_ref.kind == ColumnType::Categorical {
                    return Ok(false);
                }
                let frame = dataset.frame_id.as_str();
                let ast = format!(
                    "(assign {f} (:= {f} (as.factor (cols_py {f} {i})) {i} []))",
                    f = frame,
                    i = column_ref.index
                );
                self.post_form("/99/Rapids", &[("ast", ast.as_str())], Error::DataLoad)?;
                dataset.schema.set_type(column, ColumnType::Categorical)?;
                Ok(true)
            }
        }
    }

    fn train(&self, dataset: &DatasetHandle, config: &ModelConfig) -> Result<TrainedModelHandle> {
        let params = training_params(config, &dataset.frame_id, &dataset.schema);
        let path = format!("/3/ModelBuilders/{}", config.algorithm.builder_name());
        let started = self.post_form(&path, &as_form(&params), Error::Training)?;
        let job = job_key(&started)
            .ok_or_else(|| Error::Training(server_message(200, &started.to_string())))?;
        let finished = self.wait_for_job(job, Error::Training)?;
        let model_id = finished["jobs"][0]["dest"]["name"]
            .as_str()
            .or_else(|| started["job"]["dest"]["name"].as_str())
            .ok_or_else(|| Error::Training("model build finished without a model id".into()))?;
        Ok(TrainedModelHandle {
            model_id: ModelId::new(model_id),
            config: config.clone(),
            training_frame: dataset.frame_id.clone(),
        })
    }

    fn predict(
        &self,
        model: &TrainedModelHandle,
        dataset: &DatasetHandle,
    ) -> Result<PredictionTable> {
        let destination = format!("{}_predictions", model.model_id);
        let path = format!(
            "/3/Predictions/models/{}/frames/{}",
            model.model_id, dataset.frame_id
        );
        self.post_form(&path, &[("predictions_frame", destination.as_str())], Error::Prediction)?;
        let body = self.download_frame(&destination, Error::Prediction)?;
        let text = String::from_utf8_lossy(&body);
        PredictionTable::from_csv_str(&text)
            .map_err(|e| Error::Prediction(format!("{}: {}", destination, e)))
    }

    fn download_artifact(&self, model: &TrainedModelHandle, dir: &Path) -> Result<PathBuf> {
        let body = self.get_bytes(
            &format!("/3/Models/{}/mojo", model.model_id),
            &[],
            Error::Export,
        )?;
        let path = dir.join(model.model_id.artifact_file_name());
        std::fs::write(&path, body).map_err(|e| Error::Export(format!("{}: {}", path.display(), e)))?;
        Ok(path)
    }

    fn export_frame(&self, dataset: &DatasetHandle, path: &Path) -> Result<()> {
        let body = self.download_frame(dataset.frame_id.as_str(), Error::Export)?;
        std::fs::write(path, body).map_err(|e| Error::Export(format!("{}: {}", path.display(), e)))
    }

    fn model_metrics(&self, model: &TrainedModelHandle) -> Result<ModelMetrics> {
        let body = self.get_json(
            &format!("/3/Models/{}", model.model_id),
            &[],
            Error::Training,
        )?;
        Ok(parse_metrics(&body))
    }
}
