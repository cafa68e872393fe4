//! Out-of-process scoring of an exported artifact.
//!
//! The standalone scorer reads the exported dataset, scores every row with the
//! artifact and writes a prediction CSV. Failures to launch or finish are
//! `ArtifactScoring` errors; output that cannot be parsed is
//! `MalformedScorerOutput`, so the two are distinguishable in reports.

pub mod process;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};
use xc_common::{Error, Result};
use xc_config::ScorerSettings;
use xc_frame::PredictionTable;

pub use process::{run_process, ProcessError, ProcessOutput, ProcessSpec};

/// Lines of scorer stderr quoted in error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Something that can score an exported dataset with an exported artifact.
pub trait ArtifactScorer {
    /// Score `input` with `artifact`, writing `output`, and return the parsed
    /// predictions.
    fn score(&self, artifact: &Path, input: &Path, output: &Path) -> Result<PredictionTable>;
}

impl<F> ArtifactScorer for F
where
    F: Fn(&Path, &Path, &Path) -> Result<PredictionTable>,
{
    fn score(&self, artifact: &Path, input: &Path, output: &Path) -> Result<PredictionTable> {
        self(artifact, input, output)
    }
}

/// Result of one scorer run.
#[derive(Debug)]
pub struct ScorerRun {
    pub process: ProcessOutput,
    pub predictions: PredictionTable,
}

/// Runs `PredictCsv` (or a configured replacement) as a child process.
#[derive(Debug, Clone)]
pub struct PredictCsvScorer {
    settings: ScorerSettings,
}

impl PredictCsvScorer {
    pub fn new(settings: ScorerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ScorerSettings {
        &self.settings
    }

    /// Program and arguments for one run, placeholders substituted.
    pub fn command_line(&self, artifact: &Path, input: &Path, output: &Path) -> (String, Vec<String>) {
        let substitute = |arg: &str| {
            arg.replace("{input}", &input.to_string_lossy())
                .replace("{output}", &output.to_string_lossy())
                .replace("{artifact}", &artifact.to_string_lossy())
        };

        if let Some(argv) = &self.settings.command {
            let mut argv = argv.iter().map(|a| substitute(a));
            let program = argv.next().unwrap_or_default();
            return (program, argv.collect());
        }

        let mut args = vec![
            "-ea".to_string(),
            "-cp".to_string(),
            self.settings.genmodel_jar.to_string_lossy().to_string(),
        ];
        args.extend(self.settings.java_options.iter().cloned());
        args.push(self.settings.main_class.clone());
        args.extend([
            "--input".to_string(),
            input.to_string_lossy().to_string(),
            "--output".to_string(),
            output.to_string_lossy().to_string(),
            "--mojo".to_string(),
            artifact.to_string_lossy().to_string(),
        ]);
        if self.settings.decimal {
            args.push("--decimal".to_string());
        }
        (self.settings.java.clone(), args)
    }

    fn spec(&self, artifact: &Path, input: &Path, output: &Path) -> ProcessSpec {
        let (program, args) = self.command_line(artifact, input, output);
        let mut spec = ProcessSpec::new(program, args)
            .with_timeout(self.settings.timeout_secs.map(Duration::from_secs))
            .with_max_output(self.settings.max_output_bytes);
        if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
            spec = spec.in_dir(dir);
        }
        spec
    }

    /// Run the scorer and parse its output.
    pub fn run(&self, artifact: &Path, input: &Path, output: &Path) -> Result<ScorerRun> {
        let artifact = absolute(artifact)?;
        let input = absolute(input)?;
        let output = absolute(output)?;

        if !artifact.is_file() {
            return Err(Error::ArtifactScoring(format!(
                "artifact not found: {}",
                artifact.display()
            )));
        }

        let spec = self.spec(&artifact, &input, &output);
        info!(command = %spec.display_line(), "running artifact scorer");

        let process = run_process(&spec).map_err(|e| {
            Error::ArtifactScoring(format!("could not run '{}': {}", spec.command, e))
        })?;

        if process.timed_out {
            return Err(Error::ArtifactScoring(format!(
                "scorer timed out after {}s: {}",
                self.settings.timeout_secs.unwrap_or_default(),
                process.stderr_tail(STDERR_TAIL_LINES)
            )));
        }
        if !process.success() {
            let status = process
                .exit_code
                .map_or_else(|| "killed by signal".to_string(), |c| format!("exit status {}", c));
            return Err(Error::ArtifactScoring(format!(
                "{}: {}",
                status,
                process.stderr_tail(STDERR_TAIL_LINES)
            )));
        }

        let predictions = read_scorer_output(&output)?;
        debug!(
            rows = predictions.nrows(),
            columns = predictions.ncols(),
            duration_ms = process.duration.as_millis() as u64,
            "artifact scorer finished"
        );
        Ok(ScorerRun {
            process,
            predictions,
        })
    }
}

impl ArtifactScorer for PredictCsvScorer {
    fn score(&self, artifact: &Path, input: &Path, output: &Path) -> Result<PredictionTable> {
        self.run(artifact, input, output).map(|run| run.predictions)
    }
}

/// Parse a scorer output file, classifying failures.
pub fn read_scorer_output(output: &Path) -> Result<PredictionTable> {
    let bytes = match std::fs::read(output) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ArtifactScoring(format!(
                "scorer exited cleanly but wrote no output at {}",
                output.display()
            )));
        }
        Err(e) => return Err(Error::Io(e)),
    };
    let text = String::from_utf8(bytes).map_err(|e| {
        Error::MalformedScorerOutput(format!("{}: not valid UTF-8: {}", output.display(), e))
    })?;
    if text.trim().is_empty() {
        return Err(Error::ArtifactScoring(format!(
            "scorer output is empty: {}",
            output.display()
        )));
    }
    PredictionTable::from_csv_str(&text)
        .map_err(|e| Error::MalformedScorerOutput(format!("{}: {}", output.display(), e)))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_command_line() {
        let scorer = PredictCsvScorer::new(ScorerSettings::default());
        let (program, args) = scorer.command_line(
            Path::new("/s/GLM_model_1.zip"),
            Path::new("/s/in.csv"),
            Path::new("/s/out_mojo.csv"),
        );
        assert_eq!(program, "java");
        assert_eq!(
            args,
            vec![
                "-ea",
                "-cp",
                "h2o-genmodel.jar",
                "-Xmx12g",
                "-XX:ReservedCodeCacheSize=256m",
                "hex.genmodel.tools.PredictCsv",
                "--input",
                "/s/in.csv",
                "--output",
                "/s/out_mojo.csv",
                "--mojo",
                "/s/GLM_model_1.zip",
                "--decimal",
            ]
        );
    }

    #[test]
    fn test_command_override_substitutes_placeholders() {
        let settings = ScorerSettings {
            command: Some(vec![
                "score-mojo".to_string(),
                "--model={artifact}".to_string(),
                "{input}".to_string(),
                "{output}".to_string(),
            ]),
            ..ScorerSettings::default()
        };
        let (program, args) = PredictCsvScorer::new(settings).command_line(
            Path::new("/a.zip"),
            Path::new("/in.csv"),
            Path::new("/out.csv"),
        );
        assert_eq!(program, "score-mojo");
        assert_eq!(args, vec!["--model=/a.zip", "/in.csv", "/out.csv"]);
    }

    #[test]
    fn test_output_classification() {
        let dir = TempDir::new().unwrap();

        let missing = read_scorer_output(&dir.path().join("none.csv")).unwrap_err();
        assert!(matches!(missing, Error::ArtifactScoring(_)));

        let empty = dir.path().join("empty.csv");
        std::fs::write(&empty, "\n").unwrap();
        assert!(matches!(
            read_scorer_output(&empty).unwrap_err(),
            Error::ArtifactScoring(_)
        ));

        let ragged = dir.path().join("ragged.csv");
        std::fs::write(&ragged, "predict,p0\n1,0.2,0.8\n").unwrap();
        assert!(matches!(
            read_scorer_output(&ragged).unwrap_err(),
            Error::MalformedScorerOutput(_)
        ));
    }

    #[test]
    fn test_non_utf8_output_is_malformed() {
        let dir = TempDir::new().unwrap();
        let garbled = dir.path().join("out_mojo.csv");
        std::fs::write(&garbled, b"predict,p1\n\xff\xfe,0.5\n").unwrap();

        let err = read_scorer_output(&garbled).unwrap_err();
        assert!(matches!(err, Error::MalformedScorerOutput(ref m) if m.contains("UTF-8")));
        assert_eq!(err.category(), xc_common::ErrorCategory::ArtifactScoring);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let err = PredictCsvScorer::new(ScorerSettings::default())
            .run(
                &dir.path().join("model.zip"),
                &dir.path().join("in.csv"),
                &dir.path().join("out.csv"),
            )
            .unwrap_err();
        assert!(matches!(err, Error::ArtifactScoring(ref m) if m.contains("artifact not found")));
    }
}
