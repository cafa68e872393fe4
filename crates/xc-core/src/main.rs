//! Crosscheck Core - model cross-validation harness
//!
//! The main entry point for xc-core, handling:
//! - Row-wise comparison of two prediction files
//! - Out-of-process scoring of an exported artifact
//! - Threshold smoke assertions on a prediction column
//! - Full single-model checks against a live backend (feature `rest`)
//! - Settings inspection and validation

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use xc_common::error::{format_error_human, StructuredError};
use xc_common::{Error, OutputFormat, SCHEMA_VERSION};
use xc_config::{
    load_settings, resolve_config, validate_probability, validate_tolerance, ColumnAlignment,
    ComparisonDefaults, ConfigSnapshot, HarnessSettings, MissingPolicy, ValidationError,
};
use xc_core::compare::{compare_tables, evaluate_thresholds, CompareOptions, ThresholdAssertion};
use xc_core::exit_codes::ExitCode;
use xc_core::harness::Sandbox;
use xc_core::logging::{
    event_names, generate_run_id, get_host_id, init_logging, LogConfig, LogContext, LogFormat,
    LogLevel, Stage,
};
use xc_core::scorer::PredictCsvScorer;
use xc_core::{log_event, ComparisonResult};
use xc_frame::PredictionTable;
use xc_math::DiffMeasure;

/// Crosscheck Core - verify that exported models score like the backend that trained them
#[derive(Parser)]
#[command(name = "xc-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to crosscheck.json
    #[arg(long, global = true, env = "XC_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr (human or json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two prediction files row by row
    Compare(CompareArgs),

    /// Score an exported artifact with the standalone scorer
    Score(ScoreArgs),

    /// Check per-row threshold predicates on one prediction column
    Thresholds(ThresholdsArgs),

    /// Run check plans against a live backend
    #[cfg(feature = "rest")]
    Check(CheckArgs),

    /// Settings management
    Config(ConfigArgs),

    /// Print version information
    Version,
}

// ============================================================================
// Command argument structs
// ============================================================================

/// Overrides for the comparison defaults in crosscheck.json
#[derive(Args, Debug, Default)]
struct ComparisonArgs {
    /// Largest allowed discrepancy
    #[arg(long)]
    tolerance: Option<f64>,

    /// Difference measure: absolute, relative or hybrid
    #[arg(long)]
    measure: Option<DiffMeasure>,

    /// Missing-value policy: exclude or require_matching_pattern
    #[arg(long)]
    missing: Option<MissingPolicy>,

    /// Column pairing: by_position or by_name
    #[arg(long)]
    align: Option<ColumnAlignment>,

    /// Compare each row with this probability
    #[arg(long)]
    sample_probability: Option<f64>,

    /// Seed for row sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Only compare these columns (comma separated)
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,
}

impl ComparisonArgs {
    fn options(&self, defaults: &ComparisonDefaults) -> Result<CompareOptions, ValidationError> {
        let mut options = CompareOptions::from_defaults(defaults);
        if let Some(tolerance) = self.tolerance {
            validate_tolerance("--tolerance", tolerance)?;
            options.tolerance = tolerance;
        }
        if let Some(p) = self.sample_probability {
            validate_probability("--sample-probability", p)?;
            options.sample_probability = p;
        }
        if let Some(measure) = self.measure {
            options.measure = measure;
        }
        if let Some(missing) = self.missing {
            options.missing = missing;
        }
        if let Some(align) = self.align {
            options.align = align;
        }
        if let Some(seed) = self.seed {
            options.seed = seed;
        }
        if !self.columns.is_empty() {
            options.columns = Some(self.columns.clone());
        }
        Ok(options)
    }
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Expected predictions (CSV with header)
    left: PathBuf,

    /// Actual predictions (CSV with header)
    right: PathBuf,

    #[command(flatten)]
    comparison: ComparisonArgs,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// Exported artifact (zip)
    #[arg(long)]
    artifact: PathBuf,

    /// Dataset to score (CSV with header)
    #[arg(long)]
    input: PathBuf,

    /// Where the scorer writes predictions (a temporary sandbox when omitted)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Predictions to compare the scorer output against
    #[arg(long)]
    expected: Option<PathBuf>,

    #[command(flatten)]
    comparison: ComparisonArgs,
}

#[derive(Args, Debug)]
struct ThresholdsArgs {
    /// Prediction file (CSV with header)
    predictions: PathBuf,

    /// Column the predicates apply to
    #[arg(long)]
    column: String,

    /// Predicate as <row><op><value>, e.g. 0>=0.6 (repeatable)
    #[arg(long = "assert", required = true)]
    assertions: Vec<ThresholdAssertion>,
}

#[cfg(feature = "rest")]
#[derive(Args, Debug)]
struct CheckArgs {
    /// Plan file (one check or an array of checks)
    plan: PathBuf,

    /// Backend URL (overrides crosscheck.json)
    #[arg(long, env = "XC_BACKEND_URL")]
    backend_url: Option<String>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective settings
    Show,

    /// Validate a settings file
    Validate {
        /// Path to crosscheck.json (defaults to the resolved one)
        path: Option<PathBuf>,
    },

    /// Show where settings are resolved from
    Path,
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(
        LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet),
        cli.global.log_format,
    );
    init_logging(&log_config);

    let exit_code = match cli.command {
        None => {
            print_version(&cli.global);
            ExitCode::Pass
        }
        Some(Commands::Compare(args)) => run_compare(&cli.global, &args),
        Some(Commands::Score(args)) => run_score(&cli.global, &args),
        Some(Commands::Thresholds(args)) => run_thresholds(&cli.global, &args),
        #[cfg(feature = "rest")]
        Some(Commands::Check(args)) => run_check(&cli.global, &args),
        Some(Commands::Config(args)) => run_config(&cli.global, &args),
        Some(Commands::Version) => {
            print_version(&cli.global);
            ExitCode::Pass
        }
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Shared helpers
// ============================================================================

fn log_context() -> LogContext {
    LogContext::new(generate_run_id(), get_host_id())
}

fn use_color(global: &GlobalOpts) -> bool {
    !global.no_color && std::io::stderr().is_terminal()
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("xc-core: cannot render report: {}", e),
    }
}

fn load(global: &GlobalOpts, log: &LogContext) -> Result<HarnessSettings, ExitCode> {
    match load_settings(global.config.as_deref()) {
        Ok((settings, paths, _)) => {
            match &paths.settings {
                Some(path) => log_event!(
                    log,
                    DEBUG,
                    event_names::CONFIG_LOADED,
                    Stage::Init,
                    "settings loaded",
                    path = tracing::field::display(path.display())
                ),
                None => log_event!(
                    log,
                    DEBUG,
                    event_names::CONFIG_DEFAULT_USED,
                    Stage::Init,
                    "no settings file, using defaults"
                ),
            }
            Ok(settings)
        }
        Err(e) => Err(output_config_error(global, log, &e)),
    }
}

/// Report an error that stopped the command before a verdict.
fn output_error(global: &GlobalOpts, log: &LogContext, command: &str, err: &Error) -> ExitCode {
    let structured = StructuredError::from(err);
    match global.format {
        OutputFormat::Json => {
            let value = serde_json::to_value(&structured).unwrap_or(Value::Null);
            print_json(&json!({
                "schema_version": SCHEMA_VERSION,
                "run_id": log.run_id,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "command": command,
                "status": "error",
                "error": value,
            }));
        }
        OutputFormat::Summary => {
            eprintln!("{}", format_error_human(err, use_color(global)));
        }
        OutputFormat::Exitcode => {}
    }
    ExitCode::for_error(err)
}

fn output_config_error(global: &GlobalOpts, log: &LogContext, error: &ValidationError) -> ExitCode {
    log_event!(
        log,
        ERROR,
        event_names::CONFIG_ERROR,
        Stage::Init,
        error.to_string(),
        code = error.code()
    );
    match global.format {
        OutputFormat::Json => {
            print_json(&json!({
                "schema_version": SCHEMA_VERSION,
                "run_id": log.run_id,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "status": "error",
                "error": {
                    "code": error.code(),
                    "message": error.to_string(),
                }
            }));
        }
        OutputFormat::Summary => {
            eprintln!("[{}] config error: {}", log.run_id, error);
        }
        OutputFormat::Exitcode => {}
    }
    ExitCode::ConfigError
}

/// Print comparison results and pick the exit code.
fn output_results(
    global: &GlobalOpts,
    log: &LogContext,
    command: &str,
    results: &[ComparisonResult],
    extra: Value,
) -> ExitCode {
    let passed = results.iter().all(|r| r.passed);
    match global.format {
        OutputFormat::Json => {
            let mut report = json!({
                "schema_version": SCHEMA_VERSION,
                "run_id": log.run_id,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "command": command,
                "status": if passed { "pass" } else { "fail" },
                "results": results,
            });
            if let (Some(report), Value::Object(extra)) = (report.as_object_mut(), extra) {
                report.extend(extra);
            }
            print_json(&report);
        }
        OutputFormat::Summary => {
            for result in results {
                println!("[{}] {}", log.run_id, result.summary_line());
            }
        }
        OutputFormat::Exitcode => {}
    }
    if passed {
        ExitCode::Pass
    } else {
        ExitCode::ComparisonFailed
    }
}

fn read_predictions(path: &Path) -> Result<PredictionTable, Error> {
    PredictionTable::read(path).map_err(|e| Error::DataLoad(format!("{}: {}", path.display(), e)))
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_compare(global: &GlobalOpts, args: &CompareArgs) -> ExitCode {
    let log = log_context();
    let settings = match load(global, &log) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let options = match args.comparison.options(&settings.comparison) {
        Ok(o) => o,
        Err(e) => return output_config_error(global, &log, &e),
    };

    let outcome = read_predictions(&args.left).and_then(|left| {
        let right = read_predictions(&args.right)?;
        compare_tables(&left, &right, &options)
    });
    match outcome {
        Ok(result) => output_results(
            global,
            &log,
            "compare",
            &[result],
            json!({
                "left": args.left.display().to_string(),
                "right": args.right.display().to_string(),
            }),
        ),
        Err(e) => output_error(global, &log, "compare", &e),
    }
}

fn run_score(global: &GlobalOpts, args: &ScoreArgs) -> ExitCode {
    let log = log_context();
    let settings = match load(global, &log) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let options = match args.comparison.options(&settings.comparison) {
        Ok(o) => o,
        Err(e) => return output_config_error(global, &log, &e),
    };

    // the sandbox must outlive the scorer run when no output path is given
    let sandbox = match &args.output {
        Some(_) => None,
        None => match Sandbox::create(&settings.sandbox) {
            Ok(s) => Some(s),
            Err(e) => return output_error(global, &log, "score", &e),
        },
    };
    let output = match (&args.output, &sandbox) {
        (Some(path), _) => path.clone(),
        (None, Some(sandbox)) => sandbox.join("out_mojo.csv"),
        (None, None) => PathBuf::from("out_mojo.csv"),
    };

    let scorer = PredictCsvScorer::new(settings.scorer.clone());
    log_event!(
        log,
        INFO,
        event_names::SCORE_STARTED,
        Stage::Score,
        "scoring artifact",
        artifact = tracing::field::display(args.artifact.display())
    );
    let run = match scorer.run(&args.artifact, &args.input, &output) {
        Ok(run) => run,
        Err(e) => return output_error(global, &log, "score", &e),
    };
    log_event!(
        log,
        INFO,
        event_names::SCORE_FINISHED,
        Stage::Score,
        "artifact scored",
        rows = run.predictions.nrows()
    );

    let mut results = Vec::new();
    if let Some(expected) = &args.expected {
        let compared = read_predictions(expected)
            .and_then(|table| compare_tables(&table, &run.predictions, &options));
        match compared {
            Ok(result) => results.push(result),
            Err(e) => return output_error(global, &log, "score", &e),
        }
    }

    let code = output_results(
        global,
        &log,
        "score",
        &results,
        json!({
            "artifact": args.artifact.display().to_string(),
            "rows": run.predictions.nrows(),
            "columns": run.predictions.names(),
            "output": args.output.as_ref().map(|p| p.display().to_string()),
            "process": run.process,
        }),
    );
    if let Some(sandbox) = sandbox {
        if let Some(kept) = sandbox.finish(code.is_success()) {
            log_event!(
                log,
                WARN,
                event_names::SANDBOX_KEPT,
                Stage::Score,
                "sandbox kept for inspection",
                path = tracing::field::display(kept.display())
            );
        }
    }
    code
}

fn run_thresholds(global: &GlobalOpts, args: &ThresholdsArgs) -> ExitCode {
    let log = log_context();
    let outcome = read_predictions(&args.predictions)
        .and_then(|table| evaluate_thresholds(&table, &args.column, &args.assertions));
    match outcome {
        Ok(result) => output_results(
            global,
            &log,
            "thresholds",
            &[result],
            json!({
                "predictions": args.predictions.display().to_string(),
                "column": args.column,
                "assertions": args.assertions.iter().map(|a| a.to_string()).collect::<Vec<_>>(),
            }),
        ),
        Err(e) => output_error(global, &log, "thresholds", &e),
    }
}

#[cfg(feature = "rest")]
fn run_check(global: &GlobalOpts, args: &CheckArgs) -> ExitCode {
    use xc_core::backend::{RestBackend, Session};
    use xc_core::harness::{run_single_model_check, CheckPlan};

    let log = log_context();
    let mut settings = match load(global, &log) {
        Ok(s) => s,
        Err(code) => return code,
    };
    if let Some(url) = &args.backend_url {
        settings.backend.url = url.clone();
    }
    let plans = match CheckPlan::load_all(&args.plan) {
        Ok(plans) => plans,
        Err(e) => return output_error(global, &log, "check", &e),
    };

    let backend = RestBackend::new(&settings.backend);
    let session = Session::new(Box::new(backend), settings).with_log_context(log.clone());

    let mut exit = ExitCode::Pass;
    let mut reports = Vec::with_capacity(plans.len());
    for plan in &plans {
        match run_single_model_check(&session, &plan.dataset, &plan.model, &plan.policy) {
            Ok(outcome) => {
                if !outcome.passed() && exit == ExitCode::Pass {
                    exit = ExitCode::ComparisonFailed;
                }
                if global.format == OutputFormat::Summary {
                    for result in &outcome.results {
                        println!("[{}] {}: {}", log.run_id, plan.name, result.summary_line());
                    }
                }
                reports.push(json!({"name": plan.name, "status": if outcome.passed() { "pass" } else { "fail" }, "outcome": outcome}));
            }
            Err(e) => {
                // infrastructure failures outrank comparison failures
                if !exit.is_error() {
                    exit = ExitCode::for_error(&e);
                }
                if global.format == OutputFormat::Summary {
                    eprintln!("{}: {}", plan.name, format_error_human(&e, use_color(global)));
                }
                let error = serde_json::to_value(StructuredError::from(&e)).unwrap_or(Value::Null);
                reports.push(json!({"name": plan.name, "status": "error", "error": error}));
            }
        }
    }

    if global.format == OutputFormat::Json {
        print_json(&json!({
            "schema_version": SCHEMA_VERSION,
            "run_id": log.run_id,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "command": "check",
            "exit_code": exit.code_name(),
            "checks": reports,
        }));
    }
    exit
}

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> ExitCode {
    match &args.command {
        ConfigCommands::Show => run_config_show(global),
        ConfigCommands::Validate { path } => {
            run_config_validate(global, path.as_deref().or(global.config.as_deref()))
        }
        ConfigCommands::Path => run_config_path(global),
    }
}

/// Display the effective settings (defaults when no file is present).
fn run_config_show(global: &GlobalOpts) -> ExitCode {
    let log = log_context();
    let (settings, paths, raw) = match load_settings(global.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => return output_config_error(global, &log, &e),
    };
    let snapshot = ConfigSnapshot::new(&settings, &paths, raw.as_deref());

    match global.format {
        OutputFormat::Json => print_json(&json!({
            "schema_version": SCHEMA_VERSION,
            "run_id": log.run_id,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "source": {
                "path": snapshot.settings_path,
                "kind": snapshot.settings_source,
                "hash": snapshot.file_hash,
                "effective_hash": snapshot.effective_hash,
                "using_defaults": paths.settings.is_none(),
            },
            "settings": settings,
        })),
        OutputFormat::Summary => {
            let source = paths
                .settings
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "built-in defaults".to_string());
            println!(
                "[{}] config: {} (snapshot {}) tolerance={} measure={} missing={}",
                log.run_id,
                source,
                snapshot.short_id(),
                settings.comparison.tolerance,
                settings.comparison.measure,
                settings.comparison.missing
            );
        }
        OutputFormat::Exitcode => {}
    }
    ExitCode::Pass
}

/// Validate one settings file.
fn run_config_validate(global: &GlobalOpts, path: Option<&Path>) -> ExitCode {
    let log = log_context();
    if let Some(path) = path.filter(|p| !p.exists()) {
        let error = ValidationError::IoError(format!("{} does not exist", path.display()));
        return output_config_error(global, &log, &error);
    }
    match load_settings(path) {
        Ok((_, paths, _)) => {
            let response = json!({
                "schema_version": SCHEMA_VERSION,
                "run_id": log.run_id,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "status": "valid",
                "path": paths.settings.as_ref().map(|p| p.display().to_string()),
                "using_defaults": paths.settings.is_none(),
            });
            match global.format {
                OutputFormat::Json => print_json(&response),
                OutputFormat::Summary => println!("[{}] config validate: OK", log.run_id),
                OutputFormat::Exitcode => {}
            }
            ExitCode::Pass
        }
        Err(e) => output_config_error(global, &log, &e),
    }
}

fn run_config_path(global: &GlobalOpts) -> ExitCode {
    let paths = resolve_config(global.config.as_deref());
    match global.format {
        OutputFormat::Json => print_json(&json!({
            "schema_version": SCHEMA_VERSION,
            "path": paths.settings.as_ref().map(|p| p.display().to_string()),
            "source": paths.source.to_string(),
        })),
        OutputFormat::Summary => match &paths.settings {
            Some(path) => println!("{} ({})", path.display(), paths.source),
            None => println!("built-in defaults"),
        },
        OutputFormat::Exitcode => {}
    }
    ExitCode::Pass
}

fn print_version(global: &GlobalOpts) {
    let version_info = json!({
        "schema_version": SCHEMA_VERSION,
        "xc_core_version": env!("CARGO_PKG_VERSION"),
        "rust_version": env!("CARGO_PKG_RUST_VERSION"),
        "rest_backend": cfg!(feature = "rest"),
    });

    match global.format {
        OutputFormat::Json => print_json(&version_info),
        OutputFormat::Exitcode => {}
        OutputFormat::Summary => {
            println!("xc-core {}", env!("CARGO_PKG_VERSION"));
            println!("schema version: {}", SCHEMA_VERSION);
        }
    }
}
