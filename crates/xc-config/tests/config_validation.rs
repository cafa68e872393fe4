//! Settings validation + resolution tests against real JSON fixtures.
//!
//! Covers:
//! - Validation of valid and invalid settings files
//! - Resolution order (CLI > XC_CONFIG > XC_CONFIG_DIR > XDG)
//! - Loading with defaults when no file is found

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;
use xc_config::resolve::{resolve_config, ConfigSource, ENV_CONFIG_DIR, ENV_CONFIG_PATH};
use xc_config::validate::{validate_settings, ValidationError};
use xc_config::{load_settings, HarnessSettings, MissingPolicy};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const ENV_KEYS: [&str; 3] = [ENV_CONFIG_PATH, ENV_CONFIG_DIR, "XDG_CONFIG_HOME"];

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn load_fixture(name: &str) -> HarnessSettings {
    HarnessSettings::from_file(&fixtures_dir().join(name)).expect("read settings fixture")
}

struct EnvGuard {
    keys: Vec<String>,
    saved: Vec<Option<String>>,
}

impl EnvGuard {
    /// Save and clear the given keys; restore them on drop.
    fn new(keys: &[&str]) -> Self {
        let mut saved = Vec::with_capacity(keys.len());
        for key in keys {
            saved.push(env::var(key).ok());
            env::remove_var(key);
        }
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            saved,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (idx, key) in self.keys.iter().enumerate() {
            match self.saved.get(idx).and_then(|v| v.as_ref()) {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    f()
}

fn write_config_dir(dir: &Path) -> PathBuf {
    fs::create_dir_all(dir).expect("create config dir");
    let dest = dir.join("crosscheck.json");
    fs::copy(fixtures_dir().join("valid_settings.json"), &dest).expect("copy fixture");
    dest
}

#[test]
fn test_valid_fixture_ok() {
    let settings = load_fixture("valid_settings.json");
    validate_settings(&settings).expect("valid settings should pass validation");
    assert_eq!(settings.comparison.tolerance, 1e-10);
    assert_eq!(settings.comparison.sample_probability, 0.5);
    assert_eq!(settings.comparison.missing, MissingPolicy::Exclude);
    assert!(settings.sandbox.keep_on_failure);
    assert_eq!(settings.scorer.timeout_secs, Some(120));
    // untouched fields keep their defaults
    assert_eq!(settings.scorer.main_class, "hex.genmodel.tools.PredictCsv");
}

#[test]
fn test_rejects_negative_tolerance() {
    let settings = load_fixture("invalid_settings_bad_tolerance.json");
    let err = validate_settings(&settings).expect_err("negative tolerance should fail");
    assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "comparison.tolerance"));
}

#[test]
fn test_rejects_command_without_placeholders() {
    let settings = load_fixture("invalid_settings_bad_command.json");
    let err = validate_settings(&settings).expect_err("command missing placeholders should fail");
    assert!(matches!(err, ValidationError::SemanticError(_)));
}

#[test]
fn test_rejects_non_http_backend_url() {
    let settings = load_fixture("invalid_settings_bad_url.json");
    let err = validate_settings(&settings).expect_err("bad url should fail");
    assert!(matches!(err, ValidationError::InvalidValue { ref field, .. } if field == "backend.url"));
}

#[test]
fn test_missing_file_is_io_error() {
    let err = HarnessSettings::from_file(Path::new("/nonexistent/crosscheck.json"))
        .expect_err("missing file");
    assert!(matches!(err, ValidationError::IoError(_)));
}

#[test]
fn test_resolve_cli_over_env() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&ENV_KEYS);

        let temp = TempDir::new().expect("temp dir");
        let cli_path = write_config_dir(&temp.path().join("cli"));
        let env_path = write_config_dir(&temp.path().join("env"));
        env::set_var(ENV_CONFIG_PATH, env_path.display().to_string());

        let paths = resolve_config(Some(&cli_path));
        assert_eq!(paths.source, ConfigSource::CliArgument);
        assert_eq!(paths.settings.unwrap(), cli_path);
    });
}

#[test]
fn test_resolve_env_path_over_config_dir() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&ENV_KEYS);

        let temp = TempDir::new().expect("temp dir");
        let env_path = write_config_dir(&temp.path().join("env"));
        let dir = temp.path().join("config_dir");
        write_config_dir(&dir);
        env::set_var(ENV_CONFIG_PATH, env_path.display().to_string());
        env::set_var(ENV_CONFIG_DIR, dir.display().to_string());

        let paths = resolve_config(None);
        assert_eq!(paths.source, ConfigSource::Environment);
        assert_eq!(paths.settings.unwrap(), env_path);
    });
}

#[test]
fn test_resolve_config_dir() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&ENV_KEYS);

        let temp = TempDir::new().expect("temp dir");
        let dir = temp.path().join("config_dir");
        let expected = write_config_dir(&dir);
        env::set_var(ENV_CONFIG_DIR, dir.display().to_string());

        let paths = resolve_config(None);
        assert_eq!(paths.source, ConfigSource::Environment);
        assert_eq!(paths.settings.unwrap(), expected);
    });
}

#[test]
fn test_resolve_xdg_fallback() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&ENV_KEYS);

        let temp = TempDir::new().expect("temp dir");
        let xdg_dir = temp.path().join("xdg");
        let expected = write_config_dir(&xdg_dir.join("crosscheck"));
        env::set_var("XDG_CONFIG_HOME", xdg_dir.display().to_string());

        let paths = resolve_config(None);
        assert_eq!(paths.source, ConfigSource::XdgConfig);
        assert_eq!(paths.settings.unwrap(), expected);
    });
}

#[test]
fn test_load_settings_validates_resolved_file() {
    with_env_lock(|| {
        let _guard = EnvGuard::new(&ENV_KEYS);

        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("bad.json");
        fs::copy(
            fixtures_dir().join("invalid_settings_bad_tolerance.json"),
            &path,
        )
        .expect("copy fixture");

        let err = load_settings(Some(&path)).expect_err("invalid file should not load");
        assert!(matches!(err, ValidationError::InvalidValue { .. }));

        let good = write_config_dir(&temp.path().join("good"));
        let (settings, paths, raw) = load_settings(Some(&good)).expect("valid file loads");
        assert_eq!(paths.source, ConfigSource::CliArgument);
        assert_eq!(settings.comparison.seed, 42);
        assert!(raw.is_some());
    });
}
