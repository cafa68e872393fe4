//! CLI tests for xc-core.
//!
//! These tests run the binary against prediction files on disk and check
//! exit codes and the JSON envelope.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a Command for the xc-core binary with settings resolution isolated
/// from the host.
fn xc_core(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("xc-core").expect("xc-core binary should exist");
    cmd.env_remove("XC_CONFIG")
        .env_remove("XC_CONFIG_DIR")
        .env_remove("XC_LOG")
        .env("XDG_CONFIG_HOME", home);
    cmd
}

fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

fn json_stdout(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

const EXPECTED: &str = "predict,p0,p1\n1,0.2,0.8\n0,0.9,0.1\n1,0.35,0.65\n";

// ============================================================================
// compare
// ============================================================================

mod compare {
    use super::*;

    #[test]
    fn identical_files_pass() {
        let dir = TempDir::new().unwrap();
        let left = write(&dir, "left.csv", EXPECTED);
        let right = write(&dir, "right.csv", EXPECTED);

        let output = xc_core(dir.path())
            .args(["compare"])
            .arg(&left)
            .arg(&right)
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(0));
        let report = json_stdout(&output);
        assert_eq!(report["command"], "compare");
        assert_eq!(report["status"], "pass");
        assert_eq!(report["results"][0]["kind"], "tables");
        assert_eq!(report["results"][0]["rows_compared"], 3);
    }

    #[test]
    fn value_drift_fails_with_location() {
        let dir = TempDir::new().unwrap();
        let left = write(&dir, "left.csv", EXPECTED);
        let right = write(&dir, "right.csv", "predict,p0,p1\n1,0.2,0.8\n0,0.9,0.1\n1,0.36,0.64\n");

        let output = xc_core(dir.path())
            .arg("compare")
            .arg(&left)
            .arg(&right)
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(1));
        let report = json_stdout(&output);
        assert_eq!(report["status"], "fail");
        let worst = &report["results"][0]["worst"];
        assert_eq!(worst["row"], 2);
        assert_eq!(worst["kind"], "value");
    }

    #[test]
    fn loose_tolerance_accepts_drift() {
        let dir = TempDir::new().unwrap();
        let left = write(&dir, "left.csv", EXPECTED);
        let right = write(&dir, "right.csv", "predict,p0,p1\n1,0.2,0.8\n0,0.9,0.1\n1,0.36,0.64\n");

        xc_core(dir.path())
            .args(["compare", "--tolerance", "0.05", "--measure", "absolute"])
            .arg(&left)
            .arg(&right)
            .assert()
            .success();
    }

    #[test]
    fn column_restriction_ignores_other_columns() {
        let dir = TempDir::new().unwrap();
        let left = write(&dir, "left.csv", EXPECTED);
        let right = write(&dir, "right.csv", "predict,p0,p1\n1,0.2,0.8\n0,0.9,0.1\n0,0.35,0.65\n");

        xc_core(dir.path())
            .args(["compare", "--columns", "p0,p1"])
            .arg(&left)
            .arg(&right)
            .assert()
            .success();
    }

    #[test]
    fn row_count_mismatch_is_failure_not_crash() {
        let dir = TempDir::new().unwrap();
        let left = write(&dir, "left.csv", EXPECTED);
        let right = write(&dir, "right.csv", "predict,p0,p1\n1,0.2,0.8\n");

        let output = xc_core(dir.path())
            .arg("compare")
            .arg(&left)
            .arg(&right)
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(1));
        let report = json_stdout(&output);
        assert_eq!(report["status"], "error");
        assert_eq!(report["error"]["category"], "comparison");
        assert_eq!(report["error"]["infrastructure"], false);
    }

    #[test]
    fn missing_file_is_data_load_error() {
        let dir = TempDir::new().unwrap();
        let left = write(&dir, "left.csv", EXPECTED);

        let output = xc_core(dir.path())
            .arg("compare")
            .arg(&left)
            .arg(dir.path().join("absent.csv"))
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(12));
        let report = json_stdout(&output);
        assert_eq!(report["error"]["category"], "data_load");
    }

    #[test]
    fn negative_tolerance_is_config_error() {
        let dir = TempDir::new().unwrap();
        let left = write(&dir, "left.csv", EXPECTED);

        xc_core(dir.path())
            .args(["compare", "--tolerance=-1"])
            .arg(&left)
            .arg(&left)
            .assert()
            .code(11);
    }

    #[test]
    fn summary_format_prints_verdict_line() {
        let dir = TempDir::new().unwrap();
        let left = write(&dir, "left.csv", EXPECTED);

        xc_core(dir.path())
            .args(["-f", "summary", "compare"])
            .arg(&left)
            .arg(&left)
            .assert()
            .success()
            .stdout(predicate::str::contains("PASS tables"));
    }

    #[test]
    fn exitcode_format_is_silent() {
        let dir = TempDir::new().unwrap();
        let left = write(&dir, "left.csv", EXPECTED);
        let right = write(&dir, "right.csv", "predict,p0,p1\n1,0.2,0.8\n0,0.9,0.1\n1,0.5,0.5\n");

        xc_core(dir.path())
            .args(["--format", "exitcode", "compare"])
            .arg(&left)
            .arg(&right)
            .assert()
            .code(1)
            .stdout(predicate::str::is_empty());
    }
}

// ============================================================================
// thresholds
// ============================================================================

mod thresholds {
    use super::*;

    const SCORES: &str = "anomaly_score,mean_length\n0.97,2.1\n0.41,6.3\n0.44,6.0\n";

    #[test]
    fn holding_predicates_pass() {
        let dir = TempDir::new().unwrap();
        let scores = write(&dir, "scores.csv", SCORES);

        let output = xc_core(dir.path())
            .arg("thresholds")
            .arg(&scores)
            .args(["--column", "anomaly_score", "--assert", "0>=0.6", "--assert", "2<=0.55"])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(0));
        let report = json_stdout(&output);
        assert_eq!(report["assertions"][0], "0>=0.6");
        assert_eq!(report["results"][0]["kind"], "thresholds");
    }

    #[test]
    fn violated_predicate_fails() {
        let dir = TempDir::new().unwrap();
        let scores = write(&dir, "scores.csv", SCORES);

        let output = xc_core(dir.path())
            .arg("thresholds")
            .arg(&scores)
            .args(["--column", "anomaly_score", "--assert", "1>=0.6"])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(1));
        let report = json_stdout(&output);
        assert_eq!(report["results"][0]["worst"]["row"], 1);
        assert_eq!(report["results"][0]["worst"]["kind"], "threshold");
    }

    #[test]
    fn malformed_predicate_is_rejected() {
        let dir = TempDir::new().unwrap();
        let scores = write(&dir, "scores.csv", SCORES);

        xc_core(dir.path())
            .arg("thresholds")
            .arg(&scores)
            .args(["--column", "anomaly_score", "--assert", "first>0.5"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }
}

// ============================================================================
// score
// ============================================================================

#[cfg(unix)]
mod score {
    use super::*;

    fn settings_with_copy_scorer(dir: &TempDir) -> PathBuf {
        let sandboxes = dir.path().join("sandboxes");
        let settings = serde_json::json!({
            "schema_version": "1.0.0",
            "scorer": {
                "command": ["sh", "-c", "cp \"$2\" \"$3\"", "sh", "{artifact}", "{input}", "{output}"],
                "timeout_secs": 30
            },
            "sandbox": { "root": sandboxes }
        });
        write(dir, "crosscheck.json", &settings.to_string())
    }

    #[test]
    fn scored_output_compared_to_expected() {
        let dir = TempDir::new().unwrap();
        let config = settings_with_copy_scorer(&dir);
        let artifact = write(&dir, "GLM_model_1.zip", "PK");
        let input = write(&dir, "in.csv", EXPECTED);
        let expected = write(&dir, "expected.csv", EXPECTED);

        let output = xc_core(dir.path())
            .arg("--config")
            .arg(&config)
            .arg("score")
            .arg("--artifact")
            .arg(&artifact)
            .arg("--input")
            .arg(&input)
            .arg("--expected")
            .arg(&expected)
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
        let report = json_stdout(&output);
        assert_eq!(report["rows"], 3);
        assert_eq!(report["status"], "pass");
        assert_eq!(report["process"]["exit_code"], 0);

        let sandboxes = dir.path().join("sandboxes");
        assert_eq!(fs::read_dir(sandboxes).unwrap().count(), 0);
    }

    #[test]
    fn failing_scorer_exit_code() {
        let dir = TempDir::new().unwrap();
        let settings = serde_json::json!({
            "scorer": {
                "command": ["sh", "-c", "exit 2", "sh", "{artifact}", "{input}", "{output}"]
            }
        });
        let config = write(&dir, "crosscheck.json", &settings.to_string());
        let artifact = write(&dir, "GLM_model_1.zip", "PK");
        let input = write(&dir, "in.csv", EXPECTED);

        let output = xc_core(dir.path())
            .arg("--config")
            .arg(&config)
            .arg("score")
            .arg("--artifact")
            .arg(&artifact)
            .arg("--input")
            .arg(&input)
            .arg("--output")
            .arg(dir.path().join("out.csv"))
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(16));
        let report = json_stdout(&output);
        assert_eq!(report["error"]["category"], "artifact_scoring");
    }
}

// ============================================================================
// config and version
// ============================================================================

mod config {
    use super::*;

    #[test]
    fn show_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let output = xc_core(dir.path()).args(["config", "show"]).output().unwrap();
        assert_eq!(output.status.code(), Some(0));
        let report = json_stdout(&output);
        assert_eq!(report["source"]["using_defaults"], true);
        assert_eq!(report["settings"]["comparison"]["measure"], "hybrid");
    }

    #[test]
    fn validate_accepts_good_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "crosscheck.json", r#"{"comparison": {"tolerance": 1e-8}}"#);
        xc_core(dir.path())
            .args(["config", "validate"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"valid\""));
    }

    #[test]
    fn validate_rejects_bad_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "crosscheck.json", r#"{"comparison": {"tolerance": -1}}"#);
        xc_core(dir.path())
            .args(["config", "validate"])
            .arg(&path)
            .assert()
            .code(11);
    }

    #[test]
    fn validate_rejects_missing_file() {
        let dir = TempDir::new().unwrap();
        xc_core(dir.path())
            .args(["config", "validate"])
            .arg(dir.path().join("nope.json"))
            .assert()
            .code(11);
    }

    #[test]
    fn path_reports_xdg_location() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("crosscheck")).unwrap();
        write(&dir, "crosscheck/crosscheck.json", "{}");
        xc_core(dir.path())
            .args(["-f", "summary", "config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("XDG config"));
    }
}

#[test]
fn version_reports_package_version() {
    let dir = TempDir::new().unwrap();
    let output = xc_core(dir.path()).arg("version").output().unwrap();
    assert!(output.status.success());
    let report = json_stdout(&output);
    assert_eq!(report["xc_core_version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn unknown_command_fails() {
    let dir = TempDir::new().unwrap();
    xc_core(dir.path())
        .arg("nonexistent-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}
