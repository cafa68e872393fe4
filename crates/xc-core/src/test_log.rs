//! JSONL trace of test runs.
//!
//! Entries land in `target/test-logs/xc-core-tests-<pid>.jsonl`, one object
//! per line, so a failed parity check in CI can be inspected (worst row,
//! column, magnitude) without re-running it.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::compare::ComparisonResult;

const LOG_DIR_NAME: &str = "test-logs";

fn target_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CARGO_TARGET_DIR") {
        return PathBuf::from(dir);
    }
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../target")
}

pub fn log_file_path() -> PathBuf {
    target_dir()
        .join(LOG_DIR_NAME)
        .join(format!("xc-core-tests-{}.jsonl", std::process::id()))
}

fn append_line(line: &str) {
    let path = log_file_path();
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            eprintln!("test_log: cannot create {}: {}", parent.display(), err);
            return;
        }
    }
    let written = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| writeln!(file, "{}", line));
    if let Err(err) = written {
        eprintln!("test_log: cannot write {}: {}", path.display(), err);
    }
}

/// Write one entry. Caller fields never overwrite the fixed keys; a clash
/// is stored as `extra_<key>`.
pub fn log_event(level: &str, msg: &str, file: &str, line: u32, fields: &[(&str, Value)]) {
    let mut map = Map::new();
    map.insert(
        "ts".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    map.insert("level".to_string(), Value::String(level.to_string()));
    map.insert("msg".to_string(), Value::String(msg.to_string()));
    map.insert("file".to_string(), Value::String(file.to_string()));
    map.insert("line".to_string(), Value::from(line));
    map.insert("pid".to_string(), Value::from(std::process::id()));
    let thread = std::thread::current().name().unwrap_or("unnamed").to_string();
    map.insert("thread".to_string(), Value::String(thread.clone()));

    for (key, value) in fields {
        if map.contains_key(*key) {
            map.insert(format!("extra_{}", key), value.clone());
        } else {
            map.insert((*key).to_string(), value.clone());
        }
    }
    map.entry("test").or_insert(Value::String(thread));

    match serde_json::to_string(&Value::Object(map)) {
        Ok(line) => append_line(&line),
        Err(err) => eprintln!("test_log: cannot serialize entry: {}", err),
    }
}

/// Record a comparison result with its summary and worst mismatch.
pub fn log_comparison(result: &ComparisonResult, file: &str, line: u32) {
    let level = if result.passed { "INFO" } else { "ERROR" };
    let detail = serde_json::to_value(result).unwrap_or(Value::Null);
    log_event(
        level,
        &result.summary_line(),
        file,
        line,
        &[("comparison", detail)],
    );
}

#[macro_export]
macro_rules! test_log {
    ($level:ident, $msg:expr $(, $key:ident = $val:expr )* $(,)?) => {{
        let fields = vec![
            $(
                (stringify!($key), serde_json::json!($val)),
            )*
        ];
        let msg_string = $msg.to_string();
        $crate::test_log::log_event(stringify!($level), &msg_string, file!(), line!(), &fields);
    }};
    ($($arg:tt)+) => {{
        $crate::test_log!(INFO, format!($($arg)+));
    }};
}

/// Assert that a `ComparisonResult` passed, logging it either way.
#[macro_export]
macro_rules! assert_comparison_passed {
    ($result:expr) => {{
        let result = &$result;
        $crate::test_log::log_comparison(result, file!(), line!());
        if !result.passed {
            panic!("comparison failed: {}", result.summary_line());
        }
    }};
}
