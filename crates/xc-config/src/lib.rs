//! Crosscheck harness settings loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for crosscheck.json
//! - Settings resolution (CLI → env → XDG → /etc → defaults)
//! - Semantic validation
//! - Settings snapshots recorded alongside check reports

pub mod resolve;
pub mod settings;
pub mod snapshot;
pub mod validate;

pub use resolve::{resolve_config, ConfigPaths, ConfigSource};
pub use settings::{
    BackendSettings, ColumnAlignment, ComparisonDefaults, HarnessSettings, MissingPolicy,
    SandboxSettings, ScorerSettings,
};
pub use snapshot::ConfigSnapshot;
pub use validate::{
    validate_probability, validate_settings, validate_tolerance, ValidationError, ValidationResult,
};

/// Schema version for settings files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Load settings from the resolved path, or built-in defaults when none was found.
///
/// Returns the settings, the paths they were resolved from, and the raw JSON
/// (for snapshot hashing) when a file was read.
pub fn load_settings(
    cli_path: Option<&std::path::Path>,
) -> ValidationResult<(HarnessSettings, ConfigPaths, Option<String>)> {
    let paths = resolve_config(cli_path);
    match &paths.settings {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let settings = HarnessSettings::from_str(&content)?;
            validate_settings(&settings)?;
            Ok((settings, paths, Some(content)))
        }
        None => Ok((HarnessSettings::default(), paths, None)),
    }
}
