//! Settings snapshots for reproducible check reports.
//!
//! A snapshot captures the settings in force when a check ran, so a report
//! can later be matched to the exact tolerances and scorer it used.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::resolve::{ConfigPaths, ConfigSource};
use crate::settings::HarnessSettings;

/// A frozen snapshot of settings state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the settings.
    pub schema_version: String,

    /// Path the settings were loaded from.
    #[serde(default)]
    pub settings_path: Option<String>,

    /// Source of the settings.
    pub settings_source: String,

    /// SHA-256 of the raw settings file, when one was read.
    #[serde(default)]
    pub file_hash: Option<String>,

    /// SHA-256 of the effective settings (defaults filled in).
    pub effective_hash: String,

    /// Key values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key settings values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub tolerance: f64,
    pub measure: String,
    pub missing: String,
    pub sample_probability: f64,
    pub scorer_program: String,
    pub scorer_timeout_secs: Option<u64>,
    pub backend_url: String,
}

impl ConfigSnapshot {
    /// Create a new snapshot from loaded settings.
    pub fn new(settings: &HarnessSettings, paths: &ConfigPaths, raw_json: Option<&str>) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: settings.schema_version.clone(),
            settings_path: paths.settings.as_ref().map(|p| p.display().to_string()),
            settings_source: paths.source.to_string(),
            file_hash: raw_json.map(hash_content),
            effective_hash: effective_hash(settings),
            summary: ConfigSummary::from_settings(settings),
        }
    }

    /// Create a snapshot with only defaults (no settings file loaded).
    pub fn defaults_only() -> Self {
        let settings = HarnessSettings::default();
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            settings_path: None,
            settings_source: ConfigSource::BuiltinDefault.to_string(),
            file_hash: None,
            effective_hash: effective_hash(&settings),
            summary: ConfigSummary::from_settings(&settings),
        }
    }

    /// Serialize snapshot to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if this snapshot matches another (same effective settings).
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.effective_hash == other.effective_hash
    }

    /// Get a short identifier for this snapshot (first 12 chars of hash).
    pub fn short_id(&self) -> &str {
        &self.effective_hash[..12.min(self.effective_hash.len())]
    }
}

impl ConfigSummary {
    fn from_settings(settings: &HarnessSettings) -> Self {
        let scorer_program = match &settings.scorer.command {
            Some(argv) => argv.first().cloned().unwrap_or_default(),
            None => settings.scorer.java.clone(),
        };
        ConfigSummary {
            tolerance: settings.comparison.tolerance,
            measure: settings.comparison.measure.to_string(),
            missing: settings.comparison.missing.to_string(),
            sample_probability: settings.comparison.sample_probability,
            scorer_program,
            scorer_timeout_secs: settings.scorer.timeout_secs,
            backend_url: settings.backend.url.clone(),
        }
    }
}

fn effective_hash(settings: &HarnessSettings) -> String {
    let canonical = serde_json::to_string(settings).unwrap_or_default();
    hash_content(&canonical)
}

/// Hash content with SHA-256 and return hex string.
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_snapshot() {
        let snapshot = ConfigSnapshot::defaults_only();
        assert_eq!(snapshot.schema_version, crate::CONFIG_SCHEMA_VERSION);
        assert!(snapshot.file_hash.is_none());
        assert_eq!(snapshot.settings_source, "builtin default");
        assert_eq!(snapshot.summary.measure, "hybrid");
    }

    #[test]
    fn test_snapshot_short_id() {
        let snapshot = ConfigSnapshot::defaults_only();
        assert_eq!(snapshot.short_id().len(), 12);
    }

    #[test]
    fn test_effective_hash_tracks_values() {
        let defaults = ConfigSnapshot::defaults_only();
        let mut settings = HarnessSettings::default();
        assert!(defaults.matches(&ConfigSnapshot::new(
            &settings,
            &ConfigPaths::default(),
            None
        )));

        settings.comparison.tolerance = 1e-3;
        let changed = ConfigSnapshot::new(&settings, &ConfigPaths::default(), Some("{}"));
        assert!(!defaults.matches(&changed));
        assert_eq!(changed.file_hash.as_deref().map(str::len), Some(64));
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let snapshot = ConfigSnapshot::defaults_only();
        let json = snapshot.to_json().unwrap();
        let restored = ConfigSnapshot::from_json(&json).unwrap();
        assert!(snapshot.matches(&restored));
    }
}
