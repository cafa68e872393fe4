//! Frame, model and run identity types.
//!
//! Frame and model ids are opaque strings assigned by the backend. Run ids
//! are generated locally and correlate every log line and report of one
//! invocation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Identifier of a frame resident in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub String);

impl FrameId {
    pub fn new(id: impl Into<String>) -> Self {
        FrameId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a trained model resident in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        ModelId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File stem the backend uses for this model's scoring artifact.
    pub fn mojo_name(&self) -> String {
        mojo_name(&self.0)
    }

    /// File name of the zipped scoring artifact.
    pub fn artifact_file_name(&self) -> String {
        format!("{}.zip", self.mojo_name())
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn mojo_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"[+\-* !@#$%^&()={}\[\]|;:'"<>,.?/]"#).expect("static pattern is valid")
    })
}

/// Derive the artifact file stem from a model identifier.
///
/// Every character the backend refuses in artifact names is replaced with `_`.
pub fn mojo_name(model_id: &str) -> String {
    mojo_name_pattern().replace_all(model_id, "_").into_owned()
}

/// Run ID for correlating one harness invocation.
///
/// Format: `xc-YYYYMMDD-HHMMSS-XXXX`
/// Example: `xc-20260115-143022-a7xq`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new run ID.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        let suffix = generate_base32_suffix();
        RunId(format!(
            "xc-{}-{}-{}",
            now.format("%Y%m%d"),
            now.format("%H%M%S"),
            suffix
        ))
    }

    /// Parse an existing run ID string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 23 || !s.is_ascii() {
            return None;
        }
        let bytes = s.as_bytes();
        if !s.starts_with("xc-") || bytes[11] != b'-' || bytes[18] != b'-' {
            return None;
        }
        let date = &s[3..11];
        let time = &s[12..18];
        let suffix = &s[19..23];
        if !date.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !time.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !suffix.chars().all(|c| matches!(c, 'a'..='z' | '2'..='7')) {
            return None;
        }
        Some(RunId(s.to_string()))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn generate_base32_suffix() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    let mut value = ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32);
    value &= 0x000F_FFFF;
    let alphabet = b"abcdefghijklmnopqrstuvwxyz234567";
    let mut out = String::with_capacity(4);
    for shift in [15_u32, 10, 5, 0] {
        let idx = ((value >> shift) & 0x1F) as usize;
        out.push(alphabet[idx] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_format() {
        let rid = RunId::new();
        assert!(rid.0.starts_with("xc-"));
        assert_eq!(rid.0.len(), 23);
        assert!(RunId::parse(&rid.0).is_some());
    }

    #[test]
    fn test_run_id_parse_rejects_garbage() {
        assert!(RunId::parse("pt-20260115-143022-a7xq").is_none());
        assert!(RunId::parse("xc-2026011x-143022-a7xq").is_none());
        assert!(RunId::parse("xc-20260115-143022-A7XQ").is_none());
        assert!(RunId::parse("xc-short").is_none());
        assert!(RunId::parse("xc-20260115-143022-a7xq").is_some());
    }

    #[test]
    fn test_mojo_name_replaces_reserved_characters() {
        assert_eq!(
            mojo_name("CoxPH_model_python_1658412044_1"),
            "CoxPH_model_python_1658412044_1"
        );
        assert_eq!(mojo_name("glm-model.v2"), "glm_model_v2");
        assert_eq!(mojo_name("a+b*c (d)/e?"), "a_b_c__d__e_");
        assert_eq!(mojo_name("x[1]{2}|'\"<>,;:"), "x_1__2_________");
    }

    #[test]
    fn test_artifact_file_name() {
        let id = ModelId::new("EIF model.1");
        assert_eq!(id.mojo_name(), "EIF_model_1");
        assert_eq!(id.artifact_file_name(), "EIF_model_1.zip");
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = FrameId::new("heart.hex");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"heart.hex\"");
        let back: FrameId = serde_json::from_str("\"heart.hex\"").unwrap();
        assert_eq!(back, id);
    }
}
