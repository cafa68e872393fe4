//! Settings validation errors and semantic validation.

use thiserror::Error;

use crate::settings::{HarnessSettings, ScorerSettings};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Settings validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 12,
            ValidationError::ParseError(_) => 13,
            ValidationError::SemanticError(_) => 14,
            ValidationError::InvalidValue { .. } => 15,
            ValidationError::VersionMismatch { .. } => 16,
        }
    }
}

/// Placeholders an argv override must reference.
pub const SCORER_PLACEHOLDERS: [&str; 3] = ["{input}", "{output}", "{artifact}"];

/// Validate settings semantically.
pub fn validate_settings(settings: &HarnessSettings) -> ValidationResult<()> {
    if settings.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: settings.schema_version.clone(),
        });
    }

    validate_tolerance("comparison.tolerance", settings.comparison.tolerance)?;
    validate_probability(
        "comparison.sample_probability",
        settings.comparison.sample_probability,
    )?;

    validate_scorer(&settings.scorer)?;

    if let Some(root) = &settings.sandbox.root {
        if root.as_os_str().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "sandbox.root".to_string(),
                message: "Must not be empty; omit it to use the system temp dir".to_string(),
            });
        }
    }

    let url = &settings.backend.url;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ValidationError::InvalidValue {
            field: "backend.url".to_string(),
            message: format!("Must be an http(s) URL, got '{}'", url),
        });
    }
    if settings.backend.request_timeout_secs == 0 {
        return Err(ValidationError::InvalidValue {
            field: "backend.request_timeout_secs".to_string(),
            message: "Must be positive".to_string(),
        });
    }

    Ok(())
}

/// A tolerance must be finite and non-negative.
pub fn validate_tolerance(field: &str, tolerance: f64) -> ValidationResult<()> {
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be finite and >= 0, got {}", tolerance),
        });
    }
    Ok(())
}

/// A sampling probability must be in (0, 1].
pub fn validate_probability(field: &str, p: f64) -> ValidationResult<()> {
    if !(p > 0.0 && p <= 1.0) {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be in (0, 1], got {}", p),
        });
    }
    Ok(())
}

fn validate_scorer(scorer: &ScorerSettings) -> ValidationResult<()> {
    match &scorer.command {
        Some(argv) => {
            if argv.is_empty() || argv[0].trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: "scorer.command".to_string(),
                    message: "Must name a program".to_string(),
                });
            }
            for placeholder in SCORER_PLACEHOLDERS {
                if !argv.iter().any(|arg| arg.contains(placeholder)) {
                    return Err(ValidationError::SemanticError(format!(
                        "scorer.command must reference {}",
                        placeholder
                    )));
                }
            }
        }
        None => {
            if scorer.java.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: "scorer.java".to_string(),
                    message: "Must not be empty".to_string(),
                });
            }
            if scorer.main_class.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: "scorer.main_class".to_string(),
                    message: "Must not be empty".to_string(),
                });
            }
        }
    }

    if scorer.timeout_secs == Some(0) {
        return Err(ValidationError::InvalidValue {
            field: "scorer.timeout_secs".to_string(),
            message: "Must be positive, or null for no timeout".to_string(),
        });
    }
    if scorer.max_output_bytes == 0 {
        return Err(ValidationError::InvalidValue {
            field: "scorer.max_output_bytes".to_string(),
            message: "Must be positive".to_string(),
        });
    }

    Ok(())
}
