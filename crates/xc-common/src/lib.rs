//! Crosscheck common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the crosscheck crates:
//! - Frame, model and run identity types
//! - Artifact naming derived from model identifiers
//! - The error taxonomy with stable codes
//! - Structured mismatch detail for failed comparisons
//! - Output format specifications

pub mod error;
pub mod id;
pub mod mismatch;
pub mod output;

pub use error::{Error, ErrorCategory, Result};
pub use id::{mojo_name, FrameId, ModelId, RunId};
pub use mismatch::{MismatchDetail, MismatchKind};
pub use output::OutputFormat;

/// Schema version for JSON reports emitted by crosscheck.
pub const SCHEMA_VERSION: &str = "1.0.0";
