//! Crosscheck Core Library
//!
//! This library provides the model cross-validation harness:
//! - Exit codes for CLI operations
//! - The backend boundary and the explicit check session
//! - The out-of-process artifact scorer
//! - Table, scalar, threshold and rank comparators
//! - The single-model check orchestration
//!
//! The binary entry point is in `main.rs`.

pub mod backend;
pub mod compare;
pub mod exit_codes;
pub mod harness;
pub mod logging;
pub mod scorer;

pub use backend::{Backend, Session};
pub use compare::{ComparisonKind, ComparisonResult};
pub use harness::{run_check_with_reference, run_single_model_check, CheckOutcome};

// Re-export test utilities for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_log;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
