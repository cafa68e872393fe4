//! Core math modules.

pub mod deviance;
pub mod diff;
pub mod rank;
pub mod summary;
