//! Crosscheck math utilities.

pub mod math;

pub use math::deviance;
pub use math::diff::*;
pub use math::rank::*;
pub use math::summary::*;
