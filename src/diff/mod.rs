//! Unified-diff repair and validation (components B and C).

pub mod repair;
pub mod validate;

pub use repair::{try_repair_unified_diff, RepairOptions, Repaired};
pub use validate::{validate_diff, PatchLimits, ValidateOutcome};
