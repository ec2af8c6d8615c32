//! Report schema versioning.
//!
//! # Version History
//!
//! | Version | Changes |
//! |---------|---------|
//! | 1 | Initial report layout |
//! | 2 | Added `degraded` to scored snapshots, `technology` to screen usage |
//!
//! # Breaking Changes (require REPORT_VERSION bump)
//!
//! - Removing fields from usage records or reports
//! - Changing field types
//! - Renaming fields without `#[serde(alias)]`
//! - Removing subsystem or power-state variants
//!
//! # Non-Breaking Changes (safe without version bump)
//!
//! - Adding new optional fields with `#[serde(default)]`
//! - Adding new subsystems
//!
//! Consumers should accept any report whose version lies between
//! `MIN_SUPPORTED_VERSION` and `REPORT_VERSION`.

/// Current report schema version. Bump when making breaking changes.
pub const REPORT_VERSION: u32 = 2;

/// Oldest report schema readers of this build still understand.
pub const MIN_SUPPORTED_VERSION: u32 = 1;

/// Returns true if a report carrying `version` can be read by this build.
pub fn is_supported(version: u32) -> bool {
    (MIN_SUPPORTED_VERSION..=REPORT_VERSION).contains(&version)
}
