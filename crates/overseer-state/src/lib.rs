//! Versioned state snapshots for the Overseer orchestration core.
//!
//! Captures every JSON document under the workspace state directory into a
//! `major.minor.patch` versioned snapshot with a content hash, and restores,
//! diffs, validates and prunes those snapshots.
//!
//! # Main types
//!
//! - [`StateManager`] - Snapshot, restore, diff, validate and prune.
//! - [`Version`] / [`Increment`] - Semantic state versions.
//! - [`VersionEntry`] - One recorded snapshot.
//! - [`StateValidation`] / [`VersionDiff`] - Read-only reports.

/// Recursive JSON file collection, hashing and copying.
pub mod files;
/// The persisted version index.
pub mod index;
/// Snapshot lifecycle.
pub mod manager;
/// Diff and validation reports.
pub mod report;
/// Semantic versions.
pub mod version;

pub use index::{VersionEntry, VersionIndex};
pub use manager::StateManager;
pub use report::{IssueKind, StateValidation, ValidationIssue, VersionDiff};
pub use version::{Increment, Version};
