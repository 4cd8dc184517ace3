//! Core types and error definitions for the Overseer orchestration core.
//!
//! This crate provides the foundational types shared across all Overseer
//! crates: error handling, identifiers, the closed lifecycle enums that are
//! round-tripped through persisted documents, and atomic JSON storage.
//!
//! # Main types
//!
//! - [`OverseerError`] - Unified error enum for all Overseer subsystems.
//! - [`OverseerResult`] - Convenience alias for `Result<T, OverseerError>`.
//! - [`TaskId`] / [`AgentId`] - Identifiers for tasks and agents.
//! - [`Priority`], [`TaskStatus`], [`AgentState`] - Task and agent lifecycles.
//! - [`AutonomyLevel`], [`OperationCategory`], [`OperationRisk`] - Oversight policy vocabulary.

/// Autonomy levels and operation risk classification.
pub mod approval;
/// Error type and result alias.
pub mod error;
/// Task and agent identifiers.
pub mod ids;
/// Atomic JSON document storage.
pub mod storage;
/// Priority and lifecycle enums.
pub mod types;

pub use approval::{AutonomyLevel, OperationCategory, OperationRisk};
pub use error::{OverseerError, OverseerResult};
pub use ids::{AgentId, TaskId};
pub use types::{AgentState, Priority, TaskStatus};
