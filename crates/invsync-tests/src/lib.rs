//! InvSync Integration Testing Suite
//!
//! Shared fixtures and test doubles for the end-to-end tests and the planner
//! benchmarks. Nothing here is used by the shipped binaries.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Scripted collaborators: a provider replaying canned listings and a store
/// that fails on demand
pub mod doubles;

/// Resource fixtures and generators
///
/// Common builders used across all test files so every scenario starts from
/// records a real store accepts.
pub mod test_utils;
