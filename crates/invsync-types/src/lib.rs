//! Core data model and error handling for InvSync
//!
//! This crate provides the types shared by every other InvSync crate:
//!
//! - **Error handling**: a single error enum with severity, retryability and
//!   typed provider failure kinds
//! - **Resources**: normalized live records and their stored counterpart
//! - **Reconciliation vocabulary**: the closed set of tracked fields,
//!   conflicts, resolutions, planned actions and run records
//! - **Collaborators**: async traits for the fetch provider and the store
//!
//! # Examples
//!
//! ```rust
//! use invsync_types::{Resource, ResourceStatus, TrackedField};
//!
//! let mut live = Resource::named("vm1");
//! live.status = ResourceStatus::Running;
//! let stored = Resource::named("vm1");
//!
//! assert_ne!(
//!     TrackedField::Status.value(&live),
//!     TrackedField::Status.value(&stored)
//! );
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod raw;
pub mod resource;
pub mod result;
pub mod sync;
pub mod traits;

// Re-export commonly used types
pub use config::{RetryConfig, TimeoutConfig};
pub use error::{Error, ErrorKind, ErrorSeverity, ProviderErrorKind};
pub use raw::*;
pub use resource::*;
pub use result::Result;
pub use sync::*;
pub use traits::*;
