//! Live resource providers for InvSync
//!
//! A provider answers two questions, "which subscription" and "which
//! resources", and hands back raw records. This crate also owns the
//! normalizer that turns those raw records into [`invsync_types::Resource`]s.
//!
//! - [`AzureCliProvider`]: shells out to `az` with a hard timeout, killing the
//!   child on expiry and emitting heartbeats while it waits
//! - [`SnapshotProvider`]: serves a listing captured earlier, for offline runs
//! - [`normalize`]: pure raw → normalized transformation
//!
//! # Examples
//!
//! ```rust,no_run
//! use invsync_provider::{normalize_all, AzureCliProvider};
//! use invsync_types::{ResourceProvider, TimeoutConfig};
//!
//! # async fn example() -> invsync_types::Result<()> {
//! let provider = AzureCliProvider::new("az", TimeoutConfig::default());
//! let subscription = provider.get_subscription(None).await?;
//! let raw = provider.get_resources(None).await?;
//! let live = normalize_all(&raw, &subscription);
//! println!("{} live resources", live.len());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod normalize;
pub mod parse;
pub mod snapshot;

pub use cli::AzureCliProvider;
pub use normalize::{normalize, normalize_all};
pub use parse::{parse_resources, parse_snapshot, parse_subscription};
pub use snapshot::SnapshotProvider;
