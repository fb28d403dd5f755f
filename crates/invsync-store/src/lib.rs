//! Resource stores for InvSync
//!
//! Implementations of [`invsync_types::ResourceStore`]:
//!
//! - [`MemoryStore`]: process memory, for tests and dry runs
//! - [`JsonFileStore`]: `resources.json` + `sync-history.json` in a directory,
//!   each rewritten atomically
//!
//! Both key records by resource name, validate records on upsert and refuse
//! to serve anything before `connect()`.
//!
//! # Examples
//!
//! ```rust
//! use invsync_store::{query_resources, MemoryStore, ResourceQuery};
//! use invsync_types::ResourceStore;
//!
//! # async fn example() -> invsync_types::Result<()> {
//! let store = MemoryStore::new();
//! store.connect().await?;
//! let page = query_resources(&store, &ResourceQuery::new().paginate(0, 20)).await?;
//! assert_eq!(page.total, 0);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod json_file;
pub mod memory;
pub mod query;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use query::{query_resources, store_stats, Page, ResourceQuery, StoreStats};
