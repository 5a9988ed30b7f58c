//! Resource cache for loaded model artifacts.
//!
//! Pipeline loader nodes are re-invoked on every graph execution. This module
//! makes those repeated invocations cheap: artifacts stay in memory until
//! capacity pressure evicts them or their file changes on disk.

#[allow(clippy::module_inception)]
pub mod cache;
pub mod config;
pub mod types;

pub use cache::ResourceCache;
pub use config::{CacheConfig, CacheConfigError, InvalidationPolicy};
pub use types::{CacheKey, CacheStats, EntryInfo, InvalidateTarget};
