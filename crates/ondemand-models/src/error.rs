//! Error types for the loader core.

use ondemand_abstraction::{ArtifactKind, InvalidHandle, LoadError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for cache and node operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors surfaced by the fingerprint service, the cache and the loader nodes.
///
/// `Clone` so a single load failure can be handed to every caller waiting on
/// the same in-flight load.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The path does not exist.
    #[error("File not found: {}", path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// The path exists but could not be inspected.
    #[error("Cannot access '{}': {reason}", path.display())]
    Access {
        /// The inaccessible path.
        path: PathBuf,
        /// OS error message.
        reason: String,
    },

    /// A node selector no longer points to an existing file.
    #[error("Selected {kind} file '{selector}' is missing")]
    FileMissing {
        /// Kind of the node that rejected the selector.
        kind: ArtifactKind,
        /// The selector as given by the pipeline.
        selector: String,
    },

    /// A node input failed validation.
    #[error("Invalid input '{name}': {reason}")]
    InvalidInput {
        /// Input name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The kind's load function failed. Nothing was cached.
    #[error("Failed to load {kind} '{}': {source}", path.display())]
    Load {
        /// Kind being loaded.
        kind: ArtifactKind,
        /// File being loaded.
        path: PathBuf,
        /// Error raised by the loader.
        #[source]
        source: LoadError,
    },

    /// The artifact does not fit even after evicting every idle entry.
    #[error("Artifact needs {requested} bytes but only {available} of {capacity} can be freed")]
    Capacity {
        /// Footprint of the artifact.
        requested: u64,
        /// Bytes that could be made available.
        available: u64,
        /// Configured capacity.
        capacity: u64,
    },

    /// No loader was registered for the kind.
    #[error("No loader registered for {0}")]
    UnknownKind(ArtifactKind),

    /// A handle was used after its entry was invalidated.
    #[error(transparent)]
    InvalidHandle(#[from] InvalidHandle),

    /// Catalog lookup failed.
    #[error(transparent)]
    Catalog(#[from] crate::catalog::CatalogError),

    /// Downloading a catalog file failed.
    #[error(transparent)]
    Fetch(#[from] crate::fetch::FetchError),
}

impl CacheError {
    /// Map an I/O error on `path` to `NotFound` or `Access`.
    pub(crate) fn from_io(path: PathBuf, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Access { path, reason: err.to_string() }
        }
    }

    /// Whether a later `acquire` with the same key may succeed without any
    /// change by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Load { .. })
    }
}
