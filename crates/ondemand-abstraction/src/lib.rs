//! Artifact abstraction layer for OnDemand.
//!
//! This crate defines the vocabulary shared by the cache, the loader nodes and
//! the applications embedding them: artifact kinds, load parameters, the
//! opaque [`Handle`] produced by a loader and the [`ArtifactLoader`] trait
//! each kind implements.

pub mod handle;
pub mod kind;
pub mod params;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use handle::{Handle, InvalidHandle, Payload};
pub use kind::{ArtifactKind, UnknownKind};
pub use params::{LoadParams, ParamValue};

/// Represents an error raised by a kind-specific load function.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadError {
    /// The artifact could not be decoded (truncated file, bad header, ...).
    #[error("Malformed artifact: {0}")]
    Malformed(String),

    /// The artifact is valid but uses a variant this loader cannot handle.
    #[error("Unsupported artifact: {0}")]
    Unsupported(String),

    /// Reading the artifact failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Other unexpected errors.
    #[error("Load error: {0}")]
    Other(String),
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// The result of a successful load: the in-memory payload and its estimated
/// memory footprint.
pub struct LoadedArtifact {
    /// The loaded payload, opaque to the cache.
    pub payload: Payload,
    /// Estimated resident size in bytes. `None` means "use the file size".
    pub footprint: Option<u64>,
}

impl LoadedArtifact {
    /// Wraps a payload with no explicit footprint.
    pub fn new<T: std::any::Any + Send + Sync>(payload: T) -> Self {
        Self { payload: Arc::new(payload), footprint: None }
    }

    /// Sets the estimated footprint in bytes.
    #[must_use]
    pub fn with_footprint(mut self, bytes: u64) -> Self {
        self.footprint = Some(bytes);
        self
    }
}

impl std::fmt::Debug for LoadedArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedArtifact")
            .field("footprint", &self.footprint)
            .finish_non_exhaustive()
    }
}

/// A kind-specific pair of load and unload functions.
///
/// Implementations must be `Send + Sync`: the cache calls `load` outside its
/// lock, possibly from several threads for different keys at once.
pub trait ArtifactLoader: Send + Sync {
    /// Loads the artifact at `path`.
    ///
    /// # Errors
    /// Returns a `LoadError` if the file cannot be read or decoded.
    fn load(&self, path: &Path, params: &LoadParams) -> Result<LoadedArtifact, LoadError>;

    /// Releases resources held by a payload previously returned by `load`.
    fn unload(&self, _payload: &Payload) {}
}

type LoadFn = dyn Fn(&Path, &LoadParams) -> Result<LoadedArtifact, LoadError> + Send + Sync;
type UnloadFn = dyn Fn(&Payload) + Send + Sync;

/// An [`ArtifactLoader`] built from a pair of closures.
pub struct FnLoader {
    load: Box<LoadFn>,
    unload: Box<UnloadFn>,
}

impl FnLoader {
    /// Creates a loader from a load closure and an unload closure.
    pub fn new<L, U>(load: L, unload: U) -> Self
    where
        L: Fn(&Path, &LoadParams) -> Result<LoadedArtifact, LoadError> + Send + Sync + 'static,
        U: Fn(&Payload) + Send + Sync + 'static,
    {
        Self { load: Box::new(load), unload: Box::new(unload) }
    }

    /// Creates a loader whose unload is a no-op (the payload is simply dropped).
    pub fn load_only<L>(load: L) -> Self
    where
        L: Fn(&Path, &LoadParams) -> Result<LoadedArtifact, LoadError> + Send + Sync + 'static,
    {
        Self::new(load, |_| {})
    }
}

impl ArtifactLoader for FnLoader {
    fn load(&self, path: &Path, params: &LoadParams) -> Result<LoadedArtifact, LoadError> {
        (self.load)(path, params)
    }

    fn unload(&self, payload: &Payload) {
        (self.unload)(payload);
    }
}

impl std::fmt::Debug for FnLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnLoader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fn_loader_calls_closures() {
        let unloads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&unloads);
        let loader = FnLoader::new(
            |path, _| Ok(LoadedArtifact::new(path.display().to_string()).with_footprint(3)),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        let loaded = loader.load(Path::new("a.safetensors"), &LoadParams::new()).unwrap();
        assert_eq!(loaded.footprint, Some(3));
        assert_eq!(
            loaded.payload.downcast_ref::<String>().map(String::as_str),
            Some("a.safetensors")
        );

        loader.unload(&loaded.payload);
        assert_eq!(unloads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_load_error_from_io() {
        let err: LoadError = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, LoadError::Io(ref msg) if msg == "eof"));
        assert_eq!(err.to_string(), "I/O error: eof");
    }
}
