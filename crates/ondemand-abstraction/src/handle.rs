//! Handles to loaded artifacts.

use crate::kind::ArtifactKind;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// The opaque in-memory representation of a loaded artifact.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Error returned when a handle is used after its cache entry was forcibly
/// invalidated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Handle for {kind} '{path}' was invalidated")]
pub struct InvalidHandle {
    /// Kind of the invalidated artifact.
    pub kind: ArtifactKind,
    /// Path of the invalidated artifact.
    pub path: PathBuf,
}

struct HandleInner {
    kind: ArtifactKind,
    path: PathBuf,
    generation: u64,
    payload: Payload,
    valid: AtomicBool,
}

/// A shared reference to a cached artifact.
///
/// Cloning is cheap. All clones observe invalidation: once the owning cache
/// entry is forcibly unloaded, [`Handle::payload`] fails.
#[derive(Clone)]
pub struct Handle {
    inner: Arc<HandleInner>,
}

impl Handle {
    /// Creates a valid handle. Called by the cache when an entry is inserted.
    pub fn new(kind: ArtifactKind, path: PathBuf, generation: u64, payload: Payload) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                kind,
                path,
                generation,
                payload,
                valid: AtomicBool::new(true),
            }),
        }
    }

    /// The artifact kind.
    pub fn kind(&self) -> ArtifactKind {
        self.inner.kind
    }

    /// The file this handle was loaded from.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Generation of the cache entry that issued this handle.
    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    /// Whether the owning entry is still live.
    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::Acquire)
    }

    /// Marks every clone of this handle as invalid.
    pub fn invalidate(&self) {
        self.inner.valid.store(false, Ordering::Release);
    }

    /// Returns the payload.
    ///
    /// # Errors
    /// Returns `InvalidHandle` if the entry was invalidated.
    pub fn payload(&self) -> Result<&Payload, InvalidHandle> {
        if self.is_valid() {
            Ok(&self.inner.payload)
        } else {
            Err(InvalidHandle { kind: self.inner.kind, path: self.inner.path.clone() })
        }
    }

    /// Returns the payload downcast to its concrete type.
    ///
    /// # Errors
    /// Returns `InvalidHandle` if the entry was invalidated. Yields `Ok(None)`
    /// when the payload is of another type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Result<Option<Arc<T>>, InvalidHandle> {
        let payload = self.payload()?;
        Ok(Arc::clone(payload).downcast::<T>().ok())
    }

    /// The raw payload regardless of validity. Used by unload hooks.
    pub fn raw_payload(&self) -> &Payload {
        &self.inner.payload
    }

    /// Whether two handles refer to the same loaded artifact.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &self.inner.kind)
            .field("path", &self.inner.path)
            .field("generation", &self.inner.generation)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}
