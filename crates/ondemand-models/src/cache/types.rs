//! Core data types for the resource cache.

use crate::fingerprint::Fingerprint;
use crate::registry::LoaderRegistration;
use ondemand_abstraction::{ArtifactKind, Handle, LoadParams, Payload};
use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// Cache key for identifying loaded artifacts.
///
/// Artifacts are cached by kind, absolute path and the parameters that change
/// how the load is performed. The file fingerprint is not part of the key: it
/// is stored with the entry and compared on every lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The artifact kind.
    pub kind: ArtifactKind,
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Normalized load parameters.
    pub params: LoadParams,
}

impl CacheKey {
    /// Create a new cache key. Relative paths are made absolute against the
    /// current directory.
    pub fn new(kind: ArtifactKind, path: impl AsRef<Path>, params: LoadParams) -> Self {
        let path = path.as_ref();
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Self { kind, path, params }
    }

    /// Create a key with no load parameters.
    pub fn plain(kind: ArtifactKind, path: impl AsRef<Path>) -> Self {
        Self::new(kind, path, LoadParams::new())
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.path.display())?;
        if !self.params.is_empty() {
            write!(f, "[{}]", self.params)?;
        }
        Ok(())
    }
}

/// Which entries an explicit invalidation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidateTarget {
    /// One key.
    Key(CacheKey),
    /// Every entry of a kind.
    Kind(ArtifactKind),
    /// Everything.
    All,
}

impl InvalidateTarget {
    pub(crate) fn matches(&self, key: &CacheKey) -> bool {
        match self {
            Self::Key(target) => target == key,
            Self::Kind(kind) => key.kind == *kind,
            Self::All => true,
        }
    }
}

/// Run a loader's unload hook. A panicking hook is logged and contained so
/// the rest of a batch still unloads.
pub(crate) fn run_unload(loader: &LoaderRegistration, payload: &Payload) {
    if catch_unwind(AssertUnwindSafe(|| loader.unload(payload))).is_err() {
        warn!("Unload hook panicked");
    }
}

/// A cached artifact with its bookkeeping.
pub(crate) struct CachedArtifact {
    pub(crate) handle: Handle,
    pub(crate) fingerprint: Fingerprint,
    pub(crate) footprint: u64,
    pub(crate) loader: LoaderRegistration,
    pub(crate) ref_count: usize,
    /// Logical clock value of the last checkout; orders LRU eviction.
    pub(crate) last_access: u64,
    pub(crate) last_accessed_at: Instant,
    pub(crate) hits: u64,
    pub(crate) created_at: Instant,
}

impl CachedArtifact {
    pub(crate) fn new(
        handle: Handle,
        fingerprint: Fingerprint,
        footprint: u64,
        loader: LoaderRegistration,
        tick: u64,
    ) -> Self {
        let now = Instant::now();
        Self {
            handle,
            fingerprint,
            footprint,
            loader,
            ref_count: 1,
            last_access: tick,
            last_accessed_at: now,
            hits: 0,
            created_at: now,
        }
    }

    /// Insertion order; generations are allocated increasingly.
    pub(crate) fn generation(&self) -> u64 {
        self.handle.generation()
    }

    /// Record a checkout.
    pub(crate) fn touch(&mut self, tick: u64) {
        self.last_access = tick;
        self.last_accessed_at = Instant::now();
        self.hits += 1;
        self.ref_count += 1;
    }

    /// Invalidate outstanding handles and run the kind's unload hook.
    pub(crate) fn unload(self) {
        self.handle.invalidate();
        run_unload(&self.loader, self.handle.raw_payload());
        debug!(
            kind = %self.handle.kind(),
            path = %self.handle.path().display(),
            bytes = self.footprint,
            "Unloaded artifact"
        );
    }

    pub(crate) fn info(&self, key: &CacheKey) -> EntryInfo {
        EntryInfo {
            kind: key.kind,
            path: key.path.clone(),
            params: key.params.to_string(),
            footprint: self.footprint,
            ref_count: self.ref_count,
            hits: self.hits,
            idle_ms: u64::try_from(self.last_accessed_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            age_ms: u64::try_from(self.created_at.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// A snapshot of one cache entry, for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// File path.
    pub path: PathBuf,
    /// Load parameters, rendered.
    pub params: String,
    /// Accounted footprint in bytes.
    pub footprint: u64,
    /// Outstanding checkouts.
    pub ref_count: usize,
    /// Cache hits served by this entry.
    pub hits: u64,
    /// Milliseconds since the last checkout.
    pub idle_ms: u64,
    /// Milliseconds since the entry was loaded.
    pub age_ms: u64,
}

/// Cache statistics for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from the cache (including callers that waited on
    /// another caller's load).
    pub total_hits: u64,
    /// Lookups that started a load.
    pub total_misses: u64,
    /// Successful load-function invocations.
    pub total_loads: u64,
    /// Failed load-function invocations.
    pub total_load_failures: u64,
    /// Entries evicted under capacity pressure.
    pub total_evictions: u64,
    /// Entries removed because they were stale or explicitly invalidated.
    pub total_invalidations: u64,
    /// Current number of entries.
    pub cache_size: usize,
    /// Bytes currently accounted.
    pub used_bytes: u64,
    /// Configured capacity.
    pub capacity_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_equality() {
        let params = LoadParams::new().with("weight_dtype", "fp8_e4m3fn");
        let key1 = CacheKey::new(ArtifactKind::Unet, "/models/unet/flux.safetensors", params.clone());
        let key2 = CacheKey::new(ArtifactKind::Unet, "/models/unet/flux.safetensors", params);
        let key3 = CacheKey::plain(ArtifactKind::Unet, "/models/unet/flux.safetensors");
        let key4 = CacheKey::plain(ArtifactKind::Gguf, "/models/unet/flux.safetensors");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
        assert_ne!(key3, key4);
    }

    #[test]
    fn test_cache_key_is_absolute() {
        let key = CacheKey::plain(ArtifactKind::Vae, "vae/ae.safetensors");
        assert!(key.path.is_absolute());
        assert!(key.path.ends_with("vae/ae.safetensors"));
    }

    #[test]
    fn test_cache_key_display() {
        let key = CacheKey::new(
            ArtifactKind::Clip,
            "/m/t5.safetensors",
            LoadParams::new().with("device", "cpu"),
        );
        assert_eq!(key.to_string(), "clip:/m/t5.safetensors[device=cpu]");
    }

    #[test]
    fn test_invalidate_target_matches() {
        let key = CacheKey::plain(ArtifactKind::Lora, "/m/a.safetensors");
        assert!(InvalidateTarget::All.matches(&key));
        assert!(InvalidateTarget::Kind(ArtifactKind::Lora).matches(&key));
        assert!(!InvalidateTarget::Kind(ArtifactKind::Vae).matches(&key));
        assert!(InvalidateTarget::Key(key.clone()).matches(&key));
    }

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.total_hits, 0);
        assert_eq!(stats.total_misses, 0);
        assert_eq!(stats.total_evictions, 0);
        assert_eq!(stats.cache_size, 0);
    }
}
