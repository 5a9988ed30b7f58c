//! Loader registry: artifact kind -> load/unload functions.

use crate::error::{CacheError, Result};
use ondemand_abstraction::{ArtifactKind, ArtifactLoader, FnLoader, LoadError, LoadParams, LoadedArtifact, Payload};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// A registered loader, shared between the registry, the nodes and the cache
/// entries it produced.
pub type LoaderRegistration = Arc<dyn ArtifactLoader>;

/// Registry of one loader per artifact kind.
///
/// Registering a kind twice replaces the first registration. Use
/// [`crate::ResourceCache::register_loader`] to also drop entries produced by
/// the old loader.
#[derive(Default)]
pub struct LoaderRegistry {
    loaders: RwLock<HashMap<ArtifactKind, LoaderRegistration>>,
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRegistry").field("kinds", &self.kinds()).finish()
    }
}

impl LoaderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the loader for `kind`.
    ///
    /// # Returns
    /// `true` if an earlier registration was replaced.
    pub fn register(&self, kind: ArtifactKind, loader: LoaderRegistration) -> bool {
        let mut loaders = self.loaders.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = loaders.insert(kind, loader).is_some();
        info!(kind = %kind, replaced, "Registered loader");
        replaced
    }

    /// Register a pair of closures for `kind`.
    pub fn register_fn<L, U>(&self, kind: ArtifactKind, load: L, unload: U) -> bool
    where
        L: Fn(&Path, &LoadParams) -> std::result::Result<LoadedArtifact, LoadError> + Send + Sync + 'static,
        U: Fn(&Payload) + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(FnLoader::new(load, unload)))
    }

    /// Get the loader for `kind`.
    ///
    /// # Errors
    /// Returns `UnknownKind` if nothing was registered for `kind`.
    pub fn get(&self, kind: ArtifactKind) -> Result<LoaderRegistration> {
        self.loaders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .ok_or(CacheError::UnknownKind(kind))
    }

    /// Whether `kind` has a loader.
    pub fn contains(&self, kind: ArtifactKind) -> bool {
        self.loaders.read().unwrap_or_else(PoisonError::into_inner).contains_key(&kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<ArtifactKind> {
        let mut kinds: Vec<_> =
            self.loaders.read().unwrap_or_else(PoisonError::into_inner).keys().copied().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind() {
        let registry = LoaderRegistry::new();
        assert!(matches!(
            registry.get(ArtifactKind::Gguf),
            Err(CacheError::UnknownKind(ArtifactKind::Gguf))
        ));
    }

    #[test]
    fn test_register_and_replace() {
        let registry = LoaderRegistry::new();
        let first = registry.register_fn(ArtifactKind::Lora, |_, _| Ok(LoadedArtifact::new(1_u8)), |_| {});
        let second = registry.register_fn(ArtifactKind::Lora, |_, _| Ok(LoadedArtifact::new(2_u8)), |_| {});

        assert!(!first);
        assert!(second);
        assert_eq!(registry.kinds(), vec![ArtifactKind::Lora]);

        let loaded = registry
            .get(ArtifactKind::Lora)
            .unwrap()
            .load(Path::new("x.safetensors"), &LoadParams::new())
            .unwrap();
        assert_eq!(loaded.payload.downcast_ref::<u8>(), Some(&2));
    }
}
