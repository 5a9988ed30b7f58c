//! ResourceCache implementation with lazy loading and LRU eviction.

use crate::error::{CacheError, Result};
use crate::fingerprint::{Fingerprint, FingerprintService};
use crate::registry::{LoaderRegistration, LoaderRegistry};
use ondemand_abstraction::{ArtifactKind, Handle, LoadError, LoadedArtifact};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::config::{CacheConfig, CacheConfigError, InvalidationPolicy};
use super::types::{CacheKey, CacheStats, CachedArtifact, EntryInfo, InvalidateTarget, run_unload};

/// Outcome of one load. `None` means the kind was re-registered while the
/// load ran and its result was discarded; callers look the key up again.
type Outcome = Option<Result<Handle>>;

/// Result slot shared by every caller waiting on the same load.
#[derive(Default)]
struct InFlight {
    result: Mutex<Option<Outcome>>,
    done: Condvar,
}

impl InFlight {
    fn complete(&self, outcome: Outcome) {
        *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> Outcome {
        let mut slot = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self.done.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CachedArtifact>,
    by_generation: HashMap<u64, CacheKey>,
    in_flight: HashMap<CacheKey, Arc<InFlight>>,
    used_bytes: u64,
    clock: u64,
    next_generation: u64,
    stats: CacheStats,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove_entry(&mut self, key: &CacheKey) -> Option<CachedArtifact> {
        let entry = self.entries.remove(key)?;
        self.used_bytes = self.used_bytes.saturating_sub(entry.footprint);
        self.by_generation.remove(&entry.generation());
        Some(entry)
    }

    /// Pick idle entries to evict so that `footprint` more bytes (and one more
    /// entry) fit. Nothing is removed here; the caller removes the returned
    /// keys only once the insert is certain.
    fn plan_eviction(&self, footprint: u64, config: &CacheConfig) -> Result<Vec<CacheKey>> {
        let capacity = config.capacity_bytes;
        let pinned: u64 =
            self.entries.values().filter(|e| e.ref_count > 0).map(|e| e.footprint).sum();
        let available = capacity.saturating_sub(pinned);
        let refuse = || CacheError::Capacity { requested: footprint, available, capacity };

        if footprint > available {
            return Err(refuse());
        }

        let mut candidates: Vec<(&CacheKey, &CachedArtifact)> =
            self.entries.iter().filter(|(_, e)| e.ref_count == 0).collect();
        candidates.sort_by_key(|(_, e)| (e.last_access, e.ref_count, e.generation()));

        let mut used = self.used_bytes;
        let mut count = self.entries.len();
        let over_count = |count: usize| config.max_entries.is_some_and(|max| count + 1 > max);
        let mut victims = Vec::new();
        for (key, entry) in candidates {
            if used + footprint <= capacity && !over_count(count) {
                break;
            }
            used -= entry.footprint;
            count -= 1;
            victims.push(key.clone());
        }

        if used + footprint > capacity || over_count(count) {
            return Err(refuse());
        }
        Ok(victims)
    }
}

/// Resource cache for loaded model artifacts.
///
/// Provides lazy loading, staleness detection through file fingerprints,
/// footprint-bounded LRU eviction of idle entries and single-flight loads.
pub struct ResourceCache {
    state: Mutex<CacheState>,
    /// Signalled whenever an entry's ref-count drops to zero or an entry is
    /// removed.
    released: Condvar,
    registry: Arc<LoaderRegistry>,
    fingerprints: FingerprintService,
    config: CacheConfig,
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ResourceCache {
    /// Create a new cache with its own empty registry.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if the configuration is invalid.
    pub fn new(config: CacheConfig) -> std::result::Result<Self, CacheConfigError> {
        Self::with_registry(config, Arc::new(LoaderRegistry::new()))
    }

    /// Create a new cache backed by `registry`.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if the configuration is invalid.
    pub fn with_registry(
        config: CacheConfig,
        registry: Arc<LoaderRegistry>,
    ) -> std::result::Result<Self, CacheConfigError> {
        config.validate()?;

        let state = CacheState {
            stats: CacheStats { capacity_bytes: config.capacity_bytes, ..CacheStats::default() },
            ..CacheState::default()
        };

        Ok(Self {
            state: Mutex::new(state),
            released: Condvar::new(),
            registry,
            fingerprints: config.fingerprint_service(),
            config,
        })
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The fingerprint service used for staleness checks.
    pub fn fingerprints(&self) -> &FingerprintService {
        &self.fingerprints
    }

    /// The registry consulted by [`ResourceCache::acquire`].
    pub fn registry(&self) -> &Arc<LoaderRegistry> {
        &self.registry
    }

    /// Register (or replace) the loader for `kind`.
    ///
    /// Entries of that kind are forcibly invalidated: they were produced by
    /// the previous loader. A load still running with the previous loader is
    /// discarded when it completes.
    pub fn register_loader(&self, kind: ArtifactKind, loader: LoaderRegistration) -> bool {
        let replaced = self.registry.register(kind, loader);
        let dropped = self.invalidate_with(&InvalidateTarget::Kind(kind), InvalidationPolicy::Force);
        if dropped > 0 {
            info!(kind = %kind, dropped, "Dropped entries of re-registered kind");
        }
        replaced
    }

    /// Check out the artifact for `key`, loading it with the registered loader
    /// for its kind if necessary.
    ///
    /// # Errors
    /// `UnknownKind` if no loader is registered, otherwise as
    /// [`ResourceCache::acquire_with`].
    pub fn acquire(&self, key: &CacheKey) -> Result<Handle> {
        self.acquire_from(key, None)
    }

    /// Check out the artifact for `key`, loading it with `loader` if it is not
    /// cached or the cached entry is stale.
    ///
    /// A cached entry produced by a different loader counts as stale. Every
    /// successful call must be paired with a [`ResourceCache::release`].
    ///
    /// # Errors
    /// `NotFound`/`Access` if the file cannot be fingerprinted, `Load` if the
    /// loader fails, `Capacity` if the artifact cannot fit.
    pub fn acquire_with(&self, key: &CacheKey, loader: &LoaderRegistration) -> Result<Handle> {
        self.acquire_from(key, Some(loader))
    }

    fn acquire_from(&self, key: &CacheKey, explicit: Option<&LoaderRegistration>) -> Result<Handle> {
        loop {
            let loader = match explicit {
                Some(loader) => Arc::clone(loader),
                None => self.registry.get(key.kind)?,
            };
            let stored = self.lock().entries.get(key).map(|e| e.fingerprint.clone());

            // Taken before any load starts: a write racing the load leaves
            // the entry stale for the next acquire.
            let current = match self.fingerprints.capture_like(&key.path, stored.as_ref()) {
                Ok(fingerprint) => fingerprint,
                Err(err) => {
                    if stored.is_some() {
                        self.invalidate_with(&InvalidateTarget::Key(key.clone()), InvalidationPolicy::Force);
                    }
                    return Err(err);
                }
            };

            let mut state = self.lock();
            let mut stale = None;
            let fresh =
                state.entries.get(key).map(|e| Arc::ptr_eq(&e.loader, &loader) && e.fingerprint.matches(&current));
            match fresh {
                Some(true) => {
                    let tick = state.tick();
                    if let Some(entry) = state.entries.get_mut(key) {
                        entry.touch(tick);
                        entry.fingerprint = self.fingerprints.settle(current.clone());
                        let handle = entry.handle.clone();
                        state.stats.total_hits += 1;
                        debug!(kind = %key.kind, path = %key.path.display(), "Cache hit");
                        return Ok(handle);
                    }
                }
                Some(false) => {
                    stale = state.remove_entry(key);
                    state.stats.total_invalidations += 1;
                    self.released.notify_all();
                    info!(kind = %key.kind, path = %key.path.display(), "Cached entry is stale, dropping it");
                }
                None => {}
            }

            if let Some(flight) = state.in_flight.get(key).cloned() {
                drop(state);
                if let Some(entry) = stale {
                    entry.unload();
                }
                debug!(kind = %key.kind, path = %key.path.display(), "Waiting for in-flight load");
                let Some(result) = flight.wait() else {
                    continue;
                };
                let handle = result?;

                let mut state = self.lock();
                let tick = state.tick();
                if let Some(entry) = state.entries.get_mut(key) {
                    if entry.generation() == handle.generation() && Arc::ptr_eq(&entry.loader, &loader) {
                        entry.touch(tick);
                        state.stats.total_hits += 1;
                        return Ok(handle);
                    }
                }
                // Evicted, invalidated or loaded by another loader before we
                // could take a reference.
                continue;
            }

            let flight = Arc::new(InFlight::default());
            state.in_flight.insert(key.clone(), Arc::clone(&flight));
            state.stats.total_misses += 1;
            drop(state);
            if let Some(entry) = stale {
                entry.unload();
            }

            let registered = explicit.is_none() || self.is_registered(key.kind, &loader);
            let outcome = self.load_and_insert(key, &loader, current, registered);
            flight.complete(outcome.clone());
            if let Some(result) = outcome {
                return result;
            }
        }
    }

    fn is_registered(&self, kind: ArtifactKind, loader: &LoaderRegistration) -> bool {
        self.registry.get(kind).is_ok_and(|current| Arc::ptr_eq(&current, loader))
    }

    fn load_and_insert(
        &self,
        key: &CacheKey,
        loader: &LoaderRegistration,
        fingerprint: Fingerprint,
        registered: bool,
    ) -> Outcome {
        debug!(kind = %key.kind, path = %key.path.display(), "Cache miss, loading artifact");
        let started = Instant::now();
        let loaded = catch_unwind(AssertUnwindSafe(|| loader.load(&key.path, &key.params)))
            .unwrap_or_else(|_| Err(LoadError::Other("loader panicked".to_string())));

        let mut state = self.lock();
        // The marker goes away in the same critical section as the insert, so
        // no caller can observe neither.
        state.in_flight.remove(key);

        let LoadedArtifact { payload, footprint } = match loaded {
            Ok(loaded) => loaded,
            Err(source) => {
                state.stats.total_load_failures += 1;
                drop(state);
                warn!(kind = %key.kind, path = %key.path.display(), error = %source, "Load failed");
                return Some(Err(CacheError::Load { kind: key.kind, path: key.path.clone(), source }));
            }
        };
        state.stats.total_loads += 1;

        // register_loader swaps the registry before invalidating, so checking
        // under the state lock either sees the new loader or precedes the
        // invalidation that will drop this entry.
        if registered && !self.is_registered(key.kind, loader) {
            drop(state);
            info!(kind = %key.kind, path = %key.path.display(), "Loader replaced during load, discarding result");
            run_unload(loader, &payload);
            return None;
        }

        let footprint = footprint.unwrap_or(fingerprint.size);

        let victims = match state.plan_eviction(footprint, &self.config) {
            Ok(victims) => victims,
            Err(err) => {
                drop(state);
                warn!(
                    kind = %key.kind,
                    path = %key.path.display(),
                    bytes = footprint,
                    error = %err,
                    "Artifact does not fit in cache"
                );
                run_unload(loader, &payload);
                return Some(Err(err));
            }
        };

        let evicted: Vec<(CacheKey, CachedArtifact)> = victims
            .into_iter()
            .filter_map(|victim| state.remove_entry(&victim).map(|entry| (victim, entry)))
            .collect();
        state.stats.total_evictions += evicted.len() as u64;

        let generation = state.next_generation;
        state.next_generation += 1;
        let tick = state.tick();
        let handle = Handle::new(key.kind, key.path.clone(), generation, payload);
        let entry = CachedArtifact::new(handle.clone(), fingerprint, footprint, Arc::clone(loader), tick);
        state.entries.insert(key.clone(), entry);
        state.by_generation.insert(generation, key.clone());
        state.used_bytes += footprint;
        let used_bytes = state.used_bytes;
        drop(state);

        for (victim, entry) in evicted {
            info!(
                kind = %victim.kind,
                path = %victim.path.display(),
                bytes = entry.footprint,
                "Evicted LRU artifact from cache"
            );
            entry.unload();
        }

        info!(
            kind = %key.kind,
            path = %key.path.display(),
            bytes = footprint,
            used_bytes,
            elapsed_ms = started.elapsed().as_millis(),
            "Artifact cached"
        );
        Some(Ok(handle))
    }

    /// Return a checkout obtained from `acquire`.
    ///
    /// The entry stays cached when its ref-count reaches zero; it only becomes
    /// eligible for eviction.
    ///
    /// # Returns
    /// `false` if the handle's entry is no longer cached (it was invalidated).
    pub fn release(&self, handle: &Handle) -> bool {
        let mut state = self.lock();
        let Some(key) = state.by_generation.get(&handle.generation()).cloned() else {
            return false;
        };
        self.release_locked(&mut state, &key)
    }

    /// Return a checkout of whichever entry currently backs `key`.
    ///
    /// Prefer [`ResourceCache::release`]: a key-based release after the entry
    /// was replaced decrements the replacement.
    pub fn release_key(&self, key: &CacheKey) -> bool {
        let mut state = self.lock();
        self.release_locked(&mut state, key)
    }

    fn release_locked(&self, state: &mut CacheState, key: &CacheKey) -> bool {
        let Some(entry) = state.entries.get_mut(key) else {
            return false;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            debug!(kind = %key.kind, path = %key.path.display(), "Artifact idle");
            self.released.notify_all();
        }
        true
    }

    /// Unload and remove entries matching `target` using the configured
    /// [`InvalidationPolicy`].
    ///
    /// # Returns
    /// The number of entries removed.
    pub fn invalidate(&self, target: &InvalidateTarget) -> usize {
        self.invalidate_with(target, self.config.invalidation_policy)
    }

    /// Unload and remove entries matching `target`.
    ///
    /// With [`InvalidationPolicy::Wait`] this blocks until every matching entry
    /// has been released; with [`InvalidationPolicy::Force`] checked-out
    /// entries are unloaded at once and their handles become invalid.
    pub fn invalidate_with(&self, target: &InvalidateTarget, policy: InvalidationPolicy) -> usize {
        let mut removed = Vec::new();
        let mut state = self.lock();
        loop {
            let matching: Vec<CacheKey> = state
                .entries
                .iter()
                .filter(|(key, entry)| {
                    target.matches(key) && (policy == InvalidationPolicy::Force || entry.ref_count == 0)
                })
                .map(|(key, _)| key.clone())
                .collect();
            if !matching.is_empty() {
                // Wakes other wait-mode invalidators whose entries are gone.
                self.released.notify_all();
            }
            for key in matching {
                if let Some(entry) = state.remove_entry(&key) {
                    removed.push((key, entry));
                }
            }

            let busy = state.entries.keys().any(|key| target.matches(key));
            if !busy {
                break;
            }
            debug!(scope = ?target, "Waiting for checked-out artifacts before invalidating");
            state = self.released.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.stats.total_invalidations += removed.len() as u64;
        drop(state);

        let count = removed.len();
        for (key, entry) in removed {
            if entry.ref_count > 0 {
                warn!(
                    kind = %key.kind,
                    path = %key.path.display(),
                    ref_count = entry.ref_count,
                    "Forcibly unloading artifact in use"
                );
            }
            entry.unload();
        }
        if count > 0 {
            info!(scope = ?target, count, "Invalidated cached artifacts");
        }
        count
    }

    /// Unload every entry. Outstanding handles become invalid.
    pub fn shutdown(&self) -> usize {
        self.invalidate_with(&InvalidateTarget::All, InvalidationPolicy::Force)
    }

    /// Whether `key` has a cached entry (fresh or not).
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Outstanding checkouts of `key`, if cached.
    pub fn ref_count(&self, key: &CacheKey) -> Option<usize> {
        self.lock().entries.get(key).map(|e| e.ref_count)
    }

    /// The fingerprint recorded for `key`, if cached.
    pub fn fingerprint(&self, key: &CacheKey) -> Option<Fingerprint> {
        self.lock().entries.get(key).map(|e| e.fingerprint.clone())
    }

    /// Bytes currently accounted.
    pub fn used_bytes(&self) -> u64 {
        self.lock().used_bytes
    }

    /// Snapshot of every entry, most recently used first.
    pub fn entries(&self) -> Vec<EntryInfo> {
        let state = self.lock();
        let mut entries: Vec<_> = state.entries.iter().collect();
        entries.sort_by_key(|(_, e)| std::cmp::Reverse(e.last_access));
        entries.into_iter().map(|(key, entry)| entry.info(key)).collect()
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let mut result = state.stats.clone();
        result.cache_size = state.entries.len();
        result.used_bytes = state.used_bytes;
        result
    }

    /// Get the cache configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl Drop for ResourceCache {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.by_generation.clear();
        for (_, entry) in state.entries.drain() {
            entry.unload();
        }
    }
}
