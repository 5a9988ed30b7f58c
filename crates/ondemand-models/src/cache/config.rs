//! Configuration for the resource cache.

use crate::fingerprint::{FingerprintMode, FingerprintService};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// What `invalidate` does with entries that are still checked out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationPolicy {
    /// Block until every outstanding handle is released.
    #[default]
    Wait,
    /// Unload immediately and mark outstanding handles invalid.
    Force,
}

/// Configuration for the resource cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Total footprint the cache may hold, in bytes (default: 16 GiB).
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,

    /// Optional bound on the number of cached entries.
    #[serde(default)]
    pub max_entries: Option<usize>,

    /// How file fingerprints are computed.
    #[serde(default)]
    pub fingerprint_mode: FingerprintMode,

    /// Window in which adaptive fingerprinting hashes a recently modified
    /// file (default: 2000 ms).
    #[serde(default = "default_ambiguity_window_ms")]
    pub ambiguity_window_ms: u64,

    /// Behaviour of explicit invalidation for entries in use.
    #[serde(default)]
    pub invalidation_policy: InvalidationPolicy,
}

fn default_capacity_bytes() -> u64 {
    16 * 1024 * 1024 * 1024
}

fn default_ambiguity_window_ms() -> u64 {
    2000
}

/// Errors that can occur during cache configuration validation.
#[derive(Debug, Error)]
pub enum CacheConfigError {
    /// Invalid capacity (must be > 0).
    #[error("Invalid capacity: must be greater than 0")]
    InvalidCapacity,

    /// Invalid max entries (must be > 0 when set).
    #[error("Invalid max entries: must be greater than 0")]
    InvalidMaxEntries,

    /// Invalid ambiguity window (must be > 0 in adaptive mode).
    #[error("Invalid ambiguity window: must be greater than 0 in adaptive mode")]
    InvalidAmbiguityWindow,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: default_capacity_bytes(),
            max_entries: None,
            fingerprint_mode: FingerprintMode::default(),
            ambiguity_window_ms: default_ambiguity_window_ms(),
            invalidation_policy: InvalidationPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Config with the given capacity and defaults elsewhere.
    #[must_use]
    pub fn with_capacity(capacity_bytes: u64) -> Self {
        Self { capacity_bytes, ..Self::default() }
    }

    /// Validate the cache configuration.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        if self.capacity_bytes == 0 {
            return Err(CacheConfigError::InvalidCapacity);
        }

        if self.max_entries == Some(0) {
            return Err(CacheConfigError::InvalidMaxEntries);
        }

        if self.fingerprint_mode == FingerprintMode::Adaptive && self.ambiguity_window_ms == 0 {
            return Err(CacheConfigError::InvalidAmbiguityWindow);
        }

        Ok(())
    }

    /// Get the ambiguity window as a Duration.
    #[must_use]
    pub fn ambiguity_window(&self) -> Duration {
        Duration::from_millis(self.ambiguity_window_ms)
    }

    /// Build the fingerprint service described by this config.
    #[must_use]
    pub fn fingerprint_service(&self) -> FingerprintService {
        FingerprintService::new(self.fingerprint_mode).with_ambiguity_window(self.ambiguity_window())
    }
}
