//! File fingerprints used to detect stale cache entries.
//!
//! The default fingerprint is a single `stat`: file size plus modification
//! time. Content hashing reads the whole file and is only done when the
//! configured mode asks for it.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// How fingerprints are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintMode {
    /// Size and modification time only.
    #[default]
    Metadata,
    /// Size, modification time and a SHA-256 of the contents.
    ContentHash,
    /// Metadata, upgraded to a content hash when the file was modified within
    /// the ambiguity window of the capture (it may be rewritten again without
    /// the timestamp moving).
    Adaptive,
}

/// A cheap, comparable proxy for a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// File size in bytes.
    pub size: u64,
    /// Last modification time, when the platform reports one.
    pub modified: Option<SystemTime>,
    /// SHA-256 of the contents (hex), when computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl Fingerprint {
    /// Whether `current` describes the same file state as `self`.
    ///
    /// Hashes are only compared when both sides carry one.
    pub fn matches(&self, current: &Self) -> bool {
        if self.size != current.size || self.modified != current.modified {
            return false;
        }
        match (&self.content_hash, &current.content_hash) {
            (Some(stored), Some(now)) => stored == now,
            _ => true,
        }
    }
}

/// Computes fingerprints according to a [`FingerprintMode`].
#[derive(Debug, Clone)]
pub struct FingerprintService {
    mode: FingerprintMode,
    ambiguity_window: Duration,
}

impl Default for FingerprintService {
    fn default() -> Self {
        Self::new(FingerprintMode::Metadata)
    }
}

impl FingerprintService {
    /// Default window for [`FingerprintMode::Adaptive`].
    pub const DEFAULT_AMBIGUITY_WINDOW: Duration = Duration::from_secs(2);

    /// Create a service using the given mode.
    #[must_use]
    pub fn new(mode: FingerprintMode) -> Self {
        Self { mode, ambiguity_window: Self::DEFAULT_AMBIGUITY_WINDOW }
    }

    /// Set the window used by adaptive mode.
    #[must_use]
    pub fn with_ambiguity_window(mut self, window: Duration) -> Self {
        self.ambiguity_window = window;
        self
    }

    /// The configured mode.
    pub fn mode(&self) -> FingerprintMode {
        self.mode
    }

    /// Fingerprint `path`.
    ///
    /// # Errors
    /// `NotFound` if the path does not exist, `Access` if it cannot be
    /// inspected or read.
    pub fn capture(&self, path: &Path) -> Result<Fingerprint> {
        self.capture_like(path, None)
    }

    /// Fingerprint `path` so it can be compared against `stored`.
    ///
    /// A stored fingerprint that carries a content hash forces hashing, so an
    /// entry captured with a hash keeps being checked by content.
    pub fn capture_like(&self, path: &Path, stored: Option<&Fingerprint>) -> Result<Fingerprint> {
        let metadata =
            std::fs::metadata(path).map_err(|e| CacheError::from_io(path.to_path_buf(), &e))?;
        if !metadata.is_file() {
            return Err(CacheError::Access {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }

        let modified = metadata.modified().ok();
        let stored_has_hash = stored.is_some_and(|s| s.content_hash.is_some());
        let content_hash = if stored_has_hash || self.needs_hash(modified) {
            Some(hash_file(path)?)
        } else {
            None
        };

        Ok(Fingerprint { size: metadata.len(), modified, content_hash })
    }

    /// Drop the content hash from a fingerprint that matched its stored
    /// counterpart once the mode no longer calls for one.
    ///
    /// In adaptive mode a file hashed while recently modified is verified by
    /// content one more time after the ambiguity window has passed; the
    /// settled fingerprint then lets later checks fall back to a single `stat`.
    #[must_use]
    pub fn settle(&self, mut fingerprint: Fingerprint) -> Fingerprint {
        if fingerprint.content_hash.is_some() && !self.needs_hash(fingerprint.modified) {
            fingerprint.content_hash = None;
        }
        fingerprint
    }

    fn needs_hash(&self, modified: Option<SystemTime>) -> bool {
        match self.mode {
            FingerprintMode::Metadata => false,
            FingerprintMode::ContentHash => true,
            FingerprintMode::Adaptive => match modified {
                // Timestamps in the future are as ambiguous as recent ones.
                Some(at) => SystemTime::now()
                    .duration_since(at)
                    .map_or(true, |age| age <= self.ambiguity_window),
                None => true,
            },
        }
    }
}

/// SHA-256 of a file's contents, hex encoded. Streams the file.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| CacheError::from_io(path.to_path_buf(), &e))?;
    let mut reader = BufReader::with_capacity(1 << 20, file);
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)
        .map_err(|e| CacheError::from_io(path.to_path_buf(), &e))?;
    Ok(hex::encode(hasher.finalize()))
}
