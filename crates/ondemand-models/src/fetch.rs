//! Downloading catalog files into a model folder.

use crate::catalog::FileReference;
use futures::StreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Errors raised while fetching a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The catalog file name cannot be used as a local file name.
    #[error("Refusing to store catalog file as '{0}'")]
    InvalidFileName(String),

    /// The entry has no download URL.
    #[error("Catalog file '{0}' has no download URL")]
    NoDownloadUrl(String),

    /// The request failed or returned an error status.
    #[error("Download of '{name}' failed: {reason}")]
    Http {
        /// File being fetched.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// Writing the file failed.
    #[error("Cannot write '{}': {reason}", path.display())]
    Io {
        /// Destination path.
        path: PathBuf,
        /// OS error message.
        reason: String,
    },
}

/// One async lock per destination path, shared by clones of a downloader.
type TargetLocks = Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>;

/// Streams catalog files to disk.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    api_key: Option<String>,
    locks: TargetLocks,
}

impl Downloader {
    /// Create a downloader.
    ///
    /// `timeout` bounds connecting and each read, not the whole transfer, so
    /// large files on a slow but live connection still complete.
    ///
    /// # Errors
    /// Returns `FetchError::Http` if the HTTP client cannot be created.
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http { name: String::new(), reason: format!("cannot build HTTP client: {e}") })?;
        Ok(Self { client, api_key, locks: TargetLocks::default() })
    }

    fn target_lock(&self, target: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(target.to_path_buf()).or_default())
    }

    fn forget_lock(&self, target: &Path, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this caller hold it: nobody else is queued.
        if Arc::strong_count(lock) == 2 {
            locks.remove(target);
        }
    }

    /// Make sure `reference`'s file exists in `dir`, downloading it if absent.
    ///
    /// The body is written to a process-specific `<name>.<pid>.part` and
    /// renamed once complete, so an interrupted download never leaves a
    /// truncated model behind. Concurrent calls for the same destination are
    /// serialized; the later ones find the file present.
    ///
    /// # Errors
    /// `InvalidFileName`, `NoDownloadUrl`, `Http` or `Io`.
    pub async fn ensure_local(&self, reference: &FileReference, dir: &Path) -> Result<PathBuf, FetchError> {
        let name = reference.file_name();
        let file_name = Path::new(name);
        if name.is_empty() || file_name.file_name() != Some(file_name.as_os_str()) {
            return Err(FetchError::InvalidFileName(name.to_string()));
        }

        let target = dir.join(file_name);
        let lock = self.target_lock(&target);
        let guard = lock.lock().await;
        let result = self.fetch_to(reference, dir, &target).await;
        drop(guard);
        self.forget_lock(&target, &lock);
        result
    }

    async fn fetch_to(&self, reference: &FileReference, dir: &Path, target: &Path) -> Result<PathBuf, FetchError> {
        let name = reference.file_name();
        if fs::try_exists(target).await.unwrap_or(false) {
            debug!(path = %target.display(), "Catalog file already present");
            return Ok(target.to_path_buf());
        }
        if reference.download_url().is_empty() {
            return Err(FetchError::NoDownloadUrl(name.to_string()));
        }

        let io_error = |path: &Path, e: std::io::Error| FetchError::Io { path: path.to_path_buf(), reason: e.to_string() };
        fs::create_dir_all(dir).await.map_err(|e| io_error(dir, e))?;

        let partial = dir.join(format!("{name}.{}.part", std::process::id()));
        match self.download(reference, &partial).await {
            Ok(bytes) => {
                fs::rename(&partial, target).await.map_err(|e| io_error(target, e))?;
                info!(name = %reference.display_name, path = %target.display(), bytes, "Downloaded catalog file");
                Ok(target.to_path_buf())
            }
            Err(err) => {
                if let Err(e) = fs::remove_file(&partial).await {
                    debug!(path = %partial.display(), error = %e, "No partial download to clean up");
                }
                warn!(name = %reference.display_name, error = %err, "Catalog download failed");
                Err(err)
            }
        }
    }

    async fn download(&self, reference: &FileReference, partial: &Path) -> Result<u64, FetchError> {
        let name = reference.file_name().to_string();
        let http_error = |reason: String| FetchError::Http { name: name.clone(), reason };

        let mut request = self.client.get(reference.download_url());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| http_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(http_error(format!("HTTP {status}")));
        }

        let io_error = |e: std::io::Error| FetchError::Io { path: partial.to_path_buf(), reason: e.to_string() };
        let mut file = fs::File::create(partial).await.map_err(io_error)?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| http_error(e.to_string()))?;
            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_error)?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::VersionSummary;
    use std::io::Write;
    use tempfile::TempDir;

    fn reference(name: &str, url: String) -> FileReference {
        FileReference {
            display_name: "Film Grain".to_string(),
            creator: "lumen".to_string(),
            version: VersionSummary {
                name: "v2".to_string(),
                base_model: "Flux.1 D".to_string(),
                file_name: name.to_string(),
                download_url: url,
                trigger_words: vec![],
            },
        }
    }

    #[tokio::test]
    async fn test_downloads_missing_file() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/files/grain")
            .match_header("authorization", "Bearer key")
            .with_status(200)
            .with_body("weights")
            .create_async()
            .await;
        let temp = TempDir::new().unwrap();
        let downloader = Downloader::new(Some("key".to_string()), Duration::from_secs(5)).unwrap();

        let reference = reference("grain.safetensors", format!("{}/files/grain", server.url()));
        let path = downloader.ensure_local(&reference, temp.path()).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"weights");
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);

        // Present now: no second request.
        downloader.ensure_local(&reference, temp.path()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_concurrent_fetches_of_same_file_download_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/files/grain")
            .with_status(200)
            .with_body("weights")
            .expect(1)
            .create_async()
            .await;
        let temp = TempDir::new().unwrap();
        let downloader = Downloader::new(None, Duration::from_secs(5)).unwrap();
        let other = downloader.clone();
        let reference = reference("grain.safetensors", format!("{}/files/grain", server.url()));

        let (first, second) =
            tokio::join!(downloader.ensure_local(&reference, temp.path()), other.ensure_local(&reference, temp.path()));

        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(std::fs::read(temp.path().join("grain.safetensors")).unwrap(), b"weights");
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
        mock.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_slow_transfer_outlasting_timeout_completes() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/files/grain")
            .with_status(200)
            .with_chunked_body(|w| {
                for part in ["wei", "gh", "ts"] {
                    w.write_all(part.as_bytes())?;
                    std::thread::sleep(Duration::from_millis(500));
                }
                Ok(())
            })
            .create_async()
            .await;
        let temp = TempDir::new().unwrap();
        let downloader = Downloader::new(None, Duration::from_secs(1)).unwrap();

        let reference = reference("grain.safetensors", format!("{}/files/grain", server.url()));
        let path = downloader.ensure_local(&reference, temp.path()).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"weights");
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/files/grain").with_status(404).create_async().await;
        let temp = TempDir::new().unwrap();
        let downloader = Downloader::new(None, Duration::from_secs(5)).unwrap();

        let reference = reference("grain.safetensors", format!("{}/files/grain", server.url()));
        let err = downloader.ensure_local(&reference, temp.path()).await.unwrap_err();

        assert!(matches!(err, FetchError::Http { ref reason, .. } if reason.contains("404")));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let temp = TempDir::new().unwrap();
        let downloader = Downloader::new(None, Duration::from_secs(5)).unwrap();

        for name in ["../escape.safetensors", "sub/dir.safetensors", ""] {
            let err = downloader
                .ensure_local(&reference(name, "http://unused".to_string()), temp.path())
                .await
                .unwrap_err();
            assert!(matches!(err, FetchError::InvalidFileName(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn test_missing_url() {
        let temp = TempDir::new().unwrap();
        let downloader = Downloader::new(None, Duration::from_secs(5)).unwrap();
        let err = downloader
            .ensure_local(&reference("grain.safetensors", String::new()), temp.path())
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::NoDownloadUrl("grain.safetensors".to_string()));
    }
}
