//! Where catalog documents come from.

use super::types::CatalogDocument;
use super::CatalogError;
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error};

/// A source of "liked" catalog entries.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the full liked-items document.
    ///
    /// # Errors
    /// Returns `CatalogUnavailable` on network, HTTP or parse failures.
    async fn fetch(&self) -> Result<CatalogDocument, CatalogError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Catalog API client (Civitai-compatible).
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    /// The base URL of the catalog (e.g. "https://civitai.com").
    base_url: String,
    /// Bearer token; favorites are per user.
    api_key: Option<String>,
    /// Maximum pages followed through `metadata.nextPage`.
    max_pages: usize,
    /// HTTP client for making requests.
    client: Client,
}

impl HttpCatalog {
    /// Default catalog base URL.
    pub const DEFAULT_BASE_URL: &'static str = "https://civitai.com";

    /// Creates a client for `base_url`.
    ///
    /// # Errors
    /// Returns `CatalogUnavailable` if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::CatalogUnavailable(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            max_pages: 20,
            client,
        })
    }

    /// Limit how many pages are followed.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    fn first_page_url(&self) -> String {
        format!("{}/api/v1/models?favorites=true&types=LORA&limit=100", self.base_url)
    }

    async fn fetch_page(&self, url: &str) -> Result<CatalogDocument, CatalogError> {
        debug!(url = %url, "Fetching catalog page");
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "Catalog request failed");
            CatalogError::CatalogUnavailable(format!("request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Catalog returned an error");
            return Err(CatalogError::CatalogUnavailable(format!("HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CatalogError::CatalogUnavailable(format!("failed to read response: {e}")))?;
        CatalogDocument::from_json(&bytes)
            .map_err(|e| CatalogError::CatalogUnavailable(format!("invalid catalog response: {e}")))
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn fetch(&self) -> Result<CatalogDocument, CatalogError> {
        let mut document = self.fetch_page(&self.first_page_url()).await?;
        let mut next = document.metadata.take().and_then(|m| m.next_page);
        let mut pages = 1;

        while let Some(url) = next {
            if pages >= self.max_pages {
                debug!(pages, "Stopping catalog paging at page limit");
                break;
            }
            let mut page = self.fetch_page(&url).await?;
            next = page.metadata.take().and_then(|m| m.next_page);
            document.extend(page);
            pages += 1;
        }

        Ok(document)
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

/// A catalog export stored on disk.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    /// Read the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogSource for FileCatalog {
    async fn fetch(&self) -> Result<CatalogDocument, CatalogError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            CatalogError::CatalogUnavailable(format!("cannot read {}: {e}", self.path.display()))
        })?;
        CatalogDocument::from_json(&bytes).map_err(|e| {
            CatalogError::CatalogUnavailable(format!("invalid catalog file {}: {e}", self.path.display()))
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
