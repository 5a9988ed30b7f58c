//! Catalog bridge: resolves "liked" catalog entries to concrete files.
//!
//! The catalog lists a user's liked models with every version and file. A
//! loader only needs one file per entry: the first version (in catalog order)
//! that ships a file of type "Model", and that version's first Model file.

pub mod source;
pub mod types;

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub use source::{CatalogSource, FileCatalog, HttpCatalog};
pub use types::{
    CatalogDocument, CatalogItem, FileReference, LikedModel, LoraInfo, ModelVersion, VersionFile,
    VersionSummary,
};

/// Errors raised by the catalog bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The catalog could not be queried or returned unusable data.
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// The entry exists but no version has a file of type "Model".
    #[error("Catalog entry '{0}' has no model file")]
    NoModelFile(String),

    /// No entry has this display name.
    #[error("No catalog entry named '{0}'")]
    UnknownEntry(String),
}

impl CatalogDocument {
    /// Resolve a display name to its first usable file.
    ///
    /// # Errors
    /// `UnknownEntry` if no item has that name, `NoModelFile` if none of its
    /// versions has a Model file.
    pub fn resolve(&self, display_name: &str) -> Result<FileReference, CatalogError> {
        let item = self
            .find(display_name)
            .ok_or_else(|| CatalogError::UnknownEntry(display_name.to_string()))?;

        // Names are not unique; creator and version come from the same item.
        self.items
            .iter()
            .filter(|candidate| candidate.name == item.name)
            .find_map(|candidate| {
                let (version, file) = candidate.usable_versions().next()?;
                Some(FileReference {
                    display_name: candidate.name.clone(),
                    creator: candidate.creator_name().to_string(),
                    version: version.summary(file),
                })
            })
            .ok_or_else(|| CatalogError::NoModelFile(item.name.clone()))
    }
}

/// Resolves liked entries against a [`CatalogSource`].
///
/// The document is fetched on first use and kept until [`CatalogBridge::refresh`].
pub struct CatalogBridge {
    source: Arc<dyn CatalogSource>,
    document: RwLock<Option<Arc<CatalogDocument>>>,
}

impl std::fmt::Debug for CatalogBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogBridge").field("source", &self.source.describe()).finish_non_exhaustive()
    }
}

impl CatalogBridge {
    /// Create a bridge over `source`.
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source, document: RwLock::new(None) }
    }

    /// The current document, fetching it if needed.
    ///
    /// # Errors
    /// Returns `CatalogUnavailable` if the source fails.
    pub async fn document(&self) -> Result<Arc<CatalogDocument>, CatalogError> {
        if let Some(document) = self.document.read().await.as_ref() {
            return Ok(Arc::clone(document));
        }
        self.refresh().await
    }

    /// Re-fetch the document from the source.
    ///
    /// # Errors
    /// Returns `CatalogUnavailable` if the source fails; the previous
    /// document is kept.
    pub async fn refresh(&self) -> Result<Arc<CatalogDocument>, CatalogError> {
        let fetched = Arc::new(self.source.fetch().await?);
        info!(source = %self.source.describe(), items = fetched.items.len(), "Fetched liked catalog entries");
        *self.document.write().await = Some(Arc::clone(&fetched));
        Ok(fetched)
    }

    /// Resolve a liked entry's display name to the file to load.
    ///
    /// # Errors
    /// `CatalogUnavailable`, `UnknownEntry` or `NoModelFile`.
    pub async fn resolve_liked(&self, display_name: &str) -> Result<FileReference, CatalogError> {
        let reference = self.document().await?.resolve(display_name)?;
        debug!(
            name = %display_name,
            version = %reference.version.name,
            file = %reference.file_name(),
            "Resolved liked entry"
        );
        Ok(reference)
    }

    /// Every liked entry with its usable versions.
    pub async fn liked_models(&self) -> Result<Vec<LikedModel>, CatalogError> {
        Ok(self.document().await?.liked_models())
    }

    /// Display names usable as a node's choice list.
    pub async fn liked_names(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self.liked_models().await?.into_iter().map(|m| m.model_name).collect())
    }

    /// Author and trigger words for a liked entry.
    pub async fn lora_info(&self, display_name: &str) -> Result<LoraInfo, CatalogError> {
        let reference = self.resolve_liked(display_name).await?;
        Ok(LoraInfo { author: reference.creator, trigger_words: reference.version.trigger_words })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticSource {
        body: &'static str,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl CatalogSource for StaticSource {
        async fn fetch(&self) -> Result<CatalogDocument, CatalogError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            CatalogDocument::from_json(self.body.as_bytes())
                .map_err(|e| CatalogError::CatalogUnavailable(e.to_string()))
        }

        fn describe(&self) -> String {
            "static".to_string()
        }
    }

    fn bridge(body: &'static str) -> (Arc<StaticSource>, CatalogBridge) {
        let source = Arc::new(StaticSource { body, fetches: AtomicUsize::new(0) });
        let bridge = CatalogBridge::new(Arc::clone(&source) as Arc<dyn CatalogSource>);
        (source, bridge)
    }

    const TWO_VERSIONS: &str = r#"{"items":[{
        "name": "Film Grain",
        "creator": {"username": "lumen"},
        "modelVersions": [
            {"name": "v3", "baseModel": "Flux.1 D", "files": [{"type": "Training Data", "name": "set.zip", "downloadUrl": "https://c/set"}]},
            {"name": "v2", "baseModel": "Flux.1 D", "files": [
                {"type": "Model", "name": "grain_v2.safetensors", "downloadUrl": "https://c/v2", "trainedWords": ["film grain", "35mm"]},
                {"type": "Model", "name": "grain_v2_alt.safetensors", "downloadUrl": "https://c/v2alt", "trainedWords": []}
            ]}
        ]
    }, {
        "name": "Empty",
        "creator": {"username": "nobody"},
        "modelVersions": [{"name": "v1", "files": []}]
    }]}"#;

    #[tokio::test]
    async fn test_resolve_liked_skips_version_without_model_file() {
        let (_, bridge) = bridge(TWO_VERSIONS);

        let reference = bridge.resolve_liked("Film Grain").await.unwrap();

        assert_eq!(reference.version.name, "v2");
        assert_eq!(reference.file_name(), "grain_v2.safetensors");
        assert_eq!(reference.download_url(), "https://c/v2");
        assert_eq!(reference.trigger_words(), ["film grain", "35mm"]);
        assert_eq!(reference.creator, "lumen");
    }

    #[tokio::test]
    async fn test_resolve_errors() {
        let (_, bridge) = bridge(TWO_VERSIONS);

        assert_eq!(
            bridge.resolve_liked("Empty").await.unwrap_err(),
            CatalogError::NoModelFile("Empty".to_string())
        );
        assert_eq!(
            bridge.resolve_liked("Missing").await.unwrap_err(),
            CatalogError::UnknownEntry("Missing".to_string())
        );
    }

    #[test]
    fn test_duplicate_names_resolve_within_one_item() {
        let doc = CatalogDocument::from_json(
            br#"{"items":[
                {"name": "Ink", "creator": {"username": "first"}, "modelVersions": [
                    {"name": "v1", "files": [{"type": "Training Data", "name": "set.zip"}]}
                ]},
                {"name": "Ink", "creator": {"username": "second"}, "modelVersions": [
                    {"name": "v4", "files": [{"type": "Model", "name": "ink_v4.safetensors", "downloadUrl": "https://c/v4"}]}
                ]}
            ]}"#,
        )
        .unwrap();

        let reference = doc.resolve("ink").unwrap();

        assert_eq!(reference.creator, "second");
        assert_eq!(reference.version.name, "v4");
        assert_eq!(reference.file_name(), "ink_v4.safetensors");
    }

    #[tokio::test]
    async fn test_document_is_fetched_once_until_refresh() {
        let (source, bridge) = bridge(TWO_VERSIONS);

        assert_eq!(bridge.liked_names().await.unwrap(), vec!["Film Grain"]);
        bridge.lora_info("Film Grain").await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        bridge.refresh().await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unavailable_catalog() {
        let (_, bridge) = bridge("not json");
        assert!(matches!(bridge.resolve_liked("x").await, Err(CatalogError::CatalogUnavailable(_))));
    }

    #[tokio::test]
    async fn test_lora_info() {
        let (_, bridge) = bridge(TWO_VERSIONS);
        let info = bridge.lora_info("Film Grain").await.unwrap();
        assert_eq!(info.author, "lumen");
        assert_eq!(info.trigger_words, vec!["film grain", "35mm"]);
    }
}
