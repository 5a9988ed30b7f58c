//! Catalog document model and the "liked" projection derived from it.

use serde::{Deserialize, Deserializer, Serialize};

/// File type marking the actual weights in a version's file list.
pub const MODEL_FILE_TYPE: &str = "Model";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A page of catalog items, as exported or returned by the catalog API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    /// Catalog items.
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<CatalogItem>,
    /// Paging information (API responses only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PageMetadata>,
}

/// Paging information of an API response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    /// URL of the next page, if any.
    #[serde(default)]
    pub next_page: Option<String>,
}

/// One catalog entry (a model with its versions).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    /// Display name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Uploader.
    #[serde(default)]
    pub creator: Option<Creator>,
    /// Versions, in catalog order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub model_versions: Vec<ModelVersion>,
}

/// The uploader of a catalog item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    /// Username.
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
}

/// One version of a catalog item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelVersion {
    /// Version name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Base model family (e.g. "SDXL 1.0", "Flux.1 D").
    #[serde(default, deserialize_with = "null_as_default")]
    pub base_model: String,
    /// Downloadable files.
    #[serde(default, deserialize_with = "null_as_default")]
    pub files: Vec<VersionFile>,
    /// Trigger words, where the API reports them per version.
    #[serde(default, deserialize_with = "null_as_default")]
    pub trained_words: Vec<String>,
}

/// A downloadable file of a version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionFile {
    /// File type ("Model", "Training Data", ...).
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub file_type: String,
    /// File name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Download URL.
    #[serde(default, deserialize_with = "null_as_default")]
    pub download_url: String,
    /// Trigger words.
    #[serde(default, deserialize_with = "null_as_default")]
    pub trained_words: Vec<String>,
}

impl VersionFile {
    /// Whether this file holds model weights.
    pub fn is_model(&self) -> bool {
        self.file_type == MODEL_FILE_TYPE
    }
}

impl ModelVersion {
    /// The first file of type "Model", if any.
    pub fn model_file(&self) -> Option<&VersionFile> {
        self.files.iter().find(|f| f.is_model())
    }

    pub(crate) fn summary(&self, file: &VersionFile) -> VersionSummary {
        let trigger_words =
            if file.trained_words.is_empty() { self.trained_words.clone() } else { file.trained_words.clone() };
        VersionSummary {
            name: self.name.clone(),
            base_model: self.base_model.clone(),
            file_name: file.name.clone(),
            download_url: file.download_url.clone(),
            trigger_words,
        }
    }
}

impl CatalogItem {
    /// Username of the creator, empty when unknown.
    pub fn creator_name(&self) -> &str {
        self.creator.as_ref().map_or("", |c| c.username.as_str())
    }

    /// Versions having a Model file, each paired with its first Model file,
    /// in catalog order.
    pub fn usable_versions(&self) -> impl Iterator<Item = (&ModelVersion, &VersionFile)> {
        self.model_versions.iter().filter_map(|v| v.model_file().map(|f| (v, f)))
    }
}

/// A version reduced to what a loader needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    /// Version name.
    pub name: String,
    /// Base model family.
    pub base_model: String,
    /// File name of the first Model file.
    pub file_name: String,
    /// Its download URL.
    pub download_url: String,
    /// Its trigger words.
    pub trigger_words: Vec<String>,
}

/// A catalog item with only its usable versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikedModel {
    /// Display name.
    pub model_name: String,
    /// Creator username.
    pub model_creator: String,
    /// Versions with a Model file, in catalog order.
    pub versions: Vec<VersionSummary>,
}

/// A resolved liked entry: which file to load and where to get it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    /// The display name it was resolved from.
    pub display_name: String,
    /// Creator username.
    pub creator: String,
    /// Selected version.
    pub version: VersionSummary,
}

impl FileReference {
    /// File name to look for locally.
    pub fn file_name(&self) -> &str {
        &self.version.file_name
    }

    /// Where to download the file.
    pub fn download_url(&self) -> &str {
        &self.version.download_url
    }

    /// Trigger words to add to the prompt.
    pub fn trigger_words(&self) -> &[String] {
        &self.version.trigger_words
    }
}

/// What the UI shows next to a liked LoRA selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoraInfo {
    /// Creator username.
    pub author: String,
    /// Trigger words of the selected version.
    pub trigger_words: Vec<String>,
}

impl CatalogDocument {
    /// Parse a catalog document from JSON.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Every item that has at least one usable version.
    pub fn liked_models(&self) -> Vec<LikedModel> {
        self.items
            .iter()
            .filter_map(|item| {
                let versions: Vec<_> = item.usable_versions().map(|(v, f)| v.summary(f)).collect();
                (!versions.is_empty()).then(|| LikedModel {
                    model_name: item.name.clone(),
                    model_creator: item.creator_name().to_string(),
                    versions,
                })
            })
            .collect()
    }

    /// Find an item by display name (exact, then case-insensitive).
    pub fn find(&self, display_name: &str) -> Option<&CatalogItem> {
        let wanted = display_name.trim();
        self.items
            .iter()
            .find(|item| item.name == wanted)
            .or_else(|| self.items.iter().find(|item| item.name.eq_ignore_ascii_case(wanted)))
    }

    /// Append the items of another page.
    pub fn extend(&mut self, page: Self) {
        self.items.extend(page.items);
    }
}
