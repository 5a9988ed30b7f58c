//! Runtime configuration loading from workspace config.

use crate::cache::CacheConfig;
use crate::catalog::{CatalogSource, FileCatalog, HttpCatalog};
use crate::paths::ModelPaths;
use ondemand_abstraction::ArtifactKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Configuration validation error.
    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Model folder layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathsConfig {
    /// Models root (default: "models"). Relative roots are taken from the
    /// workspace root.
    #[serde(default = "default_models_root")]
    pub root: PathBuf,

    /// Per-kind folder overrides, keyed by kind name (`lora = "loras"`).
    #[serde(default)]
    pub folders: BTreeMap<String, PathBuf>,
}

fn default_models_root() -> PathBuf {
    PathBuf::from("models")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { root: default_models_root(), folders: BTreeMap::new() }
    }
}

/// Liked-catalog access.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Catalog API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Exported catalog document to use instead of the API.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Download liked files that are not present locally.
    #[serde(default = "default_download_missing")]
    pub download_missing: bool,

    /// HTTP timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    HttpCatalog::DEFAULT_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    "CIVITAI_API_KEY".to_string()
}

fn default_download_missing() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            file: None,
            download_missing: default_download_missing(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CatalogConfig {
    /// The API key from the configured environment variable, if set.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|key| !key.trim().is_empty())
    }

    /// Get the timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the configured source: the exported file when set (relative to
    /// `base`), the API otherwise.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if the HTTP client cannot be built.
    pub fn source(&self, base: &Path) -> Result<Arc<dyn CatalogSource>, ConfigError> {
        if let Some(file) = &self.file {
            return Ok(Arc::new(FileCatalog::new(base.join(file))));
        }
        let catalog = HttpCatalog::new(self.base_url.clone(), self.api_key(), self.timeout())
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        Ok(Arc::new(catalog))
    }
}

/// Complete runtime configuration (`.ondemand/config.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnDemandConfig {
    /// `[cache]` section.
    #[serde(default)]
    pub cache: CacheConfig,

    /// `[paths]` section.
    #[serde(default)]
    pub paths: PathsConfig,

    /// `[catalog]` section.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl OnDemandConfig {
    /// Validate every section.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache
            .validate()
            .map_err(|e| ConfigError::Validation(format!("Invalid cache configuration: {e}")))?;

        for name in self.paths.folders.keys() {
            name.parse::<ArtifactKind>()
                .map_err(|e| ConfigError::Validation(format!("Invalid folder override: {e}")))?;
        }

        if self.catalog.timeout_secs == 0 {
            return Err(ConfigError::Validation("Catalog timeout must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// Model folder layout, with relative paths resolved against `base`.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` for an unknown kind in `[paths.folders]`.
    pub fn model_paths(&self, base: &Path) -> Result<ModelPaths, ConfigError> {
        let mut paths = ModelPaths::new(base.join(&self.paths.root));
        for (name, folder) in &self.paths.folders {
            let kind = name
                .parse::<ArtifactKind>()
                .map_err(|e| ConfigError::Validation(format!("Invalid folder override: {e}")))?;
            paths = paths.with_folder(kind, folder.clone());
        }
        Ok(paths)
    }

    /// Render as TOML.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Validation(format!("Failed to serialize config: {e}")))
    }
}

/// Load configuration from the workspace config file.
///
/// Looks for `.ondemand/config.toml` in the workspace root. A missing file or
/// missing sections yield defaults.
///
/// # Errors
/// Returns error if config file exists but cannot be read, parsed or validated.
pub fn load_config(workspace_root: &Path) -> Result<OnDemandConfig, ConfigError> {
    let config_path = default_config_path(workspace_root);

    if !config_path.exists() {
        return Ok(OnDemandConfig::default());
    }

    load_config_file(&config_path)
}

/// Load configuration from an explicit file.
///
/// # Errors
/// Returns error if the file cannot be read, parsed or validated.
pub fn load_config_file(path: &Path) -> Result<OnDemandConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: OnDemandConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Get the default config file path for a workspace.
#[must_use]
pub fn default_config_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".ondemand").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InvalidationPolicy;
    use crate::fingerprint::FingerprintMode;
    use tempfile::TempDir;

    fn write_config(temp: &TempDir, content: &str) {
        let config_dir = temp.path().join(".ondemand");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("config.toml"), content).unwrap();
    }

    #[test]
    fn test_load_config_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path()).unwrap();
        assert_eq!(config, OnDemandConfig::default());
        assert_eq!(config.catalog.timeout_secs, 30);
        assert!(config.catalog.download_missing);
    }

    #[test]
    fn test_load_config_from_file() {
        let temp = TempDir::new().unwrap();
        write_config(
            &temp,
            r#"
[cache]
capacity_bytes = 1048576
max_entries = 8
fingerprint_mode = "adaptive"
invalidation_policy = "force"

[paths]
root = "/data/models"

[paths.folders]
lora = "my_loras"
controlnet = "/shared/controlnet"

[catalog]
file = "liked.json"
download_missing = false
"#,
        );

        let config = load_config(temp.path()).unwrap();
        assert_eq!(config.cache.capacity_bytes, 1_048_576);
        assert_eq!(config.cache.max_entries, Some(8));
        assert_eq!(config.cache.fingerprint_mode, FingerprintMode::Adaptive);
        assert_eq!(config.cache.invalidation_policy, InvalidationPolicy::Force);
        assert_eq!(config.catalog.file, Some(PathBuf::from("liked.json")));
        assert!(!config.catalog.download_missing);
        assert_eq!(config.catalog.base_url, "https://civitai.com");

        let paths = config.model_paths(temp.path()).unwrap();
        assert_eq!(paths.folder(ArtifactKind::Lora), PathBuf::from("/data/models/my_loras"));
        assert_eq!(paths.folder(ArtifactKind::ControlNet), PathBuf::from("/shared/controlnet"));
        assert_eq!(paths.folder(ArtifactKind::Vae), PathBuf::from("/data/models/vae"));
    }

    #[test]
    fn test_load_config_default_when_section_missing() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, "[other.section]\nvalue = \"test\"\n");

        let config = load_config(temp.path()).unwrap();
        assert_eq!(config, OnDemandConfig::default());
    }

    #[test]
    fn test_load_config_validation() {
        let temp = TempDir::new().unwrap();

        write_config(&temp, "[cache]\ncapacity_bytes = 0\n");
        assert!(matches!(load_config(temp.path()), Err(ConfigError::Validation(_))));

        write_config(&temp, "[catalog]\ntimeout_secs = 0\n");
        assert!(matches!(load_config(temp.path()), Err(ConfigError::Validation(_))));

        write_config(&temp, "[paths.folders]\nhypernetwork = \"hn\"\n");
        assert!(matches!(load_config(temp.path()), Err(ConfigError::Validation(_))));

        write_config(&temp, "[cache\n");
        assert!(matches!(load_config(temp.path()), Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_relative_root_is_joined_to_workspace() {
        let config = OnDemandConfig::default();
        let paths = config.model_paths(Path::new("/work")).unwrap();
        assert_eq!(paths.folder(ArtifactKind::Checkpoint), PathBuf::from("/work/models/checkpoints"));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = OnDemandConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed: OnDemandConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
