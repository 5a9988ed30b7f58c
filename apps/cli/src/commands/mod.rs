//! Command implementations for the OnDemand CLI.

pub mod catalog;
pub mod config;
pub mod fingerprint;
pub mod scan;
pub mod types;
pub mod warm;

pub use types::{CatalogCommand, FingerprintModeArg};

use anyhow::{Context, Result};
use ondemand_models::config::default_config_path;
use ondemand_models::{ArtifactKind, ModelPaths, OnDemandConfig, load_config_file};
use std::path::{Path, PathBuf};

/// Workspace and configuration shared by every command.
#[derive(Debug)]
pub struct CliContext {
    /// Directory relative config paths are resolved against.
    pub workspace: PathBuf,
    /// Config file in effect, if one was read.
    pub config_path: Option<PathBuf>,
    /// Effective configuration.
    pub config: OnDemandConfig,
}

impl CliContext {
    /// Resolve the workspace (flag, then `ONDEMAND_WORKSPACE`, then the
    /// current directory) and load its configuration.
    pub fn load(workspace: Option<PathBuf>, config: Option<PathBuf>) -> Result<Self> {
        let workspace = match workspace.or_else(|| std::env::var_os("ONDEMAND_WORKSPACE").map(PathBuf::from)) {
            Some(path) => path,
            None => std::env::current_dir().context("Failed to determine current directory")?,
        };

        let config_path = config.or_else(|| Some(default_config_path(&workspace)).filter(|p| p.exists()));
        let config = match &config_path {
            Some(path) => load_config_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => OnDemandConfig::default(),
        };

        Ok(Self { workspace, config_path, config })
    }

    /// The configured model folder layout.
    pub fn model_paths(&self) -> Result<ModelPaths> {
        self.config.model_paths(&self.workspace).context("Invalid [paths] configuration")
    }
}

/// Parse a kind argument.
pub fn parse_kind(kind: &str) -> Result<ArtifactKind> {
    kind.parse::<ArtifactKind>().with_context(|| {
        let known: Vec<_> = ArtifactKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("Expected one of: {}", known.join(", "))
    })
}

/// Render a byte count for humans.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 { format!("{bytes} B") } else { format!("{value:.1} {}", UNITS[unit]) }
}

/// Display a path relative to the workspace when it lies inside it.
pub fn display_path(workspace: &Path, path: &Path) -> String {
    path.strip_prefix(workspace).unwrap_or(path).display().to_string()
}
