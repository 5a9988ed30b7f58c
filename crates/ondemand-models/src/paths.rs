//! Model folder layout: where each artifact kind lives on disk.
//!
//! Node selectors are paths relative to the kind's folder, as produced by
//! [`ModelPaths::list`].

use crate::error::{CacheError, Result};
use ondemand_abstraction::ArtifactKind;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const WEIGHT_EXTENSIONS: &[&str] = &["safetensors", "sft", "ckpt", "pt", "pth", "bin", "gguf"];
const GGUF_EXTENSIONS: &[&str] = &["gguf"];

/// Per-kind model folders under a common root.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    root: PathBuf,
    folders: HashMap<ArtifactKind, PathBuf>,
}

impl ModelPaths {
    /// Layout with the default folder names under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), folders: HashMap::new() }
    }

    /// Override the folder for `kind`. Relative folders are joined to the root.
    #[must_use]
    pub fn with_folder(mut self, kind: ArtifactKind, folder: impl Into<PathBuf>) -> Self {
        self.folders.insert(kind, folder.into());
        self
    }

    /// The default folder name for `kind`.
    pub fn default_folder(kind: ArtifactKind) -> &'static str {
        match kind {
            ArtifactKind::Checkpoint => "checkpoints",
            ArtifactKind::Unet | ArtifactKind::Gguf => "diffusion_models",
            ArtifactKind::Vae => "vae",
            ArtifactKind::Clip | ArtifactKind::DualClip => "text_encoders",
            ArtifactKind::ClipVision => "clip_vision",
            ArtifactKind::ControlNet => "controlnet",
            ArtifactKind::Lora => "loras",
            ArtifactKind::ModelPatch => "model_patches",
        }
    }

    /// File extensions selectable for `kind`.
    pub fn extensions(kind: ArtifactKind) -> &'static [&'static str] {
        match kind {
            ArtifactKind::Gguf => GGUF_EXTENSIONS,
            _ => WEIGHT_EXTENSIONS,
        }
    }

    /// The models root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The folder holding artifacts of `kind`.
    pub fn folder(&self, kind: ArtifactKind) -> PathBuf {
        match self.folders.get(&kind) {
            Some(folder) if folder.is_absolute() => folder.clone(),
            Some(folder) => self.root.join(folder),
            None => self.root.join(Self::default_folder(kind)),
        }
    }

    /// Resolve a node selector to the file it names.
    ///
    /// # Errors
    /// `InvalidInput` for empty, absolute or escaping selectors;
    /// `FileMissing` if the file does not exist.
    pub fn resolve(&self, kind: ArtifactKind, selector: &str) -> Result<PathBuf> {
        let relative = Path::new(selector);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if selector.trim().is_empty() || escapes {
            return Err(CacheError::InvalidInput {
                name: kind.to_string(),
                reason: format!("'{selector}' is not a path inside the {kind} folder"),
            });
        }

        let path = self.folder(kind).join(relative);
        if !path.is_file() {
            return Err(CacheError::FileMissing { kind, selector: selector.to_string() });
        }
        Ok(path)
    }

    /// Selectable files for `kind`, relative to its folder, sorted.
    ///
    /// A missing folder yields an empty list.
    pub fn list(&self, kind: ArtifactKind) -> Vec<String> {
        let folder = self.folder(kind);
        let extensions = Self::extensions(kind);
        let mut selectors: Vec<String> = WalkDir::new(&folder)
            .follow_links(true)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| extensions.contains(&ext.to_lowercase().as_str()))
            })
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&folder).ok()?;
                let parts: Vec<_> = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect();
                Some(parts.join("/"))
            })
            .collect();
        selectors.sort();
        debug!(kind = %kind, folder = %folder.display(), count = selectors.len(), "Scanned model folder");
        selectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_default_folders() {
        let paths = ModelPaths::new("/models");
        assert_eq!(paths.folder(ArtifactKind::Lora), PathBuf::from("/models/loras"));
        assert_eq!(paths.folder(ArtifactKind::Gguf), PathBuf::from("/models/diffusion_models"));
        assert_eq!(paths.folder(ArtifactKind::DualClip), PathBuf::from("/models/text_encoders"));
    }

    #[test]
    fn test_folder_overrides() {
        let paths = ModelPaths::new("/models")
            .with_folder(ArtifactKind::Unet, "unet")
            .with_folder(ArtifactKind::Vae, "/shared/vae");
        assert_eq!(paths.folder(ArtifactKind::Unet), PathBuf::from("/models/unet"));
        assert_eq!(paths.folder(ArtifactKind::Vae), PathBuf::from("/shared/vae"));
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let temp = TempDir::new().unwrap();
        let paths = ModelPaths::new(temp.path());
        let loras = paths.folder(ArtifactKind::Lora);
        touch(&loras.join("style/b.safetensors"));
        touch(&loras.join("a.safetensors"));
        touch(&loras.join("readme.txt"));
        touch(&paths.folder(ArtifactKind::Unet).join("flux-q4.gguf"));
        touch(&paths.folder(ArtifactKind::Unet).join("flux.safetensors"));

        assert_eq!(paths.list(ArtifactKind::Lora), vec!["a.safetensors", "style/b.safetensors"]);
        assert_eq!(paths.list(ArtifactKind::Gguf), vec!["flux-q4.gguf"]);
        assert_eq!(paths.list(ArtifactKind::Unet), vec!["flux-q4.gguf", "flux.safetensors"]);
        assert!(paths.list(ArtifactKind::ModelPatch).is_empty());
    }

    #[test]
    fn test_resolve() {
        let temp = TempDir::new().unwrap();
        let paths = ModelPaths::new(temp.path());
        touch(&paths.folder(ArtifactKind::Vae).join("ae.safetensors"));

        let resolved = paths.resolve(ArtifactKind::Vae, "ae.safetensors").unwrap();
        assert!(resolved.ends_with("vae/ae.safetensors"));

        assert!(matches!(
            paths.resolve(ArtifactKind::Vae, "missing.safetensors"),
            Err(CacheError::FileMissing { kind: ArtifactKind::Vae, .. })
        ));
        assert!(matches!(
            paths.resolve(ArtifactKind::Vae, "../vae/ae.safetensors"),
            Err(CacheError::InvalidInput { .. })
        ));
        assert!(matches!(paths.resolve(ArtifactKind::Vae, "/etc/passwd"), Err(CacheError::InvalidInput { .. })));
        assert!(matches!(paths.resolve(ArtifactKind::Vae, ""), Err(CacheError::InvalidInput { .. })));
    }
}
