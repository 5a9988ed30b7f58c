//! Runtime lifecycle: configuration -> registry -> cache -> nodes.

use crate::cache::{CacheStats, ResourceCache};
use crate::catalog::CatalogBridge;
use crate::config::{ConfigError, OnDemandConfig};
use crate::error::Result;
use crate::fetch::Downloader;
use crate::nodes::{
    CheckpointLoaderNode, ClipLoaderNode, ClipVisionLoaderNode, ControlNetLoaderNode, DualClipLoaderNode,
    GgufLoaderNode, LikedLoraLoaderNode, LoraLoaderNode, ModelPatchLoaderNode, NodeContext, UnetLoaderNode,
    VaeLoaderNode,
};
use crate::paths::ModelPaths;
use crate::registry::{LoaderRegistration, LoaderRegistry};
use ondemand_abstraction::{ArtifactKind, LoadError, LoadParams, LoadedArtifact, Payload};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// One cache, one registry and one folder layout, shared by every node built
/// from this runtime.
///
/// Started explicitly with [`LoaderRuntime::start`]; [`LoaderRuntime::shutdown`]
/// (or dropping the last reference to the cache) unloads everything.
#[derive(Debug)]
pub struct LoaderRuntime {
    config: OnDemandConfig,
    base: PathBuf,
    ctx: NodeContext,
    catalog: Arc<CatalogBridge>,
    downloader: Option<Downloader>,
}

impl LoaderRuntime {
    /// Build the runtime. Relative paths in `config` are resolved against `base`.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if the configuration is invalid.
    pub fn start(config: OnDemandConfig, base: &Path) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let registry = Arc::new(LoaderRegistry::new());
        let cache = ResourceCache::with_registry(config.cache.clone(), registry)
            .map_err(|e| ConfigError::Validation(format!("Invalid cache configuration: {e}")))?;
        let paths = config.model_paths(base)?;

        let catalog = Arc::new(CatalogBridge::new(config.catalog.source(base)?));
        let downloader = if config.catalog.download_missing {
            let downloader = Downloader::new(config.catalog.api_key(), config.catalog.timeout())
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
            Some(downloader)
        } else {
            None
        };

        info!(
            models_root = %paths.root().display(),
            capacity_bytes = config.cache.capacity_bytes,
            fingerprint_mode = ?config.cache.fingerprint_mode,
            "Loader runtime started"
        );

        Ok(Self {
            ctx: NodeContext::new(Arc::new(cache), Arc::new(paths)),
            base: base.to_path_buf(),
            config,
            catalog,
            downloader,
        })
    }

    /// The shared cache.
    pub fn cache(&self) -> &Arc<ResourceCache> {
        self.ctx.cache()
    }

    /// The model folder layout.
    pub fn paths(&self) -> &ModelPaths {
        self.ctx.paths()
    }

    /// The loader registry.
    pub fn registry(&self) -> &Arc<LoaderRegistry> {
        self.cache().registry()
    }

    /// The configuration the runtime was started with.
    pub fn config(&self) -> &OnDemandConfig {
        &self.config
    }

    /// Directory relative paths were resolved against.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The liked-catalog bridge.
    pub fn catalog(&self) -> &Arc<CatalogBridge> {
        &self.catalog
    }

    /// Register (or replace) the loader for `kind`, dropping that kind's
    /// cached entries.
    pub fn register_loader(&self, kind: ArtifactKind, loader: LoaderRegistration) -> bool {
        self.cache().register_loader(kind, loader)
    }

    /// Register a pair of closures for `kind`, dropping that kind's cached
    /// entries.
    pub fn register_fn<L, U>(&self, kind: ArtifactKind, load: L, unload: U) -> bool
    where
        L: Fn(&Path, &LoadParams) -> std::result::Result<LoadedArtifact, LoadError> + Send + Sync + 'static,
        U: Fn(&Payload) + Send + Sync + 'static,
    {
        self.register_loader(kind, Arc::new(ondemand_abstraction::FnLoader::new(load, unload)))
    }

    fn require(&self, kind: ArtifactKind) -> Result<NodeContext> {
        self.registry().get(kind)?;
        Ok(self.ctx.clone())
    }

    /// Checkpoint node.
    ///
    /// # Errors
    /// `UnknownKind` if no loader is registered for the node's kind; the same
    /// holds for every node constructor below. Nodes look the loader up again
    /// on each invocation, so a later [`LoaderRuntime::register_loader`]
    /// applies to nodes already built.
    pub fn checkpoint_node(&self) -> Result<CheckpointLoaderNode> {
        Ok(CheckpointLoaderNode::new(self.require(ArtifactKind::Checkpoint)?))
    }

    /// UNet node.
    pub fn unet_node(&self) -> Result<UnetLoaderNode> {
        Ok(UnetLoaderNode::new(self.require(ArtifactKind::Unet)?))
    }

    /// VAE node.
    pub fn vae_node(&self) -> Result<VaeLoaderNode> {
        Ok(VaeLoaderNode::new(self.require(ArtifactKind::Vae)?))
    }

    /// CLIP node.
    pub fn clip_node(&self) -> Result<ClipLoaderNode> {
        Ok(ClipLoaderNode::new(self.require(ArtifactKind::Clip)?))
    }

    /// Dual CLIP node.
    pub fn dual_clip_node(&self) -> Result<DualClipLoaderNode> {
        Ok(DualClipLoaderNode::new(self.require(ArtifactKind::DualClip)?))
    }

    /// CLIP vision node.
    pub fn clip_vision_node(&self) -> Result<ClipVisionLoaderNode> {
        Ok(ClipVisionLoaderNode::new(self.require(ArtifactKind::ClipVision)?))
    }

    /// GGUF node.
    pub fn gguf_node(&self) -> Result<GgufLoaderNode> {
        Ok(GgufLoaderNode::new(self.require(ArtifactKind::Gguf)?))
    }

    /// ControlNet node.
    pub fn control_net_node(&self) -> Result<ControlNetLoaderNode> {
        Ok(ControlNetLoaderNode::new(self.require(ArtifactKind::ControlNet)?))
    }

    /// LoRA node.
    pub fn lora_node(&self) -> Result<LoraLoaderNode> {
        Ok(LoraLoaderNode::new(self.require(ArtifactKind::Lora)?))
    }

    /// Model patch node.
    pub fn model_patch_node(&self) -> Result<ModelPatchLoaderNode> {
        Ok(ModelPatchLoaderNode::new(self.require(ArtifactKind::ModelPatch)?))
    }

    /// Liked-catalog LoRA node, using the LoRA loader.
    pub fn liked_lora_node(&self) -> Result<LikedLoraLoaderNode> {
        Ok(LikedLoraLoaderNode::new(
            self.require(ArtifactKind::Lora)?,
            Arc::clone(&self.catalog),
            self.downloader.clone(),
        ))
    }

    /// Current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.cache().stats()
    }

    /// Unload every cached artifact. Outstanding handles become invalid.
    pub fn shutdown(&self) -> usize {
        let unloaded = self.cache().shutdown();
        info!(unloaded, "Loader runtime shut down");
        unloaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::nodes::{CheckpointInputs, LoaderNode, VaeInputs};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn offline_config() -> OnDemandConfig {
        let mut config = OnDemandConfig::default();
        config.catalog.file = Some(PathBuf::from("liked.json"));
        config.catalog.download_missing = false;
        config
    }

    #[test]
    fn test_nodes_require_registered_loader() {
        let temp = TempDir::new().unwrap();
        let runtime = LoaderRuntime::start(offline_config(), temp.path()).unwrap();

        assert!(matches!(runtime.vae_node(), Err(CacheError::UnknownKind(ArtifactKind::Vae))));

        runtime.register_fn(ArtifactKind::Vae, |path, _| Ok(LoadedArtifact::new(path.to_path_buf())), |_| {});
        let node = runtime.vae_node().unwrap();
        assert_eq!(node.kind(), ArtifactKind::Vae);
        assert_eq!(runtime.registry().kinds(), vec![ArtifactKind::Vae]);
    }

    #[test]
    fn test_existing_node_uses_replacement_loader() {
        let temp = TempDir::new().unwrap();
        let runtime = LoaderRuntime::start(offline_config(), temp.path()).unwrap();
        let folder = runtime.paths().folder(ArtifactKind::Vae);
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("ae.safetensors"), b"vae").unwrap();

        let old_loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&old_loads);
        runtime.register_fn(
            ArtifactKind::Vae,
            move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(LoadedArtifact::new("old").with_footprint(1))
            },
            |_| {},
        );
        let node = runtime.vae_node().unwrap();
        let inputs = VaeInputs { vae_name: "ae.safetensors".to_string() };
        let first = node.invoke(&inputs).unwrap();
        first.release(runtime.cache());

        let new_loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&new_loads);
        runtime.register_fn(
            ArtifactKind::Vae,
            move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(LoadedArtifact::new("new").with_footprint(1))
            },
            |_| {},
        );
        let second = node.invoke(&inputs).unwrap();

        assert_eq!(old_loads.load(Ordering::SeqCst), 1);
        assert_eq!(new_loads.load(Ordering::SeqCst), 1);
        assert!(!first.handle.is_valid());
        assert_eq!(*second.handle.downcast::<&str>().unwrap().unwrap(), "new");
    }

    #[test]
    fn test_start_resolves_paths_against_base() {
        let temp = TempDir::new().unwrap();
        let runtime = LoaderRuntime::start(offline_config(), temp.path()).unwrap();
        assert_eq!(runtime.paths().root(), temp.path().join("models"));
        assert_eq!(runtime.base(), temp.path());
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let temp = TempDir::new().unwrap();
        let mut config = offline_config();
        config.cache.capacity_bytes = 0;
        assert!(matches!(LoaderRuntime::start(config, temp.path()), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_shutdown_unloads_entries() {
        let temp = TempDir::new().unwrap();
        let runtime = LoaderRuntime::start(offline_config(), temp.path()).unwrap();
        let unloads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&unloads);
        runtime.register_fn(
            ArtifactKind::Checkpoint,
            |_, _| Ok(LoadedArtifact::new(()).with_footprint(1)),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        let folder = runtime.paths().folder(ArtifactKind::Checkpoint);
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("sdxl.safetensors"), b"ckpt").unwrap();

        let output = runtime
            .checkpoint_node()
            .unwrap()
            .invoke(&CheckpointInputs { ckpt_name: "sdxl.safetensors".to_string() })
            .unwrap();

        assert_eq!(runtime.stats().cache_size, 1);
        assert_eq!(runtime.shutdown(), 1);
        assert_eq!(unloads.load(Ordering::SeqCst), 1);
        assert!(!output.handle.is_valid());
    }
}
