//! Loader nodes: the per-kind adapters the host pipeline invokes.
//!
//! A node validates its inputs, resolves the selected file in its kind's
//! folder, builds a [`CacheKey`] and hands it to the shared
//! [`ResourceCache`]. Nodes keep no state between invocations; every
//! repeated invocation is just another `acquire`.

use crate::cache::{CacheKey, ResourceCache};
use crate::catalog::{CatalogBridge, LoraInfo};
use crate::error::{CacheError, Result};
use crate::fetch::Downloader;
use crate::paths::ModelPaths;
use ondemand_abstraction::{ArtifactKind, Handle, LoadError, LoadParams};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::debug;

/// Accepted `weight_dtype` values of the UNet node.
pub const WEIGHT_DTYPES: &[&str] = &["default", "fp8_e4m3fn", "fp8_e4m3fn_fast", "fp8_e5m2"];

/// Accepted `device` values.
pub const DEVICES: &[&str] = &["default", "cpu"];

/// Accepted `type` values of the single CLIP node.
pub const CLIP_TYPES: &[&str] = &[
    "stable_diffusion",
    "stable_cascade",
    "sd3",
    "stable_audio",
    "mochi",
    "ltxv",
    "pixart",
    "cosmos",
    "lumina2",
    "wan",
    "hidream",
    "chroma",
    "ace",
    "omnigen2",
    "qwen_image",
    "hunyuan_image",
];

/// Accepted `type` values of the dual CLIP node.
pub const DUAL_CLIP_TYPES: &[&str] = &["sdxl", "sd3", "flux", "hunyuan_video", "hidream", "hunyuan_image"];

const STRENGTH_LIMIT: f64 = 100.0;

fn choice(name: &str, value: &str, allowed: &[&str]) -> Result<String> {
    if allowed.contains(&value) {
        Ok(value.to_string())
    } else {
        Err(CacheError::InvalidInput {
            name: name.to_string(),
            reason: format!("'{value}' is not one of {}", allowed.join(", ")),
        })
    }
}

/// LoRA strengths, applied downstream by whoever patches the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoraStrengths {
    /// Strength applied to the diffusion model.
    pub model: f64,
    /// Strength applied to the text encoder.
    pub clip: f64,
}

impl LoraStrengths {
    /// Validated strengths.
    ///
    /// # Errors
    /// `InvalidInput` if a strength is not finite or outside [-100, 100].
    pub fn new(model: f64, clip: f64) -> Result<Self> {
        for (name, value) in [("strength_model", model), ("strength_clip", clip)] {
            if !value.is_finite() || value.abs() > STRENGTH_LIMIT {
                return Err(CacheError::InvalidInput {
                    name: name.to_string(),
                    reason: format!("{value} is outside [-{STRENGTH_LIMIT}, {STRENGTH_LIMIT}]"),
                });
            }
        }
        Ok(Self { model, clip })
    }
}

/// What a node hands back to the pipeline.
#[derive(Debug, Clone)]
pub struct NodeOutput {
    /// The checked-out artifact. Release it once the execution step is done.
    pub handle: Handle,
    /// Strengths for LoRA nodes.
    pub strengths: Option<LoraStrengths>,
    /// Trigger words for catalog LoRAs.
    pub trigger_words: Vec<String>,
}

impl NodeOutput {
    fn new(handle: Handle) -> Self {
        Self { handle, strengths: None, trigger_words: Vec::new() }
    }

    /// Return the checkout to `cache`.
    pub fn release(&self, cache: &ResourceCache) -> bool {
        cache.release(&self.handle)
    }
}

/// Shared state every node is built from.
#[derive(Debug, Clone)]
pub struct NodeContext {
    cache: Arc<ResourceCache>,
    paths: Arc<ModelPaths>,
}

impl NodeContext {
    /// Bundle the cache and the folder layout.
    pub fn new(cache: Arc<ResourceCache>, paths: Arc<ModelPaths>) -> Self {
        Self { cache, paths }
    }

    /// The shared cache.
    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    /// The model folder layout.
    pub fn paths(&self) -> &Arc<ModelPaths> {
        &self.paths
    }
}

/// A pipeline loader node.
pub trait LoaderNode: Send + Sync {
    /// The node's input schema.
    type Inputs;

    /// Kind of artifact the node loads.
    fn kind(&self) -> ArtifactKind;

    /// Name shown in the host's node list.
    fn display_name(&self) -> &'static str;

    /// Selectable files, as offered in the node's file widget.
    fn choices(&self) -> Vec<String>;

    /// Load (or reuse) the artifact the inputs select.
    ///
    /// # Errors
    /// `InvalidInput`, `FileMissing`, or any error of
    /// [`ResourceCache::acquire`].
    fn invoke(&self, inputs: &Self::Inputs) -> Result<NodeOutput>;
}

#[derive(Clone)]
struct NodeCore {
    ctx: NodeContext,
    kind: ArtifactKind,
}

impl NodeCore {
    const fn new(ctx: NodeContext, kind: ArtifactKind) -> Self {
        Self { ctx, kind }
    }

    fn resolve(&self, selector: &str) -> Result<PathBuf> {
        self.ctx.paths.resolve(self.kind, selector)
    }

    fn acquire(&self, path: &Path, params: LoadParams) -> Result<Handle> {
        let key = CacheKey::new(self.kind, path, params);
        debug!(key = %key, "Loader node invoked");
        // The loader is looked up per invocation so re-registration takes effect.
        self.ctx.cache.acquire(&key)
    }

    fn load(&self, selector: &str, params: LoadParams) -> Result<NodeOutput> {
        let path = self.resolve(selector)?;
        Ok(NodeOutput::new(self.acquire(&path, params)?))
    }

    fn choices(&self) -> Vec<String> {
        self.ctx.paths.list(self.kind)
    }
}

/// Nodes whose only input is the file selector.
macro_rules! single_file_node {
    ($(#[$doc:meta])* $node:ident, $inputs:ident, $field:ident, $kind:expr, $display:literal) => {
        $(#[$doc])*
        pub struct $node {
            core: NodeCore,
        }

        #[doc = concat!("Inputs of [`", stringify!($node), "`].")]
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $inputs {
            /// Selected file, relative to the kind's folder.
            pub $field: String,
        }

        impl $node {
            /// Build the node over `ctx`. The kind's loader is taken from the
            /// cache's registry on every invocation.
            pub const fn new(ctx: NodeContext) -> Self {
                Self { core: NodeCore::new(ctx, $kind) }
            }
        }

        impl LoaderNode for $node {
            type Inputs = $inputs;

            fn kind(&self) -> ArtifactKind {
                self.core.kind
            }

            fn display_name(&self) -> &'static str {
                $display
            }

            fn choices(&self) -> Vec<String> {
                self.core.choices()
            }

            fn invoke(&self, inputs: &Self::Inputs) -> Result<NodeOutput> {
                self.core.load(&inputs.$field, LoadParams::new())
            }
        }
    };
}

single_file_node!(
    /// Loads a full checkpoint.
    CheckpointLoaderNode,
    CheckpointInputs,
    ckpt_name,
    ArtifactKind::Checkpoint,
    "OnDemand Checkpoint Loader"
);

single_file_node!(
    /// Loads a VAE.
    VaeLoaderNode,
    VaeInputs,
    vae_name,
    ArtifactKind::Vae,
    "OnDemand VAE Loader"
);

single_file_node!(
    /// Loads a CLIP vision encoder.
    ClipVisionLoaderNode,
    ClipVisionInputs,
    clip_name,
    ArtifactKind::ClipVision,
    "OnDemand CLIP Vision Loader"
);

single_file_node!(
    /// Loads a GGUF-quantized diffusion model.
    GgufLoaderNode,
    GgufInputs,
    unet_name,
    ArtifactKind::Gguf,
    "OnDemand GGUF Loader"
);

single_file_node!(
    /// Loads a ControlNet.
    ControlNetLoaderNode,
    ControlNetInputs,
    control_net_name,
    ArtifactKind::ControlNet,
    "OnDemand ControlNet Loader"
);

/// Loads diffusion model weights.
pub struct UnetLoaderNode {
    core: NodeCore,
}

/// Inputs of [`UnetLoaderNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnetInputs {
    /// Selected file.
    pub unet_name: String,
    /// One of [`WEIGHT_DTYPES`].
    pub weight_dtype: String,
}

impl UnetLoaderNode {
    /// Build the node over `ctx`.
    pub const fn new(ctx: NodeContext) -> Self {
        Self { core: NodeCore::new(ctx, ArtifactKind::Unet) }
    }
}

impl LoaderNode for UnetLoaderNode {
    type Inputs = UnetInputs;

    fn kind(&self) -> ArtifactKind {
        self.core.kind
    }

    fn display_name(&self) -> &'static str {
        "OnDemand UNET Loader"
    }

    fn choices(&self) -> Vec<String> {
        self.core.choices()
    }

    fn invoke(&self, inputs: &Self::Inputs) -> Result<NodeOutput> {
        let dtype = choice("weight_dtype", &inputs.weight_dtype, WEIGHT_DTYPES)?;
        self.core.load(&inputs.unet_name, LoadParams::new().with("weight_dtype", dtype))
    }
}

/// Loads a single text encoder.
pub struct ClipLoaderNode {
    core: NodeCore,
}

/// Inputs of [`ClipLoaderNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipInputs {
    /// Selected file.
    pub clip_name: String,
    /// One of [`CLIP_TYPES`].
    pub clip_type: String,
    /// One of [`DEVICES`].
    pub device: String,
}

impl ClipLoaderNode {
    /// Build the node over `ctx`.
    pub const fn new(ctx: NodeContext) -> Self {
        Self { core: NodeCore::new(ctx, ArtifactKind::Clip) }
    }
}

impl LoaderNode for ClipLoaderNode {
    type Inputs = ClipInputs;

    fn kind(&self) -> ArtifactKind {
        self.core.kind
    }

    fn display_name(&self) -> &'static str {
        "OnDemand CLIP Loader"
    }

    fn choices(&self) -> Vec<String> {
        self.core.choices()
    }

    fn invoke(&self, inputs: &Self::Inputs) -> Result<NodeOutput> {
        let params = LoadParams::new()
            .with("type", choice("type", &inputs.clip_type, CLIP_TYPES)?)
            .with("device", choice("device", &inputs.device, DEVICES)?);
        self.core.load(&inputs.clip_name, params)
    }
}

/// Loads a pair of text encoders as one artifact.
///
/// The key's path is the first file; the second file's path and fingerprint
/// go into the params, so replacing either file loads a fresh pair.
pub struct DualClipLoaderNode {
    core: NodeCore,
}

/// Inputs of [`DualClipLoaderNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualClipInputs {
    /// First encoder.
    pub clip_name1: String,
    /// Second encoder.
    pub clip_name2: String,
    /// One of [`DUAL_CLIP_TYPES`].
    pub clip_type: String,
    /// One of [`DEVICES`].
    pub device: String,
}

impl DualClipLoaderNode {
    /// Build the node over `ctx`.
    pub const fn new(ctx: NodeContext) -> Self {
        Self { core: NodeCore::new(ctx, ArtifactKind::DualClip) }
    }

    fn pair_params(&self, second: &Path, params: LoadParams) -> Result<LoadParams> {
        let fingerprint = self.core.ctx.cache.fingerprints().capture(second)?;
        let mut params = params
            .with("pair", second.to_string_lossy().into_owned())
            .with("pair_size", fingerprint.size);
        if let Some(nanos) = fingerprint
            .modified
            .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
            .and_then(|age| u64::try_from(age.as_nanos()).ok())
        {
            params.insert("pair_mtime", nanos);
        }
        if let Some(hash) = fingerprint.content_hash {
            params.insert("pair_hash", hash);
        }
        Ok(params)
    }
}

impl LoaderNode for DualClipLoaderNode {
    type Inputs = DualClipInputs;

    fn kind(&self) -> ArtifactKind {
        self.core.kind
    }

    fn display_name(&self) -> &'static str {
        "OnDemand DualCLIP Loader"
    }

    fn choices(&self) -> Vec<String> {
        self.core.choices()
    }

    fn invoke(&self, inputs: &Self::Inputs) -> Result<NodeOutput> {
        let params = LoadParams::new()
            .with("type", choice("type", &inputs.clip_type, DUAL_CLIP_TYPES)?)
            .with("device", choice("device", &inputs.device, DEVICES)?);
        let first = self.core.resolve(&inputs.clip_name1)?;
        let second = self.core.resolve(&inputs.clip_name2)?;
        let params = self.pair_params(&second, params)?;
        Ok(NodeOutput::new(self.core.acquire(&first, params)?))
    }
}

/// Loads a LoRA from the LoRA folder.
pub struct LoraLoaderNode {
    core: NodeCore,
}

/// Inputs of [`LoraLoaderNode`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoraInputs {
    /// Selected file.
    pub lora_name: String,
    /// Strength applied to the diffusion model.
    pub strength_model: f64,
    /// Strength applied to the text encoder.
    pub strength_clip: f64,
}

impl LoraLoaderNode {
    /// Build the node over `ctx`.
    pub const fn new(ctx: NodeContext) -> Self {
        Self { core: NodeCore::new(ctx, ArtifactKind::Lora) }
    }
}

impl LoaderNode for LoraLoaderNode {
    type Inputs = LoraInputs;

    fn kind(&self) -> ArtifactKind {
        self.core.kind
    }

    fn display_name(&self) -> &'static str {
        "OnDemand Lora Loader"
    }

    fn choices(&self) -> Vec<String> {
        self.core.choices()
    }

    fn invoke(&self, inputs: &Self::Inputs) -> Result<NodeOutput> {
        let strengths = LoraStrengths::new(inputs.strength_model, inputs.strength_clip)?;
        let mut output = self.core.load(&inputs.lora_name, LoadParams::new())?;
        output.strengths = Some(strengths);
        Ok(output)
    }
}

/// Loads a model patch.
pub struct ModelPatchLoaderNode {
    core: NodeCore,
}

/// Inputs of [`ModelPatchLoaderNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPatchInputs {
    /// Selected file.
    pub name: String,
    /// One of [`DEVICES`].
    pub device: String,
}

impl ModelPatchLoaderNode {
    /// Build the node over `ctx`.
    pub const fn new(ctx: NodeContext) -> Self {
        Self { core: NodeCore::new(ctx, ArtifactKind::ModelPatch) }
    }
}

impl LoaderNode for ModelPatchLoaderNode {
    type Inputs = ModelPatchInputs;

    fn kind(&self) -> ArtifactKind {
        self.core.kind
    }

    fn display_name(&self) -> &'static str {
        "OnDemand Model Patch Loader"
    }

    fn choices(&self) -> Vec<String> {
        self.core.choices()
    }

    fn invoke(&self, inputs: &Self::Inputs) -> Result<NodeOutput> {
        let device = choice("device", &inputs.device, DEVICES)?;
        self.core.load(&inputs.name, LoadParams::new().with("device", device))
    }
}

/// Loads a LoRA picked by its display name in the user's liked catalog.
///
/// The file is looked up in the LoRA folder and, when missing and a
/// downloader is configured, fetched first.
pub struct LikedLoraLoaderNode {
    core: NodeCore,
    catalog: Arc<CatalogBridge>,
    downloader: Option<Downloader>,
}

/// Inputs of [`LikedLoraLoaderNode`].
#[derive(Debug, Clone, PartialEq)]
pub struct LikedLoraInputs {
    /// Display name of the liked catalog entry.
    pub lora_name: String,
    /// Strength applied to the diffusion model.
    pub strength_model: f64,
    /// Strength applied to the text encoder.
    pub strength_clip: f64,
}

impl LikedLoraLoaderNode {
    /// Build the node. Without a downloader, missing files are an error.
    pub const fn new(ctx: NodeContext, catalog: Arc<CatalogBridge>, downloader: Option<Downloader>) -> Self {
        Self { core: NodeCore::new(ctx, ArtifactKind::Lora), catalog, downloader }
    }

    /// Name shown in the host's node list.
    pub fn display_name(&self) -> &'static str {
        "OnDemand Civitai Liked Lora Loader"
    }

    /// Liked entry names for the node's selector.
    ///
    /// # Errors
    /// `Catalog` if the catalog is unavailable.
    pub async fn choices(&self) -> Result<Vec<String>> {
        Ok(self.catalog.liked_names().await?)
    }

    /// Author and trigger words shown when the selection changes.
    ///
    /// # Errors
    /// `Catalog` if the entry cannot be resolved.
    pub async fn info(&self, lora_name: &str) -> Result<LoraInfo> {
        Ok(self.catalog.lora_info(lora_name).await?)
    }

    /// Resolve, fetch if needed, and load the selected entry.
    ///
    /// The cache is blocking, so the acquire runs on the blocking pool.
    ///
    /// # Errors
    /// `InvalidInput`, `Catalog`, `Fetch`, `FileMissing`, or any acquire error.
    pub async fn invoke(&self, inputs: &LikedLoraInputs) -> Result<NodeOutput> {
        let strengths = LoraStrengths::new(inputs.strength_model, inputs.strength_clip)?;
        let reference = self.catalog.resolve_liked(&inputs.lora_name).await?;

        let path = match (self.core.resolve(reference.file_name()), &self.downloader) {
            (Ok(path), _) => path,
            (Err(CacheError::FileMissing { .. }), Some(downloader)) => {
                let folder = self.core.ctx.paths.folder(ArtifactKind::Lora);
                downloader.ensure_local(&reference, &folder).await?
            }
            (Err(err), _) => return Err(err),
        };

        let core = self.core.clone();
        let task_path = path.clone();
        let handle = tokio::task::spawn_blocking(move || core.acquire(&task_path, LoadParams::new()))
            .await
            .map_err(|e| CacheError::Load {
                kind: ArtifactKind::Lora,
                path,
                source: LoadError::Other(format!("load task failed: {e}")),
            })??;

        Ok(NodeOutput {
            handle,
            strengths: Some(strengths),
            trigger_words: reference.version.trigger_words,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use ondemand_abstraction::{ArtifactLoader, LoadedArtifact};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every (path, params) it is asked to load.
    #[derive(Default)]
    struct RecordingLoader {
        calls: Mutex<Vec<(PathBuf, LoadParams)>>,
    }

    impl RecordingLoader {
        fn calls(&self) -> Vec<(PathBuf, LoadParams)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ArtifactLoader for RecordingLoader {
        fn load(&self, path: &Path, params: &LoadParams) -> std::result::Result<LoadedArtifact, LoadError> {
            self.calls.lock().unwrap().push((path.to_path_buf(), params.clone()));
            Ok(LoadedArtifact::new(path.to_path_buf()).with_footprint(1))
        }
    }

    fn setup() -> (TempDir, NodeContext, Arc<RecordingLoader>) {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(ResourceCache::new(CacheConfig::default()).unwrap());
        let paths = Arc::new(ModelPaths::new(temp.path()));
        let loader = Arc::new(RecordingLoader::default());
        for kind in ArtifactKind::ALL {
            cache.register_loader(kind, loader.clone());
        }
        (temp, NodeContext::new(cache, paths), loader)
    }

    fn place(ctx: &NodeContext, kind: ArtifactKind, name: &str, content: &[u8]) -> PathBuf {
        let path = ctx.paths().folder(kind).join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_unet_node_passes_dtype_and_reuses_entry() {
        let (_temp, ctx, loader) = setup();
        place(&ctx, ArtifactKind::Unet, "flux.safetensors", b"unet");
        let node = UnetLoaderNode::new(ctx.clone());
        let inputs = UnetInputs { unet_name: "flux.safetensors".to_string(), weight_dtype: "fp8_e4m3fn".to_string() };

        let first = node.invoke(&inputs).unwrap();
        first.release(ctx.cache());
        let second = node.invoke(&inputs).unwrap();

        assert!(first.handle.ptr_eq(&second.handle));
        let calls = loader.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.get_str("weight_dtype"), Some("fp8_e4m3fn"));
        assert_eq!(node.display_name(), "OnDemand UNET Loader");
    }

    #[test]
    fn test_invalid_enumerated_input() {
        let (_temp, ctx, loader) = setup();
        place(&ctx, ArtifactKind::Clip, "t5.safetensors", b"clip");
        let node = ClipLoaderNode::new(ctx);

        let err = node
            .invoke(&ClipInputs {
                clip_name: "t5.safetensors".to_string(),
                clip_type: "sd3".to_string(),
                device: "gpu7".to_string(),
            })
            .unwrap_err();

        assert!(matches!(err, CacheError::InvalidInput { ref name, .. } if name == "device"));
        assert!(loader.calls().is_empty());
    }

    #[test]
    fn test_missing_file() {
        let (_temp, ctx, _loader) = setup();
        let node = VaeLoaderNode::new(ctx);

        let err = node.invoke(&VaeInputs { vae_name: "gone.safetensors".to_string() }).unwrap_err();
        assert!(matches!(err, CacheError::FileMissing { kind: ArtifactKind::Vae, ref selector } if selector == "gone.safetensors"));
    }

    #[test]
    fn test_dual_clip_reloads_when_second_file_changes() {
        let (_temp, ctx, loader) = setup();
        let first = place(&ctx, ArtifactKind::DualClip, "clip_l.safetensors", b"l");
        let second = place(&ctx, ArtifactKind::DualClip, "t5xxl.safetensors", b"t5");
        let node = DualClipLoaderNode::new(ctx.clone());
        let inputs = DualClipInputs {
            clip_name1: "clip_l.safetensors".to_string(),
            clip_name2: "t5xxl.safetensors".to_string(),
            clip_type: "flux".to_string(),
            device: "default".to_string(),
        };

        node.invoke(&inputs).unwrap().release(ctx.cache());
        node.invoke(&inputs).unwrap().release(ctx.cache());
        assert_eq!(loader.calls().len(), 1);

        std::fs::write(&second, b"t5 v2, larger").unwrap();
        node.invoke(&inputs).unwrap();

        let calls = loader.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].0.ends_with("clip_l.safetensors"));
        assert_eq!(calls[1].1.get_str("pair"), Some(&*second.to_string_lossy()));
        assert!(first.exists());
    }

    #[test]
    fn test_lora_node_returns_strengths() {
        let (_temp, ctx, _loader) = setup();
        place(&ctx, ArtifactKind::Lora, "style/ink.safetensors", b"lora");
        let node = LoraLoaderNode::new(ctx);

        assert_eq!(node.choices(), vec!["style/ink.safetensors"]);
        let output = node
            .invoke(&LoraInputs { lora_name: "style/ink.safetensors".to_string(), strength_model: 0.8, strength_clip: 1.0 })
            .unwrap();
        assert_eq!(output.strengths, Some(LoraStrengths { model: 0.8, clip: 1.0 }));

        let err = node
            .invoke(&LoraInputs { lora_name: "style/ink.safetensors".to_string(), strength_model: f64::NAN, strength_clip: 1.0 })
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidInput { .. }));
    }

    #[test]
    fn test_model_patch_device_is_part_of_identity() {
        let (_temp, ctx, loader) = setup();
        place(&ctx, ArtifactKind::ModelPatch, "patch.safetensors", b"patch");
        let node = ModelPatchLoaderNode::new(ctx);

        for device in ["default", "cpu", "default"] {
            node.invoke(&ModelPatchInputs { name: "patch.safetensors".to_string(), device: device.to_string() })
                .unwrap();
        }
        assert_eq!(loader.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_liked_lora_uses_local_file() {
        let (temp, ctx, loader) = setup();
        place(&ctx, ArtifactKind::Lora, "grain_v2.safetensors", b"lora");
        let catalog_file = temp.path().join("liked.json");
        std::fs::write(
            &catalog_file,
            r#"{"items":[{"name":"Film Grain","creator":{"username":"lumen"},"modelVersions":[
                {"name":"v2","files":[{"type":"Model","name":"grain_v2.safetensors","downloadUrl":"","trainedWords":["grain"]}]}
            ]}]}"#,
        )
        .unwrap();
        let bridge = Arc::new(CatalogBridge::new(Arc::new(crate::catalog::FileCatalog::new(&catalog_file))));
        let node = LikedLoraLoaderNode::new(ctx, bridge, None);

        assert_eq!(node.choices().await.unwrap(), vec!["Film Grain"]);
        let output = node
            .invoke(&LikedLoraInputs { lora_name: "Film Grain".to_string(), strength_model: 1.0, strength_clip: 0.5 })
            .await
            .unwrap();

        assert_eq!(output.trigger_words, vec!["grain"]);
        assert_eq!(output.strengths, Some(LoraStrengths { model: 1.0, clip: 0.5 }));
        assert_eq!(loader.calls().len(), 1);
        assert_eq!(node.info("Film Grain").await.unwrap().author, "lumen");
    }

    #[tokio::test]
    async fn test_liked_lora_without_downloader_reports_missing_file() {
        let (temp, ctx, _loader) = setup();
        let catalog_file = temp.path().join("liked.json");
        std::fs::write(
            &catalog_file,
            r#"{"items":[{"name":"Film Grain","modelVersions":[{"name":"v2","files":[{"type":"Model","name":"grain_v2.safetensors"}]}]}]}"#,
        )
        .unwrap();
        let bridge = Arc::new(CatalogBridge::new(Arc::new(crate::catalog::FileCatalog::new(&catalog_file))));
        let node = LikedLoraLoaderNode::new(ctx, bridge, None);

        let err = node
            .invoke(&LikedLoraInputs { lora_name: "Film Grain".to_string(), strength_model: 1.0, strength_clip: 1.0 })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::FileMissing { kind: ArtifactKind::Lora, .. }));
    }
}
