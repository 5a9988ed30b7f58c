//! On-demand loading of generative-model artifacts.
//!
//! This crate keeps large model files (checkpoints, VAEs, text encoders,
//! LoRAs, ControlNets, GGUF weights, model patches) loaded between pipeline
//! executions and reloads them only when their file changes on disk.
//!
//! # Components
//!
//! - **Fingerprint service**: cheap file identity (size, mtime, optional SHA-256)
//! - **Loader registry**: one load/unload pair per artifact kind
//! - **Resource cache**: footprint-bounded LRU cache with single-flight loads
//! - **Loader nodes**: per-kind adapters invoked by the host pipeline
//! - **Catalog bridge**: resolves "liked" catalog entries to files, downloading them if needed

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod nodes;
pub mod paths;
pub mod registry;
pub mod runtime;

pub use cache::{
    CacheConfig, CacheConfigError, CacheKey, CacheStats, EntryInfo, InvalidateTarget, InvalidationPolicy,
    ResourceCache,
};
pub use catalog::{CatalogBridge, CatalogError, CatalogSource, FileCatalog, FileReference, HttpCatalog, LoraInfo};
pub use config::{ConfigError, OnDemandConfig, load_config, load_config_file};
pub use error::{CacheError, Result};
pub use fetch::{Downloader, FetchError};
pub use fingerprint::{Fingerprint, FingerprintMode, FingerprintService};
pub use nodes::{LoaderNode, NodeContext, NodeOutput};
pub use paths::ModelPaths;
pub use registry::{LoaderRegistration, LoaderRegistry};
pub use runtime::LoaderRuntime;

pub use ondemand_abstraction::{
    ArtifactKind, ArtifactLoader, FnLoader, Handle, LoadError, LoadParams, LoadedArtifact, ParamValue, Payload,
};
