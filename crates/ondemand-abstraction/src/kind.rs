//! Artifact kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The kind of artifact a loader produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Full checkpoint (model + CLIP + VAE).
    Checkpoint,
    /// Diffusion model weights.
    Unet,
    /// VAE.
    Vae,
    /// Single text encoder.
    Clip,
    /// Pair of text encoders loaded together.
    DualClip,
    /// CLIP vision encoder.
    ClipVision,
    /// GGUF-quantized diffusion model.
    Gguf,
    /// ControlNet.
    ControlNet,
    /// LoRA adapter.
    Lora,
    /// Small model patch.
    ModelPatch,
}

/// Error returned when parsing an unknown kind name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown artifact kind: {0}")]
pub struct UnknownKind(pub String);

impl ArtifactKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Checkpoint,
        Self::Unet,
        Self::Vae,
        Self::Clip,
        Self::DualClip,
        Self::ClipVision,
        Self::Gguf,
        Self::ControlNet,
        Self::Lora,
        Self::ModelPatch,
    ];

    /// Get the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkpoint => "checkpoint",
            Self::Unet => "unet",
            Self::Vae => "vae",
            Self::Clip => "clip",
            Self::DualClip => "dual_clip",
            Self::ClipVision => "clip_vision",
            Self::Gguf => "gguf",
            Self::ControlNet => "control_net",
            Self::Lora => "lora",
            Self::ModelPatch => "model_patch",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "checkpoint" | "ckpt" => Ok(Self::Checkpoint),
            "unet" | "diffusion_model" => Ok(Self::Unet),
            "vae" => Ok(Self::Vae),
            "clip" | "text_encoder" => Ok(Self::Clip),
            "dual_clip" | "dualclip" => Ok(Self::DualClip),
            "clip_vision" => Ok(Self::ClipVision),
            "gguf" => Ok(Self::Gguf),
            "control_net" | "controlnet" => Ok(Self::ControlNet),
            "lora" => Ok(Self::Lora),
            "model_patch" => Ok(Self::ModelPatch),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}
