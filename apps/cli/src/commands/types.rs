//! Command type definitions shared between main.rs and the commands.

use clap::{Subcommand, ValueEnum};
use ondemand_models::FingerprintMode;

#[derive(Subcommand, Debug, Clone)]
pub enum CatalogCommand {
    /// List liked entries and their usable versions
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show which file a liked entry resolves to
    Resolve {
        /// Display name of the liked entry
        name: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show author and trigger words of a liked entry
    Info {
        /// Display name of the liked entry
        name: String,
    },

    /// Download a liked entry's file into the LoRA folder
    Fetch {
        /// Display name of the liked entry
        name: String,
    },
}

/// Fingerprint modes accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintModeArg {
    /// Size and modification time
    Metadata,
    /// Full SHA-256 of the content
    ContentHash,
    /// Hash only recently modified files
    Adaptive,
}

impl From<FingerprintModeArg> for FingerprintMode {
    fn from(mode: FingerprintModeArg) -> Self {
        match mode {
            FingerprintModeArg::Metadata => Self::Metadata,
            FingerprintModeArg::ContentHash => Self::ContentHash,
            FingerprintModeArg::Adaptive => Self::Adaptive,
        }
    }
}
