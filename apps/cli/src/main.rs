//! OnDemand CLI - operator tooling for the on-demand model loader
//!
//! This CLI provides an `odl` command for inspecting model folders, file
//! fingerprints and the liked catalog the loader nodes resolve against.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{CatalogCommand, CliContext, FingerprintModeArg, catalog, config, fingerprint, scan, warm};

/// OnDemand CLI - inspect what the on-demand loader nodes will load
#[derive(Parser, Debug)]
#[command(
    name = "odl",
    author,
    version,
    about = "OnDemand - on-demand loading of generative model files",
    long_about = "OnDemand (odl) inspects the model folders, file fingerprints and liked catalog used by the on-demand loader nodes."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Workspace directory (overrides ONDEMAND_WORKSPACE)
    #[arg(short = 'w', long, global = true)]
    workspace: Option<PathBuf>,

    /// Config file (defaults to <workspace>/.ondemand/config.toml)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fingerprint model files
    ///
    /// Prints the identity the cache uses to decide whether a file changed.
    Fingerprint {
        /// Files to fingerprint
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Fingerprint mode (defaults to the configured mode)
        #[arg(long, value_enum)]
        mode: Option<FingerprintModeArg>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List selectable model files
    ///
    /// Shows, per artifact kind, the selectors the loader nodes offer.
    Scan {
        /// Only this kind (checkpoint, unet, vae, clip, lora, ...)
        kind: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load files through the resource cache
    ///
    /// Reads each selected file into memory twice through the cache and
    /// reports the resulting statistics.
    Warm {
        /// Artifact kind
        kind: String,

        /// Selectors, relative to the kind's folder
        #[arg(required = true)]
        selectors: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Query the liked catalog
    #[command(subcommand)]
    Catalog(CatalogCommand),

    /// Show the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let ctx = CliContext::load(args.workspace, args.config)?;

    match args.command {
        Command::Fingerprint { paths, mode, json } => fingerprint::execute(&ctx, &paths, mode, json),
        Command::Scan { kind, json } => scan::execute(&ctx, kind.as_deref(), json),
        Command::Warm { kind, selectors, json } => warm::execute(&ctx, &kind, &selectors, json),
        Command::Catalog(command) => catalog::execute(&ctx, command).await,
        Command::Config { json } => config::execute(&ctx, json),
    }
}
