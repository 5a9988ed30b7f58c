//! Catalog command implementation.

use super::{CatalogCommand, CliContext};
use anyhow::Context;
use colored::Colorize;
use ondemand_models::{ArtifactKind, CatalogBridge, Downloader};

/// Execute a catalog subcommand.
pub async fn execute(ctx: &CliContext, command: CatalogCommand) -> anyhow::Result<()> {
    let source = ctx.config.catalog.source(&ctx.workspace).context("Invalid [catalog] configuration")?;
    let bridge = CatalogBridge::new(source);

    match command {
        CatalogCommand::List { json } => list(&bridge, json).await,
        CatalogCommand::Resolve { name, json } => resolve(&bridge, &name, json).await,
        CatalogCommand::Info { name } => info(&bridge, &name).await,
        CatalogCommand::Fetch { name } => fetch(ctx, &bridge, &name).await,
    }
}

async fn list(bridge: &CatalogBridge, json_output: bool) -> anyhow::Result<()> {
    let models = bridge.liked_models().await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    if models.is_empty() {
        println!("{}", "No liked entries".yellow());
        return Ok(());
    }

    println!("{}", format!("Liked entries ({})", models.len()).bold().cyan());
    for model in &models {
        println!();
        println!("{} {}", model.model_name.bold(), format!("by {}", model.model_creator).dimmed());
        if model.versions.is_empty() {
            println!("  {}", "No version with a model file".yellow());
        }
        for version in &model.versions {
            println!("  • {} [{}] {}", version.name, version.base_model.cyan(), version.file_name.dimmed());
        }
    }
    Ok(())
}

async fn resolve(bridge: &CatalogBridge, name: &str, json_output: bool) -> anyhow::Result<()> {
    let reference = bridge.resolve_liked(name).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&reference)?);
        return Ok(());
    }

    println!("{}", reference.display_name.bold());
    println!("  Version: {}", reference.version.name.green());
    println!("  File:    {}", reference.file_name());
    println!("  URL:     {}", reference.download_url().dimmed());
    Ok(())
}

async fn info(bridge: &CatalogBridge, name: &str) -> anyhow::Result<()> {
    let info = bridge.lora_info(name).await?;
    println!("Author: {}", info.author);
    if info.trigger_words.is_empty() {
        println!("Trigger words: {}", "none".dimmed());
    } else {
        println!("Trigger words: {}", info.trigger_words.join(", ").green());
    }
    Ok(())
}

async fn fetch(ctx: &CliContext, bridge: &CatalogBridge, name: &str) -> anyhow::Result<()> {
    let reference = bridge.resolve_liked(name).await?;
    let folder = ctx.model_paths()?.folder(ArtifactKind::Lora);
    let downloader = Downloader::new(ctx.config.catalog.api_key(), ctx.config.catalog.timeout())?;

    let path = downloader
        .ensure_local(&reference, &folder)
        .await
        .with_context(|| format!("Failed to fetch '{name}'"))?;
    println!("{} {}", "✓".green(), path.display());
    Ok(())
}
