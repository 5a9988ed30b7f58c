//! Warm command implementation.

use super::{CliContext, format_bytes, parse_kind};
use anyhow::Context;
use colored::Colorize;
use ondemand_models::{CacheKey, LoadedArtifact, LoaderRuntime};
use serde_json::json;
use std::time::Instant;
use tracing::debug;

/// Execute the warm command.
///
/// Starts a runtime whose loader for `kind` reads the whole file into memory,
/// then acquires every selector twice. The second pass should be served
/// entirely from the cache.
pub fn execute(ctx: &CliContext, kind: &str, selectors: &[String], json_output: bool) -> anyhow::Result<()> {
    let kind = parse_kind(kind)?;
    let runtime = LoaderRuntime::start(ctx.config.clone(), &ctx.workspace).context("Failed to start loader runtime")?;
    runtime.register_fn(
        kind,
        |path, _params| {
            let bytes = std::fs::read(path)?;
            let len = bytes.len() as u64;
            Ok(LoadedArtifact::new(bytes).with_footprint(len))
        },
        |_payload| {},
    );

    let mut keys = Vec::with_capacity(selectors.len());
    for selector in selectors {
        let path = runtime.paths().resolve(kind, selector)?;
        keys.push(CacheKey::plain(kind, path));
    }

    let mut passes = Vec::with_capacity(2);
    for pass in 1..=2 {
        let started = Instant::now();
        for key in &keys {
            let handle = runtime.cache().acquire(key).with_context(|| format!("Failed to load {key}"))?;
            runtime.cache().release(&handle);
        }
        let elapsed = started.elapsed();
        debug!(pass, elapsed_ms = elapsed.as_millis(), "Warm pass finished");
        passes.push(elapsed);
    }

    let stats = runtime.stats();
    let entries = runtime.cache().entries();
    runtime.shutdown();

    if json_output {
        let out = json!({
            "kind": kind,
            "passes_ms": passes.iter().map(|d| d.as_secs_f64() * 1000.0).collect::<Vec<_>>(),
            "stats": stats,
            "entries": entries,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", format!("Warmed {} {kind} file(s)", keys.len()).bold().cyan());
    for (i, elapsed) in passes.iter().enumerate() {
        println!("  Pass {}: {:.1} ms", i + 1, elapsed.as_secs_f64() * 1000.0);
    }
    println!();
    println!("{}", "Cache:".bold());
    println!("  Hits:      {}", stats.total_hits.to_string().green());
    println!("  Misses:    {}", stats.total_misses.to_string().yellow());
    println!("  Evictions: {}", stats.total_evictions);
    println!("  Used:      {} of {}", format_bytes(stats.used_bytes), format_bytes(stats.capacity_bytes));
    for entry in &entries {
        println!("  • {} ({})", entry.path.display(), format_bytes(entry.footprint).dimmed());
    }

    Ok(())
}
