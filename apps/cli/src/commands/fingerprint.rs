//! Fingerprint command implementation.

use super::{CliContext, FingerprintModeArg, display_path};
use chrono::{DateTime, Utc};
use colored::Colorize;
use ondemand_models::{FingerprintMode, FingerprintService};
use serde_json::json;
use std::path::PathBuf;

/// Execute the fingerprint command.
///
/// Prints the identity the cache would store for each file. Files that cannot
/// be fingerprinted are reported and make the command fail after all paths
/// have been processed.
pub fn execute(
    ctx: &CliContext,
    paths: &[PathBuf],
    mode: Option<FingerprintModeArg>,
    json_output: bool,
) -> anyhow::Result<()> {
    let mode = mode.map_or(ctx.config.cache.fingerprint_mode, FingerprintMode::from);
    let service = FingerprintService::new(mode).with_ambiguity_window(ctx.config.cache.ambiguity_window());

    let mut failures = 0usize;
    let mut rows = Vec::with_capacity(paths.len());

    for path in paths {
        let absolute = if path.is_absolute() { path.clone() } else { ctx.workspace.join(path) };
        match service.capture(&absolute) {
            Ok(fp) => {
                let modified = fp.modified.map(|m| DateTime::<Utc>::from(m).to_rfc3339());
                if json_output {
                    rows.push(json!({
                        "path": absolute,
                        "size": fp.size,
                        "modified": modified,
                        "content_hash": fp.content_hash,
                    }));
                } else {
                    println!("{}", display_path(&ctx.workspace, &absolute).bold());
                    println!("  Size:     {} bytes", fp.size.to_string().green());
                    println!("  Modified: {}", modified.as_deref().unwrap_or("unknown").cyan());
                    if let Some(hash) = &fp.content_hash {
                        println!("  SHA-256:  {}", hash.dimmed());
                    }
                }
            }
            Err(e) => {
                failures += 1;
                if json_output {
                    rows.push(json!({ "path": absolute, "error": e.to_string() }));
                } else {
                    println!("{}", display_path(&ctx.workspace, &absolute).bold());
                    println!("  {}", e.to_string().red());
                }
            }
        }
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&json!({ "mode": mode, "files": rows }))?);
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} file(s) could not be fingerprinted", paths.len());
    }
    Ok(())
}
