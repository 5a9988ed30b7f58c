//! Scan command implementation.

use super::{CliContext, parse_kind};
use colored::Colorize;
use ondemand_models::ArtifactKind;
use serde_json::{Map, Value};

/// Execute the scan command.
///
/// Lists the selectors each loader node would offer, per kind.
pub fn execute(ctx: &CliContext, kind: Option<&str>, json_output: bool) -> anyhow::Result<()> {
    let paths = ctx.model_paths()?;
    let kinds = match kind {
        Some(kind) => vec![parse_kind(kind)?],
        None => ArtifactKind::ALL.to_vec(),
    };

    if json_output {
        let mut out = Map::new();
        for kind in kinds {
            out.insert(kind.to_string(), Value::from(paths.list(kind)));
        }
        println!("{}", serde_json::to_string_pretty(&Value::Object(out))?);
        return Ok(());
    }

    println!("{}", "Model folders".bold().cyan());
    println!("  Root: {}", paths.root().display().to_string().green());
    println!();

    for kind in kinds {
        let folder = paths.folder(kind);
        let selectors = paths.list(kind);
        println!("{} {}", format!("{kind}:").bold(), folder.display().to_string().dimmed());
        if selectors.is_empty() {
            println!("  {}", "No files".yellow());
        }
        for selector in &selectors {
            println!("  • {selector}");
        }
        println!();
    }

    Ok(())
}
