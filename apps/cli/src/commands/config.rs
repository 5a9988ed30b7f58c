//! Config command implementation.

use super::CliContext;
use colored::Colorize;

/// Execute the config command.
pub fn execute(ctx: &CliContext, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(&ctx.config)?);
        return Ok(());
    }

    match &ctx.config_path {
        Some(path) => println!("{} {}", "# Loaded from".dimmed(), path.display().to_string().dimmed()),
        None => println!("{}", "# Built-in defaults (no config file found)".dimmed()),
    }
    print!("{}", ctx.config.to_toml()?);
    Ok(())
}
