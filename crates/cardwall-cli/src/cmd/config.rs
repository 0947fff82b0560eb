use crate::output::print_json;
use anyhow::Context;
use cardwall_core::{config::BoardConfig, paths};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Parse the board config and report every validation issue
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Validate => validate(root, json),
    }
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let path = paths::config_path(root);
    let config = BoardConfig::parse(&path)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let issues = config.validate();

    if json {
        print_json(&serde_json::json!({
            "valid": issues.is_empty(),
            "issues": issues,
        }))?;
        return Ok(());
    }

    if issues.is_empty() {
        println!("Config is valid: {}", path.display());
    } else {
        println!("Config has {} issue(s):", issues.len());
        for issue in &issues {
            println!("  - {issue}");
        }
    }
    Ok(())
}
