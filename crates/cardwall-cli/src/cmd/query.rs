use crate::output::print_json;
use anyhow::Context;
use cardwall_core::{config::BoardConfig, dispatch::Engine, paths, types::Status};
use std::path::Path;
use std::str::FromStr;

pub fn run(root: &Path, column: Option<&str>) -> anyhow::Result<()> {
    let column = column
        .map(|c| Status::from_str(c).with_context(|| format!("unknown column: {c}")))
        .transpose()?;

    let config_path = paths::config_path(root);
    let config = BoardConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let engine = Engine::new(root, config);
    let response = engine.query(column).context("query failed")?;
    print_json(&response)
}
