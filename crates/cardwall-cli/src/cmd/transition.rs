use crate::output::print_json;
use anyhow::Context;
use cardwall_core::{config::BoardConfig, dispatch::Engine, gate::GatePayload, paths, types::Status};
use std::path::Path;
use std::str::FromStr;

pub fn run(root: &Path, selector: &str, status: &str, gates: Option<&str>) -> anyhow::Result<()> {
    let target = Status::from_str(status).with_context(|| format!("unknown status: {status}"))?;
    let payload: Option<GatePayload> = gates
        .map(|g| serde_json::from_str(g).context("gate payload must be JSON with worktrees/prs"))
        .transpose()?;

    let config_path = paths::config_path(root);
    let config = BoardConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let engine = Engine::new(root, config);
    let response = engine
        .transition(selector, target, payload)
        .context("transition failed")?;
    print_json(&response)
}
