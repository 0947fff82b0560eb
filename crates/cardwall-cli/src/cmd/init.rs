use anyhow::Context;
use cardwall_core::paths;
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"version: 1
board:
  backlog_path: .project/backlog.json
  board_path: .project/board.json
  done_path: .project/done.json
  provider: kanban
  wip:
    per_column: {}
  columns:
    - id: planned
      name: Planned
    - id: active
      name: Active
    - id: review
      name: Review
cards:
  fields:
    - id: title
      required: true
      type: string
    - id: pr_url
      required: false
      type: string
    - id: actual_cycles
      required: false
      type: number
  conventions:
    worktree_pattern: "{sprint}/{index}-{slot}"
    sprint_id_grammar: "S<n>-<slug>"
agents:
  transition: kanban-transition
  query: kanban-query
  checklist_fallback: checklist-fallback
"#;

fn write_if_missing(path: &Path, data: &str) -> anyhow::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(true)
}

pub fn run(root: &Path) -> anyhow::Result<()> {
    let config_path = paths::config_path(root);
    let wrote_config = write_if_missing(&config_path, DEFAULT_CONFIG)
        .context("failed to write board config")?;

    for partition in [paths::DEFAULT_BACKLOG, paths::DEFAULT_BOARD, paths::DEFAULT_DONE] {
        write_if_missing(&root.join(partition), "[]\n")
            .with_context(|| format!("failed to write {partition}"))?;
    }

    if wrote_config {
        println!("Initialized board: {}", config_path.display());
        println!("Next: cardwall card create --worktree <sprint>/<index>-<slot>");
    } else {
        println!("Board already initialized: {}", config_path.display());
    }
    Ok(())
}
