use crate::output::{print_json, print_table};
use anyhow::Context;
use cardwall_core::{
    config::BoardConfig,
    dispatch::Engine,
    paths,
    store::{self, Card},
    types::Status,
};
use clap::Subcommand;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

#[derive(Subcommand)]
pub enum CardSubcommand {
    /// Create a new card (status `backlog` places it in the backlog)
    Create {
        #[arg(long)]
        worktree: Option<String>,
        #[arg(long)]
        sprint_id: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        pr_url: Option<String>,
        #[arg(long, default_value = "backlog")]
        status: String,
    },
    /// Show a card by selector
    Show { selector: String },
    /// List all cards across backlog and board
    List,
    /// Merge a JSON object of fields into a card (null removes a field)
    Update { selector: String, patch: String },
}

pub fn run(root: &Path, subcmd: CardSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        CardSubcommand::Create {
            worktree,
            sprint_id,
            title,
            pr_url,
            status,
        } => create(root, worktree, sprint_id, title, pr_url, &status),
        CardSubcommand::Show { selector } => show(root, &selector),
        CardSubcommand::List => list(root, json),
        CardSubcommand::Update { selector, patch } => update(root, &selector, &patch),
    }
}

fn load_config(root: &Path) -> anyhow::Result<BoardConfig> {
    let path = paths::config_path(root);
    BoardConfig::load(&path).with_context(|| format!("failed to load {}", path.display()))
}

fn create(
    root: &Path,
    worktree: Option<String>,
    sprint_id: Option<String>,
    title: Option<String>,
    pr_url: Option<String>,
    status: &str,
) -> anyhow::Result<()> {
    let status = Status::from_str(status).with_context(|| format!("unknown status: {status}"))?;
    let config = load_config(root)?;
    let card = Card {
        worktree,
        sprint_id,
        status,
        title,
        pr_url,
        completed_at: None,
        actual_cycles: None,
        extra: BTreeMap::new(),
    };

    let engine = Engine::new(root, config);
    let response = engine.create_card(card).context("create failed")?;
    print_json(&response)
}

fn show(root: &Path, selector: &str) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let mut cards = store::load_cards(&config.backlog_path(root)).context("failed to load backlog")?;
    cards.extend(store::load_cards(&config.board_path(root)).context("failed to load board")?);

    let Some((_, card)) = store::find(&cards, selector) else {
        anyhow::bail!("card '{selector}' not found");
    };
    print_json(card)
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let engine = Engine::new(root, config);
    let response = engine.query(None).context("query failed")?;

    if json || !response.success {
        return print_json(&response);
    }

    let empty = Vec::new();
    let cards = response
        .data
        .as_ref()
        .and_then(|d| d["cards"].as_array())
        .unwrap_or(&empty);
    if cards.is_empty() {
        println!("No cards yet.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = cards
        .iter()
        .map(|c| {
            vec![
                c["worktree"]
                    .as_str()
                    .or_else(|| c["sprint_id"].as_str())
                    .unwrap_or("")
                    .to_string(),
                c["status"].as_str().unwrap_or("").to_string(),
                c["title"].as_str().unwrap_or("").to_string(),
            ]
        })
        .collect();
    print_table(&["SELECTOR", "STATUS", "TITLE"], rows);
    Ok(())
}

fn update(root: &Path, selector: &str, patch: &str) -> anyhow::Result<()> {
    let patch: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(patch).context("patch must be a JSON object")?;
    let config = load_config(root)?;
    let engine = Engine::new(root, config);
    let response = engine.update_card(selector, &patch).context("update failed")?;
    print_json(&response)
}
