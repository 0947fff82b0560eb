mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{card::CardSubcommand, config::ConfigSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cardwall",
    about = "File-backed kanban engine — move cards through the board under WIP and gate checks",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .project/ or .git/)
    #[arg(long, global = true, env = "CARDWALL_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a board in the current project
    Init,

    /// Validate the board configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Manage cards
    Card {
        #[command(subcommand)]
        subcommand: CardSubcommand,
    },

    /// Move a card to a new status
    Transition {
        selector: String,
        status: String,

        /// Explicit gate payload as JSON ({"worktrees": [...], "prs": [...]});
        /// omitted, the payload is derived from the card itself
        #[arg(long)]
        gates: Option<String>,
    },

    /// List cards across backlog and board
    Query {
        /// Only cards in this column
        #[arg(long)]
        column: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Card { subcommand } => cmd::card::run(&root, subcommand, cli.json),
        Commands::Transition {
            selector,
            status,
            gates,
        } => cmd::transition::run(&root, &selector, &status, gates.as_deref()),
        Commands::Query { column } => cmd::query::run(&root, column.as_deref()),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
