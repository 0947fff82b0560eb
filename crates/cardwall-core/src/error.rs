use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CardwallError {
    #[error("invalid board config at {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("store file {path} is not a JSON array")]
    StoreNotArray { path: PathBuf },

    #[error("card not found: {0}")]
    CardNotFound(String),

    #[error("card '{0}' is not on the board: only board cards can be completed")]
    CardNotOnBoard(String),

    #[error("card already exists: {0}")]
    CardExists(String),

    #[error("card has no selector: set 'worktree' or 'sprint_id'")]
    MissingSelector,

    #[error("unsupported target status: {0}")]
    UnsupportedStatus(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid provider: {0}")]
    InvalidProvider(String),

    #[error("checker failed: {0}")]
    Checker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CardwallError>;
