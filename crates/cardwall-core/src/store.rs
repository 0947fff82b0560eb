use crate::error::{CardwallError, Result};
use crate::types::Status;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

// ---------------------------------------------------------------------------
// Card
// ---------------------------------------------------------------------------

/// A work item. The engine reasons about the typed fields below; everything
/// else an agent puts on a card (prompts, estimates, links) rides along in
/// `extra` untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_id: Option<String>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_cycles: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.is_empty())
}

impl Card {
    /// The card's identity: `worktree` wins over `sprint_id`, first
    /// non-empty value.
    pub fn selector(&self) -> Option<&str> {
        non_empty(self.worktree.as_deref()).or_else(|| non_empty(self.sprint_id.as_deref()))
    }
}

// ---------------------------------------------------------------------------
// DoneRecord
// ---------------------------------------------------------------------------

/// The scrubbed shape a card takes on completion. Every field serializes
/// unconditionally so done records always carry exactly this key set —
/// notably, no `worktree`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoneRecord {
    pub sprint_id: Option<String>,
    pub title: Option<String>,
    pub pr_url: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub actual_cycles: u32,
}

// ---------------------------------------------------------------------------
// Partition I/O
// ---------------------------------------------------------------------------

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting partition files.
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_str(&data)?;
    if !value.is_array() {
        return Err(CardwallError::StoreNotArray {
            path: path.to_path_buf(),
        });
    }
    Ok(serde_json::from_value(value)?)
}

/// Serialization goes through `serde_json::Value`, whose object maps are
/// BTreeMap-backed: keys come out sorted, so re-saving unchanged data is
/// byte-identical and downstream diff tooling stays quiet.
fn save<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let value = serde_json::to_value(items)?;
    let mut data = serde_json::to_string_pretty(&value)?;
    data.push('\n');
    atomic_write(path, data.as_bytes())
}

pub fn load_cards(path: &Path) -> Result<Vec<Card>> {
    load(path)
}

pub fn save_cards(path: &Path, cards: &[Card]) -> Result<()> {
    save(path, cards)
}

pub fn load_done(path: &Path) -> Result<Vec<DoneRecord>> {
    load(path)
}

pub fn save_done(path: &Path, records: &[DoneRecord]) -> Result<()> {
    save(path, records)
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// The sole lookup primitive: every mutator resolves cards through this.
pub fn find<'a>(cards: &'a [Card], selector: &str) -> Option<(usize, &'a Card)> {
    cards
        .iter()
        .enumerate()
        .find(|(_, c)| c.selector() == Some(selector))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
