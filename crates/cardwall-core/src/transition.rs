use crate::config::BoardConfig;
use crate::error::{CardwallError, Result};
use crate::store::{self, Card, DoneRecord};
use crate::types::Status;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// TransitionOutcome
// ---------------------------------------------------------------------------

/// The record as it exists after the transition: still a card for board
/// targets, the scrubbed record for `done`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TransitionOutcome {
    Card(Card),
    Done(DoneRecord),
}

// ---------------------------------------------------------------------------
// Scrub
// ---------------------------------------------------------------------------

/// Collapse a card to its done-record shape. Defaulting happens here, not in
/// a constructor: `completed_at` falls back to the transition time and
/// `actual_cycles` to 0 when the card never carried them. Everything else —
/// `worktree` included — is dropped.
pub fn scrub(card: Card) -> DoneRecord {
    DoneRecord {
        sprint_id: card.sprint_id,
        title: card.title,
        pr_url: card.pr_url,
        completed_at: card.completed_at.unwrap_or_else(Utc::now),
        actual_cycles: card.actual_cycles.unwrap_or(0),
    }
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// Move the card identified by `selector` to `target`, rewriting the source
/// and destination partitions as a pair. All lookups complete before any
/// save, so a rejected transition leaves every partition untouched.
pub fn transition(
    config: &BoardConfig,
    root: &Path,
    selector: &str,
    target: Status,
) -> Result<TransitionOutcome> {
    if !target.is_transition_target() {
        return Err(CardwallError::UnsupportedStatus(target.to_string()));
    }

    let backlog_path = config.backlog_path(root);
    let board_path = config.board_path(root);
    let mut board = store::load_cards(&board_path)?;

    if target == Status::Done {
        let Some((idx, _)) = store::find(&board, selector) else {
            let backlog = store::load_cards(&backlog_path)?;
            return Err(if store::find(&backlog, selector).is_some() {
                CardwallError::CardNotOnBoard(selector.to_string())
            } else {
                CardwallError::CardNotFound(selector.to_string())
            });
        };
        let card = board.remove(idx);
        let record = scrub(card);
        let done_path = config.done_path(root);
        let mut done = store::load_done(&done_path)?;
        done.push(record.clone());
        store::save_cards(&board_path, &board)?;
        store::save_done(&done_path, &done)?;
        return Ok(TransitionOutcome::Done(record));
    }

    let mut backlog = store::load_cards(&backlog_path)?;
    if let Some((idx, _)) = store::find(&backlog, selector) {
        let mut card = backlog.remove(idx);
        card.status = target;
        // A board entry under the same selector is stale; the backlog copy
        // is authoritative for the move.
        board.retain(|c| c.selector() != Some(selector));
        board.push(card.clone());
        store::save_cards(&backlog_path, &backlog)?;
        store::save_cards(&board_path, &board)?;
        return Ok(TransitionOutcome::Card(card));
    }

    if let Some((idx, _)) = store::find(&board, selector) {
        board[idx].status = target;
        let card = board[idx].clone();
        store::save_cards(&board_path, &board)?;
        return Ok(TransitionOutcome::Card(card));
    }

    Err(CardwallError::CardNotFound(selector.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
