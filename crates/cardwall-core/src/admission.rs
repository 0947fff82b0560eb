use crate::store::{self, Card};
use crate::types::Status;
use serde::Serialize;

// ---------------------------------------------------------------------------
// AdmissionDecision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AdmissionDecision {
    Allow,
    Block {
        column: String,
        limit: i64,
        occupancy: usize,
    },
}

impl AdmissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allow)
    }
}

// ---------------------------------------------------------------------------
// WIP check
// ---------------------------------------------------------------------------

/// WIP admission check, run strictly before gates and any store mutation.
///
/// Blocks only when a limit is configured for the target column, the limit
/// is non-negative, the card is not already sitting at the target (idempotent
/// re-entry is never blocked), and occupancy has reached the limit. A limit
/// of `0` therefore freezes the column for newcomers, while an absent limit
/// disables the check entirely.
pub fn may_enter(
    board: &[Card],
    target: Status,
    limit: Option<i64>,
    selector: &str,
) -> AdmissionDecision {
    let Some(limit) = limit else {
        return AdmissionDecision::Allow;
    };
    if limit < 0 {
        return AdmissionDecision::Allow;
    }

    let already_in_target = store::find(board, selector)
        .map(|(_, card)| card.status == target)
        .unwrap_or(false);
    if already_in_target {
        return AdmissionDecision::Allow;
    }

    let occupancy = board.iter().filter(|c| c.status == target).count();
    if occupancy as i64 >= limit {
        AdmissionDecision::Block {
            column: target.to_string(),
            limit,
            occupancy,
        }
    } else {
        AdmissionDecision::Allow
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
