use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Backlog,
    Planned,
    Active,
    Review,
    Done,
}

impl Status {
    pub fn all() -> &'static [Status] {
        &[
            Status::Backlog,
            Status::Planned,
            Status::Active,
            Status::Review,
            Status::Done,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Backlog => "backlog",
            Status::Planned => "planned",
            Status::Active => "active",
            Status::Review => "review",
            Status::Done => "done",
        }
    }

    /// Statuses a transition may target: anything board-side plus done.
    /// `backlog` is an origin, never a destination.
    pub fn is_transition_target(self) -> bool {
        !matches!(self, Status::Backlog)
    }

    /// Targets that require the gate pipeline before committing.
    pub fn is_gated(self) -> bool {
        matches!(self, Status::Review | Status::Done)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::CardwallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(Status::Backlog),
            "planned" => Ok(Status::Planned),
            "active" => Ok(Status::Active),
            "review" => Ok(Status::Review),
            "done" => Ok(Status::Done),
            _ => Err(crate::error::CardwallError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Kanban,
    Checklist,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Kanban => "kanban",
            Provider::Checklist => "checklist",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = crate::error::CardwallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kanban" => Ok(Provider::Kanban),
            "checklist" => Ok(Provider::Checklist),
            _ => Err(crate::error::CardwallError::InvalidProvider(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
