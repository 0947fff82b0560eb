use crate::error::Result;
use crate::store::Card;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Collaborator contracts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorktreeStatus {
    pub exists: bool,
    /// No uncommitted changes.
    pub clean: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrState {
    Open,
    Merged,
    Other(String),
}

impl PrState {
    pub fn from_provider(s: &str) -> Self {
        match s {
            "OPEN" => PrState::Open,
            "MERGED" => PrState::Merged,
            other => PrState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PrState::Open => "OPEN",
            PrState::Merged => "MERGED",
            PrState::Other(s) => s,
        }
    }

    pub fn is_acceptable(&self) -> bool {
        matches!(self, PrState::Open | PrState::Merged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrStatus {
    pub state: PrState,
    /// Local branch is pushed to the remote.
    pub pushed: bool,
    /// Local working tree has no uncommitted changes.
    pub clean: bool,
}

pub trait WorktreeChecker: Send + Sync {
    fn validate(&self, path: &Path) -> Result<WorktreeStatus>;
}

pub trait PrChecker: Send + Sync {
    fn validate(&self, url: &str, branch: &str, worktree: &Path) -> Result<PrStatus>;
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Gate inputs. Fields are optional on purpose: an item with missing fields
/// becomes a `MISSING_FIELDS` result, never a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatePayload {
    #[serde(default)]
    pub worktrees: Vec<WorktreeGate>,
    #[serde(default)]
    pub prs: Vec<PrGate>,
}

impl GatePayload {
    pub fn is_empty(&self) -> bool {
        self.worktrees.is_empty() && self.prs.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorktreeGate {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrGate {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Derive the minimal payload a review/done transition needs from the card
/// itself: its worktree (skipped when the path does not exist under `root`)
/// and its pull request. The worktree doubles as the branch name for the PR
/// check.
pub fn derive_payload(card: &Card, root: &Path) -> GatePayload {
    let mut payload = GatePayload::default();
    let worktree = card.worktree.as_deref().filter(|w| !w.is_empty());
    let worktree_dir = worktree.map(|w| root.join(w)).filter(|p| p.exists());

    if let Some(dir) = &worktree_dir {
        payload.worktrees.push(WorktreeGate {
            path: Some(dir.to_string_lossy().into_owned()),
        });
    }
    if let Some(url) = card.pr_url.as_deref().filter(|u| !u.is_empty()) {
        payload.prs.push(PrGate {
            url: Some(url.to_string()),
            branch: worktree.map(String::from),
            path: worktree_dir.map(|p| p.to_string_lossy().into_owned()),
        });
    }
    payload
}

/// The cheap precondition ahead of the gate runner: a card heading into
/// review/done must at least reference a pull request.
pub fn has_pr_reference(card: &Card) -> bool {
    card.pr_url.as_deref().is_some_and(|u| !u.is_empty())
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Worktree,
    Pr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateFailure {
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "DIRTY")]
    Dirty,
    #[serde(rename = "MISSING_FIELDS")]
    MissingFields,
    #[serde(rename = "PR.INVALID_STATE")]
    InvalidPrState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateItemResult {
    pub kind: GateKind,
    pub target: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GateFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GateItemResult {
    fn pass(kind: GateKind, target: String) -> Self {
        Self {
            kind,
            target,
            passed: true,
            error: None,
            message: None,
        }
    }

    fn fail(kind: GateKind, target: String, error: GateFailure, message: String) -> Self {
        Self {
            kind,
            target,
            passed: false,
            error: Some(error),
            message: Some(message),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReport {
    pub success: bool,
    pub results: Vec<GateItemResult>,
}

// ---------------------------------------------------------------------------
// GateRunner
// ---------------------------------------------------------------------------

pub struct GateRunner {
    worktrees: Arc<dyn WorktreeChecker>,
    prs: Arc<dyn PrChecker>,
}

impl GateRunner {
    pub fn new(worktrees: Arc<dyn WorktreeChecker>, prs: Arc<dyn PrChecker>) -> Self {
        Self { worktrees, prs }
    }

    /// Run every gate item as its own unit of work and join them all before
    /// aggregating. Items never throw: checker failures come back as data.
    /// An entirely empty payload is not a success — there was nothing to
    /// validate.
    pub async fn run(&self, payload: &GatePayload) -> GateReport {
        let mut handles = Vec::new();

        for gate in payload.worktrees.iter().cloned() {
            let checker = Arc::clone(&self.worktrees);
            handles.push(tokio::task::spawn_blocking(move || {
                check_worktree(checker.as_ref(), &gate)
            }));
        }
        for gate in payload.prs.iter().cloned() {
            let checker = Arc::clone(&self.prs);
            handles.push(tokio::task::spawn_blocking(move || {
                check_pr(checker.as_ref(), &gate)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => results.push(GateItemResult::fail(
                    GateKind::Worktree,
                    "<join>".to_string(),
                    GateFailure::NotFound,
                    format!("gate task failed to complete: {e}"),
                )),
            }
        }

        let success = !results.is_empty() && results.iter().all(|r| r.passed);
        GateReport { success, results }
    }

    /// Synchronous entry point for callers without a runtime of their own.
    pub fn run_blocking(&self, payload: &GatePayload) -> GateReport {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tokio::task::block_in_place(|| handle.block_on(self.run(payload)))
            }
            Err(_) => {
                let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
                rt.block_on(self.run(payload))
            }
        }
    }
}

fn check_worktree(checker: &dyn WorktreeChecker, gate: &WorktreeGate) -> GateItemResult {
    let Some(path) = gate.path.as_deref().filter(|p| !p.is_empty()) else {
        return GateItemResult::fail(
            GateKind::Worktree,
            "<unspecified>".to_string(),
            GateFailure::MissingFields,
            "worktree gate requires a path".to_string(),
        );
    };
    let target = path.to_string();
    match checker.validate(Path::new(path)) {
        Ok(status) if !status.exists => GateItemResult::fail(
            GateKind::Worktree,
            target,
            GateFailure::NotFound,
            "worktree path does not exist".to_string(),
        ),
        Ok(status) if !status.clean => GateItemResult::fail(
            GateKind::Worktree,
            target,
            GateFailure::Dirty,
            "worktree has uncommitted changes".to_string(),
        ),
        Ok(_) => GateItemResult::pass(GateKind::Worktree, target),
        Err(e) => GateItemResult::fail(
            GateKind::Worktree,
            target,
            GateFailure::NotFound,
            format!("worktree check failed: {e}"),
        ),
    }
}

fn check_pr(checker: &dyn PrChecker, gate: &PrGate) -> GateItemResult {
    let url = gate.url.as_deref().filter(|u| !u.is_empty());
    let branch = gate.branch.as_deref().filter(|b| !b.is_empty());
    let (Some(url), Some(branch)) = (url, branch) else {
        return GateItemResult::fail(
            GateKind::Pr,
            gate.url.clone().unwrap_or_else(|| "<unspecified>".to_string()),
            GateFailure::MissingFields,
            "pr gate requires url and branch".to_string(),
        );
    };
    let target = url.to_string();
    let worktree = gate
        .path
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    match checker.validate(url, branch, &worktree) {
        Ok(status) if !status.state.is_acceptable() => GateItemResult::fail(
            GateKind::Pr,
            target,
            GateFailure::InvalidPrState,
            format!(
                "pull request state is {} (need OPEN or MERGED)",
                status.state.as_str()
            ),
        ),
        Ok(status) if !status.pushed => GateItemResult::fail(
            GateKind::Pr,
            target,
            GateFailure::Dirty,
            format!("branch '{branch}' is not pushed to the remote"),
        ),
        Ok(status) if !status.clean => GateItemResult::fail(
            GateKind::Pr,
            target,
            GateFailure::Dirty,
            "worktree has uncommitted changes".to_string(),
        ),
        Ok(_) => GateItemResult::pass(GateKind::Pr, target),
        Err(e) => GateItemResult::fail(
            GateKind::Pr,
            target,
            GateFailure::InvalidPrState,
            format!("pr check failed: {e}"),
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
