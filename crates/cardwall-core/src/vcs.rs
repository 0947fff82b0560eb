//! Git-backed gate collaborators.
//!
//! These are the thin, subprocess-driven implementations of the checker
//! contracts in [`crate::gate`]: worktree cleanliness via `git status
//! --porcelain`, branch push state via `git ls-remote`, and pull-request
//! state via the `gh` CLI. The full provider clients (GitHub, Azure DevOps)
//! stay outside this crate; a missing `gh` binary degrades to an
//! indeterminate PR state rather than an error.

use crate::error::{CardwallError, Result};
use crate::gate::{PrChecker, PrState, PrStatus, WorktreeChecker, WorktreeStatus};
use std::path::Path;
use std::process::{Command, Stdio};

pub fn git_available() -> bool {
    which::which("git").is_ok()
}

pub fn gh_available() -> bool {
    which::which("gh").is_ok()
}

fn run_git(dir: &Path, args: &[&str]) -> Result<std::process::Output> {
    Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| CardwallError::Checker(format!("failed to spawn git: {e}")))
}

fn stdout_text(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// ---------------------------------------------------------------------------
// GitWorktreeChecker
// ---------------------------------------------------------------------------

pub struct GitWorktreeChecker;

impl WorktreeChecker for GitWorktreeChecker {
    fn validate(&self, path: &Path) -> Result<WorktreeStatus> {
        if !path.exists() {
            return Ok(WorktreeStatus {
                exists: false,
                clean: false,
            });
        }
        if !git_available() {
            return Err(CardwallError::Checker("git binary not found".to_string()));
        }
        let output = run_git(path, &["status", "--porcelain"])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CardwallError::Checker(format!(
                "git status failed in {}: {}",
                path.display(),
                stderr.trim()
            )));
        }
        Ok(WorktreeStatus {
            exists: true,
            clean: stdout_text(&output).trim().is_empty(),
        })
    }
}

// ---------------------------------------------------------------------------
// GhPrChecker
// ---------------------------------------------------------------------------

pub struct GhPrChecker;

impl GhPrChecker {
    fn pr_state(&self, url: &str) -> Result<PrState> {
        if !gh_available() {
            return Ok(PrState::Other("UNKNOWN".to_string()));
        }
        let output = Command::new("gh")
            .args(["pr", "view", url, "--json", "state"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| CardwallError::Checker(format!("failed to spawn gh: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CardwallError::Checker(format!(
                "gh pr view failed for {url}: {}",
                stderr.trim()
            )));
        }
        let value: serde_json::Value = serde_json::from_str(&stdout_text(&output))?;
        let state = value["state"].as_str().unwrap_or("UNKNOWN");
        Ok(PrState::from_provider(state))
    }

    fn branch_pushed(&self, worktree: &Path, branch: &str) -> Result<bool> {
        let remote = run_git(worktree, &["ls-remote", "--heads", "origin", branch])?;
        if !remote.status.success() {
            let stderr = String::from_utf8_lossy(&remote.stderr);
            return Err(CardwallError::Checker(format!(
                "git ls-remote failed: {}",
                stderr.trim()
            )));
        }
        let remote_sha = stdout_text(&remote)
            .split_whitespace()
            .next()
            .map(String::from);
        let Some(remote_sha) = remote_sha else {
            return Ok(false);
        };
        let local = run_git(worktree, &["rev-parse", "HEAD"])?;
        if !local.status.success() {
            return Ok(false);
        }
        Ok(stdout_text(&local).trim() == remote_sha)
    }
}

impl PrChecker for GhPrChecker {
    fn validate(&self, url: &str, branch: &str, worktree: &Path) -> Result<PrStatus> {
        let state = self.pr_state(url)?;

        if !worktree.exists() || !git_available() {
            return Ok(PrStatus {
                state,
                pushed: false,
                clean: false,
            });
        }

        let pushed = self.branch_pushed(worktree, branch)?;
        let status = run_git(worktree, &["status", "--porcelain"])?;
        let clean = status.status.success() && stdout_text(&status).trim().is_empty();

        Ok(PrStatus { state, pushed, clean })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn detection_does_not_panic() {
        // Actual availability depends on the test environment.
        let _ = git_available();
        let _ = gh_available();
    }

    #[test]
    fn nonexistent_worktree_reports_missing() {
        let dir = TempDir::new().unwrap();
        let status = GitWorktreeChecker
            .validate(&dir.path().join("no-such-worktree"))
            .unwrap();
        assert!(!status.exists);
        assert!(!status.clean);
    }
}
