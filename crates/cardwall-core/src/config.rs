use crate::error::{CardwallError, Result};
use crate::types::Provider;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const SCHEMA_VERSION: i64 = 1;

// ---------------------------------------------------------------------------
// ColumnSpec / WipConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Per-column WIP caps. An absent entry disables the check for that column;
/// an entry of `0` is a real cap of zero (the column is frozen to new
/// entries). Limits are parsed as signed so that negative values surface as
/// a validation issue instead of a serde type error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WipConfig {
    #[serde(default)]
    pub per_column: BTreeMap<String, i64>,
}

// ---------------------------------------------------------------------------
// BoardSection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardSection {
    pub backlog_path: String,
    pub board_path: String,
    pub done_path: String,
    pub provider: Provider,
    #[serde(default)]
    pub wip: WipConfig,
    pub columns: Vec<ColumnSpec>,
}

// ---------------------------------------------------------------------------
// CardsSection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub id: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Conventions {
    pub worktree_pattern: String,
    pub sprint_id_grammar: String,
}

/// Card field declarations are descriptive metadata for the agents that
/// author cards; the engine never checks them against runtime card JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CardsSection {
    pub fields: Vec<FieldSpec>,
    pub conventions: Conventions,
}

// ---------------------------------------------------------------------------
// AgentsSection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist_fallback: Option<String>,
}

// ---------------------------------------------------------------------------
// BoardConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardConfig {
    pub version: i64,
    pub board: BoardSection,
    pub cards: CardsSection,
    #[serde(default)]
    pub agents: AgentsSection,
}

static ID_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_\-]*$").unwrap())
}

impl BoardConfig {
    /// Strict-parse the config document without running semantic validation.
    pub fn parse(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CardwallError::Config {
                path: path.to_path_buf(),
                message: "board config not found".to_string(),
            });
        }
        let data = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&data).map_err(|e| CardwallError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Parse and validate. Any collected issue is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let cfg = Self::parse(path)?;
        let issues = cfg.validate();
        if issues.is_empty() {
            Ok(cfg)
        } else {
            Err(CardwallError::Config {
                path: path.to_path_buf(),
                message: issues.join("; "),
            })
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.version != SCHEMA_VERSION {
            issues.push(format!(
                "unsupported config version {} (expected {SCHEMA_VERSION})",
                self.version
            ));
        }

        for (label, value) in [
            ("board.backlog_path", &self.board.backlog_path),
            ("board.board_path", &self.board.board_path),
            ("board.done_path", &self.board.done_path),
        ] {
            if value.trim().is_empty() {
                issues.push(format!("{label} must not be empty"));
            }
        }

        // Column ids: non-empty identifiers, unique.
        let mut seen_columns = HashSet::new();
        for col in &self.board.columns {
            if col.id.is_empty() || !id_re().is_match(&col.id) {
                issues.push(format!("invalid column id '{}'", col.id));
            }
            if !seen_columns.insert(col.id.as_str()) {
                issues.push(format!("duplicate column id '{}'", col.id));
            }
        }

        // WIP limits: non-negative, keyed by a declared column.
        for (column, limit) in &self.board.wip.per_column {
            if *limit < 0 {
                issues.push(format!(
                    "wip.per_column.{column} is negative ({limit})"
                ));
            }
            if !seen_columns.contains(column.as_str()) {
                issues.push(format!(
                    "wip.per_column.{column} references an undeclared column"
                ));
            }
        }

        // Card field ids: non-empty identifiers, unique.
        let mut seen_fields = HashSet::new();
        for field in &self.cards.fields {
            if field.id.is_empty() || !id_re().is_match(&field.id) {
                issues.push(format!("invalid card field id '{}'", field.id));
            }
            if !seen_fields.insert(field.id.as_str()) {
                issues.push(format!("duplicate card field id '{}'", field.id));
            }
        }

        for (label, value) in [
            (
                "cards.conventions.worktree_pattern",
                &self.cards.conventions.worktree_pattern,
            ),
            (
                "cards.conventions.sprint_id_grammar",
                &self.cards.conventions.sprint_id_grammar,
            ),
        ] {
            if value.trim().is_empty() {
                issues.push(format!("{label} must not be empty"));
            }
        }

        for (label, value) in [
            ("agents.transition", &self.agents.transition),
            ("agents.query", &self.agents.query),
            ("agents.checklist_fallback", &self.agents.checklist_fallback),
        ] {
            if let Some(v) = value {
                if v.trim().is_empty() {
                    issues.push(format!("{label} must not be empty"));
                }
            }
        }

        // Provider/agent cross-field invariant runs only once the field-level
        // checks are clean.
        if issues.is_empty() {
            match self.board.provider {
                Provider::Kanban => {
                    if self.agents.transition.is_none() {
                        issues.push(
                            "provider 'kanban' requires agents.transition".to_string(),
                        );
                    }
                    if self.agents.query.is_none() {
                        issues.push("provider 'kanban' requires agents.query".to_string());
                    }
                }
                Provider::Checklist => {
                    if self.agents.checklist_fallback.is_none() {
                        issues.push(
                            "provider 'checklist' requires agents.checklist_fallback"
                                .to_string(),
                        );
                    }
                }
            }
        }

        issues
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn backlog_path(&self, root: &Path) -> PathBuf {
        root.join(&self.board.backlog_path)
    }

    pub fn board_path(&self, root: &Path) -> PathBuf {
        root.join(&self.board.board_path)
    }

    pub fn done_path(&self, root: &Path) -> PathBuf {
        root.join(&self.board.done_path)
    }

    /// The configured WIP cap for a column, or `None` when no cap applies.
    pub fn limit_for(&self, column: &str) -> Option<i64> {
        self.board.wip.per_column.get(column).copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
