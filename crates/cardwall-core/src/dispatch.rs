use crate::admission::{self, AdmissionDecision};
use crate::config::BoardConfig;
use crate::error::{CardwallError, Result};
use crate::gate::{self, GatePayload, GateRunner, PrChecker, WorktreeChecker};
use crate::response::{codes, ErrorBody, Response};
use crate::store::{self, Card};
use crate::types::{Provider, Status};
use crate::vcs::{GhPrChecker, GitWorktreeChecker};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The outermost layer: inspects the configured provider and either walks a
/// request through admission → PR precheck → gates → transition, or returns
/// the checklist advisory without touching any store.
///
/// Domain failures come back as `Response` envelopes; only configuration and
/// store I/O faults surface as `Err`.
pub struct Engine {
    root: PathBuf,
    config: BoardConfig,
    gates: GateRunner,
}

impl Engine {
    pub fn new(root: impl Into<PathBuf>, config: BoardConfig) -> Self {
        Self::with_checkers(root, config, Arc::new(GitWorktreeChecker), Arc::new(GhPrChecker))
    }

    pub fn with_checkers(
        root: impl Into<PathBuf>,
        config: BoardConfig,
        worktrees: Arc<dyn WorktreeChecker>,
        prs: Arc<dyn PrChecker>,
    ) -> Self {
        Self {
            root: root.into(),
            config,
            gates: GateRunner::new(worktrees, prs),
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // -----------------------------------------------------------------------
    // Provider dispatch
    // -----------------------------------------------------------------------

    fn checklist_advisory(&self) -> Response {
        let agent = self
            .config
            .agents
            .checklist_fallback
            .as_deref()
            .unwrap_or("checklist-fallback");
        Response::fail(
            ErrorBody::new(
                codes::PROVIDER_CHECKLIST,
                "board provider is 'checklist'; kanban operations do not apply",
                true,
            )
            .with_action(format!("route this request to the '{agent}' agent")),
        )
    }

    // -----------------------------------------------------------------------
    // Transition
    // -----------------------------------------------------------------------

    pub fn transition(
        &self,
        selector: &str,
        target: Status,
        payload: Option<GatePayload>,
    ) -> Result<Response> {
        if self.config.board.provider == Provider::Checklist {
            return Ok(self.checklist_advisory());
        }

        let board = store::load_cards(&self.config.board_path(&self.root))?;

        // Admission runs strictly first; a WIP rejection has zero side
        // effects.
        let decision = admission::may_enter(
            &board,
            target,
            self.config.limit_for(target.as_str()),
            selector,
        );
        if let AdmissionDecision::Block {
            column,
            limit,
            occupancy,
        } = &decision
        {
            return Ok(Response::fail(
                ErrorBody::new(
                    codes::GATE_WIP,
                    format!("column '{column}' is at its WIP limit ({occupancy}/{limit})"),
                    true,
                )
                .with_action("retry once capacity frees up or pick a different card")
                .with_details(serde_json::to_value(&decision)?),
            ));
        }

        if target.is_gated() {
            let backlog = store::load_cards(&self.config.backlog_path(&self.root))?;
            let Some(card) = store::find(&board, selector)
                .or_else(|| store::find(&backlog, selector))
                .map(|(_, c)| c.clone())
            else {
                return self.envelope_for(CardwallError::CardNotFound(selector.to_string()));
            };

            let payload = match payload {
                Some(p) => p,
                None => {
                    if !gate::has_pr_reference(&card) {
                        return Ok(Response::fail(
                            ErrorBody::new(
                                codes::GATE_PR_REQUIRED,
                                format!(
                                    "card '{selector}' has no pr_url; a pull request is \
                                     required before '{target}'"
                                ),
                                true,
                            )
                            .with_action("open a pull request and set pr_url on the card"),
                        ));
                    }
                    gate::derive_payload(&card, &self.root)
                }
            };

            let report = self.gates.run_blocking(&payload);
            if !report.success {
                let failed = report.results.iter().filter(|r| !r.passed).count();
                let message = if report.results.is_empty() {
                    "no gate inputs to validate".to_string()
                } else {
                    format!("{failed} of {} gate checks failed", report.results.len())
                };
                return Ok(Response::fail(
                    ErrorBody::new(codes::GATE_FAILURES, message, true)
                        .with_action("fix the failing checks and retry")
                        .with_details(serde_json::to_value(&report.results)?),
                ));
            }
        }

        match crate::transition::transition(&self.config, &self.root, selector, target) {
            Ok(outcome) => Ok(Response::ok(serde_json::to_value(&outcome)?)),
            Err(e) => self.envelope_for(e),
        }
    }

    // -----------------------------------------------------------------------
    // Query / create / update
    // -----------------------------------------------------------------------

    pub fn query(&self, column: Option<Status>) -> Result<Response> {
        if self.config.board.provider == Provider::Checklist {
            return Ok(self.checklist_advisory());
        }

        let mut cards = store::load_cards(&self.config.backlog_path(&self.root))?;
        cards.extend(store::load_cards(&self.config.board_path(&self.root))?);
        if let Some(status) = column {
            cards.retain(|c| c.status == status);
        }
        Ok(Response::ok(serde_json::json!({
            "count": cards.len(),
            "cards": serde_json::to_value(&cards)?,
        })))
    }

    /// Place a new card into the partition its status selects: `backlog`
    /// cards land in the backlog, anything else on the board.
    pub fn create_card(&self, card: Card) -> Result<Response> {
        if self.config.board.provider == Provider::Checklist {
            return Ok(self.checklist_advisory());
        }

        let Some(selector) = card.selector().map(String::from) else {
            return self.envelope_for(CardwallError::MissingSelector);
        };

        let backlog_path = self.config.backlog_path(&self.root);
        let board_path = self.config.board_path(&self.root);
        let mut backlog = store::load_cards(&backlog_path)?;
        let mut board = store::load_cards(&board_path)?;

        if store::find(&backlog, &selector).is_some() || store::find(&board, &selector).is_some() {
            return self.envelope_for(CardwallError::CardExists(selector));
        }

        let data = serde_json::to_value(&card)?;
        if card.status == Status::Backlog {
            backlog.push(card);
            store::save_cards(&backlog_path, &backlog)?;
        } else {
            board.push(card);
            store::save_cards(&board_path, &board)?;
        }
        Ok(Response::ok(data))
    }

    /// Merge non-status fields into the card wherever it lives. Status moves
    /// only through `transition`.
    pub fn update_card(
        &self,
        selector: &str,
        patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Response> {
        if self.config.board.provider == Provider::Checklist {
            return Ok(self.checklist_advisory());
        }

        if patch.contains_key("status") {
            return Ok(Response::fail(ErrorBody::new(
                codes::STATUS_UNSUPPORTED,
                "status cannot be updated directly; use a transition",
                false,
            )));
        }

        let backlog_path = self.config.backlog_path(&self.root);
        let board_path = self.config.board_path(&self.root);
        let mut backlog = store::load_cards(&backlog_path)?;
        let mut board = store::load_cards(&board_path)?;

        if let Some((idx, _)) = store::find(&backlog, selector) {
            let value = apply_patch(&mut backlog, idx, patch)?;
            store::save_cards(&backlog_path, &backlog)?;
            return Ok(Response::ok(value));
        }
        if let Some((idx, _)) = store::find(&board, selector) {
            let value = apply_patch(&mut board, idx, patch)?;
            store::save_cards(&board_path, &board)?;
            return Ok(Response::ok(value));
        }
        self.envelope_for(CardwallError::CardNotFound(selector.to_string()))
    }

    // -----------------------------------------------------------------------
    // Error conversion
    // -----------------------------------------------------------------------

    /// Convert control-flow errors into envelopes at the public boundary.
    /// Anything that is not a domain failure stays an `Err`.
    fn envelope_for(&self, err: CardwallError) -> Result<Response> {
        let code = match &err {
            CardwallError::CardNotFound(_) => codes::CARD_NOT_FOUND,
            CardwallError::CardNotOnBoard(_) => codes::CARD_NOT_ON_BOARD,
            CardwallError::UnsupportedStatus(_) => codes::STATUS_UNSUPPORTED,
            CardwallError::CardExists(_) => codes::CARD_EXISTS,
            CardwallError::MissingSelector => codes::CARD_INVALID,
            _ => return Err(err),
        };
        Ok(Response::fail(ErrorBody::new(code, err.to_string(), false)))
    }
}

/// Merge patch keys into the card at `idx`, rewriting it in place. A `null`
/// value removes the field. The merged card re-parses through the Card type,
/// so structural violations surface instead of landing in the store.
fn apply_patch(
    cards: &mut [Card],
    idx: usize,
    patch: &serde_json::Map<String, serde_json::Value>,
) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(&cards[idx])?;
    if let Some(object) = value.as_object_mut() {
        for (key, v) in patch {
            if v.is_null() {
                object.remove(key);
            } else {
                object.insert(key.clone(), v.clone());
            }
        }
    }
    cards[idx] = serde_json::from_value(value.clone())?;
    Ok(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AgentsSection, BoardSection, CardsSection, ColumnSpec, Conventions, FieldSpec, WipConfig,
    };
    use crate::error::Result;
    use crate::gate::{PrState, PrStatus, WorktreeStatus};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    struct PassingWorktrees;

    impl WorktreeChecker for PassingWorktrees {
        fn validate(&self, _path: &Path) -> Result<WorktreeStatus> {
            Ok(WorktreeStatus { exists: true, clean: true })
        }
    }

    struct PassingPrs;

    impl PrChecker for PassingPrs {
        fn validate(&self, _url: &str, _branch: &str, _worktree: &Path) -> Result<PrStatus> {
            Ok(PrStatus { state: PrState::Open, pushed: true, clean: true })
        }
    }

    struct DirtyPrs;

    impl PrChecker for DirtyPrs {
        fn validate(&self, _url: &str, _branch: &str, _worktree: &Path) -> Result<PrStatus> {
            Ok(PrStatus { state: PrState::Open, pushed: true, clean: false })
        }
    }

    fn test_config(provider: Provider, wip: &[(&str, i64)]) -> BoardConfig {
        BoardConfig {
            version: 1,
            board: BoardSection {
                backlog_path: "backlog.json".to_string(),
                board_path: "board.json".to_string(),
                done_path: "done.json".to_string(),
                provider,
                wip: WipConfig {
                    per_column: wip
                        .iter()
                        .map(|(k, v)| (k.to_string(), *v))
                        .collect(),
                },
                columns: vec![
                    ColumnSpec { id: "planned".to_string(), name: None },
                    ColumnSpec { id: "active".to_string(), name: None },
                    ColumnSpec { id: "review".to_string(), name: None },
                ],
            },
            cards: CardsSection {
                fields: vec![FieldSpec {
                    id: "title".to_string(),
                    required: true,
                    field_type: None,
                }],
                conventions: Conventions {
                    worktree_pattern: "{sprint}/{index}-{slot}".to_string(),
                    sprint_id_grammar: "S<n>-<slug>".to_string(),
                },
            },
            agents: AgentsSection {
                transition: Some("kanban-transition".to_string()),
                query: Some("kanban-query".to_string()),
                checklist_fallback: Some("checklist-fallback".to_string()),
            },
        }
    }

    fn engine(root: &Path, config: BoardConfig) -> Engine {
        Engine::with_checkers(root, config, Arc::new(PassingWorktrees), Arc::new(PassingPrs))
    }

    fn card(worktree: &str, status: Status, pr_url: Option<&str>) -> Card {
        Card {
            worktree: Some(worktree.to_string()),
            sprint_id: None,
            status,
            title: None,
            pr_url: pr_url.map(String::from),
            completed_at: None,
            actual_cycles: None,
            extra: BTreeMap::new(),
        }
    }

    fn seed(root: &Path, config: &BoardConfig, backlog: &[Card], board: &[Card]) {
        store::save_cards(&config.backlog_path(root), backlog).unwrap();
        store::save_cards(&config.board_path(root), board).unwrap();
        store::save_done(&config.done_path(root), &[]).unwrap();
    }

    fn partition_bytes(root: &Path, config: &BoardConfig) -> Vec<Vec<u8>> {
        [
            config.backlog_path(root),
            config.board_path(root),
            config.done_path(root),
        ]
        .iter()
        .map(|p| std::fs::read(p).unwrap())
        .collect()
    }

    #[test]
    fn checklist_provider_returns_advisory_and_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Checklist, &[]);
        seed(dir.path(), &cfg, &[card("main/1-1", Status::Backlog, None)], &[]);
        let before = partition_bytes(dir.path(), &cfg);

        let eng = engine(dir.path(), cfg.clone());
        let resp = eng.transition("main/1-1", Status::Planned, None).unwrap();
        assert!(!resp.success);
        let err = resp.error.unwrap();
        assert_eq!(err.code, codes::PROVIDER_CHECKLIST);
        assert!(err.recoverable);
        assert!(err.suggested_action.unwrap().contains("checklist-fallback"));

        assert_eq!(partition_bytes(dir.path(), &cfg), before);

        // Query and create are advisory too.
        assert_eq!(
            eng.query(None).unwrap().error_code(),
            Some(codes::PROVIDER_CHECKLIST)
        );
        assert_eq!(
            eng.create_card(card("main/2-2", Status::Backlog, None))
                .unwrap()
                .error_code(),
            Some(codes::PROVIDER_CHECKLIST)
        );
        assert_eq!(partition_bytes(dir.path(), &cfg), before);
    }

    #[test]
    fn wip_boundary_blocks_second_card_but_not_reentry() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Kanban, &[("active", 1)]);
        seed(
            dir.path(),
            &cfg,
            &[],
            &[
                card("main/1-1", Status::Active, None),
                card("main/2-2", Status::Planned, None),
            ],
        );
        let eng = engine(dir.path(), cfg.clone());

        let resp = eng.transition("main/2-2", Status::Active, None).unwrap();
        assert_eq!(resp.error_code(), Some(codes::GATE_WIP));

        let resp = eng.transition("main/1-1", Status::Active, None).unwrap();
        assert!(resp.success);
    }

    #[test]
    fn wip_rejection_has_zero_side_effects() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Kanban, &[("active", 1)]);
        seed(
            dir.path(),
            &cfg,
            &[card("main/2-2", Status::Backlog, None)],
            &[card("main/1-1", Status::Active, None)],
        );
        let before = partition_bytes(dir.path(), &cfg);

        let eng = engine(dir.path(), cfg.clone());
        let resp = eng.transition("main/2-2", Status::Active, None).unwrap();
        assert_eq!(resp.error_code(), Some(codes::GATE_WIP));
        assert_eq!(partition_bytes(dir.path(), &cfg), before);
    }

    #[test]
    fn zero_limit_freezes_column() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Kanban, &[("review", 0)]);
        seed(dir.path(), &cfg, &[], &[card("main/1-1", Status::Active, None)]);
        let eng = engine(dir.path(), cfg);

        let resp = eng.transition("main/1-1", Status::Review, None).unwrap();
        assert_eq!(resp.error_code(), Some(codes::GATE_WIP));
    }

    #[test]
    fn review_without_pr_url_requires_pull_request() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Kanban, &[]);
        seed(dir.path(), &cfg, &[], &[card("main/1-1", Status::Active, None)]);
        let before = partition_bytes(dir.path(), &cfg);

        let eng = engine(dir.path(), cfg.clone());
        let resp = eng.transition("main/1-1", Status::Review, None).unwrap();
        assert_eq!(resp.error_code(), Some(codes::GATE_PR_REQUIRED));
        assert_eq!(partition_bytes(dir.path(), &cfg), before);
    }

    #[test]
    fn gate_failure_leaves_partitions_byte_identical() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Kanban, &[]);
        seed(
            dir.path(),
            &cfg,
            &[],
            &[card("main/1-1", Status::Active, Some("https://example/pr/1"))],
        );
        let before = partition_bytes(dir.path(), &cfg);

        let eng = Engine::with_checkers(
            dir.path(),
            cfg.clone(),
            Arc::new(PassingWorktrees),
            Arc::new(DirtyPrs),
        );
        let resp = eng.transition("main/1-1", Status::Review, None).unwrap();
        assert_eq!(resp.error_code(), Some(codes::GATE_FAILURES));
        let details = resp.error.unwrap().details.unwrap();
        assert_eq!(details[0]["error"], "DIRTY");

        assert_eq!(partition_bytes(dir.path(), &cfg), before);
    }

    #[test]
    fn ungated_targets_skip_gates_entirely() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Kanban, &[]);
        // No pr_url anywhere: planned/active must still work.
        seed(dir.path(), &cfg, &[card("main/1-1", Status::Backlog, None)], &[]);
        let eng = engine(dir.path(), cfg);

        assert!(eng.transition("main/1-1", Status::Planned, None).unwrap().success);
        assert!(eng.transition("main/1-1", Status::Active, None).unwrap().success);
    }

    #[test]
    fn explicit_payload_bypasses_derivation() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Kanban, &[]);
        // Card has no pr_url, but the caller supplies a payload, so the
        // PR-required precheck does not apply.
        seed(dir.path(), &cfg, &[], &[card("main/1-1", Status::Active, None)]);
        let eng = engine(dir.path(), cfg);

        let payload = GatePayload {
            worktrees: vec![crate::gate::WorktreeGate { path: Some("main/1-1".to_string()) }],
            prs: vec![],
        };
        let resp = eng.transition("main/1-1", Status::Review, Some(payload)).unwrap();
        assert!(resp.success);
    }

    #[test]
    fn end_to_end_backlog_to_done() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Kanban, &[]);
        seed(
            dir.path(),
            &cfg,
            &[card("main/1-1", Status::Backlog, Some("https://example/pr/1"))],
            &[],
        );
        let eng = engine(dir.path(), cfg.clone());

        for target in [Status::Planned, Status::Active, Status::Review, Status::Done] {
            let resp = eng.transition("main/1-1", target, None).unwrap();
            assert!(resp.success, "transition to {target} failed: {resp:?}");
        }

        let backlog = store::load_cards(&cfg.backlog_path(dir.path())).unwrap();
        let board = store::load_cards(&cfg.board_path(dir.path())).unwrap();
        assert!(backlog.is_empty());
        assert!(board.is_empty());

        let text = std::fs::read_to_string(cfg.done_path(dir.path())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let records = value.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].get("worktree").is_none());
        assert_eq!(records[0]["pr_url"], "https://example/pr/1");
    }

    #[test]
    fn not_found_and_not_on_board_are_distinct() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Kanban, &[]);
        seed(
            dir.path(),
            &cfg,
            &[card("main/1-1", Status::Backlog, Some("https://example/pr/1"))],
            &[],
        );
        let eng = engine(dir.path(), cfg);

        let resp = eng.transition("main/9-9", Status::Active, None).unwrap();
        assert_eq!(resp.error_code(), Some(codes::CARD_NOT_FOUND));

        let resp = eng.transition("main/1-1", Status::Done, None).unwrap();
        assert_eq!(resp.error_code(), Some(codes::CARD_NOT_ON_BOARD));
    }

    #[test]
    fn query_lists_and_filters() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Kanban, &[]);
        seed(
            dir.path(),
            &cfg,
            &[card("main/1-1", Status::Backlog, None)],
            &[
                card("main/2-2", Status::Active, None),
                card("main/3-3", Status::Review, None),
            ],
        );
        let eng = engine(dir.path(), cfg);

        let resp = eng.query(None).unwrap();
        assert!(resp.success);
        assert_eq!(resp.data.as_ref().unwrap()["count"], 3);

        let resp = eng.query(Some(Status::Active)).unwrap();
        assert_eq!(resp.data.as_ref().unwrap()["count"], 1);
        assert_eq!(
            resp.data.as_ref().unwrap()["cards"][0]["worktree"],
            "main/2-2"
        );
    }

    #[test]
    fn create_card_places_by_status_and_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Kanban, &[]);
        seed(dir.path(), &cfg, &[], &[]);
        let eng = engine(dir.path(), cfg.clone());

        assert!(eng.create_card(card("main/1-1", Status::Backlog, None)).unwrap().success);
        assert!(eng.create_card(card("main/2-2", Status::Planned, None)).unwrap().success);

        let backlog = store::load_cards(&cfg.backlog_path(dir.path())).unwrap();
        let board = store::load_cards(&cfg.board_path(dir.path())).unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(board.len(), 1);

        let resp = eng.create_card(card("main/1-1", Status::Planned, None)).unwrap();
        assert_eq!(resp.error_code(), Some(codes::CARD_EXISTS));
    }

    #[test]
    fn create_card_without_selector_is_invalid() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Kanban, &[]);
        seed(dir.path(), &cfg, &[], &[]);
        let eng = engine(dir.path(), cfg);

        let mut c = card("ignored", Status::Backlog, None);
        c.worktree = None;
        let resp = eng.create_card(c).unwrap();
        assert_eq!(resp.error_code(), Some(codes::CARD_INVALID));
    }

    #[test]
    fn update_card_merges_fields_but_not_status() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Kanban, &[]);
        seed(dir.path(), &cfg, &[], &[card("main/1-1", Status::Active, None)]);
        let eng = engine(dir.path(), cfg.clone());

        let mut patch = serde_json::Map::new();
        patch.insert("title".to_string(), serde_json::json!("Auth flow"));
        patch.insert("dev_prompt".to_string(), serde_json::json!("implement"));
        let resp = eng.update_card("main/1-1", &patch).unwrap();
        assert!(resp.success);

        let board = store::load_cards(&cfg.board_path(dir.path())).unwrap();
        assert_eq!(board[0].title.as_deref(), Some("Auth flow"));
        assert_eq!(
            board[0].extra.get("dev_prompt"),
            Some(&serde_json::json!("implement"))
        );

        let mut bad = serde_json::Map::new();
        bad.insert("status".to_string(), serde_json::json!("done"));
        let resp = eng.update_card("main/1-1", &bad).unwrap();
        assert_eq!(resp.error_code(), Some(codes::STATUS_UNSUPPORTED));
    }

    #[test]
    fn update_unknown_card_is_not_found() {
        let dir = TempDir::new().unwrap();
        let cfg = test_config(Provider::Kanban, &[]);
        seed(dir.path(), &cfg, &[], &[]);
        let eng = engine(dir.path(), cfg);

        let patch = serde_json::Map::new();
        let resp = eng.update_card("main/9-9", &patch).unwrap();
        assert_eq!(resp.error_code(), Some(codes::CARD_NOT_FOUND));
    }
}
