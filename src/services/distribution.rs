//! Distribution engine
//!
//! Ensures each target respondent holds exactly one usable response ticket.
//! Batches are best-effort: per-respondent failures are itemized in the
//! report, and only precondition violations (bad input, missing form) fail
//! the call as a whole.
//!
//! Batch distribution does not require the form to be PUBLISHED, so admins
//! can pre-provision respondents. Public links do require it.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::with_timeout;
use crate::auth::Actor;
use crate::db::schemas::{FormDoc, TicketDoc};
use crate::db::SurveyStore;
use crate::lifecycle::ResponseStatus;
use crate::tokens::{full_token, response_url, FULL_TOKEN_BYTES};
use crate::types::{Result, SurveyError};
use crate::validation::{Validate, Validator};

/// Attempts at finding an unused token before giving up
const MAX_TOKEN_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct DistributionConfig {
    /// Base for shareable URLs (`{base_url}/r/{token}`)
    pub base_url: String,
    /// Deadline for each persistence unit of work
    pub store_timeout: Duration,
    /// Respondents processed concurrently within a batch
    pub concurrency: usize,
    pub max_batch: usize,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            store_timeout: Duration::from_secs(5),
            concurrency: 8,
            max_batch: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeRequest {
    pub respondent_ids: Vec<String>,
}

impl DistributeRequest {
    /// Trimmed ids, first occurrence wins
    fn targets(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.respondent_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }
}

impl Validate for DistributeRequest {
    fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        v.check(
            !self.respondent_ids.is_empty(),
            "respondentIds",
            "at least one respondent is required",
        );
        for (i, id) in self.respondent_ids.iter().enumerate() {
            v.non_blank(id, format!("respondentIds[{}]", i));
        }
        v.finish()
    }
}

/// A ticket handed out (or handed out again) to a respondent
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedTicket {
    pub respondent_id: String,
    pub token: String,
    pub url: String,
    /// True when an existing ticket was returned
    pub reused: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionFailure {
    pub respondent_id: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionReport {
    pub form_id: String,
    pub success_count: usize,
    pub error_count: usize,
    pub tickets: Vec<IssuedTicket>,
    pub failures: Vec<DistributionFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicLink {
    pub token: String,
    pub url: String,
}

pub struct DistributionEngine {
    store: Arc<dyn SurveyStore>,
    config: DistributionConfig,
}

impl DistributionEngine {
    pub fn new(store: Arc<dyn SurveyStore>, config: DistributionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &DistributionConfig {
        &self.config
    }

    async fn load_form(&self, form_id: &str) -> Result<FormDoc> {
        with_timeout(self.config.store_timeout, "find form", self.store.find_form(form_id))
            .await?
            .ok_or_else(|| SurveyError::NotFound(format!("form {}", form_id)))
    }

    /// Issue or reuse one ticket per respondent
    pub async fn distribute(
        &self,
        actor: &Actor,
        form_id: &str,
        req: &DistributeRequest,
    ) -> Result<DistributionReport> {
        actor.require("distribute")?;
        req.validate()?;
        let targets = req.targets();
        if targets.len() > self.config.max_batch {
            return Err(SurveyError::invalid_field(
                "respondentIds",
                format!("at most {} respondents per batch", self.config.max_batch),
            ));
        }

        let form = self.load_form(form_id).await?;
        debug!(
            "Distributing form {} ({}) to {} respondent(s)",
            form.id,
            form.status,
            targets.len()
        );

        let outcomes: Vec<(String, Result<IssuedTicket>)> = stream::iter(targets)
            .map(|respondent_id| {
                let form_id = form.id.as_str();
                async move {
                    let outcome = with_timeout(
                        self.config.store_timeout,
                        "issue ticket",
                        self.issue_for_respondent(form_id, &respondent_id),
                    )
                    .await;
                    (respondent_id, outcome)
                }
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = DistributionReport {
            form_id: form.id.clone(),
            success_count: 0,
            error_count: 0,
            tickets: Vec::new(),
            failures: Vec::new(),
        };
        for (respondent_id, outcome) in outcomes {
            match outcome {
                Ok(issued) => {
                    report.success_count += 1;
                    report.tickets.push(issued);
                }
                Err(e) => {
                    warn!(
                        "Distribution of form {} to respondent {} failed: {}",
                        form.id, respondent_id, e
                    );
                    report.error_count += 1;
                    report.failures.push(DistributionFailure {
                        respondent_id,
                        code: e.code().to_string(),
                        message: e.public_message(),
                    });
                }
            }
        }

        info!(
            "Distributed form {} by {}: {} ok, {} failed",
            form.id, actor.id, report.success_count, report.error_count
        );
        Ok(report)
    }

    /// New anonymous IN_PROGRESS ticket for a PUBLISHED form
    pub async fn issue_public_link(&self, form_id: &str) -> Result<PublicLink> {
        let form = self.load_form(form_id).await?;
        if !form.status.accepts_responses() {
            return Err(SurveyError::InvalidState(format!(
                "form is {}; public links require PUBLISHED",
                form.status
            )));
        }

        with_timeout(self.config.store_timeout, "issue public link", async {
            for _ in 0..MAX_TOKEN_ATTEMPTS {
                let token = self.fresh_token().await?;
                let ticket = TicketDoc::new(form.id.clone(), None, token, ResponseStatus::InProgress);
                match self.store.create_ticket(ticket).await {
                    Ok(ticket) => {
                        info!("Issued public link ticket {} for form {}", ticket.id, form.id);
                        return Ok(self.public_link(&ticket.token));
                    }
                    // Lost a token race; draw again
                    Err(SurveyError::Conflict(_)) => continue,
                    Err(e) => return Err(e),
                }
            }
            Err(SurveyError::Internal("could not allocate a unique token".into()))
        })
        .await
    }

    async fn issue_for_respondent(&self, form_id: &str, respondent_id: &str) -> Result<IssuedTicket> {
        if let Some(existing) = self.store.find_ticket(form_id, respondent_id).await? {
            return Ok(self.issued(respondent_id, existing.token, true));
        }

        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = self.fresh_token().await?;
            let ticket = TicketDoc::new(
                form_id.to_string(),
                Some(respondent_id.to_string()),
                token,
                ResponseStatus::Pending,
            );

            match self.store.create_ticket(ticket).await {
                Ok(created) => return Ok(self.issued(respondent_id, created.token, false)),
                Err(SurveyError::Conflict(msg)) => {
                    // A concurrent caller created it between our lookup and insert
                    if let Some(winner) = self.store.find_ticket(form_id, respondent_id).await? {
                        return Ok(self.issued(respondent_id, winner.token, true));
                    }
                    // Otherwise the token itself clashed; draw again
                    debug!("Ticket insert for {} conflicted ({}), retrying", respondent_id, msg);
                }
                Err(e) => return Err(e),
            }
        }
        Err(SurveyError::Internal("could not allocate a unique token".into()))
    }

    /// Token not yet present in the store
    async fn fresh_token(&self) -> Result<String> {
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = full_token(FULL_TOKEN_BYTES);
            if self.store.find_ticket_by_token(&token).await?.is_none() {
                return Ok(token);
            }
            warn!("Generated token already in use, drawing again");
        }
        Err(SurveyError::Internal("could not allocate a unique token".into()))
    }

    fn issued(&self, respondent_id: &str, token: String, reused: bool) -> IssuedTicket {
        IssuedTicket {
            respondent_id: respondent_id.to_string(),
            url: response_url(&self.config.base_url, &token),
            token,
            reused,
        }
    }

    fn public_link(&self, token: &str) -> PublicLink {
        PublicLink {
            token: token.to_string(),
            url: response_url(&self.config.base_url, token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::schemas::{Question, QuestionKind};
    use crate::db::{MemoryStore, TicketFilter, TicketPatch};
    use crate::lifecycle::FormStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Memory store that misbehaves for chosen respondents
    struct FlakyStore {
        inner: MemoryStore,
        /// Ticket creation fails
        failing: HashSet<String>,
        /// Ticket creation hangs
        stalling: HashSet<String>,
        /// The first lookup misses even if a ticket exists
        hidden_once: Mutex<HashSet<String>>,
        /// This many creations fail with a token conflict
        token_clashes: AtomicUsize,
    }

    impl FlakyStore {
        fn wrapping(inner: MemoryStore) -> Self {
            Self {
                inner,
                failing: HashSet::new(),
                stalling: HashSet::new(),
                hidden_once: Mutex::new(HashSet::new()),
                token_clashes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SurveyStore for FlakyStore {
        async fn find_form(&self, form_id: &str) -> Result<Option<FormDoc>> {
            self.inner.find_form(form_id).await
        }
        async fn create_form(&self, form: FormDoc) -> Result<FormDoc> {
            self.inner.create_form(form).await
        }
        async fn update_form_status(&self, form_id: &str, status: FormStatus) -> Result<FormDoc> {
            self.inner.update_form_status(form_id, status).await
        }
        async fn find_ticket(&self, form_id: &str, respondent_id: &str) -> Result<Option<TicketDoc>> {
            if self.hidden_once.lock().unwrap().remove(respondent_id) {
                return Ok(None);
            }
            self.inner.find_ticket(form_id, respondent_id).await
        }
        async fn find_ticket_by_token(&self, token: &str) -> Result<Option<TicketDoc>> {
            self.inner.find_ticket_by_token(token).await
        }
        async fn create_ticket(&self, ticket: TicketDoc) -> Result<TicketDoc> {
            let respondent = ticket.respondent_id.clone().unwrap_or_default();
            if self.failing.contains(&respondent) {
                return Err(SurveyError::Database("write rejected".into()));
            }
            if self.stalling.contains(&respondent) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            let clash = self
                .token_clashes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if clash {
                return Err(SurveyError::Conflict("duplicate token".into()));
            }
            self.inner.create_ticket(ticket).await
        }
        async fn update_ticket(&self, ticket_id: &str, patch: TicketPatch) -> Result<TicketDoc> {
            self.inner.update_ticket(ticket_id, patch).await
        }
        async fn list_tickets(&self, filter: TicketFilter) -> Result<Vec<TicketDoc>> {
            self.inner.list_tickets(filter).await
        }
    }

    fn editor() -> Actor {
        Actor::new("editor-1", Role::Editor)
    }

    fn request(ids: &[&str]) -> DistributeRequest {
        DistributeRequest {
            respondent_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn seed_form(store: &MemoryStore, status: FormStatus) -> FormDoc {
        let mut form = FormDoc::new(
            "Pulse".into(),
            None,
            vec![Question {
                id: "nps".into(),
                prompt: "How likely are you to recommend us?".into(),
                kind: QuestionKind::Nps,
                required: true,
            }],
            "editor-1".into(),
        );
        form.status = status;
        store.create_form(form).await.unwrap()
    }

    fn engine(store: Arc<dyn SurveyStore>) -> DistributionEngine {
        DistributionEngine::new(
            store,
            DistributionConfig {
                base_url: "https://nps.example.com".into(),
                store_timeout: Duration::from_millis(200),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_distribute_is_idempotent() {
        let store = MemoryStore::new();
        let form = seed_form(&store, FormStatus::Published).await;
        let engine = engine(Arc::new(store.clone()));

        let first = engine.distribute(&editor(), &form.id, &request(&["r1"])).await.unwrap();
        let second = engine.distribute(&editor(), &form.id, &request(&["r1"])).await.unwrap();

        assert_eq!(first.success_count, 1);
        assert!(!first.tickets[0].reused);
        assert!(second.tickets[0].reused);
        assert_eq!(first.tickets[0].token, second.tickets[0].token);
        assert_eq!(store.ticket_count().await, 1);

        let ticket = store.find_ticket(&form.id, "r1").await.unwrap().unwrap();
        assert_eq!(ticket.status, ResponseStatus::Pending);
        assert!(ticket.answers.is_empty());
        assert_eq!(
            first.tickets[0].url,
            format!("https://nps.example.com/r/{}", ticket.token)
        );
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_successes() {
        let memory = MemoryStore::new();
        let form = seed_form(&memory, FormStatus::Published).await;
        let mut flaky = FlakyStore::wrapping(memory.clone());
        flaky.failing.insert("bad".to_string());
        let engine = engine(Arc::new(flaky));

        let report = engine
            .distribute(&editor(), &form.id, &request(&["good", "bad"]))
            .await
            .unwrap();

        assert_eq!(report.success_count, 1);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.failures[0].respondent_id, "bad");
        assert_eq!(report.failures[0].code, "INTERNAL");
        assert_eq!(report.failures[0].message, "Internal error");
        assert!(memory.find_ticket(&form.id, "good").await.unwrap().is_some());
        assert_eq!(memory.ticket_count().await, 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_item_failure() {
        let memory = MemoryStore::new();
        let form = seed_form(&memory, FormStatus::Published).await;
        let mut flaky = FlakyStore::wrapping(memory.clone());
        flaky.stalling.insert("slow".to_string());
        let engine = engine(Arc::new(flaky));

        let report = engine
            .distribute(&editor(), &form.id, &request(&["slow", "fast"]))
            .await
            .unwrap();
        assert_eq!(report.success_count, 1);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.failures[0].code, "TIMEOUT");
    }

    #[tokio::test]
    async fn test_insert_conflict_returns_existing_ticket() {
        let memory = MemoryStore::new();
        let form = seed_form(&memory, FormStatus::Published).await;
        let existing = memory
            .create_ticket(TicketDoc::new(
                form.id.clone(),
                Some("r1".into()),
                full_token(FULL_TOKEN_BYTES),
                ResponseStatus::Pending,
            ))
            .await
            .unwrap();

        // The pre-insert lookup misses, so the unique key is what catches the duplicate
        let flaky = FlakyStore::wrapping(memory.clone());
        flaky.hidden_once.lock().unwrap().insert("r1".to_string());
        let engine = engine(Arc::new(flaky));

        let report = engine.distribute(&editor(), &form.id, &request(&["r1"])).await.unwrap();
        assert_eq!(report.success_count, 1);
        assert_eq!(report.error_count, 0);
        assert_eq!(report.tickets[0].token, existing.token);
        assert!(report.tickets[0].reused);
        assert_eq!(memory.ticket_count().await, 1);
    }

    #[tokio::test]
    async fn test_token_clash_on_insert_draws_again() {
        let memory = MemoryStore::new();
        let form = seed_form(&memory, FormStatus::Published).await;
        let flaky = FlakyStore::wrapping(memory.clone());
        flaky.token_clashes.store(2, Ordering::SeqCst);
        let engine = engine(Arc::new(flaky));

        let report = engine.distribute(&editor(), &form.id, &request(&["r1"])).await.unwrap();
        assert_eq!(report.success_count, 1);
        assert!(!report.tickets[0].reused);
        assert_eq!(memory.ticket_count().await, 1);
    }

    #[tokio::test]
    async fn test_token_clashes_give_up_after_three_draws() {
        let memory = MemoryStore::new();
        let form = seed_form(&memory, FormStatus::Published).await;
        let flaky = FlakyStore::wrapping(memory.clone());
        flaky.token_clashes.store(3, Ordering::SeqCst);
        let engine = engine(Arc::new(flaky));

        let report = engine.distribute(&editor(), &form.id, &request(&["r1"])).await.unwrap();
        assert_eq!(report.error_count, 1);
        assert_eq!(report.failures[0].code, "INTERNAL");
        assert_eq!(memory.ticket_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_distribute_issues_one_ticket() {
        let store = MemoryStore::new();
        let form = seed_form(&store, FormStatus::Published).await;
        let engine = Arc::new(engine(Arc::new(store.clone())));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            let form_id = form.id.clone();
            handles.push(tokio::spawn(async move {
                engine.distribute(&editor(), &form_id, &request(&["r1"])).await
            }));
        }

        let mut tokens = HashSet::new();
        for handle in handles {
            let report = handle.await.unwrap().unwrap();
            assert_eq!(report.success_count, 1);
            tokens.insert(report.tickets[0].token.clone());
        }
        assert_eq!(tokens.len(), 1);
        assert_eq!(store.ticket_count().await, 1);
    }

    #[tokio::test]
    async fn test_missing_form_fails_whole_batch() {
        let store = MemoryStore::new();
        let engine = engine(Arc::new(store.clone()));
        let result = engine.distribute(&editor(), "nope", &request(&["r1"])).await;
        assert!(matches!(result, Err(SurveyError::NotFound(_))));
        assert_eq!(store.ticket_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_targets_rejected() {
        let store = MemoryStore::new();
        let form = seed_form(&store, FormStatus::Published).await;
        let engine = engine(Arc::new(store));

        match engine.distribute(&editor(), &form.id, &request(&[])).await {
            Err(SurveyError::InvalidInput(errors)) => assert_eq!(errors[0].field, "respondentIds"),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
        match engine.distribute(&editor(), &form.id, &request(&["ok", "  "])).await {
            Err(SurveyError::InvalidInput(errors)) => {
                assert_eq!(errors[0].field, "respondentIds[1]")
            }
            other => panic!("expected InvalidInput, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_batch_collapse() {
        let store = MemoryStore::new();
        let form = seed_form(&store, FormStatus::Published).await;
        let engine = engine(Arc::new(store.clone()));

        let report = engine
            .distribute(&editor(), &form.id, &request(&["r1", " r1 ", "r2"]))
            .await
            .unwrap();
        assert_eq!(report.success_count, 2);
        assert_eq!(store.ticket_count().await, 2);
    }

    #[tokio::test]
    async fn test_viewer_cannot_distribute() {
        let store = MemoryStore::new();
        let form = seed_form(&store, FormStatus::Published).await;
        let engine = engine(Arc::new(store));
        let viewer = Actor::new("v", Role::Viewer);
        let result = engine.distribute(&viewer, &form.id, &request(&["r1"])).await;
        assert!(matches!(result, Err(SurveyError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_batch_ignores_publish_gate_but_public_link_does_not() {
        let store = MemoryStore::new();
        let draft = seed_form(&store, FormStatus::Draft).await;
        let engine = engine(Arc::new(store.clone()));

        // Pre-provisioning a draft form is allowed
        let report = engine.distribute(&editor(), &draft.id, &request(&["r1"])).await.unwrap();
        assert_eq!(report.success_count, 1);

        let link = engine.issue_public_link(&draft.id).await;
        assert!(matches!(link, Err(SurveyError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_public_links_are_distinct() {
        let store = MemoryStore::new();
        let form = seed_form(&store, FormStatus::Published).await;
        let engine = engine(Arc::new(store.clone()));

        let a = engine.issue_public_link(&form.id).await.unwrap();
        let b = engine.issue_public_link(&form.id).await.unwrap();
        assert_ne!(a.token, b.token);
        assert_eq!(a.token.len(), 64);
        assert!(a.url.ends_with(&a.token));

        let ticket = store.find_ticket_by_token(&a.token).await.unwrap().unwrap();
        assert!(ticket.is_anonymous());
        assert_eq!(ticket.status, ResponseStatus::InProgress);
    }

    #[tokio::test]
    async fn test_public_link_unknown_form() {
        let engine = engine(Arc::new(MemoryStore::new()));
        assert!(matches!(
            engine.issue_public_link("missing").await,
            Err(SurveyError::NotFound(_))
        ));
    }
}
