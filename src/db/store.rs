//! Persistence collaborator
//!
//! The core reaches storage only through these traits. [`MemoryStore`] backs
//! tests and dev mode; [`super::MongoStore`] backs production. Both enforce
//! ticket uniqueness at the storage layer as a backstop for the
//! find-then-create idempotency check.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::auth::Role;
use crate::db::schemas::{Answers, FormDoc, TicketDoc, UserDoc};
use crate::lifecycle::{FormStatus, ResponseStatus};
use crate::types::{Result, SurveyError};

/// Partial update for a ticket
#[derive(Debug, Clone, Default)]
pub struct TicketPatch {
    /// Apply only if the stored status still equals this (compare-and-set)
    pub expected_status: Option<ResponseStatus>,
    pub status: Option<ResponseStatus>,
    /// Replaces the stored answers
    pub answers: Option<Answers>,
}

impl TicketPatch {
    /// Status move guarded by the status the caller observed
    pub fn transition(from: ResponseStatus, to: ResponseStatus) -> Self {
        Self {
            expected_status: Some(from),
            status: Some(to),
            answers: None,
        }
    }

    pub fn with_answers(mut self, answers: Answers) -> Self {
        self.answers = Some(answers);
        self
    }
}

/// Ticket listing filter
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub form_id: Option<String>,
    pub status: Option<ResponseStatus>,
    /// Only tickets last updated strictly before this instant
    pub updated_before: Option<bson::DateTime>,
}

/// Form and ticket persistence
#[async_trait]
pub trait SurveyStore: Send + Sync {
    async fn find_form(&self, form_id: &str) -> Result<Option<FormDoc>>;

    async fn create_form(&self, form: FormDoc) -> Result<FormDoc>;

    /// `NotFound` if the form does not exist
    async fn update_form_status(&self, form_id: &str, status: FormStatus) -> Result<FormDoc>;

    async fn find_ticket(&self, form_id: &str, respondent_id: &str) -> Result<Option<TicketDoc>>;

    async fn find_ticket_by_token(&self, token: &str) -> Result<Option<TicketDoc>>;

    /// `Conflict` on a duplicate token or a duplicate (form, respondent) pair
    async fn create_ticket(&self, ticket: TicketDoc) -> Result<TicketDoc>;

    /// `NotFound` for an unknown ticket, `Conflict` when `expected_status` no longer holds
    async fn update_ticket(&self, ticket_id: &str, patch: TicketPatch) -> Result<TicketDoc>;

    async fn list_tickets(&self, filter: TicketFilter) -> Result<Vec<TicketDoc>>;
}

/// User credential persistence
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Lookup by normalized identifier
    async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<UserDoc>>;

    async fn find_user(&self, user_id: &str) -> Result<Option<UserDoc>>;

    /// `Conflict` on a duplicate identifier
    async fn create_user(&self, user: UserDoc) -> Result<UserDoc>;

    async fn update_password(&self, user_id: &str, password_hash: String) -> Result<UserDoc>;

    async fn update_role(&self, user_id: &str, role: Role) -> Result<UserDoc>;
}

#[derive(Default)]
struct MemoryInner {
    forms: HashMap<String, FormDoc>,
    tickets: HashMap<String, TicketDoc>,
    /// token -> ticket id
    by_token: HashMap<String, String>,
    /// (form id, respondent id) -> ticket id
    by_respondent: HashMap<(String, String), String>,
    users: HashMap<String, UserDoc>,
    /// identifier -> user id
    by_identifier: HashMap<String, String>,
}

/// Simple in-memory store
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tickets
    pub async fn ticket_count(&self) -> usize {
        self.inner.read().await.tickets.len()
    }
}

#[async_trait]
impl SurveyStore for MemoryStore {
    async fn find_form(&self, form_id: &str) -> Result<Option<FormDoc>> {
        Ok(self.inner.read().await.forms.get(form_id).cloned())
    }

    async fn create_form(&self, mut form: FormDoc) -> Result<FormDoc> {
        let mut inner = self.inner.write().await;
        if inner.forms.contains_key(&form.id) {
            return Err(SurveyError::Conflict(format!("form {} already exists", form.id)));
        }
        form.metadata.stamp_created();
        inner.forms.insert(form.id.clone(), form.clone());
        Ok(form)
    }

    async fn update_form_status(&self, form_id: &str, status: FormStatus) -> Result<FormDoc> {
        let mut inner = self.inner.write().await;
        let form = inner
            .forms
            .get_mut(form_id)
            .ok_or_else(|| SurveyError::NotFound(format!("form {}", form_id)))?;
        form.status = status;
        form.metadata.touch();
        Ok(form.clone())
    }

    async fn find_ticket(&self, form_id: &str, respondent_id: &str) -> Result<Option<TicketDoc>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_respondent
            .get(&(form_id.to_string(), respondent_id.to_string()))
            .and_then(|id| inner.tickets.get(id))
            .cloned())
    }

    async fn find_ticket_by_token(&self, token: &str) -> Result<Option<TicketDoc>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_token
            .get(token)
            .and_then(|id| inner.tickets.get(id))
            .cloned())
    }

    async fn create_ticket(&self, mut ticket: TicketDoc) -> Result<TicketDoc> {
        let mut inner = self.inner.write().await;

        if inner.by_token.contains_key(&ticket.token) {
            return Err(SurveyError::Conflict("duplicate token".into()));
        }
        let respondent_key = ticket
            .respondent_id
            .as_ref()
            .map(|r| (ticket.form_id.clone(), r.clone()));
        if let Some(ref key) = respondent_key {
            if inner.by_respondent.contains_key(key) {
                return Err(SurveyError::Conflict(format!(
                    "respondent {} already has a ticket for form {}",
                    key.1, key.0
                )));
            }
        }

        ticket.metadata.stamp_created();
        inner.by_token.insert(ticket.token.clone(), ticket.id.clone());
        if let Some(key) = respondent_key {
            inner.by_respondent.insert(key, ticket.id.clone());
        }
        inner.tickets.insert(ticket.id.clone(), ticket.clone());
        Ok(ticket)
    }

    async fn update_ticket(&self, ticket_id: &str, patch: TicketPatch) -> Result<TicketDoc> {
        let mut inner = self.inner.write().await;
        let ticket = inner
            .tickets
            .get_mut(ticket_id)
            .ok_or_else(|| SurveyError::NotFound(format!("ticket {}", ticket_id)))?;

        if let Some(expected) = patch.expected_status {
            if ticket.status != expected {
                return Err(SurveyError::Conflict(format!(
                    "ticket status changed to {}",
                    ticket.status
                )));
            }
        }
        if let Some(status) = patch.status {
            ticket.status = status;
            if status == ResponseStatus::Completed {
                ticket.completed_at = Some(bson::DateTime::now());
            }
        }
        if let Some(answers) = patch.answers {
            ticket.answers = answers;
        }
        ticket.metadata.touch();
        Ok(ticket.clone())
    }

    async fn list_tickets(&self, filter: TicketFilter) -> Result<Vec<TicketDoc>> {
        let inner = self.inner.read().await;
        Ok(inner
            .tickets
            .values()
            .filter(|t| filter.form_id.as_ref().map_or(true, |f| &t.form_id == f))
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| {
                filter.updated_before.map_or(true, |before| {
                    t.metadata.updated_at.is_some_and(|updated| updated < before)
                })
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<UserDoc>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_identifier
            .get(identifier)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<UserDoc>> {
        Ok(self.inner.read().await.users.get(user_id).cloned())
    }

    async fn create_user(&self, mut user: UserDoc) -> Result<UserDoc> {
        let mut inner = self.inner.write().await;
        if inner.by_identifier.contains_key(&user.identifier) {
            return Err(SurveyError::Conflict(format!(
                "user {} already exists",
                user.identifier
            )));
        }
        user.metadata.stamp_created();
        inner
            .by_identifier
            .insert(user.identifier.clone(), user.id.clone());
        inner.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn update_password(&self, user_id: &str, password_hash: String) -> Result<UserDoc> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| SurveyError::NotFound(format!("user {}", user_id)))?;
        user.password_hash = password_hash;
        user.metadata.touch();
        Ok(user.clone())
    }

    async fn update_role(&self, user_id: &str, role: Role) -> Result<UserDoc> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| SurveyError::NotFound(format!("user {}", user_id)))?;
        user.role = role;
        user.metadata.touch();
        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(form: &str, respondent: Option<&str>, token: &str) -> TicketDoc {
        TicketDoc::new(
            form.into(),
            respondent.map(String::from),
            token.into(),
            ResponseStatus::Pending,
        )
    }

    #[tokio::test]
    async fn test_respondent_uniqueness_backstop() {
        let store = MemoryStore::new();
        store.create_ticket(ticket("f1", Some("r1"), "t1")).await.unwrap();

        let dup = store.create_ticket(ticket("f1", Some("r1"), "t2")).await;
        assert!(matches!(dup, Err(SurveyError::Conflict(_))));

        // Same respondent on another form is fine
        store.create_ticket(ticket("f2", Some("r1"), "t3")).await.unwrap();
        assert_eq!(store.ticket_count().await, 2);
    }

    #[tokio::test]
    async fn test_anonymous_tickets_exempt() {
        let store = MemoryStore::new();
        store.create_ticket(ticket("f1", None, "a")).await.unwrap();
        store.create_ticket(ticket("f1", None, "b")).await.unwrap();

        let dup_token = store.create_ticket(ticket("f1", None, "b")).await;
        assert!(matches!(dup_token, Err(SurveyError::Conflict(_))));
        assert_eq!(store.ticket_count().await, 2);
    }

    #[tokio::test]
    async fn test_update_compare_and_set() {
        let store = MemoryStore::new();
        let t = store.create_ticket(ticket("f1", Some("r1"), "t1")).await.unwrap();

        let patch = TicketPatch::transition(ResponseStatus::Pending, ResponseStatus::Completed);
        let updated = store.update_ticket(&t.id, patch.clone()).await.unwrap();
        assert_eq!(updated.status, ResponseStatus::Completed);
        assert!(updated.completed_at.is_some());

        // Second writer saw PENDING too
        let stale = store.update_ticket(&t.id, patch).await;
        assert!(matches!(stale, Err(SurveyError::Conflict(_))));

        let missing = store.update_ticket("nope", TicketPatch::default()).await;
        assert!(matches!(missing, Err(SurveyError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = MemoryStore::new();
        let a = store.create_ticket(ticket("f1", Some("r1"), "t1")).await.unwrap();
        store.create_ticket(ticket("f1", Some("r2"), "t2")).await.unwrap();
        store.create_ticket(ticket("f2", Some("r1"), "t3")).await.unwrap();
        store
            .update_ticket(
                &a.id,
                TicketPatch::transition(ResponseStatus::Pending, ResponseStatus::InProgress),
            )
            .await
            .unwrap();

        let f1 = store
            .list_tickets(TicketFilter {
                form_id: Some("f1".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(f1.len(), 2);

        let in_progress = store
            .list_tickets(TicketFilter {
                status: Some(ResponseStatus::InProgress),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].id, a.id);
    }

    #[tokio::test]
    async fn test_user_identifier_unique() {
        let store = MemoryStore::new();
        store
            .create_user(UserDoc::new("a@x.io".into(), "h".into(), Role::Viewer))
            .await
            .unwrap();
        let dup = store
            .create_user(UserDoc::new("a@x.io".into(), "h".into(), Role::Admin))
            .await;
        assert!(matches!(dup, Err(SurveyError::Conflict(_))));
        assert!(store.find_user_by_identifier("a@x.io").await.unwrap().is_some());
    }
}
