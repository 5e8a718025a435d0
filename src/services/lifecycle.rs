//! Lifecycle controller
//!
//! Applies the form and response status machines against the store. Every
//! ticket write is a compare-and-set on the status that was read, so two
//! concurrent submissions cannot both complete the same ticket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::with_timeout;
use crate::auth::Actor;
use crate::db::schemas::{Answers, FormDoc, Question, QuestionKind, TicketDoc};
use crate::db::{SurveyStore, TicketFilter, TicketPatch};
use crate::lifecycle::{FormStatus, ResponseStatus};
use crate::types::{Result, SurveyError};
use crate::validation::{Validate, Validator};

/// Form creation request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewForm {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Validate for NewForm {
    fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        v.non_blank(&self.title, "title");
        v.check(!self.questions.is_empty(), "questions", "at least one question is required");

        let mut seen = HashSet::new();
        let mut nps_count = 0;
        for (i, q) in self.questions.iter().enumerate() {
            let field = format!("questions[{}]", i);
            v.non_blank(&q.id, format!("{}.id", field));
            v.non_blank(&q.prompt, format!("{}.prompt", field));
            if !seen.insert(q.id.trim()) {
                v.push(format!("{}.id", field), format!("duplicate question id '{}'", q.id));
            }
            match &q.kind {
                QuestionKind::Nps => nps_count += 1,
                QuestionKind::SingleChoice { options } | QuestionKind::MultiChoice { options } => {
                    v.check(
                        options.len() >= 2,
                        format!("{}.options", field),
                        "at least two options are required",
                    );
                }
                QuestionKind::Text => {}
            }
        }
        if !self.questions.is_empty() {
            v.check(nps_count == 1, "questions", "exactly one NPS question is required");
        }
        v.finish()
    }
}

/// What a respondent sees when following a response URL
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketView {
    pub token: String,
    pub form_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub form_status: FormStatus,
    pub status: ResponseStatus,
    pub questions: Vec<Question>,
    pub answers: Answers,
}

impl TicketView {
    fn new(form: FormDoc, ticket: TicketDoc) -> Self {
        Self {
            token: ticket.token,
            form_id: form.id,
            title: form.title,
            description: form.description,
            form_status: form.status,
            status: ticket.status,
            questions: form.questions,
            answers: ticket.answers,
        }
    }
}

pub struct LifecycleController {
    store: Arc<dyn SurveyStore>,
    store_timeout: Duration,
}

impl LifecycleController {
    pub fn new(store: Arc<dyn SurveyStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    async fn load_form(&self, form_id: &str) -> Result<FormDoc> {
        with_timeout(self.store_timeout, "find form", self.store.find_form(form_id))
            .await?
            .ok_or_else(|| SurveyError::NotFound(format!("form {}", form_id)))
    }

    async fn load_ticket(&self, token: &str) -> Result<TicketDoc> {
        with_timeout(
            self.store_timeout,
            "find ticket",
            self.store.find_ticket_by_token(token),
        )
        .await?
        .ok_or_else(|| SurveyError::NotFound("response link".into()))
    }

    async fn commit(&self, ticket_id: &str, patch: TicketPatch) -> Result<TicketDoc> {
        with_timeout(
            self.store_timeout,
            "update ticket",
            self.store.update_ticket(ticket_id, patch),
        )
        .await
    }

    /// Form of a ticket that is about to receive answers
    async fn answerable_form(&self, ticket: &TicketDoc) -> Result<FormDoc> {
        let form = self.load_form(&ticket.form_id).await?;
        if !form.status.accepts_responses() {
            return Err(SurveyError::InvalidState(format!(
                "form is {}; responses are not accepted",
                form.status
            )));
        }
        Ok(form)
    }

    pub async fn create_form(&self, actor: &Actor, req: NewForm) -> Result<FormDoc> {
        actor.require("create_form")?;
        req.validate()?;

        let questions = req
            .questions
            .into_iter()
            .map(|mut q| {
                q.id = q.id.trim().to_string();
                q
            })
            .collect();
        let description = req
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let form = FormDoc::new(req.title.trim().to_string(), description, questions, actor.id.clone());

        let form = with_timeout(self.store_timeout, "create form", self.store.create_form(form)).await?;
        info!("Form {} created by {}", form.id, actor.id);
        Ok(form)
    }

    pub async fn change_form_status(
        &self,
        actor: &Actor,
        form_id: &str,
        target: FormStatus,
    ) -> Result<FormDoc> {
        actor.require("change_form_status")?;
        let form = self.load_form(form_id).await?;
        let from = form.status;
        from.transition(target)?;

        let updated = with_timeout(
            self.store_timeout,
            "update form status",
            self.store.update_form_status(form_id, target),
        )
        .await?;
        info!("Form {} moved {} -> {} by {}", form_id, from, target, actor.id);
        Ok(updated)
    }

    /// Follow a response link; a PENDING ticket becomes IN_PROGRESS
    pub async fn open(&self, token: &str) -> Result<TicketView> {
        let ticket = self.load_ticket(token).await?;
        if ticket.status.is_terminal() {
            ticket.status.transition(ResponseStatus::InProgress)?;
        }
        let form = self.answerable_form(&ticket).await?;

        let ticket = match ticket.status {
            ResponseStatus::Pending => {
                let patch = TicketPatch::transition(ResponseStatus::Pending, ResponseStatus::InProgress);
                let opened = self.commit(&ticket.id, patch).await?;
                debug!("Ticket {} opened", opened.id);
                opened
            }
            _ => ticket,
        };
        Ok(TicketView::new(form, ticket))
    }

    /// Store partial answers without completing the ticket
    pub async fn save_progress(&self, token: &str, answers: Answers) -> Result<TicketView> {
        let ticket = self.load_ticket(token).await?;
        if ticket.status != ResponseStatus::InProgress {
            ticket.status.transition(ResponseStatus::InProgress)?;
        }
        let form = self.answerable_form(&ticket).await?;
        check_answers(&form, &answers, false)?;

        let mut merged = ticket.answers.clone();
        merged.extend(answers);
        let patch = TicketPatch::transition(ticket.status, ResponseStatus::InProgress).with_answers(merged);
        let saved = self.commit(&ticket.id, patch).await?;
        Ok(TicketView::new(form, saved))
    }

    /// Final submission; saved answers are merged under the submitted ones
    pub async fn submit(&self, token: &str, answers: Answers) -> Result<TicketView> {
        let ticket = self.load_ticket(token).await?;
        ticket.status.transition(ResponseStatus::Completed)?;
        let form = self.answerable_form(&ticket).await?;

        let mut merged = ticket.answers.clone();
        merged.extend(answers);
        check_answers(&form, &merged, true)?;

        let patch = TicketPatch::transition(ticket.status, ResponseStatus::Completed).with_answers(merged);
        let completed = self.commit(&ticket.id, patch).await?;
        info!("Ticket {} completed for form {}", completed.id, completed.form_id);
        Ok(TicketView::new(form, completed))
    }

    pub async fn abandon(&self, token: &str) -> Result<()> {
        let ticket = self.load_ticket(token).await?;
        ticket.status.transition(ResponseStatus::Abandoned)?;
        self.commit(
            &ticket.id,
            TicketPatch::transition(ticket.status, ResponseStatus::Abandoned),
        )
        .await?;
        info!("Ticket {} abandoned by respondent", ticket.id);
        Ok(())
    }

    /// Abandon IN_PROGRESS tickets idle since before `now - idle`
    pub async fn sweep_abandoned_at(&self, now: DateTime<Utc>, idle: chrono::Duration) -> Result<usize> {
        let cutoff = bson::DateTime::from_chrono(now - idle);
        let stale = with_timeout(
            self.store_timeout,
            "list idle tickets",
            self.store.list_tickets(TicketFilter {
                status: Some(ResponseStatus::InProgress),
                updated_before: Some(cutoff),
                ..Default::default()
            }),
        )
        .await?;

        let mut abandoned = 0;
        for ticket in stale {
            let patch = TicketPatch::transition(ResponseStatus::InProgress, ResponseStatus::Abandoned);
            match self.commit(&ticket.id, patch).await {
                Ok(_) => abandoned += 1,
                // Respondent got there first
                Err(SurveyError::Conflict(_)) => debug!("Ticket {} changed during sweep", ticket.id),
                Err(e) => warn!("Failed to abandon idle ticket {}: {}", ticket.id, e),
            }
        }
        Ok(abandoned)
    }

    pub async fn sweep_abandoned(&self, idle: chrono::Duration) -> Result<usize> {
        self.sweep_abandoned_at(Utc::now(), idle).await
    }
}

/// Validate answers against the form's questions
fn check_answers(form: &FormDoc, answers: &Answers, complete: bool) -> Result<()> {
    let mut v = Validator::new();
    for (id, value) in answers {
        match form.question(id) {
            Some(q) => {
                if let Err(msg) = q.check_answer(value) {
                    v.push(format!("answers.{}", id), msg);
                }
            }
            None => v.push(format!("answers.{}", id), "unknown question"),
        }
    }
    if complete {
        for q in form.questions.iter().filter(|q| q.required) {
            v.check(
                Question::is_answered(answers.get(&q.id)),
                format!("answers.{}", q.id),
                "is required",
            );
        }
    }
    v.finish()
}

/// Periodically abandon idle IN_PROGRESS tickets
pub fn spawn_abandon_task(controller: Arc<LifecycleController>, interval: Duration, idle: Duration) {
    let idle = match chrono::Duration::from_std(idle) {
        Ok(idle) => idle,
        Err(e) => {
            error!("Invalid abandon threshold {:?}: {}", idle, e);
            return;
        }
    };
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match controller.sweep_abandoned(idle).await {
                Ok(0) => {}
                Ok(n) => info!("Abandoned {} idle ticket(s)", n),
                Err(e) => error!("Abandon sweep failed: {}", e),
            }
        }
    });
}
