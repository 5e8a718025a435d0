//! Form reports
//!
//! Recomputed from the current ticket set on every request.

use serde::Serialize;

use crate::auth::Actor;
use crate::db::{SurveyStore, TicketFilter};
use crate::lifecycle::{FormStatus, ResponseStatus};
use crate::scoring::ScoreSummary;
use crate::types::{Result, SurveyError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub abandoned: usize,
}

impl StatusCounts {
    fn add(&mut self, status: ResponseStatus) {
        match status {
            ResponseStatus::Pending => self.pending += 1,
            ResponseStatus::InProgress => self.in_progress += 1,
            ResponseStatus::Completed => self.completed += 1,
            ResponseStatus::Abandoned => self.abandoned += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormReport {
    pub form_id: String,
    pub title: String,
    pub form_status: FormStatus,
    pub summary: ScoreSummary,
    /// Human label of `summary.band`
    pub band_label: &'static str,
    pub tickets: StatusCounts,
}

pub async fn form_report(store: &dyn SurveyStore, actor: &Actor, form_id: &str) -> Result<FormReport> {
    actor.require("view_report")?;
    let form = store
        .find_form(form_id)
        .await?
        .ok_or_else(|| SurveyError::NotFound(format!("form {}", form_id)))?;

    let tickets = store
        .list_tickets(TicketFilter {
            form_id: Some(form.id.clone()),
            ..Default::default()
        })
        .await?;

    let nps_id = form.nps_question().map(|q| q.id.clone());
    let mut counts = StatusCounts::default();
    let mut scores = Vec::new();
    for ticket in &tickets {
        counts.add(ticket.status);
        if ticket.status != ResponseStatus::Completed {
            continue;
        }
        if let Some(score) = nps_id
            .as_ref()
            .and_then(|id| ticket.answers.get(id))
            .and_then(|value| value.as_score())
        {
            scores.push(score);
        }
    }

    let summary = ScoreSummary::from_scores(&scores);
    Ok(FormReport {
        form_id: form.id,
        title: form.title,
        form_status: form.status,
        band_label: summary.band.label(),
        summary,
        tickets: counts,
    })
}
