//! Response ticket document schema
//!
//! One respondent's (or one anonymous visitor's) right to answer one form
//! once, addressed by an unguessable token.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::lifecycle::ResponseStatus;

/// Collection name for response tickets
pub const TICKET_COLLECTION: &str = "tickets";

/// A single answer value
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum AnswerValue {
    Number(i64),
    Text(String),
    Choices(Vec<String>),
}

impl AnswerValue {
    /// NPS score if this is an in-range number
    pub fn as_score(&self) -> Option<u8> {
        match self {
            AnswerValue::Number(n) => u8::try_from(*n).ok().filter(|s| *s <= 10),
            _ => None,
        }
    }
}

/// Question id -> answer
pub type Answers = BTreeMap<String, AnswerValue>;

/// Ticket document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TicketDoc {
    #[serde(rename = "_id")]
    pub id: String,

    /// Common metadata (created_at, updated_at)
    #[serde(default)]
    pub metadata: Metadata,

    pub form_id: String,

    /// Absent for anonymous public-link tickets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respondent_id: Option<String>,

    /// Full-entropy hex token, unique across all tickets
    pub token: String,

    #[serde(default)]
    pub status: ResponseStatus,

    #[serde(default)]
    pub answers: Answers,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<bson::DateTime>,
}

impl TicketDoc {
    pub fn new(
        form_id: String,
        respondent_id: Option<String>,
        token: String,
        status: ResponseStatus,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            form_id,
            respondent_id,
            token,
            status,
            answers: Answers::new(),
            completed_at: None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.respondent_id.is_none()
    }
}

impl IntoIndexes for TicketDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Token lookups from response URLs
            (
                doc! { "token": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("token_unique".to_string())
                        .build(),
                ),
            ),
            // At most one ticket per (form, respondent); anonymous tickets are exempt
            (
                doc! { "form_id": 1, "respondent_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "respondent_id": { "$type": "string" } })
                        .name("form_respondent_unique".to_string())
                        .build(),
                ),
            ),
            // Reports and expiry sweeps
            (
                doc! { "form_id": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("form_status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for TicketDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
