//! MongoDB-backed persistence
//!
//! Collections are created once at startup so their indexes (including the
//! partial unique index on `(form_id, respondent_id)`) exist before traffic.

use async_trait::async_trait;
use bson::{doc, DateTime, Document};

use crate::auth::Role;
use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{
    FormDoc, TicketDoc, UserDoc, FORM_COLLECTION, TICKET_COLLECTION, USER_COLLECTION,
};
use crate::db::store::{SurveyStore, TicketFilter, TicketPatch, UserStore};
use crate::lifecycle::{FormStatus, ResponseStatus};
use crate::types::{Result, SurveyError};

/// Production store
#[derive(Clone)]
pub struct MongoStore {
    forms: MongoCollection<FormDoc>,
    tickets: MongoCollection<TicketDoc>,
    users: MongoCollection<UserDoc>,
}

impl MongoStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            forms: client.collection(FORM_COLLECTION).await?,
            tickets: client.collection(TICKET_COLLECTION).await?,
            users: client.collection(USER_COLLECTION).await?,
        })
    }
}

fn to_bson<T: serde::Serialize>(value: &T) -> Result<bson::Bson> {
    bson::to_bson(value).map_err(|e| SurveyError::Internal(format!("BSON encoding failed: {}", e)))
}

fn ticket_update(patch: &TicketPatch) -> Result<Document> {
    let mut set = doc! { "metadata.updated_at": DateTime::now() };
    if let Some(status) = patch.status {
        set.insert("status", status.as_str());
        if status == ResponseStatus::Completed {
            set.insert("completed_at", DateTime::now());
        }
    }
    if let Some(ref answers) = patch.answers {
        set.insert("answers", to_bson(answers)?);
    }
    Ok(doc! { "$set": set })
}

#[async_trait]
impl SurveyStore for MongoStore {
    async fn find_form(&self, form_id: &str) -> Result<Option<FormDoc>> {
        self.forms.find_one(doc! { "_id": form_id }).await
    }

    async fn create_form(&self, form: FormDoc) -> Result<FormDoc> {
        self.forms.insert_one(form).await
    }

    async fn update_form_status(&self, form_id: &str, status: FormStatus) -> Result<FormDoc> {
        self.forms
            .find_one_and_update(
                doc! { "_id": form_id },
                doc! { "$set": { "status": status.as_str(), "metadata.updated_at": DateTime::now() } },
            )
            .await?
            .ok_or_else(|| SurveyError::NotFound(format!("form {}", form_id)))
    }

    async fn find_ticket(&self, form_id: &str, respondent_id: &str) -> Result<Option<TicketDoc>> {
        self.tickets
            .find_one(doc! { "form_id": form_id, "respondent_id": respondent_id })
            .await
    }

    async fn find_ticket_by_token(&self, token: &str) -> Result<Option<TicketDoc>> {
        self.tickets.find_one(doc! { "token": token }).await
    }

    async fn create_ticket(&self, ticket: TicketDoc) -> Result<TicketDoc> {
        self.tickets.insert_one(ticket).await
    }

    async fn update_ticket(&self, ticket_id: &str, patch: TicketPatch) -> Result<TicketDoc> {
        let mut filter = doc! { "_id": ticket_id };
        if let Some(expected) = patch.expected_status {
            filter.insert("status", expected.as_str());
        }

        match self
            .tickets
            .find_one_and_update(filter, ticket_update(&patch)?)
            .await?
        {
            Some(ticket) => Ok(ticket),
            None => match self.tickets.find_one(doc! { "_id": ticket_id }).await? {
                Some(current) => Err(SurveyError::Conflict(format!(
                    "ticket status changed to {}",
                    current.status
                ))),
                None => Err(SurveyError::NotFound(format!("ticket {}", ticket_id))),
            },
        }
    }

    async fn list_tickets(&self, filter: TicketFilter) -> Result<Vec<TicketDoc>> {
        let mut query = Document::new();
        if let Some(form_id) = filter.form_id {
            query.insert("form_id", form_id);
        }
        if let Some(status) = filter.status {
            query.insert("status", status.as_str());
        }
        if let Some(before) = filter.updated_before {
            query.insert("metadata.updated_at", doc! { "$lt": before });
        }
        self.tickets.find_many(query).await
    }
}

#[async_trait]
impl UserStore for MongoStore {
    async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<UserDoc>> {
        self.users.find_one(doc! { "identifier": identifier }).await
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<UserDoc>> {
        self.users.find_one(doc! { "_id": user_id }).await
    }

    async fn create_user(&self, user: UserDoc) -> Result<UserDoc> {
        self.users.insert_one(user).await
    }

    async fn update_password(&self, user_id: &str, password_hash: String) -> Result<UserDoc> {
        self.users
            .find_one_and_update(
                doc! { "_id": user_id },
                doc! { "$set": { "password_hash": password_hash, "metadata.updated_at": DateTime::now() } },
            )
            .await?
            .ok_or_else(|| SurveyError::NotFound(format!("user {}", user_id)))
    }

    async fn update_role(&self, user_id: &str, role: Role) -> Result<UserDoc> {
        self.users
            .find_one_and_update(
                doc! { "_id": user_id },
                doc! { "$set": { "role": role.to_string(), "metadata.updated_at": DateTime::now() } },
            )
            .await?
            .ok_or_else(|| SurveyError::NotFound(format!("user {}", user_id)))
    }
}
