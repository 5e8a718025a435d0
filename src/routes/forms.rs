//! HTTP routes for form management and distribution
//!
//! - POST /forms                     - create a DRAFT form (editor)
//! - POST /forms/{id}/status         - change form status (editor)
//! - POST /forms/{id}/distribute     - issue tickets to respondents (editor)
//! - POST /forms/{id}/public-link    - new anonymous ticket for a PUBLISHED form
//! - GET  /forms/{id}/report         - NPS report (viewer)

use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{bearer_actor, method_not_allowed, not_found, parse_json_body, path_segments, respond, BoxBody, BoxError};
use crate::db::schemas::{FormDoc, Question};
use crate::lifecycle::FormStatus;
use crate::server::AppState;
use crate::services::{
    form_report, with_timeout, DistributeRequest, DistributionReport, FormReport, NewForm, PublicLink,
};
use crate::types::Result;

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: FormStatus,
}

/// Form as returned over HTTP
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormView {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: FormStatus,
    pub questions: Vec<Question>,
    pub owner_id: String,
}

impl From<FormDoc> for FormView {
    fn from(form: FormDoc) -> Self {
        Self {
            id: form.id,
            title: form.title,
            description: form.description,
            status: form.status,
            questions: form.questions,
            owner_id: form.owner_id,
        }
    }
}

async fn create_form<B>(req: Request<B>, state: &AppState) -> Result<FormView>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let actor = bearer_actor(&req, state)?;
    let body: NewForm = parse_json_body(req).await?;
    let form = state.lifecycle.create_form(&actor, body).await?;
    Ok(form.into())
}

async fn change_status<B>(req: Request<B>, state: &AppState, form_id: &str) -> Result<FormView>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let actor = bearer_actor(&req, state)?;
    let body: StatusChangeRequest = parse_json_body(req).await?;
    let form = state
        .lifecycle
        .change_form_status(&actor, form_id, body.status)
        .await?;
    Ok(form.into())
}

async fn distribute<B>(req: Request<B>, state: &AppState, form_id: &str) -> Result<DistributionReport>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let actor = bearer_actor(&req, state)?;
    let body: DistributeRequest = parse_json_body(req).await?;
    state.distribution.distribute(&actor, form_id, &body).await
}

async fn public_link(state: &AppState, form_id: &str) -> Result<PublicLink> {
    state.distribution.issue_public_link(form_id).await
}

async fn report<B>(req: Request<B>, state: &AppState, form_id: &str) -> Result<FormReport> {
    let actor = bearer_actor(&req, state)?;
    with_timeout(
        state.args.store_timeout(),
        "form report",
        form_report(state.store.as_ref(), &actor, form_id),
    )
    .await
}

/// Handle `/forms` and `/forms/{id}/*`
pub async fn handle_forms_request<B>(req: Request<B>, state: &AppState) -> Response<BoxBody>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let path = req.uri().path().to_string();
    let segments = path_segments(&path);
    let method = req.method().clone();

    match (method, segments.as_slice()) {
        (Method::POST, ["forms"]) => respond(StatusCode::CREATED, create_form(req, state).await),
        (Method::POST, ["forms", id, "status"]) => {
            respond(StatusCode::OK, change_status(req, state, id).await)
        }
        (Method::POST, ["forms", id, "distribute"]) => {
            respond(StatusCode::OK, distribute(req, state, id).await)
        }
        (Method::POST, ["forms", id, "public-link"]) => {
            respond(StatusCode::CREATED, public_link(state, id).await)
        }
        (Method::GET, ["forms", id, "report"]) => respond(StatusCode::OK, report(req, state, id).await),
        (_, ["forms"]) | (_, ["forms", _, "status" | "distribute" | "public-link" | "report"]) => {
            method_not_allowed()
        }
        _ => not_found(&path),
    }
}
