//! HTTP routes for respondents following a response URL
//!
//! - GET  /r/{token}            - open the ticket (PENDING becomes IN_PROGRESS)
//! - POST /r/{token}            - submit answers
//! - POST /r/{token}/progress   - save partial answers
//! - POST /r/{token}/abandon    - give up on the ticket

use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{method_not_allowed, not_found, parse_json_body, path_segments, respond, BoxBody, BoxError};
use crate::db::schemas::Answers;
use crate::lifecycle::ResponseStatus;
use crate::server::AppState;
use crate::services::TicketView;
use crate::types::Result;

#[derive(Debug, Deserialize)]
pub struct AnswersRequest {
    #[serde(default)]
    pub answers: Answers,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: ResponseStatus,
}

async fn submit<B>(req: Request<B>, state: &AppState, token: &str) -> Result<TicketView>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let body: AnswersRequest = parse_json_body(req).await?;
    state.lifecycle.submit(token, body.answers).await
}

async fn save_progress<B>(req: Request<B>, state: &AppState, token: &str) -> Result<TicketView>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let body: AnswersRequest = parse_json_body(req).await?;
    state.lifecycle.save_progress(token, body.answers).await
}

async fn abandon(state: &AppState, token: &str) -> Result<StatusResponse> {
    state.lifecycle.abandon(token).await?;
    Ok(StatusResponse {
        status: ResponseStatus::Abandoned,
    })
}

/// Handle `/r/{token}` and `/r/{token}/*`
pub async fn handle_response_request<B>(req: Request<B>, state: &AppState) -> Response<BoxBody>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let path = req.uri().path().to_string();
    let segments = path_segments(&path);
    let method = req.method().clone();

    match (method, segments.as_slice()) {
        (Method::GET, ["r", token]) => respond(StatusCode::OK, state.lifecycle.open(token).await),
        (Method::POST, ["r", token]) => respond(StatusCode::OK, submit(req, state, token).await),
        (Method::POST, ["r", token, "progress"]) => {
            respond(StatusCode::OK, save_progress(req, state, token).await)
        }
        (Method::POST, ["r", token, "abandon"]) => respond(StatusCode::OK, abandon(state, token).await),
        (_, ["r", _]) | (_, ["r", _, "progress" | "abandon"]) => method_not_allowed(),
        _ => not_found(&path),
    }
}
