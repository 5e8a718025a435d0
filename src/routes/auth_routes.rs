//! HTTP routes for authentication and account administration
//!
//! - POST /auth/login                  - exchange credentials for a JWT
//! - POST /auth/password               - change own password
//! - POST /admin/users/{id}/password   - reset another user's password (admin)
//! - POST /admin/users/{id}/role       - change a user's role (admin)

use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{
    bearer_actor, method_not_allowed, not_found, parse_json_body, path_segments, respond, BoxBody,
    BoxError,
};
use crate::auth::{ChangePasswordRequest, ResetPasswordRequest, Role};
use crate::db::schemas::UserDoc;
use crate::server::AppState;
use crate::types::Result;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: i64,
    pub user_id: String,
    pub identifier: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct RoleChangeRequest {
    pub role: Role,
}

/// User as shown to admins; never includes the hash
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub identifier: String,
    pub role: Role,
    pub is_active: bool,
}

impl From<UserDoc> for UserSummary {
    fn from(user: UserDoc) -> Self {
        Self {
            id: user.id,
            identifier: user.identifier,
            role: user.role,
            is_active: user.is_active,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub updated: bool,
}

/// POST /auth/login
async fn login<B>(req: Request<B>, state: &AppState) -> Result<LoginResponse>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let body: LoginRequest = parse_json_body(req).await?;
    let outcome = state.login.login(&body.identifier, &body.password).await?;
    Ok(LoginResponse {
        token: outcome.token,
        expires_at: outcome.expires_at,
        user_id: outcome.user_id,
        identifier: outcome.identifier,
        role: outcome.role,
    })
}

/// POST /auth/password
async fn change_password<B>(req: Request<B>, state: &AppState) -> Result<UpdatedResponse>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let actor = bearer_actor(&req, state)?;
    let body: ChangePasswordRequest = parse_json_body(req).await?;
    state.accounts.change_own_password(&actor, &body).await?;
    Ok(UpdatedResponse { updated: true })
}

/// POST /admin/users/{id}/password
async fn reset_password<B>(req: Request<B>, state: &AppState, user_id: &str) -> Result<UpdatedResponse>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let actor = bearer_actor(&req, state)?;
    let body: ResetPasswordRequest = parse_json_body(req).await?;
    state.accounts.reset_password(&actor, user_id, &body).await?;
    Ok(UpdatedResponse { updated: true })
}

/// POST /admin/users/{id}/role
async fn change_role<B>(req: Request<B>, state: &AppState, user_id: &str) -> Result<UserSummary>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let actor = bearer_actor(&req, state)?;
    let body: RoleChangeRequest = parse_json_body(req).await?;
    let user = state.accounts.change_role(&actor, user_id, body.role).await?;
    Ok(UserSummary::from(user))
}

/// Handle `/auth/*`
pub async fn handle_auth_request<B>(req: Request<B>, state: &AppState) -> Response<BoxBody>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let path = req.uri().path().to_string();
    match (req.method(), path.as_str()) {
        (&Method::POST, "/auth/login") => respond(StatusCode::OK, login(req, state).await),
        (&Method::POST, "/auth/password") => respond(StatusCode::OK, change_password(req, state).await),
        (_, "/auth/login") | (_, "/auth/password") => method_not_allowed(),
        _ => not_found(&path),
    }
}

/// Handle `/admin/users/{id}/{password|role}`
pub async fn handle_admin_users_request<B>(req: Request<B>, state: &AppState) -> Response<BoxBody>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let path = req.uri().path().to_string();
    let (user_id, action) = match path_segments(&path).as_slice() {
        ["admin", "users", id, action] => (id.to_string(), action.to_string()),
        _ => return not_found(&path),
    };
    if req.method() != Method::POST {
        return method_not_allowed();
    }

    match action.as_str() {
        "password" => respond(StatusCode::OK, reset_password(req, state, &user_id).await),
        "role" => respond(StatusCode::OK, change_role(req, state, &user_id).await),
        _ => not_found(&path),
    }
}
