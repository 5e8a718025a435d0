//! HTTP routes for the survey gateway
//!
//! Handlers are generic over the request body so they can be driven with
//! in-memory bodies in tests and with `hyper::body::Incoming` in production.

pub mod auth_routes;
pub mod forms;
pub mod health;
pub mod responses;

pub use auth_routes::{handle_admin_users_request, handle_auth_request};
pub use forms::handle_forms_request;
pub use health::{health_check, version_info};
pub use responses::handle_response_request;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::error;

use crate::auth::{extract_token_from_header, Actor};
use crate::server::AppState;
use crate::types::{Result, SurveyError};
use crate::validation::FieldError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Error bound accepted from request bodies
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Largest accepted JSON body
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Error body returned for every failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    full_body(Bytes::new())
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    let mut response = Response::new(full_body(json));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    apply_cors(headers);
    response
}

/// Map an error to its status and body; internal detail stays in the log
pub fn error_response(err: &SurveyError) -> Response<BoxBody> {
    if err.is_internal() {
        error!("Request failed: {}", err);
    }

    let fields = match err {
        SurveyError::InvalidInput(fields) => Some(fields.clone()),
        _ => None,
    };
    let mut response = json_response(
        err.status_code(),
        &ErrorResponse {
            error: err.public_message(),
            code: err.code().to_string(),
            fields,
        },
    );

    if let SurveyError::RateLimited {
        retry_after_secs, ..
    } = err
    {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
    }
    response
}

/// JSON body on success, error body otherwise
pub fn respond<T: Serialize>(status: StatusCode, result: Result<T>) -> Response<BoxBody> {
    match result {
        Ok(body) => json_response(status, &body),
        Err(e) => error_response(&e),
    }
}

pub fn cors_preflight() -> Response<BoxBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    apply_cors(headers);
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

pub fn not_found(path: &str) -> Response<BoxBody> {
    error_response(&SurveyError::NotFound(format!("route {}", path)))
}

pub fn method_not_allowed() -> Response<BoxBody> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &ErrorResponse {
            error: "Method not allowed".into(),
            code: "METHOD_NOT_ALLOWED".into(),
            fields: None,
        },
    )
}

pub async fn parse_json_body<T, B>(req: Request<B>) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    B: Body,
    B::Error: Into<BoxError>,
{
    // The limit is enforced while reading, before anything is buffered past it
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                SurveyError::Http("Request body too large".into())
            } else {
                SurveyError::Http(format!("Failed to read body: {}", e))
            }
        })?;

    let bytes = body.to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| SurveyError::Http(format!("Invalid JSON: {}", e)))
}

/// Caller identity from the `Authorization: Bearer` header
pub fn bearer_actor<B>(req: &Request<B>, state: &AppState) -> Result<Actor> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| SurveyError::Unauthorized("missing bearer token".into()))?;
    let token = extract_token_from_header(value)
        .ok_or_else(|| SurveyError::Unauthorized("malformed authorization header".into()))?;
    state.jwt.validate(token)
}

/// Client address for throttling
///
/// The first `X-Forwarded-For` hop is used only when `trust_forwarded` is set;
/// otherwise a client could pick its own throttle key.
pub fn client_ip<B>(req: &Request<B>, addr: SocketAddr, trust_forwarded: bool) -> String {
    if !trust_forwarded {
        return addr.ip().to_string();
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| addr.ip().to_string())
}

/// Path segments without the leading slash or a query string
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('?')
        .next()
        .unwrap_or(path)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_error_response_shape() {
        let err = SurveyError::invalid_field("title", "must not be empty");
        let response = error_response(&err);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let err = SurveyError::RateLimited {
            locked_until: Utc::now(),
            retry_after_secs: 42,
        };
        let response = error_response(&err);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }

    #[tokio::test]
    async fn test_parse_json_body() {
        #[derive(Deserialize)]
        struct Named {
            name: String,
        }

        let req = Request::new(Full::new(Bytes::from(r#"{"name":"pulse"}"#)));
        let parsed: Named = parse_json_body(req).await.unwrap();
        assert_eq!(parsed.name, "pulse");

        let req = Request::new(Full::new(Bytes::from("{not json")));
        let bad: Result<Named> = parse_json_body(req).await;
        assert!(matches!(bad, Err(SurveyError::Http(_))));
    }

    #[tokio::test]
    async fn test_parse_json_body_rejects_oversized() {
        #[derive(Debug, Deserialize)]
        struct Named {
            #[allow(dead_code)]
            name: String,
        }

        let huge = format!(r#"{{"name":"{}"}}"#, "x".repeat(MAX_BODY_BYTES + 1));
        let req = Request::new(Full::new(Bytes::from(huge)));
        match parse_json_body::<Named, _>(req).await {
            Err(SurveyError::Http(msg)) => assert_eq!(msg, "Request body too large"),
            other => panic!("expected body too large, got {:?}", other),
        }
    }

    #[test]
    fn test_client_ip_ignores_forwarded_unless_trusted() {
        let addr: SocketAddr = "10.0.0.9:5000".parse().unwrap();
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&req, addr, false), "10.0.0.9");
        assert_eq!(client_ip(&req, addr, true), "203.0.113.7");

        let req = Request::new(());
        assert_eq!(client_ip(&req, addr, true), "10.0.0.9");
    }

    #[test]
    fn test_path_segments() {
        assert_eq!(path_segments("/forms/abc/status?x=1"), vec!["forms", "abc", "status"]);
        assert_eq!(path_segments("/"), Vec::<&str>::new());
    }
}
