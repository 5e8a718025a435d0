//! Common types for the survey gateway
//!
//! One error enum for the whole crate. Handlers map it to HTTP through
//! [`SurveyError::status_code`] and never show internal detail to callers.

use chrono::{DateTime, Utc};
use hyper::StatusCode;
use thiserror::Error;

use crate::validation::FieldError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, SurveyError>;

/// Error kinds surfaced by the core
#[derive(Debug, Error)]
pub enum SurveyError {
    /// No identity, or an identity we could not verify
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Identity is known but its role is insufficient
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Shape or value violations with field-level detail
    #[error("Invalid input ({} field error(s))", .0.len())]
    InvalidInput(Vec<FieldError>),

    /// Illegal lifecycle move
    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Operation not allowed in the entity's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Duplicate unique key or resubmission against a terminal ticket
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited until {locked_until}")]
    RateLimited {
        locked_until: DateTime<Utc>,
        retry_after_secs: u64,
    },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SurveyError {
    /// Build a single-field validation error
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        SurveyError::InvalidInput(vec![FieldError::new(field, message)])
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            SurveyError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            SurveyError::Forbidden(_) => StatusCode::FORBIDDEN,
            SurveyError::NotFound(_) => StatusCode::NOT_FOUND,
            SurveyError::InvalidInput(_) | SurveyError::Http(_) => StatusCode::BAD_REQUEST,
            SurveyError::InvalidTransition { .. } | SurveyError::InvalidState(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SurveyError::Conflict(_) => StatusCode::CONFLICT,
            SurveyError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            SurveyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SurveyError::Database(_)
            | SurveyError::Auth(_)
            | SurveyError::Internal(_)
            | SurveyError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            SurveyError::Unauthorized(_) => "UNAUTHORIZED",
            SurveyError::Forbidden(_) => "FORBIDDEN",
            SurveyError::NotFound(_) => "NOT_FOUND",
            SurveyError::InvalidInput(_) => "INVALID_INPUT",
            SurveyError::InvalidTransition { .. } => "INVALID_TRANSITION",
            SurveyError::InvalidState(_) => "INVALID_STATE",
            SurveyError::Conflict(_) => "CONFLICT",
            SurveyError::RateLimited { .. } => "RATE_LIMITED",
            SurveyError::Timeout(_) => "TIMEOUT",
            SurveyError::Http(_) => "BAD_REQUEST",
            SurveyError::Database(_)
            | SurveyError::Auth(_)
            | SurveyError::Internal(_)
            | SurveyError::Io(_) => "INTERNAL",
        }
    }

    /// Whether this error hides its detail from the caller
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            SurveyError::Database(_)
                | SurveyError::Auth(_)
                | SurveyError::Internal(_)
                | SurveyError::Io(_)
                | SurveyError::Timeout(_)
        )
    }

    /// Message safe to return to a caller
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            "Internal error".to_string()
        } else {
            self.to_string()
        }
    }
}
