//! Roles and the operation whitelist
//!
//! The caller's identity and role are passed explicitly into every core
//! operation as an [`Actor`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Result, SurveyError};

/// Roles, ordered by privilege
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Role {
    /// Read reports
    #[default]
    Viewer = 0,
    /// Manage forms and distribution
    Editor = 1,
    /// Manage users
    Admin = 2,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Viewer => write!(f, "VIEWER"),
            Role::Editor => write!(f, "EDITOR"),
            Role::Admin => write!(f, "ADMIN"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = SurveyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VIEWER" => Ok(Role::Viewer),
            "EDITOR" => Ok(Role::Editor),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(SurveyError::invalid_field("role", format!("unknown role '{}'", s))),
        }
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    /// Fail with `Forbidden` unless this actor may perform `operation`
    pub fn require(&self, operation: &str) -> Result<()> {
        match required_role(operation) {
            Some(required) if self.role >= required => Ok(()),
            Some(required) => Err(SurveyError::Forbidden(format!(
                "{} requires {} role",
                operation_description(operation),
                required
            ))),
            None => Err(SurveyError::Forbidden(format!("unknown operation '{}'", operation))),
        }
    }
}

/// Minimum role for an operation; `None` for unknown operations (which are blocked)
pub fn required_role(operation: &str) -> Option<Role> {
    match operation {
        "view_report" => Some(Role::Viewer),

        "create_form" | "change_form_status" | "distribute" => Some(Role::Editor),

        "reset_credential" | "change_role" => Some(Role::Admin),

        _ => None,
    }
}

/// Human-readable operation name for messages and logs
pub fn operation_description(operation: &str) -> &'static str {
    match operation {
        "view_report" => "Viewing reports",
        "create_form" => "Creating forms",
        "change_form_status" => "Changing form status",
        "distribute" => "Distributing forms",
        "reset_credential" => "Resetting another user's password",
        "change_role" => "Changing roles",
        _ => "Unknown operation",
    }
}
