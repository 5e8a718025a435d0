//! Account credential and role management
//!
//! Every mutation here is security-relevant and emits an audit record.

use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use super::permissions::{Actor, Role};
use crate::db::schemas::UserDoc;
use crate::db::UserStore;
use crate::logging::{AuditAction, AuditLogger, AuditRecord};
use crate::types::{Result, SurveyError};
use crate::validation::{Validate, Validator};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl Validate for ChangePasswordRequest {
    fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        v.check(!self.current_password.is_empty(), "currentPassword", "is required");
        check_new_password(&mut v, &self.new_password);
        v.check(
            self.new_password != self.current_password,
            "newPassword",
            "must differ from the current password",
        );
        v.finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

impl Validate for ResetPasswordRequest {
    fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        check_new_password(&mut v, &self.new_password);
        v.finish()
    }
}

fn check_new_password(v: &mut Validator, password: &str) {
    v.check(
        password.chars().count() >= MIN_PASSWORD_LEN,
        "newPassword",
        format!("must be at least {} characters", MIN_PASSWORD_LEN),
    );
}

pub struct AccountService {
    users: Arc<dyn UserStore>,
    audit: AuditLogger,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, audit: AuditLogger) -> Self {
        Self { users, audit }
    }

    async fn load(&self, user_id: &str) -> Result<UserDoc> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| SurveyError::NotFound(format!("user {}", user_id)))
    }

    /// Change the caller's own password; requires the current one
    pub async fn change_own_password(&self, actor: &Actor, req: &ChangePasswordRequest) -> Result<()> {
        req.validate()?;
        let user = self.load(&actor.id).await?;

        if !verify_password(&req.current_password, &user.password_hash)? {
            return Err(SurveyError::Unauthorized("current password is incorrect".into()));
        }

        self.users
            .update_password(&user.id, hash_password(&req.new_password)?)
            .await?;

        info!("User {} changed their password", user.id);
        self.audit.emit(AuditRecord::new(
            &actor.id,
            AuditAction::CredentialChange,
            "user",
            &user.id,
        ));
        Ok(())
    }

    /// Reset another user's password (admin only)
    pub async fn reset_password(
        &self,
        actor: &Actor,
        target_user_id: &str,
        req: &ResetPasswordRequest,
    ) -> Result<()> {
        actor.require("reset_credential")?;
        req.validate()?;
        let user = self.load(target_user_id).await?;

        self.users
            .update_password(&user.id, hash_password(&req.new_password)?)
            .await?;

        info!("Admin {} reset password for user {}", actor.id, user.id);
        self.audit.emit(AuditRecord::new(
            &actor.id,
            AuditAction::CredentialReset,
            "user",
            &user.id,
        ));
        Ok(())
    }

    /// Change a user's role (admin only)
    pub async fn change_role(&self, actor: &Actor, target_user_id: &str, role: Role) -> Result<UserDoc> {
        actor.require("change_role")?;
        let user = self.load(target_user_id).await?;
        let previous = user.role;

        let updated = self.users.update_role(&user.id, role).await?;

        info!(
            "Admin {} changed role of user {}: {} -> {}",
            actor.id, user.id, previous, role
        );
        self.audit.emit(
            AuditRecord::new(&actor.id, AuditAction::RoleChange, "user", &user.id)
                .with_detail(serde_json::json!({ "from": previous, "to": role })),
        );
        Ok(updated)
    }
}
