//! Rate-limited login
//!
//! Every attempt counts against the identifier's login limiter record; a
//! successful login clears it.

use std::sync::Arc;
use tracing::{info, warn};

use super::jwt::JwtValidator;
use super::password::verify_password;
use super::permissions::Role;
use crate::db::UserStore;
use crate::limiter::{normalize_identity, AttemptLimiter};
use crate::types::{Result, SurveyError};

/// Successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub expires_at: i64,
    pub user_id: String,
    pub identifier: String,
    pub role: Role,
}

pub struct LoginService {
    users: Arc<dyn UserStore>,
    limiter: Arc<AttemptLimiter>,
    jwt: JwtValidator,
}

impl LoginService {
    pub fn new(users: Arc<dyn UserStore>, limiter: Arc<AttemptLimiter>, jwt: JwtValidator) -> Self {
        Self {
            users,
            limiter,
            jwt,
        }
    }

    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginOutcome> {
        let identifier = normalize_identity(identifier);
        if identifier.is_empty() || password.is_empty() {
            return Err(SurveyError::invalid_field(
                "identifier",
                "identifier and password are required",
            ));
        }

        if let Err(e) = self.limiter.enforce(&identifier) {
            warn!("Login locked out: {}", identifier);
            return Err(e);
        }

        // Same error for unknown user and wrong password to prevent enumeration
        let invalid = || SurveyError::Unauthorized("invalid credentials".into());

        let user = match self.users.find_user_by_identifier(&identifier).await? {
            Some(user) if user.is_active => user,
            _ => {
                warn!("Login failed - unknown or inactive user: {}", identifier);
                return Err(invalid());
            }
        };

        if !verify_password(password, &user.password_hash)? {
            warn!("Login failed - invalid password: {}", identifier);
            return Err(invalid());
        }

        self.limiter.reset(&identifier);
        let issued = self.jwt.issue(&user.id, user.role)?;
        info!("Login successful: {}", identifier);

        Ok(LoginOutcome {
            token: issued.token,
            expires_at: issued.expires_at,
            user_id: user.id,
            identifier: user.identifier,
            role: user.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash_password;
    use crate::db::schemas::UserDoc;
    use crate::db::MemoryStore;
    use crate::limiter::LimitConfig;

    async fn setup() -> (LoginService, Arc<AttemptLimiter>) {
        let store = MemoryStore::new();
        store
            .create_user(UserDoc::new(
                "ana@example.com".into(),
                hash_password("hunter2-hunter2").unwrap(),
                Role::Editor,
            ))
            .await
            .unwrap();
        let limiter = Arc::new(AttemptLimiter::new("login", LimitConfig::login()));
        let service = LoginService::new(
            Arc::new(store),
            Arc::clone(&limiter),
            JwtValidator::new("test-secret", 600),
        );
        (service, limiter)
    }

    #[tokio::test]
    async fn test_login_success_resets_limiter() {
        let (service, limiter) = setup().await;
        assert!(service.login("ana@example.com", "wrong").await.is_err());
        assert_eq!(limiter.len(), 1);

        let outcome = service
            .login("  ANA@example.com", "hunter2-hunter2")
            .await
            .unwrap();
        assert_eq!(outcome.role, Role::Editor);
        assert_eq!(outcome.identifier, "ana@example.com");
        assert!(limiter.is_empty());
    }

    #[tokio::test]
    async fn test_lockout_after_five_attempts() {
        let (service, _limiter) = setup().await;
        for _ in 0..4 {
            assert!(matches!(
                service.login("ana@example.com", "wrong").await,
                Err(SurveyError::Unauthorized(_))
            ));
        }
        // Fifth attempt is denied before the password is even checked
        assert!(matches!(
            service.login("ana@example.com", "hunter2-hunter2").await,
            Err(SurveyError::RateLimited { .. })
        ));
        assert!(matches!(
            service.login("Ana@Example.com", "hunter2-hunter2").await,
            Err(SurveyError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_user_same_error() {
        let (service, _limiter) = setup().await;
        match service.login("nobody@example.com", "whatever").await {
            Err(SurveyError::Unauthorized(msg)) => assert_eq!(msg, "invalid credentials"),
            other => panic!("expected Unauthorized, got {:?}", other),
        }
    }
}
