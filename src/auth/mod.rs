//! Authentication and authorization
//!
//! Provides:
//! - JWT session token issuance and validation
//! - Roles and the operation whitelist
//! - Password hashing with Argon2
//! - Rate-limited login and audited account management

pub mod accounts;
pub mod jwt;
pub mod login;
pub mod password;
pub mod permissions;

pub use accounts::{AccountService, ChangePasswordRequest, ResetPasswordRequest};
pub use jwt::{extract_token_from_header, Claims, IssuedToken, JwtValidator};
pub use login::{LoginOutcome, LoginService};
pub use password::{hash_password, verify_password, MIN_PASSWORD_LEN};
pub use permissions::{operation_description, required_role, Actor, Role};
