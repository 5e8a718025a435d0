//! survey-gate - NPS survey distribution and response gateway
//!
//! Distributes one-time response links to respondents, walks forms and
//! responses through their lifecycles, and reports Net Promoter Scores.
//!
//! ## Components
//!
//! - **Attempt limiter**: windowed brute-force and per-route throttling
//! - **Tokens**: cryptographically random response tokens and short codes
//! - **Distribution**: idempotent ticket issuance and public links
//! - **Scoring**: pure NPS summary and banding
//! - **Lifecycle**: form and response status machines

pub mod auth;
pub mod config;
pub mod db;
pub mod lifecycle;
pub mod limiter;
pub mod logging;
pub mod routes;
pub mod scoring;
pub mod server;
pub mod services;
pub mod tokens;
pub mod types;
pub mod validation;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, SurveyError};
