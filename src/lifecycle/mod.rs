//! Form and response lifecycle state machines
//!
//! Pure transition tables. Persistence and authorization live in
//! [`crate::services::lifecycle`].

mod form;
mod response;

pub use form::FormStatus;
pub use response::ResponseStatus;
