//! Database schemas
//!
//! MongoDB document structures for forms, response tickets and users.

mod form;
mod metadata;
mod ticket;
mod user;

pub use form::{FormDoc, Question, QuestionKind, FORM_COLLECTION};
pub use metadata::Metadata;
pub use ticket::{AnswerValue, Answers, TicketDoc, TICKET_COLLECTION};
pub use user::{UserDoc, USER_COLLECTION};
