//! Database layer
//!
//! MongoDB client, document schemas and the persistence traits the core
//! talks to.

pub mod mongo;
pub mod mongo_store;
pub mod schemas;
pub mod store;

pub use mongo::MongoClient;
pub use mongo_store::MongoStore;
pub use store::{MemoryStore, SurveyStore, TicketFilter, TicketPatch, UserStore};
