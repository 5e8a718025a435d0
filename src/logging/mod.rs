//! Logging infrastructure
//!
//! Structured audit records for security-relevant mutations.

pub mod audit;

pub use audit::{AuditAction, AuditLogger, AuditRecord, AuditSink, JsonlAuditSink, TracingAuditSink};
