//! Audit logging for security-relevant mutations
//!
//! Records are fire-and-forget from the caller's side: a failing sink is
//! reported through `tracing` and never fails the primary operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::types::Result;

/// Audited actions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Admin reset another user's password
    CredentialReset,
    /// Admin changed a user's role
    RoleChange,
    /// User changed their own password
    CredentialChange,
}

/// One audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub actor_id: String,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl AuditRecord {
    pub fn new(actor_id: &str, action: AuditAction, entity_type: &str, entity_id: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            actor_id: actor_id.to_string(),
            action,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Convert to JSONL line
    pub fn to_jsonl(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, record: &AuditRecord) -> Result<()>;
}

/// Appends records to a JSONL file
pub struct JsonlAuditSink {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Audit logging initialized to {}", path.display());
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<()> {
        let line = record
            .to_jsonl()
            .map_err(|e| crate::types::SurveyError::Internal(format!("audit encode: {}", e)))?;
        let mut writer = self.writer.lock().await;
        writeln!(writer, "{}", line)?;
        // Flush every record for durability
        writer.flush()?;
        Ok(())
    }
}

/// Emits records as `tracing` events on target `audit`
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<()> {
        info!(
            target: "audit",
            actor_id = %record.actor_id,
            action = ?record.action,
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            detail = ?record.detail,
            "audit"
        );
        Ok(())
    }
}

/// Handle the core uses to emit audit records
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Write in the background; failures go to the error log only
    pub fn emit(&self, record: AuditRecord) {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(e) = sink.write(&record).await {
                error!(
                    target: "audit",
                    "Failed to write audit record {:?} for {} {}: {}",
                    record.action, record.entity_type, record.entity_id, e
                );
            }
        });
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serialization() {
        let record = AuditRecord::new("admin-1", AuditAction::RoleChange, "user", "user-7")
            .with_detail(serde_json::json!({ "from": "VIEWER", "to": "EDITOR" }));

        let jsonl = record.to_jsonl().unwrap();
        assert!(jsonl.contains("role_change"));
        assert!(jsonl.contains("admin-1"));
        assert!(jsonl.contains("EDITOR"));
    }

    #[test]
    fn test_jsonl_sink_appends() {
        let path = std::env::temp_dir().join(format!("audit-{}.jsonl", uuid::Uuid::new_v4()));
        let sink = JsonlAuditSink::open(&path).unwrap();

        tokio_test::block_on(async {
            for action in [AuditAction::CredentialReset, AuditAction::CredentialChange] {
                sink.write(&AuditRecord::new("a", action, "user", "u"))
                    .await
                    .unwrap();
            }
        });

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AuditRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.action, AuditAction::CredentialReset);
        let _ = std::fs::remove_file(path);
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn write(&self, _record: &AuditRecord) -> Result<()> {
            Err(crate::types::SurveyError::Internal("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_propagate() {
        let logger = AuditLogger::new(Arc::new(FailingSink));
        logger.emit(AuditRecord::new("a", AuditAction::RoleChange, "user", "u"));
        tokio::task::yield_now().await;
    }
}
