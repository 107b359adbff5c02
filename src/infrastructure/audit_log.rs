use crate::domain::audit::{AuditEvent, AuditStatus};
use crate::domain::ports::AuditSink;
use crate::error::Result;
use async_trait::async_trait;

/// An audit sink that emits every event as a structured log line.
///
/// Used by the CLI, where the process log is the audit trail.
#[derive(Default, Clone)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        match event.status {
            AuditStatus::Success => tracing::info!(
                action = ?event.action,
                entity_type = ?event.entity_type,
                entity_id = ?event.entity_id,
                description = %event.description,
                "audit"
            ),
            AuditStatus::Failed => tracing::warn!(
                action = ?event.action,
                entity_type = ?event.entity_type,
                entity_id = ?event.entity_id,
                description = %event.description,
                "audit"
            ),
        }
        Ok(())
    }
}
