use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Deposit,
    Withdraw,
    Transfer,
    AccountCreated,
    AccountUpdated,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEntityType {
    Account,
    Transaction,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    Failed,
}

/// One entry in the append-only audit trail. Shaped by the engine, stored
/// by whatever sink is plugged in.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub entity_type: AuditEntityType,
    /// Id of the affected entity, when one exists.
    pub entity_id: Option<u64>,
    pub status: AuditStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn success(
        action: AuditAction,
        entity_type: AuditEntityType,
        entity_id: Option<u64>,
        description: String,
    ) -> Self {
        Self::new(action, entity_type, entity_id, AuditStatus::Success, description)
    }

    pub fn failure(
        action: AuditAction,
        entity_type: AuditEntityType,
        entity_id: Option<u64>,
        description: String,
    ) -> Self {
        Self::new(action, entity_type, entity_id, AuditStatus::Failed, description)
    }

    fn new(
        action: AuditAction,
        entity_type: AuditEntityType,
        entity_id: Option<u64>,
        status: AuditStatus,
        description: String,
    ) -> Self {
        Self {
            action,
            entity_type,
            entity_id,
            status,
            description,
            created_at: Utc::now(),
        }
    }
}
