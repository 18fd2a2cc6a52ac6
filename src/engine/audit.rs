use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{AccessState, Actor};

/// Stable action names recorded in the audit trail. Manual overrides are kept
/// distinct from plain approvals so audits can separate automated decisions,
/// human decisions, and human decisions that bypassed a failing verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RequestAccess,
    CancelRequest,
    AutoActivate,
    AutoRevoke,
    AutoDeny,
    ManualApprove,
    ManualOverride,
    ManualDeny,
    ManualRevoke,
    RecordCompletion,
    PublishDocument,
    AcknowledgeDocument,
    Provision,
}

impl AuditAction {
    pub const fn label(self) -> &'static str {
        match self {
            AuditAction::RequestAccess => "request_access",
            AuditAction::CancelRequest => "cancel_request",
            AuditAction::AutoActivate => "auto_activate",
            AuditAction::AutoRevoke => "auto_revoke",
            AuditAction::AutoDeny => "auto_deny",
            AuditAction::ManualApprove => "manual_approve",
            AuditAction::ManualOverride => "manual_override",
            AuditAction::ManualDeny => "manual_deny",
            AuditAction::ManualRevoke => "manual_revoke",
            AuditAction::RecordCompletion => "record_completion",
            AuditAction::PublishDocument => "publish_document",
            AuditAction::AcknowledgeDocument => "acknowledge_document",
            AuditAction::Provision => "provision",
        }
    }
}

/// Write-once record of a state change. The system of record for "what
/// happened when"; never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub actor: Actor,
    pub action: AuditAction,
    pub entity: &'static str,
    pub entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_state: Option<AccessState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_state: Option<AccessState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Audit persistence error.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit log unavailable: {0}")]
    Unavailable(String),
}

/// Append-only sink for audit entries. No update or delete operation is
/// exposed; the read path exists solely for the history query.
pub trait AuditRecorder: Send + Sync {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Entries for one entity, oldest first.
    fn entries_for(&self, entity: &str, entity_id: &str) -> Result<Vec<AuditEntry>, AuditError>;
}

/// Entity tag used for authorization audit rows.
pub const ENTITY_AUTHORIZATION: &str = "authorization";
pub const ENTITY_COMPLETION: &str = "completion";
pub const ENTITY_DOCUMENT: &str = "document";
pub const ENTITY_ACKNOWLEDGMENT: &str = "acknowledgment";
