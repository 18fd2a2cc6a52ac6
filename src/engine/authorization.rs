use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audit::AuditError;
use super::domain::{AccessState, Actor, Authorization, FacilityId, PersonId};
use super::evaluation::{EvaluationError, Verdict};
use super::repository::RepositoryError;

/// Errors surfaced by the authorization engine. Invariant violations and
/// illegal transitions always reach the caller synchronously; they are never
/// silently corrected.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{person} already has a {state} authorization for {facility}")]
    DuplicateRequest {
        person: PersonId,
        facility: FacilityId,
        state: AccessState,
    },
    #[error("illegal transition from {from}: {action}")]
    IllegalTransition {
        from: AccessState,
        action: &'static str,
    },
    #[error("actor {actor} is not permitted to {action}")]
    Unauthorized { actor: String, action: &'static str },
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Outcome of feeding one verdict through the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// pending -> active
    Activated,
    /// active -> revoked
    Revoked,
    /// pending -> revoked under the autocheck auto-deny policy
    Denied,
    /// Idempotent re-application; nothing changed.
    Unchanged,
}

impl TransitionOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            TransitionOutcome::Activated => "activated",
            TransitionOutcome::Revoked => "revoked",
            TransitionOutcome::Denied => "denied",
            TransitionOutcome::Unchanged => "unchanged",
        }
    }
}

/// Outcome of a manual decision on a pending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualOutcome {
    /// Approved with a passing verdict.
    Approved,
    /// Approved despite a failing verdict; flagged distinctly in the audit
    /// trail so automated and human decisions stay distinguishable.
    Overridden,
    Denied,
}

/// Apply a qualification verdict to an authorization record in place.
///
/// Legal transitions: pending -> active, pending -> revoked (auto-deny),
/// active -> revoked. active + qualified and revoked + unqualified are
/// no-ops. revoked + qualified is rejected: reactivation requires a fresh
/// request, never a direct revoked -> active jump.
pub fn apply_verdict(
    record: &mut Authorization,
    verdict: &Verdict,
    actor: &Actor,
    at: DateTime<Utc>,
    auto_deny: bool,
) -> Result<TransitionOutcome, AccessError> {
    match (record.state, verdict.qualified) {
        (AccessState::Pending, true) => {
            activate(record, actor, at);
            Ok(TransitionOutcome::Activated)
        }
        (AccessState::Pending, false) => {
            if actor.is_system() && auto_deny {
                revoke(record, actor, at, verdict.reason_text());
                Ok(TransitionOutcome::Denied)
            } else {
                // Manual decision required; the record stays pending.
                Ok(TransitionOutcome::Unchanged)
            }
        }
        (AccessState::Active, true) => Ok(TransitionOutcome::Unchanged),
        (AccessState::Active, false) => {
            revoke(record, actor, at, verdict.reason_text());
            Ok(TransitionOutcome::Revoked)
        }
        (AccessState::Revoked, false) => Ok(TransitionOutcome::Unchanged),
        (AccessState::Revoked, true) => Err(AccessError::IllegalTransition {
            from: AccessState::Revoked,
            action: "activate a revoked authorization; submit a new request",
        }),
    }
}

/// Approve or deny a pending record. Only approvers and administrators may
/// decide; approving over a failing verdict is permitted but reported as an
/// override so the caller can audit it distinctly.
pub fn manual_decision(
    record: &mut Authorization,
    approve: bool,
    verdict: &Verdict,
    actor: &Actor,
    at: DateTime<Utc>,
) -> Result<ManualOutcome, AccessError> {
    if !actor.may_decide() {
        return Err(AccessError::Unauthorized {
            actor: actor.label(),
            action: "decide on access requests",
        });
    }

    if record.state != AccessState::Pending {
        return Err(AccessError::IllegalTransition {
            from: record.state,
            action: "apply a manual decision to a non-pending authorization",
        });
    }

    if approve {
        activate(record, actor, at);
        if verdict.qualified {
            Ok(ManualOutcome::Approved)
        } else {
            Ok(ManualOutcome::Overridden)
        }
    } else {
        let reason = if verdict.qualified {
            format!("denied by {}", actor.label())
        } else {
            verdict.reason_text()
        };
        revoke(record, actor, at, reason);
        Ok(ManualOutcome::Denied)
    }
}

/// Withdraw a pending request (pending -> revoked, requester-initiated).
pub fn cancel_request(
    record: &mut Authorization,
    actor: &Actor,
    at: DateTime<Utc>,
) -> Result<(), AccessError> {
    if record.state != AccessState::Pending {
        return Err(AccessError::IllegalTransition {
            from: record.state,
            action: "cancel a non-pending request",
        });
    }

    revoke(record, actor, at, "cancelled by requester".to_string());
    Ok(())
}

fn activate(record: &mut Authorization, actor: &Actor, at: DateTime<Utc>) {
    record.state = AccessState::Active;
    record.activated_at = Some(at);
    record.activated_by = Some(actor.clone());
    record.reason = None;
}

fn revoke(record: &mut Authorization, actor: &Actor, at: DateTime<Utc>, reason: String) {
    record.state = AccessState::Revoked;
    record.revoked_at = Some(at);
    record.revoked_by = Some(actor.clone());
    record.reason = Some(reason);
}
