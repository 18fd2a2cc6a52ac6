use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::audit::{AuditAction, AuditEntry, AuditRecorder, ENTITY_AUTHORIZATION};
use super::authorization::{self, AccessError, TransitionOutcome};
use super::domain::{AccessState, Actor, Authorization, FacilityId, PersonId};
use super::evaluation::QualificationEvaluator;
use super::repository::{AccessStore, ComplianceReads, RepositoryError};

/// Policy knobs for a batch run, snapshotted from configuration so the run is
/// reproducible from its inputs.
#[derive(Debug, Clone, Copy)]
pub struct AutocheckPolicy {
    /// When true, a pending record that fails evaluation is revoked by the
    /// system actor instead of waiting for a manual decision.
    pub auto_deny: bool,
    /// Bounded worker count for processing records.
    pub workers: usize,
}

impl Default for AutocheckPolicy {
    fn default() -> Self {
        Self {
            auto_deny: false,
            workers: 4,
        }
    }
}

/// One (person, facility) pair outcome in the batch summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairOutcome {
    pub person: PersonId,
    pub facility: FacilityId,
    pub detail: String,
}

/// A record the batch could not evaluate. Captured in the summary, never
/// allowed to abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub person: PersonId,
    pub facility: FacilityId,
    pub error: String,
}

/// Aggregate result of one autocheck sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutocheckSummary {
    pub as_of: NaiveDate,
    pub granted: Vec<PairOutcome>,
    pub revoked: Vec<PairOutcome>,
    pub denied: Vec<PairOutcome>,
    pub unchanged: Vec<PairOutcome>,
    pub errors: Vec<RecordFailure>,
}

impl AutocheckSummary {
    fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            granted: Vec::new(),
            revoked: Vec::new(),
            denied: Vec::new(),
            unchanged: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// True when the run changed no record: the idempotence check for a
    /// repeated sweep with no intervening data changes.
    pub fn delta_is_empty(&self) -> bool {
        self.granted.is_empty() && self.revoked.is_empty() && self.denied.is_empty()
    }
}

enum RecordOutcome {
    Granted(PairOutcome),
    Revoked(PairOutcome),
    Denied(PairOutcome),
    Unchanged(PairOutcome),
    Failed(RecordFailure),
}

/// Re-evaluate every pending and active authorization and apply transitions
/// with the system actor. Safe to repeat: a second consecutive run with no
/// data changes produces an empty granted/revoked/denied delta. Records are
/// processed independently with bounded workers; a per-record failure is
/// reported in the summary while the rest of the batch proceeds.
pub fn run<S, A>(
    store: &S,
    audit: &A,
    as_of: NaiveDate,
    now: DateTime<Utc>,
    policy: &AutocheckPolicy,
) -> Result<AutocheckSummary, AccessError>
where
    S: ComplianceReads + AccessStore,
    A: AuditRecorder,
{
    let mut records = store.authorizations_in(&[AccessState::Pending, AccessState::Active])?;
    records.sort_by(|a, b| {
        a.person
            .cmp(&b.person)
            .then_with(|| a.facility.cmp(&b.facility))
    });

    let outcomes = process_all(store, audit, records, as_of, now, policy)?;

    let mut summary = AutocheckSummary::new(as_of);
    for outcome in outcomes {
        match outcome {
            RecordOutcome::Granted(pair) => summary.granted.push(pair),
            RecordOutcome::Revoked(pair) => summary.revoked.push(pair),
            RecordOutcome::Denied(pair) => summary.denied.push(pair),
            RecordOutcome::Unchanged(pair) => summary.unchanged.push(pair),
            RecordOutcome::Failed(failure) => summary.errors.push(failure),
        }
    }

    info!(
        granted = summary.granted.len(),
        revoked = summary.revoked.len(),
        denied = summary.denied.len(),
        unchanged = summary.unchanged.len(),
        errors = summary.errors.len(),
        %as_of,
        "autocheck sweep finished"
    );

    Ok(summary)
}

fn process_all<S, A>(
    store: &S,
    audit: &A,
    records: Vec<Authorization>,
    as_of: NaiveDate,
    now: DateTime<Utc>,
    policy: &AutocheckPolicy,
) -> Result<Vec<RecordOutcome>, AccessError>
where
    S: ComplianceReads + AccessStore,
    A: AuditRecorder,
{
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let workers = policy.workers.clamp(1, records.len());
    if workers == 1 {
        return Ok(records
            .into_iter()
            .map(|record| process_record(store, audit, record, as_of, now, policy))
            .collect());
    }

    let chunk_size = records.len().div_ceil(workers);
    let mut collected = Vec::with_capacity(records.len());
    let mut worker_panicked = false;

    std::thread::scope(|scope| {
        let handles: Vec<_> = records
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .cloned()
                        .map(|record| process_record(store, audit, record, as_of, now, policy))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            match handle.join() {
                Ok(batch) => collected.extend(batch),
                Err(_) => worker_panicked = true,
            }
        }
    });

    if worker_panicked {
        return Err(AccessError::Repository(RepositoryError::Unavailable(
            "autocheck worker panicked".to_string(),
        )));
    }

    // Workers may interleave chunks; restore deterministic summary order.
    collected.sort_by(|a, b| outcome_key(a).cmp(&outcome_key(b)));
    Ok(collected)
}

fn outcome_key(outcome: &RecordOutcome) -> (PersonId, FacilityId) {
    match outcome {
        RecordOutcome::Granted(pair)
        | RecordOutcome::Revoked(pair)
        | RecordOutcome::Denied(pair)
        | RecordOutcome::Unchanged(pair) => (pair.person.clone(), pair.facility.clone()),
        RecordOutcome::Failed(failure) => (failure.person.clone(), failure.facility.clone()),
    }
}

fn process_record<S, A>(
    store: &S,
    audit: &A,
    mut record: Authorization,
    as_of: NaiveDate,
    now: DateTime<Utc>,
    policy: &AutocheckPolicy,
) -> RecordOutcome
where
    S: ComplianceReads + AccessStore,
    A: AuditRecorder,
{
    let person = record.person.clone();
    let facility = record.facility.clone();

    let result = evaluate_and_apply(store, audit, &mut record, as_of, now, policy);
    match result {
        Ok((outcome, detail)) => {
            let pair = PairOutcome {
                person,
                facility,
                detail,
            };
            match outcome {
                TransitionOutcome::Activated => RecordOutcome::Granted(pair),
                TransitionOutcome::Revoked => RecordOutcome::Revoked(pair),
                TransitionOutcome::Denied => RecordOutcome::Denied(pair),
                TransitionOutcome::Unchanged => RecordOutcome::Unchanged(pair),
            }
        }
        Err(error) => {
            warn!(%person, %facility, %error, "autocheck record failed");
            RecordOutcome::Failed(RecordFailure {
                person,
                facility,
                error: error.to_string(),
            })
        }
    }
}

fn evaluate_and_apply<S, A>(
    store: &S,
    audit: &A,
    record: &mut Authorization,
    as_of: NaiveDate,
    now: DateTime<Utc>,
    policy: &AutocheckPolicy,
) -> Result<(TransitionOutcome, String), AccessError>
where
    S: ComplianceReads + AccessStore,
    A: AuditRecorder,
{
    let actor = Actor::Autocheck;
    let verdict =
        QualificationEvaluator::new(store).evaluate(&record.person, &record.facility, as_of)?;

    let prior_state = record.state;
    let outcome = authorization::apply_verdict(record, &verdict, &actor, now, policy.auto_deny)?;

    let action = match outcome {
        TransitionOutcome::Activated => Some(AuditAction::AutoActivate),
        TransitionOutcome::Revoked => Some(AuditAction::AutoRevoke),
        TransitionOutcome::Denied => Some(AuditAction::AutoDeny),
        TransitionOutcome::Unchanged => None,
    };

    if let Some(action) = action {
        store.update_authorization(record.clone(), prior_state)?;
        audit.append(AuditEntry {
            at: now,
            actor,
            action,
            entity: ENTITY_AUTHORIZATION,
            entity_id: record.pair_key(),
            prior_state: Some(prior_state),
            new_state: Some(record.state),
            detail: Some(verdict.reason_text()),
        })?;
        info!(
            person = %record.person,
            facility = %record.facility,
            action = action.label(),
            "autocheck transition applied"
        );
    }

    Ok((outcome, verdict.reason_text()))
}
