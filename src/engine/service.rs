use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use super::audit::{
    AuditAction, AuditEntry, AuditRecorder, ENTITY_ACKNOWLEDGMENT, ENTITY_AUTHORIZATION,
    ENTITY_COMPLETION, ENTITY_DOCUMENT,
};
use super::authorization::{self, AccessError, ManualOutcome, TransitionOutcome};
use super::autocheck::{self, AutocheckPolicy, AutocheckSummary};
use super::clock::Clock;
use super::domain::{
    AccessState, Acknowledgment, Actor, ArtifactRef, Authorization, Completion, Course, CourseId,
    Document, DocumentId, Facility, FacilityId, Person, PersonId, Requirement,
};
use super::evaluation::{QualificationEvaluator, Verdict};
use super::repository::{AccessStore, CatalogWrites, ComplianceReads, RepositoryError};
use super::reports::{self, ReportError};

/// Result of a document acknowledgment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AckOutcome {
    /// A new acknowledgment row was appended for the current version.
    Recorded { version: u32 },
    /// The current version was already acknowledged; nothing was written.
    AlreadyCurrent { version: u32 },
}

/// Read-only snapshot answering "where does this pair stand right now":
/// the current record, the full pair history, the audit trail, and a fresh
/// verdict.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationView {
    pub authorization: Authorization,
    pub history: Vec<Authorization>,
    pub audit: Vec<AuditEntry>,
    pub compliant_now: bool,
    pub verdict: Verdict,
}

/// Service composing the evaluator, the authorization state machine, the
/// autocheck orchestrator, and the audit recorder over abstract stores.
/// Role/permission checks for who may call which operation belong to the
/// access-control boundary in front of this service; the single in-engine
/// gate is the approver check on manual decisions.
pub struct AccessService<S, A, C> {
    store: Arc<S>,
    audit: Arc<A>,
    clock: C,
    policy: AutocheckPolicy,
}

impl<S, A, C> AccessService<S, A, C>
where
    S: ComplianceReads + CatalogWrites + AccessStore + 'static,
    A: AuditRecorder + 'static,
    C: Clock,
{
    pub fn new(store: Arc<S>, audit: Arc<A>, clock: C, policy: AutocheckPolicy) -> Self {
        Self {
            store,
            audit,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &AutocheckPolicy {
        &self.policy
    }

    // ------------------------------------------------------------------
    // Evaluation (read-only)
    // ------------------------------------------------------------------

    /// Qualification verdict for the pair as of the given date (today when
    /// omitted). Side-effect-free.
    pub fn evaluate(
        &self,
        person: &PersonId,
        facility: &FacilityId,
        as_of: Option<NaiveDate>,
    ) -> Result<Verdict, AccessError> {
        self.require_person(person)?;
        self.require_facility(facility)?;
        let as_of = as_of.unwrap_or_else(|| self.clock.today());
        let verdict = QualificationEvaluator::new(self.store.as_ref())
            .evaluate(person, facility, as_of)?;
        Ok(verdict)
    }

    // ------------------------------------------------------------------
    // Authorization lifecycle
    // ------------------------------------------------------------------

    /// Create a pending request for the pair. A pending or active record
    /// already covering the pair fails with `DuplicateRequest`; a revoked
    /// history does not block a fresh request.
    pub fn request_access(
        &self,
        person: &PersonId,
        facility: &FacilityId,
        actor: Actor,
    ) -> Result<Authorization, AccessError> {
        self.require_person(person)?;
        self.require_facility(facility)?;

        let now = self.clock.now();
        let record = self
            .store
            .insert_authorization(person, facility, actor.clone(), now)
            .map_err(|error| match error {
                RepositoryError::Conflict => self.duplicate_request(person, facility),
                other => AccessError::Repository(other),
            })?;

        self.audit.append(AuditEntry {
            at: now,
            actor,
            action: AuditAction::RequestAccess,
            entity: ENTITY_AUTHORIZATION,
            entity_id: record.pair_key(),
            prior_state: None,
            new_state: Some(AccessState::Pending),
            detail: None,
        })?;
        info!(%person, %facility, "access requested");
        Ok(record)
    }

    /// Withdraw a pending request.
    pub fn cancel_request(
        &self,
        person: &PersonId,
        facility: &FacilityId,
        actor: Actor,
    ) -> Result<Authorization, AccessError> {
        let mut record = self.require_authorization(person, facility)?;
        let prior_state = record.state;
        let now = self.clock.now();

        authorization::cancel_request(&mut record, &actor, now)?;
        self.store.update_authorization(record.clone(), prior_state)?;
        self.audit.append(AuditEntry {
            at: now,
            actor,
            action: AuditAction::CancelRequest,
            entity: ENTITY_AUTHORIZATION,
            entity_id: record.pair_key(),
            prior_state: Some(prior_state),
            new_state: Some(record.state),
            detail: None,
        })?;
        Ok(record)
    }

    /// Evaluate the pair now and feed the verdict through the state machine
    /// on behalf of the given actor.
    pub fn apply_verdict(
        &self,
        person: &PersonId,
        facility: &FacilityId,
        actor: Actor,
    ) -> Result<(TransitionOutcome, Verdict), AccessError> {
        let mut record = self.require_authorization(person, facility)?;
        let verdict = self.evaluate(person, facility, None)?;

        let prior_state = record.state;
        let now = self.clock.now();
        let outcome =
            authorization::apply_verdict(&mut record, &verdict, &actor, now, self.policy.auto_deny)?;

        if let Some(action) = transition_action(outcome, &actor) {
            self.store.update_authorization(record.clone(), prior_state)?;
            self.audit.append(AuditEntry {
                at: now,
                actor,
                action,
                entity: ENTITY_AUTHORIZATION,
                entity_id: record.pair_key(),
                prior_state: Some(prior_state),
                new_state: Some(record.state),
                detail: Some(verdict.reason_text()),
            })?;
        }

        Ok((outcome, verdict))
    }

    /// Approve or deny a pending request. Approving a non-qualifying person
    /// is allowed for approvers with out-of-band justification, but the audit
    /// entry is written as a manual override so it stays distinguishable.
    pub fn manual_decision(
        &self,
        person: &PersonId,
        facility: &FacilityId,
        approve: bool,
        actor: Actor,
    ) -> Result<Authorization, AccessError> {
        let mut record = self.require_authorization(person, facility)?;
        let verdict = self.evaluate(person, facility, None)?;

        let prior_state = record.state;
        let now = self.clock.now();
        let outcome = authorization::manual_decision(&mut record, approve, &verdict, &actor, now)?;

        let (action, detail) = match outcome {
            ManualOutcome::Approved => (AuditAction::ManualApprove, verdict.reason_text()),
            ManualOutcome::Overridden => (
                AuditAction::ManualOverride,
                format!("approved despite: {}", verdict.reason_text()),
            ),
            ManualOutcome::Denied => (
                AuditAction::ManualDeny,
                record.reason.clone().unwrap_or_else(|| verdict.reason_text()),
            ),
        };

        self.store.update_authorization(record.clone(), prior_state)?;
        self.audit.append(AuditEntry {
            at: now,
            actor,
            action,
            entity: ENTITY_AUTHORIZATION,
            entity_id: record.pair_key(),
            prior_state: Some(prior_state),
            new_state: Some(record.state),
            detail: Some(detail),
        })?;
        Ok(record)
    }

    /// Batch re-evaluation of every pending and active record.
    pub fn run_autocheck(&self, as_of: Option<NaiveDate>) -> Result<AutocheckSummary, AccessError> {
        let as_of = as_of.unwrap_or_else(|| self.clock.today());
        autocheck::run(
            self.store.as_ref(),
            self.audit.as_ref(),
            as_of,
            self.clock.now(),
            &self.policy,
        )
    }

    /// Current state, pair history, audit trail, and a fresh verdict.
    pub fn authorization_status(
        &self,
        person: &PersonId,
        facility: &FacilityId,
    ) -> Result<AuthorizationView, AccessError> {
        let authorization = self.require_authorization(person, facility)?;
        let history = self.store.authorization_history(person, facility)?;
        let audit = self
            .audit
            .entries_for(ENTITY_AUTHORIZATION, &authorization.pair_key())?;
        let verdict = self.evaluate(person, facility, None)?;

        Ok(AuthorizationView {
            compliant_now: verdict.qualified,
            authorization,
            history,
            audit,
            verdict,
        })
    }

    // ------------------------------------------------------------------
    // Provisioning and reference data
    // ------------------------------------------------------------------

    pub fn register_person(&self, person: Person, actor: Actor) -> Result<(), AccessError> {
        let id = person.id.to_string();
        self.store.add_person(person)?;
        self.audit_provision("person", id, actor)
    }

    pub fn register_course(&self, course: Course, actor: Actor) -> Result<(), AccessError> {
        let id = course.id.to_string();
        self.store.add_course(course)?;
        self.audit_provision("course", id, actor)
    }

    pub fn register_facility(&self, facility: Facility, actor: Actor) -> Result<(), AccessError> {
        let id = facility.id.to_string();
        self.store.add_facility(facility)?;
        self.audit_provision("facility", id, actor)
    }

    pub fn upsert_requirement(
        &self,
        requirement: Requirement,
        actor: Actor,
    ) -> Result<(), AccessError> {
        self.require_facility(&requirement.facility)?;
        if self.store.course(&requirement.course)?.is_none() {
            return Err(AccessError::NotFound {
                entity: "course",
                id: requirement.course.to_string(),
            });
        }
        let id = requirement.id.to_string();
        self.store.upsert_requirement(requirement)?;
        self.audit_provision("requirement", id, actor)
    }

    /// Record a training completion, optionally referencing a stored
    /// certificate artifact by opaque key.
    pub fn record_completion(
        &self,
        person: &PersonId,
        course: &CourseId,
        completed_on: NaiveDate,
        certificate: Option<ArtifactRef>,
        actor: Actor,
    ) -> Result<(), AccessError> {
        self.require_person(person)?;
        if self.store.course(course)?.is_none() {
            return Err(AccessError::NotFound {
                entity: "course",
                id: course.to_string(),
            });
        }

        self.store.add_completion(Completion {
            person: person.clone(),
            course: course.clone(),
            completed_on,
            certificate,
        })?;
        self.audit.append(AuditEntry {
            at: self.clock.now(),
            actor,
            action: AuditAction::RecordCompletion,
            entity: ENTITY_COMPLETION,
            entity_id: format!("{person}:{course}:{completed_on}"),
            prior_state: None,
            new_state: None,
            detail: None,
        })?;
        Ok(())
    }

    /// Publish a document revision. A first publish starts at version 1; a
    /// re-publish appends version current + 1, leaving prior revisions
    /// retrievable and making every earlier acknowledgment stale.
    pub fn publish_document(
        &self,
        document: &DocumentId,
        facility: &FacilityId,
        title: &str,
        mandatory: bool,
        artifact: Option<ArtifactRef>,
        actor: Actor,
    ) -> Result<Document, AccessError> {
        self.require_facility(facility)?;

        let current = self.store.document(document)?;
        let next = Document {
            id: document.clone(),
            facility: current
                .as_ref()
                .map(|existing| existing.facility.clone())
                .unwrap_or_else(|| facility.clone()),
            title: title.to_string(),
            version: current.as_ref().map(|existing| existing.version + 1).unwrap_or(1),
            mandatory,
            artifact,
            published_at: self.clock.now(),
        };

        self.store.append_document_version(next.clone())?;
        self.audit.append(AuditEntry {
            at: next.published_at,
            actor,
            action: AuditAction::PublishDocument,
            entity: ENTITY_DOCUMENT,
            entity_id: format!("{document}:v{}", next.version),
            prior_state: None,
            new_state: None,
            detail: Some(format!("'{title}' version {}", next.version)),
        })?;
        Ok(next)
    }

    /// Acknowledge the current version of a document. Re-acknowledging the
    /// same version is reported, not an error, and writes nothing.
    pub fn acknowledge_document(
        &self,
        person: &PersonId,
        document: &DocumentId,
        actor: Actor,
    ) -> Result<AckOutcome, AccessError> {
        self.require_person(person)?;
        let current = self
            .store
            .document(document)?
            .ok_or_else(|| AccessError::NotFound {
                entity: "document",
                id: document.to_string(),
            })?;

        let now = self.clock.now();
        let inserted = self.store.add_acknowledgment(Acknowledgment {
            person: person.clone(),
            document: document.clone(),
            version: current.version,
            acked_at: now,
        });

        match inserted {
            Ok(()) => {
                self.audit.append(AuditEntry {
                    at: now,
                    actor,
                    action: AuditAction::AcknowledgeDocument,
                    entity: ENTITY_ACKNOWLEDGMENT,
                    entity_id: format!("{person}:{document}:v{}", current.version),
                    prior_state: None,
                    new_state: None,
                    detail: Some(current.title.clone()),
                })?;
                Ok(AckOutcome::Recorded {
                    version: current.version,
                })
            }
            Err(RepositoryError::Conflict) => Ok(AckOutcome::AlreadyCurrent {
                version: current.version,
            }),
            Err(other) => Err(AccessError::Repository(other)),
        }
    }

    // ------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------

    pub fn active_access_csv(&self) -> Result<String, ReportError> {
        reports::access_csv(self.store.as_ref(), AccessState::Active, self.clock.now())
    }

    pub fn pending_access_csv(&self) -> Result<String, ReportError> {
        reports::access_csv(self.store.as_ref(), AccessState::Pending, self.clock.now())
    }

    pub fn access_history_csv(&self) -> Result<String, ReportError> {
        reports::access_history_csv(self.store.as_ref(), self.clock.now())
    }

    pub fn completions_csv(&self) -> Result<String, ReportError> {
        reports::completions_csv(self.store.as_ref(), self.clock.today(), self.clock.now())
    }

    pub fn expiring_training_csv(&self, window_days: i64) -> Result<String, ReportError> {
        reports::expiring_training_csv(
            self.store.as_ref(),
            self.clock.today(),
            self.clock.now(),
            window_days,
        )
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Look up a person, e.g. to resolve an acting identity at the boundary.
    pub fn person(&self, person: &PersonId) -> Result<Person, AccessError> {
        self.require_person(person)
    }

    fn require_person(&self, person: &PersonId) -> Result<Person, AccessError> {
        self.store
            .person(person)?
            .ok_or_else(|| AccessError::NotFound {
                entity: "person",
                id: person.to_string(),
            })
    }

    fn require_facility(&self, facility: &FacilityId) -> Result<Facility, AccessError> {
        self.store
            .facility(facility)?
            .ok_or_else(|| AccessError::NotFound {
                entity: "facility",
                id: facility.to_string(),
            })
    }

    fn require_authorization(
        &self,
        person: &PersonId,
        facility: &FacilityId,
    ) -> Result<Authorization, AccessError> {
        self.store
            .current_authorization(person, facility)?
            .ok_or_else(|| AccessError::NotFound {
                entity: "authorization",
                id: format!("{person}:{facility}"),
            })
    }

    fn duplicate_request(&self, person: &PersonId, facility: &FacilityId) -> AccessError {
        let state = self
            .store
            .current_authorization(person, facility)
            .ok()
            .flatten()
            .map(|record| record.state)
            .unwrap_or(AccessState::Pending);
        AccessError::DuplicateRequest {
            person: person.clone(),
            facility: facility.clone(),
            state,
        }
    }

    fn audit_provision(
        &self,
        entity: &'static str,
        entity_id: String,
        actor: Actor,
    ) -> Result<(), AccessError> {
        self.audit.append(AuditEntry {
            at: self.clock.now(),
            actor,
            action: AuditAction::Provision,
            entity,
            entity_id,
            prior_state: None,
            new_state: None,
            detail: None,
        })?;
        Ok(())
    }
}

/// Audit action for a state change; `None` for a no-op, which writes nothing.
fn transition_action(outcome: TransitionOutcome, actor: &Actor) -> Option<AuditAction> {
    match (outcome, actor.is_system()) {
        (TransitionOutcome::Activated, true) => Some(AuditAction::AutoActivate),
        (TransitionOutcome::Activated, false) => Some(AuditAction::ManualApprove),
        (TransitionOutcome::Revoked, true) => Some(AuditAction::AutoRevoke),
        (TransitionOutcome::Revoked, false) => Some(AuditAction::ManualRevoke),
        // Denial only happens under the autocheck auto-deny policy.
        (TransitionOutcome::Denied, _) => Some(AuditAction::AutoDeny),
        (TransitionOutcome::Unchanged, _) => None,
    }
}
