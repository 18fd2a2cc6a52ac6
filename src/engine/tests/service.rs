use super::common::*;

use std::sync::Arc;

use crate::engine::audit::{AuditAction, AuditRecorder, ENTITY_AUTHORIZATION};
use crate::engine::authorization::{self, AccessError, TransitionOutcome};
use crate::engine::autocheck::AutocheckPolicy;
use crate::engine::domain::{AccessState, Actor, ArtifactRef, DocumentId, FacilityId, PersonId};
use crate::engine::evaluation::Verdict;
use crate::engine::repository::{AccessStore, RepositoryError};
use crate::engine::service::AckOutcome;

#[test]
fn request_access_creates_a_pending_record_and_audit_entry() {
    let (service, _, audit) = build_service(date(2024, 1, 2));

    let record = pending_record(&service, "ada");

    assert_eq!(record.state, AccessState::Pending);
    assert_eq!(record.requested_at, instant(2024, 1, 2));

    let entries = audit
        .entries_for(ENTITY_AUTHORIZATION, &record.pair_key())
        .expect("audit readable");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::RequestAccess);
}

#[test]
fn request_for_unknown_person_is_rejected() {
    let (service, _, _) = build_service(date(2024, 1, 2));

    let error = service
        .request_access(&PersonId("nobody".to_string()), &facility_id(), approver())
        .expect_err("unknown person rejected");

    assert!(matches!(error, AccessError::NotFound { entity: "person", .. }));
}

#[test]
fn request_for_unknown_facility_is_rejected() {
    let (service, _, _) = build_service(date(2024, 1, 2));

    let error = service
        .request_access(
            &person_id("ada"),
            &FacilityId("no-such-lab".to_string()),
            member("ada"),
        )
        .expect_err("unknown facility rejected");

    assert!(matches!(
        error,
        AccessError::NotFound {
            entity: "facility",
            ..
        }
    ));
}

#[test]
fn second_request_while_one_is_open_is_a_duplicate() {
    let (service, _, _) = build_service(date(2024, 1, 2));
    pending_record(&service, "ada");

    let error = service
        .request_access(&person_id("ada"), &facility_id(), member("ada"))
        .expect_err("duplicate rejected");

    assert!(matches!(
        error,
        AccessError::DuplicateRequest {
            state: AccessState::Pending,
            ..
        }
    ));
}

#[test]
fn revoked_history_does_not_block_a_fresh_request() {
    let (service, store, _) = build_service(date(2024, 1, 2));
    pending_record(&service, "ada");
    service
        .cancel_request(&person_id("ada"), &facility_id(), member("ada"))
        .expect("cancel succeeds");

    let record = pending_record(&service, "ada");
    assert_eq!(record.state, AccessState::Pending);

    let history = store
        .authorization_history(&person_id("ada"), &facility_id())
        .expect("history readable");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].state, AccessState::Revoked);
}

#[test]
fn concurrent_requests_admit_exactly_one_record() {
    let (service, _, _) = build_service(date(2024, 1, 2));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || {
                service.request_access(&person_id("ada"), &facility_id(), member("ada"))
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread completes"))
        .collect();

    let successes = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(successes, 1);
    for result in results {
        if let Err(error) = result {
            assert!(matches!(error, AccessError::DuplicateRequest { .. }));
        }
    }
}

#[test]
fn manual_override_is_audited_distinctly() {
    let (service, _, audit) = build_service(date(2024, 1, 2));
    let record = pending_record(&service, "ada");

    // Ada holds no training, so approval is an override.
    let approved = service
        .manual_decision(&person_id("ada"), &facility_id(), true, approver())
        .expect("decision applies");
    assert_eq!(approved.state, AccessState::Active);

    let entries = audit
        .entries_for(ENTITY_AUTHORIZATION, &record.pair_key())
        .expect("audit readable");
    let decision = entries.last().expect("entry recorded");
    assert_eq!(decision.action, AuditAction::ManualOverride);
    assert!(decision
        .detail
        .as_deref()
        .expect("detail recorded")
        .starts_with("approved despite:"));
}

#[test]
fn manual_approval_of_a_qualified_request_is_plain() {
    let (service, store, audit) = build_service(date(2024, 2, 1));
    complete_course(&store, "ada", date(2024, 1, 1));
    let record = pending_record(&service, "ada");

    service
        .manual_decision(&person_id("ada"), &facility_id(), true, approver())
        .expect("decision applies");

    let entries = audit
        .entries_for(ENTITY_AUTHORIZATION, &record.pair_key())
        .expect("audit readable");
    assert_eq!(entries.last().expect("entry").action, AuditAction::ManualApprove);
}

#[test]
fn manual_denial_by_a_member_is_unauthorized() {
    let (service, _, _) = build_service(date(2024, 1, 2));
    pending_record(&service, "ada");

    let error = service
        .manual_decision(&person_id("ada"), &facility_id(), false, member("bo"))
        .expect_err("member rejected");

    assert!(matches!(error, AccessError::Unauthorized { .. }));
}

#[test]
fn evaluate_reports_verdicts_without_side_effects() {
    let (service, store, audit) = build_service(date(2024, 2, 1));
    complete_course(&store, "ada", date(2024, 1, 1));

    let verdict = service
        .evaluate(&person_id("ada"), &facility_id(), None)
        .expect("evaluation succeeds");
    assert!(verdict.qualified);
    assert!(audit.entries().is_empty());

    let later = service
        .evaluate(&person_id("ada"), &facility_id(), Some(date(2024, 8, 1)))
        .expect("evaluation succeeds");
    assert!(!later.qualified);
}

#[test]
fn authorization_status_combines_record_history_audit_and_verdict() {
    let (service, store, _) = build_service(date(2024, 2, 1));
    complete_course(&store, "ada", date(2024, 1, 1));
    pending_record(&service, "ada");
    service
        .manual_decision(&person_id("ada"), &facility_id(), true, approver())
        .expect("decision applies");

    let view = service
        .authorization_status(&person_id("ada"), &facility_id())
        .expect("status resolves");

    assert_eq!(view.authorization.state, AccessState::Active);
    assert_eq!(view.history.len(), 1);
    assert_eq!(view.audit.len(), 2);
    assert!(view.compliant_now);
}

#[test]
fn completion_recording_validates_references() {
    let (service, _, _) = build_service(date(2024, 1, 2));

    let error = service
        .record_completion(
            &person_id("ada"),
            &crate::engine::domain::CourseId("ghost".to_string()),
            date(2024, 1, 1),
            None,
            admin(),
        )
        .expect_err("unknown course rejected");

    assert!(matches!(error, AccessError::NotFound { entity: "course", .. }));
}

#[test]
fn duplicate_completion_rows_are_rejected() {
    let (service, _, _) = build_service(date(2024, 1, 2));
    service
        .record_completion(&person_id("ada"), &course_id(), date(2024, 1, 1), None, admin())
        .expect("first completion records");

    let error = service
        .record_completion(&person_id("ada"), &course_id(), date(2024, 1, 1), None, admin())
        .expect_err("duplicate rejected");

    assert!(matches!(error, AccessError::Repository(_)));
}

#[test]
fn publishing_bumps_versions_and_keeps_prior_revisions() {
    let (service, store, _) = build_service(date(2024, 1, 2));
    let document = DocumentId("sop-entry".to_string());

    let first = service
        .publish_document(
            &document,
            &facility_id(),
            "Entry Procedure",
            true,
            Some(ArtifactRef("docs/sop-entry-v1.pdf".to_string())),
            admin(),
        )
        .expect("first publish");
    assert_eq!(first.version, 1);

    let second = service
        .publish_document(&document, &facility_id(), "Entry Procedure", true, None, admin())
        .expect("second publish");
    assert_eq!(second.version, 2);

    let revisions = store.document_revisions(&document).expect("revisions readable");
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[0].version, 1);
}

#[test]
fn acknowledgment_round_trip_and_staleness_after_republish() {
    let (service, _, _) = build_service(date(2024, 1, 2));
    let document = DocumentId("sop-entry".to_string());
    service
        .publish_document(&document, &facility_id(), "Entry Procedure", true, None, admin())
        .expect("publish");

    let first = service
        .acknowledge_document(&person_id("ada"), &document, member("ada"))
        .expect("ack succeeds");
    assert_eq!(first, AckOutcome::Recorded { version: 1 });

    let repeat = service
        .acknowledge_document(&person_id("ada"), &document, member("ada"))
        .expect("repeat ack tolerated");
    assert_eq!(repeat, AckOutcome::AlreadyCurrent { version: 1 });

    service
        .publish_document(&document, &facility_id(), "Entry Procedure", true, None, admin())
        .expect("republish");
    let after = service
        .acknowledge_document(&person_id("ada"), &document, member("ada"))
        .expect("new version ack succeeds");
    assert_eq!(after, AckOutcome::Recorded { version: 2 });
}

#[test]
fn acknowledging_an_unknown_document_is_rejected() {
    let (service, _, _) = build_service(date(2024, 1, 2));

    let error = service
        .acknowledge_document(
            &person_id("ada"),
            &DocumentId("no-such-doc".to_string()),
            member("ada"),
        )
        .expect_err("unknown document rejected");

    assert!(matches!(
        error,
        AccessError::NotFound {
            entity: "document",
            ..
        }
    ));
}

#[test]
fn stale_snapshot_cannot_overwrite_a_newer_decision() {
    let (service, store, _) = build_service(date(2024, 1, 2));
    let snapshot = pending_record(&service, "ada");

    service
        .manual_decision(&person_id("ada"), &facility_id(), false, approver())
        .expect("denial applies");

    // A sweep that read the record before the denial tries to write back an
    // activation it derived from the pending snapshot.
    let mut stale = snapshot;
    authorization::apply_verdict(
        &mut stale,
        &Verdict::qualified(),
        &Actor::Autocheck,
        instant(2024, 1, 2),
        false,
    )
    .expect("transition applies to the copy");
    assert_eq!(stale.state, AccessState::Active);

    let error = store
        .update_authorization(stale, AccessState::Pending)
        .expect_err("stale write rejected");
    assert!(matches!(error, RepositoryError::Conflict));

    let current = store
        .current_authorization(&person_id("ada"), &facility_id())
        .expect("store readable")
        .expect("record exists");
    assert_eq!(current.state, AccessState::Revoked);
}

#[test]
fn system_denial_is_audited_as_auto_deny() {
    let (service, _, audit) = build_service_with_policy(
        date(2024, 1, 2),
        AutocheckPolicy {
            auto_deny: true,
            workers: 1,
        },
    );
    let record = pending_record(&service, "ada");

    // Ada holds no training, so the system actor denies under the policy.
    let (outcome, _) = service
        .apply_verdict(&person_id("ada"), &facility_id(), Actor::Autocheck)
        .expect("verdict applies");
    assert_eq!(outcome, TransitionOutcome::Denied);

    let entries = audit
        .entries_for(ENTITY_AUTHORIZATION, &record.pair_key())
        .expect("audit readable");
    let denial = entries.last().expect("entry recorded");
    assert_eq!(denial.action, AuditAction::AutoDeny);
    assert_eq!(denial.new_state, Some(AccessState::Revoked));
}

#[test]
fn unchanged_verdict_writes_no_audit_entry() {
    let (service, _, audit) = build_service(date(2024, 1, 2));
    let record = pending_record(&service, "ada");

    // Without auto-deny a failing verdict leaves the request pending.
    let (outcome, _) = service
        .apply_verdict(&person_id("ada"), &facility_id(), Actor::Autocheck)
        .expect("verdict applies");
    assert_eq!(outcome, TransitionOutcome::Unchanged);

    let entries = audit
        .entries_for(ENTITY_AUTHORIZATION, &record.pair_key())
        .expect("audit readable");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::RequestAccess);
}

#[test]
fn requirement_upsert_validates_both_references() {
    let (service, _, _) = build_service(date(2024, 1, 2));

    let error = service
        .upsert_requirement(
            crate::engine::domain::Requirement {
                id: crate::engine::domain::RequirementId("bio-lab-2:ghost".to_string()),
                facility: facility_id(),
                course: crate::engine::domain::CourseId("ghost".to_string()),
                valid_days_override: None,
                grace_days_override: None,
            },
            admin(),
        )
        .expect_err("unknown course rejected");

    assert!(matches!(error, AccessError::NotFound { entity: "course", .. }));
}
