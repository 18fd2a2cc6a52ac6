use std::sync::Arc;

use chrono::NaiveDate;

use lab_access::engine::{
    AccessService, AccessState, Actor, AutocheckPolicy, Course, CourseId, Facility, FacilityId,
    FixedClock, MemoryAuditLog, MemoryStore, Person, PersonId, Requirement, RequirementId, Role,
};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn admin() -> Actor {
    Actor::Person {
        id: PersonId("admin".to_string()),
        role: Role::Administrator,
    }
}

fn engineer(id: &str) -> Actor {
    Actor::Person {
        id: PersonId(id.to_string()),
        role: Role::Member,
    }
}

fn service_at(
    today: NaiveDate,
) -> AccessService<MemoryStore, MemoryAuditLog, FixedClock> {
    AccessService::new(
        Arc::new(MemoryStore::default()),
        Arc::new(MemoryAuditLog::default()),
        FixedClock::at_date(today),
        AutocheckPolicy::default(),
    )
}

fn provision(
    service: &AccessService<MemoryStore, MemoryAuditLog, FixedClock>,
    valid_days: u32,
    grace_days: u32,
) {
    service
        .register_person(
            Person {
                id: PersonId("admin".to_string()),
                name: "Site Administrator".to_string(),
                role: Role::Administrator,
            },
            admin(),
        )
        .expect("admin registers");
    service
        .register_person(
            Person {
                id: PersonId("kim".to_string()),
                name: "Kim Vasquez".to_string(),
                role: Role::Member,
            },
            admin(),
        )
        .expect("engineer registers");
    service
        .register_facility(
            Facility {
                id: FacilityId("bio-lab-2".to_string()),
                name: "Biosafety Lab 2".to_string(),
            },
            admin(),
        )
        .expect("facility registers");
    service
        .register_course(
            Course {
                id: CourseId("biosafety".to_string()),
                name: "Biosafety Essentials".to_string(),
                valid_days,
                grace_days,
            },
            admin(),
        )
        .expect("course registers");
    service
        .upsert_requirement(
            Requirement {
                id: RequirementId("bio-lab-2:biosafety".to_string()),
                facility: FacilityId("bio-lab-2".to_string()),
                course: CourseId("biosafety".to_string()),
                valid_days_override: None,
                grace_days_override: None,
            },
            admin(),
        )
        .expect("requirement registers");
}

#[test]
fn training_lapse_drives_the_full_grant_and_revoke_cycle() {
    let service = service_at(date(2024, 1, 2));
    provision(&service, 180, 5);

    service
        .record_completion(
            &PersonId("kim".to_string()),
            &CourseId("biosafety".to_string()),
            date(2024, 1, 1),
            None,
            admin(),
        )
        .expect("completion records");
    service
        .request_access(
            &PersonId("kim".to_string()),
            &FacilityId("bio-lab-2".to_string()),
            engineer("kim"),
        )
        .expect("request accepted");

    // Sweep the day after the request: training is current, access opens.
    let granted = service
        .run_autocheck(Some(date(2024, 1, 2)))
        .expect("sweep runs");
    assert_eq!(granted.granted.len(), 1);

    // 180-day validity from 2024-01-01 lapses after 2024-06-29; the 5-day
    // grace carries Kim to 2024-07-04.
    let in_grace = service
        .run_autocheck(Some(date(2024, 7, 4)))
        .expect("sweep runs");
    assert!(in_grace.delta_is_empty());

    let lapsed = service
        .run_autocheck(Some(date(2024, 7, 5)))
        .expect("sweep runs");
    assert_eq!(lapsed.revoked.len(), 1);
    assert!(lapsed.revoked[0].detail.contains("expired on 2024-06-29"));

    let view = service
        .authorization_status(
            &PersonId("kim".to_string()),
            &FacilityId("bio-lab-2".to_string()),
        )
        .expect("status resolves");
    assert_eq!(view.authorization.state, AccessState::Revoked);

    // Re-running the sweep changes nothing further.
    let again = service
        .run_autocheck(Some(date(2024, 7, 5)))
        .expect("sweep runs");
    assert!(again.delta_is_empty());
}

#[test]
fn revoked_access_requires_a_fresh_request_and_retraining() {
    let service = service_at(date(2024, 7, 6));
    provision(&service, 180, 5);
    service
        .record_completion(
            &PersonId("kim".to_string()),
            &CourseId("biosafety".to_string()),
            date(2024, 1, 1),
            None,
            admin(),
        )
        .expect("completion records");
    service
        .request_access(
            &PersonId("kim".to_string()),
            &FacilityId("bio-lab-2".to_string()),
            engineer("kim"),
        )
        .expect("request accepted");
    service
        .run_autocheck(Some(date(2024, 1, 2)))
        .expect("sweep activates");
    service
        .run_autocheck(Some(date(2024, 7, 5)))
        .expect("sweep revokes");

    // Retrain, file a new request, and the next sweep re-activates.
    service
        .record_completion(
            &PersonId("kim".to_string()),
            &CourseId("biosafety".to_string()),
            date(2024, 7, 6),
            None,
            admin(),
        )
        .expect("retraining records");
    service
        .request_access(
            &PersonId("kim".to_string()),
            &FacilityId("bio-lab-2".to_string()),
            engineer("kim"),
        )
        .expect("fresh request accepted");

    let summary = service
        .run_autocheck(Some(date(2024, 7, 7)))
        .expect("sweep runs");
    assert_eq!(summary.granted.len(), 1);

    let view = service
        .authorization_status(
            &PersonId("kim".to_string()),
            &FacilityId("bio-lab-2".to_string()),
        )
        .expect("status resolves");
    assert_eq!(view.authorization.state, AccessState::Active);
    assert_eq!(view.history.len(), 2, "revoked record kept as history");
}

#[test]
fn long_grace_window_defers_revocation() {
    let service = service_at(date(2024, 1, 2));
    provision(&service, 365, 30);
    service
        .record_completion(
            &PersonId("kim".to_string()),
            &CourseId("biosafety".to_string()),
            date(2024, 1, 1),
            None,
            admin(),
        )
        .expect("completion records");
    service
        .request_access(
            &PersonId("kim".to_string()),
            &FacilityId("bio-lab-2".to_string()),
            engineer("kim"),
        )
        .expect("request accepted");
    service
        .run_autocheck(Some(date(2024, 1, 2)))
        .expect("sweep activates");

    // Day 380: validity (ending 2024-12-31) has lapsed, grace has not.
    let in_grace = service
        .run_autocheck(Some(date(2025, 1, 15)))
        .expect("sweep runs");
    assert!(in_grace.delta_is_empty());

    // Day 400: past the 2025-01-30 hard deadline.
    let lapsed = service
        .run_autocheck(Some(date(2025, 2, 4)))
        .expect("sweep runs");
    assert_eq!(lapsed.revoked.len(), 1);
}

#[test]
fn republished_document_pulls_active_access_at_the_next_sweep() {
    use lab_access::engine::DocumentId;

    let service = service_at(date(2024, 2, 1));
    provision(&service, 365, 30);
    service
        .record_completion(
            &PersonId("kim".to_string()),
            &CourseId("biosafety".to_string()),
            date(2024, 1, 1),
            None,
            admin(),
        )
        .expect("completion records");
    service
        .publish_document(
            &DocumentId("sop-entry".to_string()),
            &FacilityId("bio-lab-2".to_string()),
            "Entry Procedure",
            true,
            None,
            admin(),
        )
        .expect("document publishes");
    service
        .acknowledge_document(
            &PersonId("kim".to_string()),
            &DocumentId("sop-entry".to_string()),
            engineer("kim"),
        )
        .expect("ack records");
    service
        .request_access(
            &PersonId("kim".to_string()),
            &FacilityId("bio-lab-2".to_string()),
            engineer("kim"),
        )
        .expect("request accepted");
    let granted = service
        .run_autocheck(Some(date(2024, 2, 1)))
        .expect("sweep runs");
    assert_eq!(granted.granted.len(), 1);

    // A new revision makes the acknowledgment stale; the next sweep revokes.
    service
        .publish_document(
            &DocumentId("sop-entry".to_string()),
            &FacilityId("bio-lab-2".to_string()),
            "Entry Procedure",
            true,
            None,
            admin(),
        )
        .expect("republish");
    let revoked = service
        .run_autocheck(Some(date(2024, 2, 2)))
        .expect("sweep runs");
    assert_eq!(revoked.revoked.len(), 1);
    assert!(revoked.revoked[0]
        .detail
        .contains("'Entry Procedure' v2 not acknowledged"));

    // Acknowledging the new revision qualifies Kim again, but the revoked
    // record stays revoked until a fresh request is filed.
    service
        .acknowledge_document(
            &PersonId("kim".to_string()),
            &DocumentId("sop-entry".to_string()),
            engineer("kim"),
        )
        .expect("re-ack records");
    service
        .request_access(
            &PersonId("kim".to_string()),
            &FacilityId("bio-lab-2".to_string()),
            engineer("kim"),
        )
        .expect("fresh request accepted");
    let regranted = service
        .run_autocheck(Some(date(2024, 2, 3)))
        .expect("sweep runs");
    assert_eq!(regranted.granted.len(), 1);
}
