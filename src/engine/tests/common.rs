use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::engine::autocheck::AutocheckPolicy;
use crate::engine::clock::FixedClock;
use crate::engine::domain::{
    Actor, Authorization, Completion, Course, CourseId, Facility, FacilityId, Person, PersonId,
    Requirement, RequirementId, Role,
};
use crate::engine::memory::{MemoryAuditLog, MemoryStore};
use crate::engine::repository::CatalogWrites;
use crate::engine::service::AccessService;

pub(super) const FACILITY: &str = "bio-lab-2";
pub(super) const COURSE: &str = "biosafety";

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn instant(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    FixedClock::at_date(date(year, month, day)).0
}

pub(super) fn person_id(raw: &str) -> PersonId {
    PersonId(raw.to_string())
}

pub(super) fn facility_id() -> FacilityId {
    FacilityId(FACILITY.to_string())
}

pub(super) fn course_id() -> CourseId {
    CourseId(COURSE.to_string())
}

pub(super) fn member(raw: &str) -> Actor {
    Actor::Person {
        id: person_id(raw),
        role: Role::Member,
    }
}

pub(super) fn approver() -> Actor {
    Actor::Person {
        id: person_id("approver"),
        role: Role::Approver,
    }
}

pub(super) fn admin() -> Actor {
    Actor::Person {
        id: person_id("admin"),
        role: Role::Administrator,
    }
}

/// Store pre-loaded with one facility, one 180-day course with a 14-day
/// grace window, the joining requirement, and a handful of people.
pub(super) fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::default());

    for (id, name, role) in [
        ("admin", "Site Administrator", Role::Administrator),
        ("approver", "Shift Approver", Role::Approver),
        ("ada", "Ada Moreno", Role::Member),
        ("bo", "Bo Lindqvist", Role::Member),
        ("cy", "Cy Okafor", Role::Member),
    ] {
        store
            .add_person(Person {
                id: person_id(id),
                name: name.to_string(),
                role,
            })
            .expect("person inserts");
    }

    store
        .add_facility(Facility {
            id: facility_id(),
            name: "Biosafety Lab 2".to_string(),
        })
        .expect("facility inserts");
    store
        .add_course(Course {
            id: course_id(),
            name: "Biosafety Essentials".to_string(),
            valid_days: 180,
            grace_days: 14,
        })
        .expect("course inserts");
    store
        .upsert_requirement(Requirement {
            id: RequirementId(format!("{FACILITY}:{COURSE}")),
            facility: facility_id(),
            course: course_id(),
            valid_days_override: None,
            grace_days_override: None,
        })
        .expect("requirement inserts");

    store
}

pub(super) fn complete_course(store: &MemoryStore, person: &str, completed_on: NaiveDate) {
    store
        .add_completion(Completion {
            person: person_id(person),
            course: course_id(),
            completed_on,
            certificate: None,
        })
        .expect("completion inserts");
}

pub(super) type TestService = AccessService<MemoryStore, MemoryAuditLog, FixedClock>;

pub(super) fn build_service(
    today: NaiveDate,
) -> (Arc<TestService>, Arc<MemoryStore>, Arc<MemoryAuditLog>) {
    build_service_with_policy(today, AutocheckPolicy::default())
}

pub(super) fn build_service_with_policy(
    today: NaiveDate,
    policy: AutocheckPolicy,
) -> (Arc<TestService>, Arc<MemoryStore>, Arc<MemoryAuditLog>) {
    let store = seeded_store();
    let audit = Arc::new(MemoryAuditLog::default());
    let service = Arc::new(AccessService::new(
        store.clone(),
        audit.clone(),
        FixedClock::at_date(today),
        policy,
    ));
    (service, store, audit)
}

pub(super) fn pending_record(service: &TestService, person: &str) -> Authorization {
    service
        .request_access(&person_id(person), &facility_id(), member(person))
        .expect("request accepted")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
