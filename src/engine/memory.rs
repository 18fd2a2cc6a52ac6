use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::audit::{AuditEntry, AuditError, AuditRecorder};
use super::domain::{
    AccessState, Acknowledgment, Actor, Authorization, AuthorizationId, Completion, Course,
    CourseId, Document, DocumentId, Facility, FacilityId, Person, PersonId, Requirement,
};
use super::repository::{
    AccessStore, CatalogWrites, ComplianceReads, RepositoryError,
};

/// In-memory store backing tests, the demo CLI, and the served API. A real
/// deployment would substitute a database-backed implementation of the same
/// traits; the engine itself never assumes this one.
///
/// One mutex guards the whole dataset, which trivially satisfies the
/// per-record serialization requirement: `insert_authorization` checks the
/// uniqueness invariant and inserts under the same critical section.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    people: BTreeMap<PersonId, Person>,
    courses: BTreeMap<CourseId, Course>,
    facilities: BTreeMap<FacilityId, Facility>,
    /// Declaration order is preserved; verdict ordering depends on it.
    requirements: Vec<Requirement>,
    completions: Vec<Completion>,
    /// Revisions per document, oldest first; the last entry is current.
    documents: BTreeMap<DocumentId, Vec<Document>>,
    acknowledgments: Vec<Acknowledgment>,
    /// Full history including revoked records.
    authorizations: Vec<Authorization>,
    next_authorization: u64,
}

impl MemoryStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, RepositoryError> {
        self.inner
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }

    /// Every document revision ever published for the id, oldest first.
    /// Exposed for audit inspection; prior revisions stay retrievable.
    pub fn document_revisions(
        &self,
        id: &DocumentId,
    ) -> Result<Vec<Document>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner.documents.get(id).cloned().unwrap_or_default())
    }
}

impl ComplianceReads for MemoryStore {
    fn person(&self, id: &PersonId) -> Result<Option<Person>, RepositoryError> {
        Ok(self.lock()?.people.get(id).cloned())
    }

    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError> {
        Ok(self.lock()?.courses.get(id).cloned())
    }

    fn facility(&self, id: &FacilityId) -> Result<Option<Facility>, RepositoryError> {
        Ok(self.lock()?.facilities.get(id).cloned())
    }

    fn requirements_for(&self, facility: &FacilityId) -> Result<Vec<Requirement>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .requirements
            .iter()
            .filter(|requirement| &requirement.facility == facility)
            .cloned()
            .collect())
    }

    fn completions_for(
        &self,
        person: &PersonId,
        course: &CourseId,
    ) -> Result<Vec<Completion>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .completions
            .iter()
            .filter(|completion| &completion.person == person && &completion.course == course)
            .cloned()
            .collect())
    }

    fn documents_for(&self, facility: &FacilityId) -> Result<Vec<Document>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .documents
            .values()
            .filter_map(|revisions| revisions.last())
            .filter(|document| &document.facility == facility)
            .cloned()
            .collect())
    }

    fn document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .documents
            .get(id)
            .and_then(|revisions| revisions.last())
            .cloned())
    }

    fn acknowledgments_for(
        &self,
        person: &PersonId,
        document: &DocumentId,
    ) -> Result<Vec<Acknowledgment>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .acknowledgments
            .iter()
            .filter(|ack| &ack.person == person && &ack.document == document)
            .cloned()
            .collect())
    }

    fn people(&self) -> Result<Vec<Person>, RepositoryError> {
        Ok(self.lock()?.people.values().cloned().collect())
    }

    fn courses(&self) -> Result<Vec<Course>, RepositoryError> {
        Ok(self.lock()?.courses.values().cloned().collect())
    }

    fn facilities(&self) -> Result<Vec<Facility>, RepositoryError> {
        Ok(self.lock()?.facilities.values().cloned().collect())
    }

    fn completions(&self) -> Result<Vec<Completion>, RepositoryError> {
        Ok(self.lock()?.completions.clone())
    }
}

impl CatalogWrites for MemoryStore {
    fn add_person(&self, person: Person) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        if inner.people.contains_key(&person.id) {
            return Err(RepositoryError::Conflict);
        }
        inner.people.insert(person.id.clone(), person);
        Ok(())
    }

    fn add_course(&self, course: Course) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        if inner.courses.contains_key(&course.id) {
            return Err(RepositoryError::Conflict);
        }
        inner.courses.insert(course.id.clone(), course);
        Ok(())
    }

    fn add_facility(&self, facility: Facility) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        if inner.facilities.contains_key(&facility.id) {
            return Err(RepositoryError::Conflict);
        }
        inner.facilities.insert(facility.id.clone(), facility);
        Ok(())
    }

    fn upsert_requirement(&self, requirement: Requirement) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        let existing = inner.requirements.iter_mut().find(|candidate| {
            candidate.facility == requirement.facility && candidate.course == requirement.course
        });
        match existing {
            Some(slot) => *slot = requirement,
            None => inner.requirements.push(requirement),
        }
        Ok(())
    }

    fn add_completion(&self, completion: Completion) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        let duplicate = inner.completions.iter().any(|candidate| {
            candidate.person == completion.person
                && candidate.course == completion.course
                && candidate.completed_on == completion.completed_on
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        inner.completions.push(completion);
        Ok(())
    }

    fn append_document_version(&self, document: Document) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        let revisions = inner.documents.entry(document.id.clone()).or_default();
        if let Some(current) = revisions.last() {
            if document.version <= current.version {
                return Err(RepositoryError::Conflict);
            }
        }
        revisions.push(document);
        Ok(())
    }

    fn add_acknowledgment(&self, ack: Acknowledgment) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        let duplicate = inner.acknowledgments.iter().any(|candidate| {
            candidate.person == ack.person
                && candidate.document == ack.document
                && candidate.version == ack.version
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        inner.acknowledgments.push(ack);
        Ok(())
    }
}

impl AccessStore for MemoryStore {
    fn insert_authorization(
        &self,
        person: &PersonId,
        facility: &FacilityId,
        requested_by: Actor,
        at: DateTime<Utc>,
    ) -> Result<Authorization, RepositoryError> {
        let mut inner = self.lock()?;

        let blocked = inner.authorizations.iter().any(|record| {
            &record.person == person
                && &record.facility == facility
                && record.state != AccessState::Revoked
        });
        if blocked {
            return Err(RepositoryError::Conflict);
        }

        inner.next_authorization += 1;
        let record = Authorization {
            id: AuthorizationId(inner.next_authorization),
            person: person.clone(),
            facility: facility.clone(),
            state: AccessState::Pending,
            requested_at: at,
            requested_by,
            activated_at: None,
            activated_by: None,
            revoked_at: None,
            revoked_by: None,
            reason: None,
        };
        inner.authorizations.push(record.clone());
        Ok(record)
    }

    fn update_authorization(
        &self,
        record: Authorization,
        expected_state: AccessState,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.lock()?;
        let slot = inner
            .authorizations
            .iter_mut()
            .find(|candidate| candidate.id == record.id)
            .ok_or(RepositoryError::NotFound)?;
        // The write loses to whichever transition landed first.
        if slot.state != expected_state {
            return Err(RepositoryError::Conflict);
        }
        *slot = record;
        Ok(())
    }

    fn current_authorization(
        &self,
        person: &PersonId,
        facility: &FacilityId,
    ) -> Result<Option<Authorization>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .authorizations
            .iter()
            .filter(|record| &record.person == person && &record.facility == facility)
            .last()
            .cloned())
    }

    fn authorizations_in(
        &self,
        states: &[AccessState],
    ) -> Result<Vec<Authorization>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .authorizations
            .iter()
            .filter(|record| states.contains(&record.state))
            .cloned()
            .collect())
    }

    fn authorization_history(
        &self,
        person: &PersonId,
        facility: &FacilityId,
    ) -> Result<Vec<Authorization>, RepositoryError> {
        let inner = self.lock()?;
        Ok(inner
            .authorizations
            .iter()
            .filter(|record| &record.person == person && &record.facility == facility)
            .cloned()
            .collect())
    }
}

/// Append-only in-memory audit log.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl AuditRecorder for MemoryAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .map_err(|_| AuditError::Unavailable("audit mutex poisoned".to_string()))?
            .push(entry);
        Ok(())
    }

    fn entries_for(&self, entity: &str, entity_id: &str) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AuditError::Unavailable("audit mutex poisoned".to_string()))?;
        Ok(entries
            .iter()
            .filter(|entry| entry.entity == entity && entry.entity_id == entity_id)
            .cloned()
            .collect())
    }
}
