use chrono::{DateTime, Utc};

use super::domain::{
    AccessState, Acknowledgment, Actor, Authorization, Completion, Course, CourseId, Document,
    DocumentId, Facility, FacilityId, Person, PersonId, Requirement,
};

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read side of the persistence boundary. Evaluation consumes this and
/// nothing else, so it stays side-effect-free and lock-free.
pub trait ComplianceReads: Send + Sync {
    fn person(&self, id: &PersonId) -> Result<Option<Person>, RepositoryError>;
    fn course(&self, id: &CourseId) -> Result<Option<Course>, RepositoryError>;
    fn facility(&self, id: &FacilityId) -> Result<Option<Facility>, RepositoryError>;

    /// Requirements of a facility in declaration order.
    fn requirements_for(&self, facility: &FacilityId) -> Result<Vec<Requirement>, RepositoryError>;

    /// All completions a person holds for one course, any date.
    fn completions_for(
        &self,
        person: &PersonId,
        course: &CourseId,
    ) -> Result<Vec<Completion>, RepositoryError>;

    /// Current revisions of every document attached to a facility.
    fn documents_for(&self, facility: &FacilityId) -> Result<Vec<Document>, RepositoryError>;

    /// Current revision of a single document.
    fn document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError>;

    /// Every acknowledgment a person has recorded for a document, any version.
    fn acknowledgments_for(
        &self,
        person: &PersonId,
        document: &DocumentId,
    ) -> Result<Vec<Acknowledgment>, RepositoryError>;

    // Listing reads used by reports and dashboards.
    fn people(&self) -> Result<Vec<Person>, RepositoryError>;
    fn courses(&self) -> Result<Vec<Course>, RepositoryError>;
    fn facilities(&self) -> Result<Vec<Facility>, RepositoryError>;
    fn completions(&self) -> Result<Vec<Completion>, RepositoryError>;
}

/// Write side for reference data. Provisioning operations go through here;
/// the evaluator never touches it.
pub trait CatalogWrites: Send + Sync {
    fn add_person(&self, person: Person) -> Result<(), RepositoryError>;
    fn add_course(&self, course: Course) -> Result<(), RepositoryError>;
    fn add_facility(&self, facility: Facility) -> Result<(), RepositoryError>;

    /// Insert or replace the requirement for its (facility, course) pair.
    fn upsert_requirement(&self, requirement: Requirement) -> Result<(), RepositoryError>;

    fn add_completion(&self, completion: Completion) -> Result<(), RepositoryError>;

    /// Append a document revision. Prior revisions are retained, never
    /// overwritten; the appended revision becomes current.
    fn append_document_version(&self, document: Document) -> Result<(), RepositoryError>;

    fn add_acknowledgment(&self, ack: Acknowledgment) -> Result<(), RepositoryError>;
}

/// Authorization persistence. Each record is the unit of mutual exclusion:
/// implementations must serialize writes per record and enforce the
/// one-non-revoked-per-pair invariant atomically inside `insert_authorization`.
pub trait AccessStore: Send + Sync {
    /// Create a pending record for the pair. Fails with
    /// [`RepositoryError::Conflict`] when a pending or active record already
    /// exists, even under concurrent callers.
    fn insert_authorization(
        &self,
        person: &PersonId,
        facility: &FacilityId,
        requested_by: Actor,
        at: DateTime<Utc>,
    ) -> Result<Authorization, RepositoryError>;

    /// Persist a transitioned record, keyed by its id. `expected_state` is the
    /// state the caller read before transitioning; implementations must reject
    /// the write with [`RepositoryError::Conflict`] when the stored record has
    /// moved on, so a stale snapshot never overwrites a newer transition.
    fn update_authorization(
        &self,
        record: Authorization,
        expected_state: AccessState,
    ) -> Result<(), RepositoryError>;

    /// The most recent record for the pair, regardless of state.
    fn current_authorization(
        &self,
        person: &PersonId,
        facility: &FacilityId,
    ) -> Result<Option<Authorization>, RepositoryError>;

    /// Every record currently in one of the given states.
    fn authorizations_in(
        &self,
        states: &[AccessState],
    ) -> Result<Vec<Authorization>, RepositoryError>;

    /// Full record history for the pair, oldest first. Revoked records are
    /// retained here rather than deleted.
    fn authorization_history(
        &self,
        person: &PersonId,
        facility: &FacilityId,
    ) -> Result<Vec<Authorization>, RepositoryError>;
}
