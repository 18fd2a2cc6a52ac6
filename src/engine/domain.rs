use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier wrapper for personnel records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonId(pub String);

/// Identifier wrapper for training courses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CourseId(pub String);

/// Identifier wrapper for regulated facilities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FacilityId(pub String);

/// Identifier wrapper for procedural documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

/// Identifier wrapper for facility requirements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequirementId(pub String);

/// Sequence-assigned identifier for authorization records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuthorizationId(pub u64);

/// Opaque reference into the external artifact store (certificates, document files).
/// The engine never inspects artifact bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef(pub String);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RequirementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Roles recognized by the authorization workflow. Role checks for route access
/// live outside the engine; the only in-engine gate is manual decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Approver,
    Administrator,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Approver => "approver",
            Role::Administrator => "administrator",
        }
    }

    /// Whether this role may approve or deny pending access requests.
    pub const fn may_decide(self) -> bool {
        matches!(self, Role::Approver | Role::Administrator)
    }
}

/// A person tracked by the compliance system. Identity is immutable after
/// provisioning; the role may change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    pub role: Role,
}

/// A training course with default validity and grace windows, both in days.
/// Requirements may override either per facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub valid_days: u32,
    pub grace_days: u32,
}

/// A person's completion of a course on a given date, optionally backed by a
/// stored certificate artifact. Retraining produces additional rows; the
/// evaluator always consults the most recent one as of the evaluation date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub person: PersonId,
    pub course: CourseId,
    pub completed_on: NaiveDate,
    pub certificate: Option<ArtifactRef>,
}

/// A regulated laboratory space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    pub name: String,
}

/// A course required for entry to a facility. At most one requirement exists
/// per (facility, course) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: RequirementId,
    pub facility: FacilityId,
    pub course: CourseId,
    pub valid_days_override: Option<u32>,
    pub grace_days_override: Option<u32>,
}

/// The current revision of a procedural document. Publishing a new revision
/// increments `version`; prior revisions stay retrievable for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub facility: FacilityId,
    pub title: String,
    pub version: u32,
    pub mandatory: bool,
    pub artifact: Option<ArtifactRef>,
    pub published_at: DateTime<Utc>,
}

/// A person's acknowledgment of one document version. Rows are append-only;
/// currency is computed by comparing versions, never by deleting history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub person: PersonId,
    pub document: DocumentId,
    pub version: u32,
    pub acked_at: DateTime<Utc>,
}

/// Lifecycle state of an access record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessState {
    Pending,
    Active,
    Revoked,
}

impl AccessState {
    pub const fn label(self) -> &'static str {
        match self {
            AccessState::Pending => "pending",
            AccessState::Active => "active",
            AccessState::Revoked => "revoked",
        }
    }
}

impl fmt::Display for AccessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The party responsible for a transition: a human actor with a role, or the
/// autocheck batch runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    Person { id: PersonId, role: Role },
    Autocheck,
}

impl Actor {
    pub const fn is_system(&self) -> bool {
        matches!(self, Actor::Autocheck)
    }

    /// Whether the actor may issue manual approvals and denials.
    pub fn may_decide(&self) -> bool {
        match self {
            Actor::Person { role, .. } => role.may_decide(),
            Actor::Autocheck => false,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Actor::Person { id, role } => format!("{} ({})", id, role.label()),
            Actor::Autocheck => "autocheck".to_string(),
        }
    }
}

/// The per (person, facility) access record. The state machine is the only
/// component that mutates it; at most one non-revoked record exists per pair,
/// and revoked records are retained as history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub id: AuthorizationId,
    pub person: PersonId,
    pub facility: FacilityId,
    pub state: AccessState,
    pub requested_at: DateTime<Utc>,
    pub requested_by: Actor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_by: Option<Actor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_by: Option<Actor>,
    /// Recorded reason for the most recent denial or revocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Authorization {
    pub fn pair_key(&self) -> String {
        format!("{}:{}", self.person, self.facility)
    }
}
