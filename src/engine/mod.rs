//! Compliance evaluation and access authorization for regulated facilities.
//!
//! The engine decides whether a person currently satisfies the training and
//! documentation requirements of a facility, and drives authorization records
//! through their lifecycle based on those verdicts. Persistence is abstracted
//! behind repository traits; an in-memory store backs the service binary and
//! the test suites.

pub mod audit;
pub mod authorization;
pub mod autocheck;
pub mod catalog;
pub mod clock;
pub(crate) mod currency;
pub mod domain;
pub mod evaluation;
pub mod memory;
pub mod reports;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use audit::{AuditAction, AuditEntry, AuditError, AuditRecorder};
pub use authorization::{AccessError, ManualOutcome, TransitionOutcome};
pub use autocheck::{AutocheckPolicy, AutocheckSummary, PairOutcome, RecordFailure};
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::{
    AccessState, Acknowledgment, Actor, ArtifactRef, Authorization, AuthorizationId, Completion,
    Course, CourseId, Document, DocumentId, Facility, FacilityId, Person, PersonId, Requirement,
    RequirementId, Role,
};
pub use evaluation::{Deficiency, EvaluationError, GraceNote, QualificationEvaluator, Verdict};
pub use memory::{MemoryAuditLog, MemoryStore};
pub use reports::ReportError;
pub use repository::{AccessStore, CatalogWrites, ComplianceReads, RepositoryError};
pub use router::access_router;
pub use service::{AccessService, AckOutcome, AuthorizationView};
