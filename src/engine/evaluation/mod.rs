mod rules;

pub use rules::RequirementStanding;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::catalog::RequirementCatalog;
use super::currency;
use super::domain::{CourseId, DocumentId, FacilityId, PersonId, RequirementId};
use super::repository::{ComplianceReads, RepositoryError};

/// A single itemized reason a verdict is negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Deficiency {
    NoTraining {
        course: CourseId,
    },
    TrainingExpired {
        course: CourseId,
        expired_on: NaiveDate,
    },
    DocumentNotAcknowledged {
        document: DocumentId,
        title: String,
        required_version: u32,
    },
}

impl Deficiency {
    pub fn summary(&self) -> String {
        match self {
            Deficiency::NoTraining { course } => format!("no completion of course {course}"),
            Deficiency::TrainingExpired { course, expired_on } => {
                format!("training for course {course} expired on {expired_on}")
            }
            Deficiency::DocumentNotAcknowledged {
                title,
                required_version,
                ..
            } => format!("document '{title}' v{required_version} not acknowledged"),
        }
    }
}

/// A requirement whose training has lapsed but is still masked by grace.
/// Recorded for reporting; never a reason for denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraceNote {
    pub course: CourseId,
    pub expired_on: NaiveDate,
    pub hard_deadline: NaiveDate,
}

/// Qualification verdict for one (person, facility, as-of) triple. Pure data;
/// evaluating the same inputs twice yields an identical verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub qualified: bool,
    /// Deficiencies in requirement declaration order, documents last.
    pub deficiencies: Vec<Deficiency>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub grace_in_effect: Vec<GraceNote>,
}

impl Verdict {
    pub fn qualified() -> Self {
        Self {
            qualified: true,
            deficiencies: Vec::new(),
            grace_in_effect: Vec::new(),
        }
    }

    /// Human-readable reason string built from the deficiency list. Used for
    /// recorded revocation reasons and denial messages.
    pub fn reason_text(&self) -> String {
        if self.qualified {
            "all requirements satisfied".to_string()
        } else {
            self.deficiencies
                .iter()
                .map(Deficiency::summary)
                .collect::<Vec<_>>()
                .join("; ")
        }
    }
}

/// Per-record data inconsistency discovered while evaluating. Inside a batch
/// these are captured per record, never raised to abort the run.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("facility '{facility}' not found")]
    MissingFacility { facility: FacilityId },
    #[error("requirement {requirement} references missing course '{course}'")]
    MissingCourse {
        requirement: RequirementId,
        course: CourseId,
    },
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

/// Pure evaluator: (person, facility, as-of) to a verdict with itemized
/// reasons. Reads only; requires no locking and may run with arbitrary
/// parallelism across pairs.
pub struct QualificationEvaluator<'a, R: ComplianceReads> {
    reads: &'a R,
}

impl<'a, R: ComplianceReads> QualificationEvaluator<'a, R> {
    pub fn new(reads: &'a R) -> Self {
        Self { reads }
    }

    pub fn evaluate(
        &self,
        person: &PersonId,
        facility: &FacilityId,
        as_of: NaiveDate,
    ) -> Result<Verdict, EvaluationError> {
        let catalog = RequirementCatalog::load(self.reads, facility)?;
        self.evaluate_against(&catalog, person, as_of)
    }

    /// Evaluate against a pre-loaded catalog snapshot, so a batch run can
    /// share one snapshot per facility and stay reproducible from its inputs.
    pub fn evaluate_against(
        &self,
        catalog: &RequirementCatalog,
        person: &PersonId,
        as_of: NaiveDate,
    ) -> Result<Verdict, EvaluationError> {
        let mut deficiencies = Vec::new();
        let mut grace_in_effect = Vec::new();

        for entry in catalog.entries() {
            let completions = self
                .reads
                .completions_for(person, &entry.requirement.course)?;
            match rules::requirement_standing(entry, &completions, as_of) {
                RequirementStanding::Current => {}
                RequirementStanding::InGrace {
                    expired_on,
                    hard_deadline,
                } => grace_in_effect.push(GraceNote {
                    course: entry.requirement.course.clone(),
                    expired_on,
                    hard_deadline,
                }),
                RequirementStanding::Expired { expired_on } => {
                    deficiencies.push(Deficiency::TrainingExpired {
                        course: entry.requirement.course.clone(),
                        expired_on,
                    })
                }
                RequirementStanding::Missing => deficiencies.push(Deficiency::NoTraining {
                    course: entry.requirement.course.clone(),
                }),
            }
        }

        for document in catalog.mandatory_documents() {
            if !currency::is_current(self.reads, person, document)? {
                deficiencies.push(Deficiency::DocumentNotAcknowledged {
                    document: document.id.clone(),
                    title: document.title.clone(),
                    required_version: document.version,
                });
            }
        }

        Ok(Verdict {
            qualified: deficiencies.is_empty(),
            deficiencies,
            grace_in_effect,
        })
    }
}
