use chrono::{Duration, NaiveDate};

use super::domain::{Course, Document, FacilityId, Requirement};
use super::evaluation::EvaluationError;
use super::repository::ComplianceReads;

/// Effective validity and grace windows for one requirement: the
/// requirement's override when present, else the course default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveWindows {
    pub valid_days: u32,
    pub grace_days: u32,
}

/// One requirement joined with its course, carrying the resolved windows.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub requirement: Requirement,
    pub course: Course,
}

impl CatalogEntry {
    pub fn windows(&self) -> EffectiveWindows {
        EffectiveWindows {
            valid_days: self
                .requirement
                .valid_days_override
                .unwrap_or(self.course.valid_days),
            grace_days: self
                .requirement
                .grace_days_override
                .unwrap_or(self.course.grace_days),
        }
    }

    /// Date the training lapses absent grace.
    pub fn expiry(&self, completed_on: NaiveDate) -> NaiveDate {
        completed_on + Duration::days(i64::from(self.windows().valid_days))
    }

    /// Last date the person still qualifies despite lapsed training.
    pub fn hard_deadline(&self, completed_on: NaiveDate) -> NaiveDate {
        self.expiry(completed_on) + Duration::days(i64::from(self.windows().grace_days))
    }
}

/// Read-only view of what a facility requires: courses with resolved windows
/// plus the mandatory documents. Entries keep the requirement declaration
/// order the store reports, so verdicts are reproducible.
#[derive(Debug, Clone)]
pub struct RequirementCatalog {
    entries: Vec<CatalogEntry>,
    documents: Vec<Document>,
}

impl RequirementCatalog {
    pub fn load<R: ComplianceReads>(
        reads: &R,
        facility: &FacilityId,
    ) -> Result<Self, EvaluationError> {
        if reads.facility(facility)?.is_none() {
            return Err(EvaluationError::MissingFacility {
                facility: facility.clone(),
            });
        }

        let requirements = reads.requirements_for(facility)?;
        let mut entries = Vec::with_capacity(requirements.len());
        for requirement in requirements {
            let course = reads.course(&requirement.course)?.ok_or_else(|| {
                EvaluationError::MissingCourse {
                    requirement: requirement.id.clone(),
                    course: requirement.course.clone(),
                }
            })?;
            entries.push(CatalogEntry {
                requirement,
                course,
            });
        }

        let mut documents = reads.documents_for(facility)?;
        documents.retain(|document| document.mandatory);
        documents.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(Self { entries, documents })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Mandatory documents only; optional documents never gate authorization.
    pub fn mandatory_documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.documents.is_empty()
    }
}
