use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};

use super::domain::{AccessState, Completion, CourseId, PersonId};
use super::repository::{AccessStore, ComplianceReads, RepositoryError};

/// Error raised while rendering a CSV export.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Store(#[from] RepositoryError),
    #[error("csv rendering failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv output was not valid utf-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Access records currently in `state`, joined with person and facility
/// names, newest first.
pub fn access_csv<S>(
    store: &S,
    state: AccessState,
    generated_at: DateTime<Utc>,
) -> Result<String, ReportError>
where
    S: ComplianceReads + AccessStore,
{
    let people: HashMap<_, _> = store
        .people()?
        .into_iter()
        .map(|person| (person.id.clone(), person))
        .collect();
    let facilities: HashMap<_, _> = store
        .facilities()?
        .into_iter()
        .map(|facility| (facility.id.clone(), facility))
        .collect();

    let mut records = store.authorizations_in(&[state])?;
    records.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));

    let stamp = generated_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "generated_at_utc",
        "person_id",
        "person_name",
        "facility_id",
        "facility_name",
        "state",
        "since_utc",
    ])?;

    for record in records {
        let person_name = people
            .get(&record.person)
            .map(|person| person.name.as_str())
            .unwrap_or("");
        let facility_name = facilities
            .get(&record.facility)
            .map(|facility| facility.name.as_str())
            .unwrap_or("");
        let since = match state {
            AccessState::Active => record.activated_at.unwrap_or(record.requested_at),
            _ => record.requested_at,
        };
        writer.write_record([
            stamp.as_str(),
            &record.person.0,
            person_name,
            &record.facility.0,
            facility_name,
            record.state.label(),
            &since.to_rfc3339_opts(SecondsFormat::Secs, true),
        ])?;
    }

    finish(writer)
}

/// Every access record in every state, newest first, with the full lifecycle
/// timestamps and the recorded reason. Revoked history included.
pub fn access_history_csv<S>(store: &S, generated_at: DateTime<Utc>) -> Result<String, ReportError>
where
    S: ComplianceReads + AccessStore,
{
    let people: HashMap<_, _> = store
        .people()?
        .into_iter()
        .map(|person| (person.id.clone(), person))
        .collect();
    let facilities: HashMap<_, _> = store
        .facilities()?
        .into_iter()
        .map(|facility| (facility.id.clone(), facility))
        .collect();

    let mut records = store.authorizations_in(&[
        AccessState::Pending,
        AccessState::Active,
        AccessState::Revoked,
    ])?;
    records.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));

    let stamp = generated_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "generated_at_utc",
        "person_id",
        "person_name",
        "facility_id",
        "facility_name",
        "state",
        "requested_at_utc",
        "activated_at_utc",
        "revoked_at_utc",
        "reason",
    ])?;

    for record in records {
        let person_name = people
            .get(&record.person)
            .map(|person| person.name.as_str())
            .unwrap_or("");
        let facility_name = facilities
            .get(&record.facility)
            .map(|facility| facility.name.as_str())
            .unwrap_or("");
        writer.write_record([
            stamp.as_str(),
            &record.person.0,
            person_name,
            &record.facility.0,
            facility_name,
            record.state.label(),
            &record.requested_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            &optional_stamp(record.activated_at),
            &optional_stamp(record.revoked_at),
            record.reason.as_deref().unwrap_or(""),
        ])?;
    }

    finish(writer)
}

fn optional_stamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// All recorded completions, most recent first, with the course-default due
/// date, the days left as of the report date, and the certificate key.
pub fn completions_csv<S: ComplianceReads>(
    store: &S,
    as_of: NaiveDate,
    generated_at: DateTime<Utc>,
) -> Result<String, ReportError> {
    let people: HashMap<_, _> = store
        .people()?
        .into_iter()
        .map(|person| (person.id.clone(), person))
        .collect();
    let courses: HashMap<_, _> = store
        .courses()?
        .into_iter()
        .map(|course| (course.id.clone(), course))
        .collect();

    let mut rows = store.completions()?;
    rows.sort_by(|a, b| {
        b.completed_on
            .cmp(&a.completed_on)
            .then_with(|| a.person.cmp(&b.person))
            .then_with(|| a.course.cmp(&b.course))
    });

    let stamp = generated_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "generated_at_utc",
        "person_id",
        "person_name",
        "course_id",
        "course_name",
        "completed_on",
        "due_on",
        "days_left",
        "certificate",
    ])?;

    for completion in rows {
        let person_name = people
            .get(&completion.person)
            .map(|person| person.name.as_str())
            .unwrap_or("");
        let course = courses.get(&completion.course);
        let (course_name, due_on, days_left) = match course {
            Some(course) => {
                let due = completion.completed_on + Duration::days(i64::from(course.valid_days));
                (
                    course.name.as_str(),
                    due.to_string(),
                    (due - as_of).num_days().to_string(),
                )
            }
            None => ("", String::new(), String::new()),
        };
        writer.write_record([
            stamp.as_str(),
            &completion.person.0,
            person_name,
            &completion.course.0,
            course_name,
            &completion.completed_on.to_string(),
            &due_on,
            &days_left,
            completion
                .certificate
                .as_ref()
                .map(|artifact| artifact.0.as_str())
                .unwrap_or(""),
        ])?;
    }

    finish(writer)
}

/// One row of the expiring-training preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiringTraining {
    pub person: PersonId,
    pub course: CourseId,
    pub completed_on: NaiveDate,
    pub due_on: NaiveDate,
    pub days_left: i64,
}

/// Latest completion per (person, course) whose due date falls inside the
/// window (expired rows included, most urgent first). Uses the course default
/// validity; facility overrides apply only to authorization verdicts.
pub fn expiring_training<S: ComplianceReads>(
    store: &S,
    as_of: NaiveDate,
    window_days: i64,
) -> Result<Vec<ExpiringTraining>, ReportError> {
    let courses: HashMap<_, _> = store
        .courses()?
        .into_iter()
        .map(|course| (course.id.clone(), course))
        .collect();

    let mut latest: HashMap<(PersonId, CourseId), Completion> = HashMap::new();
    for completion in store.completions()? {
        let key = (completion.person.clone(), completion.course.clone());
        match latest.get(&key) {
            Some(existing) if existing.completed_on >= completion.completed_on => {}
            _ => {
                latest.insert(key, completion);
            }
        }
    }

    let mut rows = Vec::new();
    for ((person, course_id), completion) in latest {
        let Some(course) = courses.get(&course_id) else {
            continue;
        };
        let due_on = completion.completed_on + Duration::days(i64::from(course.valid_days));
        let days_left = (due_on - as_of).num_days();
        if days_left <= window_days {
            rows.push(ExpiringTraining {
                person,
                course: course_id,
                completed_on: completion.completed_on,
                due_on,
                days_left,
            });
        }
    }

    rows.sort_by(|a, b| {
        a.days_left
            .cmp(&b.days_left)
            .then_with(|| a.person.cmp(&b.person))
            .then_with(|| a.course.cmp(&b.course))
    });
    Ok(rows)
}

pub fn expiring_training_csv<S: ComplianceReads>(
    store: &S,
    as_of: NaiveDate,
    generated_at: DateTime<Utc>,
    window_days: i64,
) -> Result<String, ReportError> {
    let rows = expiring_training(store, as_of, window_days)?;
    let stamp = generated_at.to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "generated_at_utc",
        "person_id",
        "course_id",
        "completed_on",
        "due_on",
        "days_left",
    ])?;
    for row in rows {
        writer.write_record([
            stamp.as_str(),
            &row.person.0,
            &row.course.0,
            &row.completed_on.to_string(),
            &row.due_on.to_string(),
            &row.days_left.to_string(),
        ])?;
    }

    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, ReportError> {
    let bytes = writer
        .into_inner()
        .map_err(|error| RepositoryError::Unavailable(error.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}
