use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::authorization::AccessError;
use super::clock::Clock;
use super::domain::{Actor, DocumentId, FacilityId, PersonId};
use super::repository::{AccessStore, CatalogWrites, ComplianceReads};
use super::reports::ReportError;
use super::audit::AuditRecorder;
use super::service::AccessService;

/// Router exposing the engine operations. Session handling and role checks
/// for route access are a front-boundary concern; handlers only resolve the
/// acting identity and pass it through.
pub fn access_router<S, A, C>(service: Arc<AccessService<S, A, C>>) -> Router
where
    S: ComplianceReads + CatalogWrites + AccessStore + 'static,
    A: AuditRecorder + 'static,
    C: Clock + 'static,
{
    Router::new()
        .route("/api/v1/access/requests", post(request_handler::<S, A, C>))
        .route(
            "/api/v1/access/autocheck",
            post(autocheck_handler::<S, A, C>),
        )
        .route(
            "/api/v1/access/:person_id/:facility_id",
            get(status_handler::<S, A, C>),
        )
        .route(
            "/api/v1/access/:person_id/:facility_id/decision",
            post(decision_handler::<S, A, C>),
        )
        .route(
            "/api/v1/access/:person_id/:facility_id/cancel",
            post(cancel_handler::<S, A, C>),
        )
        .route(
            "/api/v1/documents/:document_id/acknowledgments",
            post(acknowledge_handler::<S, A, C>),
        )
        .route(
            "/api/v1/reports/active.csv",
            get(active_report_handler::<S, A, C>),
        )
        .route(
            "/api/v1/reports/pending.csv",
            get(pending_report_handler::<S, A, C>),
        )
        .route(
            "/api/v1/reports/expiring30.csv",
            get(expiring_report_handler::<S, A, C>),
        )
        .route(
            "/api/v1/reports/access_history.csv",
            get(history_report_handler::<S, A, C>),
        )
        .route(
            "/api/v1/reports/completions.csv",
            get(completions_report_handler::<S, A, C>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
struct AccessRequestPayload {
    person_id: String,
    facility_id: String,
    /// Requester acting on someone's behalf; defaults to the person.
    #[serde(default)]
    actor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DecisionPayload {
    approve: bool,
    actor_id: String,
}

#[derive(Debug, Deserialize)]
struct CancelPayload {
    #[serde(default)]
    actor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AutocheckPayload {
    #[serde(default)]
    as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct AcknowledgePayload {
    person_id: String,
}

pub(crate) async fn request_handler<S, A, C>(
    State(service): State<Arc<AccessService<S, A, C>>>,
    Json(payload): Json<AccessRequestPayload>,
) -> Response
where
    S: ComplianceReads + CatalogWrites + AccessStore + 'static,
    A: AuditRecorder + 'static,
    C: Clock + 'static,
{
    let person = PersonId(payload.person_id);
    let facility = FacilityId(payload.facility_id);
    let actor_id = payload
        .actor_id
        .map(PersonId)
        .unwrap_or_else(|| person.clone());

    let result = resolve_actor(&service, &actor_id)
        .and_then(|actor| service.request_access(&person, &facility, actor));

    match result {
        Ok(record) => (StatusCode::ACCEPTED, Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<S, A, C>(
    State(service): State<Arc<AccessService<S, A, C>>>,
    Path((person_id, facility_id)): Path<(String, String)>,
) -> Response
where
    S: ComplianceReads + CatalogWrites + AccessStore + 'static,
    A: AuditRecorder + 'static,
    C: Clock + 'static,
{
    match service.authorization_status(&PersonId(person_id), &FacilityId(facility_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn decision_handler<S, A, C>(
    State(service): State<Arc<AccessService<S, A, C>>>,
    Path((person_id, facility_id)): Path<(String, String)>,
    Json(payload): Json<DecisionPayload>,
) -> Response
where
    S: ComplianceReads + CatalogWrites + AccessStore + 'static,
    A: AuditRecorder + 'static,
    C: Clock + 'static,
{
    let person = PersonId(person_id);
    let facility = FacilityId(facility_id);
    let result = resolve_actor(&service, &PersonId(payload.actor_id))
        .and_then(|actor| service.manual_decision(&person, &facility, payload.approve, actor));

    match result {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn cancel_handler<S, A, C>(
    State(service): State<Arc<AccessService<S, A, C>>>,
    Path((person_id, facility_id)): Path<(String, String)>,
    Json(payload): Json<CancelPayload>,
) -> Response
where
    S: ComplianceReads + CatalogWrites + AccessStore + 'static,
    A: AuditRecorder + 'static,
    C: Clock + 'static,
{
    let person = PersonId(person_id);
    let facility = FacilityId(facility_id);
    let actor_id = payload
        .actor_id
        .map(PersonId)
        .unwrap_or_else(|| person.clone());

    let result = resolve_actor(&service, &actor_id)
        .and_then(|actor| service.cancel_request(&person, &facility, actor));

    match result {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn autocheck_handler<S, A, C>(
    State(service): State<Arc<AccessService<S, A, C>>>,
    Json(payload): Json<AutocheckPayload>,
) -> Response
where
    S: ComplianceReads + CatalogWrites + AccessStore + 'static,
    A: AuditRecorder + 'static,
    C: Clock + 'static,
{
    match service.run_autocheck(payload.as_of) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn acknowledge_handler<S, A, C>(
    State(service): State<Arc<AccessService<S, A, C>>>,
    Path(document_id): Path<String>,
    Json(payload): Json<AcknowledgePayload>,
) -> Response
where
    S: ComplianceReads + CatalogWrites + AccessStore + 'static,
    A: AuditRecorder + 'static,
    C: Clock + 'static,
{
    let person = PersonId(payload.person_id);
    let document = DocumentId(document_id);
    let result = resolve_actor(&service, &person)
        .and_then(|actor| service.acknowledge_document(&person, &document, actor));

    match result {
        Ok(outcome) => (StatusCode::ACCEPTED, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn active_report_handler<S, A, C>(
    State(service): State<Arc<AccessService<S, A, C>>>,
) -> Response
where
    S: ComplianceReads + CatalogWrites + AccessStore + 'static,
    A: AuditRecorder + 'static,
    C: Clock + 'static,
{
    csv_response(service.active_access_csv(), "active_access.csv")
}

pub(crate) async fn pending_report_handler<S, A, C>(
    State(service): State<Arc<AccessService<S, A, C>>>,
) -> Response
where
    S: ComplianceReads + CatalogWrites + AccessStore + 'static,
    A: AuditRecorder + 'static,
    C: Clock + 'static,
{
    csv_response(service.pending_access_csv(), "pending_access.csv")
}

pub(crate) async fn expiring_report_handler<S, A, C>(
    State(service): State<Arc<AccessService<S, A, C>>>,
) -> Response
where
    S: ComplianceReads + CatalogWrites + AccessStore + 'static,
    A: AuditRecorder + 'static,
    C: Clock + 'static,
{
    csv_response(service.expiring_training_csv(30), "expiring_training.csv")
}

pub(crate) async fn history_report_handler<S, A, C>(
    State(service): State<Arc<AccessService<S, A, C>>>,
) -> Response
where
    S: ComplianceReads + CatalogWrites + AccessStore + 'static,
    A: AuditRecorder + 'static,
    C: Clock + 'static,
{
    csv_response(service.access_history_csv(), "access_history.csv")
}

pub(crate) async fn completions_report_handler<S, A, C>(
    State(service): State<Arc<AccessService<S, A, C>>>,
) -> Response
where
    S: ComplianceReads + CatalogWrites + AccessStore + 'static,
    A: AuditRecorder + 'static,
    C: Clock + 'static,
{
    csv_response(service.completions_csv(), "completions.csv")
}

fn resolve_actor<S, A, C>(
    service: &AccessService<S, A, C>,
    actor_id: &PersonId,
) -> Result<Actor, AccessError>
where
    S: ComplianceReads + CatalogWrites + AccessStore + 'static,
    A: AuditRecorder + 'static,
    C: Clock + 'static,
{
    let person = service.person(actor_id)?;
    Ok(Actor::Person {
        id: person.id,
        role: person.role,
    })
}

fn csv_response(result: Result<String, ReportError>, filename: &str) -> Response {
    match result {
        Ok(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename={filename}"),
                ),
            ],
            body,
        )
            .into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": error.to_string() })),
        )
            .into_response(),
    }
}

pub(crate) fn status_for(error: &AccessError) -> StatusCode {
    match error {
        AccessError::NotFound { .. } => StatusCode::NOT_FOUND,
        AccessError::DuplicateRequest { .. } => StatusCode::CONFLICT,
        AccessError::IllegalTransition { .. } => StatusCode::CONFLICT,
        AccessError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        AccessError::Evaluation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AccessError::Repository(_) | AccessError::Audit(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: AccessError) -> Response {
    let status = status_for(&error);
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}
