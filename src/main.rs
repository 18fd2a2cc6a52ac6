use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use lab_access::config::AppConfig;
use lab_access::engine::{
    access_router, AccessService, Actor, ArtifactRef, AutocheckPolicy, AutocheckSummary, Course,
    CourseId, Facility, FacilityId, MemoryAuditLog, MemoryStore, Person, PersonId, Requirement,
    RequirementId, Role, SystemClock,
};
use lab_access::error::AppError;
use lab_access::telemetry;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Lab Access Engine",
    about = "Run the lab access authorization service or demo an autocheck sweep",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run an autocheck sweep against seeded demo data and print the summary
    Autocheck(AutocheckArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct AutocheckArgs {
    /// Evaluation date for the sweep (defaults to today)
    #[arg(long, value_parser = parse_date)]
    as_of: Option<NaiveDate>,
    /// Revoke pending requests that fail evaluation instead of leaving them
    #[arg(long)]
    auto_deny: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Autocheck(args) => run_autocheck_demo(args),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let service = Arc::new(AccessService::new(
        Arc::new(MemoryStore::default()),
        Arc::new(MemoryAuditLog::default()),
        SystemClock,
        config.engine.autocheck_policy(),
    ));

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(access_router(service))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "lab access engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthcheck() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    if state.readiness.load(Ordering::Acquire) {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "initializing" })),
        )
    }
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

fn run_autocheck_demo(args: AutocheckArgs) -> Result<(), AppError> {
    let as_of = args.as_of.unwrap_or_else(|| Local::now().date_naive());
    let policy = AutocheckPolicy {
        auto_deny: args.auto_deny,
        workers: 4,
    };

    let service = AccessService::new(
        Arc::new(MemoryStore::default()),
        Arc::new(MemoryAuditLog::default()),
        SystemClock,
        policy,
    );
    seed_demo_data(&service, as_of)?;

    let summary = service.run_autocheck(Some(as_of))?;
    render_summary(&summary);
    Ok(())
}

/// Small reference-data set exercising both sweep directions: one person
/// fully trained, one with an expired completion, one with none at all.
fn seed_demo_data(
    service: &AccessService<MemoryStore, MemoryAuditLog, SystemClock>,
    as_of: NaiveDate,
) -> Result<(), AppError> {
    let admin = Actor::Person {
        id: PersonId("admin".to_string()),
        role: Role::Administrator,
    };

    service.register_person(
        Person {
            id: PersonId("admin".to_string()),
            name: "Site Administrator".to_string(),
            role: Role::Administrator,
        },
        admin.clone(),
    )?;
    for (id, name) in [
        ("eng-ada", "Ada Moreno"),
        ("eng-bo", "Bo Lindqvist"),
        ("eng-cy", "Cy Okafor"),
    ] {
        service.register_person(
            Person {
                id: PersonId(id.to_string()),
                name: name.to_string(),
                role: Role::Member,
            },
            admin.clone(),
        )?;
    }

    service.register_facility(
        Facility {
            id: FacilityId("bio-lab-2".to_string()),
            name: "Biosafety Lab 2".to_string(),
        },
        admin.clone(),
    )?;
    service.register_course(
        Course {
            id: CourseId("biosafety".to_string()),
            name: "Biosafety Essentials".to_string(),
            valid_days: 180,
            grace_days: 14,
        },
        admin.clone(),
    )?;
    service.upsert_requirement(
        Requirement {
            id: RequirementId("bio-lab-2:biosafety".to_string()),
            facility: FacilityId("bio-lab-2".to_string()),
            course: CourseId("biosafety".to_string()),
            valid_days_override: None,
            grace_days_override: None,
        },
        admin.clone(),
    )?;

    // Ada trained recently; Bo trained over a year ago; Cy never trained.
    service.record_completion(
        &PersonId("eng-ada".to_string()),
        &CourseId("biosafety".to_string()),
        as_of - chrono::Duration::days(30),
        Some(ArtifactRef("certs/eng-ada-biosafety.pdf".to_string())),
        admin.clone(),
    )?;
    service.record_completion(
        &PersonId("eng-bo".to_string()),
        &CourseId("biosafety".to_string()),
        as_of - chrono::Duration::days(400),
        None,
        admin.clone(),
    )?;

    for person in ["eng-ada", "eng-bo", "eng-cy"] {
        let id = PersonId(person.to_string());
        let requester = Actor::Person {
            id: id.clone(),
            role: Role::Member,
        };
        service.request_access(&id, &FacilityId("bio-lab-2".to_string()), requester)?;
    }

    Ok(())
}

fn render_summary(summary: &AutocheckSummary) {
    println!("Autocheck sweep for {}", summary.as_of);

    println!("\nGranted: {}", summary.granted.len());
    for pair in &summary.granted {
        println!("- {} @ {}", pair.person, pair.facility);
    }

    println!("\nRevoked: {}", summary.revoked.len());
    for pair in &summary.revoked {
        println!("- {} @ {}: {}", pair.person, pair.facility, pair.detail);
    }

    println!("\nDenied: {}", summary.denied.len());
    for pair in &summary.denied {
        println!("- {} @ {}: {}", pair.person, pair.facility, pair.detail);
    }

    println!("\nUnchanged: {}", summary.unchanged.len());
    for pair in &summary.unchanged {
        println!("- {} @ {}: {}", pair.person, pair.facility, pair.detail);
    }

    if summary.errors.is_empty() {
        println!("\nErrors: none");
    } else {
        println!("\nErrors: {}", summary.errors.len());
        for failure in &summary.errors {
            println!("- {} @ {}: {}", failure.person, failure.facility, failure.error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::response::IntoResponse;
    use metrics_exporter_prometheus::PrometheusBuilder;

    fn test_state(ready: bool) -> AppState {
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: PrometheusBuilder::new().build_recorder().handle(),
        }
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let response = healthcheck().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), 1024)
            .await
            .expect("body readable");
        assert_eq!(body.as_ref(), br#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let state = test_state(false);
        let response = readiness_endpoint(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.readiness.store(true, Ordering::Release);
        let response = readiness_endpoint(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_prometheus_text() {
        let response = metrics_endpoint(State(test_state(true))).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("text/plain; version=0.0.4")
        );
    }
}
