//! mesa-api - HTTP API server for the mesa matching engine.
//!
//! Exposes the engine surface to the UI collaborator: availability
//! put/get, proposal refresh, accept/decline, the score diagnostic, and an
//! SSE stream of lifecycle events. Identity is supplied upstream by the
//! auth collaborator; this server trusts the user ids it is handed.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use mesa_core::{EventBus, ThreadRandomizer, TimeLabel};
use mesa_db::{Database, PoolConfig};
use mesa_engine::Matchmaker;

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// STATE
// =============================================================================

#[derive(Clone)]
struct AppState {
    matchmaker: Arc<Matchmaker>,
    bus: EventBus,
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // Logging configuration:
    //   LOG_FORMAT  - "text" (default) or "json"
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   RUST_LOG    - standard env filter (default: "mesa_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mesa_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation.
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("mesa-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(non_blocking),
                )
                .init();
        }
        Some(guard)
    } else if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
        None
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| mesa_core::Error::Config("DATABASE_URL must be set".to_string()))?;
    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()?).await?;
    db.migrate().await?;

    let bus = EventBus::default();
    let matchmaker = Arc::new(Matchmaker::new(
        db.availability.clone(),
        db.profiles.clone(),
        db.scores.clone(),
        db.proposals.clone(),
        Arc::new(ThreadRandomizer),
        bus.clone(),
    ));

    let state = AppState { matchmaker, bus };

    let app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/users/:uid/availability",
            put(put_availability).get(get_availability),
        )
        .route("/users/:uid/matches/refresh", post(refresh_matches))
        .route("/proposals/:id/accept", post(accept_proposal))
        .route("/proposals/:id/decline", post(decline_proposal))
        .route("/scores", get(get_score))
        .route("/events", get(sse_events))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(parse_allowed_origins()))
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]),
        )
        .with_state(state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let addr: SocketAddr = bind_addr.parse()?;
    info!(%addr, "mesa-api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct PutAvailabilityRequest {
    /// Slot labels per calendar day, e.g. `{"2023-08-01": ["12:00", "12:30"]}`.
    slots: BTreeMap<NaiveDate, BTreeSet<TimeLabel>>,
    #[serde(default)]
    recurring: bool,
    /// Day addressing the target week; defaults to today.
    reference_date: Option<NaiveDate>,
}

/// Full overwrite of the addressed availability record. The save also
/// kicks a background proposal refresh whose failure never fails the save.
async fn put_availability(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(req): Json<PutAvailabilityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reference = req.reference_date.unwrap_or_else(today);
    state
        .matchmaker
        .save_availability(&uid, reference, req.slots, req.recurring)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
struct AvailabilityQuery {
    date: Option<NaiveDate>,
}

async fn get_availability(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let reference = query.date.unwrap_or_else(today);
    let profile = state
        .matchmaker
        .get_availability(&uid, reference)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no availability for {}", uid)))?;
    Ok(Json(profile))
}

/// Synchronous refresh: rank, negotiate, and return the proposal batch
/// (or the outstanding pending batch).
async fn refresh_matches(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let views = state.matchmaker.rank_and_propose(&uid, today()).await?;
    Ok(Json(views))
}

#[derive(Debug, Deserialize)]
struct PartyRequest {
    user_id: String,
}

async fn accept_proposal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PartyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.matchmaker.accept(&req.user_id, id).await?;
    Ok(Json(outcome))
}

async fn decline_proposal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PartyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.matchmaker.decline(&req.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ScoreQuery {
    a: String,
    b: String,
}

/// Read-only compatibility diagnostic.
async fn get_score(
    State(state): State<AppState>,
    Query(query): Query<ScoreQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let score = state.matchmaker.get_score(&query.a, &query.b).await?;
    Ok(Json(serde_json::json!({
        "a": query.a,
        "b": query.b,
        "score": score,
    })))
}

/// SSE stream of lifecycle events. Lossy by design: slow consumers miss
/// events rather than backpressuring the engine.
async fn sse_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.bus.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|event| async move {
        let event = event.ok()?;
        Event::default().json_data(&event).ok().map(Ok)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// CORS origin whitelist from `ALLOWED_ORIGINS` (comma-separated).
fn parse_allowed_origins() -> Vec<HeaderValue> {
    let origins_str = std::env::var("ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(err) => {
                    tracing::warn!("Invalid CORS origin '{}': {}", trimmed, err);
                    None
                }
            }
        })
        .collect()
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

enum ApiError {
    Engine(mesa_core::Error),
    NotFound(String),
}

impl From<mesa_core::Error> for ApiError {
    fn from(err: mesa_core::Error) -> Self {
        ApiError::Engine(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use mesa_core::Error;

        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Engine(err) => match err {
                Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
                Error::PermissionDenied(msg) => (StatusCode::FORBIDDEN, msg),
                Error::InvalidState(msg) => (StatusCode::CONFLICT, msg),
                Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
                other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
            },
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));
        (status, body).into_response()
    }
}
