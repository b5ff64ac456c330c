//! HTTP API server for integration with other systems.
//!
//! Exposes the episode store and starts pipeline runs in the background.
//! Processing endpoints answer 202 once a run has been spawned; clients poll
//! `GET /episodes/{id}` for status and partial paragraphs.

use crate::cli::Output;
use crate::config::Settings;
use crate::episode::{EpisodeStore, NewEpisode, RunKind};
use crate::error::PodtekstError;
use crate::orchestrator::{Orchestrator, ProcessOptions, RunPermit};
use crate::transcription::AsrBackend;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Shared application state.
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(Orchestrator::new(settings)?));
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Podtekst API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("List episodes", "GET  /episodes");
    Output::kv("Get episode", "GET  /episodes/{id}");
    Output::kv("Create episode", "POST /episodes");
    Output::kv("Clone + reprocess", "POST /episodes/{id}/clone");
    Output::kv("Process", "POST /api/process");
    Output::kv("Reprocess", "POST /api/reprocess");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/episodes", get(list_episodes).post(create_episode))
        .route("/episodes/{id}", get(get_episode))
        .route("/episodes/{id}/clone", post(clone_episode))
        .route("/api/process", post(process))
        .route("/api/reprocess", post(reprocess))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct CreateEpisodeRequest {
    title: String,
    source_url: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct ProcessRequest {
    episode_id: String,
    /// Recognition backend override
    #[serde(default)]
    backend: Option<AsrBackend>,
    #[serde(default)]
    min_speakers: Option<u32>,
}

#[derive(Deserialize)]
struct ReprocessRequest {
    episode_id: String,
}

#[derive(Serialize)]
struct CreatedResponse {
    id: String,
}

#[derive(Serialize)]
struct AcceptedResponse {
    episode_id: String,
    run: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Library error rendered as a JSON error body.
struct ApiError(PodtekstError);

impl From<PodtekstError> for ApiError {
    fn from(err: PodtekstError) -> Self {
        Self(err)
    }
}

fn status_for(err: &PodtekstError) -> StatusCode {
    match err {
        PodtekstError::EpisodeNotFound(_) => StatusCode::NOT_FOUND,
        PodtekstError::RunInProgress(_) | PodtekstError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        PodtekstError::InvalidInput(_) | PodtekstError::InvalidSource(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            status_for(&self.0),
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_episodes(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let episodes = state.orchestrator.store().list_episodes().await?;
    Ok(Json(serde_json::json!({
        "total": episodes.len(),
        "episodes": episodes,
    }))
    .into_response())
}

async fn get_episode(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match state.orchestrator.store().find_episode(&id).await? {
        Some(episode) => Ok(Json(episode).into_response()),
        None => Err(PodtekstError::EpisodeNotFound(id).into()),
    }
}

async fn create_episode(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEpisodeRequest>,
) -> Result<Response, ApiError> {
    if req.title.trim().is_empty() || req.source_url.trim().is_empty() {
        return Err(
            PodtekstError::InvalidInput("title and source_url are required".to_string()).into(),
        );
    }

    let mut fields = NewEpisode::new(req.title.trim(), req.source_url.trim());
    if let Some(description) = req.description {
        fields = fields.with_description(description);
    }

    let id = state.orchestrator.store().create_episode(fields).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })).into_response())
}

/// Run an admitted permit in the background.
fn spawn_run(orchestrator: Arc<Orchestrator>, permit: RunPermit) {
    tokio::spawn(async move {
        let report = orchestrator.execute(permit).await;
        info!(
            "{} run for {} finished: {:?}",
            report.kind, report.episode_id, report.outcome
        );
    });
}

fn accepted(permit: &RunPermit) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            episode_id: permit.episode_id().to_string(),
            run: permit.kind().to_string(),
        }),
    )
        .into_response()
}

async fn process(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProcessRequest>,
) -> Result<Response, ApiError> {
    let options = ProcessOptions {
        backend: req.backend,
        min_speakers: req.min_speakers,
    };
    // Claimed before answering, so a concurrent request sees the run in flight
    let permit = state
        .orchestrator
        .claim(&req.episode_id, RunKind::Full, options)
        .await?;

    let response = accepted(&permit);
    spawn_run(state.orchestrator.clone(), permit);
    Ok(response)
}

async fn reprocess(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReprocessRequest>,
) -> Result<Response, ApiError> {
    let permit = state
        .orchestrator
        .claim(&req.episode_id, RunKind::Reprocess, ProcessOptions::default())
        .await?;

    let response = accepted(&permit);
    spawn_run(state.orchestrator.clone(), permit);
    Ok(response)
}

async fn clone_episode(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let permit = state.orchestrator.claim_clone(&id).await?;

    let response = accepted(&permit);
    spawn_run(state.orchestrator.clone(), permit);
    Ok(response)
}
