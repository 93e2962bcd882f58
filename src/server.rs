/*!
 * HTTP surface of the backend.
 *
 * Routes:
 * - `GET  /health`            - liveness probe
 * - `GET  /models`            - per-role model listing
 * - `POST /models`            - switch a role to a different model
 * - `POST /transcribe`        - start a transcription job, stream progress (SSE)
 * - `POST /translate`         - start a translation job, stream progress (SSE)
 * - `GET  /jobs/{id}/events`  - reattach to a job's progress stream (SSE)
 * - `POST /jobs/{id}/cancel`  - request cancellation of a running job
 * - `POST /lookup`            - dictionary lookup for a single word
 *
 * Progress streams replay the job's full history before delivering live
 * events, so a client that reconnects mid-job misses nothing.
 */

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use futures::StreamExt;
use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app_config::{Config, ModelRole};
use crate::errors::{AppError, AppResult};
use crate::lookup::LookupService;
use crate::model_manager::{ModelManager, RoleStatus};
use crate::pipeline::{Job, PipelineService, TranscribeRequest, TranslateRequest};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PipelineService>,
    pub manager: Arc<ModelManager>,
    pub lookup: Arc<LookupService>,
    pub config: Arc<RwLock<Config>>,
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/models", get(list_models).post(switch_model))
        .route("/transcribe", post(transcribe))
        .route("/translate", post(translate))
        .route("/jobs/{id}/events", get(job_events))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .route("/lookup", post(lookup))
        .with_state(state)
}

/// Bind and serve until ctrl-c
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_models(State(state): State<AppState>) -> Json<Vec<RoleStatus>> {
    Json(state.manager.list_models())
}

#[derive(Debug, Deserialize)]
struct SwitchModelRequest {
    role: ModelRole,
    model_id: String,
}

async fn switch_model(
    State(state): State<AppState>,
    Json(request): Json<SwitchModelRequest>,
) -> AppResult<Json<RoleStatus>> {
    let status = state
        .manager
        .switch_model(request.role, &request.model_id)
        .await?;
    Ok(Json(status))
}

async fn transcribe(
    State(state): State<AppState>,
    Json(request): Json<TranscribeRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let job = state.pipeline.submit_transcribe(request)?;
    Ok(sse_for_job(job))
}

async fn translate(
    State(state): State<AppState>,
    Json(request): Json<TranslateRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let job = state.pipeline.submit_translate(request)?;
    Ok(sse_for_job(job))
}

async fn job_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let job = state.pipeline.job(id)?;
    Ok(sse_for_job(job))
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    state.pipeline.cancel(id)?;
    Ok(Json(json!({ "job_id": id, "cancel_requested": true })))
}

#[derive(Debug, Deserialize)]
struct LookupRequest {
    word: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    target_language: Option<String>,
}

async fn lookup(
    State(state): State<AppState>,
    Json(request): Json<LookupRequest>,
) -> AppResult<Json<Value>> {
    let target = request
        .target_language
        .unwrap_or_else(|| state.config.read().target_language.clone());
    let result = state
        .lookup
        .lookup(&request.word, request.context.as_deref(), &target)
        .await?;
    Ok(Json(serde_json::to_value(result).map_err(|e| {
        AppError::IoFailure(format!("failed to serialize lookup result: {}", e))
    })?))
}

/// Metadata sent as the first SSE event of every job stream
#[derive(Debug, Serialize)]
struct JobAnnouncement {
    job_id: Uuid,
    kind: crate::pipeline::JobKind,
}

/// An SSE response announcing the job, then streaming its event log
///
/// Takes the job by value and captures nothing borrowed, so handlers can
/// return the stream after their `Arc<Job>` binding goes out of scope.
fn sse_for_job(job: Arc<Job>) -> Sse<impl Stream<Item = Result<Event, axum::Error>> + use<>> {
    let announcement = JobAnnouncement {
        job_id: job.id,
        kind: job.kind,
    };
    let head = futures::stream::once(async move {
        Event::default().event("job").json_data(&announcement)
    });
    let tail = job
        .log
        .subscribe()
        .map(|progress| Event::default().event("progress").json_data(&progress));

    Sse::new(head.chain(tail)).keep_alive(KeepAlive::default())
}
