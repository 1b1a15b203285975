// src/api.rs
//! Thin HTTP surface over the pipeline. No business logic lives here.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use shuttle_axum::axum::{
    extract::{ConnectInfo, Query, State},
    http::{Extensions, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::ingest::types::Meta;
use crate::pipeline::{Pipeline, PipelineError};

pub const API_CHANNEL: &str = "api";
pub const DEFAULT_EVENTS_LIMIT: usize = 50;
pub const MAX_EVENTS_LIMIT: usize = 1_000;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/ingest", post(ingest))
        .route("/events", get(list_events))
        .route("/analytics/summary", get(summary))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Alias kept for callers that build the router by its short name.
pub fn router(state: AppState) -> Router {
    create_router(state)
}

#[derive(Deserialize)]
struct IngestReq {
    source: String,
    text: String,
    #[serde(default)]
    meta: Meta,
}

#[derive(Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        error!(target: "intake", error = %self, "pipeline failure");
        let body = Json(json!({ "error": self.to_string() }));
        (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    }
}

/// Peer address, present when the server was started with connect info.
fn client_addr(ext: &Extensions) -> Option<String> {
    ext.get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

async fn ingest(
    State(state): State<AppState>,
    ext: Extensions,
    Json(body): Json<IngestReq>,
) -> Result<Response, PipelineError> {
    let client = client_addr(&ext);
    let res = state
        .pipeline
        .process_event_from(API_CHANNEL, client.as_deref(), &body.source, &body.text, body.meta)
        .await?;
    Ok(Json(res).into_response())
}

async fn list_events(
    State(state): State<AppState>,
    Query(q): Query<EventsQuery>,
) -> Result<Response, PipelineError> {
    let limit = q.limit.unwrap_or(DEFAULT_EVENTS_LIMIT).min(MAX_EVENTS_LIMIT);
    let events = state.pipeline.recent(limit)?;
    Ok(Json(events).into_response())
}

async fn summary(State(state): State<AppState>) -> Result<Response, PipelineError> {
    Ok(Json(state.pipeline.summarize()?).into_response())
}
