// HTTP request handlers
use crate::application::ingestion_pipeline::IngestError;
use crate::domain::anomaly::{AnomalyIdentity, AnomalyKind};
use crate::infrastructure::chunked_stream::stream_from_broadcast;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct ClearQuery {
    pub joint: Option<u8>,
}

#[derive(Serialize)]
struct ClearResult {
    identity: String,
    cleared: bool,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Most recent analysis bundle
pub async fn latest_bundle(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let Some(bundle) = state.pipeline.latest() else {
        return (StatusCode::NOT_FOUND, "no sample received yet").into_response();
    };

    match json_response(bundle.as_ref(), accepts_brotli(&headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

pub async fn pipeline_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.pipeline.stats())
}

/// Live stream of pipeline events (analysis bundles and persistence failures)
pub async fn stream_bundles(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    stream_from_broadcast(state.pipeline.subscribe(), accepts_brotli(&headers))
}

/// Stop tracking one anomaly identity, e.g. after the operator fixed it
pub async fn clear_anomaly(
    Path(kind): Path<String>,
    Query(query): Query<ClearQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(kind) = AnomalyKind::parse(&kind) else {
        return (StatusCode::BAD_REQUEST, format!("unknown anomaly kind: {kind}")).into_response();
    };
    let identity = AnomalyIdentity::new(kind, query.joint);

    match state.pipeline.clear(identity).await {
        Ok(cleared) => {
            let status = if cleared {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            };
            let body = ClearResult {
                identity: identity.to_string(),
                cleared,
            };
            (status, Json(body)).into_response()
        }
        Err(e) => unavailable(e),
    }
}

pub async fn reset_anomalies(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.reset().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => unavailable(e),
    }
}

fn unavailable(error: IngestError) -> Response {
    tracing::warn!("Control request rejected: {}", error);
    (StatusCode::SERVICE_UNAVAILABLE, error.to_string()).into_response()
}
