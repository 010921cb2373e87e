//! HTTP API for reading ingestion, health checks and Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use sentinel_lib::{
    health::{ComponentStatus, HealthRegistry},
    models::{ActionRecord, DeviceReadingPayload, DeviceStats, DeviceStatus, ReadingPayload},
    IngestError, InferencePipeline,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub pipeline: InferencePipeline,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, pipeline: InferencePipeline) -> Self {
        Self {
            health_registry,
            pipeline,
        }
    }
}

/// Request failure mapped onto an HTTP status with an `{error}` body
enum ApiError {
    Ingest(IngestError),
    Body(JsonRejection),
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        ApiError::Ingest(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::Body(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Ingest(e) => {
                let status = match &e {
                    IngestError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    IngestError::DeviceNotFound { .. } | IngestError::UnknownDevice(_) => {
                        StatusCode::NOT_FOUND
                    }
                };
                (status, e.to_string())
            }
            ApiError::Body(rejection) => (rejection.status(), rejection.body_text()),
        };
        warn!(status = status.as_u16(), error = %message, "Rejected request");
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Whole-house reading → one action per bound device
async fn ingest_reading(
    State(state): State<Arc<AppState>>,
    Path(house_id): Path<i64>,
    payload: Result<Json<ReadingPayload>, JsonRejection>,
) -> Result<Json<Vec<ActionRecord>>, ApiError> {
    let Json(payload) = payload?;
    let records = state.pipeline.ingest(house_id, &payload).await?;
    Ok(Json(records))
}

/// Single-device reading → that device's action
async fn ingest_device_reading(
    State(state): State<Arc<AppState>>,
    Path((house_id, device_id)): Path<(i64, String)>,
    payload: Result<Json<DeviceReadingPayload>, JsonRejection>,
) -> Result<Json<ActionRecord>, ApiError> {
    let Json(payload) = payload?;
    let record = state
        .pipeline
        .ingest_device(house_id, &device_id, &payload)
        .await?;
    Ok(Json(record))
}

/// Latest reading of a device → ON (>= 10 W), OFF or UNKNOWN
async fn device_status(
    State(state): State<Arc<AppState>>,
    Path((house_id, device_id)): Path<(i64, String)>,
) -> Result<Json<DeviceStatus>, ApiError> {
    let status = state.pipeline.device_status(house_id, &device_id).await?;
    Ok(Json(status))
}

async fn device_stats(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceStats>, ApiError> {
    let stats = state.pipeline.device_stats(&device_id).await?;
    Ok(Json(stats))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/houses/:house_id/reading", post(ingest_reading))
        .route(
            "/houses/:house_id/reading/:device_id",
            post(ingest_device_reading),
        )
        .route(
            "/houses/:house_id/devices/:device_id/status",
            get(device_status),
        )
        .route("/devices/:device_id/stats", get(device_stats))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
