//! HTTP surface: manual trigger, health and price lookup.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use crafting_core::{
    Catalog, CycleReport, CycleSummary, ItemId, RefreshOrchestrator, RefreshOutcome,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

pub struct AppState {
    pub orchestrator: Arc<RefreshOrchestrator>,
    pub catalog: Arc<dyn Catalog>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/craftingAH/fetch", get(trigger_fetch))
        .route("/items/{id}/price", get(item_price))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    /// 409 - a cycle is already running
    AlreadyRunning,
    /// 503 - client credentials not configured
    MissingCredentials,
    /// 500 - the cycle ran and failed
    RefreshFailed(String),
    /// 404
    NotFound(String),
    /// 500
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::AlreadyRunning => (
                StatusCode::CONFLICT,
                "already_running",
                "Fetch already running".to_string(),
            ),
            ApiError::MissingCredentials => (
                StatusCode::SERVICE_UNAVAILABLE,
                "missing_credentials",
                "Client credentials are not configured".to_string(),
            ),
            ApiError::RefreshFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "refresh_failed",
                format!("Fetch failed: {}", msg),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        (status, Json(ErrorBody { error, message })).into_response()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub refresh_running: bool,
    pub last_cycle: Option<CycleReport>,
}

#[derive(Serialize)]
pub struct FetchResponse {
    pub status: &'static str,
    pub summary: CycleSummary,
}

#[derive(Serialize)]
pub struct ItemPriceResponse {
    pub item_id: ItemId,
    pub price: i64,
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP",
        refresh_running: state.orchestrator.is_running(),
        last_cycle: state.orchestrator.last_cycle(),
    })
}

/// GET /craftingAH/fetch - run a refresh cycle now
async fn trigger_fetch(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FetchResponse>, ApiError> {
    match state.orchestrator.refresh().await {
        RefreshOutcome::Completed(summary) => Ok(Json(FetchResponse {
            status: "completed",
            summary,
        })),
        RefreshOutcome::AlreadyRunning => Err(ApiError::AlreadyRunning),
        RefreshOutcome::MissingCredentials => Err(ApiError::MissingCredentials),
        RefreshOutcome::Failed(e) => Err(ApiError::RefreshFailed(e.to_string())),
    }
}

/// GET /items/{id}/price
async fn item_price(
    State(state): State<Arc<AppState>>,
    Path(item_id): Path<ItemId>,
) -> Result<Json<ItemPriceResponse>, ApiError> {
    let price = state.catalog.get_price(item_id).await.map_err(|e| {
        error!("Price lookup for item {} failed: {:#}", item_id, e);
        ApiError::Internal("price lookup failed".into())
    })?;

    match price {
        Some(price) => Ok(Json(ItemPriceResponse { item_id, price })),
        None => Err(ApiError::NotFound(format!("No price recorded for item {}", item_id))),
    }
}
