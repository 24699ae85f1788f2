// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. The predict endpoint answers 200 for
// every accepted request, fallback included; only input validation yields a
// 400.
//
// The cache and latency endpoints double as operator controls: entries can be
// dropped, thresholds retuned and latency windows reset at runtime.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::app_state::AppState;
use crate::error::PredictError;
use crate::predictor::{PredictionRequest, PredictionResponse};

/// Default and maximum page size for `/api/v1/predictions`.
const DEFAULT_JOURNAL_LIMIT: usize = 20;
const MAX_JOURNAL_LIMIT: usize = 100;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/predict", post(predict))
        .route("/api/v1/latency", get(latency))
        .route("/api/v1/latency/reset", post(latency_reset))
        .route("/api/v1/latency/:operation", get(latency_for))
        .route("/api/v1/latency/:operation/threshold", put(set_threshold))
        .route("/api/v1/cache", get(cache).delete(cache_clear))
        .route("/api/v1/cache/:key", delete(cache_remove))
        .route("/api/v1/predictions", get(predictions))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health())
}

// =============================================================================
// Predict
// =============================================================================

type ApiError = (StatusCode, Json<serde_json::Value>);

fn rejection(err: PredictError) -> ApiError {
    match err {
        PredictError::Validation(message) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Insufficient data",
                "message": message,
            })),
        ),
        // The predictor converts every other failure into an answer.
        other => {
            error!(error = %other, "prediction failed outside the fallback path");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Prediction failed",
                    "message": other.to_string(),
                })),
            )
        }
    }
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PredictionRequest>,
) -> Result<Json<PredictionResponse>, ApiError> {
    info!(points = req.crash_points.len(), strategy = ?req.strategy, "predict requested");
    state.predictor.predict(&req).await.map(Json).map_err(rejection)
}

// =============================================================================
// Diagnostics
// =============================================================================

async fn latency(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.latency.all_stats())
}

fn not_found(what: &str, name: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "Not found",
            "message": format!("no {what} named '{name}'"),
        })),
    )
}

async fn latency_for(
    State(state): State<Arc<AppState>>,
    Path(operation): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .latency
        .stats(&operation)
        .map(Json)
        .ok_or_else(|| not_found("latency window", &operation))
}

#[derive(Debug, Deserialize)]
struct ThresholdUpdate {
    threshold_ms: u64,
}

async fn set_threshold(
    State(state): State<Arc<AppState>>,
    Path(operation): Path<String>,
    Json(update): Json<ThresholdUpdate>,
) -> impl IntoResponse {
    info!(%operation, threshold_ms = update.threshold_ms, "latency threshold updated");
    state.latency.set_threshold(operation.clone(), update.threshold_ms);
    Json(serde_json::json!({
        "operation": operation,
        "threshold_ms": update.threshold_ms,
    }))
}

async fn latency_reset(State(state): State<Arc<AppState>>) -> StatusCode {
    state.latency.reset();
    info!("latency windows reset");
    StatusCode::NO_CONTENT
}

async fn cache(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.cache.stats())
}

async fn cache_clear(State(state): State<Arc<AppState>>) -> StatusCode {
    state.cache.clear();
    info!("prediction cache cleared");
    StatusCode::NO_CONTENT
}

async fn cache_remove(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.cache.remove(&key) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("cache entry", &key))
    }
}

#[derive(Debug, Deserialize)]
struct JournalQuery {
    limit: Option<usize>,
}

async fn predictions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JournalQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_JOURNAL_LIMIT)
        .min(MAX_JOURNAL_LIMIT);
    Json(state.journal.recent(limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::fallback;
    use crate::latency::{HealthStatus, ORACLE_PREDICTION};
    use crate::oracle::{ForecastOracle, OracleCallError};
    use crate::runtime_config::RuntimeConfig;

    struct Offline;

    #[async_trait]
    impl ForecastOracle for Offline {
        async fn complete(&self, _prompt: &str, _temperature: f64) -> Result<String, OracleCallError> {
            Err(OracleCallError::Transport("offline".into()))
        }
    }

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(RuntimeConfig::default(), Arc::new(Offline)))
    }

    #[tokio::test]
    async fn cache_entries_can_be_removed_and_cleared() {
        let state = state();
        state.cache.set("a", fallback::canned(), Duration::from_secs(60));
        state.cache.set("b", fallback::canned(), Duration::from_secs(60));

        let removed = cache_remove(State(state.clone()), Path("a".to_string())).await;
        assert_eq!(removed.unwrap(), StatusCode::NO_CONTENT);
        let (status, Json(body)) = cache_remove(State(state.clone()), Path("a".to_string()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "no cache entry named 'a'");

        assert_eq!(cache_clear(State(state.clone())).await, StatusCode::NO_CONTENT);
        assert_eq!(state.cache.len(), 0);
    }

    #[tokio::test]
    async fn latency_controls_retune_and_reset() {
        let state = state();
        assert!(latency_for(State(state.clone()), Path(ORACLE_PREDICTION.to_string()))
            .await
            .is_err());

        state.latency.record(ORACLE_PREDICTION, 800);
        set_threshold(
            State(state.clone()),
            Path(ORACLE_PREDICTION.to_string()),
            Json(ThresholdUpdate { threshold_ms: 500 }),
        )
        .await;
        let stats = state.latency.stats(ORACLE_PREDICTION).unwrap();
        assert_eq!(stats.threshold_ms, Some(500));
        assert_eq!(stats.status, HealthStatus::Degraded);
        assert!(latency_for(State(state.clone()), Path(ORACLE_PREDICTION.to_string()))
            .await
            .is_ok());

        assert_eq!(latency_reset(State(state.clone())).await, StatusCode::NO_CONTENT);
        assert!(state.latency.stats(ORACLE_PREDICTION).is_none());
        assert_eq!(state.health().status, HealthStatus::Healthy);
    }

    #[test]
    fn router_builds_with_control_routes() {
        let _ = router(state());
    }

    #[test]
    fn validation_maps_to_bad_request() {
        let (status, Json(body)) =
            rejection(PredictError::Validation("Need at least 10 crash points for prediction".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Insufficient data");
        assert_eq!(body["message"], "Need at least 10 crash points for prediction");
    }

    #[test]
    fn other_errors_map_to_server_error() {
        let (status, _) = rejection(PredictError::Persistence("x".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
