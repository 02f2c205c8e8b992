use crate::application_limits::validate_application_handler;
use crate::assistant_proxy::{assistant_handler, AssistantProxy};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::*;
use crate::score_resolver::ScoreResolver;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Maximum accepted request body (profile payloads can carry a full CV).
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Score resolution pipeline.
    pub resolver: ScoreResolver,
    /// n8n assistant proxy (optional).
    pub assistant: Option<AssistantProxy>,
}

/// API routes, without state or layers.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/calculate-edital-scores",
            post(calculate_edital_scores),
        )
        .route("/api/users/:user_id/scores", get(list_user_scores))
        .route("/api/assistant", post(assistant_handler))
        .route(
            "/api/application/validate",
            post(validate_application_handler),
        )
}

/// Full application: health check plus `api`, with body limit, tracing and CORS layers.
///
/// The binary passes `api_routes()` wrapped in its rate limiter so that `/health` stays
/// outside of it.
pub fn app_router_with(state: Arc<AppState>, api: Router<Arc<AppState>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(api)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Full application without rate limiting.
pub fn app_router(state: Arc<AppState>) -> Router {
    app_router_with(state, api_routes())
}

/// Health check endpoint.
///
/// Returns the service status and version, the configured model and which optional
/// collaborators are wired.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "origem-lab-api",
            "version": env!("CARGO_PKG_VERSION"),
            "model": state.config.gemini_model,
            "score_store": state.resolver.is_configured(),
            "assistant": state.assistant.is_some()
        })),
    )
}

/// POST /api/calculate-edital-scores
///
/// Returns the match/probability score of a user for an edital, computing it on first
/// request and serving the stored row afterwards.
///
/// # Returns
///
/// * `200` - `CalculateScoreResponse`.
/// * `400` - `edital_id` or `user_id` missing.
/// * `404` - edital not found.
/// * `500` - store not configured, computation failed, or any other failure.
pub async fn calculate_edital_scores(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CalculateScoreRequest>, JsonRejection>,
) -> Result<Json<CalculateScoreResponse>, AppError> {
    let Json(request) =
        payload.map_err(|e| AppError::InvalidRequest(format!("Invalid JSON body: {}", e)))?;

    let edital_id = request.edital_id.as_deref().unwrap_or_default();
    let user_id = request.user_id.as_deref().unwrap_or_default();
    tracing::info!(
        "POST /api/calculate-edital-scores - edital_id={:?} user_id={:?}",
        edital_id,
        user_id
    );

    let profile = request.user_data.clone().unwrap_or_default();
    let resolved = state.resolver.resolve(edital_id, user_id, &profile).await?;

    tracing::info!(
        "Score resolved: match={} probabilidade={} from_cache={} persisted={}",
        resolved.match_percent,
        resolved.probabilidade,
        resolved.from_cache,
        resolved.persisted
    );

    Ok(Json(resolved.into()))
}

/// GET /api/users/:user_id/scores
///
/// Lists a user's stored scores (highest match first) with summary percentages.
pub async fn list_user_scores(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserScoresResponse>, AppError> {
    tracing::info!("GET /api/users/{}/scores", user_id);

    let response = state.resolver.user_scores(&user_id).await?;
    Ok(Json(response))
}
