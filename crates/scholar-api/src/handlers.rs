//! Route handler functions for all API endpoints.
//!
//! Each handler extracts query parameters via axum extractors, calls into
//! the recommendation facade, and returns JSON responses.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use scholar_core::types::{Category, ResultRecord, StoreInfo};
use scholar_vector::EngineStatus;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Query parameter types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RecommendParams {
    pub q: Option<String>,
    pub top_k: Option<usize>,
    /// Empty means no filter.
    pub category: Option<String>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub query: String,
    pub count: usize,
    pub results: Vec<ResultRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoriesResponse {
    pub categories: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub engine: EngineStatus,
    pub store: Option<StoreInfo>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /recommend - rank faculty profiles against a free-text query.
pub async fn recommend(
    State(state): State<AppState>,
    Query(params): Query<RecommendParams>,
) -> Result<Json<RecommendResponse>, ApiError> {
    let q = params.q.ok_or_else(|| {
        ApiError::BadRequest("Parameter 'q' is required for recommend".to_string())
    })?;
    let category = Category::parse_filter(params.category.as_deref())?;

    let results = state
        .recommender
        .recommend(&q, params.top_k, category)
        .await?;

    Ok(Json(RecommendResponse {
        query: q.trim().to_string(),
        count: results.len(),
        results,
    }))
}

/// GET /categories - the category values accepted by `/recommend`.
pub async fn categories() -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        categories: Category::FILTERABLE
            .iter()
            .map(|c| c.as_str().to_string())
            .collect(),
    })
}

/// GET /health - liveness plus the identity of the served store.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let engine = state.recommender.status()?;
    let store = match &engine {
        EngineStatus::Ready(info) => Some(info.clone()),
        _ => None,
    };
    let status = if engine.is_ready() { "healthy" } else { "degraded" };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        engine,
        store,
    }))
}

/// POST /admin/reload - rebuild the served store from the configured files.
///
/// On failure the previously served store, if any, stays in place.
pub async fn reload(State(state): State<AppState>) -> Result<Json<StoreInfo>, ApiError> {
    let info = state.recommender.reload(&state.store_paths).await?;
    info!(generation = %info.generation, size = info.size, "Store reloaded via API");
    Ok(Json(info))
}
