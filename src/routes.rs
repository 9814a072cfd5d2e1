use axum::{
    extract::{rejection::PathRejection, Path, State},
    response::Json,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::ResolveError;
use crate::query::Query;
use crate::request_id::RequestIdLayer;
use crate::types::*;
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/search/*query", get(search_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(RequestIdLayer)
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    raw: Result<Path<String>, PathRejection>,
) -> Result<Json<ResolveResponse>, ResolveError> {
    let Path(raw) = raw.map_err(|rejection| ResolveError::InvalidInput(rejection.body_text()))?;
    let query = Query::parse(&raw)?;
    info!(query = %query, "Received search request");

    match state.resolver.resolve(&query).await {
        Ok(url) => Ok(Json(ResolveResponse { url })),
        Err(e) => {
            match &e {
                ResolveError::NotFound(_) | ResolveError::Cancelled => {
                    warn!(query = %query, error = %e, "Failed to find track URL");
                }
                _ => error!(query = %query, error = %e, "Resolution failed"),
            }
            Err(e)
        }
    }
}
