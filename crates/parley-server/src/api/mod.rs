//! API routes and handlers

mod icebreaker;
mod interact;
mod models;

use axum::{routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let interact_routes = get(interact::interact_query).post(interact::interact_form);

    Router::new()
        .route("/", get(index))
        .route("/error", get(not_implemented))
        .route("/api/model/:model/interact/", interact_routes.clone())
        .route("/api/model/:model/interact", interact_routes)
        .route(
            "/api/icebreaker",
            get(icebreaker::icebreaker).post(icebreaker::icebreaker),
        )
        .route("/api/models", get(models::list_models))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn index() -> Json<[&'static str; 1]> {
    Json(["Index Page"])
}

async fn not_implemented() -> ApiError {
    ApiError::not_implemented("Not implemented")
}
