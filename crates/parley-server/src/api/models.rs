//! Backend listing endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

/// Names accepted by the interaction endpoint, in registration order.
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.registry.names(),
    })
}
