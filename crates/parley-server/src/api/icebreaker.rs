//! Conversation starter endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct IcebreakerResponse {
    pub topic: String,
}

/// One random persona fact, independent of any request seed.
pub async fn icebreaker(State(state): State<AppState>) -> Result<Json<IcebreakerResponse>, ApiError> {
    let topic = state.personas.pick_one()?;
    Ok(Json(IcebreakerResponse { topic }))
}
