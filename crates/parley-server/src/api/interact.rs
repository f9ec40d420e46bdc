//! Dialogue interaction endpoint

use axum::{
    extract::{Path, Query, State},
    Form, Json,
};
use parley_core::dialogue::{self, InteractionRequest, InteractionResponse};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;

/// Parameters accepted from the query string (GET) or an urlencoded form (POST).
#[derive(Debug, Default, Deserialize)]
pub struct InteractParams {
    #[serde(default)]
    pub text: Option<String>,
    /// Prior turns joined with `###`, oldest first
    #[serde(default)]
    pub history: Option<String>,
    #[serde(default)]
    pub seed: Option<String>,
}

pub async fn interact_query(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Query(params): Query<InteractParams>,
) -> Result<Json<InteractionResponse>, ApiError> {
    interact(state, model, params).await
}

pub async fn interact_form(
    State(state): State<AppState>,
    Path(model): Path<String>,
    Form(params): Form<InteractParams>,
) -> Result<Json<InteractionResponse>, ApiError> {
    interact(state, model, params).await
}

async fn interact(
    state: AppState,
    model: String,
    params: InteractParams,
) -> Result<Json<InteractionResponse>, ApiError> {
    debug!("Interaction request for '{}': {:?}", model, params);

    // Input is validated before the model lookup so empty text is rejected
    // for every model name.
    let request = InteractionRequest::from_raw(
        &model,
        params.text.as_deref().unwrap_or_default(),
        params.history.as_deref().unwrap_or_default(),
    )?;
    let seed = dialogue::parse_seed(params.seed.as_deref())?;

    let responder = state.registry.resolve(&request.model).await?;
    let InteractionRequest {
        model,
        user_input,
        history,
        personas,
    } = request.with_personas(state.personas.sample(seed)?);

    info!(
        "Generating with '{}' ({} history turns, {} personas)",
        model,
        history.len(),
        personas.len()
    );

    // Generation is blocking and runs to completion even if the client leaves.
    let input = user_input.clone();
    let response = tokio::task::spawn_blocking(move || {
        responder.respond(&input, &history, &personas)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Generation task failed: {e}")))??;

    debug!("Reply from '{}': {}", model, response);

    Ok(Json(InteractionResponse {
        user_input,
        response,
    }))
}
