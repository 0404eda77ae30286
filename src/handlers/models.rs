//! Model listing endpoint
//!
//! Aggregates each ready provider's model list. Providers that fail to list
//! are skipped by the router, so a single broken backend never empties the
//! response.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::handlers::AppState;
use crate::provider::ModelInfo;

/// Aggregated model listing
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

/// Model listing handler
pub async fn handler(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = state.router().get_all_models().await;
    Json(ModelsResponse { models })
}
