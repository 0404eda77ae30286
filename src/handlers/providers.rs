//! Provider status endpoint
//!
//! Exposes the per-provider health/breaker view plus the router-level
//! counter snapshot in one response.

use axum::{Json, extract::State};
use serde::Serialize;
use std::collections::HashMap;

use crate::handlers::AppState;
use crate::router::{ProviderStatus, RouterMetrics};

/// Provider status response
#[derive(Serialize)]
pub struct ProvidersResponse {
    pub providers: HashMap<String, ProviderStatus>,
    pub router: RouterMetrics,
}

/// Provider status handler
pub async fn handler(State(state): State<AppState>) -> Json<ProvidersResponse> {
    let providers = state.router().get_provider_status().await;
    let router = state.router().get_metrics().await;
    Json(ProvidersResponse { providers, router })
}
