//! Health check endpoint
//!
//! Provides a simple health check for monitoring and load balancers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;
use crate::provider::HealthStatus;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Number of registered providers
    pub providers: usize,
    /// Number of providers currently reporting healthy or degraded
    pub available_providers: usize,
}

/// Health check handler
///
/// Returns 200 OK as long as the server is up; the body summarizes how many
/// providers are currently usable so monitors can alert on partial outages.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let status = state.router().get_provider_status().await;
    let available = status
        .values()
        .filter(|s| s.health.status != HealthStatus::Unhealthy)
        .count();

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            providers: status.len(),
            available_providers: available,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::extract::State;

    async fn create_test_state() -> AppState {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 3000
"#;
        let config: Config = toml::from_str(toml).expect("should parse test config");
        AppState::new(config).await.expect("should create AppState")
    }

    #[tokio::test]
    async fn test_health_handler_returns_ok() {
        let state = create_test_state().await;
        let (status, Json(body)) = handler(State(state.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "OK");
        assert_eq!(body.providers, 0);
        state.router().cleanup().await;
    }
}
