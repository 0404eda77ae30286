//! HTTP request handlers for the Polyroute API

use crate::config::Config;
use crate::error::AppResult;
use crate::provider::build_providers;
use crate::router::ModelRouter;
use std::sync::Arc;

pub mod chat;
pub mod health;
pub mod metrics;
pub mod models;
pub mod providers;

/// Application state shared across all handlers
///
/// Contains configuration and the router. Both are Arc'd for cheap cloning
/// across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    router: Arc<ModelRouter>,
}

impl AppState {
    /// Create state from configuration: build the router and register every
    /// configured provider
    ///
    /// A provider whose backend is unreachable at startup is logged and
    /// skipped rather than aborting the server; the remaining providers
    /// still serve traffic.
    ///
    /// # Errors
    /// Returns an error when router construction or provider construction
    /// (not initialization) fails.
    pub async fn new(config: Config) -> AppResult<Self> {
        let config = Arc::new(config);
        let router = Arc::new(ModelRouter::new(config.routing.to_settings())?);

        for provider in build_providers(&config)? {
            let name = provider.name().to_string();
            if let Err(e) = router.register_provider(provider).await {
                tracing::warn!(
                    provider_name = %name,
                    error = %e,
                    "Provider registration failed at startup, continuing without it"
                );
            }
        }

        Ok(Self { config, router })
    }

    /// Get reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the shared router handle
    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 3000
"#;
        toml::from_str(toml).expect("should parse test config")
    }

    #[tokio::test]
    async fn test_appstate_new_creates_state() {
        let state = AppState::new(create_test_config())
            .await
            .expect("AppState::new should succeed");
        assert_eq!(state.config().server.port, 3000);
        state.router().cleanup().await;
    }

    #[tokio::test]
    async fn test_appstate_is_clonable() {
        let state = AppState::new(create_test_config())
            .await
            .expect("AppState::new should succeed");

        // Clone should work (cheap Arc clone)
        let state2 = state.clone();
        assert_eq!(state2.config().server.port, 3000);
        state.router().cleanup().await;
    }
}
