//! Polyroute HTTP server
//!
//! Starts an Axum web server that routes inference requests across the
//! configured backend providers.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use clap::Parser;
use polyroute::cli::{Cli, Command, generate_config_template};
use polyroute::{config::Config, handlers, middleware, telemetry};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Template generation runs without loading a config
    if let Some(Command::Config { output }) = cli.command {
        match output {
            Some(path) => {
                std::fs::write(&path, generate_config_template())?;
                println!("Wrote configuration template to {}", path);
            }
            None => print!("{}", generate_config_template()),
        }
        return Ok(());
    }

    let config = Config::from_file(&cli.config)?;
    telemetry::init(&config.observability.log_level);

    tracing::info!(
        "Starting Polyroute server on {}:{}",
        config.server.host,
        config.server.port
    );

    let host = config.server.host.clone();
    let port = config.server.port;
    let state = handlers::AppState::new(config).await?;

    let app = Router::new()
        .route("/health", get(handlers::health::handler))
        .route("/metrics", get(handlers::metrics::handler))
        .route("/v1/chat", post(handlers::chat::handler))
        .route("/v1/chat/stream", post(handlers::chat::stream_handler))
        .route("/v1/models", get(handlers::models::handler))
        .route("/v1/providers", get(handlers::providers::handler))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .with_state(state.clone());

    let addr = SocketAddr::from((
        host.parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        port,
    ));

    tracing::info!("Listening on {}", addr);
    tracing::info!("Health check available at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the health sweep and release every provider before exiting
    state.router().cleanup().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
