//! Chat completion endpoints
//!
//! `POST /v1/chat` routes a completion through the router with fallback;
//! `POST /v1/chat/stream` serves a streaming completion over SSE with no
//! fallback (a failed stream surfaces directly).

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::middleware::RequestId;
use crate::provider::{Capability, CompletionOptions, StreamEvent};
use crate::router::RouteContext;
use axum::{
    Extension, Json,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Completion request body
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Session identity for sticky routing
    #[serde(default)]
    pub session_id: Option<String>,
    /// Capabilities the serving provider must advertise
    #[serde(default)]
    pub required_capabilities: HashSet<Capability>,
    /// Cost ceiling in USD for the reference workload
    #[serde(default)]
    pub max_cost: Option<f64>,
}

impl ChatRequest {
    fn validate(&self) -> AppResult<()> {
        if self.prompt.trim().is_empty() {
            return Err(AppError::Validation("prompt must not be empty".to_string()));
        }
        Ok(())
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    fn context(&self) -> RouteContext {
        RouteContext {
            session_id: self.session_id.clone(),
            required_capabilities: self.required_capabilities.clone(),
            max_cost: self.max_cost,
            quality_preference: None,
        }
    }
}

/// Completion response body
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub text: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub response_time_ms: u64,
    pub request_id: String,
}

/// Non-streaming completion handler
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    request.validate()?;

    let response = state
        .router()
        .route(&request.prompt, &request.options(), &request.context())
        .await?;

    tracing::info!(
        request_id = %request_id,
        model = %response.model,
        completion_tokens = response.completion_tokens,
        "Completion served"
    );

    Ok(Json(ChatResponse {
        text: response.text,
        model: response.model,
        prompt_tokens: response.prompt_tokens,
        completion_tokens: response.completion_tokens,
        response_time_ms: response.response_time.as_millis() as u64,
        request_id: request_id.to_string(),
    }))
}

/// Streaming completion handler (SSE)
///
/// Events: `token` per generated chunk, `done` on completion, `error` when
/// the stream fails. Dropping the client connection cancels the upstream
/// provider call without penalizing the provider's breaker.
pub async fn stream_handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ChatRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>> {
    request.validate()?;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
    let cancel = CancellationToken::new();
    let router = state.router().clone();
    let options = request.options();
    let context = request.context();
    let prompt = request.prompt.clone();
    let task_cancel = cancel.clone();

    tokio::spawn(async move {
        let event_tx = tx.clone();
        let event_cancel = cancel.clone();
        let on_event = Box::new(move |event: StreamEvent| {
            let sse_event = match event {
                StreamEvent::Token(text) => Event::default().event("token").data(text),
                StreamEvent::Done {
                    model,
                    completion_tokens,
                } => Event::default().event("done").data(
                    serde_json::json!({
                        "model": model,
                        "completion_tokens": completion_tokens,
                    })
                    .to_string(),
                ),
            };
            // A failed send means the client went away: cancel upstream
            if event_tx.send(sse_event).is_err() {
                event_cancel.cancel();
            }
        });

        if let Err(e) = router
            .route_stream(&prompt, &options, on_event, &context, task_cancel)
            .await
        {
            if e.is_cancellation() {
                tracing::debug!(request_id = %request_id, "Stream cancelled");
            } else {
                tracing::warn!(
                    request_id = %request_id,
                    error = %e,
                    "Streaming request failed"
                );
                let _ = tx.send(Event::default().event("error").data(e.to_string()));
            }
        }
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|event| (Ok::<_, std::convert::Infallible>(event), rx))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
