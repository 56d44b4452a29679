//! Relay HTTP server: health check and the stateless /chat endpoint.

use crate::config::{self, Config};
use crate::relay::{ChatRequest, CompletionBackend, OpenAiClient};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Fixed persona framing every completion. The relay never exposes the prompt;
/// callers only see the `{message}` / `{reply}` contract.
const PERSONA_PROMPT: &str = "You are a mental health support chatbot named \"Solace\".\n\
Your tone is empathetic, calm, and supportive.\n\
Respond in short, simple sentences (1-3 lines max).\n\
Use kind and understanding words.\n\
If the user sounds sad or anxious, comfort them gently.\n\
Avoid robotic or formal tone.";

/// GET / health-check body.
pub const HEALTH_MESSAGE: &str = "Solace relay is running";

/// Reply used when the model returns nothing usable.
const FALLBACK_REPLY: &str = "I'm here for you. Can you tell me more about what's going on?";

/// Shared state for the relay (upstream backend, optional token gate).
#[derive(Clone)]
pub struct RelayState {
    pub backend: Arc<dyn CompletionBackend>,
    /// When Some, POST /chat must carry `Authorization: Bearer <token>`.
    pub required_token: Option<String>,
}

/// Build the relay router: `GET /` health, `POST /chat`.
pub fn relay_router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/chat", post(chat_http))
        .with_state(state)
}

/// GET / returns a fixed human-readable success string (for probes).
async fn health_http() -> &'static str {
    HEALTH_MESSAGE
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// POST /chat: `{message}` in, `{reply}` out; 400 when the message is missing
/// or blank, 500 with `{error, details}` when the upstream call fails.
async fn chat_http(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if let Some(ref required) = state.required_token {
        if bearer_token(&headers) != Some(required.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized" })),
            );
        }
    }
    let message = req
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());
    let Some(message) = message else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Message is required" })),
        );
    };
    match state.backend.complete(PERSONA_PROMPT, message).await {
        Ok(reply) => {
            let reply = if reply.trim().is_empty() {
                FALLBACK_REPLY.to_string()
            } else {
                reply
            };
            (StatusCode::OK, Json(json!({ "reply": reply })))
        }
        Err(e) => {
            log::warn!("chat completion failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to get response",
                    "details": e.to_string(),
                })),
            )
        }
    }
}

/// Run the relay server; binds to config.relay.bind:config.relay.port.
/// When bind is not loopback, a relay token must be configured or startup
/// fails. Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_relay(config: Config) -> Result<()> {
    let bind = config.relay.bind.trim();
    let required_token = config::resolve_relay_token(&config);
    if !config::is_loopback_bind(bind) && required_token.is_none() {
        anyhow::bail!(
            "refusing to bind relay to {} without auth (set relay.token or SOLACE_RELAY_TOKEN)",
            bind
        );
    }

    let api_key = config::resolve_api_key(&config)
        .context("no upstream API key (set OPENAI_API_KEY or upstream.apiKey)")?;
    let backend = OpenAiClient::new(
        Some(config.upstream.base_url.clone()),
        api_key,
        config.upstream.model.clone(),
    );
    let state = RelayState {
        backend: Arc::new(backend),
        required_token,
    };

    let app = relay_router(state);
    let bind_addr = format!("{}:{}", bind, config.relay.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("relay listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server exited")?;
    log::info!("relay stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}
