//! Completion relay: the stateless HTTP endpoint that forwards user text to a
//! hosted completion model behind a fixed supportive persona.
//!
//! `server` hosts `POST /chat` (and the `GET /` health check); `client` is the
//! reqwest caller the session controller and gesture bridge submit through;
//! `upstream` talks to the OpenAI-compatible completions API.

mod client;
mod server;
mod upstream;

pub use client::{CompletionRelay, RelayClient, RelayError};
pub use server::{relay_router, run_relay, RelayState, HEALTH_MESSAGE};
pub use upstream::{CompletionBackend, OpenAiClient, UpstreamError};

use serde::{Deserialize, Serialize};

/// Wire request for `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

/// Wire reply for `POST /chat` on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub reply: String,
}
