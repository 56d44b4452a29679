//! Relay HTTP client: `POST /chat` with `{message}`, `{reply}` back.

use crate::relay::{ChatReply, ChatRequest};
use async_trait::async_trait;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Reply shown when the relay answers with an empty body.
const EMPTY_REPLY_FALLBACK: &str = "I'm here to listen — could you tell me more?";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("relay api error: {0}")]
    Api(String),
}

/// The completion pipeline seam: raw user text in, bot reply out.
#[async_trait]
pub trait CompletionRelay: Send + Sync {
    async fn chat(&self, message: &str) -> Result<String, RelayError>;
}

/// Client for the relay HTTP endpoint.
#[derive(Clone)]
pub struct RelayClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl RelayClient {
    pub fn new(base_url: Option<String>, token: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CompletionRelay for RelayClient {
    async fn chat(&self, message: &str) -> Result<String, RelayError> {
        let url = format!("{}/chat", self.base_url);
        let body = ChatRequest {
            message: Some(message.to_string()),
        };
        let mut req = self.client.post(&url).json(&body);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(RelayError::Api(format!("{} {}", status, body)));
        }
        let data: ChatReply = res.json().await?;
        if data.reply.trim().is_empty() {
            Ok(EMPTY_REPLY_FALLBACK.to_string())
        } else {
            Ok(data.reply)
        }
    }
}
