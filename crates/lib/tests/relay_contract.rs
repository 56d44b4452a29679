//! Integration test: serve the relay router on a free port with a scripted
//! completion backend and exercise the HTTP contract end to end. No upstream
//! API is contacted. The server task is left running when a test ends.

use async_trait::async_trait;
use lib::relay::{relay_router, CompletionBackend, RelayState, UpstreamError, HEALTH_MESSAGE};
use std::sync::Arc;
use std::time::Duration;

struct ScriptedBackend {
    reply: Option<String>,
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, _system: &str, message: &str) -> Result<String, UpstreamError> {
        match &self.reply {
            Some(reply) => Ok(reply.replace("{message}", message)),
            None => Err(UpstreamError::Api("503 upstream down".to_string())),
        }
    }
}

async fn serve(state: RelayState) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, relay_router(state)).await;
    });
    port
}

/// Poll GET / until the server answers, then return the base URL.
async fn wait_ready(port: u16) -> String {
    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(&base).send().await {
            if resp.status().is_success() {
                let body = resp.text().await.expect("health body");
                assert_eq!(body, HEALTH_MESSAGE);
                return base;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("GET {} did not return 200 within 5s", base);
}

fn open_state(reply: &str) -> RelayState {
    RelayState {
        backend: Arc::new(ScriptedBackend {
            reply: Some(reply.to_string()),
        }),
        required_token: None,
    }
}

#[tokio::test]
async fn chat_round_trips_message_and_reply() {
    let port = serve(open_state("You said: {message}")).await;
    let base = wait_ready(port).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({ "message": "I feel anxious" }))
        .send()
        .await
        .expect("POST /chat");
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.expect("parse JSON");
    assert_eq!(
        json.get("reply").and_then(|v| v.as_str()),
        Some("You said: I feel anxious")
    );
}

#[tokio::test]
async fn missing_or_blank_message_is_a_bad_request() {
    let port = serve(open_state("unused")).await;
    let base = wait_ready(port).await;
    let client = reqwest::Client::new();

    for body in [serde_json::json!({}), serde_json::json!({ "message": "   " })] {
        let resp = client
            .post(format!("{}/chat", base))
            .json(&body)
            .send()
            .await
            .expect("POST /chat");
        assert_eq!(resp.status(), 400);
        let json: serde_json::Value = resp.json().await.expect("parse JSON");
        assert_eq!(
            json.get("error").and_then(|v| v.as_str()),
            Some("Message is required")
        );
    }
}

#[tokio::test]
async fn backend_failure_maps_to_500_with_details() {
    let state = RelayState {
        backend: Arc::new(ScriptedBackend { reply: None }),
        required_token: None,
    };
    let port = serve(state).await;
    let base = wait_ready(port).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({ "message": "hello" }))
        .send()
        .await
        .expect("POST /chat");
    assert_eq!(resp.status(), 500);
    let json: serde_json::Value = resp.json().await.expect("parse JSON");
    assert_eq!(
        json.get("error").and_then(|v| v.as_str()),
        Some("Failed to get response")
    );
    assert!(json
        .get("details")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .contains("upstream down"));
}

#[tokio::test]
async fn empty_backend_reply_gets_a_supportive_fallback() {
    let port = serve(open_state("   ")).await;
    let base = wait_ready(port).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/chat", base))
        .json(&serde_json::json!({ "message": "hello" }))
        .send()
        .await
        .expect("POST /chat");
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.expect("parse JSON");
    let reply = json.get("reply").and_then(|v| v.as_str()).unwrap_or("");
    assert!(!reply.trim().is_empty());
}

#[tokio::test]
async fn token_gate_rejects_missing_and_wrong_bearer() {
    let state = RelayState {
        backend: Arc::new(ScriptedBackend {
            reply: Some("ok".to_string()),
        }),
        required_token: Some("sekrit".to_string()),
    };
    let port = serve(state).await;
    let base = wait_ready(port).await;
    let client = reqwest::Client::new();
    let url = format!("{}/chat", base);
    let body = serde_json::json!({ "message": "hello" });

    let resp = client.post(&url).json(&body).send().await.expect("no auth");
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(&url)
        .bearer_auth("wrong")
        .json(&body)
        .send()
        .await
        .expect("wrong auth");
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(&url)
        .bearer_auth("sekrit")
        .json(&body)
        .send()
        .await
        .expect("good auth");
    assert_eq!(resp.status(), 200);

    // The health check stays open even when chat is gated.
    let resp = client.get(&base).send().await.expect("health");
    assert_eq!(resp.status(), 200);
}
