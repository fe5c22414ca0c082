//! Provider contract tests for the HTTP model client.
//!
//! Verifies request shape and, most importantly, that failures are
//! classified by status code into structured error kinds.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use vesper::ai::http::HttpAiClient;
use vesper::ai::{AiClient, AiError, AiTurn};
use vesper::config::AiConfig;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(base_url: &str) -> AiConfig {
    AiConfig {
        base_url: base_url.to_owned(),
        timeout_secs: 5,
        ..AiConfig::default()
    }
}

async fn ask(config: AiConfig, api_key: &str, question: &str) -> Result<String, AiError> {
    let api_key = api_key.to_owned();
    let question = question.to_owned();
    // `reqwest::blocking` builds and drops an internal runtime during
    // client construction, which panics on an async runtime thread — so
    // both the build and the call run on a blocking thread.
    tokio::task::spawn_blocking(move || {
        let client = HttpAiClient::with_api_key(&config, api_key).unwrap();
        let turns = vec![AiTurn::user(&question)];
        client.ask(&turns)
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn request_carries_key_model_and_messages() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": AiConfig::default().model,
            "messages": [{"role": "user", "content": "Salom"}],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "{\"type\":\"answer\",\"speak\":\"Salom\",\"confidence\":0.9}"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = ask(config(&server.uri()), "test-key", "Salom").await.unwrap();
    assert!(reply.contains("answer"));
}

#[tokio::test]
async fn unauthorized_maps_to_structured_kind() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "bad key"}})),
        )
        .mount(&server)
        .await;

    assert_eq!(
        ask(config(&server.uri()), "bad-key", "Salom").await,
        Err(AiError::Unauthorized)
    );
}

#[tokio::test]
async fn rate_limit_maps_to_structured_kind() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    assert_eq!(
        ask(config(&server.uri()), "test-key", "Salom").await,
        Err(AiError::RateLimited)
    );
}

#[tokio::test]
async fn server_error_is_a_transport_kind() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    assert!(matches!(
        ask(config(&server.uri()), "test-key", "Salom").await,
        Err(AiError::Transport(_))
    ));
}

#[tokio::test]
async fn empty_content_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
        .mount(&server)
        .await;

    assert!(matches!(
        ask(config(&server.uri()), "test-key", "Salom").await,
        Err(AiError::Invalid(_))
    ));
}
