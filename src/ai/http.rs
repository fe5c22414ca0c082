//! Blocking HTTP transport for the messages API.
//!
//! Failures are classified by HTTP status code into [`AiError`] kinds —
//! body text is carried for logs but never inspected for control flow.

use super::{AiClient, AiError, AiTurn, SYSTEM_PROMPT};
use crate::config::AiConfig;
use crate::error::{AssistantError, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages-API client over `reqwest`'s blocking transport.
///
/// Always called through the gateway's deadline, so a hung request can
/// only strand an abandoned worker, never the dispatcher.
pub struct HttpAiClient {
    http: reqwest::blocking::Client,
    config: AiConfig,
    api_key: String,
}

impl HttpAiClient {
    /// Build a client, reading the API key from the configured
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns a config error if the key is missing or the HTTP client
    /// cannot be constructed.
    pub fn from_env(config: &AiConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AssistantError::Config(format!("{} is not set", config.api_key_env))
            })?;
        Self::with_api_key(config, api_key)
    }

    /// Build a client with an explicit API key.
    pub fn with_api_key(config: &AiConfig, api_key: String) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssistantError::Ai(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            http,
            config: config.clone(),
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

fn map_http_error(status: reqwest::StatusCode, body: &str) -> AiError {
    debug!("provider error {status}: {}", body.chars().take(200).collect::<String>());
    match status.as_u16() {
        401 | 403 => AiError::Unauthorized,
        429 => AiError::RateLimited,
        408 | 504 => AiError::Timeout,
        code => AiError::Transport(format!("HTTP {code}")),
    }
}

impl AiClient for HttpAiClient {
    fn ask(&self, turns: &[AiTurn]) -> std::result::Result<String, AiError> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": SYSTEM_PROMPT,
            "messages": turns,
        });

        let response = self
            .http
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout
                } else {
                    AiError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let parsed: MessagesResponse = response
            .json()
            .map_err(|e| AiError::Invalid(format!("malformed provider response: {e}")))?;
        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| AiError::Invalid("empty response content".to_owned()))
    }
}
