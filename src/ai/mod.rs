//! External model boundary: typed responses, JSON recovery, and the
//! rate-limited, deadline-bounded gateway.
//!
//! The model is instructed to answer in strict JSON. Whatever comes back
//! is parsed into [`AiResponse`] immediately at this boundary; nothing
//! downstream ever sees raw model text. Transport failures arrive as
//! structured [`AiError`] kinds — never as strings to inspect.

pub mod http;

use crate::config::AiConfig;
use crate::ratelimit::RateLimiter;
use crate::state::{ConversationState, StateMachine};
use crate::timebox;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// System prompt demanding strict JSON output.
pub const SYSTEM_PROMPT: &str = "\
Siz VESPER — Windows kompyuter yordamchisiz.

MUHIM: Har doim faqat JSON formatida javob bering:

Buyruq uchun:
{\"type\": \"command\", \"action\": \"open_app|volume|shutdown|restart|minimize|maximize|kill_process|screenshot\", \"params\": {\"app\": \"chrome\", \"level\": 50}, \"speak\": \"Bajarildi\", \"confidence\": 0.95}

Savol uchun:
{\"type\": \"answer\", \"speak\": \"Qisqa javob (1-2 jumla, o'zbek tilida)\", \"confidence\": 0.9}

Tushunilmasa:
{\"type\": \"unknown\", \"speak\": \"Tushunmadim, qaytadan ayting\", \"confidence\": 0.1}

QOIDALAR:
- Faqat JSON qaytaring — hech qanday matn emas
- speak: max 2 jumla, faqat o'zbek tilida
- confidence: 0.0-1.0 oralig'ida
- Xavfli buyruqlar uchun confidence 0.95+ bo'lishi kerak";

/// User-facing phrases for the AI path.
pub mod phrases {
    /// Narrated before the model call starts.
    pub const FILLER: &str = "Bir daqiqa...";
    /// Local rate limiter refused the call.
    pub const PLEASE_WAIT: &str = "Biroz kuting";
    /// Deadline elapsed or the network timed out.
    pub const SLOW_NETWORK: &str = "Internet sekin, qayta urining";
    /// Provider rejected the credentials.
    pub const BAD_API_KEY: &str = "API kalit noto'g'ri, sozlamalarga kiring";
    /// Provider-side rate limit.
    pub const TOO_MANY_REQUESTS: &str = "Juda ko'p so'rov, bir daqiqa kuting";
    /// Anything else.
    pub const TECHNICAL_ERROR: &str = "Texnik xato, qayta urining";
    /// No API key configured at all.
    pub const NOT_CONFIGURED: &str = "API kaliti sozlanmagan";
}

/// Structured failure kinds from the model boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AiError {
    /// Credentials rejected (HTTP 401/403).
    #[error("provider rejected credentials")]
    Unauthorized,
    /// Provider-side rate limit (HTTP 429).
    #[error("provider rate limit hit")]
    RateLimited,
    /// Deadline or transport timeout.
    #[error("model call timed out")]
    Timeout,
    /// No API key configured.
    #[error("no API key configured")]
    NotConfigured,
    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// Response arrived but could not be used.
    #[error("invalid response: {0}")]
    Invalid(String),
}

impl AiError {
    /// The phrase narrated to the user for this failure kind.
    #[must_use]
    pub fn narration(&self) -> &'static str {
        match self {
            Self::Unauthorized => phrases::BAD_API_KEY,
            Self::RateLimited => phrases::TOO_MANY_REQUESTS,
            Self::Timeout => phrases::SLOW_NETWORK,
            Self::NotConfigured => phrases::NOT_CONFIGURED,
            Self::Transport(_) | Self::Invalid(_) => phrases::TECHNICAL_ERROR,
        }
    }
}

/// One side of a conversation exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiTurn {
    /// "user" or "assistant".
    pub role: Role,
    /// Turn text.
    pub content: String,
}

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl AiTurn {
    /// A user turn.
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_owned(),
        }
    }

    /// An assistant turn.
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_owned(),
        }
    }
}

/// Blocking transport to the external model.
///
/// Implementations may hang or be slow; callers wrap every use in a
/// deadline.
pub trait AiClient: Send + Sync {
    /// Send the conversation and return the raw model text.
    fn ask(&self, turns: &[AiTurn]) -> Result<String, AiError>;
}

/// Placeholder client used when no API key is configured.
pub struct UnconfiguredClient;

impl AiClient for UnconfiguredClient {
    fn ask(&self, _turns: &[AiTurn]) -> Result<String, AiError> {
        Err(AiError::NotConfigured)
    }
}

fn default_confidence() -> f32 {
    1.0
}

/// Structured model response, validated at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AiResponse {
    /// The model proposes a local action.
    Command {
        /// Action identifier (checked against the allow-list).
        #[serde(default)]
        action: String,
        /// Action parameters.
        #[serde(default)]
        params: serde_json::Value,
        /// Utterance to narrate.
        #[serde(default)]
        speak: String,
        /// Model confidence in \[0, 1\].
        #[serde(default = "default_confidence")]
        confidence: f32,
    },
    /// A plain answer.
    Answer {
        #[serde(default)]
        speak: String,
        #[serde(default = "default_confidence")]
        confidence: f32,
    },
    /// The model did not understand.
    Unknown {
        #[serde(default)]
        speak: String,
        #[serde(default)]
        confidence: f32,
    },
}

impl AiResponse {
    /// Build an answer response.
    #[must_use]
    pub fn answer(speak: &str, confidence: f32) -> Self {
        Self::Answer {
            speak: speak.to_owned(),
            confidence,
        }
    }

    /// The utterance to narrate.
    #[must_use]
    pub fn speak(&self) -> &str {
        match self {
            Self::Command { speak, .. } | Self::Answer { speak, .. } | Self::Unknown { speak, .. } => {
                speak
            }
        }
    }

    /// The confidence score.
    #[must_use]
    pub fn confidence(&self) -> f32 {
        match self {
            Self::Command { confidence, .. }
            | Self::Answer { confidence, .. }
            | Self::Unknown { confidence, .. } => *confidence,
        }
    }

    fn clamp_confidence(mut self) -> Self {
        let clamped = self.confidence().clamp(0.0, 1.0);
        match &mut self {
            Self::Command { confidence, .. }
            | Self::Answer { confidence, .. }
            | Self::Unknown { confidence, .. } => *confidence = clamped,
        }
        self
    }
}

/// Parse raw model text into a structured response.
///
/// Strips code fences, tries a direct parse, then first-brace/last-brace
/// extraction, and finally wraps the raw text as a low-confidence answer.
#[must_use]
pub fn parse_response(raw: &str) -> AiResponse {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim().trim_matches('`').trim();

    if let Ok(response) = serde_json::from_str::<AiResponse>(cleaned) {
        return response.clamp_confidence();
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}'))
        && start < end
        && let Ok(response) = serde_json::from_str::<AiResponse>(&cleaned[start..=end])
    {
        return response.clamp_confidence();
    }

    AiResponse::answer(&raw.chars().take(200).collect::<String>(), 0.5)
}

/// Rate-limited, deadline-bounded front door to the external model.
///
/// Keeps the rolling conversation history and owns the Processing state
/// transitions around each call.
pub struct AiGateway {
    client: Arc<dyn AiClient>,
    limiter: Arc<RateLimiter>,
    state: Arc<StateMachine>,
    history: Mutex<VecDeque<AiTurn>>,
    config: AiConfig,
}

impl AiGateway {
    /// Build a gateway over the given transport.
    #[must_use]
    pub fn new(
        client: Arc<dyn AiClient>,
        limiter: Arc<RateLimiter>,
        state: Arc<StateMachine>,
        config: AiConfig,
    ) -> Self {
        Self {
            client,
            limiter,
            state,
            history: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Ask the model, returning a structured response in every case.
    ///
    /// Rate-limit refusal, deadline elapse, and transport failures all
    /// come back as low-confidence answers carrying the matching
    /// narration; the caller can always just speak the result.
    pub async fn ask(&self, question: &str) -> AiResponse {
        if !self.limiter.try_admit() {
            info!("AI call refused by local rate limiter");
            return AiResponse::answer(phrases::PLEASE_WAIT, 0.0);
        }

        self.state.set(ConversationState::Processing);

        let turns = self.request_turns(question);
        let client = Arc::clone(&self.client);
        let deadline = Duration::from_secs(self.config.timeout_secs);
        let result =
            timebox::run_with_deadline(deadline, Err(AiError::Timeout), move || client.ask(&turns))
                .await;

        let response = match result {
            Ok(raw) => {
                self.remember_exchange(question, &raw);
                let response = parse_response(&raw);
                info!(
                    "AI: {} -> {}",
                    question.chars().take(40).collect::<String>(),
                    response.speak().chars().take(40).collect::<String>()
                );
                response
            }
            Err(err) => {
                warn!("AI call failed: {err}");
                AiResponse::answer(err.narration(), 0.0)
            }
        };

        self.state.set(ConversationState::Idle);
        response
    }

    fn request_turns(&self, question: &str) -> Vec<AiTurn> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let mut turns: Vec<AiTurn> = history.iter().cloned().collect();
        turns.push(AiTurn::user(question));
        let keep = self.config.max_history_exchanges * 2;
        if turns.len() > keep {
            turns.drain(..turns.len() - keep);
        }
        turns
    }

    fn remember_exchange(&self, question: &str, raw_answer: &str) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push_back(AiTurn::user(question));
        history.push_back(AiTurn::assistant(raw_answer));
        let keep = self.config.max_history_exchanges * 2;
        while history.len() > keep {
            history.pop_front();
        }
    }

    /// Number of retained history turns (both roles).
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_json() {
        let response = parse_response(r#"{"type":"answer","speak":"Salom","confidence":0.9}"#);
        assert_eq!(
            response,
            AiResponse::Answer {
                speak: "Salom".to_owned(),
                confidence: 0.9
            }
        );
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"type\":\"command\",\"action\":\"volume\",\"params\":{\"level\":50},\"speak\":\"Bajarildi\",\"confidence\":0.95}\n```";
        let response = parse_response(raw);
        assert_eq!(
            response,
            AiResponse::Command {
                action: "volume".to_owned(),
                params: json!({"level": 50}),
                speak: "Bajarildi".to_owned(),
                confidence: 0.95
            }
        );
    }

    #[test]
    fn extracts_embedded_json() {
        let raw = "Mana javob: {\"type\":\"answer\",\"speak\":\"Toshkent\",\"confidence\":0.8} — shunday.";
        assert_eq!(parse_response(raw).speak(), "Toshkent");
    }

    #[test]
    fn falls_back_to_truncated_answer() {
        let long = "a".repeat(400);
        let response = parse_response(&long);
        match response {
            AiResponse::Answer { speak, confidence } => {
                assert_eq!(speak.chars().count(), 200);
                assert!((confidence - 0.5).abs() < f32::EPSILON);
            }
            other => panic!("expected answer fallback, got {other:?}"),
        }
    }

    #[test]
    fn confidence_is_clamped() {
        let response = parse_response(r#"{"type":"answer","speak":"x","confidence":3.5}"#);
        assert!((response.confidence() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let response = parse_response(r#"{"type":"command","action":"lock"}"#);
        match response {
            AiResponse::Command {
                action, confidence, ..
            } => {
                assert_eq!(action, "lock");
                assert!((confidence - 1.0).abs() < f32::EPSILON);
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    struct ScriptedClient {
        reply: String,
    }

    impl AiClient for ScriptedClient {
        fn ask(&self, _turns: &[AiTurn]) -> Result<String, AiError> {
            Ok(self.reply.clone())
        }
    }

    fn gateway(client: Arc<dyn AiClient>, config: AiConfig) -> AiGateway {
        AiGateway::new(
            client,
            Arc::new(RateLimiter::new(&crate::config::RateLimitConfig::default())),
            Arc::new(StateMachine::new()),
            config,
        )
    }

    #[tokio::test]
    async fn history_stays_bounded() {
        let client = Arc::new(ScriptedClient {
            reply: r#"{"type":"answer","speak":"ok","confidence":0.9}"#.to_owned(),
        });
        let config = AiConfig {
            max_history_exchanges: 2,
            ..AiConfig::default()
        };
        let gateway = gateway(client, config);

        for i in 0..6 {
            let _ = gateway.ask(&format!("savol {i}")).await;
        }
        assert_eq!(gateway.history_len(), 4);
    }

    #[tokio::test]
    async fn rate_limited_call_narrates_wait() {
        let client = Arc::new(ScriptedClient {
            reply: r#"{"type":"answer","speak":"ok","confidence":0.9}"#.to_owned(),
        });
        let gateway = AiGateway::new(
            client,
            Arc::new(RateLimiter::new(&crate::config::RateLimitConfig {
                max_calls: 1,
                window_secs: 60,
            })),
            Arc::new(StateMachine::new()),
            AiConfig::default(),
        );

        assert_eq!(gateway.ask("birinchi").await.speak(), "ok");
        assert_eq!(gateway.ask("ikkinchi").await.speak(), phrases::PLEASE_WAIT);
    }

    #[tokio::test]
    async fn timeout_yields_slow_network_answer() {
        struct HangingClient;
        impl AiClient for HangingClient {
            fn ask(&self, _turns: &[AiTurn]) -> Result<String, AiError> {
                std::thread::sleep(std::time::Duration::from_secs(4));
                Ok(String::new())
            }
        }

        let config = AiConfig {
            timeout_secs: 1,
            ..AiConfig::default()
        };
        let gateway = gateway(Arc::new(HangingClient), config);

        let started = std::time::Instant::now();
        let response = gateway.ask("sekin savol").await;
        assert_eq!(response.speak(), phrases::SLOW_NETWORK);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
