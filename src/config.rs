//! Configuration types for the assistant.

use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Wake-word watching settings.
    pub wake: WakeConfig,
    /// Command listening settings.
    pub listen: ListenConfig,
    /// Speech output settings.
    pub speech: SpeechOutputConfig,
    /// External model settings.
    pub ai: AiConfig,
    /// AI action safety policy.
    pub safety: SafetyConfig,
    /// External-call rate limiting.
    pub rate_limit: RateLimitConfig,
    /// Realtime-lookup response cache.
    pub cache: CacheConfig,
    /// Command history settings.
    pub history: HistoryConfig,
    /// Persistent store settings.
    pub store: StoreConfig,
    /// Main-loop settings.
    pub runtime: RuntimeConfig,
}

impl AssistantConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AssistantError::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| AssistantError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

/// Wake-word detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// Accepted wake tokens, matched against normalized transcriptions.
    ///
    /// Includes common recognizer misspellings of the canonical wake word.
    pub wake_words: Vec<String>,
    /// Per-attempt listening timeout in seconds.
    pub timeout_secs: u64,
    /// Minimum gap between accepted wakes in milliseconds.
    ///
    /// A wake inside the gap is treated as residual playback echo.
    pub cooldown_ms: u64,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            wake_words: ["jarvis", "jarwis", "jarvas", "garvis", "djarvis"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            timeout_secs: 2,
            cooldown_ms: 2500,
        }
    }
}

/// Command listening settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Per-attempt listening timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum phrase length in seconds.
    pub phrase_limit_secs: u64,
    /// Utterances longer than this many words are discarded as cross-talk.
    pub max_command_words: usize,
    /// How long to wait for an in-progress narration to finish before
    /// opening the microphone, in seconds.
    pub speaking_wait_secs: u64,
    /// Timeout for the verbal confirmation follow-up, in seconds.
    pub confirm_timeout_secs: u64,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 8,
            phrase_limit_secs: 10,
            max_command_words: 12,
            speaking_wait_secs: 5,
            confirm_timeout_secs: 5,
        }
    }
}

/// Speech output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechOutputConfig {
    /// Pause after playback before the speaking signal clears, in
    /// milliseconds. Keeps the playback tail out of wake-word capture.
    pub settle_ms: u64,
    /// Suffix for synthesized temp audio files.
    pub temp_suffix: String,
}

impl Default for SpeechOutputConfig {
    fn default() -> Self {
        Self {
            settle_ms: 350,
            temp_suffix: ".mp3".to_owned(),
        }
    }
}

/// External model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Model identifier sent to the provider.
    pub model: String,
    /// Maximum tokens per response.
    pub max_tokens: u32,
    /// Hard deadline for one model call, in seconds.
    pub timeout_secs: u64,
    /// Rolling conversation history bound, in exchanges.
    pub max_history_exchanges: usize,
    /// Provider base URL.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: "claude-haiku-4-5-20251001".to_owned(),
            max_tokens: 300,
            timeout_secs: 12,
            max_history_exchanges: 8,
            base_url: "https://api.anthropic.com".to_owned(),
            api_key_env: "ANTHROPIC_API_KEY".to_owned(),
        }
    }
}

/// Safety policy for AI-proposed actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Actions whose execution is irreversible or high-impact.
    pub dangerous_actions: Vec<String>,
    /// The only actions the assistant may execute at all.
    pub allowed_actions: Vec<String>,
    /// Minimum confidence for executing a dangerous action.
    pub dangerous_min_confidence: f32,
    /// Accepted actions below this confidence require verbal confirmation.
    pub confirm_below_confidence: f32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            dangerous_actions: ["shutdown", "restart", "delete_file", "kill_process", "format"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            allowed_actions: [
                "open_app",
                "volume",
                "shutdown",
                "restart",
                "screenshot",
                "kill_process",
                "minimize",
                "maximize",
                "lock",
                "sleep",
                "clipboard",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            dangerous_min_confidence: 0.90,
            confirm_below_confidence: 0.75,
        }
    }
}

/// External-call rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum calls per window.
    pub max_calls: usize,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 15,
            window_secs: 60,
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Per-category TTLs in seconds.
    pub ttl_secs: HashMap<String, u64>,
    /// TTL for categories not listed above, in seconds.
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut ttl_secs = HashMap::new();
        ttl_secs.insert("weather".to_owned(), 600);
        ttl_secs.insert("currency".to_owned(), 300);
        ttl_secs.insert("news".to_owned(), 120);
        Self {
            ttl_secs,
            default_ttl_secs: 60,
        }
    }
}

/// Command history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum retained history entries.
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_entries: 200 }
    }
}

/// Persistent store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store root directory (`~/.vesper` when unset).
    pub root_dir: Option<PathBuf>,
}

impl StoreConfig {
    /// Resolve the store root, falling back to `~/.vesper`.
    #[must_use]
    pub fn resolved_root(&self) -> PathBuf {
        self.root_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".vesper")
        })
    }
}

/// Main-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// A non-background state older than this is forced back to
    /// Background by the watchdog, in seconds.
    pub stale_state_secs: u64,
    /// Localhost port used as the single-instance lock.
    pub singleton_port: u16,
    /// Default city for weather lookups.
    pub city: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stale_state_secs: 180,
            singleton_port: 47843,
            city: "Toshkent".to_owned(),
        }
    }
}
