//! Error types for the assistant core.

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Speech capture / transcription error.
    #[error("listening error: {0}")]
    Listen(String),

    /// Speech synthesis or playback error.
    #[error("speech error: {0}")]
    Speech(String),

    /// External model call error.
    #[error("AI error: {0}")]
    Ai(String),

    /// Local action execution error.
    #[error("action error: {0}")]
    Action(String),

    /// Persistent store error.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Reminder scheduling error.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// Another instance already owns the singleton port.
    #[error("another instance is already running")]
    AlreadyRunning,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
