//! Conversation state machine.
//!
//! Exactly one authoritative instance exists per process. Transitions are
//! serialized under a single lock; observers run outside it. The speaking
//! signal is raised on the transition into [`ConversationState::Speaking`]
//! and must be cleared explicitly by the speech worker once playback ends —
//! a stuck signal would permanently block wake-word detection.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// The assistant's conversational mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// Passive: only wake-word detection is active.
    Background,
    /// Actively capturing a command.
    Listening,
    /// Waiting on the external model.
    Processing,
    /// Narrating a response.
    Speaking,
    /// Between activities, still in conversation.
    Idle,
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Background => "background",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
            Self::Idle => "idle",
        };
        f.write_str(name)
    }
}

type Observer = std::sync::Arc<dyn Fn(ConversationState) + Send + Sync>;

struct StateInner {
    state: ConversationState,
    changed_at: Instant,
}

/// Thread-safe conversation state with change observers.
pub struct StateMachine {
    inner: Mutex<StateInner>,
    speaking: AtomicBool,
    observers: Mutex<Vec<Observer>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a machine starting in [`ConversationState::Background`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StateInner {
                state: ConversationState::Background,
                changed_at: Instant::now(),
            }),
            speaking: AtomicBool::new(false),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Transition to `new`. A same-state request is a silent no-op.
    ///
    /// The speaking signal is raised before any observer sees the change.
    /// Observer panics are logged and swallowed.
    pub fn set(&self, new: ConversationState) {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.state == new {
                return;
            }
            inner.state = new;
            inner.changed_at = Instant::now();
            if new == ConversationState::Speaking {
                self.speaking.store(true, Ordering::SeqCst);
            }
        }

        let observers = self
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(new))).is_err() {
                warn!("state observer panicked on transition to {new}");
            }
        }
    }

    /// Current state. Never blocks beyond the transition lock.
    #[must_use]
    pub fn get(&self) -> ConversationState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    /// Time since the last transition.
    #[must_use]
    pub fn elapsed_in_state(&self) -> Duration {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .changed_at
            .elapsed()
    }

    /// Whether a narration is currently in flight (or settling).
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Clear the speaking signal. Called by the speech worker after
    /// playback and the settle pause, success or failure.
    pub fn clear_speaking(&self) {
        self.speaking.store(false, Ordering::SeqCst);
    }

    /// Block until the speaking signal clears or `timeout` elapses.
    ///
    /// Returns `true` if the signal cleared. Intended for the blocking
    /// listen path, so it polls rather than parking.
    pub fn wait_until_quiet(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_speaking() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(15));
        }
        true
    }

    /// Register a permanent state-change observer.
    pub fn on_change(&self, observer: impl Fn(ConversationState) + Send + Sync + 'static) {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(std::sync::Arc::new(observer));
    }
}
