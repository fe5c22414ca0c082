//! The main conversation loop.
//!
//! Background mode watches for the wake word; a wake opens a command
//! capture, which feeds the dispatcher. A cooldown swallows wakes caused
//! by playback echo, and a watchdog forces any state stuck outside
//! Background back to passive listening.

use crate::config::AssistantConfig;
use crate::dispatch::{CommandDispatcher, ContinueSignal};
use crate::error::Result;
use crate::listening;
use crate::nlu;
use crate::speech::SpeechHandle;
use crate::state::{ConversationState, StateMachine};
use crate::traits::Transcriber;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Narrated once at startup.
const GREETING: &str = "Salom! Vesper tayyor. Meni chaqiring.";

/// Drives wake-word watching and command dispatch until cancelled.
pub struct AssistantRuntime {
    config: AssistantConfig,
    state: Arc<StateMachine>,
    speech: SpeechHandle,
    dispatcher: Arc<CommandDispatcher>,
    transcriber: Arc<dyn Transcriber>,
    cancel: CancellationToken,
}

impl AssistantRuntime {
    /// Build the runtime from explicitly constructed parts.
    #[must_use]
    pub fn new(
        config: AssistantConfig,
        state: Arc<StateMachine>,
        speech: SpeechHandle,
        dispatcher: Arc<CommandDispatcher>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self {
            config,
            state,
            speech,
            dispatcher,
            transcriber,
            cancel: CancellationToken::new(),
        }
    }

    /// Token for external shutdown (signal handlers, UI).
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Run the voice loop until cancelled.
    pub async fn run(&self) -> Result<()> {
        info!("assistant ready, watching for wake word");
        self.speech.speak(GREETING);
        self.state.set(ConversationState::Background);

        let cooldown = Duration::from_millis(self.config.wake.cooldown_ms);
        let stale_after = Duration::from_secs(self.config.runtime.stale_state_secs);
        let mut last_wake: Option<Instant> = None;

        while !self.cancel.is_cancelled() {
            match self.state.get() {
                ConversationState::Background => {
                    // Never listen over our own voice.
                    if self.state.is_speaking() {
                        self.pause(Duration::from_millis(100)).await;
                        continue;
                    }
                    if !self.detect_wake().await {
                        continue;
                    }

                    let now = Instant::now();
                    if last_wake.is_some_and(|t| now.duration_since(t) < cooldown) {
                        debug!("wake inside cooldown window, ignoring");
                        self.pause(Duration::from_millis(300)).await;
                        continue;
                    }
                    last_wake = Some(now);

                    self.state.set(ConversationState::Listening);
                    if !self.capture_and_dispatch().await {
                        // Silence right after the wake: drop back to
                        // passive listening instead of holding the
                        // conversation open.
                        self.state.set(ConversationState::Background);
                    }
                }
                ConversationState::Idle | ConversationState::Listening => {
                    // The conversation stays open for follow-ups until it
                    // has been silent for too long.
                    if self.state.elapsed_in_state() > stale_after {
                        info!("conversation idle too long, returning to background");
                        self.state.set(ConversationState::Background);
                        continue;
                    }
                    self.capture_and_dispatch().await;
                }
                state @ (ConversationState::Processing | ConversationState::Speaking) => {
                    // Watchdog: a machine stuck mid-exchange recovers to
                    // passive listening instead of wedging wake detection.
                    if self.state.elapsed_in_state() > stale_after {
                        warn!("stuck in {state}, forcing background");
                        self.state.clear_speaking();
                        self.state.set(ConversationState::Background);
                        continue;
                    }
                    self.pause(Duration::from_millis(50)).await;
                }
            }
        }

        info!("assistant loop stopped");
        Ok(())
    }

    /// Keyboard REPL: typed commands flow through the identical dispatch
    /// pipeline. Used where no microphone backend is wired.
    pub async fn run_keyboard(&self) -> Result<()> {
        info!("keyboard mode; 'xayr' to leave");
        self.speech.speak("Vesper test rejimida tayyor");

        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            let text = nlu::normalize(&line);
                            if text.is_empty() {
                                continue;
                            }
                            if self.dispatcher.process(&text).await == ContinueSignal::ToBackground {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            error!("stdin read failed: {e}");
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn detect_wake(&self) -> bool {
        let transcriber = Arc::clone(&self.transcriber);
        let timeout = Duration::from_secs(self.config.wake.timeout_secs);
        tokio::task::spawn_blocking(move || transcriber.detect_wake_word(timeout))
            .await
            .unwrap_or(false)
    }

    /// Capture one utterance and dispatch it. Returns `false` when
    /// nothing was heard.
    async fn capture_and_dispatch(&self) -> bool {
        let transcriber = Arc::clone(&self.transcriber);
        let state = Arc::clone(&self.state);
        let speech = self.speech.clone();
        let listen = self.config.listen.clone();

        let command = tokio::task::spawn_blocking(move || {
            listening::listen_for_command(&*transcriber, &state, &speech, &listen)
        })
        .await
        .unwrap_or(None);

        let Some(command) = command else {
            return false;
        };
        if self.dispatcher.process(&command).await == ContinueSignal::ToBackground {
            self.state.set(ConversationState::Background);
        }
        true
    }

    async fn pause(&self, duration: Duration) {
        tokio::select! {
            () = self.cancel.cancelled() => {}
            () = tokio::time::sleep(duration) => {}
        }
    }
}
