//! Blocking command-capture helper shared by the main loop and the
//! confirmation step.
//!
//! Waits out any in-progress narration (echo-loop prevention), then
//! captures, normalizes, and length-guards one utterance.

use crate::config::ListenConfig;
use crate::nlu;
use crate::speech::SpeechHandle;
use crate::state::{ConversationState, StateMachine};
use crate::traits::Transcriber;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Capture one command. Returns normalized text, or `None` on timeout,
/// no-match, or the cross-talk guard.
///
/// Blocking; run on a blocking worker from async contexts.
pub fn listen_for_command(
    transcriber: &dyn Transcriber,
    state: &StateMachine,
    speech: &SpeechHandle,
    config: &ListenConfig,
) -> Option<String> {
    if state.is_speaking() {
        debug!("narration in progress, delaying listen");
        state.wait_until_quiet(Duration::from_secs(config.speaking_wait_secs));
        std::thread::sleep(Duration::from_millis(200));
    }

    let raw = transcriber.transcribe(
        Duration::from_secs(config.timeout_secs),
        Duration::from_secs(config.phrase_limit_secs),
    );
    let Some(raw) = raw else {
        state.set(ConversationState::Idle);
        return None;
    };

    let text = nlu::normalize(&raw);
    let words = text.split_whitespace().count();
    if words > config.max_command_words {
        warn!("overlong utterance ({words} words), likely cross-talk: {text}");
        speech.speak("Bitta buyruq ayting");
        state.set(ConversationState::Idle);
        return None;
    }

    info!("user: {text}");
    state.set(ConversationState::Idle);
    Some(text)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::SpeechOutputConfig;
    use crate::tempfiles::TempRegistry;
    use std::sync::Arc;
    use std::sync::Mutex;

    struct ScriptedTranscriber {
        replies: Mutex<Vec<Option<String>>>,
    }

    impl Transcriber for ScriptedTranscriber {
        fn transcribe(&self, _timeout: Duration, _limit: Duration) -> Option<String> {
            self.replies.lock().unwrap().pop().flatten()
        }

        fn detect_wake_word(&self, _timeout: Duration) -> bool {
            false
        }
    }

    fn speech() -> (SpeechHandle, crate::speech::SpeechWorker) {
        crate::speech::start(
            Arc::new(crate::traits::ConsoleSynthesizer),
            Arc::new(StateMachine::new()),
            Arc::new(TempRegistry::new()),
            SpeechOutputConfig::default(),
        )
    }

    #[test]
    fn normalizes_captured_text() {
        let transcriber = ScriptedTranscriber {
            replies: Mutex::new(vec![Some("  OVOZ   50 ".to_owned())]),
        };
        let state = StateMachine::new();
        let (speech, worker) = speech();

        let text =
            listen_for_command(&transcriber, &state, &speech, &ListenConfig::default());
        assert_eq!(text, Some("ovoz 50".to_owned()));
        assert_eq!(state.get(), ConversationState::Idle);

        speech.shutdown();
        worker.join();
    }

    #[test]
    fn overlong_utterance_is_discarded() {
        let long = (0..13).map(|i| format!("soz{i}")).collect::<Vec<_>>().join(" ");
        let transcriber = ScriptedTranscriber {
            replies: Mutex::new(vec![Some(long)]),
        };
        let state = StateMachine::new();
        let (speech, worker) = speech();

        let text =
            listen_for_command(&transcriber, &state, &speech, &ListenConfig::default());
        assert_eq!(text, None);

        speech.shutdown();
        worker.join();
    }

    #[test]
    fn boundary_length_is_accepted() {
        let exactly_max = (0..12).map(|i| format!("soz{i}")).collect::<Vec<_>>().join(" ");
        let transcriber = ScriptedTranscriber {
            replies: Mutex::new(vec![Some(exactly_max.clone())]),
        };
        let state = StateMachine::new();
        let (speech, worker) = speech();

        let text =
            listen_for_command(&transcriber, &state, &speech, &ListenConfig::default());
        assert_eq!(text, Some(exactly_max));

        speech.shutdown();
        worker.join();
    }
}
