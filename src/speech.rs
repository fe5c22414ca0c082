//! Serialized speech output.
//!
//! All narration flows through one unbounded FIFO consumed by a single
//! worker thread, so concurrent callers can never interleave audio. The
//! worker raises the Speaking state before synthesis and restores a
//! non-speaking state in a drop guard that runs on every exit path —
//! a stuck speaking signal would permanently block wake-word detection.

use crate::config::SpeechOutputConfig;
use crate::error::Result;
use crate::state::{ConversationState, StateMachine};
use crate::tempfiles::TempRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info};

/// Synthesis + playback backend.
///
/// Both calls block the worker thread only, never enqueuers. `play` must
/// poll `interrupt` and return promptly once it flips — that is how a
/// user "stop" halts mid-playback.
pub trait SpeechSynthesizer: Send + Sync {
    /// Render `text` into an audio file at `out_path`.
    fn synthesize(&self, text: &str, out_path: &Path) -> Result<()>;

    /// Play the file to completion, or until `interrupt` is raised.
    fn play(&self, path: &Path, interrupt: &AtomicBool) -> Result<()>;
}

enum SpeechRequest {
    Utterance(String),
    /// Poison sentinel: terminates the worker. Enqueued exactly once, at
    /// teardown.
    Shutdown,
}

/// Cloneable producer handle to the speech queue.
#[derive(Clone)]
pub struct SpeechHandle {
    tx: crossbeam_channel::Sender<SpeechRequest>,
    rx: crossbeam_channel::Receiver<SpeechRequest>,
    interrupt: Arc<AtomicBool>,
    shutdown_sent: Arc<AtomicBool>,
    state: Arc<StateMachine>,
}

impl SpeechHandle {
    /// Enqueue a narration. Non-blocking; order of playback is enqueue
    /// order.
    pub fn speak(&self, text: impl Into<String>) {
        if self.shutdown_sent.load(Ordering::SeqCst) {
            debug!("speech queue already shut down, dropping narration");
            return;
        }
        let _ = self.tx.send(SpeechRequest::Utterance(text.into()));
    }

    /// Halt active playback immediately and discard queued-but-unspoken
    /// narrations. Safe to call concurrently with an in-progress
    /// playback.
    pub fn stop_current(&self) {
        self.interrupt.store(true, Ordering::SeqCst);

        let mut discarded = 0usize;
        while let Ok(request) = self.rx.try_recv() {
            match request {
                SpeechRequest::Utterance(_) => discarded += 1,
                // Never swallow the poison sentinel.
                SpeechRequest::Shutdown => {
                    let _ = self.tx.send(SpeechRequest::Shutdown);
                    break;
                }
            }
        }
        if discarded > 0 {
            debug!("discarded {discarded} queued narrations");
        }

        // If a narration is mid-flight its drop guard restores state;
        // otherwise restore it here.
        if self.state.get() != ConversationState::Speaking {
            self.state.set(ConversationState::Idle);
        }
    }

    /// Enqueue the shutdown sentinel. Idempotent; the first call wins.
    pub fn shutdown(&self) {
        if !self.shutdown_sent.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(SpeechRequest::Shutdown);
        }
    }

    /// Number of queued-but-unstarted narrations.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.rx.len()
    }
}

/// Join handle for the worker thread.
pub struct SpeechWorker {
    handle: std::thread::JoinHandle<()>,
}

impl SpeechWorker {
    /// Wait for the worker to finish draining after shutdown.
    pub fn join(self) {
        if self.handle.join().is_err() {
            error!("speech worker thread panicked");
        }
    }
}

/// Start the speech output queue and its worker thread.
#[must_use]
pub fn start(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    state: Arc<StateMachine>,
    temp: Arc<TempRegistry>,
    config: SpeechOutputConfig,
) -> (SpeechHandle, SpeechWorker) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let interrupt = Arc::new(AtomicBool::new(false));

    let handle = SpeechHandle {
        tx,
        rx: rx.clone(),
        interrupt: Arc::clone(&interrupt),
        shutdown_sent: Arc::new(AtomicBool::new(false)),
        state: Arc::clone(&state),
    };

    let worker_state = state;
    let thread = std::thread::spawn(move || {
        while let Ok(request) = rx.recv() {
            match request {
                SpeechRequest::Shutdown => break,
                SpeechRequest::Utterance(text) => {
                    narrate(&*synthesizer, &worker_state, &temp, &interrupt, &config, &text);
                }
            }
        }
        debug!("speech worker exiting");
    });

    (handle, SpeechWorker { handle: thread })
}

/// Restores non-speaking state and releases the temp file no matter how
/// the narration ended.
struct NarrationGuard<'a> {
    state: &'a StateMachine,
    temp: &'a TempRegistry,
    path: Option<PathBuf>,
    settle: Duration,
}

impl Drop for NarrationGuard<'_> {
    fn drop(&mut self) {
        // Settle pause: keep the playback tail out of wake-word capture.
        std::thread::sleep(self.settle);
        self.state.clear_speaking();
        self.state.set(ConversationState::Idle);
        if let Some(path) = self.path.take() {
            self.temp.release(&path);
        }
    }
}

fn narrate(
    synthesizer: &dyn SpeechSynthesizer,
    state: &StateMachine,
    temp: &TempRegistry,
    interrupt: &AtomicBool,
    config: &SpeechOutputConfig,
    text: &str,
) {
    info!("speak: {text}");
    state.set(ConversationState::Speaking);
    interrupt.store(false, Ordering::SeqCst);

    let mut guard = NarrationGuard {
        state,
        temp,
        path: None,
        settle: Duration::from_millis(config.settle_ms),
    };

    let path = match temp.create(&config.temp_suffix) {
        Ok(path) => path,
        Err(e) => {
            error!("narration skipped: {e}");
            return;
        }
    };
    guard.path = Some(path.clone());

    if let Err(e) = synthesizer.synthesize(text, &path) {
        error!("synthesis failed: {e}");
        return;
    }
    if let Err(e) = synthesizer.play(&path, interrupt) {
        error!("playback failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Records (start, end) spans per narration.
    struct RecordingSynth {
        spans: Arc<Mutex<Vec<(String, Instant, Instant)>>>,
        play_for: Duration,
    }

    impl SpeechSynthesizer for RecordingSynth {
        fn synthesize(&self, _text: &str, out_path: &Path) -> Result<()> {
            std::fs::write(out_path, b"audio").map_err(Into::into)
        }

        fn play(&self, path: &Path, interrupt: &AtomicBool) -> Result<()> {
            let text = path.display().to_string();
            let started = Instant::now();
            while started.elapsed() < self.play_for {
                if interrupt.load(Ordering::SeqCst) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            self.spans
                .lock()
                .unwrap()
                .push((text, started, Instant::now()));
            Ok(())
        }
    }

    fn quick_config() -> SpeechOutputConfig {
        SpeechOutputConfig {
            settle_ms: 10,
            temp_suffix: ".mp3".to_owned(),
        }
    }

    #[test]
    fn narrations_never_overlap() {
        let spans = Arc::new(Mutex::new(Vec::new()));
        let synth = Arc::new(RecordingSynth {
            spans: Arc::clone(&spans),
            play_for: Duration::from_millis(40),
        });
        let state = Arc::new(StateMachine::new());
        let temp = Arc::new(TempRegistry::new());
        let (handle, worker) = start(synth, state, temp, quick_config());

        handle.speak("birinchi");
        handle.speak("ikkinchi");
        handle.shutdown();
        worker.join();

        let spans = spans.lock().unwrap();
        assert_eq!(spans.len(), 2);
        assert!(spans[0].2 <= spans[1].1, "playbacks overlapped");
    }

    #[test]
    fn speaking_signal_clears_after_each_narration() {
        let synth = Arc::new(RecordingSynth {
            spans: Arc::new(Mutex::new(Vec::new())),
            play_for: Duration::from_millis(10),
        });
        let state = Arc::new(StateMachine::new());
        let temp = Arc::new(TempRegistry::new());
        let (handle, worker) = start(synth, Arc::clone(&state), Arc::clone(&temp), quick_config());

        handle.speak("salom");
        handle.shutdown();
        worker.join();

        assert!(!state.is_speaking());
        assert_eq!(state.get(), ConversationState::Idle);
        assert_eq!(temp.tracked(), 0);
    }

    #[test]
    fn failing_synthesizer_still_restores_state() {
        struct BrokenSynth;
        impl SpeechSynthesizer for BrokenSynth {
            fn synthesize(&self, _text: &str, _out: &Path) -> Result<()> {
                Err(crate::error::AssistantError::Speech("no engine".to_owned()))
            }
            fn play(&self, _path: &Path, _interrupt: &AtomicBool) -> Result<()> {
                Ok(())
            }
        }

        let state = Arc::new(StateMachine::new());
        let temp = Arc::new(TempRegistry::new());
        let (handle, worker) = start(
            Arc::new(BrokenSynth),
            Arc::clone(&state),
            Arc::clone(&temp),
            quick_config(),
        );

        handle.speak("salom");
        handle.shutdown();
        worker.join();

        assert!(!state.is_speaking());
        assert_eq!(temp.tracked(), 0);
    }

    #[test]
    fn stop_current_discards_queue_and_halts_playback() {
        let spans = Arc::new(Mutex::new(Vec::new()));
        let synth = Arc::new(RecordingSynth {
            spans: Arc::clone(&spans),
            play_for: Duration::from_secs(5),
        });
        let state = Arc::new(StateMachine::new());
        let temp = Arc::new(TempRegistry::new());
        let (handle, worker) = start(synth, Arc::clone(&state), temp, quick_config());

        handle.speak("uzun matn");
        handle.speak("hech qachon aytilmaydi");
        handle.speak("bu ham");

        // Let the first narration start playing.
        let started = Instant::now();
        while !state.is_speaking() && started.elapsed() < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(5));
        }

        handle.stop_current();
        handle.shutdown();
        worker.join();

        let spans = spans.lock().unwrap();
        // Only the in-flight narration ran, and it was cut short.
        assert_eq!(spans.len(), 1);
        assert!(spans[0].2 - spans[0].1 < Duration::from_secs(2));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let synth = Arc::new(RecordingSynth {
            spans: Arc::new(Mutex::new(Vec::new())),
            play_for: Duration::from_millis(5),
        });
        let state = Arc::new(StateMachine::new());
        let temp = Arc::new(TempRegistry::new());
        let (handle, worker) = start(synth, state, temp, quick_config());

        handle.shutdown();
        handle.shutdown();
        handle.speak("kech qoldi");
        worker.join();
        assert_eq!(handle.queued(), 0);
    }
}
