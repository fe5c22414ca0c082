//! Collaborator seams: speech capture and local action execution.
//!
//! The core never talks to a microphone or the OS directly; it drives
//! these traits. Real backends live outside this crate — the console
//! implementations here keep the keyboard surface and the tests honest.

use crate::nlu::Intent;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::info;

/// Speech capture boundary.
///
/// Both calls block; implementations enforce their own timeouts and
/// report failure as `None`/`false` rather than panicking.
pub trait Transcriber: Send + Sync {
    /// Capture one utterance. `None` on timeout, no-match, or error.
    fn transcribe(&self, timeout: Duration, phrase_limit: Duration) -> Option<String>;

    /// Listen briefly; `true` only if recognized speech contains a
    /// configured wake token.
    fn detect_wake_word(&self, timeout: Duration) -> bool;
}

/// Local OS action boundary.
///
/// Outcomes are always text — errors are reported in the outcome string,
/// never raised, so one misbehaving shim cannot abort dispatch.
pub trait ActionExecutor: Send + Sync {
    /// Execute a keyword intent against the raw command. `None` means
    /// the executor declines and dispatch keeps matching.
    fn run_intent(&self, intent: Intent, command: &str) -> Option<String>;

    /// Execute a validated AI-proposed action.
    fn run_action(&self, action: &str, params: &serde_json::Value) -> String;

    /// Try to launch an application named in the command. `None` if no
    /// known application matched.
    fn open_app(&self, command: &str) -> Option<String>;
}

/// Transcriber for environments with no microphone: never hears anything.
pub struct NullTranscriber;

impl Transcriber for NullTranscriber {
    fn transcribe(&self, timeout: Duration, _phrase_limit: Duration) -> Option<String> {
        std::thread::sleep(timeout.min(Duration::from_millis(100)));
        None
    }

    fn detect_wake_word(&self, timeout: Duration) -> bool {
        std::thread::sleep(timeout.min(Duration::from_millis(100)));
        false
    }
}

/// Synthesizer that prints instead of producing audio.
///
/// Used by the keyboard surface; the playback path still honors the
/// interrupt flag so `stop_current` behaves identically.
pub struct ConsoleSynthesizer;

impl crate::speech::SpeechSynthesizer for ConsoleSynthesizer {
    fn synthesize(&self, text: &str, out_path: &Path) -> crate::error::Result<()> {
        std::fs::write(out_path, text)?;
        Ok(())
    }

    fn play(&self, path: &Path, _interrupt: &AtomicBool) -> crate::error::Result<()> {
        if let Ok(text) = std::fs::read_to_string(path) {
            println!("vesper: {text}");
        }
        Ok(())
    }
}

/// Executor that narrates what it would do instead of touching the OS.
///
/// Volume requests are parsed for real so the narrated outcome matches a
/// native shim's ("Ovoz 50 foiz").
pub struct ConsoleExecutor;

impl ConsoleExecutor {
    fn volume_outcome(command: &str) -> Option<String> {
        if command.contains("o'chir") || command.contains("mute") {
            return Some("Ovoz o'chirildi".to_owned());
        }
        if command.contains("yoq") || command.contains("unmute") {
            return Some("Ovoz yoqildi".to_owned());
        }
        if command.contains("ko'tar") || command.contains("balandlat") {
            return Some("Ovoz ko'tarildi".to_owned());
        }
        if command.contains("pasayt") || command.contains("kamayt") {
            return Some("Ovoz pasaytirildi".to_owned());
        }
        let level = command
            .split_whitespace()
            .find_map(|token| token.parse::<u8>().ok())
            .filter(|level| *level <= 100)?;
        Some(format!("Ovoz {level} foiz"))
    }
}

impl ActionExecutor for ConsoleExecutor {
    fn run_intent(&self, intent: Intent, command: &str) -> Option<String> {
        let outcome = match intent {
            Intent::Volume => Self::volume_outcome(command)?,
            Intent::Screenshot => "Screenshot olindi".to_owned(),
            Intent::Shutdown => "Kompyuter o'chirilmoqda".to_owned(),
            Intent::Restart => "Kompyuter qayta yoqilmoqda".to_owned(),
            Intent::Sleep => "Kompyuter uxlatilmoqda".to_owned(),
            Intent::Lock => "Ekran qulflandi".to_owned(),
            Intent::Stats => "Tizim holati: ma'lumot mavjud emas".to_owned(),
            Intent::Internet => "Tarmoq tekshiruvi mavjud emas".to_owned(),
            Intent::MediaNext | Intent::MediaPrev | Intent::MediaPause | Intent::MediaPlay => {
                "Bajarildi".to_owned()
            }
            Intent::WinMinimizeAll => "Barcha oynalar kichraytirildi".to_owned(),
            Intent::WinMinimize | Intent::WinMaximize | Intent::WinClose => "Bajarildi".to_owned(),
            Intent::FolderOpen => "Papka ochildi".to_owned(),
            Intent::FileRecent => "Oxirgi fayl topilmadi".to_owned(),
            Intent::Translate => "Tarjima xizmati ulanmagan".to_owned(),
            Intent::Weather => "Ob-havo xizmati ulanmagan".to_owned(),
            Intent::Currency => "Valyuta kurslari mavjud emas".to_owned(),
            Intent::News => "Yangiliklar xizmati ulanmagan".to_owned(),
            Intent::Youtube => "YouTube ochilmoqda".to_owned(),
            Intent::Clipboard => "Clipboard bo'sh".to_owned(),
            Intent::Processes => "Jarayonlar ro'yxati mavjud emas".to_owned(),
            // Store-backed intents are answered by the dispatcher.
            Intent::Date
            | Intent::ReminderList
            | Intent::ReminderSet
            | Intent::TaskAdd
            | Intent::TaskList
            | Intent::TaskDone
            | Intent::JournalAdd
            | Intent::JournalRead
            | Intent::MemorySave
            | Intent::MemoryRead
            | Intent::History => return None,
        };
        info!("console executor: {intent:?} -> {outcome}");
        Some(outcome)
    }

    fn run_action(&self, action: &str, params: &serde_json::Value) -> String {
        info!("console executor: action {action} {params}");
        match action {
            "" => "Hech narsa bajarilmadi".to_owned(),
            "open_app" => {
                let app = params.get("app").and_then(|v| v.as_str()).unwrap_or("ilova");
                format!("{} ochilmoqda", crate::nlu::capitalize(app))
            }
            "volume" => {
                let level = params.get("level").and_then(serde_json::Value::as_u64).unwrap_or(50);
                format!("Ovoz {level} foiz")
            }
            "kill_process" => {
                let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("jarayon");
                format!("{name} to'xtatildi")
            }
            other => format!("{other} bajarildi"),
        }
    }

    fn open_app(&self, command: &str) -> Option<String> {
        const APPS: &[(&str, &str)] = &[
            ("chrome", "Chrome"),
            ("telegram", "Telegram"),
            ("notepad", "Notepad"),
            ("bloknot", "Notepad"),
            ("kalkulyator", "Kalkulyator"),
            ("calculator", "Kalkulyator"),
            ("word", "Word"),
            ("excel", "Excel"),
        ];
        APPS.iter()
            .find(|(keyword, _)| command.contains(keyword))
            .map(|(_, name)| format!("{name} ochilmoqda"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn console_volume_parses_level() {
        assert_eq!(
            ConsoleExecutor.run_intent(Intent::Volume, "ovoz 50"),
            Some("Ovoz 50 foiz".to_owned())
        );
        assert_eq!(
            ConsoleExecutor.run_intent(Intent::Volume, "ovozni o'chir"),
            Some("Ovoz o'chirildi".to_owned())
        );
        // No level and no direction: decline so dispatch can keep going.
        assert_eq!(ConsoleExecutor.run_intent(Intent::Volume, "ovoz"), None);
    }

    #[test]
    fn console_open_app_matches_known_apps() {
        assert_eq!(
            ConsoleExecutor.open_app("chrome och"),
            Some("Chrome ochilmoqda".to_owned())
        );
        assert_eq!(ConsoleExecutor.open_app("nimadir boshqa"), None);
    }

    #[test]
    fn ai_action_outcomes() {
        assert_eq!(
            ConsoleExecutor.run_action("volume", &serde_json::json!({"level": 30})),
            "Ovoz 30 foiz"
        );
        assert_eq!(
            ConsoleExecutor.run_action("open_app", &serde_json::json!({"app": "chrome"})),
            "Chrome ochilmoqda"
        );
    }
}
