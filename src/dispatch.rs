//! Command dispatch: the path from a normalized utterance to a narrated
//! outcome.
//!
//! Handler order is fixed: stop and pause vocabularies first, then volume
//! (strictly before power words, so "ovozni o'chir" never reads as a
//! shutdown), then power, reminders, realtime lookups, the keyword intent
//! table, app launching, and finally the AI fallback behind the safety
//! gate. Handler failures are caught here, narrated generically, and
//! logged — they never reach the main loop.

use crate::ai::{AiGateway, AiResponse, phrases};
use crate::cache::ResponseCache;
use crate::config::AssistantConfig;
use crate::error::Result;
use crate::history::{CommandHistory, HistoryEntry};
use crate::listening;
use crate::nlu::{self, Intent, RealtimeKind};
use crate::reminders::{NotifyFn, ReminderScheduler};
use crate::safety::{self, SafetyPolicy};
use crate::speech::SpeechHandle;
use crate::state::StateMachine;
use crate::store::AssistantStore;
use crate::traits::{ActionExecutor, Transcriber};
use chrono::{Datelike, Local, Timelike};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Narrated when the user ends the conversation.
const FAREWELL: &str = "Xop, fonga o'tdim. Kerak bo'lsa chaqiring.";
/// Narrated when a handler fails.
const GENERIC_FAILURE: &str = "Texnik xato yuz berdi, qayta urining";
/// Narrated when the safety gate refuses an AI action.
const CANNOT_DO: &str = "Bu buyruqni bajara olmayman";

const POWER_WORDS: &[&str] = &[
    "kompyuterni o'chir",
    "restart",
    "qayta yoq",
    "uxlat",
    "qulfla",
    "hozir o'chir",
];

const MONTHS_UZ: &[&str] = &[
    "", "yanvar", "fevral", "mart", "aprel", "may", "iyun", "iyul", "avgust", "sentabr",
    "oktabr", "noyabr", "dekabr",
];
const DAYS_UZ: &[&str] = &[
    "dushanba", "seshanba", "chorshanba", "payshanba", "juma", "shanba", "yakshanba",
];

/// What the main loop should do after a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueSignal {
    /// Stay in the conversation.
    Continue,
    /// Return to passive wake-word watching.
    ToBackground,
}

/// Everything the dispatcher needs, constructed explicitly and passed in
/// at startup — no global lookups.
pub struct DispatcherDeps {
    pub state: Arc<StateMachine>,
    pub speech: SpeechHandle,
    pub gateway: Arc<AiGateway>,
    pub executor: Arc<dyn ActionExecutor>,
    pub transcriber: Arc<dyn Transcriber>,
    pub store: Arc<dyn AssistantStore>,
    pub reminders: ReminderScheduler,
    pub cache: Arc<ResponseCache>,
    pub config: AssistantConfig,
}

/// Routes utterances to local handlers or the AI fallback.
pub struct CommandDispatcher {
    state: Arc<StateMachine>,
    speech: SpeechHandle,
    gateway: Arc<AiGateway>,
    executor: Arc<dyn ActionExecutor>,
    transcriber: Arc<dyn Transcriber>,
    store: Arc<dyn AssistantStore>,
    reminders: ReminderScheduler,
    cache: Arc<ResponseCache>,
    policy: SafetyPolicy,
    history: Mutex<CommandHistory>,
    config: AssistantConfig,
}

impl CommandDispatcher {
    /// Build a dispatcher from its dependencies.
    #[must_use]
    pub fn new(deps: DispatcherDeps) -> Self {
        let policy = SafetyPolicy::new(&deps.config.safety);
        let history = Mutex::new(CommandHistory::new(deps.config.history.max_entries));
        Self {
            state: deps.state,
            speech: deps.speech,
            gateway: deps.gateway,
            executor: deps.executor,
            transcriber: deps.transcriber,
            store: deps.store,
            reminders: deps.reminders,
            cache: deps.cache,
            policy,
            history,
            config: deps.config,
        }
    }

    /// Process one normalized utterance.
    pub async fn process(&self, command: &str) -> ContinueSignal {
        let command = command.trim();
        if command.is_empty() {
            return ContinueSignal::Continue;
        }

        if nlu::is_stop_command(command) {
            self.speech.speak(FAREWELL);
            self.record(command, "fonga o'tish");
            return ContinueSignal::ToBackground;
        }

        if nlu::is_pause_command(command) {
            self.speech.stop_current();
            self.record(command, "[to'xtatildi]");
            return ContinueSignal::Continue;
        }

        if let Err(e) = self.dispatch(command).await {
            error!("handler failed for '{command}': {e}");
            self.speech.speak(GENERIC_FAILURE);
            self.record(command, "xato");
        }
        ContinueSignal::Continue
    }

    /// Recent history entries, newest first, for the presentation layer.
    #[must_use]
    pub fn recent_history(&self, n: usize) -> Vec<HistoryEntry> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .recent(n)
    }

    fn record(&self, command: &str, response: &str) {
        info!(
            "cmd: {command} | resp: {}",
            response.chars().take(60).collect::<String>()
        );
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(command, response);
    }

    fn deliver(&self, command: &str, outcome: &str) {
        self.speech.speak(outcome.to_owned());
        self.record(command, outcome);
    }

    async fn dispatch(&self, command: &str) -> Result<()> {
        // Volume first: "o'chir" inside a volume request must never be
        // routed to a power handler.
        if command.contains("ovoz")
            && let Some(outcome) = self.executor.run_intent(Intent::Volume, command)
        {
            self.deliver(command, &outcome);
            return Ok(());
        }

        if POWER_WORDS.iter().any(|w| command.contains(w))
            && let Some(intent) = nlu::match_local_intent(command)
            && matches!(
                intent,
                Intent::Shutdown | Intent::Restart | Intent::Sleep | Intent::Lock
            )
            && let Some(outcome) = self.executor.run_intent(intent, command)
        {
            self.deliver(command, &outcome);
            return Ok(());
        }

        // Reminders before the realtime classifier: "2 soatdan keyin"
        // contains "soat" and would otherwise read as a time question.
        if let Some(intent @ (Intent::ReminderSet | Intent::ReminderList)) =
            nlu::match_local_intent(command)
        {
            let outcome = self.handle_reminder(intent, command);
            self.deliver(command, &outcome);
            return Ok(());
        }

        if let Some(kind) = nlu::needs_realtime(command) {
            let outcome = self.handle_realtime(kind, command);
            self.deliver(command, &outcome);
            return Ok(());
        }

        if let Some(intent) = nlu::match_local_intent(command)
            && let Some(outcome) = self.handle_intent(intent, command)?
        {
            self.deliver(command, &outcome);
            return Ok(());
        }

        if let Some(outcome) = self.executor.open_app(command) {
            self.deliver(command, &outcome);
            return Ok(());
        }

        // Nothing local matched: fall back to the model.
        self.speech.speak(phrases::FILLER);
        let response = self.gateway.ask(command).await;
        self.execute_ai_response(response, command).await;
        Ok(())
    }

    fn handle_realtime(&self, kind: RealtimeKind, command: &str) -> String {
        match kind {
            RealtimeKind::Time => time_phrase(),
            RealtimeKind::Weather => {
                let city = nlu::extract_weather_city(command)
                    .unwrap_or_else(|| self.config.runtime.city.clone());
                let key = format!("weather:{city}");
                self.cached_lookup(&key, kind, Intent::Weather, command)
            }
            RealtimeKind::Currency | RealtimeKind::News => {
                let key = format!("{}:{command}", kind.category());
                let intent = if kind == RealtimeKind::Currency {
                    Intent::Currency
                } else {
                    Intent::News
                };
                self.cached_lookup(&key, kind, intent, command)
            }
        }
    }

    fn cached_lookup(
        &self,
        key: &str,
        kind: RealtimeKind,
        intent: Intent,
        command: &str,
    ) -> String {
        if let Some(hit) = self.cache.get(key, kind.category()) {
            debug!("cache hit for {key}");
            return hit;
        }
        let outcome = self
            .executor
            .run_intent(intent, command)
            .unwrap_or_else(|| "Ma'lumot topilmadi".to_owned());
        self.cache.set(key, &outcome, kind.category());
        outcome
    }

    fn handle_reminder(&self, intent: Intent, command: &str) -> String {
        if intent == Intent::ReminderList {
            let pending = self.reminders.list_active();
            if pending.is_empty() {
                return "Hech qanday eslatma yo'q".to_owned();
            }
            let lines: Vec<String> = pending
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    format!(
                        "{}. {}: {}",
                        i + 1,
                        nlu::format_time_left(r.seconds_left),
                        r.message
                    )
                })
                .collect();
            return format!("Eslatmalar: {}", lines.join(". "));
        }

        match nlu::parse_duration(command) {
            Some(seconds) => {
                let message = nlu::parse_reminder_message(command);
                let speech = self.speech.clone();
                let notify: NotifyFn =
                    Arc::new(move |text: &str| speech.speak(format!("Eslatma: {text}")));
                self.reminders
                    .schedule(Duration::from_secs(seconds), &message, notify);
                format!(
                    "Eslatma o'rnatildi: {} dan keyin «{message}»",
                    nlu::format_time_left(seconds)
                )
            }
            None => "Qancha vaqtdan keyin eslatish kerak?".to_owned(),
        }
    }

    /// Keyword-intent handlers. `Ok(None)` means nothing here claimed the
    /// utterance and dispatch should keep going.
    fn handle_intent(&self, intent: Intent, command: &str) -> Result<Option<String>> {
        let outcome = match intent {
            Intent::Date => Some(date_phrase()),
            Intent::TaskAdd => {
                let text = strip_keywords(command, &["vazifa qo'sh", "vazifa", "qo'sh", "todo", "task"]);
                if text.is_empty() {
                    Some("Qanday vazifa qo'shishni aytmadingiz".to_owned())
                } else {
                    self.store.task_add(&text)?;
                    Some(format!(
                        "Vazifa qo'shildi: {}",
                        text.chars().take(50).collect::<String>()
                    ))
                }
            }
            Intent::TaskList => {
                let tasks = self.store.tasks()?;
                if tasks.is_empty() {
                    Some("Vazifalar ro'yxati bo'sh".to_owned())
                } else {
                    let lines: Vec<String> = tasks
                        .iter()
                        .map(|t| {
                            let mark = if t.done { "bajarilgan" } else { "ochiq" };
                            format!("{}. {} ({mark})", t.id, t.text)
                        })
                        .collect();
                    Some(format!("Vazifalar: {}", lines.join(". ")))
                }
            }
            Intent::TaskDone => {
                let number = command
                    .split_whitespace()
                    .find_map(|token| token.parse::<u64>().ok());
                match number {
                    Some(id) if self.store.task_done(id)? => {
                        Some(format!("{id}-vazifa bajarilgan deb belgilandi"))
                    }
                    Some(_) => Some("Bunday vazifa topilmadi".to_owned()),
                    None => Some("Qaysi vazifa? Raqamini ayting".to_owned()),
                }
            }
            Intent::JournalAdd => {
                let text = strip_keywords(command, &["kundalikka", "kundalik", "yoz", "qo'y", "journal"]);
                if text.is_empty() {
                    Some("Nima yozishni aytmadingiz".to_owned())
                } else {
                    self.store.journal_add(&text)?;
                    Some(format!(
                        "Kundalikka yozildi: {}",
                        text.chars().take(50).collect::<String>()
                    ))
                }
            }
            Intent::JournalRead => {
                let entries = self.store.journal_today()?;
                if entries.is_empty() {
                    Some("Bugun kundalikda hech narsa yo'q".to_owned())
                } else {
                    Some(format!("Bugungi kundalik: {}", entries.join(". ")))
                }
            }
            Intent::MemorySave => match parse_memory_phrase(command) {
                Some((key, value)) => {
                    self.store.memory_set(&key, &value)?;
                    Some(format!("Eslab qolindi: {key} = {value}"))
                }
                None => Some("Nima eslab qolishimni aytmadingiz".to_owned()),
            },
            Intent::MemoryRead => {
                let memory = self.store.memory_all()?;
                if memory.is_empty() {
                    Some("Xotiramda hech narsa yo'q".to_owned())
                } else {
                    let shown: Vec<String> = memory
                        .iter()
                        .take(5)
                        .map(|(k, v)| format!("{k}: {v}"))
                        .collect();
                    Some(format!("Xotiramda: {}", shown.join(", ")))
                }
            }
            Intent::History => {
                let recent = self.recent_history(5);
                if recent.is_empty() {
                    Some("Tarix bo'sh".to_owned())
                } else {
                    let lines: Vec<String> =
                        recent.iter().map(|e| e.command.clone()).collect();
                    Some(format!("Oxirgi buyruqlar: {}", lines.join(", ")))
                }
            }
            // Handled earlier in dispatch order.
            Intent::ReminderSet | Intent::ReminderList => None,
            // Everything else belongs to the OS shim.
            other => self.executor.run_intent(other, command),
        };
        Ok(outcome)
    }

    async fn execute_ai_response(&self, response: AiResponse, original: &str) {
        if let AiResponse::Command {
            action,
            params,
            confidence,
            speak,
        } = &response
        {
            if let Err(rejection) = safety::validate(&response, &self.policy) {
                warn!("AI action blocked: {rejection}");
                self.speech.speak(CANNOT_DO);
                self.record(original, &format!("bloklandi: {rejection}"));
                return;
            }

            if self.policy.needs_confirmation(*confidence) {
                self.speech.speak(format!("{speak} qilayinmi?"));
                if !self.await_affirmation().await {
                    self.speech.speak("Bekor qilindi");
                    self.record(original, "bekor qilindi");
                    return;
                }
            }

            let outcome = self.executor.run_action(action, params);
            debug!("AI action '{action}' outcome: {outcome}");
        }

        self.speech.speak(response.speak().to_owned());
        self.record(original, response.speak());
    }

    /// Listen for a short affirmative follow-up. Anything else — or
    /// silence — cancels.
    async fn await_affirmation(&self) -> bool {
        let transcriber = Arc::clone(&self.transcriber);
        let state = Arc::clone(&self.state);
        let speech = self.speech.clone();
        let config = crate::config::ListenConfig {
            timeout_secs: self.config.listen.confirm_timeout_secs,
            ..self.config.listen.clone()
        };

        let reply = tokio::task::spawn_blocking(move || {
            listening::listen_for_command(&*transcriber, &state, &speech, &config)
        })
        .await
        .unwrap_or(None);

        reply.is_some_and(|text| {
            text.split_whitespace()
                .any(|word| matches!(word, "ha" | "xa" | "mayli" | "albatta"))
        })
    }
}

fn strip_keywords(command: &str, keywords: &[&str]) -> String {
    let mut text = command.to_owned();
    for keyword in keywords {
        text = text.replace(keyword, " ");
    }
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| matches!(c, ' ' | ',' | '.' | '-'))
        .to_owned()
}

fn parse_memory_phrase(command: &str) -> Option<(String, String)> {
    let words: Vec<&str> = command.split_whitespace().collect();
    let trigger = words
        .iter()
        .position(|w| matches!(*w, "eslab" | "yodlab" | "xotirla"))?;
    let mut before: Vec<&str> = words[..trigger]
        .iter()
        .map(|w| w.trim_matches(','))
        .filter(|w| !w.is_empty())
        .collect();
    if before.first() == Some(&"mening") {
        before.remove(0);
    }
    let key = (*before.first()?).to_owned();
    let value = if before.len() > 1 {
        before[1..].join(" ")
    } else {
        key.clone()
    };
    Some((key, value))
}

fn time_phrase() -> String {
    let now = Local::now();
    let hour = now.hour();
    let period = if (5..12).contains(&hour) {
        "Tong"
    } else if hour < 17 {
        "Kunduz"
    } else if hour < 21 {
        "Kechqurun"
    } else {
        "Tun"
    };
    format!("Hozir soat {}:{:02}. {period}.", hour, now.minute())
}

fn date_phrase() -> String {
    let now = Local::now();
    let month = MONTHS_UZ
        .get(now.month() as usize)
        .copied()
        .unwrap_or_default();
    let weekday = DAYS_UZ
        .get(now.weekday().num_days_from_monday() as usize)
        .copied()
        .unwrap_or_default();
    format!("Bugun {}-{month}, {weekday}", now.day())
}
