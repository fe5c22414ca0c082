//! Utterance understanding: normalization, wake/stop vocabularies, the
//! keyword intent table, and reminder time parsing.
//!
//! All matching operates on normalized text: lowercase, Latin script,
//! single spaces, ASCII apostrophes. Parsing is plain token scanning.

use chrono::{Local, TimeZone};

/// Exact stop phrases. Matching any of these (or a stop pair) sends the
/// assistant back to the background state.
const STOP_EXACT: &[&str] = &[
    "xayr",
    "dasturni yop",
    "jarvis yopil",
    "yopil",
    "quit",
    "exit",
    "stop jarvis",
    "ketdim",
    "off",
];

/// Stop word pairs: both words present anywhere in the utterance.
const STOP_PAIRS: &[(&str, &str)] = &[("xayr", "jarvis"), ("jarvis", "yopil"), ("dasturni", "yop")];

/// Phrases that interrupt the current narration without leaving the
/// conversation.
const PAUSE_WORDS: &[&str] = &["toxta", "to'xta", "jim bo'l", "yetarli", "bas"];

/// Words that indicate a duration is present in the utterance.
const DURATION_WORDS: &[&str] = &["daqiqa", "soat", "sekund", "minut", "soniya"];

/// A locally recognized user goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Date,
    Screenshot,
    Stats,
    Internet,
    Shutdown,
    Restart,
    Sleep,
    Lock,
    Volume,
    MediaNext,
    MediaPrev,
    MediaPause,
    MediaPlay,
    WinMinimizeAll,
    WinMinimize,
    WinMaximize,
    WinClose,
    FolderOpen,
    FileRecent,
    ReminderList,
    ReminderSet,
    TaskAdd,
    TaskList,
    TaskDone,
    JournalAdd,
    JournalRead,
    MemorySave,
    MemoryRead,
    Translate,
    Youtube,
    Clipboard,
    Processes,
    History,
    /// Reached via [`needs_realtime`], not the keyword table.
    Weather,
    Currency,
    News,
}

/// Ordered keyword table. First match wins, so more specific phrases sit
/// above the generic ones they contain.
const INTENTS: &[(Intent, &[&str])] = &[
    (Intent::Date, &["sana", "kun necha", "bugun necha", "qaysi kun"]),
    (Intent::Screenshot, &["screenshot", "ekran surat", "skrinshot"]),
    (
        Intent::Stats,
        &["cpu", "ram", "batareya", "xotira holati", "disk", "tizim holati"],
    ),
    (Intent::Internet, &["internet", "ping", "tarmoq tezligi"]),
    (Intent::Shutdown, &["kompyuterni o'chir", "shutdown", "hozir o'chir"]),
    (Intent::Restart, &["qayta yoq", "restart", "reboot"]),
    (Intent::Sleep, &["uxlat", "sleep"]),
    (Intent::Lock, &["ekranni qulf", "qulfla", "lock"]),
    (Intent::Volume, &["ovoz"]),
    (Intent::MediaNext, &["keyingi qo'shiq", "keyingisi"]),
    (Intent::MediaPrev, &["oldingi qo'shiq", "oldingisi"]),
    (Intent::MediaPause, &["musiqani pauza", "to'xtat musiqa"]),
    (Intent::MediaPlay, &["musiqani davom", "davom et musiqa"]),
    (
        Intent::WinMinimizeAll,
        &["barcha oynalarni", "hammasini minimal"],
    ),
    (Intent::WinMinimize, &["minimlashtir", "kichrayt"]),
    (
        Intent::WinMaximize,
        &["to'liq ekran", "kattalashtir", "maximize"],
    ),
    (Intent::WinClose, &["oynani yop", "oynani o'chir"]),
    (
        Intent::FolderOpen,
        &["papkani och", "papka och", "ochib ko'rsat"],
    ),
    (
        Intent::FileRecent,
        &["oxirgi fayl", "so'nggi fayl", "yuklanganlar"],
    ),
    (
        Intent::ReminderList,
        &["eslatmalarni ko'rsat", "eslatmalar ro'yxat", "qanday eslatmalar"],
    ),
    (
        Intent::ReminderSet,
        &[
            "eslatib qo'y",
            "eslatma",
            "reminder",
            "daqiqadan keyin",
            "taymer",
            "taymer qo'y",
            "daqiqaga",
            "soatga",
            "sekundga",
        ],
    ),
    (Intent::TaskAdd, &["vazifa qo'sh", "todo qo'sh"]),
    (
        Intent::TaskList,
        &["vazifalarni ko'rsat", "vazifalar ro'yxat", "todo ro'yxat"],
    ),
    (Intent::TaskDone, &["bajarildi", "vazifani tugatdim"]),
    (Intent::JournalAdd, &["kundalikka yoz", "kundalikka"]),
    (
        Intent::JournalRead,
        &["kundalikni ko'rsat", "bugungi kundalik", "kundalikni o'qi"],
    ),
    (Intent::MemorySave, &["eslab qol", "xotirla", "yodlab qol"]),
    (
        Intent::MemoryRead,
        &["nimani eslab qolding", "xotirangni ko'rsat"],
    ),
    (Intent::Translate, &["tarjima", "translate"]),
    (Intent::Youtube, &["youtube", "yutub", "utub", "qo'shiq qo'y"]),
    (Intent::Clipboard, &["clipboard", "nusxalangan"]),
    (
        Intent::Processes,
        &["jarayonlar", "qaysi dasturlar", "processlar"],
    ),
    (Intent::History, &["tarixi", "history", "avvalgi buyruqlar"]),
];

/// Lookup categories that need fresh external data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeKind {
    Weather,
    Currency,
    News,
    Time,
}

impl RealtimeKind {
    /// Cache category name for this lookup kind.
    #[must_use]
    pub fn category(self) -> &'static str {
        match self {
            Self::Weather => "weather",
            Self::Currency => "currency",
            Self::News => "news",
            Self::Time => "time",
        }
    }
}

/// Normalize a transcription: fold Unicode apostrophes, transliterate
/// Cyrillic to Latin, lowercase, collapse whitespace, and repair common
/// recognizer mishears.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text
        .replace(['\u{2019}', '\u{2018}', '\u{02bc}'], "'")
        .to_lowercase()
        .chars()
    {
        match transliterate(ch) {
            Some(mapped) => out.push_str(mapped),
            None => out.push(ch),
        }
    }
    let mut text = out.split_whitespace().collect::<Vec<_>>().join(" ");

    // Recognizers hear "taymer" as "tayyor"; only repair when a duration
    // word confirms the timer reading.
    let has_duration = DURATION_WORDS.iter().any(|w| text.contains(w));
    if has_duration {
        for wrong in ["tayyor qo'y", "tayyor qoy", "tayyor koy", "tayyor ko'y"] {
            if text.contains(wrong) {
                text = text.replace(wrong, "taymer qo'y");
            }
        }
        if text.contains("tayyor") {
            text = text.replace("tayyor", "taymer");
        }
    }
    text
}

fn transliterate(ch: char) -> Option<&'static str> {
    let mapped = match ch {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' => "e",
        'ё' => "yo",
        'ж' => "j",
        'з' => "z",
        'и' => "i",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "x",
        'ц' => "ts",
        'ч' => "ch",
        'ш' | 'щ' => "sh",
        'ъ' | 'ь' => "'",
        'ы' => "i",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        'қ' => "q",
        'ғ' => "g",
        'ҳ' => "h",
        'ў' => "o'",
        _ => return None,
    };
    Some(mapped)
}

/// Whether the normalized text contains one of the configured wake tokens.
#[must_use]
pub fn is_wake_word(text: &str, wake_words: &[String]) -> bool {
    text.split_whitespace()
        .any(|word| wake_words.iter().any(|wake| wake == word))
}

/// Whether the utterance is an explicit stop command.
///
/// Exact phrases and word pairs only, so "ilovani yop" stays an app
/// command instead of killing the session.
#[must_use]
pub fn is_stop_command(text: &str) -> bool {
    let trimmed = text.trim();
    if STOP_EXACT.contains(&trimmed) {
        return true;
    }
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    STOP_PAIRS
        .iter()
        .any(|(a, b)| words.contains(a) && words.contains(b))
}

/// Whether the utterance asks to interrupt the current narration.
#[must_use]
pub fn is_pause_command(text: &str) -> bool {
    PAUSE_WORDS.iter().any(|w| text.contains(w))
}

/// First matching intent from the ordered keyword table.
#[must_use]
pub fn match_local_intent(text: &str) -> Option<Intent> {
    for (intent, keywords) in INTENTS {
        if keywords.iter().any(|kw| text.contains(kw)) {
            return Some(*intent);
        }
    }
    None
}

/// Classify utterances that need fresh external data.
#[must_use]
pub fn needs_realtime(text: &str) -> Option<RealtimeKind> {
    if ["ob-havo", "havo", "harorat", "yomg'ir", "qor"]
        .iter()
        .any(|w| text.contains(w))
    {
        return Some(RealtimeKind::Weather);
    }
    if [
        "dollar", "euro", "evro", "rubl", "so'm", "kurs", "valyuta", "tenge", "lira", "yuan",
    ]
    .iter()
    .any(|w| text.contains(w))
    {
        return Some(RealtimeKind::Currency);
    }
    if ["yangilik", "xabar", "news"].iter().any(|w| text.contains(w)) {
        return Some(RealtimeKind::News);
    }
    if ["soat", "vaqt", "nechchi"].iter().any(|w| text.contains(w)) {
        return Some(RealtimeKind::Time);
    }
    None
}

/// Extract the city from "...da ob-havo" style weather requests.
#[must_use]
pub fn extract_weather_city(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    for pair in words.windows(2) {
        let (word, next) = (pair[0], pair[1]);
        if (next == "ob-havo" || next == "havo")
            && let Some(city) = word.strip_suffix("da")
            && city.len() > 1
        {
            return Some(capitalize(city));
        }
    }
    None
}

/// Capitalize the first character.
#[must_use]
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

const RELATIVE_UNITS: &[(&str, u64)] = &[
    ("soat", 3600),
    ("daqiqa", 60),
    ("soniya", 1),
    ("sekund", 1),
    ("minut", 60),
    ("hour", 3600),
    ("minute", 60),
    ("second", 1),
];

/// Extract a reminder delay in seconds from the utterance.
///
/// Understands relative phrases ("30 daqiqadan keyin") and absolute clock
/// times ("soat 9 da", rolling to tomorrow when the time has passed).
#[must_use]
pub fn parse_duration(text: &str) -> Option<u64> {
    let tokens: Vec<&str> = text.split_whitespace().collect();

    // Absolute clock time first, as in "ertaga soat 9 da".
    for (i, token) in tokens.iter().enumerate() {
        if *token != "soat" {
            continue;
        }
        let Some(next) = tokens.get(i + 1) else {
            continue;
        };
        let (clock_part, inline_da) = match next.strip_suffix("da") {
            Some(stripped) if !stripped.is_empty() => (stripped, true),
            _ => (*next, false),
        };
        if let Some((hour, minute)) = parse_clock(clock_part) {
            let trailing_da = inline_da || tokens.get(i + 2).is_some_and(|t| *t == "da");
            if trailing_da {
                return Some(seconds_until(hour, minute));
            }
        }
    }

    // Relative durations, most significant unit first.
    for (unit, multiplier) in RELATIVE_UNITS {
        for (i, token) in tokens.iter().enumerate() {
            if let Ok(amount) = token.parse::<u64>()
                && tokens.get(i + 1).is_some_and(|t| t.starts_with(unit))
            {
                return Some(amount * multiplier);
            }
        }
    }

    None
}

fn parse_clock(text: &str) -> Option<(u32, u32)> {
    let (hour_part, minute_part) = match text.split_once(':') {
        Some((h, m)) => (h, Some(m)),
        None => (text, None),
    };
    let hour: u32 = hour_part.parse().ok()?;
    let minute: u32 = match minute_part {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    (hour <= 23 && minute <= 59).then_some((hour, minute))
}

fn seconds_until(hour: u32, minute: u32) -> u64 {
    let now = Local::now();
    let today = now.date_naive();
    // Hour and minute are pre-validated by `parse_clock`.
    let Some(target_time) = today.and_hms_opt(hour, minute, 0) else {
        return 0;
    };
    let mut target = Local
        .from_local_datetime(&target_time)
        .earliest()
        .unwrap_or(now);
    if target <= now {
        target += chrono::Duration::days(1);
    }
    (target - now).num_seconds().max(0) as u64
}

/// Extract the reminder message from the utterance.
///
/// Useful text usually sits before the trigger ("soat 15 da yig'ilish
/// bor, eslatib qo'y"); after it otherwise. Time phrases and trigger
/// keywords are stripped from the result.
#[must_use]
pub fn parse_reminder_message(text: &str) -> String {
    let trimmed = text.trim();
    const TRIGGERS: &[&str] = &[
        "eslatib qo'y",
        "eslatib qoy",
        "eslatma qo'y",
        "eslatma qoy",
        "reminder",
    ];

    for trigger in TRIGGERS {
        if let Some(idx) = trimmed.find(trigger) {
            let before = trim_punct(&trimmed[..idx]);
            let after = trim_punct(&trimmed[idx + trigger.len()..]);
            let candidate = if before.is_empty() { after } else { before };
            if !candidate.is_empty() {
                let cleaned = trim_punct(&strip_time_phrases(&candidate, false));
                return if cleaned.is_empty() {
                    "Eslatma!".to_owned()
                } else {
                    cleaned
                };
            }
        }
    }

    let cleaned = trim_punct(&strip_time_phrases(trimmed, true));
    if cleaned.is_empty() {
        "Eslatma!".to_owned()
    } else {
        cleaned
    }
}

fn trim_punct(text: &str) -> String {
    text.trim_matches(|c: char| matches!(c, ' ' | ',' | '.' | '-'))
        .to_owned()
}

/// Remove duration phrases (and, optionally, reminder keywords) from the
/// token stream.
fn strip_time_phrases(text: &str, drop_keywords: bool) -> String {
    const KEYWORDS: &[&str] = &["eslatib", "eslatma", "reminder", "keyin", "qo'y", "qoy"];

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut kept: Vec<&str> = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];

        // "<n> <unit>[dan] [keyin]"
        if token.parse::<u64>().is_ok()
            && tokens
                .get(i + 1)
                .is_some_and(|t| RELATIVE_UNITS.iter().any(|(unit, _)| t.starts_with(unit)))
        {
            i += 2;
            if tokens.get(i).is_some_and(|t| *t == "keyin") {
                i += 1;
            }
            continue;
        }

        // "soat <h[:mm]>[da] [da]"
        if token == "soat"
            && let Some(&next) = tokens.get(i + 1)
        {
            let clock_part = next.strip_suffix("da").filter(|p| !p.is_empty()).unwrap_or(next);
            if parse_clock(clock_part).is_some() {
                i += 2;
                if tokens.get(i).is_some_and(|t| *t == "da") {
                    i += 1;
                }
                continue;
            }
        }

        if token == "keyin" || (drop_keywords && KEYWORDS.contains(&token)) {
            i += 1;
            continue;
        }

        kept.push(token);
        i += 1;
    }
    kept.join(" ")
}

/// Render a remaining duration in spoken form.
#[must_use]
pub fn format_time_left(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds} soniya");
    }
    if seconds < 3600 {
        let minutes = seconds / 60;
        let rest = seconds % 60;
        return if rest == 0 {
            format!("{minutes} daqiqa")
        } else {
            format!("{minutes} daqiqa {rest} soniya")
        };
    }
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if minutes == 0 {
        format!("{hours} soat")
    } else {
        format!("{hours} soat {minutes} daqiqa")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn wake_words() -> Vec<String> {
        crate::config::WakeConfig::default().wake_words
    }

    #[test]
    fn normalize_transliterates_cyrillic() {
        assert_eq!(normalize("Джарвис"), "djarvis");
        assert_eq!(normalize("Жарвис"), "jarvis");
        assert_eq!(normalize("ПРИВЕТ"), "privet");
    }

    #[test]
    fn normalize_folds_apostrophes_and_whitespace() {
        assert_eq!(normalize("to\u{2019}xta   endi"), "to'xta endi");
    }

    #[test]
    fn normalize_repairs_timer_mishear() {
        assert_eq!(normalize("5 daqiqa tayyor qo'y"), "5 daqiqa taymer qo'y");
        // Without a duration word the text stays untouched.
        assert_eq!(normalize("ovqat tayyor"), "ovqat tayyor");
    }

    #[test]
    fn wake_word_matches_after_normalization() {
        let words = wake_words();
        assert!(is_wake_word(&normalize("Jarvis salom"), &words));
        assert!(is_wake_word(&normalize("джарвис"), &words));
        assert!(!is_wake_word(&normalize("salom dunyo"), &words));
    }

    #[test]
    fn stop_command_exact_and_pairs() {
        assert!(is_stop_command("xayr"));
        assert!(is_stop_command("jarvis endi yopil"));
        assert!(is_stop_command("dasturni yop"));
        // An app-close command is not a stop command.
        assert!(!is_stop_command("ilovani yop"));
        assert!(!is_stop_command("chrome oynani yop"));
    }

    #[test]
    fn pause_command_vocabulary() {
        assert!(is_pause_command("to'xta"));
        assert!(is_pause_command("jim bo'l endi"));
        assert!(!is_pause_command("davom et"));
    }

    #[test]
    fn volume_intent_wins_over_power_words_in_dispatch_order() {
        // The table itself maps the plain power phrase...
        assert_eq!(match_local_intent("kompyuterni o'chir"), Some(Intent::Shutdown));
        // ...while anything with "ovoz" is a volume request.
        assert_eq!(match_local_intent("ovoz 50"), Some(Intent::Volume));
        assert_eq!(match_local_intent("ovozni o'chir"), Some(Intent::Volume));
    }

    #[test]
    fn realtime_classification() {
        assert_eq!(needs_realtime("bugun ob-havo qanday"), Some(RealtimeKind::Weather));
        assert_eq!(needs_realtime("dollar kursi"), Some(RealtimeKind::Currency));
        assert_eq!(needs_realtime("soat nechchi"), Some(RealtimeKind::Time));
        assert_eq!(needs_realtime("oxirgi yangilik"), Some(RealtimeKind::News));
        assert_eq!(needs_realtime("chrome och"), None);
    }

    #[test]
    fn weather_city_extraction() {
        assert_eq!(
            extract_weather_city("samarqandda ob-havo qanday"),
            Some("Samarqand".to_owned())
        );
        assert_eq!(extract_weather_city("ob-havo qanday"), None);
    }

    #[test]
    fn relative_durations() {
        assert_eq!(parse_duration("30 daqiqadan keyin choy ich"), Some(1800));
        assert_eq!(parse_duration("2 soatdan keyin"), Some(7200));
        assert_eq!(parse_duration("45 sekunddan keyin"), Some(45));
        assert_eq!(parse_duration("5 minutga taymer qo'y"), Some(300));
        assert_eq!(parse_duration("eslatib qo'y"), None);
    }

    #[test]
    fn absolute_clock_duration_rolls_forward() {
        let secs = parse_duration("soat 9 da yig'ilish").unwrap();
        assert!(secs > 0);
        assert!(secs <= 24 * 3600);

        let secs = parse_duration("soat 18:30 da uyga ket").unwrap();
        assert!(secs > 0);
        assert!(secs <= 24 * 3600);
    }

    #[test]
    fn reminder_message_prefers_text_before_trigger() {
        assert_eq!(
            parse_reminder_message("soat 15 da yig'ilish bor, eslatib qo'y"),
            "yig'ilish bor"
        );
        assert_eq!(
            parse_reminder_message("30 daqiqadan keyin choy ich"),
            "choy ich"
        );
        assert_eq!(parse_reminder_message("eslatib qo'y"), "Eslatma!");
    }

    #[test]
    fn time_left_formatting() {
        assert_eq!(format_time_left(45), "45 soniya");
        assert_eq!(format_time_left(120), "2 daqiqa");
        assert_eq!(format_time_left(150), "2 daqiqa 30 soniya");
        assert_eq!(format_time_left(7200), "2 soat");
        assert_eq!(format_time_left(7500), "2 soat 5 daqiqa");
    }
}
