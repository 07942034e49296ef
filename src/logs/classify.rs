//! Best-effort cleanup and severity tagging of individual log lines.
//!
//! Nothing here can fail. Lines the heuristics cannot make sense of end up
//! with [`Severity::Default`] and, if nothing readable survives cleanup, the
//! [`PLACEHOLDER`] message.

use std::sync::LazyLock;

use regex::{Captures, Regex};

pub const PLACEHOLDER: &str = "[Log entry]";

const SHORT_MESSAGE: usize = 5;
const INFO_LENGTH_THRESHOLD: usize = 10;

/// CSI and OSC sequences, bare two-byte escapes, and SGR tails whose ESC byte
/// was already lost (`[0m`, `]0m`, `[1;31m`).
static ESCAPES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)?|\x1b[@-Z\\-_]|[\[\]][0-9]{1,3}(?:;[0-9]{1,3})*m",
    )
    .expect("valid regex")
});

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[0-9]{4}-[0-9]{2}-[0-9]{2}T([0-9]{2}:[0-9]{2}:[0-9]{2})(?:[.,]([0-9]+))?(?:Z|[+-][0-9]{2}:?[0-9]{2})?",
    )
    .expect("valid regex")
});

const ERROR_KEYWORDS: &[&str] = &["ERROR", "FATAL", "PANIC", "FAILED", "EXCEPTION"];
const ERROR_WORDS: &[&str] = &["ERR"];
const WARN_KEYWORDS: &[&str] = &["WARN", "DEPRECATED"];
const DEBUG_KEYWORDS: &[&str] = &["DEBUG", "TRACE", "VERBOSE"];
const DEBUG_WORDS: &[&str] = &["DBG"];
const INFO_KEYWORDS: &[&str] = &[
    "INFO",
    "ACCEPTED",
    "STARTED",
    "CONNECTED",
    "LISTENING",
    "REQUEST",
    "RESPONSE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warn,
    Debug,
    Info,
    Default,
}

impl Severity {
    /// Keyword scan in priority order; the first tier that matches wins.
    /// Short keywords (`ERR`, `DBG`) only count as whole words.
    pub fn detect(message: &str) -> Self {
        let upper = message.to_uppercase();
        let words: Vec<&str> = upper
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let hit = |keywords: &[&str], whole_words: &[&str]| {
            keywords.iter().any(|k| upper.contains(k))
                || words.iter().any(|w| whole_words.contains(w))
        };

        if hit(ERROR_KEYWORDS, ERROR_WORDS) {
            Severity::Error
        } else if hit(WARN_KEYWORDS, &[]) {
            Severity::Warn
        } else if hit(DEBUG_KEYWORDS, DEBUG_WORDS) {
            Severity::Debug
        } else if hit(INFO_KEYWORDS, &[]) {
            Severity::Info
        } else if message.trim().chars().count() > INFO_LENGTH_THRESHOLD {
            Severity::Info
        } else {
            Severity::Default
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warn => "WARN",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Default => "DEFAULT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine {
    /// The line as decoded, before any cleanup.
    pub raw: String,
    /// `HH:MM:SS` or `HH:MM:SS.mmm` taken from the first embedded timestamp.
    pub timestamp: Option<String>,
    pub message: String,
    pub severity: Severity,
}

pub fn classify(raw: &str) -> ClassifiedLine {
    let text = strip_artifacts(raw);

    let (timestamp, body) = match TIMESTAMP.captures(&text) {
        Some(caps) => {
            let end = caps.get(0).map_or(0, |m| m.end());
            (Some(display_time(&caps)), &text[end..])
        }
        None => (None, text.as_str()),
    };
    let remainder = TIMESTAMP.replace_all(body, " ");

    let mut message = clean_message(&remainder);
    if visible_chars(&message) < SHORT_MESSAGE
        && let Some(tail) = after_last_tag(&remainder)
    {
        let retry = clean_message(tail);
        if visible_chars(&retry) > visible_chars(&message) {
            message = retry;
        }
    }

    let severity = if message.is_empty() {
        message = PLACEHOLDER.to_string();
        Severity::Default
    } else {
        Severity::detect(&message)
    };

    ClassifiedLine {
        raw: raw.to_string(),
        timestamp,
        message,
        severity,
    }
}

fn strip_artifacts(raw: &str) -> String {
    ESCAPES
        .replace_all(raw, "")
        .chars()
        .map(|c| if c == '\t' || is_box_drawing(c) { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect()
}

fn is_box_drawing(c: char) -> bool {
    ('\u{2500}'..='\u{257f}').contains(&c)
}

fn display_time(caps: &Captures<'_>) -> String {
    let clock = caps.get(1).map_or("", |m| m.as_str());
    match caps.get(2) {
        Some(fraction) => {
            let millis: String = fraction.as_str().chars().take(3).collect();
            format!("{clock}.{millis}")
        }
        None => clock.to_string(),
    }
}

fn clean_message(text: &str) -> String {
    text.split_whitespace()
        .filter(|token| !is_noise(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tokens that are rendering debris rather than content: module paths such as
/// `ws::io`, short bracket or SGR remnants, and epoch-style digit runs.
fn is_noise(token: &str) -> bool {
    if token.contains("::") && token.len() < 30 {
        return true;
    }
    if token.len() <= 4
        && (token.contains(['[', ']', '{', '}', '(', ')']) || is_sgr_tail(token))
    {
        return true;
    }
    token.len() > 10 && token.bytes().all(|b| b.is_ascii_digit())
}

fn is_sgr_tail(token: &str) -> bool {
    token.strip_suffix('m').is_some_and(|body| {
        !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit() || b == b';')
    })
}

fn after_last_tag(text: &str) -> Option<&str> {
    let close = text.rfind(']')?;
    text[..close].rfind('[')?;
    Some(&text[close + 1..])
}

fn visible_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}
