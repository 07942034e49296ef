use std::path::{Path, PathBuf};

use crossterm::event::KeyCode;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub runtime: RuntimeConfig,
    pub logs: LogsConfig,
    pub colors: ColorsConfig,
    pub logging: LoggingConfig,
    pub keybinds: KeybindsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub refresh_rate_ms: u64,
    pub running_only: bool,
    pub show_detail_panel: bool,
    pub sparkline_length: usize,
    /// Delay between a successful lifecycle action and the refresh that
    /// picks up its effect.
    pub action_settle_ms: u64,
    pub max_concurrent_fetches: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            refresh_rate_ms: 2000,
            running_only: false,
            show_detail_panel: true,
            sparkline_length: 60,
            action_settle_ms: 500,
            max_concurrent_fetches: 8,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// `unix://`, `tcp://` or `http://` address. Empty means the local
    /// defaults, including `DOCKER_HOST`.
    pub docker_host: String,
    pub stop_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            docker_host: String::new(),
            stop_timeout_secs: 30,
            connect_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub tail_lines: usize,
    pub buffer_capacity: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        LogsConfig {
            tail_lines: 100,
            buffer_capacity: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    pub theme: String,
    pub color_support: String,
    pub border_style: String,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        ColorsConfig {
            theme: "dark".to_string(),
            color_support: "auto".to_string(),
            border_style: "rounded".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Log file path. Empty means `<cache dir>/harbortop/harbortop.log`.
    pub file: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: String::new(),
            json: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct KeybindsConfig {
    pub quit: String,
    pub help: String,
    pub refresh: String,
    pub toggle_detail: String,
    pub cycle_theme: String,
    pub start: String,
    pub stop: String,
    pub restart: String,
    pub pause: String,
    pub unpause: String,
    pub remove: String,
}

impl Default for KeybindsConfig {
    fn default() -> Self {
        KeybindsConfig {
            quit: "q".to_string(),
            help: "?".to_string(),
            refresh: "r".to_string(),
            toggle_detail: "i".to_string(),
            cycle_theme: "c".to_string(),
            start: "s".to_string(),
            stop: "t".to_string(),
            restart: "R".to_string(),
            pause: "p".to_string(),
            unpause: "u".to_string(),
            remove: "d".to_string(),
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("harbortop").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}

/// Parses a keybind string: a single character, or one of the named keys
/// (`enter`, `esc`, `tab`, `space`, `backspace`, `delete`, `f1`..`f12`).
pub fn parse_key(s: &str) -> Option<KeyCode> {
    let mut chars = s.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(KeyCode::Char(c));
    }
    let lower = s.to_ascii_lowercase();
    match lower.as_str() {
        "enter" | "return" => Some(KeyCode::Enter),
        "esc" | "escape" => Some(KeyCode::Esc),
        "tab" => Some(KeyCode::Tab),
        "space" => Some(KeyCode::Char(' ')),
        "backspace" => Some(KeyCode::Backspace),
        "delete" | "del" => Some(KeyCode::Delete),
        _ => lower
            .strip_prefix('f')
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|n| (1..=12).contains(n))
            .map(KeyCode::F),
    }
}
