use ratatui::style::Color;
use ratatui::widgets::BorderType;

use crate::logs::classify::Severity;
use crate::runtime::workload::WorkloadStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSupport {
    Auto,
    Truecolor,
    Color256,
    Mono,
}

impl ColorSupport {
    pub fn from_config_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "truecolor" | "24bit" => ColorSupport::Truecolor,
            "256" | "256color" => ColorSupport::Color256,
            "mono" | "monochrome" => ColorSupport::Mono,
            _ => ColorSupport::Auto,
        }
    }
}

pub fn detect_color_support() -> ColorSupport {
    let colorterm = std::env::var("COLORTERM")
        .unwrap_or_default()
        .to_lowercase();
    if colorterm.contains("truecolor") || colorterm.contains("24bit") {
        return ColorSupport::Truecolor;
    }
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorSupport::Mono;
    }
    ColorSupport::Color256
}

pub fn resolve_color_support(config: &str) -> ColorSupport {
    let parsed = ColorSupport::from_config_str(config);
    if parsed == ColorSupport::Auto {
        detect_color_support()
    } else {
        parsed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorderStyle {
    Rounded,
    Thin,
}

impl BorderStyle {
    pub fn from_config_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "rounded" => BorderStyle::Rounded,
            _ => BorderStyle::Thin,
        }
    }

    pub fn border_type(self) -> BorderType {
        match self {
            BorderStyle::Rounded => BorderType::Rounded,
            BorderStyle::Thin => BorderType::Plain,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Theme {
    pub name: &'static str,
    pub header_accent_bg: Color,
    pub header_accent_fg: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    pub status_ok: Color,
    pub status_err: Color,
    pub status_warn: Color,
    pub statusbar_bg: Color,
    pub border: Color,
    pub text_primary: Color,
    pub text_secondary: Color,
    pub accent: Color,
    pub pill_key_bg: Color,
    pub pill_key_fg: Color,
    pub pill_desc_fg: Color,
    pub gauge_unfilled: Color,
    pub sparkline_cpu: Color,
    pub sparkline_memory: Color,
    /// Low, elevated and critical usage.
    pub usage_colors: [Color; 3],
    /// Indexed by [`Severity`] order: error, warn, debug, info, default.
    pub severity_colors: [Color; 5],
}

impl Theme {
    pub fn from_config(theme_name: &str, support: ColorSupport) -> Self {
        if support == ColorSupport::Mono {
            return Self::mono();
        }
        let mut theme = match theme_name.to_lowercase().as_str() {
            "light" => Self::light(),
            "colorblind" => Self::colorblind(),
            "vivid" => Self::vivid(),
            _ => Self::dark(),
        };
        theme.apply_color_support(support);
        theme
    }

    pub fn next(&self, support: ColorSupport) -> Self {
        if support == ColorSupport::Mono {
            return Self::mono();
        }
        let next_name = match self.name {
            "dark" => "vivid",
            "vivid" => "light",
            "light" => "colorblind",
            _ => "dark",
        };
        Theme::from_config(next_name, support)
    }

    fn apply_color_support(&mut self, support: ColorSupport) {
        let map = |c: Color| adapt_color(c, support);

        self.header_accent_bg = map(self.header_accent_bg);
        self.header_accent_fg = map(self.header_accent_fg);
        self.selection_bg = map(self.selection_bg);
        self.selection_fg = map(self.selection_fg);
        self.status_ok = map(self.status_ok);
        self.status_err = map(self.status_err);
        self.status_warn = map(self.status_warn);
        self.statusbar_bg = map(self.statusbar_bg);
        self.border = map(self.border);
        self.text_primary = map(self.text_primary);
        self.text_secondary = map(self.text_secondary);
        self.accent = map(self.accent);
        self.pill_key_bg = map(self.pill_key_bg);
        self.pill_key_fg = map(self.pill_key_fg);
        self.pill_desc_fg = map(self.pill_desc_fg);
        self.gauge_unfilled = map(self.gauge_unfilled);
        self.sparkline_cpu = map(self.sparkline_cpu);
        self.sparkline_memory = map(self.sparkline_memory);

        self.usage_colors = self.usage_colors.map(map);
        self.severity_colors = self.severity_colors.map(map);
    }

    pub fn status_color(&self, status: WorkloadStatus) -> Color {
        match status {
            WorkloadStatus::Running => self.status_ok,
            WorkloadStatus::Paused | WorkloadStatus::Restarting | WorkloadStatus::Created => {
                self.status_warn
            }
            WorkloadStatus::Dead | WorkloadStatus::Removing => self.status_err,
            WorkloadStatus::Exited | WorkloadStatus::Unknown => self.text_secondary,
        }
    }

    pub fn severity_color(&self, severity: Severity) -> Color {
        let idx = match severity {
            Severity::Error => 0,
            Severity::Warn => 1,
            Severity::Debug => 2,
            Severity::Info => 3,
            Severity::Default => 4,
        };
        self.severity_colors[idx]
    }

    /// Gauge color for a usage percentage: below 60, below 85, and above.
    pub fn usage_color(&self, percent: f64) -> Color {
        if percent >= 85.0 {
            self.usage_colors[2]
        } else if percent >= 60.0 {
            self.usage_colors[1]
        } else {
            self.usage_colors[0]
        }
    }

    pub fn dark() -> Self {
        Theme {
            name: "dark",
            header_accent_bg: Color::Cyan,
            header_accent_fg: Color::Black,
            selection_bg: Color::Rgb(49, 50, 68),
            selection_fg: Color::White,
            status_ok: Color::Green,
            status_err: Color::Red,
            status_warn: Color::Yellow,
            statusbar_bg: Color::DarkGray,
            border: Color::DarkGray,
            text_primary: Color::White,
            text_secondary: Color::Gray,
            accent: Color::Cyan,
            pill_key_bg: Color::Yellow,
            pill_key_fg: Color::Black,
            pill_desc_fg: Color::White,
            gauge_unfilled: Color::DarkGray,
            sparkline_cpu: Color::Rgb(103, 232, 249),
            sparkline_memory: Color::Rgb(251, 146, 60),
            usage_colors: [
                Color::Rgb(16, 185, 129),
                Color::Rgb(249, 115, 22),
                Color::Rgb(239, 68, 68),
            ],
            severity_colors: [
                Color::Rgb(248, 113, 113),
                Color::Rgb(251, 191, 36),
                Color::Rgb(148, 163, 184),
                Color::Rgb(96, 165, 250),
                Color::Rgb(226, 232, 240),
            ],
        }
    }

    pub fn light() -> Self {
        Theme {
            name: "light",
            header_accent_bg: Color::Blue,
            header_accent_fg: Color::White,
            selection_bg: Color::Rgb(200, 215, 235),
            selection_fg: Color::Black,
            status_ok: Color::Rgb(0, 120, 0),
            status_err: Color::Red,
            status_warn: Color::Rgb(200, 100, 0),
            statusbar_bg: Color::Rgb(220, 220, 220),
            border: Color::Rgb(150, 150, 150),
            text_primary: Color::Black,
            text_secondary: Color::DarkGray,
            accent: Color::Blue,
            pill_key_bg: Color::Blue,
            pill_key_fg: Color::White,
            pill_desc_fg: Color::Black,
            gauge_unfilled: Color::Rgb(200, 200, 200),
            sparkline_cpu: Color::Rgb(70, 130, 180),
            sparkline_memory: Color::Rgb(160, 80, 160),
            usage_colors: [
                Color::Rgb(100, 180, 100),
                Color::Rgb(220, 180, 50),
                Color::Rgb(200, 60, 60),
            ],
            severity_colors: [
                Color::Rgb(200, 60, 60),
                Color::Rgb(180, 120, 0),
                Color::Rgb(110, 110, 110),
                Color::Rgb(40, 90, 170),
                Color::Black,
            ],
        }
    }

    pub fn colorblind() -> Self {
        Theme {
            name: "colorblind",
            header_accent_bg: Color::Rgb(0, 114, 178),
            header_accent_fg: Color::White,
            selection_bg: Color::Rgb(70, 70, 70),
            selection_fg: Color::Rgb(240, 228, 66),
            status_ok: Color::Rgb(0, 158, 115),
            status_err: Color::Rgb(213, 94, 0),
            status_warn: Color::Rgb(230, 159, 0),
            statusbar_bg: Color::DarkGray,
            border: Color::Rgb(86, 180, 233),
            text_primary: Color::White,
            text_secondary: Color::Gray,
            accent: Color::Rgb(86, 180, 233),
            pill_key_bg: Color::Rgb(230, 159, 0),
            pill_key_fg: Color::Black,
            pill_desc_fg: Color::White,
            gauge_unfilled: Color::DarkGray,
            sparkline_cpu: Color::Rgb(86, 180, 233),
            sparkline_memory: Color::Rgb(204, 121, 167),
            usage_colors: [
                Color::Rgb(0, 114, 178),
                Color::Rgb(230, 159, 0),
                Color::Rgb(213, 94, 0),
            ],
            severity_colors: [
                Color::Rgb(213, 94, 0),
                Color::Rgb(230, 159, 0),
                Color::Rgb(128, 128, 128),
                Color::Rgb(86, 180, 233),
                Color::White,
            ],
        }
    }

    pub fn vivid() -> Self {
        Theme {
            name: "vivid",
            header_accent_bg: Color::Rgb(203, 166, 247),
            header_accent_fg: Color::Rgb(30, 30, 46),
            selection_bg: Color::Rgb(69, 71, 90),
            selection_fg: Color::Rgb(205, 214, 244),
            status_ok: Color::Rgb(166, 227, 161),
            status_err: Color::Rgb(243, 139, 168),
            status_warn: Color::Rgb(249, 226, 175),
            statusbar_bg: Color::Rgb(49, 50, 68),
            border: Color::Rgb(69, 71, 90),
            text_primary: Color::Rgb(205, 214, 244),
            text_secondary: Color::Rgb(166, 173, 200),
            accent: Color::Rgb(203, 166, 247),
            pill_key_bg: Color::Rgb(203, 166, 247),
            pill_key_fg: Color::Rgb(30, 30, 46),
            pill_desc_fg: Color::Rgb(205, 214, 244),
            gauge_unfilled: Color::Rgb(69, 71, 90),
            sparkline_cpu: Color::Rgb(137, 220, 235),
            sparkline_memory: Color::Rgb(250, 179, 135),
            usage_colors: [
                Color::Rgb(166, 227, 161),
                Color::Rgb(250, 179, 135),
                Color::Rgb(243, 139, 168),
            ],
            severity_colors: [
                Color::Rgb(243, 139, 168),
                Color::Rgb(249, 226, 175),
                Color::Rgb(127, 132, 156),
                Color::Rgb(137, 180, 250),
                Color::Rgb(205, 214, 244),
            ],
        }
    }

    pub fn mono() -> Self {
        Theme {
            name: "mono",
            header_accent_bg: Color::White,
            header_accent_fg: Color::Black,
            selection_bg: Color::White,
            selection_fg: Color::Black,
            status_ok: Color::White,
            status_err: Color::White,
            status_warn: Color::White,
            statusbar_bg: Color::Black,
            border: Color::White,
            text_primary: Color::White,
            text_secondary: Color::Gray,
            accent: Color::White,
            pill_key_bg: Color::White,
            pill_key_fg: Color::Black,
            pill_desc_fg: Color::White,
            gauge_unfilled: Color::Black,
            sparkline_cpu: Color::White,
            sparkline_memory: Color::White,
            usage_colors: [Color::Gray, Color::White, Color::White],
            severity_colors: [
                Color::White,
                Color::White,
                Color::DarkGray,
                Color::Gray,
                Color::Gray,
            ],
        }
    }
}

fn adapt_color(color: Color, support: ColorSupport) -> Color {
    match support {
        ColorSupport::Truecolor | ColorSupport::Auto => color,
        ColorSupport::Color256 => match color {
            Color::Rgb(r, g, b) => Color::Indexed(rgb_to_ansi256(r, g, b)),
            _ => color,
        },
        ColorSupport::Mono => match color {
            Color::Rgb(r, g, b) => {
                let luminance = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
                if luminance > 128.0 {
                    Color::White
                } else {
                    Color::Black
                }
            }
            Color::White | Color::Black | Color::Gray | Color::DarkGray => color,
            _ => Color::White,
        },
    }
}

fn rgb_to_ansi256(r: u8, g: u8, b: u8) -> u8 {
    let r = (r as f32 / 255.0 * 5.0).round() as u8;
    let g = (g as f32 / 255.0 * 5.0).round() as u8;
    let b = (b as f32 / 255.0 * 5.0).round() as u8;
    16 + 36 * r + 6 * g + b
}
