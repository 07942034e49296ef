use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::app::{ResolvedKeybinds, key_label};
use crate::ui::theme::Theme;

/// Refusals and failures start with these words; everything else reads as
/// success.
fn is_error_message(msg: &str) -> bool {
    msg.starts_with("Cannot") || msg.starts_with("Failed") || msg.starts_with("Select")
}

pub fn render(
    frame: &mut Frame,
    area: Rect,
    status_message: Option<&(String, std::time::Instant)>,
    keybinds: &ResolvedKeybinds,
    theme: &Theme,
) {
    let bg_style = Style::default().bg(theme.statusbar_bg);

    // Status message takes priority
    if let Some((msg, _)) = status_message {
        let color = if is_error_message(msg) {
            theme.status_err
        } else {
            theme.status_ok
        };
        let line = Line::from(Span::styled(
            format!(" {msg}"),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
        frame.render_widget(Paragraph::new(line).style(bg_style), area);
        return;
    }

    let pills = [
        (key_label(keybinds.quit), "Quit"),
        (key_label(keybinds.refresh), "Refresh"),
        (key_label(keybinds.start), "Start"),
        (key_label(keybinds.stop), "Stop"),
        (key_label(keybinds.restart), "Restart"),
        (key_label(keybinds.pause), "Pause"),
        (key_label(keybinds.remove), "Remove"),
        ("1-5".to_string(), "Tabs"),
        (key_label(keybinds.help), "Help"),
    ];
    let spans: Vec<Span> = pills
        .iter()
        .flat_map(|(key, desc)| pill_spans(key, desc, theme))
        .collect();

    frame.render_widget(Paragraph::new(Line::from(spans)).style(bg_style), area);
}

fn pill_spans<'a>(key: &str, desc: &str, theme: &Theme) -> Vec<Span<'a>> {
    vec![
        Span::raw(" "),
        Span::styled(
            format!(" {key} "),
            Style::default()
                .fg(theme.pill_key_fg)
                .bg(theme.pill_key_bg)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" {desc}"), Style::default().fg(theme.pill_desc_fg)),
    ]
}
