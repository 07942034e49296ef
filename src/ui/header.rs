use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::format::{format_bytes, truncate_unicode};
use crate::ui::theme::{BorderStyle, Theme};
use crate::view_model::ViewModel;

/// Everything the header shows, gathered up front so rendering does not need
/// the whole app.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderInfo<'a> {
    pub endpoint: &'a str,
    pub total: usize,
    pub running: usize,
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub refreshing: bool,
    pub stale: Option<&'a str>,
}

impl<'a> HeaderInfo<'a> {
    pub fn from_view(endpoint: &'a str, view: &'a ViewModel, refreshing: bool) -> Self {
        let (total, running) = view.counts();
        let (cpu_percent, memory_used) = view
            .workloads()
            .filter_map(|w| w.counters.as_ref())
            .fold((0.0, 0u64), |(cpu, mem), pair| {
                (cpu + pair.cpu_percent(), mem + pair.current.memory_used)
            });
        Self {
            endpoint,
            total,
            running,
            cpu_percent,
            memory_used,
            refreshing,
            stale: view.stale(),
        }
    }
}

pub fn render(
    frame: &mut Frame,
    area: Rect,
    info: &HeaderInfo<'_>,
    theme: &Theme,
    border_style: BorderStyle,
) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    render_branding(frame, chunks[0], info, theme, border_style);
    render_totals(frame, chunks[1], info, theme, border_style);
}

fn render_branding(
    frame: &mut Frame,
    area: Rect,
    info: &HeaderInfo<'_>,
    theme: &Theme,
    border_style: BorderStyle,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_style.border_type())
        .border_style(Style::default().fg(theme.border));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut spans = vec![
        Span::styled(
            " harbortop ",
            Style::default()
                .fg(theme.header_accent_fg)
                .bg(theme.header_accent_bg)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(
            truncate_unicode(info.endpoint, 32),
            Style::default().fg(theme.text_secondary),
        ),
        Span::raw("  "),
        Span::styled(
            format!("{} containers, {} running", info.total, info.running),
            Style::default().fg(theme.text_primary),
        ),
    ];

    if let Some(error) = info.stale {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("stale: {}", truncate_unicode(error, 40)),
            Style::default()
                .fg(theme.status_err)
                .add_modifier(Modifier::BOLD),
        ));
    } else if info.refreshing {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            "refreshing...",
            Style::default().fg(theme.accent),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), inner);
}

fn render_totals(
    frame: &mut Frame,
    area: Rect,
    info: &HeaderInfo<'_>,
    theme: &Theme,
    border_style: BorderStyle,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_style.border_type())
        .border_style(Style::default().fg(theme.border))
        .title(Span::styled(
            " Totals ",
            Style::default()
                .fg(theme.text_secondary)
                .add_modifier(Modifier::BOLD),
        ));

    let line = Line::from(vec![
        Span::styled("CPU ", Style::default().fg(theme.text_secondary)),
        Span::styled(
            format!("{:.1}%", info.cpu_percent),
            Style::default().fg(theme.usage_color(info.cpu_percent)),
        ),
        Span::raw("  "),
        Span::styled("MEM ", Style::default().fg(theme.text_secondary)),
        Span::styled(
            format_bytes(info.memory_used),
            Style::default().fg(theme.text_primary),
        ),
    ]);

    frame.render_widget(Paragraph::new(line).block(block), area);
}
