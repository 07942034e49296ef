use chrono::Utc;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Sparkline, Tabs};
use unicode_width::UnicodeWidthStr;

use crate::app::DetailTab;
use crate::format::{format_age, format_bytes, format_rate, truncate_unicode};
use crate::grouping::WorkloadGroup;
use crate::logs::classify::ClassifiedLine;
use crate::metrics::counters::CounterPair;
use crate::runtime::workload::WorkloadSnapshot;
use crate::ui::theme::{BorderStyle, Theme};
use crate::view_model::ViewModel;

const TIME_COLUMN: usize = 12;

pub fn render(
    frame: &mut Frame,
    area: Rect,
    view: &ViewModel,
    tab: DetailTab,
    theme: &Theme,
    border_style: BorderStyle,
) {
    let title = match (view.selected_workload(), view.selected_group()) {
        (Some(w), _) => format!(" {} ", w.name),
        (None, Some(g)) => format!(" {} ", g.prefix),
        (None, None) => " Detail ".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_style.border_type())
        .border_style(Style::default().fg(theme.border))
        .title(Span::styled(
            title,
            Style::default()
                .fg(theme.text_primary)
                .add_modifier(Modifier::BOLD),
        ));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [tabs_area, body] = Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).areas(inner);

    let tabs = Tabs::new(DetailTab::ALL.iter().map(|t| t.title()))
        .select(tab.index())
        .style(Style::default().fg(theme.text_secondary))
        .highlight_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, tabs_area);

    let Some(workload) = view.selected_workload() else {
        let lines = match view.selected_group() {
            Some(group) => group_lines(view, group, theme),
            None => vec![muted(" No container selected", theme)],
        };
        frame.render_widget(Paragraph::new(lines), body);
        return;
    };

    match tab {
        DetailTab::Overview => {
            frame.render_widget(Paragraph::new(overview_lines(workload, theme)), body);
        }
        DetailTab::Stats => render_stats(frame, body, view, workload, theme),
        DetailTab::Network => {
            let lines = match &workload.counters {
                Some(pair) => network_lines(pair, theme),
                None => vec![no_counters(theme)],
            };
            frame.render_widget(Paragraph::new(lines), body);
        }
        DetailTab::Storage => {
            let lines = match &workload.counters {
                Some(pair) => storage_lines(pair, theme),
                None => vec![no_counters(theme)],
            };
            frame.render_widget(Paragraph::new(lines), body);
        }
        DetailTab::Logs => render_logs(frame, body, view, workload, theme),
    }
}

fn detail_line(label: &str, value: String, theme: &Theme) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!(" {label:<10}"),
            Style::default()
                .fg(theme.pill_key_bg)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(value, Style::default().fg(theme.text_primary)),
    ])
}

fn muted(text: &str, theme: &Theme) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(theme.text_secondary),
    ))
}

fn no_counters(theme: &Theme) -> Line<'static> {
    muted(" No stats (container not running)", theme)
}

fn group_lines(view: &ViewModel, group: &WorkloadGroup, theme: &Theme) -> Vec<Line<'static>> {
    let mut lines = vec![detail_line(
        "Group",
        format!(
            "{} containers, {} running",
            group.members.len(),
            view.running_in(group)
        ),
        theme,
    )];
    for workload in group.members.iter().filter_map(|id| view.workload(id)) {
        lines.push(Line::from(vec![
            Span::raw("   "),
            Span::styled(
                workload.status.icon(),
                Style::default().fg(theme.status_color(workload.status)),
            ),
            Span::raw(format!(" {}  {}", workload.name, workload.status.label())),
        ]));
    }
    lines
}

pub fn overview_lines(workload: &WorkloadSnapshot, theme: &Theme) -> Vec<Line<'static>> {
    let now = Utc::now();
    let status = match workload.health {
        Some(health) => format!("{} ({})", workload.status.label(), health.label()),
        None => workload.status.label().to_string(),
    };
    let uptime = if workload.status.is_running() {
        format_age(workload.started_at, now)
    } else {
        "-".to_string()
    };
    let ports = if workload.ports.is_empty() {
        "-".to_string()
    } else {
        workload
            .ports
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let command = if workload.command.is_empty() {
        "(none)".to_string()
    } else {
        truncate_unicode(&workload.command, 60)
    };

    let mut lines = vec![
        detail_line("Name", workload.name.clone(), theme),
        detail_line("ID", workload.short_id().to_string(), theme),
        detail_line("Image", workload.image.clone(), theme),
        detail_line("Status", status, theme),
        detail_line("Created", format_age(workload.created_at, now), theme),
        detail_line("Uptime", uptime, theme),
        detail_line("Command", command, theme),
        detail_line("Ports", ports, theme),
    ];
    if !workload.labels.is_empty() {
        lines.push(detail_line("Labels", String::new(), theme));
        lines.extend(workload.labels.iter().map(|(k, v)| {
            Line::from(Span::styled(
                format!("   {k}={v}"),
                Style::default().fg(theme.text_secondary),
            ))
        }));
    }
    lines
}

fn render_stats(
    frame: &mut Frame,
    area: Rect,
    view: &ViewModel,
    workload: &WorkloadSnapshot,
    theme: &Theme,
) {
    let Some(pair) = &workload.counters else {
        frame.render_widget(Paragraph::new(no_counters(theme)), area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(area);

    let cpu = pair.cpu_percent();
    let cores = pair.current.online_cores.max(1) as f64;
    let cpu_gauge = Gauge::default()
        .block(titled(" CPU ", theme))
        .gauge_style(
            Style::default()
                .fg(theme.usage_color(cpu / cores))
                .bg(theme.gauge_unfilled),
        )
        .ratio((cpu / (cores * 100.0)).clamp(0.0, 1.0))
        .label(format!("{cpu:.1}%"));
    frame.render_widget(cpu_gauge, chunks[0]);

    let history = view.history_for(&workload.id);
    let cpu_points = history.map(|h| h.cpu_points()).unwrap_or_default();
    let sparkline = Sparkline::default()
        .block(titled(" CPU history ", theme))
        .data(&cpu_points)
        .style(Style::default().fg(theme.sparkline_cpu));
    frame.render_widget(sparkline, chunks[1]);

    let memory = pair.memory_percent();
    let sample = &pair.current;
    let limit = if sample.memory_limit > 0 {
        format_bytes(sample.memory_limit)
    } else {
        "no limit".to_string()
    };
    let memory_gauge = Gauge::default()
        .block(titled(" Memory ", theme))
        .gauge_style(
            Style::default()
                .fg(theme.usage_color(memory))
                .bg(theme.gauge_unfilled),
        )
        .ratio((memory / 100.0).clamp(0.0, 1.0))
        .label(format!(
            "{} / {limit} ({memory:.1}%)",
            format_bytes(sample.memory_used)
        ));
    frame.render_widget(memory_gauge, chunks[2]);

    let memory_points = history.map(|h| h.memory_points()).unwrap_or_default();
    let sparkline = Sparkline::default()
        .block(titled(" Memory history ", theme))
        .data(&memory_points)
        .style(Style::default().fg(theme.sparkline_memory));
    frame.render_widget(sparkline, chunks[3]);

    frame.render_widget(Paragraph::new(stats_lines(pair, theme)), chunks[4]);
}

fn titled(title: &'static str, theme: &Theme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .title(Span::styled(title, Style::default().fg(theme.text_secondary)))
}

pub fn stats_lines(pair: &CounterPair, theme: &Theme) -> Vec<Line<'static>> {
    let sample = &pair.current;
    let throttling = &sample.throttling;
    vec![
        detail_line("Cache", format_bytes(sample.memory_cache), theme),
        detail_line("RSS", format_bytes(sample.memory_rss), theme),
        detail_line("Peak", format_bytes(sample.memory_peak), theme),
        detail_line("PIDs", sample.pids.to_string(), theme),
        detail_line("Cores", sample.online_cores.to_string(), theme),
        detail_line(
            "Throttled",
            format!(
                "{}/{} periods, {:.1}s",
                throttling.throttled_periods,
                throttling.periods,
                throttling.throttled_time_ns as f64 / 1e9
            ),
            theme,
        ),
    ]
}

pub fn network_lines(pair: &CounterPair, theme: &Theme) -> Vec<Line<'static>> {
    let net = &pair.current.network;
    let rates = pair.io_rates();
    vec![
        detail_line("RX", format_bytes(net.rx_bytes), theme),
        detail_line("TX", format_bytes(net.tx_bytes), theme),
        detail_line("RX rate", format_rate(rates.rx_per_sec), theme),
        detail_line("TX rate", format_rate(rates.tx_per_sec), theme),
        detail_line(
            "Packets",
            format!("{} rx / {} tx", net.rx_packets, net.tx_packets),
            theme,
        ),
        detail_line(
            "Errors",
            format!("{} rx / {} tx", net.rx_errors, net.tx_errors),
            theme,
        ),
        detail_line(
            "Dropped",
            format!("{} rx / {} tx", net.rx_dropped, net.tx_dropped),
            theme,
        ),
    ]
}

pub fn storage_lines(pair: &CounterPair, theme: &Theme) -> Vec<Line<'static>> {
    let io = &pair.current.block_io;
    let rates = pair.io_rates();
    vec![
        detail_line("Read", format_bytes(io.read_bytes), theme),
        detail_line("Write", format_bytes(io.write_bytes), theme),
        detail_line("Read rate", format_rate(rates.read_per_sec), theme),
        detail_line("Write rate", format_rate(rates.write_per_sec), theme),
        detail_line(
            "Ops",
            format!("{} read / {} write", io.read_ops, io.write_ops),
            theme,
        ),
    ]
}

/// `HH:MM:SS.mmm  message`, with the message cut to fit `width` columns.
pub fn log_line_text(line: &ClassifiedLine, width: usize) -> String {
    let time = line.timestamp.as_deref().unwrap_or("");
    let time = format!("{time:<TIME_COLUMN$}");
    let budget = width.saturating_sub(time.width() + 2);
    format!("{time}  {}", truncate_unicode(&line.message, budget))
}

fn render_logs(
    frame: &mut Frame,
    area: Rect,
    view: &ViewModel,
    workload: &WorkloadSnapshot,
    theme: &Theme,
) {
    let Some(buffer) = view.logs_for(&workload.id).filter(|b| !b.is_empty()) else {
        frame.render_widget(Paragraph::new(muted(" Waiting for logs...", theme)), area);
        return;
    };

    let width = area.width as usize;
    let lines: Vec<Line> = buffer
        .tail(area.height as usize)
        .map(|line| {
            Line::from(Span::styled(
                log_line_text(line, width),
                Style::default().fg(theme.severity_color(line.severity)),
            ))
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::classify::classify;

    #[test]
    fn log_lines_align_and_truncate() {
        let line = classify("2024-01-15T10:30:45.123456789Z Server listening on port 8080");
        insta::assert_snapshot!(log_line_text(&line, 40), @"10:30:45.123  Server listening on port …");

        let bare = classify("no timestamp here");
        assert_eq!(log_line_text(&bare, 80), format!("{}no timestamp here", " ".repeat(14)));
    }
}
