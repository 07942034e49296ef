use ratatui::Frame;
use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};

use crate::format::format_bytes;
use crate::grouping::WorkloadGroup;
use crate::runtime::workload::WorkloadSnapshot;
use crate::ui::theme::{BorderStyle, Theme};
use crate::view_model::{self, Selection, ViewModel};

const WIDTHS: [Constraint; 4] = [
    Constraint::Min(16),
    Constraint::Length(10),
    Constraint::Length(7),
    Constraint::Length(9),
];

/// "svc-a  (2 containers, 1 running)"
pub fn group_label(group: &WorkloadGroup, running: usize) -> String {
    format!(
        "{}  ({} containers, {running} running)",
        group.prefix,
        group.members.len()
    )
}

fn group_row<'a>(view: &ViewModel, group: &WorkloadGroup, theme: &Theme) -> Row<'a> {
    let marker = if group.expanded { "▾" } else { "▸" };
    let (cpu, memory) = group
        .members
        .iter()
        .filter_map(|id| view.workload(id)?.counters.as_ref())
        .fold((0.0, 0u64), |(cpu, mem), pair| {
            (cpu + pair.cpu_percent(), mem + pair.current.memory_used)
        });

    Row::new(vec![
        Cell::from(format!(
            "{marker} {}",
            group_label(group, view.running_in(group))
        ))
        .style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)),
        Cell::from(""),
        Cell::from(format!("{cpu:.1}")),
        Cell::from(format_bytes(memory)),
    ])
}

fn workload_row<'a>(workload: &WorkloadSnapshot, nested: bool, theme: &Theme) -> Row<'a> {
    let indent = if nested { "  " } else { "" };
    let cpu = workload
        .cpu_percent()
        .map(|c| format!("{c:.1}"))
        .unwrap_or_else(|| "-".to_string());
    let memory = workload
        .counters
        .as_ref()
        .map(|pair| format_bytes(pair.current.memory_used))
        .unwrap_or_else(|| "-".to_string());

    Row::new(vec![
        Cell::from(Line::from(vec![
            Span::raw(indent),
            Span::styled(
                workload.status.icon(),
                Style::default().fg(theme.status_color(workload.status)),
            ),
            Span::raw(" "),
            Span::styled(workload.name.clone(), Style::default().fg(theme.text_primary)),
        ])),
        Cell::from(workload.status.label())
            .style(Style::default().fg(theme.status_color(workload.status))),
        Cell::from(cpu).style(
            Style::default().fg(theme.usage_color(workload.cpu_percent().unwrap_or(0.0))),
        ),
        Cell::from(memory),
    ])
}

fn build_row<'a>(view: &ViewModel, row: &view_model::Row, theme: &Theme) -> Option<Row<'a>> {
    match &row.target {
        Selection::Group(prefix) => Some(group_row(view, view.group(prefix)?, theme)),
        Selection::Workload(id) => Some(workload_row(view.workload(id)?, row.nested, theme)),
    }
}

pub fn render(
    frame: &mut Frame,
    area: Rect,
    view: &ViewModel,
    theme: &Theme,
    border_style: BorderStyle,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_style.border_type())
        .border_style(Style::default().fg(theme.border))
        .title(Span::styled(
            " Containers ",
            Style::default()
                .fg(theme.text_primary)
                .add_modifier(Modifier::BOLD),
        ));

    if view.rows().is_empty() {
        let message = match view.stale() {
            Some(error) => format!(" {error}"),
            None if view.last_update().is_none() => " Connecting...".to_string(),
            None => " No containers".to_string(),
        };
        let paragraph = Paragraph::new(Line::from(Span::styled(
            message,
            Style::default().fg(theme.text_secondary),
        )))
        .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let rows: Vec<Row> = view
        .rows()
        .iter()
        .filter_map(|row| build_row(view, row, theme))
        .collect();

    let header = Row::new(vec!["NAME", "STATUS", "CPU%", "MEM"]).style(
        Style::default()
            .fg(theme.text_secondary)
            .add_modifier(Modifier::BOLD),
    );

    let table = Table::new(rows, WIDTHS)
        .header(header)
        .block(block)
        .row_highlight_style(
            Style::default()
                .bg(theme.selection_bg)
                .fg(theme.selection_fg)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = TableState::default().with_selected(view.selected_index());
    frame.render_stateful_widget(table, area, &mut state);
}
