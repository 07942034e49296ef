pub mod detail_panel;
pub mod header;
pub mod help;
pub mod statusbar;
pub mod theme;
pub mod workload_list;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout};

use crate::app::App;

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let content_area = chunks[1];

    if app.show_detail_panel {
        let h_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(content_area);

        workload_list::render(frame, h_chunks[0], &app.view, &app.theme, app.border_style);
        detail_panel::render(
            frame,
            h_chunks[1],
            &app.view,
            app.detail_tab,
            &app.theme,
            app.border_style,
        );
    } else {
        workload_list::render(frame, content_area, &app.view, &app.theme, app.border_style);
    }

    let info = header::HeaderInfo::from_view(
        app.orchestrator.endpoint(),
        &app.view,
        app.is_refreshing(),
    );
    header::render(frame, chunks[0], &info, &app.theme, app.border_style);
    statusbar::render(
        frame,
        chunks[2],
        app.status_message.as_ref(),
        &app.keybinds,
        &app.theme,
    );

    // Help overlay, rendered last to appear on top
    if app.show_help() {
        help::render(frame, frame.area(), &app.help_entries(), &app.theme);
    }
}
