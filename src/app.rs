use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::debug;

use crate::action::{Action, Direction};
use crate::config::{Config, parse_key};
use crate::event::Event;
use crate::refresh::{RefreshOrchestrator, RefreshOutcome};
use crate::runtime::lifecycle::{LifecycleOp, LifecycleRequest};
use crate::ui::theme::{BorderStyle, ColorSupport, Theme, resolve_color_support};
use crate::view_model::ViewModel;

const STATUS_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailTab {
    #[default]
    Overview,
    Stats,
    Network,
    Storage,
    Logs,
}

impl DetailTab {
    pub const ALL: [DetailTab; 5] = [
        DetailTab::Overview,
        DetailTab::Stats,
        DetailTab::Network,
        DetailTab::Storage,
        DetailTab::Logs,
    ];

    pub fn title(self) -> &'static str {
        match self {
            DetailTab::Overview => "Overview",
            DetailTab::Stats => "Stats",
            DetailTab::Network => "Network",
            DetailTab::Storage => "Storage",
            DetailTab::Logs => "Logs",
        }
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedKeybinds {
    pub quit: KeyCode,
    pub help: KeyCode,
    pub refresh: KeyCode,
    pub toggle_detail: KeyCode,
    pub cycle_theme: KeyCode,
    pub start: KeyCode,
    pub stop: KeyCode,
    pub restart: KeyCode,
    pub pause: KeyCode,
    pub unpause: KeyCode,
    pub remove: KeyCode,
}

impl ResolvedKeybinds {
    pub fn from_config(kb: &crate::config::KeybindsConfig) -> Self {
        Self {
            quit: parse_key(&kb.quit).unwrap_or(KeyCode::Char('q')),
            help: parse_key(&kb.help).unwrap_or(KeyCode::Char('?')),
            refresh: parse_key(&kb.refresh).unwrap_or(KeyCode::Char('r')),
            toggle_detail: parse_key(&kb.toggle_detail).unwrap_or(KeyCode::Char('i')),
            cycle_theme: parse_key(&kb.cycle_theme).unwrap_or(KeyCode::Char('c')),
            start: parse_key(&kb.start).unwrap_or(KeyCode::Char('s')),
            stop: parse_key(&kb.stop).unwrap_or(KeyCode::Char('t')),
            restart: parse_key(&kb.restart).unwrap_or(KeyCode::Char('R')),
            pause: parse_key(&kb.pause).unwrap_or(KeyCode::Char('p')),
            unpause: parse_key(&kb.unpause).unwrap_or(KeyCode::Char('u')),
            remove: parse_key(&kb.remove).unwrap_or(KeyCode::Char('d')),
        }
    }

    /// Returns (key_label, description) pairs for all configurable keybinds.
    pub fn help_entries(&self) -> Vec<(String, &'static str)> {
        vec![
            (key_label(self.quit), "Quit"),
            (key_label(self.refresh), "Refresh now"),
            (key_label(self.start), "Start container"),
            (key_label(self.stop), "Stop container"),
            (key_label(self.restart), "Restart container"),
            (key_label(self.pause), "Pause container"),
            (key_label(self.unpause), "Unpause container"),
            (key_label(self.remove), "Remove container"),
            (key_label(self.toggle_detail), "Toggle detail panel"),
            (key_label(self.cycle_theme), "Cycle theme"),
            (key_label(self.help), "Toggle help"),
            ("↑↓".to_string(), "Navigate"),
            ("←→".to_string(), "Collapse / expand group"),
            ("Enter".to_string(), "Toggle group"),
            ("1-5 Tab".to_string(), "Detail tabs"),
            ("Ctrl+C".to_string(), "Quit (always)"),
        ]
    }

    fn lifecycle_op(&self, code: KeyCode) -> Option<LifecycleOp> {
        let op = if code == self.start {
            LifecycleOp::Start
        } else if code == self.stop {
            LifecycleOp::Stop
        } else if code == self.restart {
            LifecycleOp::Restart
        } else if code == self.pause {
            LifecycleOp::Pause
        } else if code == self.unpause {
            LifecycleOp::Unpause
        } else if code == self.remove {
            LifecycleOp::Remove { force: false }
        } else {
            return None;
        };
        Some(op)
    }
}

pub fn key_label(code: KeyCode) -> String {
    match code {
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Esc => "Esc".to_string(),
        KeyCode::Tab => "Tab".to_string(),
        KeyCode::Backspace => "Bksp".to_string(),
        KeyCode::Delete => "Del".to_string(),
        KeyCode::F(n) => format!("F{n}"),
        _ => "?".to_string(),
    }
}

pub struct App {
    pub running: bool,
    pub view: ViewModel,
    pub orchestrator: RefreshOrchestrator,
    pub input_mode: InputMode,
    pub detail_tab: DetailTab,
    pub show_detail_panel: bool,
    pub theme: Theme,
    pub color_support: ColorSupport,
    pub border_style: BorderStyle,
    pub status_message: Option<(String, Instant)>,
    pub keybinds: ResolvedKeybinds,
}

impl App {
    pub fn new(config: &Config, orchestrator: RefreshOrchestrator) -> Self {
        let color_support = resolve_color_support(&config.colors.color_support);
        let theme = Theme::from_config(&config.colors.theme, color_support);
        let border_style = BorderStyle::from_config_str(&config.colors.border_style);

        let mut view = ViewModel::new(
            config.general.sparkline_length,
            config.logs.buffer_capacity,
        );
        let focus = orchestrator.clone();
        view.on_selection_changed(move |selected| {
            if focus.set_log_focus(selected.map(|w| w.id.clone())) {
                focus.force_refresh();
            }
        });

        App {
            running: true,
            view,
            orchestrator,
            input_mode: InputMode::Normal,
            detail_tab: DetailTab::default(),
            show_detail_panel: config.general.show_detail_panel,
            theme,
            color_support,
            border_style,
            status_message: None,
            keybinds: ResolvedKeybinds::from_config(&config.keybinds),
        }
    }

    /// Applies one event from the UI inbox. Returns `true` if the screen
    /// should be redrawn.
    pub fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Key(key) => {
                let action = self.map_key(key);
                self.dispatch(action);
                true
            }
            Event::Tick => self.expire_status() || self.is_refreshing(),
            Event::Resize => true,
            Event::Refresh(RefreshOutcome::Updated(report)) => {
                debug!(cycle = report.cycle, workloads = report.workloads.len(), "applying refresh");
                self.view.apply(report);
                true
            }
            Event::Refresh(RefreshOutcome::Failed { cycle, error }) => {
                debug!(cycle, error = %error, "refresh failed, keeping previous view");
                self.view.mark_stale(error.to_string());
                true
            }
            Event::Lifecycle(result) => {
                self.set_status(result.message());
                true
            }
        }
    }

    pub fn map_key(&self, key: KeyEvent) -> Action {
        // Ctrl+C always quits (hardwired safety)
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Action::Quit;
        }

        match self.input_mode {
            InputMode::Normal => self.map_key_normal(key),
            InputMode::Help => self.map_key_help(key),
        }
    }

    fn map_key_normal(&self, key: KeyEvent) -> Action {
        let code = key.code;
        let kb = &self.keybinds;

        // Navigation keys are hardwired (not configurable)
        match code {
            KeyCode::Up => return Action::Navigate(Direction::Up),
            KeyCode::Down => return Action::Navigate(Direction::Down),
            KeyCode::Left => return Action::Navigate(Direction::Left),
            KeyCode::Right => return Action::Navigate(Direction::Right),
            KeyCode::Enter => return Action::Toggle,
            KeyCode::Tab => return Action::NextTab,
            KeyCode::Char(c @ '1'..='5') => {
                return Action::SelectTab(c as usize - '1' as usize);
            }
            _ => {}
        }

        if code == kb.quit {
            return Action::Quit;
        }
        if code == kb.help {
            return Action::ToggleHelp;
        }
        if code == kb.refresh {
            return Action::Refresh;
        }
        if code == kb.toggle_detail {
            return Action::ToggleDetailPanel;
        }
        if code == kb.cycle_theme {
            return Action::CycleTheme;
        }
        if let Some(op) = kb.lifecycle_op(code) {
            return Action::Lifecycle(op);
        }

        Action::None
    }

    fn map_key_help(&self, key: KeyEvent) -> Action {
        let code = key.code;
        // In help mode, only the help key and Esc dismiss, everything else is ignored
        if code == self.keybinds.help || code == KeyCode::Esc {
            return Action::ToggleHelp;
        }
        Action::None
    }

    pub fn dispatch(&mut self, action: Action) {
        match action {
            Action::Quit => self.running = false,
            Action::Navigate(dir) => self.view.move_selection(dir),
            Action::Toggle => self.view.toggle_selected(),
            Action::SelectTab(idx) => {
                if let Some(tab) = DetailTab::ALL.get(idx) {
                    self.select_tab(*tab);
                }
            }
            Action::NextTab => self.select_tab(self.detail_tab.next()),
            Action::Lifecycle(op) => self.request_lifecycle(op),
            Action::Refresh => {
                self.orchestrator.force_refresh();
            }
            Action::ToggleDetailPanel => {
                self.show_detail_panel = !self.show_detail_panel;
                self.sync_log_fetching();
            }
            Action::CycleTheme => {
                self.theme = self.theme.next(self.color_support);
            }
            Action::ToggleHelp => {
                self.input_mode = if self.input_mode == InputMode::Help {
                    InputMode::Normal
                } else {
                    InputMode::Help
                };
            }
            Action::None => {}
        }
    }

    fn select_tab(&mut self, tab: DetailTab) {
        self.detail_tab = tab;
        self.sync_log_fetching();
    }

    /// Logs are fetched only while the log tab is visible.
    fn sync_log_fetching(&mut self) {
        let visible = self.show_detail_panel && self.detail_tab == DetailTab::Logs;
        if self.orchestrator.set_logs_enabled(visible) && visible {
            self.orchestrator.force_refresh();
        }
    }

    fn request_lifecycle(&mut self, op: LifecycleOp) {
        let Some(workload) = self.view.selected_workload() else {
            self.set_status("Select a container first");
            return;
        };
        let request = LifecycleRequest {
            id: workload.id.clone(),
            name: workload.name.clone(),
            status: workload.status,
            op,
        };
        let name = request.name.clone();
        match self.orchestrator.run_action(request) {
            Ok(()) => self.set_status(format!("Requested {} of {name}", op.verb())),
            Err(message) => self.set_status(message),
        }
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    /// Clears the status message once it is older than three seconds.
    /// Returns `true` if one was cleared.
    pub fn expire_status(&mut self) -> bool {
        if let Some((_, created)) = &self.status_message
            && created.elapsed() >= STATUS_TTL
        {
            self.status_message = None;
            return true;
        }
        false
    }

    pub fn show_help(&self) -> bool {
        self.input_mode == InputMode::Help
    }

    pub fn help_entries(&self) -> Vec<(String, &'static str)> {
        self.keybinds.help_entries()
    }

    pub fn is_refreshing(&self) -> bool {
        self.orchestrator.state().is_busy()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::event::Dispatcher;
    use crate::refresh::{RefreshReport, RefreshSettings};
    use crate::runtime::fake::FakeClient;
    use crate::runtime::lifecycle::LifecycleResult;
    use crate::runtime::workload::{WorkloadSnapshot, WorkloadStatus};
    use crate::runtime::RuntimeError;

    pub(crate) fn workloads() -> Vec<WorkloadSnapshot> {
        vec![
            WorkloadSnapshot::new("aaa111", "api", WorkloadStatus::Running),
            WorkloadSnapshot::new("bbb222", "db", WorkloadStatus::Exited),
        ]
    }

    pub(crate) fn make_app(client: Arc<FakeClient>) -> App {
        let (dispatcher, _rx) = Dispatcher::channel();
        let orchestrator = RefreshOrchestrator::new(client, dispatcher, RefreshSettings::default());
        App::new(&Config::default(), orchestrator)
    }

    pub(crate) fn report(workloads: Vec<WorkloadSnapshot>) -> RefreshReport {
        RefreshReport {
            cycle: 1,
            workloads,
            logs: HashMap::new(),
            degraded: 0,
            fetched_at: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[tokio::test]
    async fn default_keybinds_map_to_actions() {
        let app = make_app(Arc::new(FakeClient::new(Vec::new())));

        assert_eq!(app.map_key(press(KeyCode::Char('q'))), Action::Quit);
        assert_eq!(app.map_key(press(KeyCode::Char('r'))), Action::Refresh);
        assert_eq!(app.map_key(press(KeyCode::Char('?'))), Action::ToggleHelp);
        assert_eq!(
            app.map_key(press(KeyCode::Char('t'))),
            Action::Lifecycle(LifecycleOp::Stop)
        );
        assert_eq!(
            app.map_key(press(KeyCode::Char('R'))),
            Action::Lifecycle(LifecycleOp::Restart)
        );
        assert_eq!(
            app.map_key(press(KeyCode::Char('d'))),
            Action::Lifecycle(LifecycleOp::Remove { force: false })
        );
        assert_eq!(app.map_key(press(KeyCode::Char('3'))), Action::SelectTab(2));
        assert_eq!(app.map_key(press(KeyCode::Enter)), Action::Toggle);
        assert_eq!(app.map_key(press(KeyCode::Up)), Action::Navigate(Direction::Up));

        // Ctrl+C always quits
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(app.map_key(key), Action::Quit);
    }

    #[tokio::test]
    async fn custom_keybind_remap_works() {
        let mut app = make_app(Arc::new(FakeClient::new(Vec::new())));
        app.keybinds.quit = KeyCode::Char('x');

        assert_eq!(app.map_key(press(KeyCode::Char('x'))), Action::Quit);
        assert_eq!(app.map_key(press(KeyCode::Char('q'))), Action::None);
    }

    #[tokio::test]
    async fn help_mode_blocks_other_keys() {
        let mut app = make_app(Arc::new(FakeClient::new(Vec::new())));
        app.dispatch(Action::ToggleHelp);
        assert!(app.show_help());

        assert_eq!(app.map_key(press(KeyCode::Char('q'))), Action::None);
        assert_eq!(app.map_key(press(KeyCode::Char('t'))), Action::None);
        assert_eq!(app.map_key(press(KeyCode::Esc)), Action::ToggleHelp);

        app.dispatch(Action::ToggleHelp);
        assert!(!app.show_help());
    }

    #[tokio::test]
    async fn refresh_outcomes_update_the_view() {
        let mut app = make_app(Arc::new(FakeClient::new(Vec::new())));
        assert!(app.handle_event(Event::Refresh(RefreshOutcome::Updated(report(workloads())))));
        assert_eq!(app.view.counts(), (2, 1));
        assert_eq!(app.view.selected_workload().unwrap().name, "api");

        app.handle_event(Event::Refresh(RefreshOutcome::Failed {
            cycle: 2,
            error: RuntimeError::Unreachable {
                endpoint: "fake://".into(),
                reason: "down".into(),
            },
        }));
        assert!(app.view.stale().is_some());
        assert_eq!(app.view.counts(), (2, 1));
    }

    #[tokio::test]
    async fn refused_action_sets_status_and_calls_nothing() {
        let client = Arc::new(FakeClient::new(workloads()));
        let mut app = make_app(Arc::clone(&client));
        app.view.apply(report(workloads()));
        app.dispatch(Action::Navigate(Direction::Down));
        assert_eq!(app.view.selected_workload().unwrap().name, "db");

        app.dispatch(Action::Lifecycle(LifecycleOp::Stop));
        let (message, _) = app.status_message.clone().unwrap();
        assert_eq!(message, "Cannot stop db: container is exited");
        tokio::task::yield_now().await;
        assert!(client.actions().is_empty());
    }

    #[tokio::test]
    async fn lifecycle_result_becomes_status() {
        let mut app = make_app(Arc::new(FakeClient::new(Vec::new())));
        app.handle_event(Event::Lifecycle(LifecycleResult::Done {
            op: LifecycleOp::Stop,
            name: "web-1".into(),
        }));
        assert_eq!(app.status_message.as_ref().unwrap().0, "Stopped web-1");
    }

    #[tokio::test]
    async fn logs_tab_enables_log_fetching() {
        let mut app = make_app(Arc::new(FakeClient::new(Vec::new())));
        assert!(!app.orchestrator.log_focus().enabled);
        app.dispatch(Action::SelectTab(4));
        assert_eq!(app.detail_tab, DetailTab::Logs);
        assert!(app.orchestrator.log_focus().enabled);

        app.dispatch(Action::NextTab);
        assert_eq!(app.detail_tab, DetailTab::Overview);
        assert!(!app.orchestrator.log_focus().enabled);
    }

    #[tokio::test]
    async fn selection_changes_move_log_focus() {
        let mut app = make_app(Arc::new(FakeClient::new(workloads())));
        app.view.apply(report(workloads()));
        assert_eq!(app.orchestrator.log_focus().workload.as_deref(), Some("aaa111"));
        app.dispatch(Action::Navigate(Direction::Down));
        assert_eq!(app.orchestrator.log_focus().workload.as_deref(), Some("bbb222"));
    }
}
