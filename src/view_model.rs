//! UI-owned state: the current workloads, their grouping, the cursor, and
//! the per-workload log and history buffers.
//!
//! Only the UI loop touches a [`ViewModel`]. Refresh results reach it through
//! [`ViewModel::apply`], which is where the fetched list replaces the old one,
//! groups are recomputed and the cursor is resolved by identity.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::action::Direction;
use crate::grouping::{WorkloadGroup, group_workloads};
use crate::logs::buffer::LogBuffer;
use crate::metrics::history::{HistoryStore, WorkloadHistory};
use crate::refresh::RefreshReport;
use crate::runtime::workload::WorkloadSnapshot;

/// What the cursor points at. Rows are identified by identity, never by
/// index, so a selection survives the list being rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selection {
    Group(String),
    Workload(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub target: Selection,
    /// Member rows of an expanded group are drawn indented.
    pub nested: bool,
}

pub type SelectionListener = Box<dyn FnMut(Option<&WorkloadSnapshot>)>;

pub struct ViewModel {
    workloads: HashMap<String, WorkloadSnapshot>,
    groups: Vec<WorkloadGroup>,
    rows: Vec<Row>,
    cursor: Option<Selection>,
    logs: HashMap<String, LogBuffer>,
    log_capacity: usize,
    history: HistoryStore,
    listeners: Vec<SelectionListener>,
    notified: Option<String>,
    last_update: Option<DateTime<Utc>>,
    stale: Option<String>,
}

impl ViewModel {
    pub fn new(history_length: usize, log_capacity: usize) -> Self {
        Self {
            workloads: HashMap::new(),
            groups: Vec::new(),
            rows: Vec::new(),
            cursor: None,
            logs: HashMap::new(),
            log_capacity,
            history: HistoryStore::new(history_length),
            listeners: Vec::new(),
            notified: None,
            last_update: None,
            stale: None,
        }
    }

    /// Replaces the workload set with a fresh refresh result, regroups, and
    /// resolves the cursor.
    pub fn apply(&mut self, report: RefreshReport) {
        self.workloads = report
            .workloads
            .into_iter()
            .map(|w| (w.id.clone(), w))
            .collect();

        let pairs: Vec<(&str, &str)> = self
            .workloads
            .values()
            .map(|w| (w.id.as_str(), w.name.as_str()))
            .collect();
        self.groups = group_workloads(&pairs, &self.groups);

        for (id, lines) in report.logs {
            self.logs
                .entry(id)
                .or_insert_with(|| LogBuffer::new(self.log_capacity))
                .append_tail(lines);
        }
        self.logs.retain(|id, _| self.workloads.contains_key(id));

        for workload in self.workloads.values() {
            if let Some(pair) = &workload.counters {
                self.history
                    .record(&workload.id, pair.cpu_percent(), pair.memory_percent());
            }
        }
        let alive: HashSet<&str> = self.workloads.keys().map(String::as_str).collect();
        self.history.gc(&alive);

        self.last_update = Some(report.fetched_at);
        self.stale = None;

        self.resolve_cursor();
        self.notify_if_changed();
    }

    /// Records a failed cycle. The previous view stays as it is.
    pub fn mark_stale(&mut self, error: impl Into<String>) {
        self.stale = Some(error.into());
    }

    fn resolve_cursor(&mut self) {
        match self.cursor.clone() {
            Some(Selection::Workload(id)) if self.workloads.contains_key(&id) => {
                if let Some(group) = self
                    .groups
                    .iter_mut()
                    .find(|g| !g.is_singleton() && g.contains(&id))
                {
                    group.expanded = true;
                }
            }
            Some(Selection::Group(prefix))
                if self
                    .groups
                    .iter()
                    .any(|g| g.prefix == prefix && !g.is_singleton()) => {}
            _ => self.cursor = None,
        }
        self.rebuild_rows();
        if self.cursor.is_none() {
            self.cursor = self.rows.first().map(|row| row.target.clone());
        }
    }

    fn rebuild_rows(&mut self) {
        self.rows.clear();
        for group in &self.groups {
            if group.is_singleton() {
                self.rows.extend(group.members.iter().map(|id| Row {
                    target: Selection::Workload(id.clone()),
                    nested: false,
                }));
                continue;
            }
            self.rows.push(Row {
                target: Selection::Group(group.prefix.clone()),
                nested: false,
            });
            if group.expanded {
                self.rows.extend(group.members.iter().map(|id| Row {
                    target: Selection::Workload(id.clone()),
                    nested: true,
                }));
            }
        }
    }

    /// Registers a callback fired whenever the selected workload changes,
    /// by navigation or by a refresh. It receives `None` when the cursor
    /// moves to a group header or the list empties.
    pub fn on_selection_changed(&mut self, listener: impl FnMut(Option<&WorkloadSnapshot>) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn notify_if_changed(&mut self) {
        let current = self.selected_workload().map(|w| w.id.clone());
        if current == self.notified {
            return;
        }
        self.notified = current;

        let mut listeners = std::mem::take(&mut self.listeners);
        let selected = self.selected_workload();
        for listener in &mut listeners {
            listener(selected);
        }
        self.listeners = listeners;
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn groups(&self) -> &[WorkloadGroup] {
        &self.groups
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.cursor.as_ref()
    }

    pub fn selected_index(&self) -> Option<usize> {
        let cursor = self.cursor.as_ref()?;
        self.rows.iter().position(|row| &row.target == cursor)
    }

    /// The workload under the cursor; `None` on a group header.
    pub fn selected_workload(&self) -> Option<&WorkloadSnapshot> {
        match &self.cursor {
            Some(Selection::Workload(id)) => self.workloads.get(id),
            _ => None,
        }
    }

    pub fn selected_group(&self) -> Option<&WorkloadGroup> {
        match &self.cursor {
            Some(Selection::Group(prefix)) => self.group(prefix),
            _ => None,
        }
    }

    pub fn workloads(&self) -> impl Iterator<Item = &WorkloadSnapshot> {
        self.workloads.values()
    }

    pub fn workload(&self, id: &str) -> Option<&WorkloadSnapshot> {
        self.workloads.get(id)
    }

    pub fn group(&self, prefix: &str) -> Option<&WorkloadGroup> {
        self.groups.iter().find(|g| g.prefix == prefix)
    }

    /// Members of `group` that are running.
    pub fn running_in(&self, group: &WorkloadGroup) -> usize {
        group
            .members
            .iter()
            .filter_map(|id| self.workloads.get(id))
            .filter(|w| w.status.is_running())
            .count()
    }

    pub fn move_selection(&mut self, direction: Direction) {
        match direction {
            Direction::Up => self.step(-1),
            Direction::Down => self.step(1),
            Direction::Right => self.expand_selected(),
            Direction::Left => self.collapse_selected(),
        }
    }

    fn step(&mut self, delta: isize) {
        if self.rows.is_empty() {
            return;
        }
        let next = match self.selected_index() {
            Some(idx) => idx
                .saturating_add_signed(delta)
                .min(self.rows.len() - 1),
            None => 0,
        };
        self.cursor = Some(self.rows[next].target.clone());
        self.notify_if_changed();
    }

    fn set_expanded(&mut self, prefix: &str, expanded: bool) {
        if let Some(group) = self
            .groups
            .iter_mut()
            .find(|g| g.prefix == prefix && !g.is_singleton())
        {
            group.expanded = expanded;
        }
        self.rebuild_rows();
    }

    pub fn expand_selected(&mut self) {
        if let Some(Selection::Group(prefix)) = self.cursor.clone() {
            self.set_expanded(&prefix, true);
        }
    }

    /// Collapses the selected group, or jumps from a member row to its group
    /// header.
    pub fn collapse_selected(&mut self) {
        match self.cursor.clone() {
            Some(Selection::Group(prefix)) => self.set_expanded(&prefix, false),
            Some(Selection::Workload(id)) => {
                let parent = self
                    .groups
                    .iter()
                    .find(|g| !g.is_singleton() && g.contains(&id))
                    .map(|g| g.prefix.clone());
                if let Some(prefix) = parent {
                    self.cursor = Some(Selection::Group(prefix));
                    self.notify_if_changed();
                }
            }
            None => {}
        }
    }

    /// Enter: toggles the selected group. Does nothing on a workload row.
    pub fn toggle_selected(&mut self) {
        if let Some(Selection::Group(prefix)) = self.cursor.clone() {
            let expanded = self.group(&prefix).is_some_and(|g| g.expanded);
            self.set_expanded(&prefix, !expanded);
        }
    }

    /// Total and running workload counts.
    pub fn counts(&self) -> (usize, usize) {
        let running = self
            .workloads
            .values()
            .filter(|w| w.status.is_running())
            .count();
        (self.workloads.len(), running)
    }

    pub fn logs_for(&self, id: &str) -> Option<&LogBuffer> {
        self.logs.get(id)
    }

    pub fn history_for(&self, id: &str) -> Option<&WorkloadHistory> {
        self.history.get(id)
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// The error of the last failed cycle, cleared by the next success.
    pub fn stale(&self) -> Option<&str> {
        self.stale.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::logs::classify::classify;
    use crate::metrics::counters::{CounterPair, CounterSample};
    use crate::runtime::workload::WorkloadStatus;

    fn report(names: &[&str]) -> RefreshReport {
        RefreshReport {
            cycle: 1,
            workloads: names
                .iter()
                .map(|n| WorkloadSnapshot::new(format!("id-{n}"), *n, WorkloadStatus::Running))
                .collect(),
            logs: HashMap::new(),
            degraded: 0,
            fetched_at: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    fn targets(vm: &ViewModel) -> Vec<Selection> {
        vm.rows().iter().map(|r| r.target.clone()).collect()
    }

    fn workload(id: &str) -> Selection {
        Selection::Workload(id.to_string())
    }

    fn group(prefix: &str) -> Selection {
        Selection::Group(prefix.to_string())
    }

    #[test]
    fn first_row_is_selected_initially() {
        let mut vm = ViewModel::new(60, 100);
        vm.apply(report(&["svc-a-1", "svc-a-2", "svc-b-1"]));
        assert_eq!(targets(&vm), vec![group("svc-a"), workload("id-svc-b-1")]);
        assert_eq!(vm.selection(), Some(&group("svc-a")));
        assert!(vm.selected_workload().is_none());
    }

    #[test]
    fn selection_survives_reordering() {
        let mut vm = ViewModel::new(60, 100);
        vm.apply(report(&["alpha", "mid", "zulu"]));
        vm.move_selection(Direction::Down);
        assert_eq!(vm.selected_workload().unwrap().id, "id-mid");
        assert_eq!(vm.selected_index(), Some(1));

        vm.apply(report(&["aaa", "abc", "mid", "zulu"]));
        assert_eq!(vm.selected_workload().unwrap().id, "id-mid");
        assert_eq!(vm.selected_index(), Some(2));
    }

    #[test]
    fn vanished_selection_falls_back_to_first_row() {
        let mut vm = ViewModel::new(60, 100);
        vm.apply(report(&["alpha", "mid"]));
        vm.move_selection(Direction::Down);
        vm.apply(report(&["alpha", "zulu"]));
        assert_eq!(vm.selected_workload().unwrap().id, "id-alpha");
    }

    #[test]
    fn empty_list_clears_selection() {
        let mut vm = ViewModel::new(60, 100);
        vm.apply(report(&["alpha"]));
        vm.apply(report(&[]));
        assert!(vm.selection().is_none());
        assert!(vm.selected_workload().is_none());
        vm.move_selection(Direction::Down);
        assert!(vm.selection().is_none());
    }

    #[test]
    fn groups_expand_and_collapse() {
        let mut vm = ViewModel::new(60, 100);
        vm.apply(report(&["svc-a-1", "svc-a-2"]));
        vm.move_selection(Direction::Right);
        assert_eq!(
            targets(&vm),
            vec![group("svc-a"), workload("id-svc-a-1"), workload("id-svc-a-2")]
        );
        assert!(vm.rows()[1].nested);

        vm.move_selection(Direction::Down);
        vm.move_selection(Direction::Down);
        assert_eq!(vm.selected_workload().unwrap().name, "svc-a-2");

        // Left from a member jumps to its header, Left again collapses.
        vm.move_selection(Direction::Left);
        assert_eq!(vm.selection(), Some(&group("svc-a")));
        vm.move_selection(Direction::Left);
        assert_eq!(targets(&vm), vec![group("svc-a")]);

        vm.toggle_selected();
        assert_eq!(vm.rows().len(), 3);
        vm.toggle_selected();
        assert_eq!(vm.rows().len(), 1);
    }

    #[test]
    fn expanded_state_survives_refresh() {
        let mut vm = ViewModel::new(60, 100);
        vm.apply(report(&["svc-a-1", "svc-a-2"]));
        vm.expand_selected();
        vm.apply(report(&["svc-a-1", "svc-a-2"]));
        assert!(vm.group("svc-a").unwrap().expanded);
        assert_eq!(vm.rows().len(), 3);
    }

    #[test]
    fn selected_member_of_a_new_group_expands_it() {
        let mut vm = ViewModel::new(60, 100);
        vm.apply(report(&["web-1", "zeta"]));
        assert_eq!(vm.selected_workload().unwrap().name, "web-1");

        // A sibling appears; web-1 now lives in a collapsed "web" group.
        vm.apply(report(&["web-1", "web-2", "zeta"]));
        assert_eq!(vm.selected_workload().unwrap().name, "web-1");
        assert!(vm.group("web").unwrap().expanded);
    }

    #[test]
    fn listeners_fire_only_when_the_workload_changes() {
        let mut vm = ViewModel::new(60, 100);
        let seen: Rc<RefCell<Vec<Option<String>>>> = Rc::default();
        let sink = Rc::clone(&seen);
        vm.on_selection_changed(move |w| sink.borrow_mut().push(w.map(|w| w.name.clone())));

        vm.apply(report(&["alpha", "beta"]));
        vm.apply(report(&["alpha", "beta"]));
        vm.move_selection(Direction::Down);
        vm.move_selection(Direction::Down);
        vm.move_selection(Direction::Up);

        assert_eq!(
            *seen.borrow(),
            vec![
                Some("alpha".to_string()),
                Some("beta".to_string()),
                Some("alpha".to_string())
            ]
        );
    }

    #[test]
    fn logs_merge_across_refreshes_and_drop_with_workload() {
        let mut vm = ViewModel::new(60, 100);
        let lines = |raw: &[&str]| raw.iter().map(|r| classify(r)).collect::<Vec<_>>();

        let mut first = report(&["web"]);
        first.logs.insert("id-web".into(), lines(&["a", "b"]));
        vm.apply(first);
        let mut second = report(&["web"]);
        second.logs.insert("id-web".into(), lines(&["b", "c"]));
        vm.apply(second);

        let raw: Vec<&str> = vm
            .logs_for("id-web")
            .unwrap()
            .iter()
            .map(|l| l.raw.as_str())
            .collect();
        assert_eq!(raw, vec!["a", "b", "c"]);

        vm.apply(report(&["other"]));
        assert!(vm.logs_for("id-web").is_none());
    }

    #[test]
    fn history_records_counters() {
        let mut vm = ViewModel::new(60, 100);
        let mut r = report(&["web"]);
        r.workloads[0].counters = Some(CounterPair::first(CounterSample {
            memory_used: 50,
            memory_limit: 100,
            ..CounterSample::default()
        }));
        vm.apply(r);
        let history = vm.history_for("id-web").unwrap();
        assert_eq!(history.memory_points(), vec![5000]);
        assert_eq!(history.cpu_points(), vec![0]);
    }

    #[test]
    fn stale_marker_is_cleared_by_next_success() {
        let mut vm = ViewModel::new(60, 100);
        vm.apply(report(&["web"]));
        vm.mark_stale("cannot reach runtime");
        assert_eq!(vm.stale(), Some("cannot reach runtime"));
        assert_eq!(vm.counts(), (1, 1));
        vm.apply(report(&["web"]));
        assert!(vm.stale().is_none());
    }
}
