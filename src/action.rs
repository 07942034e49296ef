use crate::runtime::lifecycle::LifecycleOp;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Quit,
    Navigate(Direction),
    /// Enter on a group header.
    Toggle,
    SelectTab(usize),
    NextTab,
    Lifecycle(LifecycleOp),
    Refresh,
    ToggleDetailPanel,
    CycleTheme,
    ToggleHelp,
    None,
}
