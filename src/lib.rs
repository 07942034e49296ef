pub mod action;
pub mod app;
pub mod config;
pub mod event;
pub mod format;
pub mod grouping;
pub mod logging;
pub mod logs;
pub mod metrics;
pub mod refresh;
pub mod runtime;
pub mod ui;
pub mod view_model;
