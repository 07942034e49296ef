pub mod counters;
pub mod history;
