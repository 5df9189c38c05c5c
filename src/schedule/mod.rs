// src/schedule/mod.rs

//! Cron-like scheduling: rule parsing, pure evaluation, and the tick task.

pub mod eval;
pub mod rule;
pub mod tick;

pub use eval::{FireTable, TickWindow};
pub use rule::{ScheduleParseError, ScheduleRule};
pub use tick::{FireRecordStore, Scheduler};
