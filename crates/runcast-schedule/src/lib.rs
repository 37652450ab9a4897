//! `runcast-schedule`: the backend-independent schedule model.
//!
//! # Overview
//!
//! A [`ScheduledTask`] pairs an [`Action`] (what to run) with a [`Trigger`]
//! (when to run it) and names the [`BackendKind`] it is projected onto.
//! The [`cron`] module converts calendar triggers to and from five-field cron
//! text; [`store::TaskStore`] persists the task list and execution history
//! in SQLite.
//!
//! # Trigger variants
//!
//! | Variant     | Payload             |
//! |-------------|---------------------|
//! | `Calendar`  | [`CalendarSchedule`] |
//! | `Interval`  | seconds             |
//! | `AtLogin`   | n/a                 |
//! | `AtStartup` | n/a                 |
//! | `OnDemand`  | n/a                 |

pub mod cron;
pub mod db;
pub mod error;
pub mod store;
pub mod types;
pub mod validation;

pub use cron::CronExpression;
pub use error::{Result, ScheduleError};
pub use store::TaskStore;
pub use types::{
    Action, ActionKind, BackendKind, CalendarSchedule, ExecutionResult, ScheduledTask, TaskId,
    TaskStatus, Trigger, VmInfo,
};
