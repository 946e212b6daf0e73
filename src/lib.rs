//! Reminder orchestration for shift tracking.
//! A reminder is shown as a live activity where the device supports one and falls back to a
//! scheduled notification everywhere else. Callers only deal with subject ids, the
//! [ReminderOrchestrator](reminder::orchestrator::ReminderOrchestrator) keeps track of what
//! delivers each reminder.
//!

pub mod activity;
pub mod capability;
pub mod cli;
pub mod config;
pub mod error;
pub mod notification;
pub mod providers;
pub mod reminder;
pub mod support;
pub mod utils;
