//! Reminder orchestration.
//!  The basic idea is:
//!   - Callers identify a logical reminder (a shift, a transaction) by a stable subject id.
//!   - A reminder is delivered through the first [strategy::DeliveryStrategy] that succeeds,
//!     normally a live activity first and a scheduled notification second.
//!   - [store::ReminderStore] binds each subject to at most one resource handle so that later
//!     updates and teardowns reach the right resource.

use std::{collections::BTreeMap, fmt::Display, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod orchestrator;
pub mod store;
pub mod strategy;

/// What a reminder shows. Used as the initial state of a live activity and as the content of a
/// notification.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReminderContent {
    pub title: String,
    pub body: String,
    pub amount: Option<f64>,
    /// Auxiliary display fields, e.g. location or expected end.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl ReminderContent {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_amount(self, amount: f64) -> Self {
        Self {
            amount: Some(amount),
            ..self
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// A request submitted by the caller. Requests are never mutated, updates produce a new request
/// through [ReminderRequest::with_content].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderRequest {
    pub subject_id: Arc<str>,
    pub content: ReminderContent,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl ReminderRequest {
    pub fn new(subject_id: impl Into<Arc<str>>, content: ReminderContent) -> Self {
        Self {
            subject_id: subject_id.into(),
            content,
            scheduled_at: None,
        }
    }

    pub fn scheduled_at(self, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            scheduled_at: Some(scheduled_at),
            ..self
        }
    }

    pub fn with_content(&self, content: ReminderContent) -> Self {
        Self {
            subject_id: self.subject_id.clone(),
            content,
            scheduled_at: self.scheduled_at,
        }
    }
}

/// Lifecycle of a reminder. Only `Pending` and `Active` reminders are tracked, an ended or failed
/// one is dropped from the orchestrator right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderState {
    /// Delivery is in flight, no handle is bound yet.
    Pending,
    Active,
    Ended,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    LiveActivity,
    Notification,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::LiveActivity => write!(f, "live-activity"),
            ResourceKind::Notification => write!(f, "notification"),
        }
    }
}

/// The underlying resource that currently delivers a reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "kebab-case")]
pub enum ResourceHandle {
    Activity(Arc<str>),
    Notification(Arc<str>),
}

impl ResourceHandle {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceHandle::Activity(_) => ResourceKind::LiveActivity,
            ResourceHandle::Notification(_) => ResourceKind::Notification,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ResourceHandle::Activity(id) | ResourceHandle::Notification(id) => id,
        }
    }
}

impl Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Snapshot of a bound reminder, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveReminder {
    pub subject_id: Arc<str>,
    pub handle: ResourceHandle,
    pub state: ReminderState,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
