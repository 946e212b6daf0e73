use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ActiveReminder, ReminderRequest, ReminderState, ResourceHandle};

#[derive(Debug, Clone)]
pub struct ReminderEntry {
    pub request: ReminderRequest,
    pub state: ReminderState,
    /// Only `None` while the entry is [ReminderState::Pending].
    pub handle: Option<ResourceHandle>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Held for the whole duration of an operation on one subject.
pub type SubjectGuard = OwnedMutexGuard<()>;

/// Binds subject ids to the resource currently delivering their reminder. Each orchestrator owns
/// its own store, nothing here is global.
#[derive(Default)]
pub struct ReminderStore {
    entries: Mutex<HashMap<Arc<str>, ReminderEntry>>,
    locks: Mutex<HashMap<Arc<str>, Arc<Mutex<()>>>>,
}

impl ReminderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes operations on a single subject. Operations on different subjects don't wait
    /// for each other.
    pub async fn lock_subject(&self, subject_id: &Arc<str>) -> SubjectGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Locks nobody holds or waits for can go.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(subject_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub async fn get(&self, subject_id: &str) -> Option<ReminderEntry> {
        self.entries.lock().await.get(subject_id).cloned()
    }

    pub async fn mark_pending(&self, request: ReminderRequest, now: DateTime<Utc>) {
        self.entries.lock().await.insert(
            request.subject_id.clone(),
            ReminderEntry {
                request,
                state: ReminderState::Pending,
                handle: None,
                started_at: now,
                updated_at: now,
            },
        );
    }

    /// Replaces whatever was bound to the subject, so a subject never holds two handles.
    pub async fn bind(&self, request: ReminderRequest, handle: ResourceHandle, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().await;
        let started_at = entries
            .get(&request.subject_id)
            .map_or(now, |entry| entry.started_at);
        entries.insert(
            request.subject_id.clone(),
            ReminderEntry {
                request,
                state: ReminderState::Active,
                handle: Some(handle),
                started_at,
                updated_at: now,
            },
        );
    }

    pub async fn remove(&self, subject_id: &str) -> Option<ReminderEntry> {
        self.entries.lock().await.remove(subject_id)
    }

    pub async fn subjects(&self) -> Vec<Arc<str>> {
        self.entries.lock().await.keys().cloned().collect()
    }

    /// Snapshots of every active reminder, sorted by subject id.
    pub async fn active(&self) -> Vec<ActiveReminder> {
        let entries = self.entries.lock().await;
        let mut active = entries
            .values()
            .filter_map(|entry| {
                let handle = entry.handle.clone()?;
                (entry.state == ReminderState::Active).then(|| ActiveReminder {
                    subject_id: entry.request.subject_id.clone(),
                    handle,
                    state: entry.state,
                    started_at: entry.started_at,
                    updated_at: entry.updated_at,
                })
            })
            .collect::<Vec<_>>();
        active.sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
        active
    }
}
