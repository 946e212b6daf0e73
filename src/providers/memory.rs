use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    activity::{ActivityAttributes, ActivityProvider, DismissalPolicy},
    notification::{
        NotificationPayload, NotificationProvider, NotificationTrigger, PermissionStatus,
        ScheduledNotification,
    },
    reminder::ReminderContent,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub attributes: ActivityAttributes,
    pub state: ReminderContent,
    pub ended: bool,
}

#[derive(Default)]
struct ActivityBook {
    activities: HashMap<String, ActivityRecord>,
    next_id: u64,
    failing_starts: u32,
    start_calls: u32,
}

/// Activity surface kept in memory.
#[derive(Default)]
pub struct InMemoryActivityProvider {
    book: Mutex<ActivityBook>,
}

impl InMemoryActivityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` start calls fail.
    pub fn failing_starts(mut self, count: u32) -> Self {
        self.book.get_mut().failing_starts = count;
        self
    }

    /// Drops every activity, like the surface does when the app gets restarted.
    pub async fn forget_all(&self) {
        self.book.lock().await.activities.clear();
    }

    pub async fn start_calls(&self) -> u32 {
        self.book.lock().await.start_calls
    }

    pub async fn activity(&self, id: &str) -> Option<ActivityRecord> {
        self.book.lock().await.activities.get(id).cloned()
    }

    /// Ids of activities that weren't ended yet.
    pub async fn running(&self) -> Vec<String> {
        let book = self.book.lock().await;
        let mut running = book
            .activities
            .iter()
            .filter(|(_, record)| !record.ended)
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        running.sort();
        running
    }
}

#[async_trait]
impl ActivityProvider for InMemoryActivityProvider {
    async fn start_activity(
        &self,
        attributes: &ActivityAttributes,
        state: &ReminderContent,
        _policy: DismissalPolicy,
    ) -> Result<String> {
        let mut book = self.book.lock().await;
        book.start_calls += 1;
        if book.failing_starts > 0 {
            book.failing_starts -= 1;
            return Err(anyhow!("activity surface refused to start"));
        }
        book.next_id += 1;
        let id = format!("activity-{}", book.next_id);
        book.activities.insert(
            id.clone(),
            ActivityRecord {
                attributes: attributes.clone(),
                state: state.clone(),
                ended: false,
            },
        );
        debug!("Started in-memory activity {id}");
        Ok(id)
    }

    async fn update_activity(&self, id: &str, state: &ReminderContent) -> Result<()> {
        let mut book = self.book.lock().await;
        match book.activities.get_mut(id) {
            Some(record) if !record.ended => {
                record.state = state.clone();
                Ok(())
            }
            _ => Err(anyhow!("unknown activity {id}")),
        }
    }

    async fn end_activity(&self, id: &str, final_state: Option<ReminderContent>) -> Result<()> {
        let mut book = self.book.lock().await;
        let record = book
            .activities
            .get_mut(id)
            .ok_or_else(|| anyhow!("unknown activity {id}"))?;
        if let Some(state) = final_state {
            record.state = state;
        }
        record.ended = true;
        Ok(())
    }

    async fn dismiss_activity(&self, id: &str, _policy: DismissalPolicy) -> Result<()> {
        self.book
            .lock()
            .await
            .activities
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("unknown activity {id}"))
    }
}

struct NotificationBook {
    scheduled: Vec<(ScheduledNotification, NotificationTrigger)>,
    permission: PermissionStatus,
    grant_on_request: bool,
    next_id: u64,
    failing_schedules: u32,
    schedule_calls: u32,
    permission_requests: u32,
    dismissed_all: u32,
}

/// Notification service kept in memory. Nothing is ever delivered, scheduled notifications stay
/// listed until cancelled.
pub struct InMemoryNotificationProvider {
    book: Mutex<NotificationBook>,
}

impl Default for InMemoryNotificationProvider {
    fn default() -> Self {
        Self {
            book: Mutex::new(NotificationBook {
                scheduled: vec![],
                permission: PermissionStatus::GRANTED,
                grant_on_request: true,
                next_id: 0,
                failing_schedules: 0,
                schedule_calls: 0,
                permission_requests: 0,
                dismissed_all: 0,
            }),
        }
    }
}

impl InMemoryNotificationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// `grant_on_request` decides the answer of the user if the permission gets requested.
    pub fn with_permission(mut self, permission: PermissionStatus, grant_on_request: bool) -> Self {
        let book = self.book.get_mut();
        book.permission = permission;
        book.grant_on_request = grant_on_request;
        self
    }

    /// Makes the next `count` schedule calls fail.
    pub fn failing_schedules(mut self, count: u32) -> Self {
        self.book.get_mut().failing_schedules = count;
        self
    }

    pub async fn fail_next_schedules(&self, count: u32) {
        self.book.lock().await.failing_schedules = count;
    }

    pub async fn schedule_calls(&self) -> u32 {
        self.book.lock().await.schedule_calls
    }

    pub async fn permission_requests(&self) -> u32 {
        self.book.lock().await.permission_requests
    }

    pub async fn dismissed_all(&self) -> u32 {
        self.book.lock().await.dismissed_all
    }

    pub async fn scheduled(&self) -> Vec<ScheduledNotification> {
        let book = self.book.lock().await;
        book.scheduled.iter().map(|(v, _)| v.clone()).collect()
    }

    pub async fn trigger_of(&self, id: &str) -> Option<NotificationTrigger> {
        let book = self.book.lock().await;
        book.scheduled
            .iter()
            .find(|(v, _)| v.id == id)
            .map(|(_, trigger)| *trigger)
    }
}

#[async_trait]
impl NotificationProvider for InMemoryNotificationProvider {
    async fn get_permissions(&self) -> Result<PermissionStatus> {
        Ok(self.book.lock().await.permission)
    }

    async fn request_permissions(&self) -> Result<PermissionStatus> {
        let mut book = self.book.lock().await;
        book.permission_requests += 1;
        if book.permission.can_ask_again && !book.permission.granted {
            book.permission = if book.grant_on_request {
                PermissionStatus::GRANTED
            } else {
                PermissionStatus::DENIED
            };
        }
        Ok(book.permission)
    }

    async fn schedule_notification(
        &self,
        content: &NotificationPayload,
        trigger: NotificationTrigger,
    ) -> Result<String> {
        let mut book = self.book.lock().await;
        book.schedule_calls += 1;
        if book.failing_schedules > 0 {
            book.failing_schedules -= 1;
            return Err(anyhow!("notification scheduler is busy"));
        }
        if !book.permission.granted {
            return Err(anyhow!("notifications aren't permitted"));
        }
        book.next_id += 1;
        let id = format!("notification-{}", book.next_id);
        book.scheduled.push((
            ScheduledNotification {
                id: id.clone(),
                payload: content.clone(),
            },
            trigger,
        ));
        Ok(id)
    }

    async fn cancel_scheduled_notification(&self, id: &str) -> Result<()> {
        let mut book = self.book.lock().await;
        let before = book.scheduled.len();
        book.scheduled.retain(|(v, _)| v.id != id);
        if book.scheduled.len() == before {
            return Err(anyhow!("unknown notification {id}"));
        }
        Ok(())
    }

    async fn get_all_scheduled(&self) -> Result<Vec<ScheduledNotification>> {
        Ok(self.scheduled().await)
    }

    async fn dismiss_all(&self) -> Result<()> {
        let mut book = self.book.lock().await;
        book.dismissed_all += 1;
        book.scheduled.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn denied_request_sticks() -> Result<()> {
        let provider = InMemoryNotificationProvider::new()
            .with_permission(PermissionStatus::UNDETERMINED, false);

        assert_eq!(provider.request_permissions().await?, PermissionStatus::DENIED);
        assert_eq!(provider.get_permissions().await?, PermissionStatus::DENIED);
        assert!(provider
            .schedule_notification(
                &NotificationPayload::for_subject("shift-1", "Shift", "Soon"),
                NotificationTrigger::Immediate,
            )
            .await
            .is_err());
        Ok(())
    }

    #[tokio::test]
    async fn forgotten_activities_reject_updates() -> Result<()> {
        let provider = InMemoryActivityProvider::new();
        let attributes = ActivityAttributes {
            subject_id: "shift-1".into(),
            title: "Shift".into(),
            scheduled_at: None,
        };
        let id = provider
            .start_activity(
                &attributes,
                &ReminderContent::new("Shift", "Soon"),
                DismissalPolicy::Default,
            )
            .await?;
        provider.forget_all().await;

        assert!(provider
            .update_activity(&id, &ReminderContent::new("Shift", "Now"))
            .await
            .is_err());
        assert!(provider.running().await.is_empty());
        Ok(())
    }
}
