//! Retryable facade over the scheduled notification service.
//!
//! Scheduled notifications are correlated to subjects only through [SUBJECT_ID_KEY] embedded in
//! their payload data. There is no separate index, so every payload scheduled for a reminder
//! must carry it.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::{ReminderConfig, MIN_TRIGGER},
    error::NotificationError,
    utils::clock::Clock,
};

/// Payload data field holding the subject id of a reminder.
pub const SUBJECT_ID_KEY: &str = "subjectId";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionStatus {
    pub granted: bool,
    /// False once the user permanently denied the permission.
    pub can_ask_again: bool,
}

impl PermissionStatus {
    pub const GRANTED: PermissionStatus = PermissionStatus {
        granted: true,
        can_ask_again: true,
    };
    pub const UNDETERMINED: PermissionStatus = PermissionStatus {
        granted: false,
        can_ask_again: true,
    };
    pub const DENIED: PermissionStatus = PermissionStatus {
        granted: false,
        can_ask_again: false,
    };
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub data: Map<String, Value>,
}

impl NotificationPayload {
    pub fn for_subject(subject_id: &str, title: impl Into<String>, body: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert(SUBJECT_ID_KEY.into(), Value::String(subject_id.into()));
        Self {
            title: title.into(),
            body: body.into(),
            data,
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.data.get(SUBJECT_ID_KEY).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationTrigger {
    Immediate,
    After(Duration),
}

impl NotificationTrigger {
    /// Collapses delays shorter than `minimum` to `minimum`, so the scheduler never sees a zero
    /// or negative delay.
    pub fn clamped(self, minimum: Duration) -> Self {
        match self {
            NotificationTrigger::After(delay) => NotificationTrigger::After(delay.max(minimum)),
            immediate => immediate,
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        match self {
            NotificationTrigger::Immediate => None,
            NotificationTrigger::After(delay) => Some(*delay),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    pub id: String,
    pub payload: NotificationPayload,
}

/// Contract of the platform notification service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    async fn get_permissions(&self) -> Result<PermissionStatus>;

    async fn request_permissions(&self) -> Result<PermissionStatus>;

    async fn schedule_notification(
        &self,
        content: &NotificationPayload,
        trigger: NotificationTrigger,
    ) -> Result<String>;

    async fn cancel_scheduled_notification(&self, id: &str) -> Result<()>;

    async fn get_all_scheduled(&self) -> Result<Vec<ScheduledNotification>>;

    async fn dismiss_all(&self) -> Result<()>;
}

pub struct NotificationGateway {
    provider: Arc<dyn NotificationProvider>,
    clock: Arc<dyn Clock>,
    retries: u32,
    retry_delay: Duration,
    min_trigger: Duration,
    prompted: AtomicBool,
}

impl NotificationGateway {
    pub fn new(
        provider: Arc<dyn NotificationProvider>,
        clock: Arc<dyn Clock>,
        config: &ReminderConfig,
    ) -> Self {
        Self {
            provider,
            clock,
            retries: config.schedule_retries,
            retry_delay: config.retry_delay(),
            min_trigger: config.min_trigger(),
            prompted: AtomicBool::new(false),
        }
    }

    /// Current permission without prompting the user.
    pub async fn permission_status(&self) -> Result<PermissionStatus, NotificationError> {
        self.provider
            .get_permissions()
            .await
            .map_err(|e| NotificationError::provider("get permissions", 1, e))
    }

    /// Asks for the permission at most once per gateway, and only if the user hasn't denied it
    /// before. A prompt dismissed without an answer isn't shown again.
    #[instrument(skip(self))]
    pub async fn ensure_permission(&self) -> Result<bool, NotificationError> {
        let status = self.permission_status().await?;
        if status.granted {
            return Ok(true);
        }
        if !status.can_ask_again {
            debug!("Notification permission was denied before, not asking again");
            return Ok(false);
        }
        if self.prompted.swap(true, Ordering::SeqCst) {
            debug!("Notification permission was already requested");
            return Ok(false);
        }
        let status = self
            .provider
            .request_permissions()
            .await
            .map_err(|e| NotificationError::provider("request permissions", 1, e))?;
        info!("Requested notification permission, granted: {}", status.granted);
        Ok(status.granted)
    }

    /// Schedules a notification. A failed attempt is retried after a fixed delay, by default once
    /// after one second, because the scheduler is often busy right after a permission grant.
    #[instrument(skip(self, payload), fields(subject_id = payload.subject_id()))]
    pub async fn schedule(
        &self,
        payload: &NotificationPayload,
        trigger: NotificationTrigger,
    ) -> Result<String, NotificationError> {
        let trigger = trigger.clamped(self.min_trigger.max(MIN_TRIGGER));
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.schedule_notification(payload, trigger).await {
                Ok(id) => {
                    debug!("Scheduled notification {id} with {trigger:?}");
                    return Ok(id);
                }
                Err(e) if attempt <= self.retries => {
                    warn!("Scheduling attempt {attempt} failed, retrying: {e:?}");
                    self.clock.sleep(self.retry_delay).await;
                }
                Err(e) => return Err(NotificationError::provider("schedule", attempt, e)),
            }
        }
    }

    /// Cancelling an unknown notification only gets logged.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: &str) {
        if let Err(e) = self.provider.cancel_scheduled_notification(id).await {
            warn!("Cancelling notification {id} failed: {e:?}");
        }
    }

    pub async fn list_by_subject(&self, subject_id: &str) -> Result<Vec<String>, NotificationError> {
        let scheduled = self
            .provider
            .get_all_scheduled()
            .await
            .map_err(|e| NotificationError::provider("list", 1, e))?;
        Ok(scheduled
            .into_iter()
            .filter(|v| v.payload.subject_id() == Some(subject_id))
            .map(|v| v.id)
            .collect())
    }

    /// Cancels everything scheduled for `subject_id`, including notifications whose handle was
    /// lost. Returns how many were cancelled.
    #[instrument(skip(self))]
    pub async fn dismiss_subject(&self, subject_id: &str) -> usize {
        let ids = match self.list_by_subject(subject_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Couldn't list notifications of {subject_id}: {e}");
                return 0;
            }
        };
        for id in &ids {
            self.cancel(id).await;
        }
        ids.len()
    }

    pub async fn dismiss_all(&self) {
        if let Err(e) = self.provider.dismiss_all().await {
            warn!("Dismissing all notifications failed: {e:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use chrono::{TimeZone, Utc};
    use mockall::{predicate::eq, Sequence};

    use super::*;
    use crate::utils::{clock::AnchoredClock, logging::TEST_LOGGING};

    fn gateway(provider: MockNotificationProvider) -> NotificationGateway {
        let clock = AnchoredClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
        NotificationGateway::new(
            Arc::new(provider),
            Arc::new(clock),
            &ReminderConfig::default(),
        )
    }

    fn payload(subject_id: &str) -> NotificationPayload {
        NotificationPayload::for_subject(subject_id, "Shift", "Ends soon")
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_retries_once_after_a_second() -> Result<()> {
        *TEST_LOGGING;
        let mut provider = MockNotificationProvider::new();
        let mut sequence = Sequence::new();
        provider
            .expect_schedule_notification()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| Err(anyhow!("scheduler busy")));
        provider
            .expect_schedule_notification()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| Ok("n-1".into()));
        let gateway = gateway(provider);

        let started = tokio::time::Instant::now();
        let id = gateway
            .schedule(&payload("shift-1"), NotificationTrigger::Immediate)
            .await?;

        assert_eq!(id, "n-1");
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(started.elapsed() < Duration::from_secs(2));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_gives_up_after_the_retry() {
        let mut provider = MockNotificationProvider::new();
        provider
            .expect_schedule_notification()
            .times(2)
            .returning(|_, _| Err(anyhow!("scheduler busy")));
        let gateway = gateway(provider);

        let result = gateway
            .schedule(&payload("shift-1"), NotificationTrigger::Immediate)
            .await;

        assert!(matches!(
            result,
            Err(NotificationError::Provider {
                operation: "schedule",
                attempts: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn short_delays_are_clamped() -> Result<()> {
        let mut provider = MockNotificationProvider::new();
        provider
            .expect_schedule_notification()
            .with(
                mockall::predicate::always(),
                eq(NotificationTrigger::After(Duration::from_secs(1))),
            )
            .times(1)
            .returning(|_, _| Ok("n-1".into()));
        let gateway = gateway(provider);

        gateway
            .schedule(
                &payload("shift-1"),
                NotificationTrigger::After(Duration::ZERO),
            )
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn permission_is_requested_only_when_undetermined() -> Result<()> {
        let mut undetermined = MockNotificationProvider::new();
        undetermined
            .expect_get_permissions()
            .returning(|| Ok(PermissionStatus::UNDETERMINED));
        undetermined
            .expect_request_permissions()
            .times(1)
            .returning(|| Ok(PermissionStatus::GRANTED));
        assert!(gateway(undetermined).ensure_permission().await?);

        let mut denied = MockNotificationProvider::new();
        denied
            .expect_get_permissions()
            .returning(|| Ok(PermissionStatus::DENIED));
        denied.expect_request_permissions().never();
        assert!(!gateway(denied).ensure_permission().await?);

        let mut granted = MockNotificationProvider::new();
        granted
            .expect_get_permissions()
            .returning(|| Ok(PermissionStatus::GRANTED));
        granted.expect_request_permissions().never();
        assert!(gateway(granted).ensure_permission().await?);
        Ok(())
    }

    #[tokio::test]
    async fn dismissed_prompt_is_not_shown_again() -> Result<()> {
        let mut provider = MockNotificationProvider::new();
        provider
            .expect_get_permissions()
            .times(3)
            .returning(|| Ok(PermissionStatus::UNDETERMINED));
        provider
            .expect_request_permissions()
            .times(1)
            .returning(|| Ok(PermissionStatus::UNDETERMINED));
        let gateway = gateway(provider);

        for _ in 0..3 {
            assert!(!gateway.ensure_permission().await?);
        }
        Ok(())
    }

    #[tokio::test]
    async fn subject_listing_filters_by_payload() -> Result<()> {
        let mut provider = MockNotificationProvider::new();
        provider.expect_get_all_scheduled().returning(|| {
            Ok(vec![
                ScheduledNotification {
                    id: "a".into(),
                    payload: payload("shift-1"),
                },
                ScheduledNotification {
                    id: "b".into(),
                    payload: payload("shift-2"),
                },
                ScheduledNotification {
                    id: "c".into(),
                    payload: NotificationPayload::default(),
                },
                ScheduledNotification {
                    id: "d".into(),
                    payload: payload("shift-1"),
                },
            ])
        });
        provider
            .expect_cancel_scheduled_notification()
            .times(2)
            .returning(|_| Ok(()));
        let gateway = gateway(provider);

        assert_eq!(gateway.list_by_subject("shift-1").await?, vec!["a", "d"]);
        assert_eq!(gateway.dismiss_subject("shift-1").await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn cancel_swallows_failures() {
        let mut provider = MockNotificationProvider::new();
        provider
            .expect_cancel_scheduled_notification()
            .with(eq("missing"))
            .times(1)
            .returning(|_| Err(anyhow!("not found")));
        gateway(provider).cancel("missing").await;
    }
}
