use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use tracing::debug;

use crate::{
    activity::{ActivityAttributes, ActivityGateway},
    capability::CapabilityProbe,
    config::ReminderConfig,
    error::{ActivityError, NotificationError, ReminderError},
    notification::{NotificationGateway, NotificationPayload, NotificationTrigger},
    utils::clock::Clock,
};

use super::{ReminderRequest, ResourceHandle, ResourceKind};

/// One way of delivering a reminder. The orchestrator tries its strategies in order and keeps the
/// first handle it gets.
#[async_trait]
pub trait DeliveryStrategy: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn deliver(&self, request: &ReminderRequest) -> Result<ResourceHandle, ReminderError>;
}

pub struct ActivityStrategy {
    probe: Arc<CapabilityProbe>,
    gateway: Arc<ActivityGateway>,
}

impl ActivityStrategy {
    pub fn new(probe: Arc<CapabilityProbe>, gateway: Arc<ActivityGateway>) -> Self {
        Self { probe, gateway }
    }
}

#[async_trait]
impl DeliveryStrategy for ActivityStrategy {
    fn kind(&self) -> ResourceKind {
        ResourceKind::LiveActivity
    }

    async fn deliver(&self, request: &ReminderRequest) -> Result<ResourceHandle, ReminderError> {
        if !self.probe.supports_rich_activity() {
            return Err(ActivityError::CapabilityUnavailable.into());
        }
        let attributes = ActivityAttributes {
            subject_id: request.subject_id.clone(),
            title: request.content.title.clone(),
            scheduled_at: request.scheduled_at,
        };
        let id = self.gateway.start(&attributes, &request.content).await?;
        Ok(ResourceHandle::Activity(id.into()))
    }
}

pub struct NotificationStrategy {
    gateway: Arc<NotificationGateway>,
    clock: Arc<dyn Clock>,
    lead_time: Duration,
    min_trigger: Duration,
}

impl NotificationStrategy {
    pub fn new(
        gateway: Arc<NotificationGateway>,
        clock: Arc<dyn Clock>,
        config: &ReminderConfig,
    ) -> Self {
        Self {
            gateway,
            clock,
            lead_time: config.lead_time(),
            min_trigger: config.min_trigger(),
        }
    }
}

#[async_trait]
impl DeliveryStrategy for NotificationStrategy {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Notification
    }

    async fn deliver(&self, request: &ReminderRequest) -> Result<ResourceHandle, ReminderError> {
        if !self.gateway.ensure_permission().await? {
            return Err(NotificationError::PermissionDenied.into());
        }
        let trigger = compute_trigger(
            request.scheduled_at,
            self.lead_time,
            self.clock.time(),
            self.min_trigger,
        );
        debug!("Notification for {} uses {trigger:?}", request.subject_id);
        let id = self
            .gateway
            .schedule(&notification_payload(request), trigger)
            .await?;
        Ok(ResourceHandle::Notification(id.into()))
    }
}

/// A reminder fires `lead_time` before `scheduled_at`. Moments that already passed collapse to
/// `minimum`, as do lead times reaching past the representable range. Reminders without a
/// schedule fire immediately.
pub fn compute_trigger(
    scheduled_at: Option<DateTime<Utc>>,
    lead_time: Duration,
    now: DateTime<Utc>,
    minimum: Duration,
) -> NotificationTrigger {
    let Some(scheduled_at) = scheduled_at else {
        return NotificationTrigger::Immediate;
    };
    let delay = TimeDelta::from_std(lead_time)
        .ok()
        .and_then(|lead_time| scheduled_at.checked_sub_signed(lead_time))
        .and_then(|fires_at| (fires_at - now).to_std().ok())
        .unwrap_or(Duration::ZERO);
    NotificationTrigger::After(delay).clamped(minimum)
}

/// Every payload carries the subject id, otherwise lost handles can't be found again.
pub fn notification_payload(request: &ReminderRequest) -> NotificationPayload {
    let content = &request.content;
    let mut payload =
        NotificationPayload::for_subject(&request.subject_id, &content.title, &content.body);
    if let Some(amount) = content.amount {
        payload = payload.with_data("amount", amount);
    }
    if let Some(scheduled_at) = request.scheduled_at {
        payload = payload.with_data("scheduledAt", scheduled_at.to_rfc3339());
    }
    for (key, value) in &content.fields {
        payload = payload.with_data(key.clone(), Value::String(value.clone()));
    }
    payload
}
