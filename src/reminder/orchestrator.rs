use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    activity::ActivityGateway,
    capability::CapabilityProbe,
    config::ReminderConfig,
    error::ReminderError,
    notification::NotificationGateway,
    support::{SupportReporter, SupportStatus},
    utils::clock::Clock,
};

use super::{
    store::{ReminderEntry, ReminderStore},
    strategy::{ActivityStrategy, DeliveryStrategy, NotificationStrategy},
    ActiveReminder, ReminderContent, ReminderRequest, ReminderState, ResourceHandle,
    ResourceKind,
};

/// Successful outcome of [ReminderOrchestrator::start_reminder].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartedReminder {
    pub subject_id: Arc<str>,
    pub handle: ResourceHandle,
    /// The subject already had an active reminder, which was updated instead.
    pub updated: bool,
}

impl StartedReminder {
    pub fn kind(&self) -> ResourceKind {
        self.handle.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "handle", rename_all = "kebab-case")]
pub enum UpdateOutcome {
    /// The bound resource was updated in place.
    Updated(ResourceHandle),
    /// The bound resource couldn't be updated and was replaced by a new one.
    Rebound(ResourceHandle),
    /// Nothing was bound to the subject.
    NotBound,
}

#[derive(Debug)]
pub struct BatchItem {
    pub subject_id: Arc<str>,
    pub result: Result<UpdateOutcome, ReminderError>,
}

/// Per subject outcomes of a batch update. The batch itself never fails.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn failed(&self) -> impl Iterator<Item = &BatchItem> {
        self.items.iter().filter(|item| item.result.is_err())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Decides how each reminder gets delivered and keeps track of the resource delivering it.
///
/// Every entry point takes the lock of its subject for its whole duration, so operations on one
/// subject never interleave. Teardown paths (`end`, `cancel`) never fail: a reminder that can't be
/// torn down must not block the caller's own flow.
pub struct ReminderOrchestrator {
    strategies: Vec<Arc<dyn DeliveryStrategy>>,
    activity: Arc<ActivityGateway>,
    notifications: Arc<NotificationGateway>,
    support: SupportReporter,
    store: ReminderStore,
    clock: Arc<dyn Clock>,
}

impl ReminderOrchestrator {
    /// Creates an orchestrator trying a live activity first and a scheduled notification second.
    pub fn new(
        probe: Arc<CapabilityProbe>,
        activity: Arc<ActivityGateway>,
        notifications: Arc<NotificationGateway>,
        clock: Arc<dyn Clock>,
        config: &ReminderConfig,
    ) -> Self {
        let strategies: Vec<Arc<dyn DeliveryStrategy>> = vec![
            Arc::new(ActivityStrategy::new(probe.clone(), activity.clone())),
            Arc::new(NotificationStrategy::new(
                notifications.clone(),
                clock.clone(),
                config,
            )),
        ];
        let support = SupportReporter::new(probe, activity.clone(), notifications.clone());
        Self {
            strategies,
            activity,
            notifications,
            support,
            store: ReminderStore::new(),
            clock,
        }
    }

    /// Replaces the delivery strategies, tried in the given order.
    pub fn with_strategies(self, strategies: Vec<Arc<dyn DeliveryStrategy>>) -> Self {
        Self { strategies, ..self }
    }

    /// Starts a reminder for `request.subject_id`. A subject that already has an active reminder
    /// gets it revised with the new request instead, schedule included.
    ///
    /// Fails only if every strategy failed, in which case nothing stays bound to the subject.
    #[instrument(skip(self, request), fields(subject_id = %request.subject_id))]
    pub async fn start_reminder(
        &self,
        request: ReminderRequest,
    ) -> Result<StartedReminder, ReminderError> {
        let subject_id = request.subject_id.clone();
        let _guard = self.store.lock_subject(&subject_id).await;

        if let Some(entry) = self.store.get(&subject_id).await {
            debug!("Reminder is already active, updating it");
            let handle = self.revise(entry.handle, request).await?;
            return Ok(StartedReminder {
                subject_id,
                handle,
                updated: true,
            });
        }

        self.store
            .mark_pending(request.clone(), self.clock.time())
            .await;
        let handle = self.deliver(&request, |_| true).await?;
        info!("Reminder is active through {handle}");
        Ok(StartedReminder {
            subject_id,
            handle,
            updated: false,
        })
    }

    /// Pushes new content to the reminder of `subject_id`. Live activities are updated in place
    /// and restarted if the surface lost them, notifications are rescheduled.
    #[instrument(skip(self, content))]
    pub async fn update_reminder(
        &self,
        subject_id: &str,
        content: ReminderContent,
    ) -> Result<UpdateOutcome, ReminderError> {
        let subject_id: Arc<str> = subject_id.into();
        let _guard = self.store.lock_subject(&subject_id).await;

        let Some(entry) = self.store.get(&subject_id).await else {
            debug!("No reminder is bound, nothing to update");
            return Ok(UpdateOutcome::NotBound);
        };
        let previous = entry.handle.clone();
        let request = entry.request.with_content(content);
        let handle = self.revise(entry.handle, request).await?;
        if previous.as_ref() == Some(&handle) {
            Ok(UpdateOutcome::Updated(handle))
        } else {
            Ok(UpdateOutcome::Rebound(handle))
        }
    }

    /// Updates many subjects concurrently. A failing subject doesn't affect the others.
    pub async fn update_reminders(
        &self,
        updates: impl IntoIterator<Item = (Arc<str>, ReminderContent)>,
    ) -> BatchReport {
        let items = join_all(updates.into_iter().map(|(subject_id, content)| async move {
            let result = self.update_reminder(&subject_id, content).await;
            if let Err(e) = &result {
                warn!("Batch update of {subject_id} failed: {e}");
            }
            BatchItem { subject_id, result }
        }))
        .await;
        BatchReport { items }
    }

    /// Ends the reminder of `subject_id`. Besides releasing the bound resource this cancels every
    /// notification still correlated to the subject, which covers handles lost on a restart.
    #[instrument(skip(self))]
    pub async fn end_reminder(&self, subject_id: &str) {
        let subject_id: Arc<str> = subject_id.into();
        let _guard = self.store.lock_subject(&subject_id).await;

        if let Some(entry) = self.store.remove(&subject_id).await {
            self.release(entry).await;
        }
        let dismissed = self.notifications.dismiss_subject(&subject_id).await;
        if dismissed > 0 {
            debug!("Dismissed {dismissed} leftover notification(s)");
        }
        debug!("Reminder ended");
    }

    /// Cancels the reminder of `subject_id` before it became relevant. Returns the released
    /// handle, or `None` if nothing was bound.
    #[instrument(skip(self))]
    pub async fn cancel_reminder(&self, subject_id: &str) -> Option<ResourceHandle> {
        let subject_id: Arc<str> = subject_id.into();
        let _guard = self.store.lock_subject(&subject_id).await;

        let Some(entry) = self.store.remove(&subject_id).await else {
            debug!("No reminder is bound, nothing to cancel");
            return None;
        };
        let handle = entry.handle.clone();
        self.release(entry).await;
        self.notifications.dismiss_subject(&subject_id).await;
        handle
    }

    /// Ends every bound reminder and clears all delivered notifications. Returns how many
    /// reminders were ended.
    pub async fn end_all_reminders(&self) -> usize {
        let subjects = self.store.subjects().await;
        for subject_id in &subjects {
            self.end_reminder(subject_id).await;
        }
        self.notifications.dismiss_all().await;
        info!("Ended {} reminder(s)", subjects.len());
        subjects.len()
    }

    pub async fn get_active_reminders(&self) -> Vec<ActiveReminder> {
        self.store.active().await
    }

    pub async fn state_of(&self, subject_id: &str) -> Option<ReminderState> {
        self.store.get(subject_id).await.map(|entry| entry.state)
    }

    pub async fn get_support_status(&self) -> SupportStatus {
        self.support.status().await
    }

    pub fn support(&self) -> &SupportReporter {
        &self.support
    }

    /// Tries the strategies accepted by `filter` in order. The first handle gets bound to the
    /// subject; if none succeeds the subject is left unbound.
    async fn deliver(
        &self,
        request: &ReminderRequest,
        filter: impl Fn(&dyn DeliveryStrategy) -> bool,
    ) -> Result<ResourceHandle, ReminderError> {
        let mut last_error = None;
        for strategy in &self.strategies {
            if !filter(&**strategy) {
                continue;
            }
            match strategy.deliver(request).await {
                Ok(handle) => {
                    self.store
                        .bind(request.clone(), handle.clone(), self.clock.time())
                        .await;
                    return Ok(handle);
                }
                Err(e) if e.is_capability_unavailable() => {
                    debug!("{} isn't available, falling back", strategy.kind());
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!("Delivering through {} failed: {e}", strategy.kind());
                    last_error = Some(e);
                }
            }
        }

        self.store.remove(&request.subject_id).await;
        let error = match last_error {
            Some(last) => ReminderError::Exhausted {
                subject_id: request.subject_id.to_string(),
                last: Box::new(last),
            },
            None => ReminderError::NoStrategies,
        };
        error!("Reminder {} failed: {error}", request.subject_id);
        Err(error)
    }

    /// Moves the resource bound through `handle` over to `request`.
    async fn revise(
        &self,
        handle: Option<ResourceHandle>,
        request: ReminderRequest,
    ) -> Result<ResourceHandle, ReminderError> {
        match handle {
            Some(ResourceHandle::Activity(id)) => {
                match self.activity.update(&id, &request.content).await {
                    Ok(()) => {
                        let handle = ResourceHandle::Activity(id);
                        self.store
                            .bind(request, handle.clone(), self.clock.time())
                            .await;
                        Ok(handle)
                    }
                    Err(e) => {
                        warn!("Activity {id} couldn't be updated, starting a new one: {e}");
                        self.activity.dismiss(&id).await;
                        self.deliver(&request, |_| true).await
                    }
                }
            }
            Some(ResourceHandle::Notification(id)) => {
                // Scheduled notifications can't change, they get replaced.
                self.notifications.cancel(&id).await;
                self.deliver(&request, |s| s.kind() == ResourceKind::Notification)
                    .await
            }
            None => self.deliver(&request, |_| true).await,
        }
    }

    async fn release(&self, entry: ReminderEntry) {
        match entry.handle {
            Some(ResourceHandle::Activity(id)) => {
                self.activity.end(&id, Some(entry.request.content)).await
            }
            Some(ResourceHandle::Notification(id)) => self.notifications.cancel(&id).await,
            None => {}
        }
    }
}
