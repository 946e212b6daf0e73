//! Facade over the rich activity surface. The surface lives outside of the process and may not
//! exist at all, so it is resolved through an [ActivityFactory] on every call.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::{error::ActivityError, reminder::ReminderContent};

/// Static part of an activity. Unlike [ReminderContent] it can't change once started.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityAttributes {
    pub subject_id: Arc<str>,
    pub title: String,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// When the surface should remove an ended activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DismissalPolicy {
    Default,
    Immediate,
    After(DateTime<Utc>),
}

/// Contract of the native activity module.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ActivityProvider: Send + Sync {
    async fn start_activity(
        &self,
        attributes: &ActivityAttributes,
        state: &ReminderContent,
        policy: DismissalPolicy,
    ) -> Result<String>;

    async fn update_activity(&self, id: &str, state: &ReminderContent) -> Result<()>;

    async fn end_activity(&self, id: &str, final_state: Option<ReminderContent>) -> Result<()>;

    async fn dismiss_activity(&self, id: &str, policy: DismissalPolicy) -> Result<()>;
}

/// Loads the native activity module. `None` means the module isn't available in this runtime.
pub type ActivityFactory = Arc<dyn Fn() -> Option<Arc<dyn ActivityProvider>> + Send + Sync>;

pub struct ActivityGateway {
    factory: ActivityFactory,
}

impl ActivityGateway {
    pub fn new(factory: ActivityFactory) -> Self {
        Self { factory }
    }

    pub fn with_provider(provider: Arc<dyn ActivityProvider>) -> Self {
        Self::new(Arc::new(move || Some(provider.clone())))
    }

    /// Gateway for runtimes without any activity module.
    pub fn unavailable() -> Self {
        Self::new(Arc::new(|| -> Option<Arc<dyn ActivityProvider>> { None }))
    }

    pub fn is_present(&self) -> bool {
        (self.factory)().is_some()
    }

    fn resolve(&self) -> Result<Arc<dyn ActivityProvider>, ActivityError> {
        (self.factory)().ok_or(ActivityError::CapabilityUnavailable)
    }

    #[instrument(skip(self, state), fields(subject_id = %attributes.subject_id))]
    pub async fn start(
        &self,
        attributes: &ActivityAttributes,
        state: &ReminderContent,
    ) -> Result<String, ActivityError> {
        let provider = self.resolve()?;
        let id = provider
            .start_activity(attributes, state, DismissalPolicy::Default)
            .await
            .map_err(|e| ActivityError::native("start", e))?;
        debug!("Started activity {id}");
        Ok(id)
    }

    /// Fails if the surface no longer knows `id`, for example after a restart. Starting a new
    /// activity is the way to recover.
    #[instrument(skip(self, state))]
    pub async fn update(&self, id: &str, state: &ReminderContent) -> Result<(), ActivityError> {
        let provider = self.resolve()?;
        provider
            .update_activity(id, state)
            .await
            .map_err(|e| ActivityError::native("update", e))
    }

    /// Ending an unknown or already ended activity only gets logged.
    #[instrument(skip(self, final_state))]
    pub async fn end(&self, id: &str, final_state: Option<ReminderContent>) {
        let provider = match self.resolve() {
            Ok(provider) => provider,
            Err(e) => {
                warn!("Can't end activity {id}: {e}");
                return;
            }
        };
        if let Err(e) = provider.end_activity(id, final_state).await {
            warn!("Ending activity {id} failed: {e:?}");
        }
    }

    /// Same contract as [ActivityGateway::end].
    #[instrument(skip(self))]
    pub async fn dismiss(&self, id: &str) {
        let provider = match self.resolve() {
            Ok(provider) => provider,
            Err(e) => {
                warn!("Can't dismiss activity {id}: {e}");
                return;
            }
        };
        if let Err(e) = provider
            .dismiss_activity(id, DismissalPolicy::Immediate)
            .await
        {
            warn!("Dismissing activity {id} failed: {e:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use mockall::predicate::eq;

    use super::*;
    use crate::utils::logging::TEST_LOGGING;

    fn attributes() -> ActivityAttributes {
        ActivityAttributes {
            subject_id: "shift-42".into(),
            title: "Shift".into(),
            scheduled_at: None,
        }
    }

    #[tokio::test]
    async fn missing_module_is_capability_unavailable() {
        *TEST_LOGGING;
        let gateway = ActivityGateway::unavailable();

        let result = gateway
            .start(&attributes(), &ReminderContent::new("Shift", "Soon"))
            .await;

        assert!(matches!(result, Err(ActivityError::CapabilityUnavailable)));
        assert!(!gateway.is_present());
    }

    #[tokio::test]
    async fn native_failures_are_activity_errors() {
        let mut provider = MockActivityProvider::new();
        provider
            .expect_start_activity()
            .times(1)
            .returning(|_, _, _| Err(anyhow!("surface crashed")));
        provider
            .expect_update_activity()
            .times(1)
            .returning(|_, _| Err(anyhow!("unknown activity")));
        let gateway = ActivityGateway::with_provider(Arc::new(provider));

        let started = gateway
            .start(&attributes(), &ReminderContent::new("Shift", "Soon"))
            .await;
        let updated = gateway
            .update("stale", &ReminderContent::new("Shift", "Now"))
            .await;

        assert!(matches!(
            started,
            Err(ActivityError::Native {
                operation: "start",
                ..
            })
        ));
        assert!(matches!(
            updated,
            Err(ActivityError::Native {
                operation: "update",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn end_and_dismiss_swallow_failures() {
        let mut provider = MockActivityProvider::new();
        provider
            .expect_end_activity()
            .with(eq("gone"), eq(None))
            .times(2)
            .returning(|_, _| Err(anyhow!("no such activity")));
        provider
            .expect_dismiss_activity()
            .with(eq("gone"), eq(DismissalPolicy::Immediate))
            .times(1)
            .returning(|_, _| Err(anyhow!("no such activity")));
        let gateway = ActivityGateway::with_provider(Arc::new(provider));

        gateway.end("gone", None).await;
        gateway.end("gone", None).await;
        gateway.dismiss("gone").await;
        ActivityGateway::unavailable().end("gone", None).await;
    }
}
