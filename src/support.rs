//! Startup diagnostics: which reminder surfaces the device can use right now.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    activity::ActivityGateway,
    capability::{CapabilityProbe, PlatformIdentity},
    notification::{NotificationGateway, PermissionStatus},
};

/// Computed on every query, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SupportStatus {
    pub activity_supported: bool,
    pub notifications_supported: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportReport {
    pub status: SupportStatus,
    pub platform: PlatformIdentity,
    pub activity_module_present: bool,
    /// `None` if the permission couldn't be read.
    pub permission: Option<PermissionStatus>,
}

pub struct SupportReporter {
    probe: Arc<CapabilityProbe>,
    activity: Arc<ActivityGateway>,
    notifications: Arc<NotificationGateway>,
}

impl SupportReporter {
    pub fn new(
        probe: Arc<CapabilityProbe>,
        activity: Arc<ActivityGateway>,
        notifications: Arc<NotificationGateway>,
    ) -> Self {
        Self {
            probe,
            activity,
            notifications,
        }
    }

    pub async fn report(&self) -> SupportReport {
        let activity_module_present = self.activity.is_present();
        let permission = self
            .notifications
            .permission_status()
            .await
            .inspect_err(|e| warn!("Couldn't read notification permission: {e}"))
            .ok();
        // Permissions that can still be requested count as supported.
        let notifications_supported = permission
            .map(|permission| permission.granted || permission.can_ask_again)
            .unwrap_or(false);
        SupportReport {
            status: SupportStatus {
                activity_supported: activity_module_present && self.probe.supports_rich_activity(),
                notifications_supported,
            },
            platform: self.probe.platform().clone(),
            activity_module_present,
            permission,
        }
    }

    pub async fn status(&self) -> SupportStatus {
        self.report().await.status
    }

    /// Writes the report to the log. Meant to be called once on startup.
    pub async fn log_report(&self) -> SupportReport {
        let report = self.report().await;
        info!(
            platform = %report.platform.family,
            version = report.platform.version.as_deref().unwrap_or("unknown"),
            activity = report.status.activity_supported,
            notifications = report.status.notifications_supported,
            "Reminder support"
        );
        if !report.status.notifications_supported {
            warn!("Notifications are unavailable, reminders can't be delivered without a live activity");
        }
        report
    }
}
