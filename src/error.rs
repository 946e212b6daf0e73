//! Error taxonomy of the reminder core.
//!
//! Only [NotificationError] is meant to reach callers of
//! [ReminderOrchestrator](crate::reminder::orchestrator::ReminderOrchestrator). Activity failures
//! either trigger the notification fallback or get logged and swallowed.

use thiserror::Error;

/// Boxed failure reported by a collaborator provider.
pub type ProviderFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ActivityError {
    /// The rich activity surface can't be loaded on this device or runtime. Expected on most
    /// platforms and only ever used as the trigger for the notification fallback.
    #[error("rich activity capability is unavailable")]
    CapabilityUnavailable,
    #[error("activity {operation} failed: {source}")]
    Native {
        operation: &'static str,
        #[source]
        source: ProviderFailure,
    },
}

impl ActivityError {
    pub(crate) fn native(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Native {
            operation,
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    /// The user denied notifications. Retrying won't help, the user has to change settings.
    #[error("notification permission was denied")]
    PermissionDenied,
    #[error("notification {operation} failed after {attempts} attempt(s): {source}")]
    Provider {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: ProviderFailure,
    },
}

impl NotificationError {
    pub(crate) fn provider(operation: &'static str, attempts: u32, source: anyhow::Error) -> Self {
        Self::Provider {
            operation,
            attempts,
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error(transparent)]
    Activity(#[from] ActivityError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    /// Every delivery strategy was tried and none succeeded. Holds the failure of the last one.
    #[error("no delivery strategy succeeded for {subject_id}: {last}")]
    Exhausted {
        subject_id: String,
        #[source]
        last: Box<ReminderError>,
    },
    #[error("no delivery strategies are configured")]
    NoStrategies,
}

impl ReminderError {
    /// Whether the failure comes from a denied notification permission, in which case the caller
    /// should point the user to the settings instead of retrying.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            ReminderError::Notification(NotificationError::PermissionDenied) => true,
            ReminderError::Exhausted { last, .. } => last.is_permission_denied(),
            _ => false,
        }
    }

    pub fn is_capability_unavailable(&self) -> bool {
        matches!(
            self,
            ReminderError::Activity(ActivityError::CapabilityUnavailable)
        )
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn permission_denied_is_detected_through_exhaustion() {
        let error = ReminderError::Exhausted {
            subject_id: "shift-1".into(),
            last: Box::new(NotificationError::PermissionDenied.into()),
        };
        assert!(error.is_permission_denied());
        assert!(!error.is_capability_unavailable());
    }

    #[test]
    fn provider_failures_keep_their_source() {
        let error = NotificationError::provider("schedule", 2, anyhow!("scheduler busy"));
        assert_eq!(
            error.to_string(),
            "notification schedule failed after 2 attempt(s): scheduler busy"
        );
        assert!(std::error::Error::source(&error).is_some());
    }
}
