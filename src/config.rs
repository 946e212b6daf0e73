use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fixed offset before a scheduled event at which the notification fires.
pub const DEFAULT_LEAD_TIME: Duration = Duration::from_secs(15 * 60);
/// Longer lead times are cut down to this.
pub const MAX_LEAD_TIME: Duration = Duration::from_secs(366 * 24 * 60 * 60);
pub const DEFAULT_SCHEDULE_RETRIES: u32 = 1;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Schedulers reject zero or negative delays, so this is the smallest trigger ever requested.
pub const MIN_TRIGGER: Duration = Duration::from_secs(1);
pub const DEFAULT_ACTIVITY_MIN_VERSION: &str = "16.1";

/// Tunables of the reminder core. Every field falls back to its default when missing from the
/// configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub lead_time_secs: u64,
    /// How many times a failed schedule call is retried.
    pub schedule_retries: u32,
    pub retry_delay_ms: u64,
    pub min_trigger_secs: u64,
    /// Minimum OS version on which the rich activity surface exists.
    pub activity_min_version: String,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            lead_time_secs: DEFAULT_LEAD_TIME.as_secs(),
            schedule_retries: DEFAULT_SCHEDULE_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            min_trigger_secs: MIN_TRIGGER.as_secs(),
            activity_min_version: DEFAULT_ACTIVITY_MIN_VERSION.into(),
        }
    }
}

impl ReminderConfig {
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {path:?}");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration {path:?}"))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse configuration {path:?}"))?;
        Ok(config)
    }

    /// Never above [MAX_LEAD_TIME], even if configured higher.
    pub fn lead_time(&self) -> Duration {
        Duration::from_secs(self.lead_time_secs).min(MAX_LEAD_TIME)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Never below [MIN_TRIGGER], even if configured lower.
    pub fn min_trigger(&self) -> Duration {
        Duration::from_secs(self.min_trigger_secs).max(MIN_TRIGGER)
    }

    pub fn with_lead_time(self, lead_time: Duration) -> Self {
        Self {
            lead_time_secs: lead_time.as_secs(),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;
    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn missing_fields_use_defaults() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(br#"{ "lead_time_secs": 600 }"#)?;

        let config = ReminderConfig::load(file.path())?;

        assert_eq!(config.lead_time(), Duration::from_secs(600));
        assert_eq!(config.schedule_retries, 1);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.activity_min_version, "16.1");
        Ok(())
    }

    #[test]
    fn min_trigger_is_never_below_one_second() {
        let config = ReminderConfig {
            min_trigger_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.min_trigger(), Duration::from_secs(1));
    }

    #[test]
    fn oversized_lead_time_is_capped() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, r#"{{ "lead_time_secs": {} }}"#, u64::MAX)?;

        let config = ReminderConfig::load(file.path())?;

        assert_eq!(config.lead_time(), MAX_LEAD_TIME);
        Ok(())
    }

    #[test]
    fn broken_file_is_reported() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"lead_time_secs = 1")?;

        assert!(ReminderConfig::load(file.path()).is_err());
        Ok(())
    }
}
