use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Represents an entity responsible for providing dates and delays across application. This
/// allows trigger computation and retry backoff to be tested without waiting for real time.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that starts at a fixed date and moves forward together with tokio's clock. Combined
/// with paused tokio time it yields fully deterministic dates.
#[derive(Clone)]
pub struct AnchoredClock {
    anchor: DateTime<Utc>,
    reference: Instant,
}

impl AnchoredClock {
    pub fn new(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            reference: Instant::now(),
        }
    }
}

#[async_trait]
impl Clock for AnchoredClock {
    fn time(&self) -> DateTime<Utc> {
        self.anchor + self.reference.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
