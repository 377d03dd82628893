use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{error, info};

use crate::{error::BookingResult, lifecycle::BookingService, time::Clock};

/// Periodically times out pending bookings nobody accepted.
pub struct Sweeper {
    service: Arc<BookingService>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl Sweeper {
    pub fn new(service: Arc<BookingService>, clock: Arc<dyn Clock>, poll_interval: Duration) -> Self {
        Self {
            service,
            clock,
            poll_interval,
        }
    }

    pub async fn run(&self) {
        info!(interval_secs = self.poll_interval.as_secs(), "sweeper started");
        loop {
            if let Err(err) = self.tick().await {
                error!(error = %err, "sweep failed");
            }
            sleep(self.poll_interval).await;
        }
    }

    /// One sweep; returns how many bookings were timed out.
    pub async fn tick(&self) -> BookingResult<usize> {
        let expired = self.service.sweep_expired(self.clock.now()).await?;
        if !expired.is_empty() {
            info!(count = expired.len(), "timed out expired bookings");
        }
        Ok(expired.len())
    }
}
