//! Periodic housekeeping: expiring stock reservations and stale limiter state

use chrono::Utc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::store::ReservationStore;
use crate::util::rate_limit::LoginRateLimiter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Background sweeper
pub struct Sweeper {
    reservations: ReservationStore,
    login_limiter: LoginRateLimiter,
}

impl Sweeper {
    pub fn new(reservations: ReservationStore, login_limiter: LoginRateLimiter) -> Self {
        Self {
            reservations,
            login_limiter,
        }
    }

    /// One pass. Returns the number of reservations expired.
    pub async fn sweep(&self) -> u64 {
        self.login_limiter.retain_recent();

        match self.reservations.expire_stale(Utc::now()).await {
            Ok(0) => {
                debug!("No stale reservations");
                0
            }
            Ok(expired) => {
                info!(expired, "Expired stale stock reservations");
                expired
            }
            Err(e) => {
                error!(error = %e, "Failed to expire reservations");
                0
            }
        }
    }

    /// Main loop, runs until the task is dropped
    pub async fn run(&self) {
        let mut ticker = interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }
}
