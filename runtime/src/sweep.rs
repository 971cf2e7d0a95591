//! Periodic overdue sweep.

use crate::service::LendingService;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs [`LendingService::sweep_overdue`] on a fixed interval.
#[derive(Clone)]
pub struct OverdueSweeper {
    service: LendingService,
    every: Duration,
}

impl OverdueSweeper {
    /// Creates a sweeper that fires every `every`
    #[must_use]
    pub const fn new(service: LendingService, every: Duration) -> Self {
        Self { service, every }
    }

    /// Spawn the sweep loop. Abort the returned handle to stop it.
    ///
    /// The first sweep runs one full interval after spawning. A failed sweep
    /// is logged and the loop keeps going.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() completes its first tick immediately
            ticker.tick().await;

            tracing::info!(every_secs = self.every.as_secs(), "Overdue sweeper started");
            loop {
                ticker.tick().await;
                if let Err(error) = self.service.sweep_overdue().await {
                    tracing::warn!(error = %error, "Overdue sweep failed");
                }
            }
        })
    }
}
