//! Expiry sweeper: a single periodic task that turns overdue reservations
//! into EXPIRED bookings through the regular command pipeline.
//!
//! Correctness under concurrency comes from the same row locks the commands
//! use: a confirm that wins the lock first leaves nothing for the sweeper to
//! expire. Running extra replicas wastes work but stays correct; single-
//! replica (or leader-elected) deployment is the documented operating mode.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command_service::CommandService;
use crate::write_store::{Correlation, WriteStore};

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    /// Upper bound on reservations expired per sweep.
    pub batch_size: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_size: 100,
        }
    }
}

pub struct ExpirySweeper {
    commands: Arc<CommandService>,
    store: Arc<dyn WriteStore>,
    config: SweeperConfig,
}

/// Handle to stop the sweeper task.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

impl ExpirySweeper {
    pub fn new(
        commands: Arc<CommandService>,
        store: Arc<dyn WriteStore>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            commands,
            store,
            config,
        }
    }

    /// One sweep pass; returns how many reservations were expired.
    ///
    /// Each booking is expired in its own short transaction — the sweeper
    /// never holds a database transaction across more than one booking.
    pub async fn sweep_once(&self) -> usize {
        let now = Utc::now();
        let overdue = match self
            .store
            .expired_reservations(now, self.config.batch_size)
            .await
        {
            Ok(ids) => ids,
            Err(error) => {
                warn!(%error, "expiry scan failed; retrying next interval");
                return 0;
            }
        };

        let mut expired = 0;
        for booking_id in overdue {
            match self
                .commands
                .expire(booking_id, now, Correlation::none())
                .await
            {
                Ok(Some(_)) => expired += 1,
                // A concurrent confirm or cancel won the row; nothing to do.
                Ok(None) => {}
                Err(error) => {
                    warn!(%booking_id, %error, "expiry failed; will retry next interval");
                }
            }
        }

        if expired > 0 {
            info!(expired, "expired overdue reservations");
        }
        expired
    }

    /// Run the sweep on `config.interval` until shutdown.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            debug!(interval = ?self.config.interval, "expiry sweeper started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        self.sweep_once().await;
                    }
                }
            }

            debug!("expiry sweeper stopped");
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}
