use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use shared_config::AppConfig;
use slot_cell::{Slot, SlotStore};

use crate::error::BookingError;
use crate::services::clock::{Clock, SystemClock};

/// Periodically returns holds past their deadline to AVAILABLE.
///
/// Uses the store's `expire_holds`, which applies the same `Expire` guard as
/// reclamation on confirm, so a slot is released at most once.
pub struct HoldExpirySweeper {
    store: Arc<dyn SlotStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl HoldExpirySweeper {
    pub fn new(store: Arc<dyn SlotStore>, interval: Duration) -> Self {
        Self::with_clock(store, interval, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn SlotStore>, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            interval: interval.max(Duration::from_millis(10)),
        }
    }

    pub fn from_app_config(store: Arc<dyn SlotStore>, config: &AppConfig) -> Self {
        Self::new(store, Duration::from_secs(config.hold_sweep_interval_seconds.max(1)))
    }

    /// One pass at the clock's current instant; returns the released slots.
    pub async fn sweep_once(&self) -> Result<Vec<Slot>, BookingError> {
        let now = self.clock.now();
        let released = self.store.expire_holds(now).await?;

        if released.is_empty() {
            debug!("Hold sweep at {} found nothing to release", now);
        } else {
            info!("Hold sweep released {} expired holds", released.len());
        }
        Ok(released)
    }

    /// Runs until `shutdown` flips to true or its sender is dropped.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    #[instrument(skip_all, name = "hold_expiry_sweeper")]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting hold expiry sweeper, interval {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!("Hold sweep failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Hold expiry sweeper stopped");
    }
}
