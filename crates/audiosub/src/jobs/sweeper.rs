//! Periodic expiry sweep.
//!
//! Sweeps also run opportunistically on submission and listing; this timer
//! only bounds how long an idle service keeps expired artifacts around.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::jobs::JobStore;

pub struct SweepScheduler {
    store: Arc<JobStore>,
    interval: Duration,
    shutdown: watch::Sender<bool>,
}

impl SweepScheduler {
    pub fn new(store: Arc<JobStore>, interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            interval,
            shutdown,
        }
    }

    /// Starts the sweep loop on the current runtime.
    pub fn start(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let interval = self.interval;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await; // skip immediate first tick

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let removed = store.sweep_expired();
                        log::debug!("Periodic sweep removed {} job(s)", removed);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            log::debug!("Sweep scheduler stopped");
        })
    }

    /// Signals the loop to stop.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}
