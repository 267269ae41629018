//! Periodic leader refresh, independent of request traffic

use crate::pd::leader::LeaderTracker;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Background task calling [`LeaderTracker::failover`] every interval.
pub struct Refresher {
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Refresher {
    /// Spawn the refresh loop; the first refresh happens one interval from now.
    pub fn start(tracker: Arc<LeaderTracker>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = tracker.failover(None).await;
                        tracing::debug!("Periodic PD leader refresh: {:?}", outcome);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("PD leader refresher stopped");
        });

        Self {
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    /// Stop the loop. Returns `false` if it was already stopped.
    pub fn stop(&self) -> bool {
        let _ = self.shutdown.send(true);
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match task {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.stop();
    }
}
