//! Connection health monitoring

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Runs a periodic liveness check until cancelled
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    /// Check interval
    pub interval: Duration,
}

/// Handle to a running monitor task
///
/// Cancelling (or dropping) the handle stops the task; an in-progress check
/// is abandoned at its next await point.
#[derive(Debug)]
pub struct HealthHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HealthHandle {
    /// Stop the monitor
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the monitor task has finished
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for HealthHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl HealthMonitor {
    /// Create a new health monitor
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Start monitoring
    ///
    /// `check` is called once per tick. It returns `None` when the monitored
    /// object is gone, which stops the monitor. The first check runs one full
    /// interval after start.
    pub fn spawn_monitor<F, Fut>(&self, cancel: CancellationToken, check: F) -> HealthHandle
    where
        F: Fn() -> Option<Fut> + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let interval = self.interval;
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("Health monitor cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(run) = check() else {
                            tracing::debug!("Monitored connection dropped; stopping health monitor");
                            break;
                        };
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = run => {}
                        }
                    }
                }
            }
        });

        HealthHandle { cancel, task }
    }
}
