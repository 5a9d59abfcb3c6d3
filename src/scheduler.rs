//! Fixed-interval driver for [`Watcher`] cycles.
//!
//! Each cycle runs as its own task and is awaited to completion (including
//! persistence) before the interval sleep starts, so cycles never overlap.
//! Errors and even panics inside a cycle stop at the cycle boundary; the loop
//! always sleeps and tries again.

use crate::error::WatchError;
use crate::watch::{CycleOutcome, Watcher};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Counters exposed to the control panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub cycles: u64,
    pub consecutive_failures: u32,
    pub last_outcome: Option<String>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

pub struct Scheduler {
    watcher: Arc<Watcher>,
    interval: Duration,
    failure_threshold: u32,
    consecutive_failures: u32,
    status: watch::Sender<SchedulerStatus>,
}

impl Scheduler {
    pub fn new(watcher: Arc<Watcher>) -> Self {
        let config = watcher.config();
        let (status, _) = watch::channel(SchedulerStatus::default());
        Self {
            interval: config.poll_interval,
            failure_threshold: config.failure_threshold.max(1),
            consecutive_failures: 0,
            watcher,
            status,
        }
    }

    /// Live view of the counters; cheap to clone and never blocks the loop.
    pub fn status(&self) -> watch::Receiver<SchedulerStatus> {
        self.status.subscribe()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one isolated cycle and update the failure bookkeeping.
    pub async fn tick(&mut self) -> Result<CycleOutcome, WatchError> {
        let watcher = Arc::clone(&self.watcher);
        let result = match tokio::spawn(async move { watcher.run_cycle().await }).await {
            Ok(result) => result,
            Err(e) => Err(WatchError::Internal(format!("cycle task panicked: {e}"))),
        };

        let healthy = match &result {
            Ok(outcome) => {
                info!("Cycle finished: {}", outcome);
                outcome.is_healthy()
            }
            Err(e) => {
                error!("Cycle failed: {}", e);
                false
            }
        };

        if healthy {
            if self.consecutive_failures > 0 {
                info!("Recovered after {} failed cycles", self.consecutive_failures);
            }
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
            if self.consecutive_failures % self.failure_threshold == 0 {
                self.notify_failures(&result).await;
            }
        }

        let last_outcome = match &result {
            Ok(outcome) => outcome.to_string(),
            Err(e) => format!("error: {e}"),
        };
        let failures = self.consecutive_failures;
        self.status.send_modify(|s| {
            s.cycles += 1;
            s.consecutive_failures = failures;
            s.last_outcome = Some(last_outcome);
            s.last_cycle_at = Some(Utc::now());
        });

        result
    }

    /// Best-effort diagnostic; a failure to send it is only logged.
    async fn notify_failures(&self, last: &Result<CycleOutcome, WatchError>) {
        let cause = match last {
            Ok(outcome) => outcome.to_string(),
            Err(e) => e.to_string(),
        };
        let text = format!(
            "⚠️ {} consecutive watch cycles failed. Last result: {}",
            self.consecutive_failures, cause
        );
        warn!("{}", text);
        if let Err(e) = self.watcher.outbound().send_text(&text).await {
            warn!("Could not send failure notice: {}", e);
        }
    }

    /// Cycle forever until `shutdown` resolves. Shutdown is observed between
    /// cycles, never in the middle of one.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            "Watching {} every {}s",
            self.watcher.config().page_url,
            self.interval.as_secs()
        );

        loop {
            let _ = self.tick().await;

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler stopping");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
