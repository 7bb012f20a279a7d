//! Channel scheduler
//!
//! Background task that owns the radio channel while a session runs:
//! - Fixed: tune one channel, retrying with exponential backoff, then exit
//! - Hopping: cycle `HOP_CHANNELS` every dwell interval until cancelled
//!
//! Cancellation is cooperative. The controller fires a oneshot that is raced
//! against every sleep and polled again before every channel attempt, then
//! joins the task, so no channel change lands after `shutdown` returns.
//! Dropping the handle also cancels, without waiting.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::radio::DriverHandle;

use super::filter::{ChannelSpec, HOP_CHANNELS};
use super::stats::CaptureStats;

/// Timing knobs for both scheduler modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerTiming {
    /// Hop interval, also the base retry delay
    pub dwell: Duration,
    /// Consecutive hop failures tolerated before backing off
    pub failure_threshold: u32,
    /// Dwell multiplier used once the threshold is exceeded
    pub backoff_factor: u32,
    /// Total fixed-channel attempts before giving up
    pub max_attempts: u32,
    /// Cap on the exponent of the fixed-channel backoff
    pub max_backoff_shift: u32,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            dwell: Duration::from_millis(200),
            failure_threshold: 5,
            backoff_factor: 5,
            max_attempts: 20,
            max_backoff_shift: 5,
        }
    }
}

impl SchedulerTiming {
    pub fn with_dwell(dwell: Duration) -> Self {
        Self {
            dwell,
            ..Self::default()
        }
    }

    /// Delay after the `failures`-th failed fixed-channel attempt
    pub fn retry_delay(&self, failures: u32) -> Duration {
        self.dwell * (1u32 << failures.min(self.max_backoff_shift))
    }
}

/// How a scheduler task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SchedulerOutcome {
    /// Stopped by the controller (hopping only ends this way)
    Cancelled,
    /// Fixed channel tuned after `attempts` tries
    ChannelSet { channel: u8, attempts: u32 },
    /// Fixed channel never tuned; capture continues on whatever channel the radio is on
    RetriesExhausted { channel: u8, attempts: u32 },
}

/// Owner of a running scheduler task
pub struct SchedulerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<SchedulerOutcome>,
    outcome: Option<SchedulerOutcome>,
}

impl SchedulerHandle {
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some() || self.task.is_finished()
    }

    fn cancel(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            // Err only means the task already finished
            let _ = tx.send(());
        }
    }

    /// Stop the task and wait for it to exit. A channel change already in
    /// flight completes before this returns.
    pub async fn shutdown(mut self) -> SchedulerOutcome {
        self.cancel();
        match self.outcome {
            Some(outcome) => outcome,
            None => self.join().await,
        }
    }

    /// How the task ended, or `None` while it is still running
    pub async fn outcome(&mut self) -> Option<SchedulerOutcome> {
        if self.outcome.is_none() && self.task.is_finished() {
            self.join().await;
        }
        self.outcome
    }

    async fn join(&mut self) -> SchedulerOutcome {
        let outcome = match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Channel scheduler task failed: {}", e);
                SchedulerOutcome::Cancelled
            }
        };
        self.outcome = Some(outcome);
        outcome
    }
}

/// Launch the scheduler for `spec` on the current tokio runtime
pub fn spawn(
    driver: DriverHandle,
    spec: ChannelSpec,
    timing: SchedulerTiming,
    stats: Arc<CaptureStats>,
) -> SchedulerHandle {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let task = match spec {
        ChannelSpec::Fixed(channel) => {
            tokio::spawn(run_fixed(driver, channel, timing, stats, shutdown_rx))
        }
        ChannelSpec::Hopping => tokio::spawn(run_hopping(driver, timing, stats, shutdown_rx)),
    };

    SchedulerHandle {
        shutdown_tx: Some(shutdown_tx),
        task,
        outcome: None,
    }
}

/// True once the controller has cancelled (or dropped) the handle
fn cancelled(shutdown: &mut oneshot::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(oneshot::error::TryRecvError::Empty))
}

/// Sleep for `delay`; returns false if cancelled first
async fn wait(shutdown: &mut oneshot::Receiver<()>, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn run_fixed(
    driver: DriverHandle,
    channel: u8,
    timing: SchedulerTiming,
    stats: Arc<CaptureStats>,
    mut shutdown: oneshot::Receiver<()>,
) -> SchedulerOutcome {
    let mut attempts = 0u32;

    while attempts < timing.max_attempts {
        if cancelled(&mut shutdown) {
            return SchedulerOutcome::Cancelled;
        }

        attempts += 1;
        match driver.set_channel(channel).await {
            Ok(()) => {
                stats.record_channel_switch();
                if attempts == 1 {
                    info!("Tuned to channel {}", channel);
                } else {
                    info!("Tuned to channel {} after {} attempts", channel, attempts);
                }
                return SchedulerOutcome::ChannelSet { channel, attempts };
            }
            Err(e) => {
                stats.record_channel_failure();
                if attempts == 1 {
                    warn!("Failed to set channel {}: {}; retrying in background", channel, e);
                } else {
                    debug!("Retry {}: failed to set channel {}: {}", attempts, channel, e);
                }
            }
        }

        if attempts < timing.max_attempts
            && !wait(&mut shutdown, timing.retry_delay(attempts)).await
        {
            return SchedulerOutcome::Cancelled;
        }
    }

    warn!(
        "Giving up on channel {} after {} attempts; capture continues on the current channel",
        channel, attempts
    );
    SchedulerOutcome::RetriesExhausted { channel, attempts }
}

async fn run_hopping(
    driver: DriverHandle,
    timing: SchedulerTiming,
    stats: Arc<CaptureStats>,
    mut shutdown: oneshot::Receiver<()>,
) -> SchedulerOutcome {
    info!(
        "Channel hopping across {} channels every {:?}",
        HOP_CHANNELS.len(),
        timing.dwell
    );

    let mut index = 0usize;
    let mut failures = 0u32;

    loop {
        if cancelled(&mut shutdown) {
            return SchedulerOutcome::Cancelled;
        }

        let channel = HOP_CHANNELS[index];
        let mut delay = timing.dwell;

        match driver.set_channel(channel).await {
            Ok(()) => {
                stats.record_channel_switch();
                debug!("Hopped to channel {}", channel);
                index = (index + 1) % HOP_CHANNELS.len();
                failures = 0;
            }
            Err(e) => {
                stats.record_channel_failure();
                failures += 1;
                debug!(
                    "Failed to hop to channel {}: {} (attempt {})",
                    channel, e, failures
                );
                if failures > timing.failure_threshold {
                    warn!(
                        "{} consecutive hop failures on channel {}, backing off",
                        failures, channel
                    );
                    delay = timing.dwell * timing.backoff_factor;
                    failures = 0;
                }
            }
        }

        if !wait(&mut shutdown, delay).await {
            return SchedulerOutcome::Cancelled;
        }
    }
}
