//! Capture session controller
//!
//! Owns the single capture session. `start` and `stop` serialize on one async
//! mutex and do all driver programming inside it. Frame delivery never takes
//! that mutex: the receive callback only touches the frame queue and the
//! counters, so a slow driver call cannot stall the rx path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{CaptureError, Result};
use crate::frame::FrameRecord;
use crate::radio::{DriverError, DriverHandle, RadioDriver, RxCallback, RxPacket};

use super::filter::{CaptureFilter, ChannelSpec};
use super::queue::{Enqueued, FrameQueue};
use super::scheduler::{self, SchedulerHandle, SchedulerOutcome, SchedulerTiming};
use super::stats::{CaptureStats, StatsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
}

/// Configuration of the running session
struct ActiveSession {
    id: u64,
    spec: ChannelSpec,
    filter: CaptureFilter,
    started_at: DateTime<Utc>,
    scheduler: SchedulerHandle,
}

/// Returned by a successful `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Started {
    pub session_id: u64,
    pub channel: ChannelSpec,
    pub filter: CaptureFilter,
    /// A previous session was stopped to make room for this one
    pub restarted: bool,
}

/// Returned by a successful `stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped {
    pub session_id: u64,
    pub stats: StatsSnapshot,
}

/// Read-only view of the session for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<CaptureFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Whether the channel scheduler task is still working
    pub scheduler_active: bool,
    /// How the scheduler ended, once it has
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerOutcome>,
    pub queued: usize,
    pub queue_capacity: usize,
    pub stats: StatsSnapshot,
}

/// The capture session controller
pub struct CaptureController {
    driver: DriverHandle,
    queue: Arc<FrameQueue>,
    stats: Arc<CaptureStats>,
    timing: SchedulerTiming,
    session: Mutex<Option<ActiveSession>>,
    next_id: AtomicU64,
}

impl CaptureController {
    pub fn new(driver: Arc<dyn RadioDriver>, timing: SchedulerTiming) -> Self {
        Self {
            driver: DriverHandle::new(driver),
            queue: Arc::new(FrameQueue::default()),
            stats: Arc::new(CaptureStats::new()),
            timing,
            session: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start capturing. A running session is stopped first, inside the same
    /// critical section, so callers never observe an idle gap.
    pub async fn start(&self, spec: ChannelSpec, filter: CaptureFilter) -> Result<Started> {
        let mut session = self.session.lock().await;

        let restarted = match session.take() {
            Some(previous) => {
                info!("Capture already running (session {}), restarting", previous.id);
                self.teardown(previous).await;
                true
            }
            None => false,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stale = self.queue.reset(id);
        if stale > 0 {
            info!("Discarded {} frames from the previous session", stale);
        }
        self.stats.reset();

        if let Err(e) = self.arm(id, filter).await {
            error!("Failed to start packet capture: {}", e);
            self.queue.close();
            if let Err(e) = self.driver.set_rx_callback(None).await {
                warn!("Failed to unregister rx callback: {}", e);
            }
            return Err(e.into());
        }

        let scheduler = scheduler::spawn(self.driver.clone(), spec, self.timing, self.stats.clone());

        info!(
            "Capture session {} started on {} with filter {} ({} driver)",
            id,
            spec,
            filter,
            self.driver.name()
        );

        *session = Some(ActiveSession {
            id,
            spec,
            filter,
            started_at: Utc::now(),
            scheduler,
        });

        Ok(Started {
            session_id: id,
            channel: spec,
            filter,
            restarted,
        })
    }

    /// Stop capturing. Fails with `NotRunning` (and changes nothing) when idle.
    pub async fn stop(&self) -> Result<Stopped> {
        let mut session = self.session.lock().await;
        let active = session.take().ok_or(CaptureError::NotRunning)?;

        let session_id = active.id;
        self.teardown(active).await;

        let stats = self.stats.snapshot();
        info!("Capture session {} stopped. {}", session_id, stats);
        Ok(Stopped { session_id, stats })
    }

    /// Remove up to `max` frames, oldest first. Empty while idle.
    pub fn drain(&self, max: usize) -> Vec<FrameRecord> {
        if !self.queue.is_open() || self.queue.is_empty() {
            return Vec::new();
        }
        self.queue.drain(max)
    }

    pub async fn status(&self) -> SessionStatus {
        let mut session = self.session.lock().await;
        let scheduler = match session.as_mut() {
            Some(active) => active.scheduler.outcome().await,
            None => None,
        };
        let active = session.as_ref();

        SessionStatus {
            state: if active.is_some() {
                SessionState::Running
            } else {
                SessionState::Idle
            },
            backend: self.driver.name().to_string(),
            session_id: active.map(|s| s.id),
            channel: active.map(|s| s.spec),
            filter: active.map(|s| s.filter),
            started_at: active.map(|s| s.started_at),
            scheduler_active: active.map_or(false, |s| !s.scheduler.is_finished()),
            scheduler,
            queued: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            stats: self.stats.snapshot(),
        }
    }

    /// Program the driver for a new session
    async fn arm(&self, session_id: u64, filter: CaptureFilter) -> std::result::Result<(), DriverError> {
        self.driver.set_filter(filter.driver_mask()).await?;
        self.driver
            .set_rx_callback(Some(self.rx_callback(session_id, filter)))
            .await?;
        self.driver.set_promiscuous(true).await?;
        Ok(())
    }

    /// Stop the scheduler and undo `arm`. Closing the queue first is the
    /// point after which no frame of this session can be stored. The
    /// scheduler is joined before the radio is touched again, so none of its
    /// channel changes can land on the next session.
    async fn teardown(&self, active: ActiveSession) {
        self.queue.close();

        let outcome = active.scheduler.shutdown().await;
        debug!("Channel scheduler for session {} ended: {:?}", active.id, outcome);

        if let Err(e) = self.driver.set_promiscuous(false).await {
            warn!("Failed to leave monitor mode: {}", e);
        }
        if let Err(e) = self.driver.set_rx_callback(None).await {
            warn!("Failed to unregister rx callback: {}", e);
        }
    }

    /// Receive callback bound to one session
    fn rx_callback(&self, session_id: u64, filter: CaptureFilter) -> RxCallback {
        let queue = self.queue.clone();
        let stats = self.stats.clone();

        Arc::new(move |packet: &RxPacket<'_>| {
            stats.record_seen();

            if !queue.is_open_for(session_id) {
                stats.record_late();
                return;
            }
            if !filter.accepts(packet.payload) {
                stats.record_filtered();
                return;
            }

            let Some(record) = FrameRecord::capture(packet) else {
                stats.record_alloc_failure();
                warn!("Dropped {} byte frame: allocation failed", packet.rx_ctrl.sig_len);
                return;
            };

            match queue.enqueue(session_id, record) {
                Enqueued::Queued => stats.record_queued(),
                Enqueued::Evicted => {
                    stats.record_queued();
                    stats.record_evicted();
                }
                Enqueued::Rejected => stats.record_late(),
            }
        })
    }
}
