//! Capture counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared between the receive callback, the scheduler and the
/// controller (atomic for lock-free access from the rx path)
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub frames_seen: AtomicU64,
    pub frames_filtered: AtomicU64,
    pub frames_queued: AtomicU64,
    pub frames_evicted: AtomicU64,
    pub frames_late: AtomicU64,
    pub alloc_failures: AtomicU64,
    pub channel_switches: AtomicU64,
    pub channel_failures: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_seen(&self) {
        self.frames_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.frames_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.frames_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evicted(&self) {
        self.frames_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_late(&self) {
        self.frames_late.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alloc_failure(&self) {
        self.alloc_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_channel_switch(&self) {
        self.channel_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_channel_failure(&self) {
        self.channel_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter (called when a new session starts)
    pub fn reset(&self) {
        for counter in [
            &self.frames_seen,
            &self.frames_filtered,
            &self.frames_queued,
            &self.frames_evicted,
            &self.frames_late,
            &self.alloc_failures,
            &self.channel_switches,
            &self.channel_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_seen: self.frames_seen.load(Ordering::Relaxed),
            frames_filtered: self.frames_filtered.load(Ordering::Relaxed),
            frames_queued: self.frames_queued.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            frames_late: self.frames_late.load(Ordering::Relaxed),
            alloc_failures: self.alloc_failures.load(Ordering::Relaxed),
            channel_switches: self.channel_switches.load(Ordering::Relaxed),
            channel_failures: self.channel_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of `CaptureStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_seen: u64,
    pub frames_filtered: u64,
    pub frames_queued: u64,
    pub frames_evicted: u64,
    pub frames_late: u64,
    pub alloc_failures: u64,
    pub channel_switches: u64,
    pub channel_failures: u64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frames: {} seen, {} filtered, {} queued ({} evicted), {} late | Channel: {} switches, {} failures",
            self.frames_seen,
            self.frames_filtered,
            self.frames_queued,
            self.frames_evicted,
            self.frames_late,
            self.channel_switches,
            self.channel_failures
        )
    }
}
