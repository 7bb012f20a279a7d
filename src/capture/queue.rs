//! Bounded drop-oldest frame queue
//!
//! Shared between the receive callback (producer) and API callers (consumer).
//! The lock is held only for O(1) deque operations and is never shared with
//! the session lock, so frame delivery cannot wait on a slow driver call.
//!
//! The queue also records which session may enqueue. Producers pass their
//! session id and the check happens under the lock, so once a session is
//! closed none of its late frames can be stored.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::frame::FrameRecord;

/// Default number of queued frames
pub const QUEUE_CAPACITY: usize = 32;

/// Session id meaning "no session may enqueue"
const CLOSED: u64 = 0;

/// Result of enqueueing a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Stored without eviction
    Queued,
    /// Stored after evicting the oldest frame
    Evicted,
    /// Refused: the producing session is no longer open
    Rejected,
}

struct Inner {
    frames: VecDeque<FrameRecord>,
    session: u64,
}

/// Fixed-capacity FIFO of captured frames
pub struct FrameQueue {
    inner: Mutex<Inner>,
    /// Lock-free mirror of `Inner::session` for cheap pre-checks
    open_session: AtomicU64,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity),
                session: CLOSED,
            }),
            open_session: AtomicU64::new(CLOSED),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }

    /// Whether any session is currently allowed to enqueue
    pub fn is_open(&self) -> bool {
        self.open_session.load(Ordering::Acquire) != CLOSED
    }

    /// Whether `session` is currently allowed to enqueue. Advisory only;
    /// `enqueue` re-checks under the lock.
    pub fn is_open_for(&self, session: u64) -> bool {
        session != CLOSED && self.open_session.load(Ordering::Acquire) == session
    }

    /// Insert a frame on behalf of `session`, evicting the oldest frame when
    /// full. Refused unless that session is open. Never blocks on anything
    /// but the deque lock.
    pub fn enqueue(&self, session: u64, frame: FrameRecord) -> Enqueued {
        let evicted = {
            let mut inner = self.inner.lock();
            if session == CLOSED || inner.session != session {
                return Enqueued::Rejected;
            }
            self.push_locked(&mut inner, frame)
        };
        // the evicted frame is dropped outside the lock
        match evicted {
            Some(_) => Enqueued::Evicted,
            None => Enqueued::Queued,
        }
    }

    fn push_locked(&self, inner: &mut Inner, frame: FrameRecord) -> Option<FrameRecord> {
        let evicted = if inner.frames.len() >= self.capacity {
            inner.frames.pop_front()
        } else {
            None
        };
        inner.frames.push_back(frame);
        evicted
    }

    /// Remove and return up to `max` frames, oldest first
    pub fn drain(&self, max: usize) -> Vec<FrameRecord> {
        let mut inner = self.inner.lock();
        let count = max.min(inner.frames.len());
        inner.frames.drain(..count).collect()
    }

    /// Discard everything and open the queue for `session`.
    /// Returns the number of stale frames discarded.
    pub fn reset(&self, session: u64) -> usize {
        let stale = {
            let mut inner = self.inner.lock();
            inner.session = session;
            self.open_session.store(session, Ordering::Release);
            std::mem::take(&mut inner.frames)
        };
        stale.len()
    }

    /// Stop accepting frames from any session. Queued frames are kept.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.session = CLOSED;
        self.open_session.store(CLOSED, Ordering::Release);
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new(QUEUE_CAPACITY)
    }
}
