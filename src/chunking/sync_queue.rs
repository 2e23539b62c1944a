use std::sync::{Arc, Condvar, Mutex};

use log::{debug, warn};

use super::CueEvent;
use crate::error::{CueError, Result};

/// Default promotion tolerance: half a frame at 30 fps. A video path that
/// knows its real frame rate should size this at half a frame duration.
const DEFAULT_PROMOTION_TOLERANCE: f64 = 1.0 / 60.0;

/// Identifies one registered consumer thread of a [`SyncPointQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadToken(usize);

struct QueueState {
    /// Pending events ordered by time (stable for equal times)
    unpromoted: Vec<CueEvent>,
    /// Promoted sync points in promotion order, non-decreasing time
    promoted: Vec<Arc<CueEvent>>,
    /// Per-subscriber delivery position into `promoted`
    cursors: Vec<usize>,
    /// Number of subscribers currently blocked in `get_next`
    waiting: usize,
    cancelled: bool,
}

/// A time-ordered rendezvous between cue producers and stream consumers.
///
/// Producers insert [`CueEvent`]s; consumers either block on
/// [`get_next`](SyncPointQueue::get_next) at a time horizon (`hint`), or,
/// on the video path, convert a key frame time into a sync point with
/// [`promote_at`](SyncPointQueue::promote_at). Every registered subscriber
/// observes the same promoted sequence exactly once.
///
/// All methods are safe under contention; internally one mutex guards the
/// state and a single condition variable wakes waiters.
pub struct SyncPointQueue {
    state: Mutex<QueueState>,
    readable: Condvar,
    tolerance: f64,
}

impl Default for SyncPointQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncPointQueue {
    /// Creates an empty queue with the default promotion tolerance.
    pub fn new() -> Self {
        Self::with_tolerance(DEFAULT_PROMOTION_TOLERANCE)
    }

    /// Creates an empty queue that considers an event "near" a promotion
    /// time when it lies within `tolerance` seconds of it.
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            state: Mutex::new(QueueState {
                unpromoted: Vec::new(),
                promoted: Vec::new(),
                cursors: Vec::new(),
                waiting: 0,
                cancelled: false,
            }),
            readable: Condvar::new(),
            tolerance,
        }
    }

    /// Registers the calling thread as a subscriber. Must be called before
    /// any blocking call from that thread.
    pub fn add_thread(&self) -> ThreadToken {
        let mut state = self.state.lock().unwrap();
        let promoted_len = state.promoted.len();
        state.cursors.push(promoted_len);
        ThreadToken(state.cursors.len() - 1)
    }

    /// Inserts an event keyed by its time. Events at the same time retain
    /// insertion order.
    pub fn add(&self, event: CueEvent) {
        let mut state = self.state.lock().unwrap();
        let position = state
            .unpromoted
            .partition_point(|e| e.time_in_seconds <= event.time_in_seconds);
        debug!(
            "sync point added at {:.3}s (duration {:.3}s)",
            event.time_in_seconds, event.duration_in_seconds
        );
        state.unpromoted.insert(position, event);
        self.readable.notify_all();
    }

    /// Removes a pending synthetic ad-break END for the given segmentation
    /// event, used when the real END signal arrives first. A synthetic END
    /// that was already promoted can no longer be suppressed.
    pub fn cancel_synthetic_end(&self, segmentation_event_id: u32) {
        let mut state = self.state.lock().unwrap();
        let before = state.unpromoted.len();
        state.unpromoted.retain(|e| {
            !(e.synthetic_end && e.segmentation_event_id() == Some(segmentation_event_id))
        });
        if state.unpromoted.len() != before {
            debug!(
                "cancelled synthetic ad-break end for event {}",
                segmentation_event_id
            );
        }
    }

    /// The time of the next event strictly after `after`, or infinity.
    pub fn get_hint(&self, after: f64) -> f64 {
        let state = self.state.lock().unwrap();
        state
            .unpromoted
            .iter()
            .map(|e| e.time_in_seconds)
            .chain(state.promoted.iter().map(|e| e.time_in_seconds))
            .filter(|&t| t > after)
            .fold(f64::INFINITY, f64::min)
    }

    /// True when any event (promoted or pending) lies at or after `hint`.
    pub fn has_more(&self, hint: f64) -> bool {
        let state = self.state.lock().unwrap();
        state
            .unpromoted
            .iter()
            .map(|e| e.time_in_seconds)
            .chain(state.promoted.iter().map(|e| e.time_in_seconds))
            .any(|t| t >= hint)
    }

    /// Converts the real time `time_in_seconds` into a sync point.
    ///
    /// The earliest pending event within the promotion tolerance of
    /// `time_in_seconds` (or before it) is promoted with its time rewritten
    /// to exactly `time_in_seconds`; remaining pending events at or before
    /// that time are superseded and dropped. The promoted event counts as
    /// delivered to `token`. Returns `None` when nothing is pending near
    /// the given time.
    pub fn promote_at(&self, token: ThreadToken, time_in_seconds: f64) -> Option<Arc<CueEvent>> {
        let mut state = self.state.lock().unwrap();

        // Another subscriber may have promoted this instant already.
        let cursor = state.cursors[token.0];
        if let Some(offset) = state.promoted[cursor..]
            .iter()
            .position(|e| (e.time_in_seconds - time_in_seconds).abs() <= self.tolerance)
        {
            state.cursors[token.0] = cursor + offset + 1;
            return Some(state.promoted[cursor + offset].clone());
        }

        if state.unpromoted.is_empty()
            || state.unpromoted[0].time_in_seconds > time_in_seconds + self.tolerance
        {
            return None;
        }

        let mut event = state.unpromoted.remove(0);
        while !state
            .unpromoted
            .is_empty()
            && state.unpromoted[0].time_in_seconds <= time_in_seconds
        {
            let superseded = state.unpromoted.remove(0);
            warn!(
                "dropping sync point at {:.3}s superseded by promotion at {:.3}s",
                superseded.time_in_seconds, time_in_seconds
            );
        }

        debug!(
            "promoting sync point {:.3}s -> {:.3}s",
            event.time_in_seconds, time_in_seconds
        );
        event.time_in_seconds = time_in_seconds;
        let event = Arc::new(event);
        state.promoted.push(event.clone());
        state.cursors[token.0] = state.promoted.len();
        self.readable.notify_all();
        Some(event)
    }

    /// Blocks until an event at or before `hint` is available for `token`,
    /// removes it from the subscriber's view, and returns it.
    ///
    /// When every registered subscriber is blocked here and a pending event
    /// lies at or before the caller's hint, that event self-promotes at its
    /// own time; this is what advances streams that have no video track.
    /// Returns [`CueError::Cancelled`] once the queue is cancelled.
    pub fn get_next(&self, token: ThreadToken, hint: f64) -> Result<Arc<CueEvent>> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.cancelled {
                return Err(CueError::Cancelled);
            }

            let cursor = state.cursors[token.0];
            if let Some(event) = state.promoted.get(cursor) {
                if event.time_in_seconds <= hint {
                    let event = event.clone();
                    state.cursors[token.0] = cursor + 1;
                    return Ok(event);
                }
            }

            let everyone_waiting = state.waiting + 1 == state.cursors.len();
            let promotable = state
                .unpromoted
                .first()
                .map(|e| e.time_in_seconds <= hint)
                .unwrap_or(false);
            if everyone_waiting && promotable {
                let event = state.unpromoted.remove(0);
                debug!(
                    "self-promoting sync point at {:.3}s (all {} subscriber(s) waiting)",
                    event.time_in_seconds,
                    state.cursors.len()
                );
                state.promoted.push(Arc::new(event));
                self.readable.notify_all();
                continue;
            }

            state.waiting += 1;
            state = self.readable.wait(state).unwrap();
            state.waiting -= 1;
        }
    }

    /// Cancels the queue: wakes every waiter and makes all subsequent
    /// `get_next` calls return [`CueError::Cancelled`].
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        state.cancelled = true;
        debug!("sync point queue cancelled");
        self.readable.notify_all();
    }
}
