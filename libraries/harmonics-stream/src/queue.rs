//! Bounded PCM sample queue
//!
//! Single producer, single consumer. The producer blocks while the queue is
//! full, waking at least every [`BACKPRESSURE_POLL`] to re-check for close, so
//! samples are delayed rather than dropped. The consumer never blocks except
//! in [`PcmQueue::wait_prebuffered`], which is bounded by a timeout.

use crate::error::{Result, StreamError};
use harmonics_core::Sample;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Longest a full producer sleeps before re-checking the queue
pub const BACKPRESSURE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct QueueState {
    samples: VecDeque<Sample>,
    prebuffered: bool,
    finished: bool,
    closed: bool,
    high_water: usize,
}

/// Result of a non-blocking [`PcmQueue::take`]
#[derive(Debug, PartialEq)]
pub enum Take {
    Samples(Vec<Sample>),
    /// Below the threshold and the source is still running
    Pending,
    /// Source finished and every sample has been taken
    Drained,
    Closed,
}

#[derive(Debug)]
pub struct PcmQueue {
    state: Mutex<QueueState>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl PcmQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append every sample, waiting for room as needed
    ///
    /// Returns [`StreamError::Closed`] if the queue is closed before all of
    /// `samples` fit.
    pub fn push(&self, mut samples: &[Sample]) -> Result<()> {
        let mut state = self.state();
        while !samples.is_empty() {
            if state.closed {
                return Err(StreamError::Closed);
            }

            let room = self.capacity - state.samples.len();
            if room == 0 {
                state = self
                    .not_full
                    .wait_timeout(state, BACKPRESSURE_POLL)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                continue;
            }

            let (now, later) = samples.split_at(room.min(samples.len()));
            state.samples.extend(now.iter().copied());
            state.high_water = state.high_water.max(state.samples.len());
            state.prebuffered = true;
            samples = later;
            self.not_empty.notify_all();
        }
        Ok(())
    }

    /// Take up to `max` samples, provided at least `min` are queued
    ///
    /// Once the source has finished the threshold no longer applies, so the
    /// tail of the stream is always delivered.
    pub fn take(&self, max: usize, min: usize) -> Take {
        let mut state = self.state();
        if state.closed {
            return Take::Closed;
        }

        let queued = state.samples.len();
        if queued == 0 && state.finished {
            return Take::Drained;
        }
        if queued == 0 || (queued < min && !state.finished) {
            return Take::Pending;
        }

        let count = queued.min(max.max(1));
        let block: Vec<Sample> = state.samples.drain(..count).collect();
        self.not_full.notify_all();
        Take::Samples(block)
    }

    /// Mark the source as exhausted
    pub fn finish(&self) {
        self.state().finished = true;
        self.not_empty.notify_all();
    }

    /// Drop everything and wake all waiters. Safe to call repeatedly.
    pub fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        state.samples.clear();
        state.samples.shrink_to_fit();
        drop(state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Block until the first samples arrive, the source finishes or the
    /// queue closes. Returns `false` on timeout.
    pub fn wait_prebuffered(&self, timeout: Duration) -> bool {
        let state = self.state();
        let (state, result) = self
            .not_empty
            .wait_timeout_while(state, timeout, |s| {
                !(s.prebuffered || s.finished || s.closed)
            })
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out() || state.prebuffered || state.finished || state.closed
    }

    pub fn len(&self) -> usize {
        self.state().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest number of samples ever queued at once
    pub fn high_water_mark(&self) -> usize {
        self.state().high_water
    }

    pub fn is_prebuffered(&self) -> bool {
        self.state().prebuffered
    }

    pub fn is_finished(&self) -> bool {
        self.state().finished
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}
