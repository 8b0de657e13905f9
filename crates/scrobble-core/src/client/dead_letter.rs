// # Dead-Letter Queue
//
// Holding area for plays whose delivery failed.
//
// ## Policy
//
// - FIFO: entries are retried oldest first
// - Capped: when full, the oldest entry is evicted (logged by the caller)
// - Retry budget: each entry carries its retry count; the owning client
//   discards entries that exhaust `dead_letter_max_retries`
// - Pacing: there is no per-entry timer, the heartbeat interval is the
//   retry cadence
//
// The queue lives in process memory only. An attempt abandoned mid-flight
// (shutdown, cancelled task) leaves its entry queued.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::play::PlayEvent;

/// A play waiting to be re-delivered, with its attempt history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterScrobble {
    /// The play to deliver
    pub event: PlayEvent,
    /// Re-delivery attempts made so far (the original attempt is not counted)
    pub retries: u32,
    /// When the play first failed
    pub queued_at: DateTime<Utc>,
    /// When the play was last attempted
    pub last_attempt_at: DateTime<Utc>,
    /// Why the last attempt failed
    pub last_error: String,
}

impl DeadLetterScrobble {
    pub fn new(event: PlayEvent, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            event,
            retries: 0,
            queued_at: now,
            last_attempt_at: now,
            last_error: error.into(),
        }
    }

    /// Record another failed attempt
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.retries = self.retries.saturating_add(1);
        self.last_attempt_at = now;
        self.last_error = error.into();
    }
}

/// Bounded FIFO of failed deliveries
#[derive(Debug, Clone)]
pub struct DeadLetterQueue {
    entries: VecDeque<DeadLetterScrobble>,
    capacity: usize,
}

impl DeadLetterQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Queue a failed play
    ///
    /// An identical play already queued is updated in place instead of being
    /// queued twice. Returns the evicted entry if the queue was full.
    pub fn push(
        &mut self,
        event: PlayEvent,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Option<DeadLetterScrobble> {
        let error = error.into();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.event == event) {
            existing.last_attempt_at = now;
            existing.last_error = error;
            return None;
        }

        self.entries.push_back(DeadLetterScrobble::new(event, error, now));
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Remove every entry for draining
    pub fn take_all(&mut self) -> VecDeque<DeadLetterScrobble> {
        std::mem::take(&mut self.entries)
    }

    /// Put undelivered entries back ahead of anything queued since the drain
    ///
    /// Returns entries evicted to respect the capacity.
    pub fn restore_front(&mut self, mut kept: VecDeque<DeadLetterScrobble>) -> Vec<DeadLetterScrobble> {
        kept.extend(self.entries.drain(..));
        self.entries = kept;

        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            if let Some(entry) = self.entries.pop_front() {
                evicted.push(entry);
            }
        }
        evicted
    }

    /// Snapshot of the queued entries, oldest first
    pub fn entries(&self) -> Vec<DeadLetterScrobble> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
