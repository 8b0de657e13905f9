// # Recent History
//
// Duplicate detection and time-window checks for one client.
//
// Two plays are the same scrobble when their titles match, their artist
// sets match, and their timestamps are within the configured tolerance.
// Matching is case-insensitive and ignores surrounding whitespace. Artist
// names are split on commas before comparison so a flat, comma-joined
// history entry still matches the structured play it was made from.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use crate::config::ClientOptions;
use crate::play::PlayEvent;

/// Acceptable age range of a play relative to now
///
/// Both bounds are inclusive: a play exactly `max_age` old, or exactly
/// `future_tolerance` ahead of now, is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    max_age: Duration,
    future_tolerance: Duration,
}

impl TimeWindow {
    pub fn new(max_age: Duration, future_tolerance: Duration) -> Self {
        Self { max_age, future_tolerance }
    }

    pub fn from_options(options: &ClientOptions) -> Self {
        Self::new(
            Duration::seconds(options.max_play_age_secs as i64),
            Duration::seconds(options.future_tolerance_secs as i64),
        )
    }

    /// Whether `played_at` is inside the window anchored at `now`
    ///
    /// A bound that falls outside chrono's representable range is treated as
    /// open.
    pub fn contains(&self, played_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let not_too_old = now
            .checked_sub_signed(self.max_age)
            .is_none_or(|oldest| played_at >= oldest);
        let not_too_new = now
            .checked_add_signed(self.future_tolerance)
            .is_none_or(|newest| played_at <= newest);
        not_too_old && not_too_new
    }
}

/// Whether two plays describe the same scrobble
pub fn is_same_play(a: &PlayEvent, b: &PlayEvent, tolerance: Duration) -> bool {
    let delta = (a.played_at() - b.played_at()).abs();
    delta <= tolerance
        && normalize(a.title()) == normalize(b.title())
        && artist_key(a) == artist_key(b)
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn artist_key(event: &PlayEvent) -> Vec<String> {
    let mut names: Vec<String> = event
        .artists()
        .iter()
        .flat_map(|a| a.split(','))
        .map(normalize)
        .filter(|a| !a.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Bounded cache of plays known to be recorded at the destination
#[derive(Debug, Clone)]
pub struct RecentHistory {
    entries: VecDeque<PlayEvent>,
    capacity: usize,
    tolerance: Duration,
}

impl RecentHistory {
    pub fn new(capacity: usize, tolerance: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            tolerance,
        }
    }

    /// Replace the cache with a freshly fetched history
    pub fn replace(&mut self, mut events: Vec<PlayEvent>) {
        events.sort_by_key(|e| std::cmp::Reverse(e.played_at()));
        events.truncate(self.capacity);
        self.entries = events.into();
    }

    /// Record a play that was just delivered
    pub fn record(&mut self, event: PlayEvent) {
        self.entries.push_front(event);
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    /// Whether an equivalent play is cached
    pub fn contains(&self, event: &PlayEvent) -> bool {
        self.entries
            .iter()
            .any(|cached| is_same_play(cached, event, self.tolerance))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
