//! Sliding-window counter — a bounded, time-ordered sequence of event
//! timestamps supporting append / count-within / prune-before, as used by
//! every detector's per-flow state.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

/// A bounded (by both count and age) sequence of timestamps for one flow
/// key. Callers are expected to append in non-decreasing timestamp order;
/// this is an invariant of the data structure, not something it re-sorts
/// for.
#[derive(Debug, Clone)]
pub struct SlidingWindowCounter {
    timestamps: VecDeque<SystemTime>,
    max_len: usize,
}

impl SlidingWindowCounter {
    /// `max_len` bounds cardinality (most-recent-N retained); age-based
    /// eviction happens separately via `prune_before`/`count_within`.
    pub fn new(max_len: usize) -> Self {
        Self {
            timestamps: VecDeque::new(),
            max_len,
        }
    }

    /// Appends `ts`, dropping the oldest entry if `max_len` is exceeded.
    pub fn append(&mut self, ts: SystemTime) {
        if self.timestamps.len() >= self.max_len {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(ts);
    }

    /// Number of timestamps `t` with `now - window <= t <= now`.
    pub fn count_within(&self, now: SystemTime, window: Duration) -> usize {
        let cutoff = now.checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH);
        self.timestamps.iter().filter(|&&t| t >= cutoff && t <= now).count()
    }

    /// Drops every timestamp strictly older than `cutoff`.
    pub fn prune_before(&mut self, cutoff: SystemTime) {
        while let Some(&front) = self.timestamps.front() {
            if front < cutoff {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SystemTime> {
        self.timestamps.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn count_within_matches_brute_force_after_interleaving() {
        let mut counter = SlidingWindowCounter::new(1000);
        for t in [0, 10, 20, 30, 40, 50, 60, 70] {
            counter.append(at(t));
        }
        counter.prune_before(at(15));

        let now = at(70);
        let window = Duration::from_secs(60);
        let expected = [20u64, 30, 40, 50, 60, 70]
            .iter()
            .filter(|&&t| at(t) >= now.checked_sub(window).unwrap() && at(t) <= now)
            .count();
        assert_eq!(counter.count_within(now, window), expected);
    }

    #[test]
    fn max_len_evicts_oldest() {
        let mut counter = SlidingWindowCounter::new(3);
        for t in 0..5 {
            counter.append(at(t));
        }
        assert_eq!(counter.len(), 3);
        assert_eq!(counter.iter().next(), Some(&at(2)));
    }

    #[test]
    fn prune_before_is_idempotent() {
        let mut counter = SlidingWindowCounter::new(100);
        for t in [5, 10, 15] {
            counter.append(at(t));
        }
        counter.prune_before(at(12));
        assert_eq!(counter.len(), 2);
        counter.prune_before(at(12));
        assert_eq!(counter.len(), 2);
    }

    #[test]
    fn empty_counter_counts_zero() {
        let counter = SlidingWindowCounter::new(10);
        assert_eq!(counter.count_within(at(100), Duration::from_secs(60)), 0);
        assert!(counter.is_empty());
    }
}
