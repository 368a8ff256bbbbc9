//! Bounded per-sensor history of leak percentages for trend display

use crate::sensor::LeakPercentage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::trace;

/// Entries kept per sensor unless configured otherwise.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Minimum change between the older and newer half of the history, in
/// percentage points, before a trend is reported.
const TREND_THRESHOLD: f64 = 1.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Steady,
}

/// Fixed-capacity FIFO; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct RollingHistory {
    entries: VecDeque<LeakPercentage>,
    capacity: usize,
}

impl RollingHistory {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a value, evicting the oldest when over capacity.
    pub fn push(&mut self, leak: LeakPercentage) {
        self.entries.push_back(leak);

        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                trace!("History full, evicted {}", evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<LeakPercentage> {
        self.entries.back().copied()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = LeakPercentage> + '_ {
        self.entries.iter().copied()
    }

    /// Copy of the values, oldest first.
    pub fn to_vec(&self) -> Vec<LeakPercentage> {
        self.entries.iter().copied().collect()
    }

    pub fn average(&self) -> Option<f64> {
        if self.entries.is_empty() {
            return None;
        }
        let sum: f64 = self.entries.iter().map(|leak| leak.value()).sum();
        Some(sum / self.entries.len() as f64)
    }

    pub fn peak(&self) -> Option<LeakPercentage> {
        self.entries
            .iter()
            .copied()
            .fold(None, |peak, leak| match peak {
                Some(p) if p >= leak => Some(p),
                _ => Some(leak),
            })
    }

    /// Compare the mean of the newer half against the older half.
    ///
    /// Needs at least four entries, otherwise reports `Steady`.
    pub fn trend(&self) -> Trend {
        let len = self.entries.len();
        if len < 4 {
            return Trend::Steady;
        }

        let half = len / 2;
        let older: f64 = self.entries.iter().take(half).map(|l| l.value()).sum::<f64>() / half as f64;
        let newer: f64 =
            self.entries.iter().skip(len - half).map(|l| l.value()).sum::<f64>() / half as f64;

        let diff = newer - older;
        if diff.abs() < TREND_THRESHOLD {
            Trend::Steady
        } else if diff > 0.0 {
            Trend::Rising
        } else {
            Trend::Falling
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for RollingHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leak(value: f64) -> LeakPercentage {
        LeakPercentage::new(value)
    }

    #[test]
    fn test_history_never_exceeds_capacity() {
        let mut history = RollingHistory::default();

        for i in 0..25 {
            history.push(leak(i as f64));
            assert!(history.len() <= DEFAULT_HISTORY_CAPACITY);
        }

        assert_eq!(history.len(), DEFAULT_HISTORY_CAPACITY);
    }

    #[test]
    fn test_eleventh_append_evicts_first() {
        let mut history = RollingHistory::new(10);

        for i in 1..=11 {
            history.push(leak(i as f64));
        }

        let values: Vec<f64> = history.iter().map(|l| l.value()).collect();
        assert_eq!(values, (2..=11).map(|i| i as f64).collect::<Vec<_>>());
        assert_eq!(history.latest(), Some(leak(11.0)));
    }

    #[test]
    fn test_average_and_peak() {
        let mut history = RollingHistory::new(4);
        assert_eq!(history.average(), None);
        assert_eq!(history.peak(), None);

        for value in [10.0, 40.0, 20.0, 30.0] {
            history.push(leak(value));
        }

        assert_eq!(history.average(), Some(25.0));
        assert_eq!(history.peak(), Some(leak(40.0)));
    }

    #[test]
    fn test_trend_detection() {
        let mut history = RollingHistory::new(10);
        for value in [0.0, 0.0, 5.0, 10.0, 20.0, 30.0] {
            history.push(leak(value));
        }
        assert_eq!(history.trend(), Trend::Rising);

        history.clear();
        for value in [40.0, 30.0, 20.0, 10.0] {
            history.push(leak(value));
        }
        assert_eq!(history.trend(), Trend::Falling);

        history.clear();
        for value in [12.0, 12.5, 12.2, 12.4] {
            history.push(leak(value));
        }
        assert_eq!(history.trend(), Trend::Steady);
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let mut history = RollingHistory::new(0);
        history.push(leak(1.0));
        history.push(leak(2.0));
        assert_eq!(history.to_vec(), vec![leak(2.0)]);
    }
}
