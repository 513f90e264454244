//! Bounded buffer of timestamped samples

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Capacity of the status history and the spectrum buffer
pub const DEFAULT_CAPACITY: usize = 100;

/// A value and when it was taken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample<T> {
    /// Capture time.
    pub timestamp: DateTime<Utc>,
    /// Captured value.
    pub value: T,
}

/// Ring of the most recent samples; the oldest is dropped when full
#[derive(Debug, Clone)]
pub struct TimeSeries<T> {
    capacity: usize,
    samples: VecDeque<Sample<T>>,
}

impl<T> TimeSeries<T> {
    /// Create a series holding at most `capacity` samples (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a value stamped with the current time
    pub fn push(&mut self, value: T) {
        self.push_at(Utc::now(), value);
    }

    /// Append a value with an explicit timestamp
    pub fn push_at(&mut self, timestamp: DateTime<Utc>, value: T) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { timestamp, value });
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<&Sample<T>> {
        self.samples.back()
    }

    /// Samples from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Sample<T>> {
        self.samples.iter()
    }

    /// Number of samples held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the series is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every sample
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl<T: Clone> TimeSeries<T> {
    /// Copy of the samples from oldest to newest
    pub fn to_vec(&self) -> Vec<Sample<T>> {
        self.samples.iter().cloned().collect()
    }
}

impl<T> Default for TimeSeries<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
