//! Bounded FIFO of odometry events with drop-oldest overflow
//!
//! The queue itself is not synchronized; the coordinator keeps it behind the
//! same lock as the rate limiter state.

use crate::types::OdometryEvent;
use std::collections::VecDeque;

/// Bounded FIFO of pending frames
#[derive(Debug, Default)]
pub struct DataQueue {
    entries: VecDeque<OdometryEvent>,
    /// 0 = unbounded
    max_size: usize,
    /// Total number of entries evicted since creation
    evicted: u64,
}

impl DataQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_size,
            evicted: 0,
        }
    }

    /// Append an entry, evicting the oldest ones while the queue is full
    ///
    /// Returns the number of evicted entries. More than one entry is evicted
    /// when the capacity was reduced since the last push.
    pub fn push(&mut self, event: OdometryEvent) -> usize {
        let mut evicted = 0;
        while self.max_size > 0 && self.entries.len() >= self.max_size {
            self.entries.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            self.evicted += evicted as u64;
            tracing::warn!(
                "Data buffer is full, the oldest data is removed to add the new one ({} evicted)",
                evicted
            );
        }
        tracing::debug!("Added data {}", event.id());
        self.entries.push_back(event);
        evicted
    }

    /// Remove the oldest entry
    pub fn pop(&mut self) -> Option<OdometryEvent> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Change the capacity. Excess entries are evicted by the next push.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Frame ids in queue order
    pub fn ids(&self) -> Vec<i32> {
        self.entries.iter().map(OdometryEvent::id).collect()
    }
}
