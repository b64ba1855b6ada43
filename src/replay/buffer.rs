//! Replay buffer for late-joiner support
//!
//! When a new client connects, it should first receive the events that were
//! broadcast shortly before it arrived. The buffer keeps those events bounded
//! in two dimensions:
//! 1. Count: never more than `maximum` entries, oldest dropped first
//! 2. Age: no entry older than `expiry`, purged on insert and skipped on read
//!
//! Timestamps come from `tokio::time::Instant`, so tests can drive eviction
//! with a paused clock.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// A buffered event with its insertion time
#[derive(Debug, Clone)]
struct ReplayEntry<T> {
    event: T,
    inserted_at: Instant,
}

/// Bounded, time-windowed history of recently broadcast events
#[derive(Debug)]
pub struct ReplayBuffer<T> {
    /// Maximum number of retained entries
    maximum: usize,
    /// Maximum age of a retained entry
    expiry: Duration,
    /// Entries in insertion order, oldest at the front
    entries: VecDeque<ReplayEntry<T>>,
}

impl<T> ReplayBuffer<T> {
    /// Create a new replay buffer
    pub fn new(maximum: usize, expiry: Duration) -> Self {
        Self {
            maximum,
            expiry,
            entries: VecDeque::with_capacity(maximum.min(1024)),
        }
    }

    /// Append events, then evict expired and overflowing entries from the front
    pub fn add<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = T>,
    {
        let now = Instant::now();
        for event in events {
            self.entries.push_back(ReplayEntry {
                event,
                inserted_at: now,
            });
        }

        self.evict_expired(now);
        if self.entries.len() > self.maximum {
            let overflow = self.entries.len() - self.maximum;
            self.entries.drain(..overflow);
        }
    }

    /// Drop every entry older than `expiry`
    ///
    /// Returns the number of evicted entries.
    pub fn purge_expired(&mut self) -> usize {
        self.evict_expired(Instant::now())
    }

    fn evict_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        while let Some(front) = self.entries.front() {
            if now.saturating_duration_since(front.inserted_at) <= self.expiry {
                break;
            }
            self.entries.pop_front();
        }
        before - self.entries.len()
    }

    /// Iterate over the non-expired events in insertion order
    ///
    /// The iterator is lazy and never mutates the buffer, so it can be
    /// abandoned part-way through.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.entries.iter(),
            now: Instant::now(),
            expiry: self.expiry,
        }
    }

    /// Iterate over the non-expired events in chunks of at most `size`
    ///
    /// A `size` of zero is treated as one.
    pub fn chunks(&self, size: usize) -> Chunks<'_, T>
    where
        T: Clone,
    {
        Chunks {
            inner: self.iter(),
            size: size.max(1),
        }
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries (expired ones not yet purged included)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the buffer holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured entry limit
    pub fn maximum(&self) -> usize {
        self.maximum
    }

    /// Configured entry lifetime
    pub fn expiry(&self) -> Duration {
        self.expiry
    }
}

/// Lazy iterator over live replay events, see [`ReplayBuffer::iter`]
pub struct Iter<'a, T> {
    inner: std::collections::vec_deque::Iter<'a, ReplayEntry<T>>,
    now: Instant,
    expiry: Duration,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        // Entries are ordered by age, so expired ones only sit at the front.
        for entry in self.inner.by_ref() {
            if self.now.saturating_duration_since(entry.inserted_at) <= self.expiry {
                return Some(&entry.event);
            }
        }
        None
    }
}

/// Lazy chunked iterator, see [`ReplayBuffer::chunks`]
pub struct Chunks<'a, T> {
    inner: Iter<'a, T>,
    size: usize,
}

impl<T: Clone> Iterator for Chunks<'_, T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk: Vec<T> = self.inner.by_ref().take(self.size).cloned().collect();
        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}
