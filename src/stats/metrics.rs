//! Statistics for the hub and its delivery sessions

use std::time::{Duration, Instant};

use crate::hub::HubState;

/// Session-level statistics
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Subscriber ID assigned by the hub
    pub subscriber_id: u64,
    /// When the session started
    pub started_at: Instant,
    /// Frames written to the sink
    pub frames_sent: u64,
    /// Events contained in those frames
    pub events_sent: u64,
    /// Bytes written to the sink, framing included
    pub bytes_sent: u64,
}

impl SessionStats {
    /// Create a new stats tracker
    pub fn new(subscriber_id: u64) -> Self {
        Self {
            subscriber_id,
            started_at: Instant::now(),
            frames_sent: 0,
            events_sent: 0,
            bytes_sent: 0,
        }
    }

    /// Record one written frame
    pub fn record_frame(&mut self, events: usize, bytes: usize) {
        self.frames_sent += 1;
        self.events_sent += events as u64;
        self.bytes_sent += bytes as u64;
    }

    /// Time since the session started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Hub-wide statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStats {
    /// Current lifecycle state
    pub state: HubState,
    /// Registered subscribers
    pub subscriber_count: usize,
    /// Events waiting for the next flush
    pub pending_events: usize,
    /// Events currently held for replay
    pub replay_len: usize,
    /// Events accepted since the hub started
    pub total_published: u64,
    /// Non-empty flushes since the hub started
    pub total_flushes: u64,
}
