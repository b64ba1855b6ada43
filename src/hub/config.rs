//! Hub configuration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::encoder::{Encoder, JsonEncoder};

/// Default batching interval
pub const DEFAULT_FLUSH_FREQUENCY: Duration = Duration::from_millis(256);

/// Default graceful shutdown timeout
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum number of events per replay chunk
pub const DEFAULT_REPLAY_INITIAL: usize = 256;

/// Default maximum number of events kept for replay
pub const DEFAULT_REPLAY_MAXIMUM: usize = 2048;

/// Default lifetime of a replayable event
pub const DEFAULT_REPLAY_EXPIRY: Duration = Duration::from_secs(30);

/// Replay options applied when a client connects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayConfig {
    /// How many events to send per chunk when a client connects
    pub initial: usize,

    /// How many events to keep in memory
    pub maximum: usize,

    /// How long an event is kept in memory
    pub expiry: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            initial: DEFAULT_REPLAY_INITIAL,
            maximum: DEFAULT_REPLAY_MAXIMUM,
            expiry: DEFAULT_REPLAY_EXPIRY,
        }
    }
}

/// Hub configuration options
pub struct HubConfig<T> {
    /// How often pending events are flushed to connected clients
    pub flush_frequency: Duration,

    /// How long [`Hub::shutdown`](crate::Hub::shutdown) waits for clients to disconnect
    pub close_timeout: Duration,

    /// Replay settings
    pub replay: ReplayConfig,

    /// Capacity of each subscriber's batch queue
    pub queue_capacity: usize,

    /// Batch encoder
    pub encoder: Arc<dyn Encoder<T>>,
}

impl<T: Serialize + 'static> HubConfig<T> {
    /// Create a config with default settings and the JSON encoder
    pub fn new() -> Self {
        Self::with_encoder(JsonEncoder)
    }
}

impl<T: Serialize + 'static> Default for HubConfig<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HubConfig<T> {
    /// Create a config with default settings and a custom encoder
    ///
    /// This is the only constructor available for event types that do not
    /// implement `Serialize`.
    pub fn with_encoder<E>(encoder: E) -> Self
    where
        E: Encoder<T> + 'static,
    {
        Self {
            flush_frequency: DEFAULT_FLUSH_FREQUENCY,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            replay: ReplayConfig::default(),
            queue_capacity: 1,
            encoder: Arc::new(encoder),
        }
    }

    /// Set the flush frequency
    pub fn flush_frequency(mut self, frequency: Duration) -> Self {
        self.flush_frequency = frequency.max(Duration::from_millis(1));
        self
    }

    /// Set the close timeout
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set the replay chunk size
    pub fn replay_initial(mut self, initial: usize) -> Self {
        self.replay.initial = initial.max(1);
        self
    }

    /// Set the number of events kept for replay
    pub fn replay_maximum(mut self, maximum: usize) -> Self {
        self.replay.maximum = maximum;
        self
    }

    /// Set how long events are kept for replay
    pub fn replay_expiry(mut self, expiry: Duration) -> Self {
        self.replay.expiry = expiry;
        self
    }

    /// Disable replay for new clients
    pub fn disable_replay(mut self) -> Self {
        self.replay.maximum = 0;
        self
    }

    /// Set the per-subscriber queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Replace the encoder
    pub fn encoder<E>(mut self, encoder: E) -> Self
    where
        E: Encoder<T> + 'static,
    {
        self.encoder = Arc::new(encoder);
        self
    }
}

impl<T> Clone for HubConfig<T> {
    fn clone(&self) -> Self {
        Self {
            flush_frequency: self.flush_frequency,
            close_timeout: self.close_timeout,
            replay: self.replay,
            queue_capacity: self.queue_capacity,
            encoder: Arc::clone(&self.encoder),
        }
    }
}

impl<T> fmt::Debug for HubConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubConfig")
            .field("flush_frequency", &self.flush_frequency)
            .field("close_timeout", &self.close_timeout)
            .field("replay", &self.replay)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}
