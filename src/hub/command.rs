//! Messages processed by the hub actor
//!
//! Every hub operation that touches actor state is one of these commands.
//! Replies go back over a `oneshot` channel once the actor has handled the
//! message. The Open to Closing transition is made on the handle side, so
//! `Shutdown` carries no reply.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::error::Result;
use crate::stats::HubStats;

/// A batch of events shared by every subscriber of one flush
pub type Batch<T> = Arc<[T]>;

/// Identifier the actor assigns to each subscriber
pub type SubscriberId = u64;

/// Command sent from a [`Hub`](super::Hub) handle to its actor
pub(crate) enum Command<T> {
    /// Append events to the pending batch
    Publish {
        events: Vec<T>,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Register a subscriber queue and replay history into it
    Subscribe {
        queue: mpsc::Sender<Batch<T>>,
        reply: oneshot::Sender<Result<SubscriberId>>,
    },

    /// Remove a subscriber (sent when its subscription is dropped)
    Unsubscribe { id: SubscriberId },

    /// Final flush, then release delivery sessions
    ///
    /// Sent once, after the handle has moved the hub to `Closing`.
    Shutdown,

    /// Snapshot counters
    Stats { reply: oneshot::Sender<HubStats> },
}
