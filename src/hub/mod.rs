//! Broadcast hub
//!
//! The hub batches published events, fans each batch out to every connected
//! subscriber and keeps a replay buffer for clients that connect late.
//!
//! # Architecture
//!
//! ```text
//!      Hub<T> (cloneable handle)
//!   publish / subscribe / shutdown
//!                 │ Command + oneshot reply
//!                 ▼
//!     ┌─────────────────────────┐
//!     │ HubActor (one task)     │
//!     │   pending: Vec<T>       │
//!     │   replay: ReplayBuffer  │
//!     │   subscribers: HashMap< │
//!     │     id, mpsc::Sender>   │
//!     └───────────┬─────────────┘
//!                 │ every flush_frequency
//!     ┌───────────┼───────────┐
//!     ▼           ▼           ▼
//! [Session]   [Session]   [Session]
//!  sink         sink        sink
//! ```
//!
//! # Batches
//!
//! A flushed batch is an `Arc<[T]>`, so every subscriber shares the same
//! allocation; only the reference count is bumped per queue.
//!
//! # Backpressure
//!
//! The actor awaits each subscriber queue in turn while flushing. A client
//! that stops reading delays delivery to the others (it never corrupts it)
//! until its queue has room or it disconnects.

pub(crate) mod actor;
pub mod command;
pub mod config;
pub mod handle;
pub mod state;

pub use command::{Batch, SubscriberId};
pub use config::{HubConfig, ReplayConfig};
pub use handle::Hub;
pub use state::HubState;
