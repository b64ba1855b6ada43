//! Client delivery sessions
//!
//! Each connected client gets a [`Subscription`] (its private batch queue)
//! and a [`DeliverySession`] that drains the queue into an [`EventSink`].
//!
//! ```text
//!   HubActor ──flush──► mpsc queue ──► DeliverySession ──► encode ──► sink
//!                         (per client)       │
//!                                            └─ cancel / hub released / write error
//!                                               ──► drop Subscription ──► Unsubscribe
//! ```

pub mod channel;
pub mod delivery;
pub mod sink;
pub mod subscription;

pub use channel::{response_channel, ChannelSink, PendingResponse, ResponseHead};
pub use delivery::DeliverySession;
pub use sink::{EventSink, ResponseRecorder, SSE_HEADERS};
pub use subscription::Subscription;
