//! # sse-hub
//!
//! In-process Server-Sent Events broadcast hub.
//!
//! Producers publish events of any type `T`; the hub batches them every
//! `flush_frequency`, fans each batch out to all connected clients as one
//! `data: ...\n\n` frame, and replays recent history to clients that connect
//! late. Shutdown waits until every client has gone or a timeout elapses.
//!
//! ```no_run
//! use sse_hub::{Hub, HubConfig, ResponseRecorder};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> sse_hub::Result<()> {
//! let hub: Hub<String> = Hub::new(HubConfig::new());
//!
//! let client = hub.clone();
//! tokio::spawn(async move {
//!     let mut sink = ResponseRecorder::new();
//!     client.handle(&mut sink, CancellationToken::new()).await;
//! });
//!
//! hub.broadcast("hello".to_string()).await?;
//! hub.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//! - [`hub`]: the actor that owns subscribers, batching and replay
//! - [`session`]: per-client delivery loop and sinks, including a
//!   channel-backed sink for HTTP frameworks
//! - [`replay`]: bounded, time-windowed history buffer
//! - [`encoder`]: batch encoding and event-stream framing
//! - [`stats`]: hub and session counters

pub mod encoder;
pub mod error;
pub mod hub;
pub mod replay;
pub mod session;
pub mod stats;

pub use encoder::{Encoder, JsonEncoder};
pub use error::{EncodeError, Error, Result};
pub use hub::{Batch, Hub, HubConfig, HubState, ReplayConfig};
pub use replay::ReplayBuffer;
pub use session::{
    response_channel, ChannelSink, EventSink, PendingResponse, ResponseHead, ResponseRecorder,
    Subscription, SSE_HEADERS,
};
pub use stats::{HubStats, SessionStats};
