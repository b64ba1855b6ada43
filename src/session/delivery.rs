//! Per-client delivery loop
//!
//! A delivery session drains one subscription into one sink. It stops when
//! the client cancels, the shutting-down hub releases it after its final
//! flush, or writing fails; in every case the subscription is dropped and the
//! subscriber unregistered.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::encoder::{self, Encoder};
use crate::error::{Error, Result};
use crate::stats::SessionStats;

use super::sink::EventSink;
use super::subscription::Subscription;

/// Delivery loop for one connected client
pub struct DeliverySession<'a, T, S: ?Sized> {
    subscription: Subscription<T>,
    sink: &'a mut S,
    encoder: Arc<dyn Encoder<T>>,
    release: watch::Receiver<bool>,
    cancel: CancellationToken,
    stats: SessionStats,
}

impl<'a, T, S> DeliverySession<'a, T, S>
where
    S: EventSink + ?Sized,
{
    /// Create a new session
    ///
    /// `release` flips to `true` once the hub has flushed for the last time.
    pub fn new(
        subscription: Subscription<T>,
        sink: &'a mut S,
        encoder: Arc<dyn Encoder<T>>,
        release: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) -> Self {
        let stats = SessionStats::new(subscription.id());
        Self {
            subscription,
            sink,
            encoder,
            release,
            cancel,
            stats,
        }
    }

    /// Run until the session ends, then unregister
    pub async fn run(mut self) -> Result<()> {
        let result = self.pump().await;

        tracing::debug!(
            subscriber_id = self.stats.subscriber_id,
            frames = self.stats.frames_sent,
            events = self.stats.events_sent,
            bytes = self.stats.bytes_sent,
            duration_ms = self.stats.duration().as_millis() as u64,
            ok = result.is_ok(),
            "Delivery session ended"
        );

        // Dropping self drops the subscription
        result
    }

    async fn pump(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Ok(()),

                batch = self.subscription.recv() => match batch {
                    Some(batch) => self.deliver(&batch).await?,
                    // Queue revoked by the hub
                    None => return Ok(()),
                },

                // Queued batches win over this branch, so remaining data is
                // drained before the session stops
                _ = released(&mut self.release) => return Ok(()),
            }
        }
    }

    /// Encode one batch and write it as a single flushed frame
    async fn deliver(&mut self, batch: &[T]) -> Result<()> {
        let payload = self.encoder.encode(batch)?;
        let frame = encoder::frame(&payload);

        self.sink.write_all(&frame).await.map_err(Error::Write)?;
        self.sink.flush().await.map_err(Error::Write)?;

        self.stats.record_frame(batch.len(), frame.len());
        Ok(())
    }

    /// Statistics gathered so far
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }
}

/// Resolves once the hub releases its sessions (or its actor is gone)
async fn released(release: &mut watch::Receiver<bool>) {
    let _ = release.wait_for(|released| *released).await;
}
