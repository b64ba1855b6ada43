//! Channel-backed sink for HTTP servers
//!
//! Frameworks that build a response value (status, headers, streaming body)
//! cannot hand the hub a socket. [`response_channel`] splits a response into
//! a [`ChannelSink`], which the hub writes to, and a [`PendingResponse`],
//! which the request handler turns into the framework's response type.
//!
//! ```text
//!   Hub::handle ──► ChannelSink ──head (oneshot)──► PendingResponse ──► framework
//!                        └────────body chunks (mpsc)────────┘
//! ```
//!
//! Like an HTTP response writer, the status and headers are committed by the
//! first write (or flush, or drop). Until then `set_status` and `set_header`
//! still apply, which is how a failed stream becomes a 500.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::PollSender;

use super::sink::{self, EventSink};

/// Status line and headers of a committed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

/// Create a connected sink and pending response
///
/// `capacity` bounds the number of flushed body chunks waiting for the
/// framework to send them.
pub fn response_channel(capacity: usize) -> (ChannelSink, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(capacity.max(1));

    let sink = ChannelSink {
        status: None,
        headers: Vec::new(),
        head: Some(head_tx),
        buffer: BytesMut::new(),
        body: PollSender::new(body_tx),
    };
    let pending = PendingResponse {
        head: head_rx,
        body: body_rx,
    };
    (sink, pending)
}

/// Writing half of a response channel
pub struct ChannelSink {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    /// Taken when the head is committed
    head: Option<oneshot::Sender<ResponseHead>>,
    /// Bytes written since the last flush
    buffer: BytesMut,
    body: PollSender<Bytes>,
}

impl ChannelSink {
    /// Check if status and headers have been sent
    pub fn is_committed(&self) -> bool {
        self.head.is_none()
    }

    fn commit(&mut self) {
        if let Some(head) = self.head.take() {
            let _ = head.send(ResponseHead {
                status: self.status.unwrap_or(200),
                headers: std::mem::take(&mut self.headers),
            });
        }
    }
}

fn receiver_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "response body dropped")
}

impl AsyncWrite for ChannelSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.commit();
        if this.body.get_ref().map_or(true, |body| body.is_closed()) {
            return Poll::Ready(Err(receiver_gone()));
        }
        this.buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.commit();
        if this.buffer.is_empty() {
            return Poll::Ready(Ok(()));
        }

        if ready!(this.body.poll_reserve(cx)).is_err() {
            return Poll::Ready(Err(receiver_gone()));
        }
        let chunk = this.buffer.split().freeze();
        this.body.send_item(chunk).map_err(|_| receiver_gone())?;
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.as_mut().poll_flush(cx))?;
        self.get_mut().body.close();
        Poll::Ready(Ok(()))
    }
}

impl EventSink for ChannelSink {
    fn set_status(&mut self, status: u16) {
        if !self.is_committed() && self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn set_header(&mut self, name: &str, value: &str) {
        if !self.is_committed() {
            sink::set_header(&mut self.headers, name, value);
        }
    }
}

impl Drop for ChannelSink {
    fn drop(&mut self) {
        // A handler that never wrote still answers with its headers
        self.commit();
    }
}

impl std::fmt::Debug for ChannelSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSink")
            .field("status", &self.status)
            .field("committed", &self.is_committed())
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

/// Reading half of a response channel
#[derive(Debug)]
pub struct PendingResponse {
    head: oneshot::Receiver<ResponseHead>,
    body: mpsc::Receiver<Bytes>,
}

impl PendingResponse {
    /// Wait for the head to be committed
    ///
    /// Returns the head and the receiver of flushed body chunks. The body
    /// ends when the sink is dropped or shut down.
    pub async fn into_parts(self) -> Option<(ResponseHead, mpsc::Receiver<Bytes>)> {
        let head = self.head.await.ok()?;
        Some((head, self.body))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::error::EncodeError;
    use crate::hub::{Hub, HubConfig};

    #[tokio::test]
    async fn test_first_write_commits_head() {
        let (mut sink, pending) = response_channel(4);

        sink.set_header("Content-Type", "text/event-stream");
        sink.write_all(b"data: [1]\n\n").await.unwrap();
        sink.flush().await.unwrap();
        sink.set_status(500);
        sink.set_header("Content-Type", "text/plain");

        let (head, mut body) = pending.into_parts().await.unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(
            head.headers,
            vec![("Content-Type".to_string(), "text/event-stream".to_string())]
        );
        assert_eq!(body.recv().await.unwrap(), Bytes::from_static(b"data: [1]\n\n"));
    }

    #[tokio::test]
    async fn test_status_before_write_is_kept() {
        let (mut sink, pending) = response_channel(4);

        sink.set_status(500);
        sink.write_all(b"failed\n").await.unwrap();
        sink.flush().await.unwrap();
        drop(sink);

        let (head, mut body) = pending.into_parts().await.unwrap();
        assert_eq!(head.status, 500);
        assert_eq!(body.recv().await.unwrap(), Bytes::from_static(b"failed\n"));
        assert!(body.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_without_write_commits_empty_response() {
        let (mut sink, pending) = response_channel(4);
        sink.set_header("Cache-Control", "no-cache");
        drop(sink);

        let (head, mut body) = pending.into_parts().await.unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.headers.len(), 1);
        assert!(body.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_body_fails_writes() {
        let (mut sink, pending) = response_channel(4);
        drop(pending);

        let err = sink.write_all(b"data: []\n\n").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hub_streams_through_channel() {
        let hub: Hub<String> = Hub::new(HubConfig::new().flush_frequency(Duration::from_millis(128)));
        let (mut sink, pending) = response_channel(4);
        let cancel = CancellationToken::new();

        let server = {
            let hub = hub.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { hub.handle(&mut sink, cancel).await })
        };
        while hub.stats().await.unwrap().subscriber_count != 1 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        hub.broadcast("Event 1".to_string()).await.unwrap();

        let (head, mut body) = pending.into_parts().await.unwrap();
        assert_eq!(head.status, 200);
        assert!(head
            .headers
            .contains(&("Content-Type".to_string(), "text/event-stream".to_string())));
        assert_eq!(
            body.recv().await.unwrap(),
            Bytes::from_static(b"data: [\"Event 1\"]\n\n")
        );

        cancel.cancel();
        server.await.unwrap();
        assert!(body.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_stream_becomes_500() {
        let config = HubConfig::<String>::with_encoder(
            |_: &[String]| -> std::result::Result<Bytes, EncodeError> {
                Err(EncodeError::new("cannot encode"))
            },
        )
        .flush_frequency(Duration::from_millis(128));
        let hub = Hub::new(config);
        let (mut sink, pending) = response_channel(4);

        {
            let hub = hub.clone();
            tokio::spawn(async move { hub.handle(&mut sink, CancellationToken::new()).await });
        }
        while hub.stats().await.unwrap().subscriber_count != 1 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        hub.broadcast("x".to_string()).await.unwrap();

        let (head, mut body) = pending.into_parts().await.unwrap();
        assert_eq!(head.status, 500);
        assert!(head
            .headers
            .contains(&("Content-Type".to_string(), "text/plain; charset=utf-8".to_string())));
        assert_eq!(
            body.recv().await.unwrap(),
            Bytes::from_static(b"sse-hub: unable to encode events: cannot encode\n")
        );
    }
}
