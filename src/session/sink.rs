//! Client sinks
//!
//! A sink is the writable side of one client connection. Besides being an
//! [`AsyncWrite`], it can carry response metadata for transports that have it
//! (status code, headers). Raw byte streams ignore that metadata.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, BufWriter, DuplexStream};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;

/// Response headers sent with every event stream
pub const SSE_HEADERS: [(&str, &str); 3] = [
    ("Content-Type", "text/event-stream"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
];

/// Writable, flushable destination for event-stream frames
pub trait EventSink: AsyncWrite + Unpin + Send {
    /// Whether writes can be flushed to the client one frame at a time
    fn supports_streaming(&self) -> bool {
        true
    }

    /// Set the response status, if the transport has one
    fn set_status(&mut self, _status: u16) {}

    /// Set a response header, replacing an earlier value, if the transport
    /// has headers
    fn set_header(&mut self, _name: &str, _value: &str) {}
}

impl EventSink for TcpStream {}

impl EventSink for OwnedWriteHalf {}

impl EventSink for DuplexStream {}

impl<W: AsyncWrite + Unpin + Send> EventSink for BufWriter<W> {}

/// In-memory sink that records a response
///
/// Clones share the same recording, so one clone can be handed to the hub
/// while another inspects what was written.
#[derive(Debug, Clone)]
pub struct ResponseRecorder {
    inner: Arc<Mutex<Recorded>>,
    streaming: bool,
}

#[derive(Debug, Default)]
struct Recorded {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: BytesMut,
    flushes: usize,
}

impl ResponseRecorder {
    /// Create a recorder that supports streaming
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Recorded::default())),
            streaming: true,
        }
    }

    /// Create a recorder whose writes cannot be flushed incrementally
    pub fn buffered() -> Self {
        Self {
            streaming: false,
            ..Self::new()
        }
    }

    /// Recorded status code (200 if none was set)
    pub fn status(&self) -> u16 {
        self.lock().status.unwrap_or(200)
    }

    /// First value recorded for a header, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<String> {
        self.lock()
            .headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    /// Everything written so far
    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock().body)
    }

    /// Body as UTF-8 text (lossy)
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.lock().body).into_owned()
    }

    /// Number of flushes performed
    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        // Recording stays usable even if a writer panicked mid-write
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ResponseRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncWrite for ResponseRecorder {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut recorded = self.lock();
        // Writing the body commits the status
        recorded.status.get_or_insert(200);
        recorded.body.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.lock().flushes += 1;
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl EventSink for ResponseRecorder {
    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    fn set_status(&mut self, status: u16) {
        let mut recorded = self.lock();
        if recorded.status.is_none() {
            recorded.status = Some(status);
        }
    }

    fn set_header(&mut self, name: &str, value: &str) {
        let mut recorded = self.lock();
        if recorded.body.is_empty() {
            set_header(&mut recorded.headers, name, value);
        }
    }
}

/// Replace any value already set for `name`, compared case-insensitively
pub(crate) fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    headers.push((name.to_string(), value.to_string()));
}
