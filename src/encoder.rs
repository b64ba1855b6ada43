//! Batch encoding and SSE framing
//!
//! An [`Encoder`] turns one batch of events into the payload of a single
//! `data:` line. The default [`JsonEncoder`] serializes the batch as a JSON
//! array; any `Fn(&[T]) -> Result<Bytes, EncodeError>` closure can be used
//! instead.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::EncodeError;

/// Prefix of every event-stream frame
pub const FRAME_PREFIX: &[u8] = b"data: ";

/// Terminator of every event-stream frame
pub const FRAME_SUFFIX: &[u8] = b"\n\n";

/// Converts a batch of events into bytes
pub trait Encoder<T>: Send + Sync {
    /// Encode the batch, preserving event order
    fn encode(&self, batch: &[T]) -> Result<Bytes, EncodeError>;
}

impl<T, F> Encoder<T> for F
where
    F: Fn(&[T]) -> Result<Bytes, EncodeError> + Send + Sync,
{
    fn encode(&self, batch: &[T]) -> Result<Bytes, EncodeError> {
        self(batch)
    }
}

/// Default encoder: the batch as a JSON array
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl<T: Serialize> Encoder<T> for JsonEncoder {
    fn encode(&self, batch: &[T]) -> Result<Bytes, EncodeError> {
        let data = serde_json::to_vec(batch)?;
        Ok(Bytes::from(data))
    }
}

/// Wrap an encoded payload into a single `data: <payload>\n\n` frame
pub fn frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_PREFIX.len() + payload.len() + FRAME_SUFFIX.len());
    buf.put_slice(FRAME_PREFIX);
    buf.put_slice(payload);
    buf.put_slice(FRAME_SUFFIX);
    buf.freeze()
}
