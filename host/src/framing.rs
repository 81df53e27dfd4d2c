//! Length-prefixed framing for the native messaging channel.
//!
//! Each frame is a 4-byte **little-endian** `u32` length followed by exactly
//! that many bytes of UTF-8 JSON. Little-endian is what browsers write on
//! every platform they ship on; host and bridge must agree on it exactly.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

use crate::messages::OutboundMessage;

/// Largest frame accepted from the host (64 MiB).
pub const MAX_INBOUND_FRAME: usize = 64 * 1024 * 1024;

/// Largest frame the host will accept from us (1 MiB).
pub const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;

const LENGTH_PREFIX: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Stream ended mid-frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Codec for length-prefixed payloads. Payloads are opaque bytes here; JSON
/// decoding happens in [`crate::messages`] so one bad message does not tear
/// down the stream.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame: usize,
}

impl FrameCodec {
    pub fn new(max_frame: usize) -> Self {
        Self { max_frame }
    }

    pub fn inbound() -> Self {
        Self::new(MAX_INBOUND_FRAME)
    }

    pub fn outbound() -> Self {
        Self::new(MAX_OUTBOUND_FRAME)
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len > self.max_frame {
            return Err(FrameError::TooLarge {
                size: len,
                max: self.max_frame,
            });
        }

        if src.len() < LENGTH_PREFIX + len {
            src.reserve(LENGTH_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        Ok(Some(src.split_to(len)))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if buf.is_empty() {
            return Ok(None);
        }

        let expected = if buf.len() >= LENGTH_PREFIX {
            LENGTH_PREFIX + u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize
        } else {
            LENGTH_PREFIX
        };
        Err(FrameError::Truncated {
            expected,
            got: buf.len(),
        })
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame {
            return Err(FrameError::TooLarge {
                size: item.len(),
                max: self.max_frame,
            });
        }

        dst.reserve(LENGTH_PREFIX + item.len());
        dst.put_u32_le(item.len() as u32);
        dst.put_slice(&item);
        Ok(())
    }
}

/// Reads inbound frames one at a time.
pub struct FrameReader<R> {
    inner: FramedRead<R, FrameCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: FramedRead::new(reader, FrameCodec::inbound()),
        }
    }

    /// Next frame payload, or `None` once the peer closed the stream cleanly.
    pub async fn read_frame(&mut self) -> Result<Option<BytesMut>, FrameError> {
        self.inner.next().await.transpose()
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Cloneable handle to the outbound stream.
///
/// All producers share one lock, so frames from the session actor and the
/// main loop never interleave.
#[derive(Clone)]
pub struct FrameWriter {
    inner: Arc<Mutex<FramedWrite<BoxedWriter, FrameCodec>>>,
}

impl FrameWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_codec(writer, FrameCodec::outbound())
    }

    pub fn with_codec<W>(writer: W, codec: FrameCodec) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: BoxedWriter = Box::new(writer);
        Self {
            inner: Arc::new(Mutex::new(FramedWrite::new(boxed, codec))),
        }
    }

    /// Write one frame and flush it.
    pub async fn write_frame(&self, payload: Bytes) -> Result<(), FrameError> {
        let mut sink = self.inner.lock().await;
        sink.send(payload).await
    }

    pub async fn send(&self, message: &OutboundMessage) -> Result<(), FrameError> {
        let payload = serde_json::to_vec(message)?;
        self.write_frame(Bytes::from(payload)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut buf = (payload.len() as u32).to_le_bytes().to_vec();
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_encode_uses_little_endian_prefix() {
        let mut codec = FrameCodec::outbound();
        let mut buf = BytesMut::new();
        codec
            .encode(Bytes::from_static(br#"{"type":"ready"}"#), &mut buf)
            .unwrap();

        assert_eq!(&buf[..4], &[16, 0, 0, 0]);
        assert_eq!(&buf[4..], br#"{"type":"ready"}"#);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut codec = FrameCodec::inbound();
        let mut buf = BytesMut::new();
        let payload = Bytes::from(r#"{"type":"evaluate","fen":"8/8/8/8/8/8/8/8 w - - 0 1"}"#);
        codec.encode(payload.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&decoded[..], &payload[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame() {
        let mut codec = FrameCodec::inbound();
        let full = frame(br#"{"type":"stop"}"#);

        let mut partial = BytesMut::from(&full[..2]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        let mut partial = BytesMut::from(&full[..7]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[7..]);
        assert_eq!(&codec.decode(&mut partial).unwrap().unwrap()[..], br#"{"type":"stop"}"#);
    }

    #[test]
    fn test_oversized_length_is_rejected() {
        let mut codec = FrameCodec::new(8);
        let mut buf = BytesMut::from(&frame(b"0123456789")[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::TooLarge { size: 10, max: 8 })
        ));
    }

    #[test]
    fn test_oversized_outbound_is_rejected() {
        let mut codec = FrameCodec::new(4);
        let mut buf = BytesMut::new();
        let result = codec.encode(Bytes::from_static(b"hello"), &mut buf);
        assert!(matches!(result, Err(FrameError::TooLarge { .. })));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_reader_reports_clean_eof() {
        let mut bytes = frame(br#"{"type":"reset"}"#);
        bytes.extend(frame(br#"{"type":"quit"}"#));
        let mut reader = FrameReader::new(&bytes[..]);

        assert_eq!(&reader.read_frame().await.unwrap().unwrap()[..], br#"{"type":"reset"}"#);
        assert_eq!(&reader.read_frame().await.unwrap().unwrap()[..], br#"{"type":"quit"}"#);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_reports_truncation() {
        let bytes = frame(br#"{"type":"reset"}"#);
        let mut reader = FrameReader::new(&bytes[..bytes.len() - 3]);

        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::Truncated { expected: 20, got: 17 }));
    }

    #[tokio::test]
    async fn test_writer_frames_are_readable() {
        let (client, server) = tokio::io::duplex(1024);
        let writer = FrameWriter::new(server);
        writer.send(&OutboundMessage::Ready).await.unwrap();
        writer
            .send(&OutboundMessage::Debug {
                message: "hello".into(),
            })
            .await
            .unwrap();

        let mut reader = FrameReader::new(client);
        let first = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(&first[..], br#"{"type":"ready"}"#);
        let second = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(&second[..], br#"{"type":"debug","message":"hello"}"#);
    }
}
