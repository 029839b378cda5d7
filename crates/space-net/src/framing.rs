//! Length-prefixed framing for the TCP transport
//!
//! Wire format: 4-byte big-endian length (covers the type byte and payload),
//! 1 byte frame type, then the JSON payload. `Sync` frames carry a
//! [`space_core::sync::SyncFrame`] serialized as JSON; `Ping`/`Pong` carry no
//! payload and exist purely as a liveness check above TCP's own keepalive.

use bytes::{Buf, BufMut, BytesMut};
use space_core::limits::MAX_WIRE_MESSAGE_BYTES;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Errors from encoding or decoding a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {0} bytes (max {MAX_WIRE_MESSAGE_BYTES})")]
    TooLarge(usize),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown frame type: {0}")]
    UnknownType(u8),
}

/// A length-prefixed frame.
#[derive(Clone, Debug)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Vec<u8>,
}

/// Frame types carried over a [`crate::transport::Connection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Ping = 0,
    Pong = 1,
    Sync = 10,
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ping),
            1 => Ok(Self::Pong),
            10 => Ok(Self::Sync),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

impl Frame {
    pub fn new(frame_type: FrameType, payload: Vec<u8>) -> Self {
        Self { frame_type, payload }
    }

    pub fn ping() -> Self {
        Self::new(FrameType::Ping, Vec::new())
    }

    pub fn pong() -> Self {
        Self::new(FrameType::Pong, Vec::new())
    }

    /// Wrap a [`space_core::sync::SyncFrame`] as a JSON `Sync` frame.
    pub fn sync(frame: &space_core::sync::SyncFrame) -> Result<Self, FrameError> {
        let payload = serde_json::to_vec(frame)
            .map_err(|e| FrameError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        Ok(Self::new(FrameType::Sync, payload))
    }

    /// Parse this frame's payload back into a [`space_core::sync::SyncFrame`].
    pub fn into_sync(self) -> Result<space_core::sync::SyncFrame, FrameError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| FrameError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }
}

/// `tokio_util` codec implementing the `[len:u32][type:u8][payload]` wire
/// format described above.
#[derive(Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 5 {
            return Ok(None);
        }
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length > MAX_WIRE_MESSAGE_BYTES {
            return Err(FrameError::TooLarge(length));
        }
        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        src.advance(4);
        let frame_type = FrameType::try_from(src[0])?;
        src.advance(1);
        let payload = src.split_to(length - 1).to_vec();

        Ok(Some(Frame { frame_type, payload }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let length = 1 + item.payload.len();
        if length > MAX_WIRE_MESSAGE_BYTES {
            return Err(FrameError::TooLarge(length));
        }
        dst.reserve(4 + length);
        dst.put_u32(length as u32);
        dst.put_u8(item.frame_type as u8);
        dst.put_slice(&item.payload);
        Ok(())
    }
}
