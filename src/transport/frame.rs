//! Binary audio frame codec.
//!
//! Wire format:
//! ```text
//! +--------+--------------------+-----------------+
//! | Type   | Sequence           | Payload         |
//! | 1 byte | 4 bytes (BE u32)   | remaining bytes |
//! +--------+--------------------+-----------------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{
    FRAME_HEADER_SIZE, FRAME_TYPE_AUDIO_IN, FRAME_TYPE_AUDIO_IN_OPUS, FRAME_TYPE_AUDIO_OUT,
    FRAME_TYPE_AUDIO_OUT_OPUS,
};

/// Binary frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FrameType {
    /// Microphone PCM, client to server.
    AudioIn = FRAME_TYPE_AUDIO_IN,
    /// Synthesized PCM, server to client.
    AudioOut = FRAME_TYPE_AUDIO_OUT,
    /// Opus microphone audio.
    AudioInOpus = FRAME_TYPE_AUDIO_IN_OPUS,
    /// Opus synthesized audio.
    AudioOutOpus = FRAME_TYPE_AUDIO_OUT_OPUS,
}

impl FrameType {
    /// Parse frame type from a byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            FRAME_TYPE_AUDIO_IN => Some(Self::AudioIn),
            FRAME_TYPE_AUDIO_OUT => Some(Self::AudioOut),
            FRAME_TYPE_AUDIO_IN_OPUS => Some(Self::AudioInOpus),
            FRAME_TYPE_AUDIO_OUT_OPUS => Some(Self::AudioOutOpus),
            _ => None,
        }
    }

    /// Convert frame type to its byte representation.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether the frame carries synthesized (server) audio.
    pub fn is_outbound_audio(self) -> bool {
        matches!(self, Self::AudioOut | Self::AudioOutOpus)
    }

    /// Whether the payload is Opus.
    pub fn is_opus(self) -> bool {
        matches!(self, Self::AudioInOpus | Self::AudioOutOpus)
    }
}

/// Frame decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Frame is too short.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// Invalid frame type.
    #[error("invalid frame type: 0x{0:02x}")]
    InvalidType(u8),
}

/// One binary frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFrame {
    /// Frame type.
    pub frame_type: FrameType,
    /// Per-direction sequence number.
    pub sequence: u32,
    /// Audio payload.
    pub payload: Bytes,
}

impl BinaryFrame {
    /// Create a frame.
    pub fn new(frame_type: FrameType, sequence: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            sequence,
            payload: payload.into(),
        }
    }

    /// Total encoded size.
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.frame_type.as_byte());
        buf.put_u32(self.sequence);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: FRAME_HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let frame_type = FrameType::from_byte(bytes[0]).ok_or(FrameError::InvalidType(bytes[0]))?;
        let sequence = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);

        Ok(Self {
            frame_type,
            sequence,
            payload: Bytes::copy_from_slice(&bytes[FRAME_HEADER_SIZE..]),
        })
    }
}
