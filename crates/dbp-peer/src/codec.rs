//! Length-delimited framing for Diameter messages.
//!
//! The decoder waits for the 4-byte version+length prefix, then the full
//! frame. Header-level corruption (wrong version, absurd length) is fatal
//! and tears the connection down; a frame whose AVPs fail to decode is
//! consumed and yielded as [`Frame::Invalid`] so the read loop can report
//! it and keep going.

use bytes::{Buf, BytesMut};
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

use dbp_core::message::HEADER_LEN;
use dbp_core::{CodecError, Message, VERSION};
use dbp_dict::Dictionary;

use crate::error::PeerError;

/// Upper bound on a single frame, against hostile length fields.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// One decoded frame off the wire.
#[derive(Debug)]
pub enum Frame {
    Message(Message),
    /// The frame was consumed but its body failed to decode.
    Invalid(CodecError),
}

pub struct MessageCodec {
    dict: Arc<Dictionary>,
}

impl MessageCodec {
    pub fn new(dict: Arc<Dictionary>) -> Self {
        Self { dict }
    }
}

impl Decoder for MessageCodec {
    type Item = Frame;
    type Error = PeerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, PeerError> {
        if src.len() < 4 {
            return Ok(None);
        }
        if src[0] != VERSION {
            return Err(CodecError::BadVersion(src[0]).into());
        }
        let length = u32::from_be_bytes([0, src[1], src[2], src[3]]) as usize;
        if length < HEADER_LEN {
            return Err(CodecError::Malformed(format!(
                "declared message length {length} below header size"
            ))
            .into());
        }
        if length > MAX_FRAME_LEN {
            return Err(CodecError::Malformed(format!(
                "declared message length {length} exceeds frame limit"
            ))
            .into());
        }
        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let frame = src.copy_to_bytes(length);
        match Message::decode(&frame, &self.dict) {
            Ok(m) => Ok(Some(Frame::Message(m))),
            Err(e) => Ok(Some(Frame::Invalid(e))),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = PeerError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), PeerError> {
        dst.extend_from_slice(&item.to_bytes());
        Ok(())
    }
}
