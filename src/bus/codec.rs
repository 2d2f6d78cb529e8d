//! Async stream framing for maple frames
//!
//! Wraps `BusFrame::encode`/`decode` in a `tokio_util` codec so the endpoint
//! side can read frames off a TCP stream with `Framed`.

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::bus::frame::{frame_len_from_header, BusFrame, CodecError};

#[derive(Debug, Error)]
pub enum FrameCodecError {
    #[error("stream I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Frame(#[from] CodecError),
}

/// Length-aware maple frame codec
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = BusFrame;
    type Error = FrameCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame_len) = frame_len_from_header(&src[..]) else {
            return Ok(None);
        };
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let frame = BusFrame::decode(&src[..frame_len])?;
        src.advance(frame_len);
        Ok(Some(frame))
    }
}

impl Encoder<BusFrame> for FrameCodec {
    type Error = FrameCodecError;

    fn encode(&mut self, frame: BusFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(frame.wire_len());
        dst.put_slice(&frame.header());
        dst.put_slice(frame.payload());
        Ok(())
    }
}
