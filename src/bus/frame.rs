//! Maple frame encoding and decoding
//!
//! A frame is a four byte header followed by a payload whose length is given
//! in 4-byte words:
//!
//! ```text
//! offset 0: command
//! offset 1: destination address
//! offset 2: origin address
//! offset 3: payload word count
//! offset 4: payload (word count * 4 bytes)
//! ```
//!
//! The same functions are used by both ends of the tunnel, so sender and
//! receiver always agree on frame sizes.

use std::fmt;
use thiserror::Error;

use crate::bus::constants::*;

/// Frame opcodes
///
/// Only the opcodes the tunnel uses are named. Everything else is carried
/// as `Other` and passes through the codec unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    DeviceRequest,
    AllStatusRequest,
    DeviceReset,
    DeviceKill,
    DeviceStatus,
    DeviceAllStatus,
    DeviceReply,
    DataTransfer,
    GetCondition,
    GetMediaInfo,
    BlockRead,
    BlockWrite,
    GetLastError,
    SetCondition,
    FileError,
    RequestResend,
    UnknownCommand,
    FunctionUnsupported,
    NoResponse,
    Other(u8),
}

impl From<u8> for Command {
    fn from(byte: u8) -> Self {
        match byte {
            0x01 => Command::DeviceRequest,
            0x02 => Command::AllStatusRequest,
            0x03 => Command::DeviceReset,
            0x04 => Command::DeviceKill,
            0x05 => Command::DeviceStatus,
            0x06 => Command::DeviceAllStatus,
            0x07 => Command::DeviceReply,
            0x08 => Command::DataTransfer,
            0x09 => Command::GetCondition,
            0x0A => Command::GetMediaInfo,
            0x0B => Command::BlockRead,
            0x0C => Command::BlockWrite,
            0x0D => Command::GetLastError,
            0x0E => Command::SetCondition,
            0xFB => Command::FileError,
            0xFC => Command::RequestResend,
            0xFD => Command::UnknownCommand,
            0xFE => Command::FunctionUnsupported,
            0xFF => Command::NoResponse,
            other => Command::Other(other),
        }
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> u8 {
        match command {
            Command::DeviceRequest => 0x01,
            Command::AllStatusRequest => 0x02,
            Command::DeviceReset => 0x03,
            Command::DeviceKill => 0x04,
            Command::DeviceStatus => 0x05,
            Command::DeviceAllStatus => 0x06,
            Command::DeviceReply => 0x07,
            Command::DataTransfer => 0x08,
            Command::GetCondition => 0x09,
            Command::GetMediaInfo => 0x0A,
            Command::BlockRead => 0x0B,
            Command::BlockWrite => 0x0C,
            Command::GetLastError => 0x0D,
            Command::SetCondition => 0x0E,
            Command::FileError => 0xFB,
            Command::RequestResend => 0xFC,
            Command::UnknownCommand => 0xFD,
            Command::FunctionUnsupported => 0xFE,
            Command::NoResponse => 0xFF,
            Command::Other(byte) => byte,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("payload of {len} bytes exceeds the {max} byte frame limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("truncated frame: need {needed} bytes, have {available}")]
    TruncatedFrame { needed: usize, available: usize },
}

/// Number of words needed to carry `len` payload bytes
pub fn words_for(len: usize) -> usize {
    len.div_ceil(WORD_SIZE)
}

/// Total frame length announced by a header, or `None` if fewer than
/// `HEADER_SIZE` bytes are available
pub fn frame_len_from_header(raw: &[u8]) -> Option<usize> {
    if raw.len() < HEADER_SIZE {
        return None;
    }
    Some(HEADER_SIZE + raw[3] as usize * WORD_SIZE)
}

/// One maple bus frame
#[derive(Clone, PartialEq, Eq)]
pub struct BusFrame {
    pub command: Command,
    pub destination: u8,
    pub origin: u8,
    word_count: u8,
    payload: [u8; PAYLOAD_CAPACITY],
}

impl BusFrame {
    /// Build a frame, padding the payload with zeros up to the next word
    pub fn encode(
        command: Command,
        destination: u8,
        origin: u8,
        payload: &[u8],
    ) -> Result<Self, CodecError> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(CodecError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_BYTES,
            });
        }

        let mut buffer = [0u8; PAYLOAD_CAPACITY];
        buffer[..payload.len()].copy_from_slice(payload);

        Ok(Self {
            command,
            destination,
            origin,
            word_count: words_for(payload.len()) as u8,
            payload: buffer,
        })
    }

    /// Header-only frame (zero payload words)
    pub fn empty(command: Command, destination: u8, origin: u8) -> Self {
        Self {
            command,
            destination,
            origin,
            word_count: 0,
            payload: [0u8; PAYLOAD_CAPACITY],
        }
    }

    /// Parse one frame from the start of `raw`. Bytes after the frame are ignored.
    pub fn decode(raw: &[u8]) -> Result<Self, CodecError> {
        let needed = frame_len_from_header(raw).ok_or(CodecError::TruncatedFrame {
            needed: HEADER_SIZE,
            available: raw.len(),
        })?;
        if raw.len() < needed {
            return Err(CodecError::TruncatedFrame {
                needed,
                available: raw.len(),
            });
        }

        let mut buffer = [0u8; PAYLOAD_CAPACITY];
        let data = &raw[HEADER_SIZE..needed];
        buffer[..data.len()].copy_from_slice(data);

        Ok(Self {
            command: Command::from(raw[0]),
            destination: raw[1],
            origin: raw[2],
            word_count: raw[3],
            payload: buffer,
        })
    }

    pub fn word_count(&self) -> u8 {
        self.word_count
    }

    /// Nominal payload length on the wire (`word_count * 4`).
    /// Can exceed the logical payload length because of word rounding.
    pub fn data_byte_size(&self) -> usize {
        self.word_count as usize * WORD_SIZE
    }

    /// Wire-significant payload bytes, padding included
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.data_byte_size()]
    }

    pub fn header(&self) -> [u8; HEADER_SIZE] {
        [self.command.into(), self.destination, self.origin, self.word_count]
    }

    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.data_byte_size()
    }

    /// Exact byte sequence written to the socket
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.wire_len());
        bytes.extend_from_slice(&self.header());
        bytes.extend_from_slice(self.payload());
        bytes
    }
}

impl fmt::Debug for BusFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusFrame")
            .field("command", &self.command)
            .field("destination", &format_args!("0x{:02X}", self.destination))
            .field("origin", &format_args!("0x{:02X}", self.origin))
            .field("word_count", &self.word_count)
            .field("payload", &format_args!("{:02X?}", self.payload()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_length_and_round_trip_law() {
        for n in 0..=MAX_PAYLOAD_BYTES {
            // Non-zero bytes so padding is distinguishable from data
            let payload: Vec<u8> = (0..n).map(|i| (i % 255) as u8 + 1).collect();
            let frame = BusFrame::encode(Command::GetCondition, 0x60, 0x40, &payload).unwrap();
            let words = n.div_ceil(4);
            assert_eq!(frame.word_count() as usize, words, "n = {}", n);

            let bytes = frame.to_bytes();
            assert_eq!(bytes.len(), 4 + words * 4, "n = {}", n);

            let decoded = BusFrame::decode(&bytes).unwrap();
            assert_eq!(decoded.command, Command::GetCondition, "n = {}", n);
            assert_eq!(decoded.destination, 0x60, "n = {}", n);
            assert_eq!(decoded.origin, 0x40, "n = {}", n);
            assert_eq!(decoded.data_byte_size(), words * 4, "n = {}", n);
            assert_eq!(&decoded.payload()[..n], payload.as_slice(), "n = {}", n);
            assert!(decoded.payload()[n..].iter().all(|&b| b == 0), "n = {}", n);
            assert_eq!(decoded, frame, "n = {}", n);
        }
    }

    #[test]
    fn test_three_byte_payload_pads_to_one_word() {
        let frame = BusFrame::encode(Command::DataTransfer, 0x00, 0x20, &[1, 2, 3]).unwrap();
        assert_eq!(frame.word_count(), 1);

        let bytes = frame.to_bytes();
        assert_eq!(bytes, vec![0x08, 0x00, 0x20, 0x01, 1, 2, 3, 0]);
        assert_eq!(bytes[7], 0);
    }

    #[test]
    fn test_payload_limit() {
        assert!(BusFrame::encode(Command::BlockWrite, 0, 0, &[0; 1020]).is_ok());
        assert_eq!(
            BusFrame::encode(Command::BlockWrite, 0, 0, &[0; 1021]).unwrap_err(),
            CodecError::PayloadTooLarge { len: 1021, max: 1020 }
        );
    }

    #[test]
    fn test_capacity_is_wider_than_addressable_payload() {
        // The one-byte word count cannot describe the last word of the buffer.
        assert_eq!(PAYLOAD_CAPACITY - MAX_PAYLOAD_BYTES, WORD_SIZE);
        assert!(BusFrame::encode(Command::BlockWrite, 0, 0, &[0; PAYLOAD_CAPACITY]).is_err());
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(
            BusFrame::decode(&[0x01, 0x20, 0x00]).unwrap_err(),
            CodecError::TruncatedFrame { needed: 4, available: 3 }
        );

        // Header announces two words, only one is present
        let raw = [0x08, 0x00, 0x20, 0x02, 1, 2, 3, 4];
        assert_eq!(
            BusFrame::decode(&raw).unwrap_err(),
            CodecError::TruncatedFrame { needed: 12, available: 8 }
        );
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let raw = [0x05, 0x00, 0x20, 0x01, 0x03, 0, 0, 0, 0xEE, 0xEE];
        let frame = BusFrame::decode(&raw).unwrap();
        assert_eq!(frame.command, Command::DeviceStatus);
        assert_eq!(frame.payload(), &[0x03, 0, 0, 0]);
    }

    #[test]
    fn test_unknown_opcode_passes_through() {
        let frame = BusFrame::encode(Command::from(0x42), 0x01, 0x02, &[]).unwrap();
        assert_eq!(frame.command, Command::Other(0x42));
        assert_eq!(frame.to_bytes(), vec![0x42, 0x01, 0x02, 0x00]);

        let decoded = BusFrame::decode(&frame.to_bytes()).unwrap();
        assert_eq!(u8::from(decoded.command), 0x42);
    }

    #[test]
    fn test_named_opcodes_round_trip_through_u8() {
        for byte in 0..=u8::MAX {
            assert_eq!(u8::from(Command::from(byte)), byte);
        }
    }
}
