//! Maple bus tunnel protocol constants
//!
//! This module contains the constants needed to talk to a tunnel endpoint:
//! - Transport endpoint (loopback host, base port)
//! - Frame geometry (header, word size, payload limits)
//! - Bus addressing and function codes
//! - Capability bits and default timeouts

use std::net::{IpAddr, Ipv4Addr};

// ============================================================================
// Transport
// ============================================================================

/// Default loopback host of the tunnel endpoints
pub const LOOPBACK_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// TCP port of bus 0; bus N listens on `BASE_PORT + N`
pub const BASE_PORT: u16 = 37393;

/// Number of controller ports on the bus
pub const BUS_COUNT: usize = 4;

// ============================================================================
// Frame geometry
// ============================================================================

/// Header: command, destination, origin, word count
pub const HEADER_SIZE: usize = 4;

/// Payload length unit used by the word count field
pub const WORD_SIZE: usize = 4;

/// Storage capacity of a frame payload buffer
pub const PAYLOAD_CAPACITY: usize = 1024;

/// Largest word count a one-byte field can carry
pub const MAX_PAYLOAD_WORDS: usize = u8::MAX as usize;

/// Largest payload the header can describe (255 words).
/// Four bytes short of `PAYLOAD_CAPACITY`; the tail of the buffer is never sent.
pub const MAX_PAYLOAD_BYTES: usize = MAX_PAYLOAD_WORDS * WORD_SIZE;

// ============================================================================
// Addressing
// ============================================================================

/// Bus index occupies the top two bits of an address byte
pub const PORT_SHIFT: u8 = 6;

/// Unit bits of the host side
pub const UNIT_HOST: u8 = 0x00;

/// Unit bit of the main peripheral (the controller itself)
pub const UNIT_MAIN: u8 = 0x20;

/// Unit bit of expansion slot 1 (memory unit)
pub const UNIT_EXPANSION_1: u8 = 0x01;

/// Unit bit of expansion slot 2 (rumble pack)
pub const UNIT_EXPANSION_2: u8 = 0x02;

/// Mask of the expansion slot bits
pub const UNIT_EXPANSION_MASK: u8 = 0x1F;

// ============================================================================
// Function codes (written little-endian at the start of a data payload)
// ============================================================================

/// Standard controller
pub const FUNCTION_CONTROLLER: u32 = 0x0100_0000;

// ============================================================================
// Capability bits (byte 0 of the capability response)
// ============================================================================

/// Storage accessory present
pub const CAP_STORAGE: u8 = 0x01;

/// Haptic accessory present
pub const CAP_HAPTIC: u8 = 0x02;

// ============================================================================
// Timing
// ============================================================================

/// Default timeout for opening the socket (milliseconds)
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;

/// Default read/write timeout on an open socket (milliseconds)
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 1000;

// ============================================================================
// Adapter identity
// ============================================================================

/// USB vendor id of the DreamConn adapter
pub const DREAMCONN_VENDOR_ID: u16 = 0x1209;

/// USB product id of the DreamConn adapter
pub const DREAMCONN_PRODUCT_ID: u16 = 0x2F07;
