//! Bus type definitions
//!
//! Port indices, address bytes and the accessory capability mask shared by
//! the codec, the connection and the bridge.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::bus::constants::*;

/// Rejected bus index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bus index {0} out of range (0..{max})", max = BUS_COUNT)]
pub struct InvalidBusIndex(pub u8);

/// `base_port` leaves no room for the highest bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("base port {base_port} overflows for bus {bus}")]
pub struct PortOverflow {
    pub base_port: u16,
    pub bus: u8,
}

/// Controller port slot on the bus (0..=3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BusIndex(u8);

impl BusIndex {
    /// All four ports in order
    pub const ALL: [BusIndex; BUS_COUNT] = [BusIndex(0), BusIndex(1), BusIndex(2), BusIndex(3)];

    /// Validate a raw port number
    pub fn new(index: u8) -> Result<Self, InvalidBusIndex> {
        if (index as usize) < BUS_COUNT {
            Ok(Self(index))
        } else {
            Err(InvalidBusIndex(index))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// TCP port of this bus relative to `base_port`
    pub fn tcp_port(self, base_port: u16) -> Result<u16, PortOverflow> {
        base_port.checked_add(u16::from(self.0)).ok_or(PortOverflow {
            base_port,
            bus: self.0,
        })
    }

    /// Address byte for a unit on this port
    pub fn address(self, unit: u8) -> u8 {
        (self.0 << PORT_SHIFT) | (unit & (UNIT_MAIN | UNIT_EXPANSION_MASK))
    }
}

impl TryFrom<u8> for BusIndex {
    type Error = InvalidBusIndex;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BusIndex> for u8 {
    fn from(bus: BusIndex) -> u8 {
        bus.0
    }
}

impl fmt::Display for BusIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Ports are lettered A-D on the console
        write!(f, "{}", (b'A' + self.0) as char)
    }
}

/// Accessory kinds reported by the capability handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accessory {
    /// Memory unit in expansion slot 1
    Storage,
    /// Rumble pack in expansion slot 2
    Haptic,
}

impl Accessory {
    pub fn bit(self) -> u8 {
        match self {
            Accessory::Storage => CAP_STORAGE,
            Accessory::Haptic => CAP_HAPTIC,
        }
    }
}

/// Capability bitmask cached from the endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn with(self, accessory: Accessory) -> Self {
        Self(self.0 | accessory.bit())
    }

    pub fn has(self, accessory: Accessory) -> bool {
        self.0 & accessory.bit() != 0
    }

    /// Expansion slot bits to OR into the main peripheral's address.
    /// Storage sits in slot 1 and haptic in slot 2, so the mask maps directly.
    pub fn expansion_units(self) -> u8 {
        self.0 & (UNIT_EXPANSION_1 | UNIT_EXPANSION_2)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.has(Accessory::Storage), self.has(Accessory::Haptic)) {
            (false, false) => write!(f, "none"),
            (true, false) => write!(f, "storage"),
            (false, true) => write!(f, "haptic"),
            (true, true) => write!(f, "storage+haptic"),
        }
    }
}
