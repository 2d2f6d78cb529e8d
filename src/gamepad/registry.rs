//! Input device classification
//!
//! Decides which local input devices are bus tunnel adapters (and get a
//! `GamepadBridge`) and which are ordinary controllers handled elsewhere.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::bus::constants::{DREAMCONN_PRODUCT_ID, DREAMCONN_VENDOR_ID};

/// Identity of a local input device as reported by enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub index: u32,
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceInfo {
    pub fn new(index: u32, name: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            index,
            name: name.into(),
            vendor_id,
            product_id,
        }
    }

    /// "vvvv:pppp" identity string
    pub fn identity(&self) -> String {
        format!("{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Vendor/product pair of a known tunnel adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterSignature {
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl AdapterSignature {
    pub fn dreamconn() -> Self {
        Self {
            name: "DreamConn".to_string(),
            vendor_id: DREAMCONN_VENDOR_ID,
            product_id: DREAMCONN_PRODUCT_ID,
        }
    }

    pub fn matches(&self, device: &DeviceInfo) -> bool {
        self.vendor_id == device.vendor_id && self.product_id == device.product_id
    }
}

/// How a registered device is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Tunnel adapter: input goes over the bus
    TunnelAdapter,
    /// Plain controller claimed by the regular input path
    Ordinary,
    /// Seen but not yet claimed
    Unclaimed,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::TunnelAdapter => write!(f, "tunnel adapter"),
            DeviceKind::Ordinary => write!(f, "ordinary controller"),
            DeviceKind::Unclaimed => write!(f, "unclaimed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    signatures: Vec<AdapterSignature>,
    devices: HashMap<u32, DeviceInfo>,
    ordinary: HashSet<u32>,
}

impl DeviceRegistry {
    pub fn new(signatures: Vec<AdapterSignature>) -> Self {
        Self {
            signatures,
            devices: HashMap::new(),
            ordinary: HashSet::new(),
        }
    }

    /// Record a device from an enumeration pass
    pub fn register(&mut self, device: DeviceInfo) {
        debug!("Registered device {} '{}' ({})", device.index, device.name, device.identity());
        self.devices.insert(device.index, device);
    }

    /// Mark an index as handled by the ordinary controller path
    pub fn claim_ordinary(&mut self, index: u32) {
        if self.ordinary.insert(index) {
            info!("Device {} claimed as ordinary controller", index);
        }
    }

    /// Drop a device that disappeared
    pub fn forget(&mut self, index: u32) -> Option<DeviceInfo> {
        self.ordinary.remove(&index);
        self.devices.remove(&index)
    }

    pub fn device(&self, index: u32) -> Option<&DeviceInfo> {
        self.devices.get(&index)
    }

    /// True if `index` is a known tunnel adapter not already claimed as an
    /// ordinary controller
    pub fn is_dreamconn(&self, index: u32) -> bool {
        if self.ordinary.contains(&index) {
            return false;
        }
        self.devices
            .get(&index)
            .is_some_and(|device| self.signatures.iter().any(|sig| sig.matches(device)))
    }

    /// `None` for an index never registered
    pub fn classify(&self, index: u32) -> Option<DeviceKind> {
        self.devices.get(&index)?;
        Some(if self.is_dreamconn(index) {
            DeviceKind::TunnelAdapter
        } else if self.ordinary.contains(&index) {
            DeviceKind::Ordinary
        } else {
            DeviceKind::Unclaimed
        })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(vec![AdapterSignature::dreamconn()])
    }
}
