//! Local gamepad side of the tunnel
//!
//! This module provides:
//! - Input event and controller condition types
//! - The UI combo detector
//! - `GamepadBridge`, one per attached tunnel adapter
//! - Device classification

pub mod types;
pub mod combo;
pub mod bridge;
pub mod registry;

// Re-export commonly used items
pub use types::*;
pub use combo::{ComboDetector, ComboKey};
pub use bridge::{condition_frame, BridgeSettings, BridgeStats, GamepadBridge, InputOutcome};
pub use registry::{AdapterSignature, DeviceInfo, DeviceKind, DeviceRegistry};
