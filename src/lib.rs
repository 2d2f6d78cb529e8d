//! maple-tunnel: Maple bus peripheral tunnel client
//!
//! This library bridges local tunnel-adapter gamepads to a bus endpoint over
//! loopback TCP, one socket per controller port, with storage and rumble
//! accessory discovery.

pub mod bus;
pub mod config;
pub mod gamepad;
pub mod manager;

// Re-export commonly used items
pub use bus::{Accessory, BusConnection, BusFrame, BusIndex, Capabilities, Command, ConnectionPool};
pub use config::{Config, ConfigError};
pub use gamepad::{DeviceRegistry, GamepadBridge, InputEvent};
pub use manager::{BridgeEvent, BridgeManager, InputMessage, InputRouter};
