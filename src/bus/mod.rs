//! Maple bus tunnel
//!
//! This module provides the wire side of the tunnel:
//! - Frame codec (blocking and `tokio_util` flavours)
//! - Socket abstraction with TCP and mock implementations
//! - Per-port connections and the connection arena
//! - A loopback endpoint emulator

pub mod constants;
pub mod types;
pub mod frame;
pub mod codec;
pub mod socket;
pub mod mock_socket;
pub mod connection;
pub mod pool;
pub mod endpoint;

// Re-export commonly used items
pub use constants::*;
pub use types::*;
pub use frame::{BusFrame, CodecError, Command};
pub use codec::{FrameCodec, FrameCodecError};
pub use socket::{Connector, StreamSocket, TcpConnector};
pub use mock_socket::MockConnector;
pub use connection::{BusConnection, ConnectError, ConnectionState, SendError};
pub use pool::{ConnectionPool, PortStatus};
pub use endpoint::LoopbackEndpoint;
