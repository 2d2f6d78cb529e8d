//! Bus tunnel connection management
//!
//! This module owns the socket to one tunnel endpoint (one per controller
//! port), including the capability handshake, frame sending and teardown.

use log::{debug, info, trace, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::bus::constants::*;
use crate::bus::frame::{frame_len_from_header, BusFrame, CodecError, Command};
use crate::bus::socket::{Connector, StreamSocket};
use crate::bus::types::{Accessory, BusIndex, Capabilities};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to open socket to {addr}: {source}")]
    Socket {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("capability handshake I/O failed: {0}")]
    Handshake(#[from] io::Error),

    #[error("capability reply could not be decoded: {0}")]
    Decode(#[from] CodecError),

    #[error("unexpected capability reply {0:?}")]
    UnexpectedReply(Command),

    #[error("capability reply carried no payload")]
    EmptyReply,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("bus is not connected")]
    NotConnected,

    #[error("write failed: {0}")]
    Write(#[from] io::Error),
}

/// Capability query sent right after the socket opens
pub fn capability_query(bus: BusIndex) -> BusFrame {
    BusFrame::empty(Command::DeviceRequest, bus.address(UNIT_MAIN), bus.address(UNIT_HOST))
}

struct Inner {
    state: ConnectionState,
    socket: Option<Box<dyn StreamSocket>>,
    capabilities: Capabilities,
}

/// Tunnel connection for one bus port
///
/// Shared between bridges as `Arc<BusConnection>`. The socket is closed when
/// the last holder drops it.
pub struct BusConnection {
    bus: BusIndex,
    endpoint: SocketAddr,
    connector: Arc<dyn Connector>,
    inner: Mutex<Inner>,
}

impl BusConnection {
    /// Create a disconnected connection for `bus`; no I/O happens here
    pub fn new(bus: BusIndex, endpoint: SocketAddr, connector: Arc<dyn Connector>) -> Self {
        Self {
            bus,
            endpoint,
            connector,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                socket: None,
                capabilities: Capabilities::NONE,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the socket and run the capability handshake
    ///
    /// On any failure the connection is left `Disconnected` with no
    /// accessories. Nothing is retried.
    pub fn connect(&self) -> Result<Capabilities, ConnectError> {
        let mut inner = self.lock();

        if let Some(mut old) = inner.socket.take() {
            debug!("Bus {}: dropping previous socket before reconnecting", self.bus);
            old.close();
        }
        inner.state = ConnectionState::Connecting;
        inner.capabilities = Capabilities::NONE;

        info!("Bus {}: connecting to {}...", self.bus, self.endpoint);
        let mut socket = match self.connector.connect(self.endpoint) {
            Ok(socket) => socket,
            Err(source) => {
                inner.state = ConnectionState::Disconnected;
                warn!("Bus {}: endpoint {} unreachable: {}", self.bus, self.endpoint, source);
                return Err(ConnectError::Socket {
                    addr: self.endpoint,
                    source,
                });
            }
        };

        match self.handshake(socket.as_mut()) {
            Ok(capabilities) => {
                inner.socket = Some(socket);
                inner.capabilities = capabilities;
                inner.state = ConnectionState::Connected;
                info!("✓ Bus {}: connected, accessories: {}", self.bus, capabilities);
                Ok(capabilities)
            }
            Err(e) => {
                socket.close();
                inner.state = ConnectionState::Disconnected;
                warn!("Bus {}: capability handshake failed: {}", self.bus, e);
                Err(e)
            }
        }
    }

    /// Send the query and read exactly one reply frame
    fn handshake(&self, socket: &mut dyn StreamSocket) -> Result<Capabilities, ConnectError> {
        let query = capability_query(self.bus);
        socket.write_all(&query.to_bytes())?;

        let mut raw = vec![0u8; HEADER_SIZE];
        socket.read_exact(&mut raw)?;
        let frame_len = frame_len_from_header(&raw).unwrap_or(HEADER_SIZE);
        raw.resize(frame_len, 0);
        socket.read_exact(&mut raw[HEADER_SIZE..])?;

        let reply = BusFrame::decode(&raw)?;
        debug!("Bus {}: capability reply {:?}", self.bus, reply);

        if reply.command != Command::DeviceStatus {
            return Err(ConnectError::UnexpectedReply(reply.command));
        }
        let bits = *reply.payload().first().ok_or(ConnectError::EmptyReply)?;
        Ok(Capabilities::from_bits(bits))
    }

    /// Close the socket if open. Idempotent.
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        Self::close_locked(self.bus, &mut inner);
    }

    fn close_locked(bus: BusIndex, inner: &mut Inner) {
        if let Some(mut socket) = inner.socket.take() {
            socket.close();
            info!("Bus {}: disconnected", bus);
        }
        inner.state = ConnectionState::Disconnected;
        inner.capabilities = Capabilities::NONE;
    }

    /// Write one frame
    ///
    /// A failed write closes the socket; the caller decides what to do with
    /// the frame. No reconnection is attempted.
    pub fn try_send(&self, frame: &BusFrame) -> Result<(), SendError> {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Connected {
            return Err(SendError::NotConnected);
        }
        let socket = inner.socket.as_mut().ok_or(SendError::NotConnected)?;

        match socket.write_all(&frame.to_bytes()) {
            Ok(()) => {
                trace!("Bus {}: sent {:?}", self.bus, frame.command);
                Ok(())
            }
            Err(e) => {
                warn!("Bus {}: write failed, dropping connection: {}", self.bus, e);
                Self::close_locked(self.bus, &mut inner);
                Err(SendError::Write(e))
            }
        }
    }

    /// Fire-and-forget send; `false` means the frame was dropped
    pub fn send(&self, frame: &BusFrame) -> bool {
        self.try_send(frame).is_ok()
    }

    pub fn has_accessory(&self, kind: Accessory) -> bool {
        self.lock().capabilities.has(kind)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.lock().capabilities
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn bus(&self) -> BusIndex {
        self.bus
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }
}

impl Drop for BusConnection {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        Self::close_locked(self.bus, inner);
    }
}
