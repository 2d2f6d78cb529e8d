//! Mock socket connector for testing.
//!
//! Stands in for the tunnel endpoint without opening real sockets. Each
//! connect hands out a socket that serves a scripted handshake reply and
//! records everything written to it, so tests can inspect the exact frames
//! that went "on the wire".

use log::debug;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::bus::constants::HEADER_SIZE;
use crate::bus::frame::{frame_len_from_header, BusFrame, Command};
use crate::bus::socket::{Connector, StreamSocket};
use crate::bus::types::Capabilities;

#[derive(Debug, Default)]
struct MockState {
    reachable: bool,
    reply: Vec<u8>,
    fail_writes: bool,
    written: Vec<u8>,
    connects: usize,
    closes: usize,
    open_sockets: usize,
    last_addr: Option<SocketAddr>,
}

/// Mock connector that serves scripted replies and captures writes
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Every connect attempt fails with `ConnectionRefused`
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// Reachable endpoint answering the handshake with `capabilities`
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        let reply = BusFrame::encode(Command::DeviceStatus, 0x00, 0x20, &[capabilities.bits()])
            .map(|frame| frame.to_bytes())
            .unwrap_or_default();
        Self::with_reply(reply)
    }

    /// Reachable endpoint that serves `reply` verbatim to every new socket
    pub fn with_reply(reply: Vec<u8>) -> Self {
        let connector = Self::default();
        {
            let mut state = connector.lock();
            state.reachable = true;
            state.reply = reply;
        }
        connector
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make subsequent writes fail (simulates the endpoint going away)
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    pub fn open_sockets(&self) -> usize {
        self.lock().open_sockets
    }

    pub fn last_addr(&self) -> Option<SocketAddr> {
        self.lock().last_addr
    }

    /// Raw bytes written across all sockets
    pub fn written_bytes(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    /// Written bytes split back into frames
    pub fn written_frames(&self) -> Vec<BusFrame> {
        let bytes = self.written_bytes();
        let mut frames = Vec::new();
        let mut offset = 0;
        while let Some(len) = frame_len_from_header(&bytes[offset..]) {
            match BusFrame::decode(&bytes[offset..]) {
                Ok(frame) => frames.push(frame),
                Err(_) => break,
            }
            offset += len;
        }
        frames
    }

    pub fn clear_written(&self) {
        self.lock().written.clear();
    }
}

impl Connector for MockConnector {
    fn connect(&self, addr: SocketAddr) -> io::Result<Box<dyn StreamSocket>> {
        let mut state = self.lock();
        state.last_addr = Some(addr);
        if !state.reachable {
            debug!("[MOCK SOCKET] Refusing connection to {}", addr);
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "mock endpoint unreachable"));
        }

        state.connects += 1;
        state.open_sockets += 1;
        debug!("[MOCK SOCKET] Connected to {}", addr);

        Ok(Box::new(MockSocket {
            state: Arc::clone(&self.state),
            reply: state.reply.clone(),
            cursor: 0,
            open: true,
        }))
    }
}

struct MockSocket {
    state: Arc<Mutex<MockState>>,
    reply: Vec<u8>,
    cursor: usize,
    open: bool,
}

impl MockSocket {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StreamSocket for MockSocket {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let remaining = self.reply.len() - self.cursor;
        if !self.open || remaining < buf.len() {
            self.cursor = self.reply.len();
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "mock reply exhausted"));
        }
        buf.copy_from_slice(&self.reply[self.cursor..self.cursor + buf.len()]);
        self.cursor += buf.len();
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if !self.open || state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock endpoint closed"));
        }
        debug!("[MOCK SOCKET] Write {} bytes (header {:02X?})", buf.len(), &buf[..buf.len().min(HEADER_SIZE)]);
        state.written.extend_from_slice(buf);
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let mut state = self.lock();
        state.closes += 1;
        state.open_sockets -= 1;
    }
}

impl Drop for MockSocket {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};

    fn addr() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 37393))
    }

    #[test]
    fn mock_serves_reply_and_records_writes() {
        let connector = MockConnector::with_capabilities(Capabilities::from_bits(0x03));
        let mut socket = connector.connect(addr()).unwrap();

        let mut header = [0u8; 4];
        socket.read_exact(&mut header).unwrap();
        assert_eq!(header, [0x05, 0x00, 0x20, 0x01]);

        socket.write_all(&[0x01, 0x20, 0x00, 0x00]).unwrap();
        let frames = connector.written_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, Command::DeviceRequest);

        assert_eq!(connector.open_sockets(), 1);
        drop(socket);
        assert_eq!(connector.open_sockets(), 0);
        assert_eq!(connector.close_count(), 1);
    }

    #[test]
    fn mock_unreachable_refuses() {
        let connector = MockConnector::unreachable();
        assert!(connector.connect(addr()).is_err());
        assert_eq!(connector.connect_count(), 0);
        assert_eq!(connector.last_addr(), Some(addr()));
    }
}
