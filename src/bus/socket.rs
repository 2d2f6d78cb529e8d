//! Stream socket abstraction
//!
//! The connection logic only needs four primitives: connect, read exactly,
//! write all, close. Keeping them behind traits lets the protocol run over a
//! real TCP socket or over the in-memory mock used by the tests.

use log::{debug, trace};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::bus::constants::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_IO_TIMEOUT_MS};

/// Byte stream to one tunnel endpoint
pub trait StreamSocket: Send {
    /// Fill `buf` completely or fail
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Write all of `buf` or fail; a short write is an error
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Close the stream. Must be safe to call more than once.
    fn close(&mut self);
}

/// Opens stream sockets
pub trait Connector: Send + Sync {
    fn connect(&self, addr: SocketAddr) -> io::Result<Box<dyn StreamSocket>>;
}

/// TCP connector with bounded connect and I/O timeouts
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    connect_timeout: Duration,
    io_timeout: Option<Duration>,
}

impl TcpConnector {
    /// `io_timeout = None` leaves reads and writes unbounded
    pub fn new(connect_timeout: Duration, io_timeout: Option<Duration>) -> Self {
        Self {
            connect_timeout,
            io_timeout,
        }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            Some(Duration::from_millis(DEFAULT_IO_TIMEOUT_MS)),
        )
    }
}

impl Connector for TcpConnector {
    fn connect(&self, addr: SocketAddr) -> io::Result<Box<dyn StreamSocket>> {
        debug!("Opening TCP stream to {} (timeout {:?})", addr, self.connect_timeout);

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        // Condition frames are small and latency sensitive
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.io_timeout)?;
        stream.set_write_timeout(self.io_timeout)?;

        Ok(Box::new(TcpSocket {
            stream,
            open: true,
        }))
    }
}

/// Blocking TCP socket
#[derive(Debug)]
pub struct TcpSocket {
    stream: TcpStream,
    open: bool,
}

impl StreamSocket for TcpSocket {
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        Read::read_exact(&mut self.stream, buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.stream, buf)?;
        self.stream.flush()
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            trace!("Socket shutdown: {}", e);
        }
    }
}

impl Drop for TcpSocket {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, TcpListener};
    use std::thread;

    #[test]
    fn test_tcp_connector_unreachable() {
        // Bind then drop a listener to find a port nobody is listening on
        let port = {
            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            listener.local_addr().unwrap().port()
        };
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

        let connector = TcpConnector::new(Duration::from_millis(200), Some(Duration::from_millis(200)));
        assert!(connector.connect(addr).is_err());
    }

    #[test]
    fn test_tcp_socket_echo_and_close() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            Read::read_exact(&mut stream, &mut buf).unwrap();
            Write::write_all(&mut stream, &buf).unwrap();
        });

        let mut socket = TcpConnector::default().connect(addr).unwrap();
        socket.write_all(&[1, 2, 3, 4]).unwrap();
        let mut echo = [0u8; 4];
        socket.read_exact(&mut echo).unwrap();
        assert_eq!(echo, [1, 2, 3, 4]);

        socket.close();
        socket.close();
        server.join().unwrap();
    }
}
