//! Per-port connection arena
//!
//! Holds a weak reference per bus index so at most one `BusConnection` exists
//! for a port. Bridges own the strong references; when the last one is
//! dropped the connection closes its socket and the slot empties itself.

use log::{debug, info};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::bus::connection::{BusConnection, ConnectionState};
use crate::bus::constants::BUS_COUNT;
use crate::bus::socket::Connector;
use crate::bus::types::{Accessory, BusIndex, PortOverflow};

/// Snapshot of one port for the settings UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortStatus {
    pub bus: BusIndex,
    pub port_name: String,
    pub connected: bool,
    pub storage: bool,
    pub haptic: bool,
    /// Number of bridges sharing the connection
    pub holders: usize,
}

pub struct ConnectionPool {
    endpoints: [SocketAddr; BUS_COUNT],
    connector: Arc<dyn Connector>,
    slots: Mutex<[Weak<BusConnection>; BUS_COUNT]>,
}

impl ConnectionPool {
    /// Fails if `base_port` cannot hold all four buses
    pub fn new(host: IpAddr, base_port: u16, connector: Arc<dyn Connector>) -> Result<Self, PortOverflow> {
        let mut endpoints = [SocketAddr::new(host, base_port); BUS_COUNT];
        for bus in BusIndex::ALL {
            endpoints[bus.as_usize()] = SocketAddr::new(host, bus.tcp_port(base_port)?);
        }

        Ok(Self {
            endpoints,
            connector,
            slots: Mutex::new(std::array::from_fn(|_| Weak::new())),
        })
    }

    fn slots(&self) -> MutexGuard<'_, [Weak<BusConnection>; BUS_COUNT]> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Endpoint of a bus: loopback host, base port plus index
    pub fn endpoint(&self, bus: BusIndex) -> SocketAddr {
        self.endpoints[bus.as_usize()]
    }

    /// Live connection for `bus`, if any bridge still holds it
    pub fn get(&self, bus: BusIndex) -> Option<Arc<BusConnection>> {
        self.slots()[bus.as_usize()].upgrade()
    }

    /// Shared connection for `bus`, creating and connecting it if needed
    ///
    /// A live connection that has dropped to `Disconnected` (failed write or
    /// unreachable endpoint) is reconnected, so every attach gets a fresh
    /// handshake attempt. A failed connect is not an error here: the
    /// connection is returned in `Disconnected` state with no accessories.
    pub fn acquire(&self, bus: BusIndex) -> Arc<BusConnection> {
        let connection = {
            let mut slots = self.slots();
            match slots[bus.as_usize()].upgrade() {
                Some(existing) if existing.state() != ConnectionState::Disconnected => {
                    debug!("Bus {}: reusing live connection", bus);
                    return existing;
                }
                Some(existing) => {
                    info!("Bus {}: shared connection is down, reconnecting", bus);
                    existing
                }
                None => {
                    let connection = Arc::new(BusConnection::new(
                        bus,
                        self.endpoint(bus),
                        Arc::clone(&self.connector),
                    ));
                    slots[bus.as_usize()] = Arc::downgrade(&connection);
                    connection
                }
            }
        };

        // Connect outside the slot lock so other ports are not held up
        if connection.connect().is_err() {
            info!("Bus {}: continuing without tunnel accessories", bus);
        }
        connection
    }

    /// Status of all four ports
    pub fn status(&self) -> Vec<PortStatus> {
        let slots = self.slots();
        BusIndex::ALL
            .iter()
            .map(|&bus| {
                let live = slots[bus.as_usize()].upgrade();
                let (connected, storage, haptic) = match &live {
                    Some(conn) => (
                        conn.state() == ConnectionState::Connected,
                        conn.has_accessory(Accessory::Storage),
                        conn.has_accessory(Accessory::Haptic),
                    ),
                    None => (false, false, false),
                };
                PortStatus {
                    bus,
                    port_name: bus.to_string(),
                    connected,
                    storage,
                    haptic,
                    // Discount the temporary upgrade above
                    holders: live.as_ref().map_or(0, |conn| Arc::strong_count(conn) - 1),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::constants::{BASE_PORT, CAP_HAPTIC, CAP_STORAGE, LOOPBACK_HOST};
    use crate::bus::frame::{BusFrame, Command};
    use crate::bus::mock_socket::MockConnector;
    use crate::bus::types::Capabilities;

    fn pool(connector: &MockConnector) -> ConnectionPool {
        ConnectionPool::new(LOOPBACK_HOST, BASE_PORT, Arc::new(connector.clone())).unwrap()
    }

    fn bus(index: u8) -> BusIndex {
        BusIndex::new(index).unwrap()
    }

    #[test]
    fn test_one_connection_per_bus() {
        let connector = MockConnector::with_capabilities(Capabilities::from_bits(CAP_STORAGE));
        let pool = pool(&connector);

        let first = pool.acquire(bus(0));
        let second = pool.acquire(bus(0));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connect_count(), 1);

        let other = pool.acquire(bus(1));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(connector.connect_count(), 2);
    }

    #[test]
    fn test_last_release_tears_down() {
        let connector = MockConnector::with_capabilities(Capabilities::NONE);
        let pool = pool(&connector);

        let first = pool.acquire(bus(2));
        let second = pool.acquire(bus(2));
        drop(first);
        assert_eq!(connector.open_sockets(), 1);
        assert!(pool.get(bus(2)).is_some());

        drop(second);
        assert_eq!(connector.open_sockets(), 0);
        assert!(pool.get(bus(2)).is_none());

        // A fresh acquire opens a new socket
        let _third = pool.acquire(bus(2));
        assert_eq!(connector.connect_count(), 2);
    }

    #[test]
    fn test_status_snapshot() {
        let connector = MockConnector::with_capabilities(Capabilities::from_bits(CAP_STORAGE));
        let pool = pool(&connector);
        let _a = pool.acquire(bus(0));
        let _b = pool.acquire(bus(0));

        let status = pool.status();
        assert_eq!(status.len(), 4);
        assert!(status[0].connected);
        assert!(status[0].storage);
        assert!(!status[0].haptic);
        assert_eq!(status[0].holders, 2);
        assert_eq!(status[0].port_name, "A");
        assert!(!status[1].connected);
        assert_eq!(status[1].holders, 0);
    }

    #[test]
    fn test_unreachable_acquire_still_returns_connection() {
        let connector = MockConnector::unreachable();
        let pool = pool(&connector);

        let conn = pool.acquire(bus(3));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.endpoint().port(), BASE_PORT + 3);
    }

    #[test]
    fn test_acquire_reconnects_dropped_shared_connection() {
        let connector = MockConnector::with_capabilities(Capabilities::from_bits(CAP_HAPTIC));
        let pool = pool(&connector);
        let first = pool.acquire(bus(1));

        // A failed write takes the shared connection down for every holder
        connector.set_fail_writes(true);
        assert!(!first.send(&BusFrame::empty(Command::DataTransfer, 0x40, 0x60)));
        assert_eq!(first.state(), ConnectionState::Disconnected);
        connector.set_fail_writes(false);

        let second = pool.acquire(bus(1));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.state(), ConnectionState::Connected);
        assert!(first.has_accessory(Accessory::Haptic));
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(connector.open_sockets(), 1);
    }

    #[test]
    fn test_acquire_retries_endpoint_that_came_back() {
        let connector = MockConnector::with_capabilities(Capabilities::from_bits(CAP_STORAGE));
        connector.set_reachable(false);
        let pool = pool(&connector);

        let first = pool.acquire(bus(0));
        assert!(!first.is_connected());

        connector.set_reachable(true);
        let second = pool.acquire(bus(0));
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.has_accessory(Accessory::Storage));
    }

    #[test]
    fn test_base_port_overflow_rejected() {
        let connector = MockConnector::unreachable();
        let err = ConnectionPool::new(LOOPBACK_HOST, u16::MAX, Arc::new(connector.clone()))
            .err()
            .unwrap();
        assert_eq!(err, PortOverflow { base_port: u16::MAX, bus: 1 });
        assert!(ConnectionPool::new(LOOPBACK_HOST, u16::MAX - 3, Arc::new(connector)).is_ok());
    }
}
