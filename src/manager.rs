//! High-level bridge manager
//!
//! Owns the connection pool and a polling thread that routes device
//! attach/detach notifications and input events to per-device
//! `GamepadBridge`s, reporting what happened on an event channel.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

use crate::bus::pool::{ConnectionPool, PortStatus};
use crate::bus::socket::Connector;
use crate::bus::types::{BusIndex, Capabilities, PortOverflow};
use crate::config::{Config, ConfigError};
use crate::gamepad::bridge::{BridgeSettings, GamepadBridge};
use crate::gamepad::registry::{DeviceInfo, DeviceRegistry};
use crate::gamepad::types::InputEvent;

/// Poll interval of the input thread (~60Hz)
const POLL_INTERVAL: Duration = Duration::from_millis(16);

const INPUT_QUEUE_DEPTH: usize = 256;
const EVENT_QUEUE_DEPTH: usize = 100;

/// Messages from the local device layer
#[derive(Debug, Clone)]
pub enum InputMessage {
    /// A device appeared; adapters get a bridge on `port`
    Attached { device: DeviceInfo, port: BusIndex },
    Detached { device_index: u32 },
    Input { device_index: u32, event: InputEvent },
    /// Port change from the settings UI
    Reassign { device_index: u32, port: BusIndex },
    /// Take the device off the bus; input stays local
    Unbind { device_index: u32 },
}

/// What the router did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Attached {
        device_index: u32,
        bus: BusIndex,
        capabilities: Capabilities,
    },
    /// Not a tunnel adapter; left to the ordinary controller path
    Ignored { device_index: u32 },
    Detached { device_index: u32, bus: BusIndex },
    /// Open the settings UI
    ComboTriggered { device_index: u32, bus: BusIndex },
    Reassigned {
        device_index: u32,
        from: BusIndex,
        to: BusIndex,
        capabilities: Capabilities,
    },
    Unbound { device_index: u32, bus: BusIndex },
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Manager is already running")]
    AlreadyRunning,

    #[error("Failed to spawn input thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Port(#[from] PortOverflow),
}

/// Routes input messages to bridges. Runs on whatever thread calls it.
pub struct InputRouter {
    pool: Arc<ConnectionPool>,
    registry: DeviceRegistry,
    bridges: HashMap<u32, GamepadBridge>,
    settings: BridgeSettings,
    events: Sender<BridgeEvent>,
}

impl InputRouter {
    pub fn new(
        pool: Arc<ConnectionPool>,
        registry: DeviceRegistry,
        settings: BridgeSettings,
        events: Sender<BridgeEvent>,
    ) -> Self {
        Self {
            pool,
            registry,
            bridges: HashMap::new(),
            settings,
            events,
        }
    }

    pub fn handle(&mut self, message: InputMessage) {
        match message {
            InputMessage::Attached { device, port } => self.attach(device, port),
            InputMessage::Detached { device_index } => self.detach(device_index),
            InputMessage::Input { device_index, event } => self.input(device_index, &event),
            InputMessage::Reassign { device_index, port } => self.reassign(device_index, port),
            InputMessage::Unbind { device_index } => self.unbind(device_index),
        }
    }

    /// Re-evaluate every bridge's combo without new input
    pub fn tick(&mut self) {
        let mut fired = Vec::new();
        for bridge in self.bridges.values_mut() {
            if bridge.tick() {
                fired.push(BridgeEvent::ComboTriggered {
                    device_index: bridge.device_index(),
                    bus: bridge.bus(),
                });
            }
        }
        for event in fired {
            self.emit(event);
        }
    }

    fn attach(&mut self, device: DeviceInfo, port: BusIndex) {
        let index = device.index;
        let name = device.name.clone();

        // A re-plugged index starts from scratch
        if self.bridges.remove(&index).is_some() {
            debug!("Device {} re-attached, dropping previous bridge", index);
        }
        self.registry.register(device);
        debug!("Registry holds {} devices", self.registry.len());

        if !self.registry.is_dreamconn(index) {
            self.registry.claim_ordinary(index);
            self.emit(BridgeEvent::Ignored { device_index: index });
            return;
        }

        let bridge = GamepadBridge::new(name, index, port, Arc::clone(&self.pool), self.settings);
        let capabilities = bridge.capabilities();
        self.bridges.insert(index, bridge);
        info!("✓ Tunnel adapter {} bridged to port {}", index, port);

        self.emit(BridgeEvent::Attached {
            device_index: index,
            bus: port,
            capabilities,
        });
    }

    fn detach(&mut self, device_index: u32) {
        self.registry.forget(device_index);
        if let Some(bridge) = self.bridges.remove(&device_index) {
            let bus = bridge.bus();
            info!("Tunnel adapter '{}' ({}) detached from port {}", bridge.name(), device_index, bus);
            drop(bridge);
            self.emit(BridgeEvent::Detached { device_index, bus });
        }
    }

    fn input(&mut self, device_index: u32, event: &InputEvent) {
        let Some(bridge) = self.bridges.get_mut(&device_index) else {
            trace!("Input for unbridged device {} ignored", device_index);
            return;
        };
        let outcome = bridge.handle_event(event);
        if outcome.combo_fired {
            let bus = bridge.bus();
            self.emit(BridgeEvent::ComboTriggered { device_index, bus });
        }
    }

    fn reassign(&mut self, device_index: u32, port: BusIndex) {
        let Some(bridge) = self.bridges.get_mut(&device_index) else {
            warn!("Cannot move device {}: no bridge", device_index);
            return;
        };
        let from = bridge.bus();
        bridge.set_maple_port(port);
        let capabilities = bridge.capabilities();
        self.emit(BridgeEvent::Reassigned {
            device_index,
            from,
            to: port,
            capabilities,
        });
    }

    fn unbind(&mut self, device_index: u32) {
        let Some(bridge) = self.bridges.get_mut(&device_index) else {
            warn!("Cannot unbind device {}: no bridge", device_index);
            return;
        };
        if !bridge.is_bound() {
            return;
        }
        bridge.unbind_port();
        let bus = bridge.bus();
        self.emit(BridgeEvent::Unbound { device_index, bus });
    }

    fn emit(&self, event: BridgeEvent) {
        // Never block the input path on a slow consumer
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => trace!("Event queue full, dropped {:?}", event),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn bridge(&self, device_index: u32) -> Option<&GamepadBridge> {
        self.bridges.get(&device_index)
    }

    pub fn bridge_count(&self) -> usize {
        self.bridges.len()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }
}

/// Manager for the tunnel bridges
pub struct BridgeManager {
    config: Config,
    pool: Arc<ConnectionPool>,
    input_sender: Sender<InputMessage>,
    input_receiver: Receiver<InputMessage>,
    event_sender: Sender<BridgeEvent>,
    event_receiver: Receiver<BridgeEvent>,
    /// Running flag
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl BridgeManager {
    /// Fails on a configuration that does not pass `Config::validate`
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Result<Self, ManagerError> {
        config.validate()?;
        let (input_sender, input_receiver) = bounded(INPUT_QUEUE_DEPTH);
        let (event_sender, event_receiver) = bounded(EVENT_QUEUE_DEPTH);
        let pool = Arc::new(ConnectionPool::new(config.bus.host, config.bus.base_port, connector)?);

        Ok(Self {
            config,
            pool,
            input_sender,
            input_receiver,
            event_sender,
            event_receiver,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    /// Start the input polling thread
    pub fn start(&mut self) -> Result<(), ManagerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ManagerError::AlreadyRunning);
        }

        info!("Starting bridge manager...");

        let receiver = self.input_receiver.clone();
        let running = Arc::clone(&self.running);
        let mut router = InputRouter::new(
            Arc::clone(&self.pool),
            DeviceRegistry::new(self.config.adapters.clone()),
            self.config.bridge_settings(),
            self.event_sender.clone(),
        );

        let spawned = thread::Builder::new()
            .name("input-poll".to_string())
            .spawn(move || {
                info!("Input thread started");

                while running.load(Ordering::SeqCst) {
                    match receiver.recv_timeout(POLL_INTERVAL) {
                        Ok(message) => router.handle(message),
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => {
                            warn!("Input channel disconnected");
                            break;
                        }
                    }
                    router.tick();
                }

                // Dropping the router releases every bridge and its socket
                drop(router);
                info!("Input thread stopped");
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                info!("✓ Manager started! Waiting for tunnel adapters");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(ManagerError::Spawn(e))
            }
        }
    }

    /// Stop the polling thread and release all bridges
    pub fn stop(&mut self) {
        if self.worker.is_none() {
            return;
        }
        info!("Stopping bridge manager...");
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Input thread panicked");
            }
        }
        info!("✓ Bridge manager stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sender for the local device layer
    pub fn input_sender(&self) -> Sender<InputMessage> {
        self.input_sender.clone()
    }

    pub fn events(&self) -> &Receiver<BridgeEvent> {
        &self.event_receiver
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn port_status(&self) -> Vec<PortStatus> {
        self.pool.status()
    }

    /// Port status as JSON for the settings UI
    pub fn status_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.port_status())
    }
}

impl Drop for BridgeManager {
    fn drop(&mut self) {
        if self.worker.is_some() {
            info!("Shutting down bridge manager (Drop trait)...");
            self.stop();
        }
    }
}
