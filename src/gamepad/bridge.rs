//! Gamepad to bus bridge
//!
//! Turns local input events into controller condition frames and pushes them
//! through the port's shared `BusConnection`. Also runs the local UI combo
//! detector, which never produces bus traffic.

use log::{debug, info, trace, warn};
use serde::Serialize;
use std::sync::Arc;

use crate::bus::connection::BusConnection;
use crate::bus::constants::{UNIT_HOST, UNIT_MAIN};
use crate::bus::frame::{BusFrame, CodecError, Command};
use crate::bus::pool::ConnectionPool;
use crate::bus::types::{Accessory, BusIndex, Capabilities};
use crate::gamepad::combo::{ComboDetector, ComboKey};
use crate::gamepad::types::{Axis, Button, ControllerCondition, InputEvent};

/// Per-bridge input settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Run the trigger+trigger+Start UI combo
    pub combo_enabled: bool,
    /// A trigger counts as held above this value (0..=255)
    pub trigger_threshold: u8,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            combo_enabled: true,
            trigger_threshold: 0,
        }
    }
}

/// Frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub combos_fired: u64,
}

/// What happened to one input event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputOutcome {
    /// The condition frame reached the socket
    pub forwarded: bool,
    /// The UI combo fired on this event
    pub combo_fired: bool,
}

/// Controller condition frame for `bus`; the origin carries the attached
/// expansion slots
pub fn condition_frame(
    bus: BusIndex,
    capabilities: Capabilities,
    condition: &ControllerCondition,
) -> Result<BusFrame, CodecError> {
    BusFrame::encode(
        Command::DataTransfer,
        bus.address(UNIT_HOST),
        bus.address(UNIT_MAIN | capabilities.expansion_units()),
        &condition.to_payload(),
    )
}

/// Bridge between one local input device and one bus port
pub struct GamepadBridge {
    name: String,
    device_index: u32,
    /// Current port, or the last one while unbound
    bus: BusIndex,
    pool: Arc<ConnectionPool>,
    /// `None` while unbound
    connection: Option<Arc<BusConnection>>,
    condition: ControllerCondition,
    combo: ComboDetector,
    settings: BridgeSettings,
    stats: BridgeStats,
}

impl GamepadBridge {
    /// Attach a device to `bus`, sharing or opening the port's connection
    pub fn new(
        name: impl Into<String>,
        device_index: u32,
        bus: BusIndex,
        pool: Arc<ConnectionPool>,
        settings: BridgeSettings,
    ) -> Self {
        let name = name.into();
        let connection = pool.acquire(bus);
        info!(
            "Bridge '{}' (device {}) attached to port {} [accessories: {}]",
            name,
            device_index,
            bus,
            connection.capabilities()
        );

        Self {
            name,
            device_index,
            bus,
            pool,
            connection: Some(connection),
            condition: ControllerCondition::default(),
            combo: ComboDetector::new(),
            settings,
            stats: BridgeStats::default(),
        }
    }

    /// Apply one event, forward the full condition, then check the combo
    pub fn handle_event(&mut self, event: &InputEvent) -> InputOutcome {
        trace!("Bridge '{}': {}", self.name, event);
        self.condition.apply(event);

        let forwarded = self.forward_condition();
        let combo_fired = self.track_combo();

        InputOutcome {
            forwarded,
            combo_fired,
        }
    }

    pub fn button_input(&mut self, button: Button, pressed: bool) -> InputOutcome {
        self.handle_event(&InputEvent::Button { button, pressed })
    }

    pub fn axis_input(&mut self, axis: Axis, value: i16) -> InputOutcome {
        self.handle_event(&InputEvent::Axis { axis, value })
    }

    /// Polling tick without new input. Only re-evaluates the combo, so a
    /// steady hold never fires twice.
    pub fn tick(&mut self) -> bool {
        if !self.settings.combo_enabled {
            return false;
        }
        let fired = self.combo.poll();
        self.record_combo(fired)
    }

    /// Move the bridge to another port, or rebind an unbound one
    ///
    /// The old connection reference is released first (closing the socket if
    /// this bridge was its last holder), then the new port's connection is
    /// shared or opened.
    pub fn set_maple_port(&mut self, bus: BusIndex) {
        if bus == self.bus && self.connection.is_some() {
            return;
        }
        info!("Bridge '{}': moving from port {} to port {}", self.name, self.bus, bus);

        self.connection = None;
        self.bus = bus;
        self.connection = Some(self.pool.acquire(bus));
    }

    /// Leave the bus. Input is still tracked and the combo still fires, but
    /// condition frames are dropped until `set_maple_port` rebinds.
    pub fn unbind_port(&mut self) {
        if self.connection.take().is_some() {
            info!("Bridge '{}': unbound from port {}", self.name, self.bus);
        }
    }

    pub fn is_bound(&self) -> bool {
        self.connection.is_some()
    }

    fn forward_condition(&mut self) -> bool {
        let Some(connection) = &self.connection else {
            self.stats.frames_dropped += 1;
            return false;
        };

        let frame = match condition_frame(self.bus, connection.capabilities(), &self.condition) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Bridge '{}': could not encode condition: {}", self.name, e);
                self.stats.frames_dropped += 1;
                return false;
            }
        };

        if connection.send(&frame) {
            self.stats.frames_sent += 1;
            true
        } else {
            // Dropped on purpose: the polling path never waits on the tunnel
            self.stats.frames_dropped += 1;
            trace!("Bridge '{}': condition dropped (port {} not connected)", self.name, self.bus);
            false
        }
    }

    fn track_combo(&mut self) -> bool {
        if !self.settings.combo_enabled {
            return false;
        }
        let threshold = self.settings.trigger_threshold;
        self.combo.set_held(ComboKey::LeftTrigger, self.condition.left_trigger > threshold);
        self.combo.set_held(ComboKey::RightTrigger, self.condition.right_trigger > threshold);
        self.combo.set_held(ComboKey::Start, self.condition.is_pressed(Button::Start));
        let fired = self.combo.poll();
        self.record_combo(fired)
    }

    fn record_combo(&mut self, fired: bool) -> bool {
        if fired {
            self.stats.combos_fired += 1;
            info!("Bridge '{}': settings combo triggered", self.name);
        }
        fired
    }

    pub fn has_accessory(&self, kind: Accessory) -> bool {
        self.connection.as_ref().is_some_and(|conn| conn.has_accessory(kind))
    }

    pub fn capabilities(&self) -> Capabilities {
        self.connection
            .as_ref()
            .map_or(Capabilities::NONE, |conn| conn.capabilities())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|conn| conn.is_connected())
    }

    pub fn bus(&self) -> BusIndex {
        self.bus
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    pub fn condition(&self) -> &ControllerCondition {
        &self.condition
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }
}

impl Drop for GamepadBridge {
    fn drop(&mut self) {
        debug!("Bridge '{}' released port {}", self.name, self.bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::constants::{BASE_PORT, CAP_HAPTIC, CAP_STORAGE, LOOPBACK_HOST};
    use crate::bus::mock_socket::MockConnector;

    fn bus(index: u8) -> BusIndex {
        BusIndex::new(index).unwrap()
    }

    fn pool(connector: &MockConnector) -> Arc<ConnectionPool> {
        Arc::new(ConnectionPool::new(LOOPBACK_HOST, BASE_PORT, Arc::new(connector.clone())).unwrap())
    }

    fn bridge(connector: &MockConnector, settings: BridgeSettings) -> GamepadBridge {
        let bridge = GamepadBridge::new("DreamConn+", 0, bus(0), pool(connector), settings);
        connector.clear_written();
        bridge
    }

    fn sent_conditions(connector: &MockConnector) -> Vec<ControllerCondition> {
        connector
            .written_frames()
            .iter()
            .map(|frame| {
                assert_eq!(frame.command, Command::DataTransfer);
                ControllerCondition::from_payload(frame.payload()).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_every_event_sends_full_condition() {
        let connector = MockConnector::with_capabilities(Capabilities::NONE);
        let mut bridge = bridge(&connector, BridgeSettings::default());

        assert!(bridge.button_input(Button::A, true).forwarded);
        assert!(bridge.axis_input(Axis::StickX, i16::MAX).forwarded);
        assert!(bridge.button_input(Button::B, true).forwarded);

        let conditions = sent_conditions(&connector);
        assert_eq!(conditions.len(), 3);
        // Not deltas: the last frame still carries A and the stick
        let last = conditions[2];
        assert!(last.is_pressed(Button::A));
        assert!(last.is_pressed(Button::B));
        assert_eq!(last.stick_x, 255);
        assert_eq!(bridge.stats().frames_sent, 3);
    }

    #[test]
    fn test_condition_addressing_carries_expansion_slots() {
        let connector = MockConnector::with_capabilities(Capabilities::from_bits(CAP_STORAGE | CAP_HAPTIC));
        let mut bridge = bridge(&connector, BridgeSettings::default());
        bridge.button_input(Button::X, true);

        let frames = connector.written_frames();
        assert_eq!(frames[0].destination, 0x00);
        assert_eq!(frames[0].origin, 0x23);
        assert_eq!(frames[0].word_count(), 3);
    }

    #[test]
    fn test_unreachable_port_drops_frames_silently() {
        let connector = MockConnector::unreachable();
        let mut bridge = bridge(&connector, BridgeSettings::default());

        let outcome = bridge.button_input(Button::A, true);
        assert!(!outcome.forwarded);
        assert!(!bridge.is_connected());
        assert!(!bridge.has_accessory(Accessory::Storage));
        assert_eq!(bridge.stats().frames_dropped, 1);
        assert_eq!(bridge.condition().buttons, Button::A.mask().unwrap());
    }

    #[test]
    fn test_combo_fires_once_and_stays_off_the_wire() {
        let connector = MockConnector::with_capabilities(Capabilities::NONE);
        let mut bridge = bridge(&connector, BridgeSettings::default());

        assert!(!bridge.axis_input(Axis::LeftTrigger, 20000).combo_fired);
        assert!(!bridge.axis_input(Axis::RightTrigger, 20000).combo_fired);
        assert!(bridge.button_input(Button::Start, true).combo_fired);

        for _ in 0..5 {
            assert!(!bridge.tick());
        }
        // Stick movement while holding is not a new edge
        assert!(!bridge.axis_input(Axis::StickY, -4000).combo_fired);

        // One condition frame per event, nothing else
        let frames = connector.written_frames();
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|frame| frame.command == Command::DataTransfer));
        assert_eq!(bridge.stats().combos_fired, 1);
    }

    #[test]
    fn test_combo_rearms_after_release() {
        let connector = MockConnector::with_capabilities(Capabilities::NONE);
        let mut bridge = bridge(&connector, BridgeSettings::default());

        bridge.button_input(Button::LeftTrigger, true);
        bridge.button_input(Button::RightTrigger, true);
        assert!(bridge.button_input(Button::Start, true).combo_fired);

        assert!(!bridge.button_input(Button::Start, false).combo_fired);
        assert!(bridge.button_input(Button::Start, true).combo_fired);

        assert!(!bridge.axis_input(Axis::RightTrigger, 0).combo_fired);
        assert!(bridge.axis_input(Axis::RightTrigger, 32000).combo_fired);
        assert_eq!(bridge.stats().combos_fired, 3);
    }

    #[test]
    fn test_combo_works_without_connection() {
        let connector = MockConnector::unreachable();
        let mut bridge = bridge(&connector, BridgeSettings::default());

        bridge.button_input(Button::LeftTrigger, true);
        bridge.button_input(Button::RightTrigger, true);
        assert!(bridge.button_input(Button::Start, true).combo_fired);
    }

    #[test]
    fn test_trigger_threshold_and_disabled_combo() {
        let connector = MockConnector::with_capabilities(Capabilities::NONE);
        let settings = BridgeSettings {
            combo_enabled: true,
            trigger_threshold: 128,
        };
        let mut bridge = bridge(&connector, settings);

        // 8000 maps to 62, below the threshold
        bridge.axis_input(Axis::LeftTrigger, 8000);
        bridge.axis_input(Axis::RightTrigger, i16::MAX);
        assert!(!bridge.button_input(Button::Start, true).combo_fired);
        assert!(bridge.axis_input(Axis::LeftTrigger, i16::MAX).combo_fired);

        let mut disabled = self::bridge(
            &connector,
            BridgeSettings {
                combo_enabled: false,
                trigger_threshold: 0,
            },
        );
        disabled.button_input(Button::LeftTrigger, true);
        disabled.button_input(Button::RightTrigger, true);
        assert!(!disabled.button_input(Button::Start, true).combo_fired);
        assert!(!disabled.tick());
    }

    #[test]
    fn test_set_maple_port_moves_connection() {
        let connector = MockConnector::with_capabilities(Capabilities::from_bits(CAP_HAPTIC));
        let pool = pool(&connector);
        let mut bridge = GamepadBridge::new("pad", 4, bus(0), Arc::clone(&pool), BridgeSettings::default());
        assert_eq!(connector.open_sockets(), 1);

        bridge.set_maple_port(bus(1));
        assert_eq!(bridge.bus(), bus(1));
        assert!(pool.get(bus(0)).is_none());
        assert_eq!(connector.open_sockets(), 1);
        assert_eq!(connector.last_addr().unwrap().port(), BASE_PORT + 1);
        assert!(bridge.has_accessory(Accessory::Haptic));

        // Same port again is a no-op
        bridge.set_maple_port(bus(1));
        assert_eq!(connector.connect_count(), 2);
    }

    #[test]
    fn test_set_maple_port_keeps_shared_connection_alive() {
        let connector = MockConnector::with_capabilities(Capabilities::NONE);
        let pool = pool(&connector);
        let mut first = GamepadBridge::new("one", 0, bus(2), Arc::clone(&pool), BridgeSettings::default());
        let second = GamepadBridge::new("two", 1, bus(2), Arc::clone(&pool), BridgeSettings::default());
        assert_eq!(connector.connect_count(), 1);

        first.set_maple_port(bus(3));
        assert!(second.is_connected());
        assert_eq!(connector.open_sockets(), 2);

        drop(second);
        assert_eq!(connector.open_sockets(), 1);
    }

    #[test]
    fn test_unbind_drops_frames_until_rebound() {
        let connector = MockConnector::with_capabilities(Capabilities::from_bits(CAP_STORAGE));
        let pool = pool(&connector);
        let mut bridge = GamepadBridge::new("pad", 0, bus(1), Arc::clone(&pool), BridgeSettings::default());

        bridge.unbind_port();
        assert!(!bridge.is_bound());
        assert!(pool.get(bus(1)).is_none());
        assert_eq!(bridge.capabilities(), Capabilities::NONE);

        connector.clear_written();
        assert!(!bridge.button_input(Button::A, true).forwarded);
        assert!(connector.written_frames().is_empty());
        assert_eq!(bridge.stats().frames_dropped, 1);

        // Rebinding to the same port reconnects and resends the full state
        bridge.set_maple_port(bus(1));
        assert!(bridge.is_bound());
        assert!(bridge.has_accessory(Accessory::Storage));
        connector.clear_written();
        assert!(bridge.button_input(Button::B, true).forwarded);
        let condition = sent_conditions(&connector)[0];
        assert!(condition.is_pressed(Button::A) && condition.is_pressed(Button::B));
    }
}
