//! Gamepad type definitions
//!
//! Input events coming from the local device layer and the controller
//! condition that is pushed over the bus after every event.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::bus::constants::FUNCTION_CONTROLLER;

/// Length of an encoded controller condition (3 words)
pub const CONDITION_PAYLOAD_LEN: usize = 12;

/// Centre value of an 8-bit stick axis
pub const STICK_CENTER: u8 = 0x80;

/// Digital inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    A,
    B,
    C,
    D,
    X,
    Y,
    Z,
    Start,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    Dpad2Up,
    Dpad2Down,
    Dpad2Left,
    Dpad2Right,
    // Digital trigger buttons (pads without analog triggers)
    LeftTrigger,
    RightTrigger,
}

impl Button {
    /// Bit in the condition's button word; triggers have none
    pub fn mask(self) -> Option<u16> {
        let bit = match self {
            Button::C => 0,
            Button::B => 1,
            Button::A => 2,
            Button::Start => 3,
            Button::DpadUp => 4,
            Button::DpadDown => 5,
            Button::DpadLeft => 6,
            Button::DpadRight => 7,
            Button::Z => 8,
            Button::Y => 9,
            Button::X => 10,
            Button::D => 11,
            Button::Dpad2Up => 12,
            Button::Dpad2Down => 13,
            Button::Dpad2Left => 14,
            Button::Dpad2Right => 15,
            Button::LeftTrigger | Button::RightTrigger => return None,
        };
        Some(1 << bit)
    }
}

impl FromStr for Button {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let button = match s.to_ascii_lowercase().as_str() {
            "a" => Button::A,
            "b" => Button::B,
            "c" => Button::C,
            "d" => Button::D,
            "x" => Button::X,
            "y" => Button::Y,
            "z" => Button::Z,
            "start" => Button::Start,
            "up" | "dpad_up" => Button::DpadUp,
            "down" | "dpad_down" => Button::DpadDown,
            "left" | "dpad_left" => Button::DpadLeft,
            "right" | "dpad_right" => Button::DpadRight,
            "dpad2_up" => Button::Dpad2Up,
            "dpad2_down" => Button::Dpad2Down,
            "dpad2_left" => Button::Dpad2Left,
            "dpad2_right" => Button::Dpad2Right,
            "lt" | "left_trigger" => Button::LeftTrigger,
            "rt" | "right_trigger" => Button::RightTrigger,
            other => return Err(format!("unknown button '{}'", other)),
        };
        Ok(button)
    }
}

/// Analog inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    LeftTrigger,
    RightTrigger,
    StickX,
    StickY,
    Stick2X,
    Stick2Y,
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let axis = match s.to_ascii_lowercase().as_str() {
            "lt" | "left_trigger" => Axis::LeftTrigger,
            "rt" | "right_trigger" => Axis::RightTrigger,
            "x" | "stick_x" => Axis::StickX,
            "y" | "stick_y" => Axis::StickY,
            "x2" | "stick2_x" => Axis::Stick2X,
            "y2" | "stick2_y" => Axis::Stick2Y,
            other => return Err(format!("unknown axis '{}'", other)),
        };
        Ok(axis)
    }
}

/// One input event from the local device layer
///
/// Axis values use the signed 16-bit range of the host input API. Triggers
/// only use the positive half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Button { button: Button, pressed: bool },
    Axis { axis: Axis, value: i16 },
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputEvent::Button { button, pressed: true } => write!(f, "{:?} down", button),
            InputEvent::Button { button, pressed: false } => write!(f, "{:?} up", button),
            InputEvent::Axis { axis, value } => write!(f, "{:?} = {}", axis, value),
        }
    }
}

/// Map a host trigger value to 0..=255
pub fn trigger_from_raw(value: i16) -> u8 {
    (value.max(0) >> 7) as u8
}

/// Map a host stick value to 0..=255 with 128 at rest
pub fn stick_from_raw(value: i16) -> u8 {
    ((value as i32 + 0x8000) >> 8) as u8
}

/// Full controller state as pushed over the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerCondition {
    /// Pressed buttons, active-high (inverted on the wire)
    pub buttons: u16,
    pub right_trigger: u8,
    pub left_trigger: u8,
    pub stick_x: u8,
    pub stick_y: u8,
    pub stick2_x: u8,
    pub stick2_y: u8,
}

impl Default for ControllerCondition {
    fn default() -> Self {
        Self {
            buttons: 0,
            right_trigger: 0,
            left_trigger: 0,
            stick_x: STICK_CENTER,
            stick_y: STICK_CENTER,
            stick2_x: STICK_CENTER,
            stick2_y: STICK_CENTER,
        }
    }
}

impl ControllerCondition {
    /// Fold one event into the state
    pub fn apply(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::Button { button: Button::LeftTrigger, pressed } => {
                self.left_trigger = if pressed { u8::MAX } else { 0 };
            }
            InputEvent::Button { button: Button::RightTrigger, pressed } => {
                self.right_trigger = if pressed { u8::MAX } else { 0 };
            }
            InputEvent::Button { button, pressed } => {
                if let Some(mask) = button.mask() {
                    if pressed {
                        self.buttons |= mask;
                    } else {
                        self.buttons &= !mask;
                    }
                }
            }
            InputEvent::Axis { axis, value } => match axis {
                Axis::LeftTrigger => self.left_trigger = trigger_from_raw(value),
                Axis::RightTrigger => self.right_trigger = trigger_from_raw(value),
                Axis::StickX => self.stick_x = stick_from_raw(value),
                Axis::StickY => self.stick_y = stick_from_raw(value),
                Axis::Stick2X => self.stick2_x = stick_from_raw(value),
                Axis::Stick2Y => self.stick2_y = stick_from_raw(value),
            },
        }
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        match button {
            Button::LeftTrigger => self.left_trigger > 0,
            Button::RightTrigger => self.right_trigger > 0,
            _ => button.mask().is_some_and(|mask| self.buttons & mask != 0),
        }
    }

    /// Encode as a controller data payload
    pub fn to_payload(&self) -> [u8; CONDITION_PAYLOAD_LEN] {
        let mut payload = [0u8; CONDITION_PAYLOAD_LEN];
        payload[0..4].copy_from_slice(&FUNCTION_CONTROLLER.to_le_bytes());
        payload[4..6].copy_from_slice(&(!self.buttons).to_le_bytes());
        payload[6] = self.right_trigger;
        payload[7] = self.left_trigger;
        payload[8] = self.stick_x;
        payload[9] = self.stick_y;
        payload[10] = self.stick2_x;
        payload[11] = self.stick2_y;
        payload
    }

    /// Decode a controller data payload; `None` if too short or not a controller
    pub fn from_payload(data: &[u8]) -> Option<Self> {
        if data.len() < CONDITION_PAYLOAD_LEN {
            return None;
        }
        let function = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if function != FUNCTION_CONTROLLER {
            return None;
        }
        Some(Self {
            buttons: !u16::from_le_bytes([data[4], data[5]]),
            right_trigger: data[6],
            left_trigger: data[7],
            stick_x: data[8],
            stick_y: data[9],
            stick2_x: data[10],
            stick2_y: data[11],
        })
    }
}
