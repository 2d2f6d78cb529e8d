//! Local button combo detection
//!
//! Watches left trigger + right trigger + Start. The combo fires once when
//! all three become held together and re-arms only after one of them is let
//! go. It is purely local (opens the host UI) and never becomes a bus frame.

/// Inputs taking part in the combo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComboKey {
    LeftTrigger = 0,
    RightTrigger = 1,
    Start = 2,
}

/// Rising-edge detector over three held flags
#[derive(Debug, Clone, Default)]
pub struct ComboDetector {
    held: [bool; 3],
    was_all_held: bool,
}

impl ComboDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_held(&mut self, key: ComboKey, held: bool) {
        self.held[key as usize] = held;
    }

    pub fn is_held(&self, key: ComboKey) -> bool {
        self.held[key as usize]
    }

    pub fn all_held(&self) -> bool {
        self.held.iter().all(|&held| held)
    }

    /// Compare the current state with the previous poll.
    /// Returns true only on the `false -> true` transition of `all_held`.
    pub fn poll(&mut self) -> bool {
        let all_held = self.all_held();
        let fired = all_held && !self.was_all_held;
        self.was_all_held = all_held;
        fired
    }

    /// Update one key and poll
    pub fn update(&mut self, key: ComboKey, held: bool) -> bool {
        self.set_held(key, held);
        self.poll()
    }
}
