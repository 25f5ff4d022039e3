//! Debounced id-cycle button

use tally_core::Millis;

/// Edges closer together than this are ignored
pub const DEBOUNCE_MS: Millis = 50;

/// Edge detector for a momentary push button
#[derive(Debug, Clone, Default)]
pub struct Button {
    pressed: bool,
    last_change: Option<Millis>,
}

impl Button {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current level. Returns true once per accepted press.
    pub fn sample(&mut self, pressed: bool, now: Millis) -> bool {
        let settling = self
            .last_change
            .is_some_and(|at| now.saturating_sub(at) <= DEBOUNCE_MS);
        if pressed == self.pressed || settling {
            return false;
        }
        self.pressed = pressed;
        self.last_change = Some(now);
        pressed
    }
}
