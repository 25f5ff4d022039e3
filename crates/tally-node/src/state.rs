//! Mutable state owned by a single node

use tally_core::{truncate_utf8, CameraId, Millis, Rgb, TallyMask, LOCAL_NAME_MAX};

use crate::storage::PersistedSettings;

/// Blink phase length; the color is shown for one half period, then black
pub const BLINK_HALF_PERIOD_MS: Millis = 400;

/// Default name when nothing usable is persisted
pub const DEFAULT_NAME: &str = "CAM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blink {
    pub color: Rgb,
    pub enabled: bool,
    /// Whether the current phase shows `color`
    pub phase_on: bool,
    pub next_toggle: Millis,
}

impl Blink {
    pub fn start(color: Rgb, enabled: bool, now: Millis) -> Self {
        Self {
            color,
            enabled,
            phase_on: true,
            next_toggle: now.saturating_add(BLINK_HALF_PERIOD_MS),
        }
    }

    /// Flip the phase if its half period is over. Returns true on a flip.
    pub fn advance(&mut self, now: Millis) -> bool {
        if !self.enabled || now < self.next_toggle {
            return false;
        }
        self.phase_on = !self.phase_on;
        self.next_toggle = now.saturating_add(BLINK_HALF_PERIOD_MS);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    pub assigned_id: CameraId,
    /// Up to 31 bytes; heartbeats carry the first 16
    pub display_name: String,
    pub rgb_brightness: u8,
    pub status_brightness: u8,
    pub color_override: Option<Rgb>,
    pub blink: Option<Blink>,
    pub identify_until: Option<Millis>,
    pub program: TallyMask,
    pub preview: TallyMask,
}

impl NodeState {
    /// Boot state: persisted settings applied, everything else default
    pub fn boot(assigned_id: CameraId, settings: PersistedSettings) -> Self {
        Self {
            assigned_id,
            display_name: settings.name,
            rgb_brightness: settings.rgb_brightness,
            status_brightness: settings.status_brightness,
            color_override: None,
            blink: None,
            identify_until: None,
            program: TallyMask::EMPTY,
            preview: TallyMask::EMPTY,
        }
    }

    pub fn is_program(&self) -> bool {
        self.program.contains(self.assigned_id)
    }

    pub fn is_preview(&self) -> bool {
        self.preview.contains(self.assigned_id)
    }

    pub fn set_name(&mut self, name: &str) {
        self.display_name = truncate_utf8(name, LOCAL_NAME_MAX).to_string();
    }

    pub fn identify_active(&self, now: Millis) -> bool {
        self.identify_until.is_some_and(|until| now < until)
    }

    /// The fields that survive a power cycle
    pub fn settings(&self) -> PersistedSettings {
        PersistedSettings {
            name: self.display_name.clone(),
            rgb_brightness: self.rgb_brightness,
            status_brightness: self.status_brightness,
        }
    }
}
