//! Node protocol engine

use tally_core::{
    truncate_utf8, Cadence, CameraId, Command, HardwareAddress, Heartbeat, Identity, Millis, Rgb,
    WIRE_NAME_MAX,
};
use tally_radio::{Frame, Radio};
use tracing::{debug, info, trace, warn};

use crate::button::Button;
use crate::led;
use crate::state::{Blink, NodeState};
use crate::storage::{PersistedSettings, Storage};

/// Identify indicator half period
pub const IDENTIFY_HALF_PERIOD_MS: Millis = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    /// Camera id assigned at boot
    pub camera_id: CameraId,
    pub heartbeat_interval_ms: Millis,
    /// Status indicator stays lit this long after the last received packet
    pub link_timeout_ms: Millis,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            camera_id: CameraId::FIRST,
            heartbeat_interval_ms: 2000,
            link_timeout_ms: 5000,
        }
    }
}

/// Things a node reports to its application besides LED output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// Pass-through application signal from SET_SIGNAL
    Signal(u8),
    /// The assigned camera id changed
    IdChanged { from: CameraId, to: CameraId },
    Renamed(String),
}

/// What the node drives onto its indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeOutputs {
    /// Main tally LED, brightness applied
    pub color: Rgb,
    pub identify_on: bool,
    /// Status LED level; 0 when the link is considered down
    pub status_level: u8,
}

pub struct NodeEngine<R: Radio, S: Storage> {
    radio: R,
    storage: S,
    config: NodeConfig,
    state: NodeState,
    heartbeat: Cadence,
    last_packet_at: Option<Millis>,
    button: Button,
}

impl<R: Radio, S: Storage> NodeEngine<R, S> {
    /// Build a node from persisted settings. Unreadable storage means defaults.
    pub fn new(radio: R, storage: S, config: NodeConfig) -> Self {
        let settings = match storage.load() {
            Ok(bytes) => PersistedSettings::decode(&bytes),
            Err(e) => {
                warn!(error = %e, "Failed to read settings, using defaults");
                PersistedSettings::default()
            }
        };
        info!(
            address = %radio.address(),
            id = %config.camera_id,
            name = %settings.name,
            "Node initialized"
        );
        Self {
            state: NodeState::boot(config.camera_id, settings),
            heartbeat: Cadence::new(config.heartbeat_interval_ms),
            last_packet_at: None,
            button: Button::new(),
            radio,
            storage,
            config,
        }
    }

    /// Start timers and ask the hub for the current tally
    pub fn boot(&mut self, now: Millis) {
        self.heartbeat = Cadence::starting_at(self.config.heartbeat_interval_ms, now);
        self.last_packet_at = Some(now);
        self.transmit(&Command::GetTally);
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn address(&self) -> HardwareAddress {
        self.radio.address()
    }

    pub fn identity(&self) -> Identity {
        Identity {
            camera_id: self.state.assigned_id,
            address: self.radio.address(),
        }
    }

    /// Apply one received frame. Any frame counts as link activity, even one
    /// that fails to decode.
    pub fn handle_frame(&mut self, frame: &Frame, now: Millis) -> Option<NodeEvent> {
        self.last_packet_at = Some(now);
        match Command::decode(&frame.bytes) {
            Ok(command) => self.apply(&command, now),
            Err(e) => {
                debug!(source = %frame.source, error = %e, "Dropping malformed frame");
                None
            }
        }
    }

    /// Apply a decoded command if it is addressed to this node
    pub fn apply(&mut self, command: &Command, now: Millis) -> Option<NodeEvent> {
        if matches!(command, Command::Heartbeat(_) | Command::GetTally) {
            return None;
        }
        if !command.target().matches(&self.identity()) {
            trace!(opcode = %command.opcode(), "Not addressed to this node");
            return None;
        }

        match command {
            Command::SetTally { program, preview } => {
                self.state.program = *program;
                self.state.preview = *preview;
                self.state.color_override = None;
                None
            }
            Command::SetColor { color, .. } => {
                self.state.color_override = Some(*color);
                None
            }
            Command::SetBrightness { level, .. } | Command::SetBrightnessMac { level, .. } => {
                self.state.rgb_brightness = *level;
                self.persist();
                None
            }
            Command::SetStatusBrightness { level, .. } => {
                self.state.status_brightness = *level;
                self.persist();
                None
            }
            Command::SetCamId { id, .. } | Command::SetCamIdMac { id, .. } => self.assign(*id),
            Command::SwitchCamId { to, .. } => self.assign(*to),
            Command::SetName { name, .. } | Command::SetNameMac { name, .. } => {
                if name.is_empty() {
                    debug!("Ignoring empty name");
                    return None;
                }
                self.state.set_name(name);
                self.persist();
                info!(name = %self.state.display_name, "Name set");
                Some(NodeEvent::Renamed(self.state.display_name.clone()))
            }
            Command::SetIdentify { seconds, .. } => {
                let until = now.saturating_add(*seconds as Millis * 1000);
                self.state.identify_until = Some(until);
                debug!(seconds = *seconds, "Identify requested");
                None
            }
            Command::SetBlink { enabled, color, .. } => {
                self.state.blink = Some(Blink::start(*color, *enabled, now));
                None
            }
            Command::SetSignal { signal, .. } => Some(NodeEvent::Signal(*signal)),
            Command::Heartbeat(_) | Command::GetTally => None,
        }
    }

    /// Feed the id-cycle button level; a debounced press cycles the id
    pub fn sample_button(&mut self, pressed: bool, now: Millis) -> Option<NodeEvent> {
        self.button.sample(pressed, now).then(|| self.cycle_id())
    }

    /// Local id-cycle control: next id, wrapping 64 to 1, and drop any override
    pub fn cycle_id(&mut self) -> NodeEvent {
        let from = self.state.assigned_id;
        let to = from.cycled();
        self.state.assigned_id = to;
        self.state.color_override = None;
        info!(from = %from, to = %to, "Tally id cycled");
        NodeEvent::IdChanged { from, to }
    }

    /// Service timers (blink phase, identify expiry, heartbeat) and return
    /// the resulting outputs
    pub fn tick(&mut self, now: Millis) -> NodeOutputs {
        if let Some(blink) = self.state.blink.as_mut() {
            blink.advance(now);
        }
        if self.state.identify_until.is_some_and(|until| now >= until) {
            self.state.identify_until = None;
        }
        if self.heartbeat.due(now) {
            self.send_heartbeat();
        }
        self.outputs(now)
    }

    pub fn outputs(&self, now: Millis) -> NodeOutputs {
        let identify_on =
            self.state.identify_active(now) && (now / IDENTIFY_HALF_PERIOD_MS) % 2 == 1;
        NodeOutputs {
            color: led::output(&self.state),
            identify_on,
            status_level: if self.link_alive(now) {
                self.state.status_brightness
            } else {
                0
            },
        }
    }

    pub fn link_alive(&self, now: Millis) -> bool {
        self.last_packet_at
            .is_some_and(|at| now.saturating_sub(at) < self.config.link_timeout_ms)
    }

    pub fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            id: self.state.assigned_id.get(),
            rgb_brightness: self.state.rgb_brightness,
            status_brightness: self.state.status_brightness,
            rssi: self.radio.signal_strength().unwrap_or(0),
            name: truncate_utf8(&self.state.display_name, WIRE_NAME_MAX).to_string(),
        }
    }

    fn send_heartbeat(&self) {
        trace!(id = %self.state.assigned_id, "Sending heartbeat");
        self.transmit(&Command::Heartbeat(self.heartbeat()));
    }

    fn assign(&mut self, raw: u8) -> Option<NodeEvent> {
        let Some(to) = CameraId::new(raw) else {
            debug!(id = raw, "Ignoring invalid camera id");
            return None;
        };
        let from = self.state.assigned_id;
        if from == to {
            return None;
        }
        self.state.assigned_id = to;
        info!(from = %from, to = %to, "Tally id assigned");
        Some(NodeEvent::IdChanged { from, to })
    }

    fn persist(&mut self) {
        if let Err(e) = self.storage.store(&self.state.settings().encode()) {
            warn!(error = %e, "Failed to persist settings");
        }
    }

    fn transmit(&self, command: &Command) {
        if let Err(e) = self.radio.broadcast(&command.encode()) {
            warn!(opcode = %command.opcode(), error = %e, "Broadcast failed");
        }
    }
}
