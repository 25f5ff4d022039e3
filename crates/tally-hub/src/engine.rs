//! Hub protocol engine

use serde::Serialize;
use tally_core::{
    CameraId, Cadence, Command, DeviceRecord, HardwareAddress, Millis, Opcode, TallyMask,
};
use tally_radio::{Frame, Radio, RadioError};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace, warn};

use crate::registry::{Registry, Upsert};

/// Default republish period
pub const DEFAULT_PUBLISH_INTERVAL_MS: Millis = 2000;

/// Default freshness window for counting a device as active
pub const DEFAULT_FRESHNESS_MS: Millis = 5000;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("camera id {0} outside 1..=64")]
    InvalidCameraId(u8),
    #[error("name must not be empty")]
    EmptyName,
    #[error("{0} is not sent by the hub")]
    NotHubCommand(Opcode),
    #[error("radio error: {0}")]
    Radio(#[from] RadioError),
}

/// Hub timing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    pub publish_interval_ms: Millis,
    pub freshness_ms: Millis,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: DEFAULT_PUBLISH_INTERVAL_MS,
            freshness_ms: DEFAULT_FRESHNESS_MS,
        }
    }
}

/// Push notification for display and config consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum HubEvent {
    /// Canonical tally (re)broadcast
    TallyPublished {
        program: TallyMask,
        preview: TallyMask,
    },
    /// First heartbeat from an unseen address
    DeviceDiscovered(DeviceRecord),
    /// Heartbeat from a known address
    DeviceUpdated(DeviceRecord),
    /// Unseen address arrived while the registry was full
    DeviceDropped { address: HardwareAddress },
}

/// Read-only view of hub state, refreshed after every mutation and poll
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubSnapshot {
    pub program: TallyMask,
    pub preview: TallyMask,
    pub devices: Vec<DeviceRecord>,
    pub total_count: usize,
    pub active_count: usize,
    /// `None` while no device has been heard from
    pub youngest_heartbeat_age_ms: Option<Millis>,
    pub taken_at: Millis,
}

/// Hub engine. Exactly one owner mutates it; observers use
/// [`HubEngine::subscribe`] and [`HubEngine::watch`].
pub struct HubEngine<R: Radio> {
    radio: R,
    config: HubConfig,
    registry: Registry,
    program: TallyMask,
    preview: TallyMask,
    republish: Cadence,
    events: broadcast::Sender<HubEvent>,
    snapshot: watch::Sender<HubSnapshot>,
}

impl<R: Radio> HubEngine<R> {
    pub fn new(radio: R, config: HubConfig) -> Self {
        let (events, _) = broadcast::channel(100);
        let (snapshot, _) = watch::channel(HubSnapshot::default());
        Self {
            radio,
            config,
            registry: Registry::new(),
            program: TallyMask::EMPTY,
            preview: TallyMask::EMPTY,
            republish: Cadence::new(config.publish_interval_ms),
            events,
            snapshot,
        }
    }

    pub fn address(&self) -> HardwareAddress {
        self.radio.address()
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Subscribe to push notifications
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    /// Sender half of the event channel, for handing out subscriptions
    /// from other tasks
    pub fn event_sender(&self) -> broadcast::Sender<HubEvent> {
        self.events.clone()
    }

    /// Watch the latest snapshot
    pub fn watch(&self) -> watch::Receiver<HubSnapshot> {
        self.snapshot.subscribe()
    }

    /// Broadcast a new canonical tally and remember it
    pub fn publish(&mut self, program: TallyMask, preview: TallyMask, now: Millis) {
        let frame = Command::SetTally { program, preview }.encode();
        self.transmit(Opcode::SetTally, &frame);
        self.program = program;
        self.preview = preview;
        self.republish.reset(now);
        trace!(program = program.bits(), preview = preview.bits(), "Published tally");
        let _ = self.events.send(HubEvent::TallyPublished { program, preview });
        self.refresh(now);
    }

    /// Pass an application signal to every camera in `mask`
    pub fn signal(&mut self, mask: TallyMask, code: u8) {
        let frame = Command::SetSignal { signal: code, mask }.encode();
        self.transmit(Opcode::SetSignal, &frame);
    }

    /// Validate and broadcast a node-bound command.
    ///
    /// `SetTally` goes through [`HubEngine::publish`] so the canonical state
    /// follows it. Unlike the periodic path, a send failure is returned.
    pub fn send(&mut self, command: &Command, now: Millis) -> Result<(), CommandError> {
        match command {
            Command::SetTally { program, preview } => {
                self.publish(*program, *preview, now);
                return Ok(());
            }
            Command::Heartbeat(_) => return Err(CommandError::NotHubCommand(Opcode::Heartbeat)),
            Command::SetCamId { id, .. } | Command::SetCamIdMac { id, .. } => {
                validate_id(*id)?;
            }
            Command::SwitchCamId { from, to } => {
                validate_id(*from)?;
                validate_id(*to)?;
            }
            Command::SetName { name, .. } | Command::SetNameMac { name, .. } => {
                if name.is_empty() {
                    return Err(CommandError::EmptyName);
                }
            }
            _ => {}
        }
        debug!(opcode = %command.opcode(), target = ?command.target(), "Sending command");
        self.radio.broadcast(&command.encode())?;
        Ok(())
    }

    /// Apply one received frame. Malformed frames are dropped silently.
    pub fn handle_frame(&mut self, frame: &Frame, now: Millis) {
        let command = match Command::decode(&frame.bytes) {
            Ok(command) => command,
            Err(e) => {
                debug!(source = %frame.source, error = %e, "Dropping malformed frame");
                return;
            }
        };

        match command {
            Command::Heartbeat(hb) => {
                let event = match self.registry.on_heartbeat(frame.source, &hb, now) {
                    Upsert::Created(record) => {
                        info!(
                            address = %record.address,
                            id = %record.assigned_id,
                            name = %record.display_name,
                            "Discovered tally node"
                        );
                        HubEvent::DeviceDiscovered(record)
                    }
                    Upsert::Updated(record) => HubEvent::DeviceUpdated(record),
                    Upsert::Dropped => HubEvent::DeviceDropped {
                        address: frame.source,
                    },
                    Upsert::Ignored => return,
                };
                let _ = self.events.send(event);
                self.refresh(now);
            }
            Command::GetTally => {
                debug!(source = %frame.source, "Tally requested");
                self.publish(self.program, self.preview, now);
            }
            other => {
                trace!(source = %frame.source, opcode = %other.opcode(), "Ignoring node-bound command");
            }
        }
    }

    /// Service timers: republish the canonical tally when due
    pub fn poll(&mut self, now: Millis) {
        if self.republish.due(now) {
            self.publish(self.program, self.preview, now);
        } else {
            self.refresh(now);
        }
    }

    pub fn canonical_tally(&self) -> (TallyMask, TallyMask) {
        (self.program, self.preview)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_snapshot(&self) -> Vec<DeviceRecord> {
        self.registry.snapshot()
    }

    pub fn active_count(&self, now: Millis) -> usize {
        self.registry.active_count(now, self.config.freshness_ms)
    }

    pub fn total_count(&self) -> usize {
        self.registry.total_count()
    }

    pub fn youngest_heartbeat_age(&self, now: Millis) -> Option<Millis> {
        self.registry.youngest_heartbeat_age(now)
    }

    pub fn snapshot(&self, now: Millis) -> HubSnapshot {
        HubSnapshot {
            program: self.program,
            preview: self.preview,
            devices: self.registry.snapshot(),
            total_count: self.total_count(),
            active_count: self.active_count(now),
            youngest_heartbeat_age_ms: self.youngest_heartbeat_age(now),
            taken_at: now,
        }
    }

    fn refresh(&self, now: Millis) {
        self.snapshot.send_replace(self.snapshot(now));
    }

    /// Fire-and-forget send; failures are only logged
    fn transmit(&self, opcode: Opcode, frame: &[u8]) {
        if let Err(e) = self.radio.broadcast(frame) {
            warn!(opcode = %opcode, error = %e, "Broadcast failed");
        }
    }
}

fn validate_id(raw: u8) -> Result<CameraId, CommandError> {
    CameraId::new(raw).ok_or(CommandError::InvalidCameraId(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{Heartbeat, Target};
    use tally_radio::{Ether, EtherRadio, FrameReceiver};

    const HUB: HardwareAddress = HardwareAddress([0x10; 6]);

    fn cam(n: u8) -> CameraId {
        CameraId::new(n).unwrap()
    }

    fn setup() -> (HubEngine<EtherRadio>, EtherRadio, FrameReceiver) {
        let ether = Ether::new();
        let (hub_radio, _hub_rx) = ether.attach(HUB, 16);
        let (listener, listener_rx) = ether.attach(HardwareAddress([0x20; 6]), 16);
        (HubEngine::new(hub_radio, HubConfig::default()), listener, listener_rx)
    }

    fn heartbeat_frame(source: u8, id: u8) -> Frame {
        Frame {
            source: HardwareAddress([source; 6]),
            bytes: Command::Heartbeat(Heartbeat {
                id,
                rgb_brightness: 255,
                status_brightness: 255,
                rssi: -40,
                name: "CAM".to_string(),
            })
            .encode(),
        }
    }

    #[test]
    fn test_publish_broadcasts_and_stores() {
        let (mut hub, _listener, mut rx) = setup();
        let mut events = hub.subscribe();
        let program = TallyMask::from(cam(3));

        hub.publish(program, TallyMask::EMPTY, 100);

        assert_eq!(hub.canonical_tally(), (program, TallyMask::EMPTY));
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.source, HUB);
        assert_eq!(
            Command::decode(&frame.bytes).unwrap(),
            Command::SetTally {
                program,
                preview: TallyMask::EMPTY
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            HubEvent::TallyPublished {
                program,
                preview: TallyMask::EMPTY
            }
        );
        assert_eq!(hub.watch().borrow().program, program);
    }

    #[test]
    fn test_periodic_republish() {
        let (mut hub, _listener, mut rx) = setup();
        hub.poll(0);
        assert_eq!(rx.drain().len(), 1);
        hub.poll(1000);
        hub.poll(2000);
        assert!(rx.drain().is_empty());
        hub.poll(2001);
        assert_eq!(rx.drain().len(), 1);
    }

    #[test]
    fn test_on_demand_publish_defers_timer() {
        let (mut hub, _listener, mut rx) = setup();
        hub.poll(0);
        hub.publish(TallyMask::from(cam(1)), TallyMask::EMPTY, 1500);
        rx.drain();
        hub.poll(2500);
        assert!(rx.drain().is_empty());
        hub.poll(3501);
        assert_eq!(rx.drain().len(), 1);
    }

    #[test]
    fn test_heartbeats_fill_registry() {
        let (mut hub, _listener, _rx) = setup();
        let mut events = hub.subscribe();

        hub.handle_frame(&heartbeat_frame(0xA, 5), 10);
        hub.handle_frame(&heartbeat_frame(0xB, 5), 20);
        hub.handle_frame(&heartbeat_frame(0xA, 6), 30);

        assert_eq!(hub.total_count(), 2);
        assert_eq!(hub.active_count(30), 2);
        assert_eq!(hub.youngest_heartbeat_age(40), Some(10));
        assert!(matches!(events.try_recv().unwrap(), HubEvent::DeviceDiscovered(_)));
        assert!(matches!(events.try_recv().unwrap(), HubEvent::DeviceDiscovered(_)));
        match events.try_recv().unwrap() {
            HubEvent::DeviceUpdated(record) => assert_eq!(record.assigned_id, cam(6)),
            other => panic!("unexpected {:?}", other),
        }

        let snap = hub.watch().borrow().clone();
        assert_eq!(snap.total_count, 2);
        assert_eq!(snap.devices.len(), 2);
    }

    #[test]
    fn test_full_registry_drops_new_device() {
        let (mut hub, _listener, _rx) = setup();
        for source in 1..=64u8 {
            hub.handle_frame(&heartbeat_frame(source, 1), 10);
        }
        assert_eq!(hub.total_count(), 64);
        let before = hub.watch().borrow().clone();

        let mut events = hub.subscribe();
        hub.handle_frame(&heartbeat_frame(65, 2), 500);

        assert_eq!(
            events.try_recv().unwrap(),
            HubEvent::DeviceDropped {
                address: HardwareAddress([65; 6])
            }
        );
        assert_eq!(hub.total_count(), 64);
        assert!(hub.registry().get(&HardwareAddress([65; 6])).is_none());
        let after = hub.watch().borrow().clone();
        assert_eq!(after.devices, before.devices);
        assert_eq!(after.total_count, 64);
    }

    #[test]
    fn test_get_tally_replies_with_canonical_state() {
        let (mut hub, _listener, mut rx) = setup();
        let program = TallyMask::from(cam(2));
        let preview = TallyMask::from(cam(4));
        hub.publish(program, preview, 0);
        rx.drain();

        hub.handle_frame(
            &Frame {
                source: HardwareAddress([0x20; 6]),
                bytes: Command::GetTally.encode(),
            },
            50,
        );

        let reply = rx.try_recv().unwrap();
        assert_eq!(
            Command::decode(&reply.bytes).unwrap(),
            Command::SetTally { program, preview }
        );
    }

    #[test]
    fn test_malformed_frames_are_ignored() {
        let (mut hub, _listener, mut rx) = setup();
        for bytes in [vec![], vec![4, 1, 2], vec![99, 0, 0]] {
            hub.handle_frame(
                &Frame {
                    source: HardwareAddress([1; 6]),
                    bytes,
                },
                0,
            );
        }
        assert_eq!(hub.total_count(), 0);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_send_validates_requests() {
        let (mut hub, _listener, mut rx) = setup();
        let address = HardwareAddress([7; 6]);

        assert!(matches!(
            hub.send(&Command::SetCamIdMac { id: 0, address }, 0),
            Err(CommandError::InvalidCameraId(0))
        ));
        assert!(matches!(
            hub.send(&Command::SetCamId { id: 65, mask: TallyMask::ALL }, 0),
            Err(CommandError::InvalidCameraId(65))
        ));
        assert!(matches!(
            hub.send(
                &Command::SetName {
                    name: String::new(),
                    mask: TallyMask::ALL
                },
                0
            ),
            Err(CommandError::EmptyName)
        ));
        assert!(rx.try_recv().is_none());

        let identify = Command::SetIdentify {
            seconds: 5,
            target: Target::Unicast(address),
        };
        hub.send(&identify, 0).unwrap();
        assert_eq!(Command::decode(&rx.try_recv().unwrap().bytes).unwrap(), identify);
    }

    #[test]
    fn test_send_set_tally_updates_canonical() {
        let (mut hub, _listener, _rx) = setup();
        let program = TallyMask::from(cam(9));
        hub.send(
            &Command::SetTally {
                program,
                preview: TallyMask::EMPTY,
            },
            0,
        )
        .unwrap();
        assert_eq!(hub.canonical_tally().0, program);
    }

    #[test]
    fn test_signal_encodes_set_signal() {
        let (mut hub, _listener, mut rx) = setup();
        hub.signal(TallyMask::from(cam(4)), 42);
        assert_eq!(
            Command::decode(&rx.try_recv().unwrap().bytes).unwrap(),
            Command::SetSignal {
                signal: 42,
                mask: TallyMask::from(cam(4))
            }
        );
    }

    #[test]
    fn test_event_serializes_tagged() {
        let json = serde_json::to_value(HubEvent::TallyPublished {
            program: TallyMask(4),
            preview: TallyMask(0),
        })
        .unwrap();
        assert_eq!(json["type"], "tally_published");
        assert_eq!(json["data"]["program"], 4);
    }
}
