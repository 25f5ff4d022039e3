//! Hub and nodes talking over a shared in-memory medium

use tally_core::{CameraId, Command, HardwareAddress, Rgb, TallyMask, Target};
use tally_hub::{HubConfig, HubEngine};
use tally_node::{MemoryStorage, NodeConfig, NodeEngine, NodeEvent};
use tally_radio::{Ether, EtherRadio, FrameReceiver};

type Node = NodeEngine<EtherRadio, MemoryStorage>;

struct Mesh {
    ether: Ether,
    hub: HubEngine<EtherRadio>,
    hub_rx: FrameReceiver,
    nodes: Vec<(Node, FrameReceiver)>,
}

fn cam(n: u8) -> CameraId {
    CameraId::new(n).unwrap()
}

fn node_address(n: u8) -> HardwareAddress {
    HardwareAddress([0x24, 0x0a, 0xc4, 0x00, 0x00, n])
}

impl Mesh {
    fn new(ids: &[u8]) -> Self {
        let ether = Ether::new();
        let (hub_radio, hub_rx) = ether.attach(HardwareAddress([0x10; 6]), 64);
        let hub = HubEngine::new(hub_radio, HubConfig::default());
        let nodes = ids
            .iter()
            .enumerate()
            .map(|(i, &id)| {
                let (radio, rx) = ether.attach(node_address(i as u8 + 1), 64);
                let config = NodeConfig {
                    camera_id: cam(id),
                    ..NodeConfig::default()
                };
                (NodeEngine::new(radio, MemoryStorage::new(), config), rx)
            })
            .collect();
        Self {
            ether,
            hub,
            hub_rx,
            nodes,
        }
    }

    /// Deliver everything in flight until the medium is quiet
    fn settle(&mut self, now: u64) -> Vec<NodeEvent> {
        let mut events = Vec::new();
        loop {
            let mut moved = false;
            for frame in self.hub_rx.drain() {
                self.hub.handle_frame(&frame, now);
                moved = true;
            }
            for (node, rx) in self.nodes.iter_mut() {
                for frame in rx.drain() {
                    events.extend(node.handle_frame(&frame, now));
                    moved = true;
                }
            }
            if !moved {
                return events;
            }
        }
    }

    fn tick_all(&mut self, now: u64) {
        self.hub.poll(now);
        for (node, _) in self.nodes.iter_mut() {
            node.tick(now);
        }
        self.settle(now);
    }

    fn node(&self, i: usize) -> &Node {
        &self.nodes[i].0
    }
}

#[test]
fn test_tally_reaches_nodes_with_brightness() {
    let mut mesh = Mesh::new(&[3, 4]);
    mesh.nodes[0]
        .0
        .apply(&Command::SetBrightness { level: 128, mask: TallyMask::ALL }, 0);

    mesh.hub.publish(TallyMask::from(cam(3)), TallyMask::from(cam(4)), 0);
    mesh.settle(0);

    assert_eq!(mesh.node(0).outputs(0).color, Rgb::new(128, 0, 0));
    assert_eq!(mesh.node(1).outputs(0).color, Rgb::GREEN);
}

#[test]
fn test_override_cleared_by_next_tally() {
    let mut mesh = Mesh::new(&[3]);
    mesh.hub.publish(TallyMask::from(cam(3)), TallyMask::EMPTY, 0);
    mesh.hub
        .send(&Command::SetColor { color: Rgb::from_u32(0x00FF00), mask: TallyMask::from(cam(3)) }, 0)
        .unwrap();
    mesh.settle(0);
    assert_eq!(mesh.node(0).state().color_override, Some(Rgb::GREEN));
    assert_eq!(mesh.node(0).outputs(0).color, Rgb::GREEN);

    mesh.hub.publish(TallyMask::from(cam(3)), TallyMask::EMPTY, 10);
    mesh.settle(10);
    assert_eq!(mesh.node(0).state().color_override, None);
    assert_eq!(mesh.node(0).outputs(10).color, Rgb::RED);
}

#[test]
fn test_boot_request_gets_current_tally() {
    let mut mesh = Mesh::new(&[5]);
    mesh.ether.set_silenced(true);
    mesh.hub.publish(TallyMask::from(cam(5)), TallyMask::EMPTY, 0);
    mesh.ether.set_silenced(false);
    assert!(!mesh.node(0).state().is_program());

    mesh.nodes[0].0.boot(100);
    mesh.settle(100);
    assert!(mesh.node(0).state().is_program());
}

#[test]
fn test_republish_recovers_lost_broadcast() {
    let mut mesh = Mesh::new(&[2]);
    mesh.tick_all(0);

    mesh.ether.set_silenced(true);
    mesh.hub.publish(TallyMask::EMPTY, TallyMask::from(cam(2)), 500);
    mesh.ether.set_silenced(false);
    assert!(!mesh.node(0).state().is_preview());

    mesh.tick_all(2000);
    assert!(!mesh.node(0).state().is_preview());
    mesh.tick_all(2501);
    assert!(mesh.node(0).state().is_preview());
}

#[test]
fn test_heartbeats_populate_registry() {
    let mut mesh = Mesh::new(&[5, 5, 9]);
    for (node, _) in mesh.nodes.iter_mut() {
        node.boot(0);
    }
    mesh.settle(0);
    assert_eq!(mesh.hub.total_count(), 0);

    mesh.tick_all(2001);
    assert_eq!(mesh.hub.total_count(), 3);
    assert_eq!(mesh.hub.active_count(2001), 3);

    let ids: Vec<u8> = mesh
        .hub
        .registry_snapshot()
        .iter()
        .map(|r| r.assigned_id.get())
        .collect();
    assert_eq!(ids, vec![5, 5, 9]);

    // A second round updates in place
    mesh.tick_all(4002);
    assert_eq!(mesh.hub.total_count(), 3);
    assert_eq!(mesh.hub.youngest_heartbeat_age(4100), Some(98));
    assert_eq!(mesh.hub.active_count(9003), 0);
}

#[test]
fn test_registry_follows_reassigned_id() {
    let mut mesh = Mesh::new(&[2, 9]);
    mesh.tick_all(0);
    mesh.hub.send(&Command::SwitchCamId { from: 2, to: 7 }, 10).unwrap();
    mesh.settle(10);
    assert_eq!(mesh.node(0).state().assigned_id, cam(7));
    assert_eq!(mesh.node(1).state().assigned_id, cam(9));

    mesh.tick_all(2001);
    let record = mesh.hub.registry().get(&node_address(1)).unwrap();
    assert_eq!(record.assigned_id, cam(7));
    assert_eq!(mesh.hub.total_count(), 2);
}

#[test]
fn test_unicast_identify_and_name() {
    let mut mesh = Mesh::new(&[1, 1]);
    let target = node_address(2);
    mesh.hub
        .send(&Command::SetIdentify { seconds: 2, target: Target::Unicast(target) }, 100)
        .unwrap();
    mesh.hub
        .send(&Command::SetNameMac { name: "Steadicam".to_string(), address: target }, 100)
        .unwrap();
    let events = mesh.settle(100);

    assert_eq!(events, vec![NodeEvent::Renamed("Steadicam".to_string())]);
    assert_eq!(mesh.node(0).state().identify_until, None);
    assert_eq!(mesh.node(1).state().identify_until, Some(2100));
    assert_eq!(mesh.node(0).state().display_name, "CAM");
    assert_eq!(mesh.node(1).state().display_name, "Steadicam");
}

#[test]
fn test_signal_passes_through() {
    let mut mesh = Mesh::new(&[1, 2]);
    mesh.hub.signal(TallyMask::from(cam(2)), 9);
    assert_eq!(mesh.settle(0), vec![NodeEvent::Signal(9)]);
}
