//! Addressing predicates: does a command apply to a given node?

use serde::{Deserialize, Serialize};

use crate::address::HardwareAddress;
use crate::camera::{CameraId, TallyMask};

/// Who a command is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Target {
    /// Every node, no filter
    Broadcast,
    /// Nodes whose assigned camera id has its bit set in the mask
    Group(TallyMask),
    /// The single node with this hardware address
    Unicast(HardwareAddress),
    /// Nodes currently assigned exactly this raw camera id
    Camera(u8),
}

/// What a node answers to: its current camera id and its fixed address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub camera_id: CameraId,
    pub address: HardwareAddress,
}

impl Target {
    pub fn matches(&self, identity: &Identity) -> bool {
        match self {
            Target::Broadcast => true,
            Target::Group(mask) => mask.contains(identity.camera_id),
            Target::Unicast(address) => *address == identity.address,
            Target::Camera(raw) => *raw == identity.camera_id.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u8, last: u8) -> Identity {
        Identity {
            camera_id: CameraId::new(id).unwrap(),
            address: HardwareAddress([0x24, 0x0a, 0xc4, 0, 0, last]),
        }
    }

    #[test]
    fn test_group_tests_own_bit() {
        let three = CameraId::new(3).unwrap();
        let target = Target::Group(TallyMask::from(three));
        assert!(target.matches(&node(3, 1)));
        assert!(!target.matches(&node(4, 1)));
        assert!(Target::Group(TallyMask::ALL).matches(&node(64, 1)));
        assert!(!Target::Group(TallyMask::EMPTY).matches(&node(1, 1)));
    }

    #[test]
    fn test_unicast_is_byte_exact() {
        let target = Target::Unicast(node(1, 7).address);
        assert!(target.matches(&node(1, 7)));
        assert!(target.matches(&node(9, 7)));
        assert!(!target.matches(&node(1, 8)));
    }

    #[test]
    fn test_camera_and_broadcast() {
        assert!(Target::Camera(2).matches(&node(2, 1)));
        assert!(!Target::Camera(2).matches(&node(9, 1)));
        assert!(Target::Broadcast.matches(&node(9, 1)));
    }
}
