//! Device records kept by the hub for every node it has heard from

use serde::{Deserialize, Serialize};

use crate::address::HardwareAddress;
use crate::camera::CameraId;
use crate::time::Millis;

/// A node the hub has heard a heartbeat from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Natural key; never changes for a given node
    pub address: HardwareAddress,
    /// Camera id last reported (not unique across nodes)
    pub assigned_id: CameraId,
    /// When the last heartbeat arrived
    pub last_seen: Millis,
    /// Name as reported on the wire (at most 16 bytes)
    pub display_name: String,
    /// Signal strength reported by the node, dBm
    pub signal_strength: i8,
    pub rgb_brightness: u8,
    pub status_brightness: u8,
}

impl DeviceRecord {
    /// Create a record with default brightness levels
    pub fn new(address: HardwareAddress, assigned_id: CameraId, now: Millis) -> Self {
        Self {
            address,
            assigned_id,
            last_seen: now,
            display_name: String::new(),
            signal_strength: 0,
            rgb_brightness: 255,
            status_brightness: 255,
        }
    }

    /// Time since the last heartbeat
    pub fn age(&self, now: Millis) -> Millis {
        now.saturating_sub(self.last_seen)
    }

    /// Whether the last heartbeat is within the freshness window
    pub fn is_fresh(&self, now: Millis, freshness_ms: Millis) -> bool {
        self.age(now) <= freshness_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creation() {
        let addr = HardwareAddress([1, 2, 3, 4, 5, 6]);
        let record = DeviceRecord::new(addr, CameraId::new(4).unwrap(), 1000);
        assert_eq!(record.address, addr);
        assert_eq!(record.rgb_brightness, 255);
        assert_eq!(record.status_brightness, 255);
        assert!(record.display_name.is_empty());
    }

    #[test]
    fn test_freshness_window_is_inclusive() {
        let record = DeviceRecord::new(HardwareAddress::default(), CameraId::FIRST, 1000);
        assert!(record.is_fresh(6000, 5000));
        assert!(!record.is_fresh(6001, 5000));
        assert_eq!(record.age(500), 0);
    }
}
