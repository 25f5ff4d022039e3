//! Fixed-capacity device registry keyed by hardware address

use tally_core::{CameraId, DeviceRecord, HardwareAddress, Heartbeat, Millis};
use tracing::{debug, warn};

/// Maximum number of nodes the hub tracks
pub const REGISTRY_CAPACITY: usize = 64;

/// Outcome of applying a heartbeat to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    /// A new record was placed in the first free slot
    Created(DeviceRecord),
    /// An existing record for the same address was refreshed
    Updated(DeviceRecord),
    /// Unseen address and no free slot; nothing stored
    Dropped,
    /// Heartbeat carried a camera id outside 1..=64
    Ignored,
}

/// Arena of optional records. Lookup is a linear scan by address; records
/// are never removed, so a slot once filled stays filled.
#[derive(Debug, Clone)]
pub struct Registry {
    slots: Vec<Option<DeviceRecord>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_capacity(REGISTRY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Insert or refresh the record for `address`
    pub fn on_heartbeat(&mut self, address: HardwareAddress, hb: &Heartbeat, now: Millis) -> Upsert {
        let Some(id) = CameraId::new(hb.id) else {
            debug!(address = %address, id = hb.id, "Ignoring heartbeat with invalid camera id");
            return Upsert::Ignored;
        };

        if let Some(record) = self.slots.iter_mut().flatten().find(|r| r.address == address) {
            apply(record, id, hb, now);
            return Upsert::Updated(record.clone());
        }

        let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) else {
            warn!(address = %address, id = %id, "Registry full, dropping new device");
            return Upsert::Dropped;
        };
        let mut record = DeviceRecord::new(address, id, now);
        apply(&mut record, id, hb, now);
        *slot = Some(record.clone());
        Upsert::Created(record)
    }

    pub fn get(&self, address: &HardwareAddress) -> Option<&DeviceRecord> {
        self.iter().find(|r| r.address == *address)
    }

    /// Occupied records in slot order
    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.slots.iter().flatten()
    }

    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.iter().cloned().collect()
    }

    /// Records heard from within `freshness_ms`
    pub fn active_count(&self, now: Millis, freshness_ms: Millis) -> usize {
        self.iter().filter(|r| r.is_fresh(now, freshness_ms)).count()
    }

    /// Every record ever created, fresh or not
    pub fn total_count(&self) -> usize {
        self.iter().count()
    }

    /// Time since the most recently heard-from device; `None` when empty
    pub fn youngest_heartbeat_age(&self, now: Millis) -> Option<Millis> {
        self.iter().map(|r| r.age(now)).min()
    }
}

fn apply(record: &mut DeviceRecord, id: CameraId, hb: &Heartbeat, now: Millis) {
    record.assigned_id = id;
    record.last_seen = now;
    record.signal_strength = hb.rssi;
    record.rgb_brightness = hb.rgb_brightness;
    record.status_brightness = hb.status_brightness;
    // A nameless heartbeat keeps the name we already know
    if !hb.name.is_empty() {
        record.display_name = hb.name.clone();
    }
}
