//! Camera ids and tally bitmasks

use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest assignable camera id (and the width of a tally mask)
pub const MAX_CAMERAS: u8 = 64;

/// Mask bit for camera `n`. Callers must pass an id in `[1, 64]`.
pub fn bitn(id: CameraId) -> u64 {
    1u64 << (id.get() - 1)
}

/// A camera id in `[1, 64]`. Id 0 is reserved for "unassigned" and is not
/// representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CameraId(u8);

impl CameraId {
    pub const FIRST: CameraId = CameraId(1);

    /// Validate a raw id from the wire or from configuration
    pub fn new(raw: u8) -> Option<Self> {
        if (1..=MAX_CAMERAS).contains(&raw) {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// The id after this one, wrapping 64 back to 1
    pub fn cycled(self) -> Self {
        Self((self.0 % MAX_CAMERAS) + 1)
    }

    pub fn bit(self) -> u64 {
        bitn(self)
    }
}

impl TryFrom<u8> for CameraId {
    type Error = String;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| format!("camera id {} outside 1..={}", raw, MAX_CAMERAS))
    }
}

impl From<CameraId> for u8 {
    fn from(id: CameraId) -> u8 {
        id.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A set of camera ids, one bit per camera (bit `n-1` for camera `n`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TallyMask(pub u64);

impl TallyMask {
    pub const EMPTY: TallyMask = TallyMask(0);
    pub const ALL: TallyMask = TallyMask(u64::MAX);

    pub fn from_ids<I: IntoIterator<Item = CameraId>>(ids: I) -> Self {
        ids.into_iter().fold(Self::EMPTY, |mask, id| mask.with(id))
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    pub fn contains(self, id: CameraId) -> bool {
        self.0 & bitn(id) != 0
    }

    pub fn with(self, id: CameraId) -> Self {
        Self(self.0 | bitn(id))
    }

    pub fn insert(&mut self, id: CameraId) {
        self.0 |= bitn(id);
    }

    pub fn remove(&mut self, id: CameraId) {
        self.0 &= !bitn(id);
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Camera ids present in the mask, ascending
    pub fn ids(self) -> impl Iterator<Item = CameraId> {
        (1..=MAX_CAMERAS)
            .filter_map(CameraId::new)
            .filter(move |id| self.contains(*id))
    }
}

impl From<CameraId> for TallyMask {
    fn from(id: CameraId) -> Self {
        Self(bitn(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_bitn_single_bit_and_injective() {
        let mut seen = HashSet::new();
        for raw in 1..=MAX_CAMERAS {
            let bit = bitn(CameraId::new(raw).unwrap());
            assert_eq!(bit.count_ones(), 1, "camera {}", raw);
            assert!(seen.insert(bit), "camera {} collides", raw);
        }
        assert_eq!(seen.len(), 64);
    }

    #[test]
    fn test_bitn_positions() {
        assert_eq!(bitn(CameraId::new(1).unwrap()), 1);
        assert_eq!(bitn(CameraId::new(3).unwrap()), 0b100);
        assert_eq!(bitn(CameraId::new(64).unwrap()), 1 << 63);
    }

    #[test]
    fn test_camera_id_range() {
        assert!(CameraId::new(0).is_none());
        assert!(CameraId::new(65).is_none());
        assert_eq!(CameraId::new(64).unwrap().get(), 64);
    }

    #[test]
    fn test_camera_id_cycles() {
        assert_eq!(CameraId::new(1).unwrap().cycled().get(), 2);
        assert_eq!(CameraId::new(64).unwrap().cycled().get(), 1);
    }

    #[test]
    fn test_mask_membership() {
        let three = CameraId::new(3).unwrap();
        let five = CameraId::new(5).unwrap();
        let mut mask = TallyMask::from(three);
        assert!(mask.contains(three));
        assert!(!mask.contains(five));
        mask.insert(five);
        assert_eq!(mask.ids().map(CameraId::get).collect::<Vec<_>>(), vec![3, 5]);
        mask.remove(three);
        assert_eq!(mask.bits(), 0b10000);
    }

    #[test]
    fn test_camera_id_serde_rejects_zero() {
        assert!(serde_json::from_str::<CameraId>("0").is_err());
        assert_eq!(serde_json::from_str::<CameraId>("7").unwrap().get(), 7);
    }
}
