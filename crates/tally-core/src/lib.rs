//! Tally Core - Shared types and wire codec for the tally mesh
//!
//! This crate provides the pieces both roles of the mesh agree on:
//! - Camera ids and 64-bit tally masks
//! - Hardware addresses and RGB colors
//! - The binary command codec spoken over the radio link
//! - Addressing predicates (broadcast, group mask, unicast, camera match)
//! - Device records kept by the hub registry
//! - Millisecond cadence timers used by the cooperative loops

pub mod address;
pub mod camera;
pub mod color;
pub mod device;
pub mod name;
pub mod target;
pub mod time;
pub mod wire;

pub use address::{AddressParseError, HardwareAddress};
pub use camera::{bitn, CameraId, TallyMask, MAX_CAMERAS};
pub use color::Rgb;
pub use device::DeviceRecord;
pub use name::{truncate_utf8, LOCAL_NAME_MAX, WIRE_NAME_MAX};
pub use target::{Identity, Target};
pub use time::{Cadence, Millis};
pub use wire::{Command, Heartbeat, Opcode, WireError};
