//! Tally Radio - Fire-and-forget broadcast transports
//!
//! The protocol engines depend only on the [`Radio`] send contract and on a
//! [`FrameReceiver`]. Whatever context the transport receives on (a socket
//! task here, an interrupt-like callback on real hardware), it only ever
//! pushes raw frames into the bounded queue; the owning loop is the sole
//! consumer and applies every state change.
//!
//! Transports:
//! - [`UdpRadio`]: UDP broadcast standing in for the radio link
//! - [`Ether`]: an in-memory shared medium for tests and simulation

pub mod ether;
pub mod queue;
pub mod udp;

use tally_core::HardwareAddress;
use thiserror::Error;

pub use ether::{Ether, EtherRadio};
pub use queue::{frame_queue, FrameReceiver, FrameSender};
pub use udp::UdpRadio;

#[derive(Error, Debug)]
pub enum RadioError {
    #[error("transport busy")]
    Busy,
    #[error("transport closed")]
    Closed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A frame as received from the medium
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Hardware address of the sender
    pub source: HardwareAddress,
    /// Command bytes, opcode first
    pub bytes: Vec<u8>,
}

/// Minimal send side of a connectionless radio link.
///
/// `broadcast` returns once the frame has been handed to the transport; there
/// is no acknowledgement and no retry.
pub trait Radio: Send + Sync {
    /// This station's own hardware address
    fn address(&self) -> HardwareAddress;

    fn broadcast(&self, frame: &[u8]) -> Result<(), RadioError>;

    /// Signal strength of the link, if the transport can measure it
    fn signal_strength(&self) -> Option<i8> {
        None
    }
}
