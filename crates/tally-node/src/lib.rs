//! Tally Node - Receiver-side protocol engine
//!
//! A node owns one identity (camera id, hardware address, name, brightness),
//! applies inbound commands addressed to it, arbitrates its LED output
//! between competing visual states and announces itself with heartbeats.

pub mod button;
pub mod engine;
pub mod led;
pub mod state;
pub mod storage;

pub use button::Button;
pub use engine::{NodeConfig, NodeEngine, NodeEvent, NodeOutputs};
pub use state::{Blink, NodeState, BLINK_HALF_PERIOD_MS};
pub use storage::{FileStorage, MemoryStorage, PersistedSettings, Storage, StorageError};
