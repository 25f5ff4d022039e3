//! Tally Hub - Controller side of the tally mesh
//!
//! The hub owns the canonical program/preview masks, encodes and broadcasts
//! commands, and tracks every node it hears a heartbeat from in a bounded
//! registry. A single loop owns the [`HubEngine`]; everyone else observes it
//! through [`HubEvent`]s and [`HubSnapshot`]s.

pub mod engine;
pub mod registry;

pub use engine::{CommandError, HubConfig, HubEngine, HubEvent, HubSnapshot};
pub use registry::{Registry, Upsert, REGISTRY_CAPACITY};
