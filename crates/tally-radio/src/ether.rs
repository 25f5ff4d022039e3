//! In-memory shared medium
//!
//! Every station attached to an [`Ether`] hears every frame broadcast by
//! every other station, through its own bounded queue. Delivery can be
//! switched off to simulate lost broadcasts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tally_core::HardwareAddress;

use crate::queue::{frame_queue, FrameReceiver, FrameSender};
use crate::{Frame, Radio, RadioError};

#[derive(Debug, Default)]
struct Medium {
    stations: Mutex<Vec<(HardwareAddress, FrameSender)>>,
    silenced: AtomicBool,
}

impl Medium {
    fn stations(&self) -> MutexGuard<'_, Vec<(HardwareAddress, FrameSender)>> {
        self.stations.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A shared broadcast medium
#[derive(Debug, Clone, Default)]
pub struct Ether {
    medium: Arc<Medium>,
}

impl Ether {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a station and return its radio plus its receive queue
    pub fn attach(&self, address: HardwareAddress, depth: usize) -> (EtherRadio, FrameReceiver) {
        let (tx, rx) = frame_queue(depth);
        self.medium.stations().push((address, tx));
        let radio = EtherRadio {
            address,
            medium: self.medium.clone(),
            signal: None,
        };
        (radio, rx)
    }

    /// While silenced, broadcasts succeed but reach nobody
    pub fn set_silenced(&self, silenced: bool) {
        self.medium.silenced.store(silenced, Ordering::SeqCst);
    }

    pub fn station_count(&self) -> usize {
        self.medium.stations().len()
    }
}

/// One station's view of an [`Ether`]
#[derive(Debug, Clone)]
pub struct EtherRadio {
    address: HardwareAddress,
    medium: Arc<Medium>,
    signal: Option<i8>,
}

impl EtherRadio {
    /// Report a fixed signal strength from this station
    pub fn with_signal(mut self, dbm: i8) -> Self {
        self.signal = Some(dbm);
        self
    }
}

impl Radio for EtherRadio {
    fn address(&self) -> HardwareAddress {
        self.address
    }

    fn broadcast(&self, frame: &[u8]) -> Result<(), RadioError> {
        if self.medium.silenced.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut stations = self.medium.stations();
        stations.retain(|(_, queue)| !queue.is_closed());
        for (address, queue) in stations.iter() {
            if *address == self.address {
                continue;
            }
            queue.offer(Frame {
                source: self.address,
                bytes: frame.to_vec(),
            });
        }
        Ok(())
    }

    fn signal_strength(&self) -> Option<i8> {
        self.signal
    }
}
