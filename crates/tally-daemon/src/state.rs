//! Shared state for the hub's HTTP surface
//!
//! Handlers never touch the engine. Reads come from the engine's published
//! snapshot; writes are queued to the hub loop, which owns the engine.

use std::sync::Arc;
use tally_core::{Command, TallyMask};
use tally_hub::{CommandError, HubEvent, HubSnapshot};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::clock::Clock;

/// Work queued for the hub loop
#[derive(Debug)]
pub enum HubRequest {
    Publish {
        program: TallyMask,
        preview: TallyMask,
        reply: oneshot::Sender<()>,
    },
    Send {
        command: Command,
        reply: oneshot::Sender<Result<(), CommandError>>,
    },
}

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("hub loop is not running")]
    HubStopped,
    #[error(transparent)]
    Rejected(#[from] CommandError),
}

pub struct AppState {
    requests: mpsc::Sender<HubRequest>,
    snapshot: watch::Receiver<HubSnapshot>,
    events: broadcast::Sender<HubEvent>,
    clock: Clock,
}

impl AppState {
    pub fn new(
        requests: mpsc::Sender<HubRequest>,
        snapshot: watch::Receiver<HubSnapshot>,
        events: broadcast::Sender<HubEvent>,
        clock: Clock,
    ) -> Arc<Self> {
        Arc::new(Self {
            requests,
            snapshot,
            events,
            clock,
        })
    }

    /// Current time on the hub loop's clock
    pub fn now(&self) -> tally_core::Millis {
        self.clock.now()
    }

    /// Latest view published by the hub loop
    pub fn snapshot(&self) -> HubSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to hub events
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    pub async fn publish(&self, program: TallyMask, preview: TallyMask) -> Result<(), RequestError> {
        let (reply, done) = oneshot::channel();
        self.requests
            .send(HubRequest::Publish {
                program,
                preview,
                reply,
            })
            .await
            .map_err(|_| RequestError::HubStopped)?;
        done.await.map_err(|_| RequestError::HubStopped)
    }

    pub async fn send(&self, command: Command) -> Result<(), RequestError> {
        let (reply, done) = oneshot::channel();
        self.requests
            .send(HubRequest::Send { command, reply })
            .await
            .map_err(|_| RequestError::HubStopped)?;
        done.await.map_err(|_| RequestError::HubStopped)??;
        Ok(())
    }
}
