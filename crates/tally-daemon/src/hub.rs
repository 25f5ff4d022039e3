//! Hub loop: the single owner of the hub engine

use anyhow::Result;
use std::time::Duration;
use tally_core::Millis;
use tally_hub::HubEngine;
use tally_radio::{FrameReceiver, Radio};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::state::HubRequest;

/// How often timers are serviced
const POLL_PERIOD: Duration = Duration::from_millis(20);

/// Run until the radio queue or every request sender goes away
pub async fn run<R: Radio>(
    mut engine: HubEngine<R>,
    mut frames: FrameReceiver,
    mut requests: mpsc::Receiver<HubRequest>,
    clock: Clock,
) -> Result<()> {
    let mut ticker = tokio::time::interval(POLL_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(address = %engine.address(), "Hub loop started");

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => engine.handle_frame(&frame, clock.now()),
                None => {
                    warn!("Radio receive queue closed, stopping hub loop");
                    return Ok(());
                }
            },
            request = requests.recv() => match request {
                Some(request) => serve(&mut engine, request, clock.now()),
                None => {
                    debug!("Request channel closed, stopping hub loop");
                    return Ok(());
                }
            },
            _ = ticker.tick() => engine.poll(clock.now()),
        }
    }
}

fn serve<R: Radio>(engine: &mut HubEngine<R>, request: HubRequest, now: Millis) {
    match request {
        HubRequest::Publish {
            program,
            preview,
            reply,
        } => {
            engine.publish(program, preview, now);
            let _ = reply.send(());
        }
        HubRequest::Send { command, reply } => {
            let result = engine.send(&command, now);
            if let Err(e) = &result {
                debug!(opcode = %command.opcode(), error = %e, "Command rejected");
            }
            let _ = reply.send(result);
        }
    }
}
