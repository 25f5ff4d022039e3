//! Node loop: a simulated receiver that logs its indicator outputs

use anyhow::Result;
use std::time::Duration;
use tally_core::Millis;
use tally_node::{NodeEngine, NodeEvent, NodeOutputs, Storage};
use tally_radio::{FrameReceiver, Radio};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::Clock;

const POLL_PERIOD: Duration = Duration::from_millis(10);

/// How long a simulated button press is held
const PRESS_HOLD_MS: Millis = 100;

/// Run until the radio queue closes. Each message on `presses` is one push
/// of the id-cycle button.
pub async fn run<R: Radio, S: Storage>(
    mut engine: NodeEngine<R, S>,
    mut frames: FrameReceiver,
    mut presses: mpsc::Receiver<()>,
    clock: Clock,
) -> Result<()> {
    let mut ticker = tokio::time::interval(POLL_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last: Option<NodeOutputs> = None;
    let mut release_at: Option<Millis> = None;
    let mut presses_open = true;

    engine.boot(clock.now());
    info!(
        address = %engine.address(),
        id = %engine.state().assigned_id,
        name = %engine.state().display_name,
        "Node loop started"
    );

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Some(event) = engine.handle_frame(&frame, clock.now()) {
                        report(&event);
                    }
                }
                None => {
                    warn!("Radio receive queue closed, stopping node loop");
                    return Ok(());
                }
            },
            press = presses.recv(), if presses_open => match press {
                Some(()) => {
                    let now = clock.now();
                    if let Some(event) = engine.sample_button(true, now) {
                        report(&event);
                    }
                    release_at = Some(now + PRESS_HOLD_MS);
                }
                None => presses_open = false,
            },
            _ = ticker.tick() => {
                let now = clock.now();
                if release_at.is_some_and(|at| now >= at) {
                    engine.sample_button(false, now);
                    release_at = None;
                }
                let outputs = engine.tick(now);
                if last != Some(outputs) {
                    info!(
                        color = %format!("#{:06x}", outputs.color.to_u32()),
                        identify = outputs.identify_on,
                        status = outputs.status_level,
                        rule = rule_name(&engine),
                        "Indicators changed"
                    );
                    last = Some(outputs);
                }
            }
        }
    }
}

fn rule_name<R: Radio, S: Storage>(engine: &NodeEngine<R, S>) -> &'static str {
    tally_node::led::winning_rule(engine.state())
}

fn report(event: &NodeEvent) {
    match event {
        NodeEvent::Signal(code) => info!(code = *code, "Signal received"),
        other => debug!(event = ?other, "Node event"),
    }
}

/// Turn each line typed on stdin into a button press
pub fn spawn_stdin_button(presses: mpsc::Sender<()>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            if presses.send(()).await.is_err() {
                break;
            }
        }
    });
}
