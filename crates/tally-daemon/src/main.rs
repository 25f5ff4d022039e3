//! Tally Daemon - Main entry point
//!
//! Runs one role of the tally mesh over UDP: the hub (with its REST and
//! WebSocket API) or a simulated node that logs its indicator outputs.

mod api;
mod clock;
mod config;
mod hub;
mod node;
mod server;
mod state;
mod ws;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tally_core::HardwareAddress;
use tally_hub::HubEngine;
use tally_node::{FileStorage, NodeEngine};
use tally_radio::{frame_queue, FrameReceiver, UdpRadio};
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::clock::Clock;
use crate::config::{Config, RadioConfig};

#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Wireless camera tally mesh: hub and node roles")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tally.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// UDP address the radio link listens on
    #[arg(short, long)]
    bind: Option<String>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Own the canonical tally, track nodes, serve the API
    Hub {
        /// Hardware address stamped on outgoing frames
        #[arg(long)]
        address: Option<HardwareAddress>,

        /// Bind address for the web server
        #[arg(long)]
        http: Option<String>,
    },
    /// Act as a tally light. Press Enter to cycle the camera id.
    Node {
        #[arg(long)]
        address: Option<HardwareAddress>,

        #[arg(long)]
        camera_id: Option<u8>,

        /// File for persisted name and brightness
        #[arg(long)]
        storage: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Tally v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;
    if let Some(bind) = args.bind {
        config.radio.bind = bind;
    }

    match args.role {
        Role::Hub { address, http } => {
            if let Some(address) = address {
                config.hub.address = address;
            }
            if let Some(http) = http {
                config.hub.http_bind = http;
            }
            run_hub(config).await
        }
        Role::Node {
            address,
            camera_id,
            storage,
        } => {
            if let Some(address) = address {
                config.node.address = address;
            }
            if let Some(camera_id) = camera_id {
                config.node.camera_id = camera_id;
            }
            if let Some(storage) = storage {
                config.node.storage_path = storage;
            }
            run_node(config).await
        }
    }
}

/// Bind the UDP radio and start its receive task
async fn open_radio(
    radio: &RadioConfig,
    address: HardwareAddress,
) -> Result<(UdpRadio, FrameReceiver)> {
    let udp = UdpRadio::bind(radio.bind_addr()?, radio.peer_addrs()?, address)
        .await
        .with_context(|| format!("failed to bind radio on {}", radio.bind))?;
    let (queue, frames) = frame_queue(radio.queue_depth);
    udp.spawn_receiver(queue);
    info!(
        bind = %radio.bind,
        peers = ?radio.peers,
        address = %address,
        "Radio link up"
    );
    Ok((udp, frames))
}

async fn run_hub(config: Config) -> Result<()> {
    let (radio, frames) = open_radio(&config.radio, config.hub.address).await?;
    let engine = HubEngine::new(radio, config.hub.engine_config());

    let (requests, request_rx) = mpsc::channel(32);
    let clock = Clock::new();
    let state = state::AppState::new(requests, engine.watch(), engine.event_sender(), clock);

    let hub_task = tokio::spawn(hub::run(engine, frames, request_rx, clock));

    tokio::select! {
        result = server::run(state, &config.hub.http_bind) => result,
        result = hub_task => result?,
    }
}

async fn run_node(config: Config) -> Result<()> {
    let node_config = config.node.engine_config()?;
    let (radio, frames) = open_radio(&config.radio, config.node.address).await?;
    let storage = FileStorage::new(&config.node.storage_path);
    let engine = NodeEngine::new(radio, storage, node_config);

    let (presses, press_rx) = mpsc::channel(4);
    node::spawn_stdin_button(presses);

    node::run(engine, frames, press_rx, Clock::new()).await
}
