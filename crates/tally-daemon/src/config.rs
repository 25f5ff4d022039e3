//! Configuration loading

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tally_core::{CameraId, HardwareAddress, Millis};
use tally_hub::HubConfig;
use tally_node::NodeConfig;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub hub: HubSection,
    #[serde(default)]
    pub node: NodeSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// UDP address to listen on
    #[serde(default = "default_radio_bind")]
    pub bind: String,
    /// Where every frame is sent (broadcast or per-station addresses)
    #[serde(default = "default_peers")]
    pub peers: Vec<String>,
    /// Frames buffered between the receive task and the engine loop
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            bind: default_radio_bind(),
            peers: default_peers(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl RadioConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("invalid radio bind address: {}", self.bind))
    }

    pub fn peer_addrs(&self) -> Result<Vec<SocketAddr>> {
        self.peers
            .iter()
            .map(|p| p.parse::<SocketAddr>().with_context(|| format!("invalid peer address: {}", p)))
            .collect()
    }
}

fn default_radio_bind() -> String {
    "0.0.0.0:4210".to_string()
}

fn default_peers() -> Vec<String> {
    vec!["255.255.255.255:4210".to_string()]
}

fn default_queue_depth() -> usize {
    64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSection {
    /// Hardware address the hub stamps on its frames
    #[serde(default = "default_hub_address")]
    pub address: HardwareAddress,
    #[serde(default = "default_publish_interval")]
    pub publish_interval_ms: Millis,
    /// A device counts as active if heard from within this window
    #[serde(default = "default_freshness")]
    pub freshness_ms: Millis,
    /// Bind address for the REST/WebSocket server
    #[serde(default = "default_http_bind")]
    pub http_bind: String,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            address: default_hub_address(),
            publish_interval_ms: default_publish_interval(),
            freshness_ms: default_freshness(),
            http_bind: default_http_bind(),
        }
    }
}

impl HubSection {
    pub fn engine_config(&self) -> HubConfig {
        HubConfig {
            publish_interval_ms: self.publish_interval_ms,
            freshness_ms: self.freshness_ms,
        }
    }
}

fn default_hub_address() -> HardwareAddress {
    HardwareAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01])
}

fn default_publish_interval() -> Millis {
    2000
}

fn default_freshness() -> Millis {
    5000
}

fn default_http_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    #[serde(default = "default_node_address")]
    pub address: HardwareAddress,
    /// Camera id at boot (1-64)
    #[serde(default = "default_camera_id")]
    pub camera_id: u8,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: Millis,
    #[serde(default = "default_link_timeout")]
    pub link_timeout_ms: Millis,
    /// File holding the persisted name and brightness levels
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            address: default_node_address(),
            camera_id: default_camera_id(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            link_timeout_ms: default_link_timeout(),
            storage_path: default_storage_path(),
        }
    }
}

impl NodeSection {
    pub fn engine_config(&self) -> Result<NodeConfig> {
        let camera_id = CameraId::new(self.camera_id)
            .with_context(|| format!("camera_id {} outside 1..=64", self.camera_id))?;
        Ok(NodeConfig {
            camera_id,
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            link_timeout_ms: self.link_timeout_ms,
        })
    }
}

fn default_node_address() -> HardwareAddress {
    HardwareAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x02])
}

fn default_camera_id() -> u8 {
    1
}

fn default_heartbeat_interval() -> Millis {
    2000
}

fn default_link_timeout() -> Millis {
    5000
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./node.bin")
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
