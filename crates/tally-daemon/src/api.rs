//! REST API handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tally_core::{
    CameraId, Command, DeviceRecord, HardwareAddress, Millis, Rgb, TallyMask, Target,
};
use tracing::info;

use crate::state::{AppState, RequestError};

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn request_failed(e: RequestError) -> axum::response::Response {
    let status = match e {
        RequestError::HubStopped => StatusCode::SERVICE_UNAVAILABLE,
        RequestError::Rejected(_) => StatusCode::BAD_REQUEST,
    };
    (status, Json(ApiError::new(e.to_string()))).into_response()
}

/// Canonical tally and registry counters
#[derive(Serialize)]
pub struct StateResponse {
    program: TallyMask,
    preview: TallyMask,
    total_count: usize,
    active_count: usize,
    youngest_heartbeat_age_ms: Option<Millis>,
}

pub async fn get_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot();
    Json(StateResponse {
        program: snapshot.program,
        preview: snapshot.preview,
        total_count: snapshot.total_count,
        active_count: snapshot.active_count,
        youngest_heartbeat_age_ms: snapshot.youngest_heartbeat_age_ms,
    })
}

/// A registry entry with the time since its last heartbeat
#[derive(Serialize)]
pub struct TallyEntry {
    #[serde(flatten)]
    record: DeviceRecord,
    age_ms: Millis,
}

/// List every node the hub has heard from
pub async fn list_tallies(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = state.now();
    let entries: Vec<TallyEntry> = state
        .snapshot()
        .devices
        .into_iter()
        .map(|record| TallyEntry {
            age_ms: record.age(now),
            record,
        })
        .collect();
    Json(entries)
}

#[derive(Deserialize)]
pub struct TallyRequest {
    #[serde(default)]
    program: TallyMask,
    #[serde(default)]
    preview: TallyMask,
}

/// Publish a new canonical tally, as a switcher client would
pub async fn publish_tally(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TallyRequest>,
) -> impl IntoResponse {
    match state.publish(req.program, req.preview).await {
        Ok(()) => Json(serde_json::json!({"status": "published"})).into_response(),
        Err(e) => request_failed(e),
    }
}

/// A configuration command aimed at a group of cameras or one node
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CommandRequest {
    SetCamId { id: u8, target: Target },
    SetName { name: String, target: Target },
    SetBrightness { level: u8, target: Target },
    SetStatusBrightness { level: u8, address: HardwareAddress },
    SetColor { color: Rgb, target: Target },
    Identify { seconds: u8, target: Target },
    Blink { enabled: bool, color: Rgb, target: Target },
    SwitchCamId { from: u8, to: u8 },
    Signal { signal: u8, target: Target },
}

/// The two addressing families the wire format can carry
enum Addressed {
    Group(TallyMask),
    Unicast(HardwareAddress),
}

fn addressed(target: Target) -> Result<Addressed, String> {
    match target {
        Target::Broadcast => Ok(Addressed::Group(TallyMask::ALL)),
        Target::Group(mask) => Ok(Addressed::Group(mask)),
        Target::Unicast(address) => Ok(Addressed::Unicast(address)),
        Target::Camera(raw) => CameraId::new(raw)
            .map(|id| Addressed::Group(TallyMask::from(id)))
            .ok_or_else(|| format!("camera id {} outside 1..=64", raw)),
    }
}

fn group_only(target: Target, op: &str) -> Result<TallyMask, String> {
    match addressed(target)? {
        Addressed::Group(mask) => Ok(mask),
        Addressed::Unicast(_) => Err(format!("{} cannot target a single address", op)),
    }
}

impl CommandRequest {
    pub fn into_command(self) -> Result<Command, String> {
        let command = match self {
            CommandRequest::SetCamId { id, target } => match addressed(target)? {
                Addressed::Group(mask) => Command::SetCamId { id, mask },
                Addressed::Unicast(address) => Command::SetCamIdMac { id, address },
            },
            CommandRequest::SetName { name, target } => match addressed(target)? {
                Addressed::Group(mask) => Command::SetName { name, mask },
                Addressed::Unicast(address) => Command::SetNameMac { name, address },
            },
            CommandRequest::SetBrightness { level, target } => match addressed(target)? {
                Addressed::Group(mask) => Command::SetBrightness { level, mask },
                Addressed::Unicast(address) => Command::SetBrightnessMac { level, address },
            },
            CommandRequest::SetStatusBrightness { level, address } => {
                Command::SetStatusBrightness { level, address }
            }
            CommandRequest::SetColor { color, target } => Command::SetColor {
                color,
                mask: group_only(target, "set_color")?,
            },
            CommandRequest::Identify { seconds, target } => {
                let target = match addressed(target)? {
                    Addressed::Group(mask) => Target::Group(mask),
                    Addressed::Unicast(address) => Target::Unicast(address),
                };
                Command::SetIdentify { seconds, target }
            }
            CommandRequest::Blink {
                enabled,
                color,
                target,
            } => Command::SetBlink {
                enabled,
                color,
                mask: group_only(target, "blink")?,
            },
            CommandRequest::SwitchCamId { from, to } => Command::SwitchCamId { from, to },
            CommandRequest::Signal { signal, target } => Command::SetSignal {
                signal,
                mask: group_only(target, "signal")?,
            },
        };
        Ok(command)
    }
}

/// Encode a command request and hand it to the hub loop for broadcast
pub async fn send_command(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommandRequest>,
) -> impl IntoResponse {
    let command = match req.into_command() {
        Ok(command) => command,
        Err(msg) => return (StatusCode::BAD_REQUEST, Json(ApiError::new(msg))).into_response(),
    };
    let opcode = command.opcode();
    match state.send(command).await {
        Ok(()) => {
            info!(opcode = %opcode, "Command sent");
            Json(serde_json::json!({"status": "sent", "opcode": opcode.to_string()})).into_response()
        }
        Err(e) => request_failed(e),
    }
}
