//! Binary command codec for the radio link
//!
//! Every frame starts with a one-byte opcode followed by a fixed-layout
//! payload. Group-targeted commands end in a 64-bit little-endian camera
//! mask; unicast commands end in a 6-byte hardware address. Decoding checks
//! the opcode's minimum payload length up front and bounds-checks every field
//! read, so a short or garbled frame is rejected without touching state.

use std::fmt;
use thiserror::Error;

use crate::address::{HardwareAddress, ADDRESS_LEN};
use crate::camera::TallyMask;
use crate::color::Rgb;
use crate::name::{truncate_utf8, WIRE_NAME_MAX};
use crate::target::Target;

const MASK_LEN: usize = 8;
const RGB_LEN: usize = 3;
/// Reserved bytes between the brightness levels and RSSI in a heartbeat
const HEARTBEAT_RESERVED: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("empty frame")]
    Empty,
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("{opcode} payload truncated: need {needed} bytes, got {got}")]
    Truncated {
        opcode: Opcode,
        needed: usize,
        got: usize,
    },
}

/// Command opcodes (first byte of every frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    SetTally = 1,
    GetTally = 2,
    SwitchCamId = 3,
    Heartbeat = 4,
    SetCamId = 5,
    SetColor = 6,
    SetBrightness = 7,
    SetSignal = 8,
    SetName = 9,
    SetIdentify = 10,
    SetBlink = 11,
    SetCamIdMac = 12,
    SetNameMac = 13,
    SetBrightnessMac = 14,
    SetStatusBrightness = 15,
}

impl Opcode {
    /// Smallest payload (bytes after the opcode) that can hold every fixed field
    pub fn min_payload_len(self) -> usize {
        match self {
            Opcode::SetTally => 2 * MASK_LEN,
            Opcode::GetTally => 0,
            Opcode::SwitchCamId => 2,
            // id, rgb, status, reserved, rssi, name_len
            Opcode::Heartbeat => 3 + HEARTBEAT_RESERVED + 2,
            Opcode::SetCamId | Opcode::SetBrightness | Opcode::SetSignal => 1 + MASK_LEN,
            Opcode::SetColor => RGB_LEN + MASK_LEN,
            Opcode::SetName => 1 + MASK_LEN,
            Opcode::SetIdentify => 1 + ADDRESS_LEN,
            Opcode::SetBlink => 1 + RGB_LEN + MASK_LEN,
            Opcode::SetCamIdMac
            | Opcode::SetNameMac
            | Opcode::SetBrightnessMac
            | Opcode::SetStatusBrightness => 1 + ADDRESS_LEN,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = WireError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Ok(match byte {
            1 => Opcode::SetTally,
            2 => Opcode::GetTally,
            3 => Opcode::SwitchCamId,
            4 => Opcode::Heartbeat,
            5 => Opcode::SetCamId,
            6 => Opcode::SetColor,
            7 => Opcode::SetBrightness,
            8 => Opcode::SetSignal,
            9 => Opcode::SetName,
            10 => Opcode::SetIdentify,
            11 => Opcode::SetBlink,
            12 => Opcode::SetCamIdMac,
            13 => Opcode::SetNameMac,
            14 => Opcode::SetBrightnessMac,
            15 => Opcode::SetStatusBrightness,
            other => return Err(WireError::UnknownOpcode(other)),
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::SetTally => "SET_TALLY",
            Opcode::GetTally => "GET_TALLY",
            Opcode::SwitchCamId => "SWITCH_CAMID",
            Opcode::Heartbeat => "HEARTBEAT",
            Opcode::SetCamId => "SET_CAMID",
            Opcode::SetColor => "SET_COLOR",
            Opcode::SetBrightness => "SET_BRIGHTNESS",
            Opcode::SetSignal => "SET_SIGNAL",
            Opcode::SetName => "SET_NAME",
            Opcode::SetIdentify => "SET_IDENTIFY",
            Opcode::SetBlink => "SET_BLINK",
            Opcode::SetCamIdMac => "SET_CAMID_MAC",
            Opcode::SetNameMac => "SET_NAME_MAC",
            Opcode::SetBrightnessMac => "SET_BRIGHTNESS_MAC",
            Opcode::SetStatusBrightness => "SET_STATUS_BRIGHTNESS",
        };
        f.write_str(name)
    }
}

/// Periodic node status report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    /// Raw camera id as reported by the node
    pub id: u8,
    pub rgb_brightness: u8,
    pub status_brightness: u8,
    /// Received signal strength at the node, dBm
    pub rssi: i8,
    /// Empty when the node sent no name
    pub name: String,
}

/// A decoded command frame.
///
/// Camera ids are kept raw (`u8`) so that decoding is lossless; receivers
/// validate them before acting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetTally { program: TallyMask, preview: TallyMask },
    GetTally,
    SwitchCamId { from: u8, to: u8 },
    Heartbeat(Heartbeat),
    SetCamId { id: u8, mask: TallyMask },
    SetColor { color: Rgb, mask: TallyMask },
    SetBrightness { level: u8, mask: TallyMask },
    SetSignal { signal: u8, mask: TallyMask },
    SetName { name: String, mask: TallyMask },
    /// `target` is always `Group` or `Unicast`
    SetIdentify { seconds: u8, target: Target },
    SetBlink { enabled: bool, color: Rgb, mask: TallyMask },
    SetCamIdMac { id: u8, address: HardwareAddress },
    SetNameMac { name: String, address: HardwareAddress },
    SetBrightnessMac { level: u8, address: HardwareAddress },
    SetStatusBrightness { level: u8, address: HardwareAddress },
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::SetTally { .. } => Opcode::SetTally,
            Command::GetTally => Opcode::GetTally,
            Command::SwitchCamId { .. } => Opcode::SwitchCamId,
            Command::Heartbeat(_) => Opcode::Heartbeat,
            Command::SetCamId { .. } => Opcode::SetCamId,
            Command::SetColor { .. } => Opcode::SetColor,
            Command::SetBrightness { .. } => Opcode::SetBrightness,
            Command::SetSignal { .. } => Opcode::SetSignal,
            Command::SetName { .. } => Opcode::SetName,
            Command::SetIdentify { .. } => Opcode::SetIdentify,
            Command::SetBlink { .. } => Opcode::SetBlink,
            Command::SetCamIdMac { .. } => Opcode::SetCamIdMac,
            Command::SetNameMac { .. } => Opcode::SetNameMac,
            Command::SetBrightnessMac { .. } => Opcode::SetBrightnessMac,
            Command::SetStatusBrightness { .. } => Opcode::SetStatusBrightness,
        }
    }

    /// Which nodes this command applies to
    pub fn target(&self) -> Target {
        match self {
            Command::SetTally { .. } | Command::GetTally | Command::Heartbeat(_) => {
                Target::Broadcast
            }
            Command::SwitchCamId { from, .. } => Target::Camera(*from),
            Command::SetCamId { mask, .. }
            | Command::SetColor { mask, .. }
            | Command::SetBrightness { mask, .. }
            | Command::SetSignal { mask, .. }
            | Command::SetName { mask, .. }
            | Command::SetBlink { mask, .. } => Target::Group(*mask),
            Command::SetIdentify { target, .. } => *target,
            Command::SetCamIdMac { address, .. }
            | Command::SetNameMac { address, .. }
            | Command::SetBrightnessMac { address, .. }
            | Command::SetStatusBrightness { address, .. } => Target::Unicast(*address),
        }
    }

    /// Serialize to a frame. Names longer than 16 bytes are truncated.
    ///
    /// A `SetIdentify` built with a `Broadcast` or `Camera` target is encoded
    /// as a group command for every camera.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new(self.opcode());
        match self {
            Command::SetTally { program, preview } => {
                w.mask(*program);
                w.mask(*preview);
            }
            Command::GetTally => {}
            Command::SwitchCamId { from, to } => {
                w.u8(*from);
                w.u8(*to);
            }
            Command::Heartbeat(hb) => {
                w.u8(hb.id);
                w.u8(hb.rgb_brightness);
                w.u8(hb.status_brightness);
                w.bytes(&[0u8; HEARTBEAT_RESERVED]);
                w.u8(hb.rssi as u8);
                w.name(&hb.name);
            }
            Command::SetCamId { id, mask } => {
                w.u8(*id);
                w.mask(*mask);
            }
            Command::SetColor { color, mask } => {
                w.rgb(*color);
                w.mask(*mask);
            }
            Command::SetBrightness { level, mask } => {
                w.u8(*level);
                w.mask(*mask);
            }
            Command::SetSignal { signal, mask } => {
                w.u8(*signal);
                w.mask(*mask);
            }
            Command::SetName { name, mask } => {
                w.name(name);
                w.mask(*mask);
            }
            Command::SetIdentify { seconds, target } => {
                w.u8(*seconds);
                match target {
                    Target::Unicast(address) => w.address(address),
                    Target::Group(mask) => w.mask(*mask),
                    Target::Broadcast | Target::Camera(_) => w.mask(TallyMask::ALL),
                }
            }
            Command::SetBlink {
                enabled,
                color,
                mask,
            } => {
                w.u8(u8::from(*enabled));
                w.rgb(*color);
                w.mask(*mask);
            }
            Command::SetCamIdMac { id, address } => {
                w.u8(*id);
                w.address(address);
            }
            Command::SetNameMac { name, address } => {
                w.name(name);
                w.address(address);
            }
            Command::SetBrightnessMac { level, address }
            | Command::SetStatusBrightness { level, address } => {
                w.u8(*level);
                w.address(address);
            }
        }
        w.finish()
    }

    /// Parse a frame. Trailing bytes beyond a command's layout are ignored,
    /// except for `SetIdentify`, whose form is chosen by payload length.
    pub fn decode(frame: &[u8]) -> Result<Command, WireError> {
        let (&first, payload) = frame.split_first().ok_or(WireError::Empty)?;
        let opcode = Opcode::try_from(first)?;
        let mut r = Reader::new(opcode, payload);
        r.require(opcode.min_payload_len())?;

        let command = match opcode {
            Opcode::SetTally => Command::SetTally {
                program: r.mask()?,
                preview: r.mask()?,
            },
            Opcode::GetTally => Command::GetTally,
            Opcode::SwitchCamId => Command::SwitchCamId {
                from: r.u8()?,
                to: r.u8()?,
            },
            Opcode::Heartbeat => {
                let id = r.u8()?;
                let rgb_brightness = r.u8()?;
                let status_brightness = r.u8()?;
                r.skip(HEARTBEAT_RESERVED)?;
                let rssi = r.u8()? as i8;
                // The declared name length is clamped to what actually arrived
                let declared = r.u8()? as usize;
                let len = declared.min(r.remaining()).min(WIRE_NAME_MAX);
                let name = r.string(len)?;
                Command::Heartbeat(Heartbeat {
                    id,
                    rgb_brightness,
                    status_brightness,
                    rssi,
                    name,
                })
            }
            Opcode::SetCamId => Command::SetCamId {
                id: r.u8()?,
                mask: r.mask()?,
            },
            Opcode::SetColor => Command::SetColor {
                color: r.rgb()?,
                mask: r.mask()?,
            },
            Opcode::SetBrightness => Command::SetBrightness {
                level: r.u8()?,
                mask: r.mask()?,
            },
            Opcode::SetSignal => Command::SetSignal {
                signal: r.u8()?,
                mask: r.mask()?,
            },
            Opcode::SetName => {
                let len = r.u8()? as usize;
                r.require(1 + len + MASK_LEN)?;
                Command::SetName {
                    name: r.string(len)?,
                    mask: r.mask()?,
                }
            }
            Opcode::SetIdentify => {
                let seconds = r.u8()?;
                // Payload length is the only thing telling the two forms apart:
                // seconds + mask is 9 bytes, seconds + address is 7.
                let target = if r.remaining() >= MASK_LEN {
                    Target::Group(r.mask()?)
                } else if r.remaining() == ADDRESS_LEN {
                    Target::Unicast(r.address()?)
                } else {
                    return Err(r.truncated(MASK_LEN));
                };
                Command::SetIdentify { seconds, target }
            }
            Opcode::SetBlink => Command::SetBlink {
                enabled: r.u8()? != 0,
                color: r.rgb()?,
                mask: r.mask()?,
            },
            Opcode::SetCamIdMac => Command::SetCamIdMac {
                id: r.u8()?,
                address: r.address()?,
            },
            Opcode::SetNameMac => {
                let len = r.u8()? as usize;
                r.require(1 + len + ADDRESS_LEN)?;
                Command::SetNameMac {
                    name: r.string(len)?,
                    address: r.address()?,
                }
            }
            Opcode::SetBrightnessMac => Command::SetBrightnessMac {
                level: r.u8()?,
                address: r.address()?,
            },
            Opcode::SetStatusBrightness => Command::SetStatusBrightness {
                level: r.u8()?,
                address: r.address()?,
            },
        };
        Ok(command)
    }
}

/// Frame builder
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new(opcode: Opcode) -> Self {
        let mut buf = Vec::with_capacity(1 + 2 * MASK_LEN + WIRE_NAME_MAX);
        buf.push(opcode as u8);
        Self { buf }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    fn mask(&mut self, mask: TallyMask) {
        self.bytes(&mask.bits().to_le_bytes());
    }

    fn rgb(&mut self, color: Rgb) {
        self.bytes(&color.to_bytes());
    }

    fn address(&mut self, address: &HardwareAddress) {
        self.bytes(address.octets());
    }

    /// Length-prefixed name, truncated to the wire limit
    fn name(&mut self, name: &str) {
        let name = truncate_utf8(name, WIRE_NAME_MAX);
        self.u8(name.len() as u8);
        self.bytes(name.as_bytes());
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked payload cursor
struct Reader<'a> {
    opcode: Opcode,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(opcode: Opcode, buf: &'a [u8]) -> Self {
        Self { opcode, buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Require the whole payload to be at least `needed` bytes long
    fn require(&self, needed: usize) -> Result<(), WireError> {
        if self.buf.len() < needed {
            return Err(WireError::Truncated {
                opcode: self.opcode,
                needed,
                got: self.buf.len(),
            });
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        self.require(self.pos + n)?;
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<(), WireError> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn mask(&mut self) -> Result<TallyMask, WireError> {
        let bytes: [u8; MASK_LEN] = self
            .take(MASK_LEN)?
            .try_into()
            .map_err(|_| self.truncated(MASK_LEN))?;
        Ok(TallyMask(u64::from_le_bytes(bytes)))
    }

    fn rgb(&mut self) -> Result<Rgb, WireError> {
        let b = self.take(RGB_LEN)?;
        Ok(Rgb::new(b[0], b[1], b[2]))
    }

    fn address(&mut self) -> Result<HardwareAddress, WireError> {
        let b = self.take(ADDRESS_LEN)?;
        HardwareAddress::from_slice(b).ok_or_else(|| self.truncated(ADDRESS_LEN))
    }

    /// Read `len` name bytes. Invalid UTF-8 is replaced, which can grow the
    /// text, so the result is cut back to the wire limit.
    fn string(&mut self, len: usize) -> Result<String, WireError> {
        let text = String::from_utf8_lossy(self.take(len)?);
        Ok(truncate_utf8(&text, WIRE_NAME_MAX).to_string())
    }

    fn truncated(&self, n: usize) -> WireError {
        WireError::Truncated {
            opcode: self.opcode,
            needed: self.pos + n,
            got: self.buf.len(),
        }
    }
}
