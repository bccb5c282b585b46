//! Wire protocol: framing, packet codecs, telemetry encoding.
//!
//! All layouts are little-endian and fixed-size, decoded field by field so
//! nothing depends on in-memory struct layout. Malformed or out-of-order
//! bytes are silently discarded; the framer just goes back to hunting for
//! the sync prefix.

use crate::pid::PidGains;

/// Three-byte synchronization prefix on every inbound frame.
pub const SYNC: [u8; 3] = [0xAA, 0xBB, 0xCC];
/// Type discriminator for a command frame.
pub const COMMAND_TYPE: u8 = 0xEE;
/// Type discriminator for a gains-configuration frame.
pub const GAINS_TYPE: u8 = 0xFF;
/// Trailing marker on every outbound telemetry frame.
pub const TELEMETRY_MARKER: [u8; 4] = [0xAA, 0xBB, 0xCC, 0xDD];

/// Total frame sizes including sync and type bytes.
pub const COMMAND_LEN: usize = 16;
pub const GAINS_LEN: usize = 20;
pub const TELEMETRY_LEN: usize = 36;

const HEADER_LEN: usize = SYNC.len() + 1;
const MAX_PAYLOAD: usize = GAINS_LEN - HEADER_LEN;

/// Which loop the controller is closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlMode {
    #[default]
    Velocity,
    Position,
}

impl ControlMode {
    pub fn from_wire(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Velocity),
            1 => Some(Self::Position),
            _ => None,
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            Self::Velocity => 0,
            Self::Position => 1,
        }
    }
}

/// Loop selector carried by a gains frame. Same wire values as the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSelect {
    Velocity,
    Position,
}

impl LoopSelect {
    pub fn from_wire(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Velocity),
            1 => Some(Self::Position),
            _ => None,
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            Self::Velocity => 0,
            Self::Position => 1,
        }
    }
}

/// Decoded command frame: mode plus both targets. Only the target matching
/// the mode takes effect on dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    pub target_velocity: f32,
    pub target_position: f32,
    pub mode: ControlMode,
}

/// Decoded gains frame: wholesale replacement for one loop's gains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainsUpdate {
    pub gains: PidGains,
    pub target_loop: LoopSelect,
}

/// A completed inbound frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    Command(Command),
    Gains(GainsUpdate),
}

#[inline]
fn f32_at(payload: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ])
}

#[inline]
fn i32_at(payload: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ])
}

/// Decode the 12 payload bytes that follow `SYNC + COMMAND_TYPE`.
/// Returns None when the mode word is not a known value.
pub fn decode_command(payload: &[u8]) -> Option<Command> {
    debug_assert_eq!(payload.len(), COMMAND_LEN - HEADER_LEN);
    let mode = ControlMode::from_wire(i32_at(payload, 8))?;
    Some(Command {
        target_velocity: f32_at(payload, 0),
        target_position: f32_at(payload, 4),
        mode,
    })
}

/// Decode the 16 payload bytes that follow `SYNC + GAINS_TYPE`.
/// Returns None when the loop selector is not a known value.
pub fn decode_gains(payload: &[u8]) -> Option<GainsUpdate> {
    debug_assert_eq!(payload.len(), GAINS_LEN - HEADER_LEN);
    let target_loop = LoopSelect::from_wire(i32_at(payload, 12))?;
    Some(GainsUpdate {
        gains: PidGains::new(f32_at(payload, 0), f32_at(payload, 4), f32_at(payload, 8)),
        target_loop,
    })
}

/// Encode a full 16-byte command frame (host-side helper and test fixture).
pub fn encode_command(cmd: &Command) -> [u8; COMMAND_LEN] {
    let mut out = [0u8; COMMAND_LEN];
    out[..3].copy_from_slice(&SYNC);
    out[3] = COMMAND_TYPE;
    out[4..8].copy_from_slice(&cmd.target_velocity.to_le_bytes());
    out[8..12].copy_from_slice(&cmd.target_position.to_le_bytes());
    out[12..16].copy_from_slice(&cmd.mode.to_wire().to_le_bytes());
    out
}

/// Encode a full 20-byte gains frame (host-side helper and test fixture).
pub fn encode_gains(update: &GainsUpdate) -> [u8; GAINS_LEN] {
    let mut out = [0u8; GAINS_LEN];
    out[..3].copy_from_slice(&SYNC);
    out[3] = GAINS_TYPE;
    out[4..8].copy_from_slice(&update.gains.kp.to_le_bytes());
    out[8..12].copy_from_slice(&update.gains.ki.to_le_bytes());
    out[12..16].copy_from_slice(&update.gains.kd.to_le_bytes());
    out[16..20].copy_from_slice(&update.target_loop.to_wire().to_le_bytes());
    out
}

/// Telemetry snapshot emitted every Nth control tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Telemetry {
    pub velocity: f32,
    pub position: f32,
    pub target_velocity: f32,
    pub target_position: f32,
    pub output: f32,
    pub p: f32,
    pub i: f32,
    pub d: f32,
}

impl Telemetry {
    /// Fixed 36-byte layout: eight little-endian f32 fields followed by the
    /// four-byte marker for downstream validation.
    pub fn encode(&self) -> [u8; TELEMETRY_LEN] {
        let mut out = [0u8; TELEMETRY_LEN];
        let fields = [
            self.velocity,
            self.position,
            self.target_velocity,
            self.target_position,
            self.output,
            self.p,
            self.i,
            self.d,
        ];
        for (idx, f) in fields.iter().enumerate() {
            out[idx * 4..idx * 4 + 4].copy_from_slice(&f.to_le_bytes());
        }
        out[32..].copy_from_slice(&TELEMETRY_MARKER);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Command,
    Gains,
}

impl FrameKind {
    fn payload_len(self) -> usize {
        match self {
            Self::Command => COMMAND_LEN - HEADER_LEN,
            Self::Gains => GAINS_LEN - HEADER_LEN,
        }
    }
}

#[derive(Debug)]
enum State {
    /// Hunting for the sync prefix; `matched` bytes seen so far.
    SeekSync { matched: usize },
    /// Sync complete; the next byte selects the frame type.
    SelectType,
    /// Collecting the fixed payload for the selected type.
    Accumulate {
        kind: FrameKind,
        buf: [u8; MAX_PAYLOAD],
        len: usize,
    },
}

/// Resynchronizing byte-stream scanner.
///
/// A byte that mismatches at any sync position is consumed and matching
/// restarts at position 0 — there is no backtracking, so a sync sequence
/// that begins on the mismatched byte itself is missed, and sync bytes
/// recurring inside payload data can delay correct framing until the next
/// true sync. Accepted limitations of the scheme.
#[derive(Debug)]
pub struct Framer {
    state: State,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub fn new() -> Self {
        Self {
            state: State::SeekSync { matched: 0 },
        }
    }

    /// Consume one byte; returns a frame when it completes one.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        match &mut self.state {
            State::SeekSync { matched } => {
                if byte == SYNC[*matched] {
                    *matched += 1;
                    if *matched == SYNC.len() {
                        self.state = State::SelectType;
                    }
                } else {
                    *matched = 0;
                }
                None
            }
            State::SelectType => {
                let kind = match byte {
                    COMMAND_TYPE => Some(FrameKind::Command),
                    GAINS_TYPE => Some(FrameKind::Gains),
                    _ => None,
                };
                self.state = match kind {
                    Some(kind) => State::Accumulate {
                        kind,
                        buf: [0u8; MAX_PAYLOAD],
                        len: 0,
                    },
                    None => State::SeekSync { matched: 0 },
                };
                None
            }
            State::Accumulate { kind, buf, len } => {
                buf[*len] = byte;
                *len += 1;
                if *len < kind.payload_len() {
                    return None;
                }
                let frame = match kind {
                    FrameKind::Command => {
                        decode_command(&buf[..*len]).map(Frame::Command)
                    }
                    FrameKind::Gains => decode_gains(&buf[..*len]).map(Frame::Gains),
                };
                self.state = State::SeekSync { matched: 0 };
                frame
            }
        }
    }
}
