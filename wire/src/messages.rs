// Client <-> compositor message payloads.
//
// Grounded on `comp.h`'s comp_send_* helpers and compositor_client_pump.c's
// dispatch switch: every payload here is a fixed-size, explicitly laid
// out little-endian struct, encoded/decoded by hand rather than through
// serde - this protocol only ever talks to itself, and a hand-rolled
// codec keeps the wire format pinned exactly to this file instead of
// to whatever a derive macro happens to produce.

use crate::error::ProtoError;
use crate::frame::Frame;
use bitflags::bitflags;

/// The well-known surface id of the wm's status bar. The compositor
/// treats it as an ordinary client surface; only its id is special.
pub const UI_BAR_SURFACE_ID: u32 = 0x8000_0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MsgType {
    Hello = 1,
    AttachShmName = 2,
    Commit = 3,
    DestroySurface = 4,
    Ack = 5,
    Error = 6,
    InputRingName = 7,
    InputRingAck = 8,
    Input = 9,
    WmEvent = 10,
    WmCmd = 11,
}

impl MsgType {
    pub fn from_u16(v: u16) -> Option<MsgType> {
        use MsgType::*;
        Some(match v {
            1 => Hello,
            2 => AttachShmName,
            3 => Commit,
            4 => DestroySurface,
            5 => Ack,
            6 => Error,
            7 => InputRingName,
            8 => InputRingAck,
            9 => Input,
            10 => WmEvent,
            11 => WmCmd,
            _ => return None,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommitFlags: u32 {
        /// Ask the compositor to reply with an ACK once this commit
        /// has been composited at least once.
        const ACK = 0x1;
        /// Raise this surface's z-order even if it isn't this client's
        /// first commit and there is no wm connected to arbitrate.
        const RAISE = 0x2;
    }
}

/// A fixed-length name for a POSIX shared memory object
/// (`shm_open`-style name, NUL padded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShmName(pub [u8; 32]);

impl ShmName {
    pub fn from_str(s: &str) -> Result<Self, ProtoError> {
        let bytes = s.as_bytes();
        if bytes.len() >= 32 {
            return Err(ProtoError::Invalid("shm name too long"));
        }
        let mut buf = [0u8; 32];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(ShmName(buf))
    }

    pub fn as_str(&self) -> Result<&str, ProtoError> {
        let nul = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        std::str::from_utf8(&self.0[..nul]).map_err(|_| ProtoError::Invalid("shm name not utf8"))
    }
}

fn read_u32(buf: &[u8], off: usize) -> Result<u32, ProtoError> {
    buf.get(off..off + 4)
        .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
        .ok_or(ProtoError::Invalid("payload too short"))
}

fn read_i32(buf: &[u8], off: usize) -> Result<i32, ProtoError> {
    read_u32(buf, off).map(|v| v as i32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hello {
    pub pid: u32,
}

impl Hello {
    pub const LEN: usize = 4;

    pub fn encode(&self) -> Vec<u8> {
        self.pid.to_le_bytes().to_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        Ok(Hello {
            pid: read_u32(buf, 0)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachShmName {
    pub surface_id: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: u32,
    pub size_bytes: u32,
    pub name: ShmName,
}

impl AttachShmName {
    pub const LEN: usize = 24 + 32;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.surface_id.to_le_bytes());
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.stride.to_le_bytes());
        out.extend_from_slice(&self.format.to_le_bytes());
        out.extend_from_slice(&self.size_bytes.to_le_bytes());
        out.extend_from_slice(&self.name.0);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < Self::LEN {
            return Err(ProtoError::Invalid("attach_shm_name payload too short"));
        }
        let mut name = [0u8; 32];
        name.copy_from_slice(&buf[24..56]);
        Ok(AttachShmName {
            surface_id: read_u32(buf, 0)?,
            width: read_u32(buf, 4)?,
            height: read_u32(buf, 8)?,
            stride: read_u32(buf, 12)?,
            format: read_u32(buf, 16)?,
            size_bytes: read_u32(buf, 20)?,
            name: ShmName(name),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commit {
    pub surface_id: u32,
    pub x: i32,
    pub y: i32,
    pub flags: CommitFlags,
}

impl Commit {
    pub const LEN: usize = 16;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.surface_id.to_le_bytes());
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
        out.extend_from_slice(&self.flags.bits().to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < Self::LEN {
            return Err(ProtoError::Invalid("commit payload too short"));
        }
        Ok(Commit {
            surface_id: read_u32(buf, 0)?,
            x: read_i32(buf, 4)?,
            y: read_i32(buf, 8)?,
            flags: CommitFlags::from_bits_truncate(read_u32(buf, 12)?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroySurface {
    pub surface_id: u32,
}

impl DestroySurface {
    pub const LEN: usize = 4;

    pub fn encode(&self) -> Vec<u8> {
        self.surface_id.to_le_bytes().to_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        Ok(DestroySurface {
            surface_id: read_u32(buf, 0)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub req_type: u16,
    pub surface_id: u32,
}

impl Ack {
    pub const LEN: usize = 8;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.req_type.to_le_bytes());
        out.extend_from_slice(&[0u8; 2]);
        out.extend_from_slice(&self.surface_id.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < Self::LEN {
            return Err(ProtoError::Invalid("ack payload too short"));
        }
        Ok(Ack {
            req_type: u16::from_le_bytes(buf[0..2].try_into().unwrap()),
            surface_id: read_u32(buf, 4)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorReply {
    pub req_type: u16,
    pub code: u16,
    pub surface_id: u32,
}

impl ErrorReply {
    pub const LEN: usize = 8;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.req_type.to_le_bytes());
        out.extend_from_slice(&self.code.to_le_bytes());
        out.extend_from_slice(&self.surface_id.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < Self::LEN {
            return Err(ProtoError::Invalid("error payload too short"));
        }
        Ok(ErrorReply {
            req_type: u16::from_le_bytes(buf[0..2].try_into().unwrap()),
            code: u16::from_le_bytes(buf[2..4].try_into().unwrap()),
            surface_id: read_u32(buf, 4)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRingName {
    pub size_bytes: u32,
    pub cap: u32,
    pub name: ShmName,
}

impl InputRingName {
    pub const LEN: usize = 8 + 32;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.size_bytes.to_le_bytes());
        out.extend_from_slice(&self.cap.to_le_bytes());
        out.extend_from_slice(&self.name.0);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < Self::LEN {
            return Err(ProtoError::Invalid("input_ring_name payload too short"));
        }
        let mut name = [0u8; 32];
        name.copy_from_slice(&buf[8..40]);
        Ok(InputRingName {
            size_bytes: read_u32(buf, 0)?,
            cap: read_u32(buf, 4)?,
            name: ShmName(name),
        })
    }
}

/// The kind tag carried inside an `Input` (fallback, non-ring) message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum InputKind {
    Pointer = 1,
    Key = 2,
}

impl InputKind {
    fn from_u32(v: u32) -> Result<Self, ProtoError> {
        match v {
            1 => Ok(InputKind::Pointer),
            2 => Ok(InputKind::Key),
            _ => Err(ProtoError::Invalid("bad input kind")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Input {
    pub kind: InputKind,
    pub surface_id: u32,
    pub sx: i32,
    pub sy: i32,
    pub keycode: u32,
    pub key_state: u32,
    pub buttons: u32,
}

impl Input {
    pub const LEN: usize = 28;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&(self.kind as u32).to_le_bytes());
        out.extend_from_slice(&self.surface_id.to_le_bytes());
        out.extend_from_slice(&self.sx.to_le_bytes());
        out.extend_from_slice(&self.sy.to_le_bytes());
        out.extend_from_slice(&self.keycode.to_le_bytes());
        out.extend_from_slice(&self.key_state.to_le_bytes());
        out.extend_from_slice(&self.buttons.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < Self::LEN {
            return Err(ProtoError::Invalid("input payload too short"));
        }
        Ok(Input {
            kind: InputKind::from_u32(read_u32(buf, 0)?)?,
            surface_id: read_u32(buf, 4)?,
            sx: read_i32(buf, 8)?,
            sy: read_i32(buf, 12)?,
            keycode: read_u32(buf, 16)?,
            key_state: read_u32(buf, 20)?,
            buttons: read_u32(buf, 24)?,
        })
    }
}

/// A decoded client<->compositor message, tagged by its frame's
/// `msg_type`. `InputRingAck` carries no payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello(Hello),
    AttachShmName(AttachShmName),
    Commit(Commit),
    DestroySurface(DestroySurface),
    Ack(Ack),
    Error(ErrorReply),
    InputRingName(InputRingName),
    InputRingAck,
    Input(Input),
}

impl Message {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Message::Hello(_) => MsgType::Hello,
            Message::AttachShmName(_) => MsgType::AttachShmName,
            Message::Commit(_) => MsgType::Commit,
            Message::DestroySurface(_) => MsgType::DestroySurface,
            Message::Ack(_) => MsgType::Ack,
            Message::Error(_) => MsgType::Error,
            Message::InputRingName(_) => MsgType::InputRingName,
            Message::InputRingAck => MsgType::InputRingAck,
            Message::Input(_) => MsgType::Input,
        }
    }

    pub fn into_frame(self, seq: u32) -> Frame {
        let payload = match &self {
            Message::Hello(m) => m.encode(),
            Message::AttachShmName(m) => m.encode(),
            Message::Commit(m) => m.encode(),
            Message::DestroySurface(m) => m.encode(),
            Message::Ack(m) => m.encode(),
            Message::Error(m) => m.encode(),
            Message::InputRingName(m) => m.encode(),
            Message::InputRingAck => Vec::new(),
            Message::Input(m) => m.encode(),
        };
        Frame::new(self.msg_type() as u16, seq, payload)
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, ProtoError> {
        let msg_type = MsgType::from_u16(frame.header.msg_type)
            .ok_or(ProtoError::Invalid("unknown message type"))?;
        Ok(match msg_type {
            MsgType::Hello => Message::Hello(Hello::decode(&frame.payload)?),
            MsgType::AttachShmName => Message::AttachShmName(AttachShmName::decode(&frame.payload)?),
            MsgType::Commit => Message::Commit(Commit::decode(&frame.payload)?),
            MsgType::DestroySurface => Message::DestroySurface(DestroySurface::decode(&frame.payload)?),
            MsgType::Ack => Message::Ack(Ack::decode(&frame.payload)?),
            MsgType::Error => Message::Error(ErrorReply::decode(&frame.payload)?),
            MsgType::InputRingName => Message::InputRingName(InputRingName::decode(&frame.payload)?),
            MsgType::InputRingAck => Message::InputRingAck,
            MsgType::Input => Message::Input(Input::decode(&frame.payload)?),
            MsgType::WmEvent | MsgType::WmCmd => {
                return Err(ProtoError::Invalid("wm message on client connection"))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_round_trips_through_a_frame() {
        let msg = Message::Commit(Commit {
            surface_id: 5,
            x: -10,
            y: 20,
            flags: CommitFlags::ACK | CommitFlags::RAISE,
        });
        let frame = msg.clone().into_frame(1);
        let decoded = Message::from_frame(&frame).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn shm_name_round_trips() {
        let name = ShmName::from_str("cir_1234_0").unwrap();
        assert_eq!(name.as_str().unwrap(), "cir_1234_0");
    }

    #[test]
    fn shm_name_rejects_too_long() {
        let long = "x".repeat(32);
        assert!(ShmName::from_str(&long).is_err());
    }
}
