// Window-manager bridge protocol: events the compositor pushes to the
// wm, and commands the wm sends back.
//
// Grounded on `wm.c`'s `wm_on_*` handlers (which show exactly what
// fields each event kind needs) and `comp.h`'s comp_wm_send_cmd helper
// family. Both sides are closed, tagged sum types rather than a single
// struct with an integer "kind" field left to the caller to interpret -
// the point of a sum type here is that decoding already rules out
// reading fields that don't apply to the kind you got.

use crate::error::ProtoError;
use crate::frame::Frame;
use crate::messages::MsgType;
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WmEventFlags: u32 {
        /// This MAP/COMMIT is a replay sent after the wm (re)connected,
        /// not a live event - the wm should not steal focus for it.
        const REPLAY = 0x1;
        /// This surface is the bar / other compositor-owned chrome.
        const BACKGROUND = 0x2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum WmEventKind {
    Map = 1,
    Unmap = 2,
    Commit = 3,
    Click = 4,
    Pointer = 5,
    Key = 6,
}

impl WmEventKind {
    fn from_u32(v: u32) -> Result<Self, ProtoError> {
        Ok(match v {
            1 => WmEventKind::Map,
            2 => WmEventKind::Unmap,
            3 => WmEventKind::Commit,
            4 => WmEventKind::Click,
            5 => WmEventKind::Pointer,
            6 => WmEventKind::Key,
            _ => return Err(ProtoError::Invalid("bad wm event kind")),
        })
    }
}

/// Geometry snapshot carried on Map/Commit events, letting the wm track
/// a view's on-screen rectangle without a separate round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WmEvent {
    Map {
        client_id: u32,
        surface_id: u32,
        geom: Geometry,
        flags: WmEventFlags,
    },
    Unmap {
        client_id: u32,
        surface_id: u32,
    },
    Commit {
        client_id: u32,
        surface_id: u32,
        geom: Geometry,
        flags: WmEventFlags,
    },
    Click {
        surface_id: u32,
        sx: i32,
        sy: i32,
        buttons: u32,
    },
    Pointer {
        surface_id: u32,
        sx: i32,
        sy: i32,
        buttons: u32,
    },
    Key {
        surface_id: u32,
        geom: Geometry,
        keycode: u32,
        key_state: u32,
    },
}

const WM_EVENT_LEN: usize = 52;

fn ru32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}
fn ri32(buf: &[u8], off: usize) -> i32 {
    ru32(buf, off) as i32
}

impl WmEvent {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; WM_EVENT_LEN];
        let (kind, client_id, surface_id, sx, sy, sw, sh, keycode, key_state, buttons, flags) =
            match *self {
                WmEvent::Map { client_id, surface_id, geom, flags } => (
                    WmEventKind::Map, client_id, surface_id, geom.x, geom.y, geom.w, geom.h, 0, 0, 0, flags,
                ),
                WmEvent::Unmap { client_id, surface_id } => (
                    WmEventKind::Unmap, client_id, surface_id, 0, 0, 0, 0, 0, 0, 0, WmEventFlags::empty(),
                ),
                WmEvent::Commit { client_id, surface_id, geom, flags } => (
                    WmEventKind::Commit, client_id, surface_id, geom.x, geom.y, geom.w, geom.h, 0, 0, 0, flags,
                ),
                WmEvent::Click { surface_id, sx, sy, buttons } => (
                    WmEventKind::Click, 0, surface_id, sx, sy, 0, 0, 0, 0, buttons, WmEventFlags::empty(),
                ),
                WmEvent::Pointer { surface_id, sx, sy, buttons } => (
                    WmEventKind::Pointer, 0, surface_id, sx, sy, 0, 0, 0, 0, buttons, WmEventFlags::empty(),
                ),
                WmEvent::Key { surface_id, geom, keycode, key_state } => (
                    WmEventKind::Key, 0, surface_id, geom.x, geom.y, geom.w, geom.h, keycode, key_state, 0,
                    WmEventFlags::empty(),
                ),
            };
        out[0..4].copy_from_slice(&(kind as u32).to_le_bytes());
        out[4..8].copy_from_slice(&client_id.to_le_bytes());
        out[8..12].copy_from_slice(&surface_id.to_le_bytes());
        out[12..16].copy_from_slice(&sx.to_le_bytes());
        out[16..20].copy_from_slice(&sy.to_le_bytes());
        out[20..24].copy_from_slice(&sw.to_le_bytes());
        out[24..28].copy_from_slice(&sh.to_le_bytes());
        out[28..32].copy_from_slice(&keycode.to_le_bytes());
        out[32..36].copy_from_slice(&key_state.to_le_bytes());
        out[36..40].copy_from_slice(&buttons.to_le_bytes());
        out[40..44].copy_from_slice(&flags.bits().to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < WM_EVENT_LEN {
            return Err(ProtoError::Invalid("wm_event payload too short"));
        }
        let kind = WmEventKind::from_u32(ru32(buf, 0))?;
        let client_id = ru32(buf, 4);
        let surface_id = ru32(buf, 8);
        let geom = Geometry {
            x: ri32(buf, 12),
            y: ri32(buf, 16),
            w: ru32(buf, 20),
            h: ru32(buf, 24),
        };
        let keycode = ru32(buf, 28);
        let key_state = ru32(buf, 32);
        let buttons = ru32(buf, 36);
        let flags = WmEventFlags::from_bits_truncate(ru32(buf, 40));

        Ok(match kind {
            WmEventKind::Map => WmEvent::Map { client_id, surface_id, geom, flags },
            WmEventKind::Unmap => WmEvent::Unmap { client_id, surface_id },
            WmEventKind::Commit => WmEvent::Commit { client_id, surface_id, geom, flags },
            WmEventKind::Click => WmEvent::Click { surface_id, sx: geom.x, sy: geom.y, buttons },
            WmEventKind::Pointer => WmEvent::Pointer { surface_id, sx: geom.x, sy: geom.y, buttons },
            WmEventKind::Key => WmEvent::Key { surface_id, geom, keycode, key_state },
        })
    }

    pub fn into_frame(self, seq: u32) -> Frame {
        Frame::new(MsgType::WmEvent as u16, seq, self.encode())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum WmCmdKind {
    Focus = 1,
    Raise = 2,
    Move = 3,
    Resize = 4,
    Close = 5,
    PreviewRect = 6,
    PreviewClear = 7,
    PointerGrab = 8,
    KeyboardGrab = 9,
    Exit = 10,
}

impl WmCmdKind {
    fn from_u32(v: u32) -> Result<Self, ProtoError> {
        Ok(match v {
            1 => WmCmdKind::Focus,
            2 => WmCmdKind::Raise,
            3 => WmCmdKind::Move,
            4 => WmCmdKind::Resize,
            5 => WmCmdKind::Close,
            6 => WmCmdKind::PreviewRect,
            7 => WmCmdKind::PreviewClear,
            8 => WmCmdKind::PointerGrab,
            9 => WmCmdKind::KeyboardGrab,
            10 => WmCmdKind::Exit,
            _ => return Err(ProtoError::Invalid("bad wm cmd kind")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WmCmd {
    Focus { surface_id: u32 },
    Raise { surface_id: u32 },
    Move { surface_id: u32, x: i32, y: i32 },
    Resize { surface_id: u32, w: u32, h: u32 },
    Close { surface_id: u32 },
    PreviewRect { surface_id: u32, w: u32, h: u32 },
    PreviewClear { surface_id: u32 },
    PointerGrab { client_id: u32, enable: bool },
    KeyboardGrab { client_id: u32, enable: bool },
    Exit,
}

const WM_CMD_LEN: usize = 28;

impl WmCmd {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; WM_CMD_LEN];
        let (kind, client_id, surface_id, x, y, w, h) = match *self {
            WmCmd::Focus { surface_id } => (WmCmdKind::Focus, 0, surface_id, 0, 0, 0, 0),
            WmCmd::Raise { surface_id } => (WmCmdKind::Raise, 0, surface_id, 0, 0, 0, 0),
            WmCmd::Move { surface_id, x, y } => (WmCmdKind::Move, 0, surface_id, x, y, 0, 0),
            WmCmd::Resize { surface_id, w, h } => (WmCmdKind::Resize, 0, surface_id, 0, 0, w, h),
            WmCmd::Close { surface_id } => (WmCmdKind::Close, 0, surface_id, 0, 0, 0, 0),
            WmCmd::PreviewRect { surface_id, w, h } => {
                (WmCmdKind::PreviewRect, 0, surface_id, 0, 0, w, h)
            }
            WmCmd::PreviewClear { surface_id } => {
                (WmCmdKind::PreviewClear, 0, surface_id, 0, 0, 0, 0)
            }
            WmCmd::PointerGrab { client_id, enable } => {
                (WmCmdKind::PointerGrab, client_id, 0, 0, 0, enable as u32, 0)
            }
            WmCmd::KeyboardGrab { client_id, enable } => {
                (WmCmdKind::KeyboardGrab, client_id, 0, 0, 0, enable as u32, 0)
            }
            WmCmd::Exit => (WmCmdKind::Exit, 0, 0, 0, 0, 0, 0),
        };
        out[0..4].copy_from_slice(&(kind as u32).to_le_bytes());
        out[4..8].copy_from_slice(&client_id.to_le_bytes());
        out[8..12].copy_from_slice(&surface_id.to_le_bytes());
        out[12..16].copy_from_slice(&x.to_le_bytes());
        out[16..20].copy_from_slice(&y.to_le_bytes());
        out[20..24].copy_from_slice(&w.to_le_bytes());
        out[24..28].copy_from_slice(&h.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < WM_CMD_LEN {
            return Err(ProtoError::Invalid("wm_cmd payload too short"));
        }
        let kind = WmCmdKind::from_u32(ru32(buf, 0))?;
        let client_id = ru32(buf, 4);
        let surface_id = ru32(buf, 8);
        let x = ri32(buf, 12);
        let y = ri32(buf, 16);
        let w = ru32(buf, 20);
        let h = ru32(buf, 24);

        Ok(match kind {
            WmCmdKind::Focus => WmCmd::Focus { surface_id },
            WmCmdKind::Raise => WmCmd::Raise { surface_id },
            WmCmdKind::Move => WmCmd::Move { surface_id, x, y },
            WmCmdKind::Resize => WmCmd::Resize { surface_id, w, h },
            WmCmdKind::Close => WmCmd::Close { surface_id },
            WmCmdKind::PreviewRect => WmCmd::PreviewRect { surface_id, w, h },
            WmCmdKind::PreviewClear => WmCmd::PreviewClear { surface_id },
            WmCmdKind::PointerGrab => WmCmd::PointerGrab { client_id, enable: w != 0 },
            WmCmdKind::KeyboardGrab => WmCmd::KeyboardGrab { client_id, enable: w != 0 },
            WmCmdKind::Exit => WmCmd::Exit,
        })
    }

    pub fn into_frame(self, seq: u32) -> Frame {
        Frame::new(MsgType::WmCmd as u16, seq, self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_event_round_trips() {
        let ev = WmEvent::Map {
            client_id: 3,
            surface_id: 9,
            geom: Geometry { x: 10, y: 20, w: 300, h: 200 },
            flags: WmEventFlags::REPLAY,
        };
        let bytes = ev.encode();
        let back = WmEvent::decode(&bytes).unwrap();
        assert_eq!(ev, back);
    }

    #[test]
    fn key_event_round_trips() {
        let ev = WmEvent::Key {
            surface_id: 1,
            geom: Geometry { x: 0, y: 0, w: 100, h: 100 },
            keycode: 0x1e,
            key_state: 1,
        };
        assert_eq!(ev, WmEvent::decode(&ev.encode()).unwrap());
    }

    #[test]
    fn resize_cmd_round_trips() {
        let cmd = WmCmd::Resize { surface_id: 4, w: 640, h: 480 };
        assert_eq!(cmd, WmCmd::decode(&cmd.encode()).unwrap());
    }

    #[test]
    fn preview_rect_round_trips() {
        let cmd = WmCmd::PreviewRect { surface_id: 11, w: 700, h: 800 };
        assert_eq!(cmd, WmCmd::decode(&cmd.encode()).unwrap());
    }

    #[test]
    fn preview_clear_round_trips() {
        let cmd = WmCmd::PreviewClear { surface_id: 11 };
        assert_eq!(cmd, WmCmd::decode(&cmd.encode()).unwrap());
    }

    #[test]
    fn pointer_grab_round_trips() {
        let cmd = WmCmd::PointerGrab { client_id: 7, enable: true };
        assert_eq!(cmd, WmCmd::decode(&cmd.encode()).unwrap());
    }
}
