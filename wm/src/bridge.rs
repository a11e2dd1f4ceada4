// The wm side of the `compositor_wm` connection: reconnect-with-
// backoff, decode incoming `WmEvent`s, encode outgoing `WmCmd`s.
// Mirrors `compositor::wm_bridge::WmBridge`'s shape from the other
// end, and `wm.c`'s `main()` reconnect loop (`comp_connect(&c,
// "compositor_wm")` retried on a fixed interval after a disconnect).

use wire::{Frame, MsgType, WmCmd, WmEvent};

use crate::ipc::Conn;

/// Frames to wait between reconnect attempts once disconnected.
const RECONNECT_WAIT_TICKS: u32 = 60;

pub struct Bridge {
    conn: Conn,
    endpoint: String,
    retry_wait: u32,
    next_seq: u32,
}

impl Bridge {
    pub fn new(endpoint: String) -> Self {
        Bridge { conn: Conn::new(), endpoint, retry_wait: 0, next_seq: 0 }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Per-tick reconnect bookkeeping. Returns `true` exactly when a
    /// fresh connection was just established.
    pub fn tick(&mut self) -> bool {
        if self.conn.is_connected() {
            return false;
        }
        if self.retry_wait > 0 {
            self.retry_wait -= 1;
            return false;
        }
        if self.conn.connect(&self.endpoint) {
            self.next_seq = 0;
            true
        } else {
            self.retry_wait = RECONNECT_WAIT_TICKS;
            false
        }
    }

    /// Drains and decodes available `WmEvent` frames. The second
    /// return value is `true` exactly when the connection just dropped
    /// this call, so the caller can reset any drag/focus state tied to
    /// a live bridge.
    pub fn pump(&mut self) -> (Vec<WmEvent>, bool) {
        let mut events = Vec::new();
        let mut disconnected = false;
        for frame in self.conn.pump() {
            if frame.header.msg_type == MsgType::WmEvent as u16 {
                if let Ok(ev) = WmEvent::decode(&frame.payload) {
                    events.push(ev);
                }
            }
        }
        if self.conn.is_done() {
            disconnected = true;
        }
        if disconnected {
            self.conn.disconnect();
            self.retry_wait = RECONNECT_WAIT_TICKS;
        }
        (events, disconnected)
    }

    pub fn send_cmd(&mut self, cmd: WmCmd) -> bool {
        let seq = self.alloc_seq();
        self.send_frame(cmd.into_frame(seq))
    }

    fn send_frame(&mut self, frame: Frame) -> bool {
        if self.conn.send_frame(frame).is_ok() {
            true
        } else {
            self.conn.disconnect();
            self.retry_wait = RECONNECT_WAIT_TICKS;
            false
        }
    }

    fn alloc_seq(&mut self) -> u32 {
        let s = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        s
    }
}
