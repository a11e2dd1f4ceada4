// Lifecycle of the single WM connection: accept, spawn-with-cooldown,
// pump, send.
//
// Grounded on `compositor_main.c`'s wm accept/spawn/cooldown block (the
// 200-frame cooldown-after-spawn and retry-wait-after-failure
// constants) and `comp.h`'s `comp_wm_connect` (`compositor_wm`
// endpoint). `WM_CMD`/`WM_EVENT` bypass the client-only `Message` enum
// entirely and are framed directly, since `Message::from_frame`
// rejects both message types on a client connection.
//
// The reference tracks the spawned child's pid and reaps it with
// `waitpid(WNOHANG)` to detect an early death and reset the cooldown
// immediately. `ProcessSpawner` here doesn't hand back a process
// handle (§6 models process spawn as a narrow fire-and-forget trait
// for testability), so liveness is inferred from the IPC connection
// alone: a dead WM is only noticed once its socket EOFs. This is a
// deliberate simplification over the reference's pid-reaping; noted in
// DESIGN.md.

use anyhow::Result;

use wire::{Frame, MsgType, WmCmd, WmEvent};

use crate::devices::ProcessSpawner;
use crate::ipc::{Connection, Listener};

const SPAWN_COOLDOWN_FRAMES: u32 = 200;
const SPAWN_RETRY_FRAMES: u32 = 200;

/// Path the wm binary is spawned from. The reference resolves this
/// through its own `/bin` search; the compositor always knows exactly
/// which binary it wants, so no search is needed here.
const WM_BINARY_PATH: &str = "/bin/ycm-wm";

pub struct WmBridge {
    listener: Listener,
    conn: Option<Connection>,
    cooldown: u32,
    retry_wait: u32,
    next_seq: u32,
}

impl WmBridge {
    pub fn bind(endpoint: &str) -> Result<Self> {
        Ok(WmBridge {
            listener: Listener::bind(endpoint)?,
            conn: None,
            cooldown: 0,
            retry_wait: 0,
            next_seq: 0,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Per-frame bookkeeping: countdowns, non-blocking accept, and a
    /// spawn attempt when nothing is connected and both timers have
    /// elapsed. Returns `true` exactly when a fresh connection was
    /// just accepted - the caller should replay `MAP` for every
    /// currently-committed surface (§4.9).
    pub fn tick(&mut self, spawner: &dyn ProcessSpawner) -> bool {
        if self.cooldown > 0 {
            self.cooldown -= 1;
        }
        if self.retry_wait > 0 {
            self.retry_wait -= 1;
        }

        if let Some(stream) = self.listener.try_accept() {
            self.conn = Some(Connection::new(stream));
            self.next_seq = 0;
            return true;
        }

        if self.conn.is_none() && self.cooldown == 0 && self.retry_wait == 0 {
            match spawner.spawn(WM_BINARY_PATH) {
                Ok(()) => self.cooldown = SPAWN_COOLDOWN_FRAMES,
                Err(_) => self.retry_wait = SPAWN_RETRY_FRAMES,
            }
        }
        false
    }

    /// Drain and decode whatever `WM_CMD` frames are available. Clears
    /// the connection (and arms the retry timer) on disconnect, per
    /// §4.9's "on WM connection loss, clear focus/grab/preview" - the
    /// second return value is `true` exactly when that just happened,
    /// so the caller knows to clear its own state this call.
    pub fn pump(&mut self) -> (Vec<WmCmd>, bool) {
        let mut cmds = Vec::new();
        let mut disconnected = false;

        if let Some(conn) = self.conn.as_mut() {
            for frame in conn.pump() {
                if frame.header.msg_type == MsgType::WmCmd as u16 {
                    if let Ok(cmd) = WmCmd::decode(&frame.payload) {
                        cmds.push(cmd);
                    }
                }
            }
            if conn.is_done() {
                disconnected = true;
            }
        }

        if disconnected {
            self.disconnect();
        }
        (cmds, disconnected)
    }

    /// Send one event to the WM. Returns `false` (and tears the
    /// connection down) on a transport failure, so the caller can
    /// synthesize `UNMAP`s the way §5's "Cancellation" calls for.
    pub fn send_event(&mut self, ev: WmEvent) -> bool {
        let seq = self.alloc_seq();
        let frame = ev.into_frame(seq);
        self.send_frame(frame)
    }

    /// `true` if this call's transport write just tore the connection
    /// down (as opposed to there being no connection to begin with).
    fn send_frame(&mut self, frame: Frame) -> bool {
        match self.conn.as_mut() {
            Some(conn) => {
                let ok = conn.send_frame(frame).is_ok();
                if !ok {
                    self.disconnect();
                }
                ok
            }
            None => true,
        }
    }

    fn disconnect(&mut self) {
        self.conn = None;
        self.retry_wait = SPAWN_RETRY_FRAMES;
    }

    fn alloc_seq(&mut self) -> u32 {
        let s = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::fakes::FakeSpawner;

    #[test]
    fn spawns_after_both_timers_elapse() {
        let dir = std::env::temp_dir().join(format!("ycm_wmb_test_{}", std::process::id()));
        let endpoint = dir.to_string_lossy().to_string();
        let mut bridge = WmBridge::bind(&endpoint).unwrap();
        let spawner = FakeSpawner::default();

        assert!(!bridge.tick(&spawner));
        assert_eq!(spawner.spawned.borrow().len(), 1);
        assert_eq!(bridge.cooldown, SPAWN_COOLDOWN_FRAMES);

        // Still cooling down - no second spawn.
        bridge.tick(&spawner);
        assert_eq!(spawner.spawned.borrow().len(), 1);

        let _ = std::fs::remove_file(&endpoint);
    }
}
