// The status bar: an ordinary client surface the wm itself drives over
// a second, plain "compositor" connection (the wm's `compositor_wm`
// bridge carries only WmEvent/WmCmd traffic). Grounded on `wm.c`'s
// `wm_ui_t`/`wm_ui_init`/`wm_ui_draw_bar`/`wm_ui_bar_run_hit`/
// `wm_ui_bar_launcher_pick`/`wm_ui_handle_bar_click`.

use std::time::Duration;

use anyhow::{Context, Result};
use wire::{AttachShmName, Commit, CommitFlags, Hello, Message, MsgType, ShmName, ShmRegion, UI_BAR_SURFACE_ID};

use crate::config::H_BAR;
use crate::devices::GlyphRasterizer;
use crate::ipc::Conn;

const SETUP_TIMEOUT: Duration = Duration::from_millis(2000);
const DRAW_TIMEOUT: Duration = Duration::from_millis(500);

const BG: u32 = 0x202020;
const SEPARATOR: u32 = 0x101010;
const ACTIVE_SLOT: u32 = 0xE0E0E0;
const INACTIVE_SLOT: u32 = 0x808080;
const RUN_ACTIVE: u32 = 0xE0E0E0;
const RUN_INACTIVE: u32 = 0xB8B8B8;
const LABEL_COLOR: u32 = 0xB8B8B8;
const FOCUS_INFO_COLOR: u32 = 0xB8B8B8;

const BASE_X: i32 = 6;
const SLOT_W: i32 = 12;
const RUN_LABEL: &str = "Run";
pub const LAUNCHER_LABELS: [&str; 3] = ["Paint", "Explorer", "GEditor"];

fn label_width(s: &str) -> i32 {
    s.chars().count() as i32 * 8 + 12
}

fn run_start_x(workspaces: u32) -> i32 {
    BASE_X + workspaces as i32 * SLOT_W + 14
}

fn launcher_start_x(workspaces: u32) -> i32 {
    run_start_x(workspaces) + label_width(RUN_LABEL) + 8
}

/// `true` if `x` falls within the "Run" label's hit box.
pub fn run_hit(x: i32, workspaces: u32) -> bool {
    let start = run_start_x(workspaces);
    x >= start && x < start + label_width(RUN_LABEL)
}

/// The launcher index `x` lands in, or `None`.
pub fn launcher_pick(x: i32, workspaces: u32) -> Option<usize> {
    if x < launcher_start_x(workspaces) {
        return None;
    }
    let mut bx = launcher_start_x(workspaces);
    for (i, label) in LAUNCHER_LABELS.iter().enumerate() {
        let w = label_width(label);
        if x >= bx && x < bx + w {
            return Some(i);
        }
        bx += w + 8;
    }
    None
}

/// The workspace slot `x` lands in, or `None` if left of the slots.
pub fn workspace_hit(x: i32) -> Option<u32> {
    let rel = x - BASE_X;
    if rel < 0 {
        return None;
    }
    Some((rel / SLOT_W) as u32)
}

pub struct Bar {
    conn: Conn,
    surface_id: u32,
    region: Option<ShmRegion>,
    w: u32,
    h: u32,
    connected: bool,
}

impl Bar {
    pub fn new() -> Self {
        Bar {
            conn: Conn::new(),
            surface_id: UI_BAR_SURFACE_ID,
            region: None,
            w: 0,
            h: 0,
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn width(&self) -> u32 {
        self.w
    }

    pub fn height(&self) -> u32 {
        self.h
    }

    /// Opens the bar's client connection, allocates its shm pixel
    /// buffer, and runs the Hello/AttachShmName/Commit handshake.
    /// Mirrors `wm_ui_init`.
    pub fn init(&mut self, endpoint: &str, screen_w: u32, pid: u32) -> Result<()> {
        self.w = screen_w;
        self.h = H_BAR;
        let size_bytes = (self.w * self.h * 4) as usize;

        if !self.conn.connect(endpoint) {
            anyhow::bail!("bar: connect to {} failed", endpoint);
        }

        let mut region = None;
        for i in 0..8 {
            let name = format!("wmbar_{}_{}", pid, i);
            if let Ok(r) = ShmRegion::create(&name, size_bytes) {
                region = Some((r, name));
                break;
            }
        }
        let (region, name) = region.context("bar: shm_create_named failed")?;

        let hello = Message::Hello(Hello { pid });
        self.conn.send_and_wait(hello.into_frame(1), MsgType::Ack as u16, SETUP_TIMEOUT)?;

        let attach = Message::AttachShmName(AttachShmName {
            surface_id: self.surface_id,
            width: self.w,
            height: self.h,
            stride: self.w,
            format: 0,
            size_bytes: size_bytes as u32,
            name: ShmName::from_str(&name)?,
        });
        self.conn.send_and_wait(attach.into_frame(2), MsgType::Ack as u16, SETUP_TIMEOUT)?;

        let commit = Message::Commit(Commit { surface_id: self.surface_id, x: 0, y: 0, flags: CommitFlags::empty() });
        self.conn.send_and_wait(commit.into_frame(3), MsgType::Ack as u16, SETUP_TIMEOUT)?;

        self.region = Some(region);
        self.connected = true;
        Ok(())
    }

    pub fn pump(&mut self) {
        if self.connected {
            let _ = self.conn.pump();
        }
    }

    /// Redraws the bar's pixel buffer and commits it. Mirrors
    /// `wm_ui_draw_bar`'s exact geometry/colors.
    pub fn draw(
        &mut self,
        rasterizer: &dyn GlyphRasterizer,
        workspaces: u32,
        active_ws: u32,
        run_mode: bool,
        run_buf: &str,
        focus_label: Option<&str>,
    ) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        let Some(region) = self.region.as_ref() else { return Ok(()) };
        let w = self.w;
        let h = self.h;
        let pixels = unsafe { std::slice::from_raw_parts_mut(region.as_ptr() as *mut u32, (w * h) as usize) };

        pixels.fill(BG);
        if h > 0 {
            let row_start = ((h - 1) * w) as usize;
            for px in &mut pixels[row_start..row_start + w as usize] {
                *px = SEPARATOR;
            }
        }

        let mut x = BASE_X;
        for i in 0..workspaces {
            let label = (i + 1).to_string();
            let col = if i == active_ws { ACTIVE_SLOT } else { INACTIVE_SLOT };
            rasterizer.draw_str(pixels, w, h, x, 6, &label, col);
            x += SLOT_W;
        }

        let mut bx = run_start_x(workspaces);
        let run_col = if run_mode { RUN_ACTIVE } else { RUN_INACTIVE };
        rasterizer.draw_str(pixels, w, h, bx + 6, 6, RUN_LABEL, run_col);
        bx += label_width(RUN_LABEL) + 8;

        if run_mode {
            let text = format!("> {}", run_buf);
            rasterizer.draw_str(pixels, w, h, bx + 2, 6, &text, RUN_ACTIVE);
        } else {
            for label in &LAUNCHER_LABELS {
                rasterizer.draw_str(pixels, w, h, bx + 6, 6, label, LABEL_COLOR);
                bx += label_width(label) + 8;
            }
        }

        if let Some(info) = focus_label {
            let sx = (w as i32 - (rasterizer.text_width(info) as i32 + 6)).max(0);
            rasterizer.draw_str(pixels, w, h, sx, 6, info, FOCUS_INFO_COLOR);
        }

        let commit = Message::Commit(Commit { surface_id: self.surface_id, x: 0, y: 0, flags: CommitFlags::empty() });
        match self.conn.send_and_wait(commit.into_frame(4), MsgType::Ack as u16, DRAW_TIMEOUT) {
            Ok(_) => Ok(()),
            Err(e) => {
                self.connected = false;
                self.conn.disconnect();
                Err(e)
            }
        }
    }
}

impl Default for Bar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_hit_box_sits_after_workspace_slots() {
        let start = run_start_x(5);
        assert!(!run_hit(start - 1, 5));
        assert!(run_hit(start, 5));
        assert!(run_hit(start + label_width(RUN_LABEL) - 1, 5));
        assert!(!run_hit(start + label_width(RUN_LABEL), 5));
    }

    #[test]
    fn launcher_pick_selects_by_label_order() {
        let start = launcher_start_x(5);
        assert_eq!(launcher_pick(start - 1, 5), None);
        assert_eq!(launcher_pick(start, 5), Some(0));
        let second_start = start + label_width("Paint") + 8;
        assert_eq!(launcher_pick(second_start, 5), Some(1));
    }

    #[test]
    fn workspace_hit_divides_evenly_by_slot_width() {
        assert_eq!(workspace_hit(BASE_X), Some(0));
        assert_eq!(workspace_hit(BASE_X + SLOT_W), Some(1));
        assert_eq!(workspace_hit(BASE_X - 1), None);
    }
}
