// Narrow traits over the wm's own external collaborators: the process
// spawn facility it uses for app launching and run-mode, the
// framebuffer info read it uses to learn the screen size (§6 item 1;
// the wm never maps the framebuffer itself - that rendezvous is
// exclusively the compositor's per §5), and the glyph rasterizer the
// bar draws text with. All three are out-of-scope external facilities
// per §6/§1, modeled as traits so the layout/interaction logic is
// exercised by tests against fakes.

use anyhow::{Context, Result};

pub trait ProcessSpawner {
    fn spawn(&self, path: &str) -> Result<()>;
}

/// Spawns via `std::process::Command`, mirroring `compositor::devices::SystemSpawner`
/// and the reference's `spawn_process` call in `wm_spawn_app`/`wm_spawn_app_by_name`.
pub struct SystemSpawner;

impl ProcessSpawner for SystemSpawner {
    fn spawn(&self, path: &str) -> Result<()> {
        std::process::Command::new(path)
            .spawn()
            .with_context(|| format!("failed to spawn {}", path))?;
        Ok(())
    }
}

pub trait ScreenInfoSource {
    /// `(width, height)`, or `None` if the device isn't available yet.
    fn read(&self) -> Option<(u32, u32)>;
}

/// The ioctl-driven geometry read behind `/dev/fb0` is the out-of-scope
/// external collaborator (§6 item 1); like
/// `compositor::devices::LinuxFramebuffer`, geometry is sourced from
/// the env-var override so the binary runs against test fixtures
/// without real ioctls.
pub struct FbInfoReader {
    path: String,
}

impl FbInfoReader {
    pub fn new(path: String) -> Self {
        FbInfoReader { path }
    }
}

impl ScreenInfoSource for FbInfoReader {
    fn read(&self) -> Option<(u32, u32)> {
        if std::fs::metadata(&self.path).is_err() {
            return None;
        }
        let width: u32 = std::env::var("YCM_FB_WIDTH").ok().and_then(|s| s.parse().ok()).unwrap_or(1280);
        let height: u32 = std::env::var("YCM_FB_HEIGHT").ok().and_then(|s| s.parse().ok()).unwrap_or(800);
        if width == 0 || height == 0 {
            return None;
        }
        Some((width, height))
    }
}

/// Renders text into a pixel buffer; the actual glyph bitmaps are an
/// out-of-scope external collaborator (the reference's `font.h`).
pub trait GlyphRasterizer {
    fn text_width(&self, s: &str) -> u32;
    fn draw_str(&self, pixels: &mut [u32], buf_w: u32, buf_h: u32, x: i32, y: i32, s: &str, color: u32);
}

/// Fixed 8px-per-glyph monospace block renderer: each printable
/// character becomes a solid 6x8 block at its column, close enough to
/// the reference's `draw_string` width accounting (`strlen(s) * 8`) for
/// the bar's hit-testing math to line up.
pub struct BlockRasterizer;

const CHAR_W: i32 = 8;
const GLYPH_W: i32 = 6;
const GLYPH_H: i32 = 8;

impl GlyphRasterizer for BlockRasterizer {
    fn text_width(&self, s: &str) -> u32 {
        (s.chars().count() as i32 * CHAR_W) as u32
    }

    fn draw_str(&self, pixels: &mut [u32], buf_w: u32, buf_h: u32, x: i32, y: i32, s: &str, color: u32) {
        let buf_w = buf_w as i32;
        let buf_h = buf_h as i32;
        for (i, ch) in s.chars().enumerate() {
            if ch == ' ' {
                continue;
            }
            let gx = x + i as i32 * CHAR_W;
            for row in 0..GLYPH_H {
                let py = y + row;
                if py < 0 || py >= buf_h {
                    continue;
                }
                for col in 0..GLYPH_W {
                    let px = gx + col;
                    if px < 0 || px >= buf_w {
                        continue;
                    }
                    pixels[(py * buf_w + px) as usize] = color;
                }
            }
        }
    }
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    pub struct FakeSpawner {
        pub spawned: RefCell<Vec<String>>,
        pub fails: RefCell<std::collections::HashSet<String>>,
    }

    impl ProcessSpawner for FakeSpawner {
        fn spawn(&self, path: &str) -> Result<()> {
            if self.fails.borrow().contains(path) {
                anyhow::bail!("no such binary");
            }
            self.spawned.borrow_mut().push(path.to_string());
            Ok(())
        }
    }

    pub struct FakeScreenInfo(pub Option<(u32, u32)>);

    impl ScreenInfoSource for FakeScreenInfo {
        fn read(&self) -> Option<(u32, u32)> {
            self.0
        }
    }

    #[derive(Default)]
    pub struct NullRasterizer;

    impl GlyphRasterizer for NullRasterizer {
        fn text_width(&self, s: &str) -> u32 {
            s.chars().count() as u32 * 8
        }
        fn draw_str(&self, _pixels: &mut [u32], _w: u32, _h: u32, _x: i32, _y: i32, _s: &str, _color: u32) {}
    }
}
