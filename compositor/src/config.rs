// Environment-only configuration.
//
// §6 of the spec is explicit that neither process takes CLI flags;
// the only knobs are environment variables, with sensible defaults so
// the binary is runnable against test fixtures without real devices.
// Mirrors the teacher's own avoidance of an argument-parsing crate.

use std::env;

pub const DEFAULT_FB_PATH: &str = "/dev/fb0";
pub const DEFAULT_MOUSE_PATH: &str = "/dev/input/mouse0";
pub const DEFAULT_KEYBOARD_PATH: &str = "/dev/input/event0";

/// ~60 Hz frame pacing, matching the reference `usleep(16000)` tail of
/// `main()`'s loop body.
pub const FRAME_PERIOD_MS: u64 = 16;

pub const CLIENT_ENDPOINT_NAME: &str = "compositor";
pub const WM_ENDPOINT_NAME: &str = "compositor_wm";

/// Per-client surface table capacity. The header defining
/// `COMP_MAX_SURFACES` was not present in the retrieved reference
/// sources; 32 is a conservative default sized to comfortably hold a
/// handful of windows plus the bar.
pub const MAX_SURFACES: usize = 32;

/// Number of shadow buffers kept per surface (double-buffered).
pub const SHADOW_BUFS: usize = 2;

/// Initial client table capacity before the slab's first growth.
pub const CLIENTS_INIT: usize = 8;

#[derive(Debug, Clone)]
pub struct Config {
    pub fb_path: String,
    pub mouse_path: String,
    pub keyboard_path: String,
    pub runtime_dir: String,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            fb_path: env::var("YCM_FB_PATH").unwrap_or_else(|_| DEFAULT_FB_PATH.to_string()),
            mouse_path: env::var("YCM_MOUSE_PATH").unwrap_or_else(|_| DEFAULT_MOUSE_PATH.to_string()),
            keyboard_path: env::var("YCM_KBD_PATH").unwrap_or_else(|_| DEFAULT_KEYBOARD_PATH.to_string()),
            runtime_dir: env::var("YCM_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string()),
        }
    }

    pub fn client_endpoint(&self) -> String {
        format!("{}/{}", self.runtime_dir, CLIENT_ENDPOINT_NAME)
    }

    pub fn wm_endpoint(&self) -> String {
        format!("{}/{}", self.runtime_dir, WM_ENDPOINT_NAME)
    }
}
