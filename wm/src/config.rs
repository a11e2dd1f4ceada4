// Environment-only configuration and the layout/interaction constants
// `wm.c`'s `main()` preamble initializes `wm_state_t` with (gaps,
// float step) plus the `#define`s at the top of that file (bar height,
// resize hit band and minimums, workspace count).

use std::env;

pub const WORKSPACES: u32 = 5;
pub const H_BAR: u32 = 20;

pub const GAP_OUTER: i32 = 10;
pub const GAP_INNER: i32 = 10;
pub const FLOAT_STEP: i32 = 20;

pub const RESIZE_HIT_PX: i32 = 10;
pub const RESIZE_MIN_W: u32 = 240;
pub const RESIZE_MIN_H: u32 = 160;

/// Off-screen parking spot for views hidden by a workspace switch.
pub const HIDE_SENTINEL: (i32, i32) = (-20000, -20000);

pub const CLIENT_ENDPOINT_NAME: &str = "compositor";
pub const WM_ENDPOINT_NAME: &str = "compositor_wm";

pub const DEFAULT_FB_PATH: &str = "/dev/fb0";

#[derive(Debug, Clone)]
pub struct Config {
    pub fb_path: String,
    pub runtime_dir: String,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            fb_path: env::var("YCM_FB_PATH").unwrap_or_else(|_| DEFAULT_FB_PATH.to_string()),
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
