// The window manager's aggregate session state and its per-tick
// bookkeeping. Grounded on `wm.c`'s `wm_state_t` plus `main()`'s
// reconnect/pump/dispatch loop, split across modules the way
// `compositor`'s crate splits its own aggregate.

pub mod bar;
pub mod bridge;
pub mod config;
pub mod devices;
pub mod interaction;
pub mod ipc;
pub mod layout;
pub mod state;
pub mod view;

pub use state::WmState;
