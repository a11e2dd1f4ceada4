// Binary entry point: the wm's reconnect/pump/dispatch loop.
//
// Grounded on `wm.c`'s `main()`: a `comp_connect(&c, "compositor_wm")`
// retry loop, `wm_reset_session_state` on every fresh connection,
// `wm_ui_init` retried independently of the bridge, a poll loop that
// sleeps 1ms while events are flowing and 100ms once idle, and
// `wm_ui_cleanup`/disconnect on the way out. SIGTERM triggers a clean
// exit the same way `compositor`'s binary handles it; SIGINT is
// ignored per §6's "both processes accept SIGTERM for shutdown and
// ignore SIGINT" note.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use nix::sys::signal::{self, SigHandler, Signal};

use wm::bridge::Bridge;
use wm::config::Config;
use wm::devices::{BlockRasterizer, FbInfoReader, ScreenInfoSource, SystemSpawner};
use wm::interaction::spawn_app_by_name;
use wm::WmState;

static SHOULD_EXIT: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigterm(_: i32) {
    SHOULD_EXIT.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() -> Result<()> {
    unsafe {
        signal::signal(Signal::SIGTERM, SigHandler::Handler(handle_sigterm))
            .context("failed to install SIGTERM handler")?;
        signal::signal(Signal::SIGINT, SigHandler::SigIgn).context("failed to ignore SIGINT")?;
    }
    Ok(())
}

const BUSY_POLL: Duration = Duration::from_millis(1);
const IDLE_POLL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    install_signal_handlers()?;

    let config = Config::from_env();
    let pid = std::process::id();
    let screen_source = FbInfoReader::new(config.fb_path.clone());
    let rasterizer = BlockRasterizer;

    let mut bridge = Bridge::new(config.wm_endpoint());
    let mut state = WmState::new();
    let mut bar_tried = false;

    utils::info!("wm starting");

    while !SHOULD_EXIT.load(Ordering::SeqCst) {
        if bridge.tick() {
            utils::info!("wm connected to compositor");
            state.reset_session();
            bar_tried = false;
        }

        if bridge.is_connected() && !bar_tried {
            bar_tried = true;
            if let Some((w, _)) = state.screen() {
                if state.bar.init(&config.client_endpoint(), w, pid).is_err() {
                    utils::error!("wm: bar init failed, continuing without bar");
                }
            } else if let Some((w, _)) = screen_source.read() {
                if state.bar.init(&config.client_endpoint(), w, pid).is_err() {
                    utils::error!("wm: bar init failed, continuing without bar");
                }
            } else {
                bar_tried = false;
            }
        }

        let mut busy = false;
        if bridge.is_connected() {
            let (events, disconnected) = bridge.pump();
            if disconnected {
                utils::info!("wm lost connection to compositor");
            }
            busy = !events.is_empty();
            for ev in events {
                state.handle_event(&mut bridge, &screen_source, ev);
            }

            state.bar.pump();
            let _ = state.bar.draw(
                &rasterizer,
                wm::config::WORKSPACES,
                state.active_workspace(),
                state.run_mode().active,
                &state.run_mode().buf,
                state.focused_label().as_deref(),
            );

            if let Some(name) = state.take_pending_spawn() {
                let spawner = SystemSpawner;
                let _ = spawn_app_by_name(&name, &spawner, |p| std::path::Path::new(p).exists());
            }
            if state.take_pending_exit() {
                SHOULD_EXIT.store(true, Ordering::SeqCst);
            }
        }

        std::thread::sleep(if busy { BUSY_POLL } else { IDLE_POLL });
    }

    utils::info!("wm exiting");
    Ok(())
}
