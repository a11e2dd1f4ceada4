// Binary entry point: wires real device implementations into the
// `Compositor` and runs its frame loop.
//
// Grounded on `compositor_main.c`'s `main()` preamble (device opens,
// signal setup) and §6's "both processes accept SIGTERM for shutdown
// and ignore SIGINT" note. Logging setup follows the teacher's
// `utils::log` initialization convention.

use anyhow::{Context, Result};
use nix::sys::signal::{self, SigHandler, Signal};

use compositor::config::Config;
use compositor::devices::{LinuxFramebuffer, RawKeyboardDevice, RawMouseDevice, SystemSpawner};
use compositor::Compositor;

extern "C" fn handle_sigterm(_: i32) {
    SHOULD_EXIT.store(true, std::sync::atomic::Ordering::SeqCst);
}

static SHOULD_EXIT: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

fn install_signal_handlers() -> Result<()> {
    unsafe {
        signal::signal(Signal::SIGTERM, SigHandler::Handler(handle_sigterm))
            .context("failed to install SIGTERM handler")?;
        signal::signal(Signal::SIGINT, SigHandler::SigIgn)
            .context("failed to ignore SIGINT")?;
    }
    Ok(())
}

fn main() -> Result<()> {
    install_signal_handlers()?;

    let config = Config::from_env();

    let fb = LinuxFramebuffer::open(&config.fb_path)
        .with_context(|| format!("failed to open framebuffer {}", config.fb_path))?;
    let mouse = RawMouseDevice::open(&config.mouse_path)
        .with_context(|| format!("failed to open mouse device {}", config.mouse_path))?;
    let keyboard = RawKeyboardDevice::open(&config.keyboard_path)
        .with_context(|| format!("failed to open keyboard device {}", config.keyboard_path))?;

    let mut compositor = Compositor::new(
        config,
        Box::new(fb),
        Box::new(mouse),
        Box::new(keyboard),
        Box::new(SystemSpawner),
    )?;

    utils::info!("compositor starting");
    compositor.acquire_framebuffer()?;

    let period = std::time::Duration::from_millis(compositor::config::FRAME_PERIOD_MS);
    while !SHOULD_EXIT.load(std::sync::atomic::Ordering::SeqCst) && !compositor.is_exiting() {
        compositor.step();
        std::thread::sleep(period);
    }

    compositor.release_framebuffer();
    utils::info!("compositor exiting");
    Ok(())
}
