// Narrow traits over the external collaborators §6 names but declines
// to specify ("the pixel framebuffer device, raw keyboard/mouse device
// nodes ... the process-spawn facility"). Keeping the frame loop and
// protocol logic generic over these traits is what lets them run
// against fakes in tests, mirroring the teacher's `FdWatch`/
// `TimingManager` split between pure pacing logic and a thin `nix`
// shim around the real syscall.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::io::AsRawFd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FbInfo {
    pub width: u32,
    pub height: u32,
    /// Stride in 32-bit pixels (BGRA8888, per §6 item 2).
    pub pitch_words: u32,
}

pub trait FramebufferDevice {
    fn info(&self) -> FbInfo;
    /// Exclusive `fb_acquire` rendezvous (§6 item 3).
    fn acquire(&mut self) -> Result<()>;
    fn release(&mut self);
    fn pixels_mut(&mut self) -> &mut [u32];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseSample {
    pub x: i32,
    pub y: i32,
    pub buttons: u32,
}

pub trait MouseDevice {
    /// Non-blocking; `None` means no new sample this frame (the frame
    /// loop falls back to the last known state, per §4's main-loop
    /// description of a short read).
    fn read(&mut self) -> Option<MouseSample>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u8,
    pub down: bool,
}

pub trait KeyboardDevice {
    fn poll(&mut self) -> Option<KeyEvent>;
}

pub trait ProcessSpawner {
    fn spawn(&self, path: &str) -> Result<()>;
}

/// Spawns via `std::process::Command`, the idiomatic Rust equivalent
/// of the reference's raw `fork`/`execv` in `wm_spawn_app`.
pub struct SystemSpawner;

impl ProcessSpawner for SystemSpawner {
    fn spawn(&self, path: &str) -> Result<()> {
        std::process::Command::new(path)
            .spawn()
            .with_context(|| format!("failed to spawn {}", path))?;
        Ok(())
    }
}

/// Linux framebuffer backed by a memory-mapped device file. The exact
/// `FBIOGET_VSCREENINFO`/`FBIOGET_FSCREENINFO` ioctl layout is an
/// out-of-scope external collaborator per §6 ("never reimplemented
/// here"); geometry is instead sourced from the same env-var override
/// mechanism §2.1 calls for on the device path, so the binary runs
/// against test fixtures without real ioctls.
pub struct LinuxFramebuffer {
    file: File,
    map: Option<memmap_handle::MmapHandle>,
    info: FbInfo,
}

mod memmap_handle {
    use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
    use std::ffi::c_void;
    use std::num::NonZeroUsize;
    use std::os::fd::BorrowedFd;
    use std::ptr::NonNull;

    pub struct MmapHandle {
        ptr: NonNull<c_void>,
        len: usize,
    }

    impl MmapHandle {
        pub fn new(fd: BorrowedFd<'_>, len: usize) -> nix::Result<Self> {
            let len_nz = NonZeroUsize::new(len).expect("framebuffer length must be nonzero");
            let ptr = unsafe {
                mmap(
                    None,
                    len_nz,
                    ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                    MapFlags::MAP_SHARED,
                    fd,
                    0,
                )?
            };
            Ok(MmapHandle { ptr, len })
        }

        pub fn as_mut_slice(&mut self) -> &mut [u32] {
            unsafe {
                std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut u32, self.len / 4)
            }
        }
    }

    impl Drop for MmapHandle {
        fn drop(&mut self) {
            unsafe {
                let _ = munmap(self.ptr, self.len);
            }
        }
    }
}

impl LinuxFramebuffer {
    pub fn open(path: &str) -> Result<Self> {
        let width: u32 = std::env::var("YCM_FB_WIDTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1280);
        let height: u32 = std::env::var("YCM_FB_HEIGHT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(800);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open framebuffer device {}", path))?;

        Ok(LinuxFramebuffer {
            file,
            map: None,
            info: FbInfo { width, height, pitch_words: width },
        })
    }
}

impl FramebufferDevice for LinuxFramebuffer {
    fn info(&self) -> FbInfo {
        self.info
    }

    fn acquire(&mut self) -> Result<()> {
        use std::os::fd::AsFd;
        let len = (self.info.height * self.info.pitch_words * 4) as usize;
        let handle = memmap_handle::MmapHandle::new(self.file.as_fd(), len)
            .context("failed to mmap framebuffer")?;
        self.map = Some(handle);
        Ok(())
    }

    fn release(&mut self) {
        self.map = None;
    }

    fn pixels_mut(&mut self) -> &mut [u32] {
        self.map
            .as_mut()
            .expect("pixels_mut called before acquire")
            .as_mut_slice()
    }
}

/// Mouse device reading fixed-size `{x: i32, y: i32, buttons: u32}`
/// little-endian records (§6 item 4's "bit-exact contract").
pub struct RawMouseDevice {
    file: File,
}

impl RawMouseDevice {
    pub fn open(path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .with_context(|| format!("failed to open mouse device {}", path))?;
        nix::fcntl::fcntl(
            file.as_raw_fd(),
            nix::fcntl::FcntlArg::F_SETFL(nix::fcntl::OFlag::O_NONBLOCK),
        )
        .context("failed to set mouse device non-blocking")?;
        Ok(RawMouseDevice { file })
    }
}

impl MouseDevice for RawMouseDevice {
    fn read(&mut self) -> Option<MouseSample> {
        let mut buf = [0u8; 12];
        match self.file.read(&mut buf) {
            Ok(12) => Some(MouseSample {
                x: i32::from_le_bytes(buf[0..4].try_into().unwrap()),
                y: i32::from_le_bytes(buf[4..8].try_into().unwrap()),
                buttons: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            }),
            _ => None,
        }
    }
}

/// Keyboard device reading single-byte scancodes (§6 item 5), with the
/// high bit used as a down/up flag: `0x80 | code` is a key-down,
/// `code` alone a key-up, matching the private extension range
/// `0x80..0xC1` the spec reserves for modifiers/special keys.
pub struct RawKeyboardDevice {
    file: File,
}

impl RawKeyboardDevice {
    pub fn open(path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .with_context(|| format!("failed to open keyboard device {}", path))?;
        nix::fcntl::fcntl(
            file.as_raw_fd(),
            nix::fcntl::FcntlArg::F_SETFL(nix::fcntl::OFlag::O_NONBLOCK),
        )
        .context("failed to set keyboard device non-blocking")?;
        Ok(RawKeyboardDevice { file })
    }
}

impl KeyboardDevice for RawKeyboardDevice {
    fn poll(&mut self) -> Option<KeyEvent> {
        let mut byte = [0u8; 1];
        match self.file.read(&mut byte) {
            Ok(1) => Some(KeyEvent { code: byte[0] & 0x7f, down: byte[0] & 0x80 != 0 }),
            _ => None,
        }
    }
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::collections::VecDeque;

    pub struct FakeFramebuffer {
        info: FbInfo,
        pixels: Vec<u32>,
        acquired: bool,
    }

    impl FakeFramebuffer {
        pub fn new(width: u32, height: u32) -> Self {
            FakeFramebuffer {
                info: FbInfo { width, height, pitch_words: width },
                pixels: vec![0u32; (width * height) as usize],
                acquired: false,
            }
        }
    }

    impl FramebufferDevice for FakeFramebuffer {
        fn info(&self) -> FbInfo {
            self.info
        }
        fn acquire(&mut self) -> Result<()> {
            self.acquired = true;
            Ok(())
        }
        fn release(&mut self) {
            self.acquired = false;
        }
        fn pixels_mut(&mut self) -> &mut [u32] {
            &mut self.pixels
        }
    }

    #[derive(Default)]
    pub struct FakeMouse {
        pub queue: VecDeque<MouseSample>,
    }

    impl MouseDevice for FakeMouse {
        fn read(&mut self) -> Option<MouseSample> {
            self.queue.pop_front()
        }
    }

    #[derive(Default)]
    pub struct FakeKeyboard {
        pub queue: VecDeque<KeyEvent>,
    }

    impl KeyboardDevice for FakeKeyboard {
        fn poll(&mut self) -> Option<KeyEvent> {
            self.queue.pop_front()
        }
    }

    #[derive(Default)]
    pub struct FakeSpawner {
        pub spawned: std::cell::RefCell<Vec<String>>,
    }

    impl ProcessSpawner for FakeSpawner {
        fn spawn(&self, path: &str) -> Result<()> {
            self.spawned.borrow_mut().push(path.to_string());
            Ok(())
        }
    }
}
