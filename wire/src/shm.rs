// RAII shared-memory mapping.
//
// Grounded on the teacher's `ways/shm.rs` `ShmRegion`: a raw pointer,
// fd and size bundled together with an `unmap`-on-`Drop` impl. The
// teacher maps an fd handed to it over the wire by its client
// protocol; here surfaces and input rings are attached by POSIX shm
// *name* instead (`comp.h`'s `comp_send_attach_shm_name`), so this
// version adds `create`/`open` around a named object rather than
// wrapping a pre-existing fd, and keeps the same mmap-then-RAII shape.

use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::ptr::NonNull;

use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;

use crate::error::ProtoError;
use utils::MemImage;

pub struct ShmRegion {
    fd: OwnedFd,
    ptr: NonNull<c_void>,
    size: usize,
    // Set only on the side that created (and thus owns) the backing
    // object's name; cleared once `unlink` has been called.
    owned_name: Option<String>,
}

// The mapping is only ever touched through explicit reads/writes of
// plain pixel/event data guarded by the wire protocol above it.
unsafe impl Send for ShmRegion {}

impl ShmRegion {
    /// Allocate a brand-new named shm object of `size` bytes, mapped
    /// read-write, and take ownership of its name.
    pub fn create(name: &str, size: usize) -> Result<Self, ProtoError> {
        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(|_| ProtoError::ShmOpen)?;
        ftruncate(&fd, size as i64).map_err(|_| ProtoError::ShmOpen)?;

        let mut region = Self::map(fd, size, true)?;
        region.owned_name = Some(name.to_string());
        Ok(region)
    }

    /// Open an existing named shm object (the peer side of `create`).
    pub fn open(name: &str, size: usize, writable: bool) -> Result<Self, ProtoError> {
        let flags = if writable { OFlag::O_RDWR } else { OFlag::O_RDONLY };
        let fd = shm_open(name, flags, Mode::empty()).map_err(|_| ProtoError::ShmOpen)?;
        Self::map(fd, size, writable)
    }

    fn map(fd: OwnedFd, size: usize, writable: bool) -> Result<Self, ProtoError> {
        let prot = if writable {
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE
        } else {
            ProtFlags::PROT_READ
        };
        let len = NonZeroUsize::new(size).ok_or(ProtoError::ShmMap)?;
        let ptr = unsafe { mmap(None, len, prot, MapFlags::MAP_SHARED, &fd, 0) }
            .map_err(|_| ProtoError::ShmMap)?;
        Ok(ShmRegion { fd, ptr, size, owned_name: None })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr() as *mut u8
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    /// View a rectangle of this mapping as a pixel buffer, following
    /// the teacher's `ShmBuffer::get_mem_image`.
    pub fn mem_image(&self, offset: usize, width: usize, height: usize, stride: u32) -> MemImage {
        let mut img =
            MemImage::new(unsafe { self.as_ptr().add(offset) }, 4, width, height);
        img.set_stride(stride);
        img
    }

    /// Unlink the backing object's name so no other process can open
    /// it again. Existing mappings, including this one, remain valid
    /// until unmapped. Only meaningful on a region this side created.
    pub fn unlink(&mut self) {
        if let Some(name) = self.owned_name.take() {
            let _ = shm_unlink(name.as_str());
        }
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.ptr, self.size);
        }
    }
}
