// Per-client surface state machine: attach, commit, destroy.
//
// Grounded on the teacher's `ways/surface.rs` commit/attach/destroy
// shape (generalized from wayland buffer attach points to this
// protocol's ATTACH_SHM_NAME/COMMIT/DESTROY_SURFACE messages) and on
// `compositor_client_pump.c`'s per-surface bookkeeping: geometry,
// stride, z, commit generation, and the `{attached, committed}` flag
// pair from §3.

use bitflags::bitflags;
use wire::ShmRegion;

use crate::shadow::Shadow;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SurfaceFlags: u32 {
        const ATTACHED = 0x1;
        const COMMITTED = 0x2;
    }
}

/// A snapshot of the fields that feed damage computation, taken after
/// each frame's damage pass so the next frame can diff against it.
/// Generalizes the reference's parallel `draw_surface_state_t` array
/// into a field owned directly by the surface it describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrevState {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
    pub stride: u32,
    pub z: u64,
    pub commit_gen: u64,
    pub valid: bool,
}

pub struct Surface {
    pub id: u32,
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
    pub stride: u32,
    pub z: u64,
    pub commit_gen: u64,
    pub flags: SurfaceFlags,
    pub buffer: Option<ShmRegion>,
    pub shadow: Shadow,
    pub prev: Option<PrevState>,
    /// Set when the WM has already been told about this surface (a
    /// MAP event was emitted for it); lets the client pump distinguish
    /// a first commit from a later one per §4.5.
    pub mapped_to_wm: bool,
}

impl Surface {
    pub fn new(id: u32) -> Self {
        Surface {
            id,
            x: 0,
            y: 0,
            w: 0,
            h: 0,
            stride: 0,
            z: 0,
            commit_gen: 0,
            flags: SurfaceFlags::empty(),
            buffer: None,
            shadow: Shadow::new(),
            prev: None,
            mapped_to_wm: false,
        }
    }

    pub fn is_bar(&self) -> bool {
        self.id == wire::UI_BAR_SURFACE_ID
    }

    pub fn attach(&mut self, buffer: ShmRegion, w: u32, h: u32, stride: u32) {
        self.buffer = Some(buffer);
        self.w = w;
        self.h = h;
        self.stride = stride;
        self.flags.insert(SurfaceFlags::ATTACHED);
    }

    /// Record a commit's position; geometry (w/h/stride) is set by
    /// `attach`, not by commit - only the bar gets its position pinned
    /// by the caller, per §4.8.
    pub fn commit(&mut self, x: i32, y: i32, commit_gen: u64) {
        self.x = x;
        self.y = y;
        self.commit_gen = commit_gen;
        self.flags.insert(SurfaceFlags::COMMITTED);
    }

    pub fn is_first_commit(&self) -> bool {
        !self.mapped_to_wm
    }

    /// Current pixel source for compositing: the valid shadow if one
    /// exists, otherwise the live client buffer, per §4.4.
    pub fn pixels(&self) -> Option<&[u32]> {
        if let Some(p) = self.shadow.active_pixels() {
            return Some(p);
        }
        self.buffer.as_ref().map(|r| unsafe {
            std::slice::from_raw_parts(r.as_ptr() as *const u32, r.size() / 4)
        })
    }

    pub fn take_prev(&mut self) -> Option<PrevState> {
        let snapshot = PrevState {
            x: self.x,
            y: self.y,
            w: self.w,
            h: self.h,
            stride: self.stride,
            z: self.z,
            commit_gen: self.commit_gen,
            valid: self.shadow.is_valid(),
        };
        self.prev.replace(snapshot)
    }
}
