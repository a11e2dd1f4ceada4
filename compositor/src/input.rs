// Input focus, pointer-grab and keyboard-grab bookkeeping.
//
// Grounded on §4.5's two focus policies (click-to-focus when no WM is
// connected, WM-authoritative otherwise) and the grab semantics for
// `POINTER_GRAB`/`KEYBOARD_GRAB`. `WmCmd::PointerGrab`/`KeyboardGrab`
// only carry a `client_id` (see `wire/src/wm_proto.rs`), not a
// surface - the grabbed surface is inferred as that client's currently
// focused surface at the moment the grab is enabled, the simplest
// reading consistent with the wire layout; documented in DESIGN.md.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Focus {
    pub client: Option<u32>,
    pub surface: Option<u32>,
}

#[derive(Debug, Default)]
pub struct InputRouter {
    pub focus: Focus,
    pointer_grab: Option<(u32, u32)>,
    keyboard_grab: Option<u32>,
    last_buttons: u32,
}

impl InputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.focus = Focus::default();
        self.pointer_grab = None;
        self.keyboard_grab = None;
    }

    /// Topmost `(client_id, surface_id)` whose rect contains `(x, y)`,
    /// or `None` over the background. `surfaces` yields every visible
    /// surface across every client; callers pass attached+committed
    /// surfaces only.
    pub fn hit_test<'a, I>(surfaces: I, x: i32, y: i32) -> Option<(u32, u32)>
    where
        I: IntoIterator<Item = (u32, &'a crate::surface::Surface)>,
    {
        let mut best: Option<(u64, u32, u32)> = None;
        for (client_id, s) in surfaces {
            if !s.flags.contains(crate::surface::SurfaceFlags::ATTACHED | crate::surface::SurfaceFlags::COMMITTED) {
                continue;
            }
            let rect = utils::region::Rect::new(s.x, s.y, s.w as i32, s.h as i32);
            if !rect.contains_point(x, y) {
                continue;
            }
            if best.map_or(true, |(z, _, _)| s.z > z) {
                best = Some((s.z, client_id, s.id));
            }
        }
        best.map(|(_, c, s)| (c, s))
    }

    /// Click-to-focus when no WM is connected: refocus on the
    /// rising edge of the primary button over a hit surface.
    pub fn update_focus_no_wm(&mut self, hit: Option<(u32, u32)>, buttons: u32) {
        let pressed_edge = (buttons & 0x1 != 0) && (self.last_buttons & 0x1 == 0);
        self.last_buttons = buttons;
        if pressed_edge {
            if let Some((client, surface)) = hit {
                self.focus = Focus { client: Some(client), surface: Some(surface) };
            }
        }
    }

    /// WM-authoritative focus (a `FOCUS` command arrived). `surface_id`
    /// is resolved to its owning client by the caller, since `WmCmd`
    /// only carries the surface id.
    pub fn set_focus(&mut self, client: u32, surface: u32) {
        self.focus = Focus { client: Some(client), surface: Some(surface) };
    }

    pub fn set_pointer_grab(&mut self, client_id: u32, enable: bool) {
        if enable {
            let surface = if self.focus.client == Some(client_id) { self.focus.surface.unwrap_or(0) } else { 0 };
            self.pointer_grab = Some((client_id, surface));
        } else {
            self.pointer_grab = None;
        }
    }

    pub fn set_keyboard_grab(&mut self, client_id: u32, enable: bool) {
        self.keyboard_grab = if enable { Some(client_id) } else { None };
    }

    pub fn release_grabs_for_client(&mut self, client_id: u32) {
        if self.pointer_grab.map(|(c, _)| c) == Some(client_id) {
            self.pointer_grab = None;
        }
        if self.keyboard_grab == Some(client_id) {
            self.keyboard_grab = None;
        }
    }

    /// `(client_id, surface_id)` pointer events should be routed to,
    /// preferring an active grab over spatial hit-testing.
    pub fn pointer_target(&self, hit: Option<(u32, u32)>) -> Option<(u32, u32)> {
        self.pointer_grab.or(hit)
    }

    /// Client id keyboard events should be delivered to: an active
    /// keyboard grab, else the focused client.
    pub fn keyboard_target(&self) -> Option<u32> {
        self.keyboard_grab.or(self.focus.client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Surface;

    fn committed_surface(id: u32, x: i32, y: i32, w: u32, h: u32, z: u64) -> Surface {
        let mut s = Surface::new(id);
        s.x = x;
        s.y = y;
        s.w = w;
        s.h = h;
        s.z = z;
        s.flags = crate::surface::SurfaceFlags::ATTACHED | crate::surface::SurfaceFlags::COMMITTED;
        s
    }

    #[test]
    fn hit_test_picks_topmost_overlapping_surface() {
        let low = committed_surface(1, 0, 0, 100, 100, 1);
        let high = committed_surface(2, 50, 50, 100, 100, 2);
        let hit = InputRouter::hit_test(vec![(10, &low), (11, &high)], 60, 60);
        assert_eq!(hit, Some((11, 2)));
    }

    #[test]
    fn click_to_focus_only_on_rising_edge() {
        let mut router = InputRouter::new();
        router.update_focus_no_wm(Some((1, 7)), 0);
        assert_eq!(router.focus.client, None);
        router.update_focus_no_wm(Some((1, 7)), 1);
        assert_eq!(router.focus, Focus { client: Some(1), surface: Some(7) });
    }

    #[test]
    fn pointer_grab_overrides_hit_test() {
        let mut router = InputRouter::new();
        router.set_focus(3, 9);
        router.set_pointer_grab(3, true);
        assert_eq!(router.pointer_target(Some((5, 1))), Some((3, 9)));
        router.set_pointer_grab(3, false);
        assert_eq!(router.pointer_target(Some((5, 1))), Some((5, 1)));
    }
}
