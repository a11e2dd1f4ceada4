// The wm's aggregate session state and event dispatch, grounded on
// `wm.c`'s `wm_state_t` and its `wm_on_*`/`wm_apply_layout`/
// `wm_switch_workspace`/etc. handlers. One structural simplification
// from the reference, recorded in DESIGN.md: a workspace's master is
// tracked here as a single `Option<ViewId>` rather than the
// reference's separate `master_client_id[ws]`/`master_surface_id[ws]`
// arrays, since a `ViewId` already uniquely names a view.

use wire::{WmCmd, WmEvent, WmEventFlags};

use crate::bar::Bar;
use crate::bridge::Bridge;
use crate::config::{GAP_INNER, GAP_OUTER, HIDE_SENTINEL, WORKSPACES};
use crate::devices::ScreenInfoSource;
use crate::interaction::{
    compute_resize, resize_edges_for_point, Drag, DragKind, ResizeGeometry, RunMode, APP_EXPLORER, APP_LAUNCHER,
    APP_TERMINAL, BUTTON_LEFT, BUTTON_MIDDLE, BUTTON_RIGHT, KEY_CLOSE_FOCUSED, KEY_EXIT_WM, KEY_FOCUS_NEXT,
    KEY_FOCUS_PREV, KEY_MOVE_TO_WS_BASE, KEY_RUN_BACKSPACE, KEY_RUN_ENTER, KEY_RUN_ESCAPE, KEY_SPAWN_EXPLORER,
    KEY_SPAWN_LAUNCHER, KEY_SPAWN_TERMINAL, KEY_SUPER_DOWN, KEY_SUPER_UP, KEY_TOGGLE_FLOATING, KEY_WORKSPACE_BASE,
};
use crate::layout::LayoutForest;
use crate::view::{ViewId, ViewTable};

pub struct WmState {
    views: ViewTable,
    forest: LayoutForest,
    master: Vec<Option<ViewId>>,
    active_ws: u32,
    focused: Option<ViewId>,
    screen: Option<(u32, u32)>,

    super_down: bool,
    pointer_buttons: u32,
    pointer_x: i32,
    pointer_y: i32,

    drag: Option<Drag>,
    run_mode: RunMode,

    ui_client_id: Option<u32>,
    pub bar: Bar,

    /// App name queued by a launch key/bar click/run-mode Enter this
    /// dispatch, for `main` to resolve through `spawn_app_by_name`
    /// against the real filesystem.
    pending_spawn: Option<String>,
    pending_exit: bool,
}

impl WmState {
    pub fn new() -> Self {
        WmState {
            views: ViewTable::new(),
            forest: LayoutForest::new(WORKSPACES),
            master: vec![None; WORKSPACES as usize],
            active_ws: 0,
            focused: None,
            screen: None,
            super_down: false,
            pointer_buttons: 0,
            pointer_x: 0,
            pointer_y: 0,
            drag: None,
            run_mode: RunMode::default(),
            ui_client_id: None,
            bar: Bar::new(),
            pending_spawn: None,
            pending_exit: false,
        }
    }

    pub fn active_workspace(&self) -> u32 {
        self.active_ws
    }

    pub fn screen(&self) -> Option<(u32, u32)> {
        self.screen
    }

    pub fn run_mode(&self) -> &RunMode {
        &self.run_mode
    }

    pub fn take_pending_spawn(&mut self) -> Option<String> {
        self.pending_spawn.take()
    }

    pub fn take_pending_exit(&mut self) -> bool {
        std::mem::take(&mut self.pending_exit)
    }

    pub fn focused_label(&self) -> Option<String> {
        let id = self.focused?;
        let v = self.views.get(id)?;
        if v.is_ui {
            return None;
        }
        Some(format!("c{}:s{}", v.client_id, v.surface_id))
    }

    /// Resets all session state on a fresh `compositor_wm` connection
    /// or reconnect, mirroring `wm_reset_session_state`.
    pub fn reset_session(&mut self) {
        self.views = ViewTable::new();
        self.forest = LayoutForest::new(WORKSPACES);
        self.master = vec![None; WORKSPACES as usize];
        self.focused = None;
        self.super_down = false;
        self.pointer_buttons = 0;
        self.pointer_x = 0;
        self.pointer_y = 0;
        self.drag = None;
        self.run_mode = RunMode::default();
        self.ui_client_id = None;
    }

    pub fn ensure_screen(&mut self, source: &dyn ScreenInfoSource) {
        if self.screen.is_none() {
            self.screen = source.read();
        }
    }

    // ---- visibility / focus helpers -----------------------------------

    fn is_visible(&self, id: ViewId) -> bool {
        self.views.is_visible(id, self.active_ws)
    }

    fn clear_focus(&mut self) {
        for id in self.views.ids() {
            if let Some(v) = self.views.get_mut(id) {
                v.focused = false;
            }
        }
        self.focused = None;
    }

    fn first_visible_non_ui(&self) -> Option<ViewId> {
        let mut ids = self.views.ids();
        ids.sort_unstable();
        ids.into_iter()
            .find(|&id| self.is_visible(id) && !self.views.get(id).map(|v| v.is_ui).unwrap_or(true))
    }

    fn focus_first_visible(&mut self, bridge: &mut Bridge) {
        if let Some(id) = self.first_visible_non_ui() {
            self.focus_view(bridge, id);
        }
    }

    pub fn focus_view(&mut self, bridge: &mut Bridge, id: ViewId) {
        if !self.is_visible(id) {
            return;
        }
        let Some(v) = self.views.get(id) else { return };
        if v.is_ui {
            return;
        }
        let surface_id = v.surface_id;
        self.clear_focus();
        if let Some(v) = self.views.get_mut(id) {
            v.focused = true;
        }
        self.focused = Some(id);
        bridge.send_cmd(WmCmd::Focus { surface_id });
        bridge.send_cmd(WmCmd::Raise { surface_id });
        self.raise_and_place_bar(bridge);
    }

    pub fn focus_next(&mut self, bridge: &mut Bridge, dir: i32) {
        if dir == 0 {
            return;
        }
        let mut ids = self.views.ids();
        ids.sort_unstable();
        if ids.is_empty() {
            return;
        }
        let start = self.focused.and_then(|f| ids.iter().position(|&id| id == f)).unwrap_or(0);
        let n = ids.len() as i32;
        for step in 1..=n {
            let idx = (start as i32 + dir * step).rem_euclid(n) as usize;
            let id = ids[idx];
            if self.is_visible(id) && !self.views.get(id).map(|v| v.is_ui).unwrap_or(true) {
                self.focus_view(bridge, id);
                return;
            }
        }
    }

    // ---- master bookkeeping -------------------------------------------

    fn master_matches(&self, ws: u32, id: ViewId) -> bool {
        self.master[ws as usize] == Some(id)
    }

    fn reselect_master(&mut self, ws: u32) {
        let pick = self
            .views
            .ids()
            .into_iter()
            .find(|&id| self.views.get(id).map(|v| v.workspace == ws && !v.floating).unwrap_or(false));
        self.master[ws as usize] = pick;
    }

    // ---- hide/show -------------------------------------------------------

    fn hide_view(&mut self, bridge: &mut Bridge, id: ViewId) {
        let Some(v) = self.views.get_mut(id) else { return };
        if v.is_ui || v.hidden {
            return;
        }
        v.hidden = true;
        v.last_x = v.x;
        v.last_y = v.y;
        v.x = HIDE_SENTINEL.0;
        v.y = HIDE_SENTINEL.1;
        let surface_id = v.surface_id;
        let (x, y) = (v.x, v.y);
        bridge.send_cmd(WmCmd::Move { surface_id, x, y });
    }

    fn show_view(&mut self, bridge: &mut Bridge, id: ViewId) {
        let Some(v) = self.views.get_mut(id) else { return };
        if v.is_ui || !v.hidden {
            return;
        }
        v.hidden = false;
        v.x = v.last_x;
        v.y = v.last_y;
        let surface_id = v.surface_id;
        let (x, y) = (v.x, v.y);
        bridge.send_cmd(WmCmd::Move { surface_id, x, y });
    }

    fn raise_and_place_bar(&mut self, bridge: &mut Bridge) {
        if self.ui_client_id.is_none() {
            return;
        }
        bridge.send_cmd(WmCmd::Move { surface_id: wire::UI_BAR_SURFACE_ID, x: 0, y: 0 });
        bridge.send_cmd(WmCmd::Raise { surface_id: wire::UI_BAR_SURFACE_ID });
    }

    // ---- layout ------------------------------------------------------

    /// Recomputes tiled-view geometry for the active workspace and
    /// pushes MOVE commands for anything that changed position.
    /// Mirrors `wm_apply_layout`: a view's own size is never touched
    /// here, only its origin.
    pub fn apply_layout(&mut self, bridge: &mut Bridge, source: &dyn ScreenInfoSource) {
        self.ensure_screen(source);

        for id in self.views.ids() {
            let Some(v) = self.views.get(id) else { continue };
            if v.is_ui {
                continue;
            }
            if v.workspace != self.active_ws {
                self.hide_view(bridge, id);
            } else if v.hidden {
                self.show_view(bridge, id);
            }
        }

        let tiled = self.forest.leaves(self.active_ws);

        if tiled.is_empty() {
            self.raise_and_place_bar(bridge);
            return;
        }

        let Some(master_id) = self.pick_master(&tiled) else { return };

        let bar_h = if self.bar.is_connected() { self.bar.height() as i32 } else { 0 };
        let mx = GAP_OUTER;
        let my = GAP_OUTER + bar_h;
        self.move_view(bridge, master_id, mx, my);

        let master_w = self.views.get(master_id).map(|v| v.w).unwrap_or(0);
        let stack_x = mx + master_w as i32 + GAP_INNER;
        let mut stack_y = GAP_OUTER + bar_h;
        for &id in &tiled {
            if id == master_id {
                continue;
            }
            self.move_view(bridge, id, stack_x, stack_y);
            let h = self.views.get(id).map(|v| v.h).unwrap_or(0);
            stack_y += h as i32 + GAP_INNER;
        }

        self.raise_and_place_bar(bridge);
    }

    fn pick_master(&self, tiled: &[ViewId]) -> Option<ViewId> {
        let ws = self.active_ws;
        for &id in tiled {
            if self.master_matches(ws, id) {
                return Some(id);
            }
        }
        tiled.first().copied()
    }

    fn move_view(&mut self, bridge: &mut Bridge, id: ViewId, x: i32, y: i32) {
        let Some(v) = self.views.get_mut(id) else { return };
        v.x = x;
        v.y = y;
        let surface_id = v.surface_id;
        bridge.send_cmd(WmCmd::Move { surface_id, x, y });
    }

    // ---- workspace / floating / close ----------------------------------

    pub fn switch_workspace(&mut self, bridge: &mut Bridge, source: &dyn ScreenInfoSource, ws: u32) {
        if ws >= WORKSPACES || ws == self.active_ws {
            return;
        }
        self.active_ws = ws;

        for id in self.views.ids() {
            let Some(v) = self.views.get(id) else { continue };
            if v.is_ui {
                continue;
            }
            if v.workspace == ws {
                self.show_view(bridge, id);
            } else {
                self.hide_view(bridge, id);
            }
        }

        self.clear_focus();
        self.focus_first_visible(bridge);

        if self.master[ws as usize].is_none() {
            self.reselect_master(ws);
        }
        self.apply_layout(bridge, source);
    }

    pub fn move_focused_to_ws(&mut self, bridge: &mut Bridge, source: &dyn ScreenInfoSource, ws: u32) {
        if ws >= WORKSPACES {
            return;
        }
        let Some(id) = self.focused else { return };
        if !self.is_visible(id) {
            return;
        }

        let old_ws = self.views.get(id).map(|v| v.workspace).unwrap_or(self.active_ws);
        if self.master_matches(old_ws, id) {
            self.master[old_ws as usize] = None;
        }
        let floating = self.views.get(id).map(|v| v.floating).unwrap_or(false);
        if !floating {
            self.forest.remove(old_ws, id);
        }

        if let Some(v) = self.views.get_mut(id) {
            v.workspace = ws;
        }
        if !floating {
            self.forest.insert(ws, id, self.focused);
        }
        if self.master[ws as usize].is_none() && !floating {
            self.master[ws as usize] = Some(id);
        }

        if ws != self.active_ws {
            self.hide_view(bridge, id);
            self.clear_focus();
            self.focus_first_visible(bridge);
        }

        if old_ws != ws && self.master[old_ws as usize].is_none() {
            self.reselect_master(old_ws);
        }
        self.apply_layout(bridge, source);
    }

    pub fn toggle_floating(&mut self, bridge: &mut Bridge, source: &dyn ScreenInfoSource) {
        let Some(id) = self.focused else { return };
        if !self.is_visible(id) {
            return;
        }
        let Some(v) = self.views.get(id) else { return };
        if v.floating {
            let ws = v.workspace;
            if let Some(v) = self.views.get_mut(id) {
                v.floating = false;
            }
            self.forest.insert(ws, id, self.focused);
            if self.master[ws as usize].is_none() {
                self.master[ws as usize] = Some(id);
            }
        } else {
            self.make_floating(id);
        }
        self.apply_layout(bridge, source);
    }

    /// Pulls `id` out of the tiling tree and marks it floating, moving
    /// master bookkeeping off it since the tree no longer tracks it.
    /// No-op if `id` is already floating.
    fn make_floating(&mut self, id: ViewId) {
        let Some(v) = self.views.get(id) else { return };
        if v.floating {
            return;
        }
        let ws = v.workspace;
        if let Some(v) = self.views.get_mut(id) {
            v.floating = true;
        }
        self.forest.remove(ws, id);
        if self.master_matches(ws, id) {
            self.master[ws as usize] = None;
            self.reselect_master(ws);
        }
    }

    pub fn move_focused_float(&mut self, bridge: &mut Bridge, dx: i32, dy: i32) {
        let Some(id) = self.focused else { return };
        if !self.is_visible(id) {
            return;
        }
        let Some(v) = self.views.get(id) else { return };
        if !v.floating {
            return;
        }
        let (x, y) = (v.x + dx, v.y + dy);
        self.move_view(bridge, id, x, y);
    }

    pub fn close_focused(&mut self, bridge: &mut Bridge) {
        let Some(id) = self.focused else { return };
        if !self.is_visible(id) {
            return;
        }
        if let Some(v) = self.views.get(id) {
            bridge.send_cmd(WmCmd::Close { surface_id: v.surface_id });
        }
    }

    // ---- drag / resize --------------------------------------------------

    fn start_drag(
        &mut self,
        bridge: &mut Bridge,
        id: ViewId,
        px: i32,
        py: i32,
        button_mask: u32,
        requires_super: bool,
        source: &dyn ScreenInfoSource,
    ) {
        let Some(v) = self.views.get(id) else { return };
        if v.is_ui || !self.is_visible(id) {
            return;
        }
        if !v.floating {
            self.make_floating(id);
            self.apply_layout(bridge, source);
        }
        let v = self.views.get(id).unwrap();
        let (client_id, vx, vy) = (v.client_id, v.x, v.y);
        self.drag = Some(Drag {
            view: id,
            button_mask,
            requires_super,
            kind: DragKind::Move { off_x: px - vx, off_y: py - vy },
        });
        bridge.send_cmd(WmCmd::PointerGrab { client_id, enable: true });
    }

    fn start_resize(
        &mut self,
        bridge: &mut Bridge,
        id: ViewId,
        px: i32,
        py: i32,
        button_mask: u32,
        edges: crate::interaction::ResizeEdges,
        source: &dyn ScreenInfoSource,
    ) {
        if edges.is_empty() {
            return;
        }
        let Some(v) = self.views.get(id) else { return };
        if v.is_ui || !self.is_visible(id) {
            return;
        }
        if !v.floating {
            self.make_floating(id);
            self.apply_layout(bridge, source);
        }
        let v = self.views.get(id).unwrap();
        let start = ResizeGeometry { x: v.x, y: v.y, w: v.w, h: v.h };
        let client_id = v.client_id;
        self.drag = Some(Drag {
            view: id,
            button_mask,
            requires_super: false,
            kind: DragKind::Resize { edges, start, start_px: px, start_py: py, pending: start, preview_last: (0, 0) },
        });
        bridge.send_cmd(WmCmd::PointerGrab { client_id, enable: true });
    }

    fn stop_drag(&mut self, bridge: &mut Bridge) {
        let Some(drag) = self.drag.take() else { return };
        let Some(v) = self.views.get(drag.view) else { return };
        let (client_id, surface_id, vx, vy) = (v.client_id, v.surface_id, v.x, v.y);

        if let DragKind::Resize { pending, .. } = drag.kind {
            if pending.w > 0 && pending.h > 0 {
                if pending.x != vx || pending.y != vy {
                    if let Some(v) = self.views.get_mut(drag.view) {
                        v.x = pending.x;
                        v.y = pending.y;
                    }
                    bridge.send_cmd(WmCmd::Move { surface_id, x: pending.x, y: pending.y });
                }
                bridge.send_cmd(WmCmd::Resize { surface_id, w: pending.w, h: pending.h });
            }
            bridge.send_cmd(WmCmd::PreviewClear { surface_id });
        }
        bridge.send_cmd(WmCmd::PointerGrab { client_id, enable: false });
    }

    // ---- event dispatch --------------------------------------------------

    pub fn handle_event(&mut self, bridge: &mut Bridge, source: &dyn ScreenInfoSource, ev: WmEvent) {
        match ev {
            WmEvent::Map { .. } => self.on_map(bridge, source, ev),
            WmEvent::Unmap { .. } => {
                self.on_unmap(bridge, ev);
                self.apply_layout(bridge, source);
            }
            WmEvent::Commit { .. } => self.on_commit(bridge, source, ev),
            WmEvent::Click { .. } => self.on_click(bridge, ev),
            WmEvent::Key { .. } => self.on_key(bridge, source, ev),
            WmEvent::Pointer { .. } => self.on_pointer(bridge, source, ev),
        }
    }

    fn on_map(&mut self, bridge: &mut Bridge, source: &dyn ScreenInfoSource, ev: WmEvent) {
        let WmEvent::Map { client_id, surface_id, geom, flags } = ev else { return };
        if surface_id == 0 || flags.contains(WmEventFlags::BACKGROUND) {
            return;
        }

        if surface_id == wire::UI_BAR_SURFACE_ID {
            self.ui_client_id = Some(client_id);
            let (id, _) = self.views.get_or_create(client_id, surface_id, self.active_ws);
            if let Some(v) = self.views.get_mut(id) {
                v.is_ui = true;
                v.floating = true;
                v.hidden = false;
                v.x = 0;
                v.y = 0;
                v.w = geom.w;
                v.h = geom.h;
            }
            self.raise_and_place_bar(bridge);
            self.apply_layout(bridge, source);
            return;
        }

        let (id, _existed) = self.views.get_or_create(client_id, surface_id, self.active_ws);
        let ws = self.active_ws;
        if let Some(v) = self.views.get_mut(id) {
            v.w = geom.w;
            v.h = geom.h;
            v.x = geom.x;
            v.y = geom.y;
            v.hidden = false;
        }

        let floating = self.views.get(id).map(|v| v.floating).unwrap_or(false);
        if self.master[ws as usize].is_none() && !floating {
            self.master[ws as usize] = Some(id);
        }
        self.forest.insert(ws, id, self.focused);

        if !flags.contains(WmEventFlags::REPLAY) {
            self.apply_layout(bridge, source);
            self.focus_view(bridge, id);
        } else {
            if self.views.get(id).map(|v| v.workspace) != Some(self.active_ws) {
                self.hide_view(bridge, id);
            }
            if self.focused.is_none() && self.views.get(id).map(|v| v.workspace) == Some(self.active_ws) {
                self.focus_view(bridge, id);
            }
            self.apply_layout(bridge, source);
        }
    }

    fn on_unmap(&mut self, bridge: &mut Bridge, ev: WmEvent) {
        let WmEvent::Unmap { client_id, surface_id } = ev else { return };
        let Some(id) = self.views.find(client_id, surface_id) else { return };

        let is_ui = self.views.get(id).map(|v| v.is_ui).unwrap_or(false);
        if is_ui || surface_id == wire::UI_BAR_SURFACE_ID {
            if self.ui_client_id == Some(client_id) {
                self.ui_client_id = None;
            }
            self.views.remove(id);
            return;
        }

        if self.drag.map(|d| d.view) == Some(id) {
            self.stop_drag(bridge);
        }

        let was_focused = self.focused == Some(id);
        let ws = self.views.get(id).map(|v| v.workspace).unwrap_or(self.active_ws);
        let was_master = self.master_matches(ws, id);

        self.forest.remove(ws, id);
        self.views.remove(id);
        if was_focused {
            self.clear_focus();
        }

        if was_master {
            self.master[ws as usize] = None;
            self.reselect_master(ws);
        }

        if was_focused {
            self.focus_first_visible(bridge);
        }
    }

    fn on_commit(&mut self, bridge: &mut Bridge, source: &dyn ScreenInfoSource, ev: WmEvent) {
        let WmEvent::Commit { client_id, surface_id, geom, flags } = ev else { return };
        if surface_id == 0 || flags.contains(WmEventFlags::BACKGROUND) {
            return;
        }

        let (id, _) = self.views.get_or_create(client_id, surface_id, self.active_ws);
        if let Some(v) = self.views.get_mut(id) {
            v.w = geom.w;
            v.h = geom.h;
        }

        let is_ui = surface_id == wire::UI_BAR_SURFACE_ID || self.views.get(id).map(|v| v.is_ui).unwrap_or(false);
        if is_ui {
            if let Some(v) = self.views.get_mut(id) {
                v.is_ui = true;
                v.floating = true;
                v.hidden = false;
                v.x = 0;
                v.y = 0;
            }
            self.ui_client_id = Some(client_id);
            self.raise_and_place_bar(bridge);
            return;
        }

        let dragging = self.drag.is_some();
        let floating = self.views.get(id).map(|v| v.floating).unwrap_or(false);
        if !dragging && !floating {
            self.apply_layout(bridge, source);
        }
    }

    fn on_click(&mut self, bridge: &mut Bridge, ev: WmEvent) {
        let WmEvent::Click { surface_id, .. } = ev else { return };
        if surface_id == 0 || surface_id == wire::UI_BAR_SURFACE_ID {
            return;
        }
        if let Some(id) = self.view_at(surface_id) {
            self.focus_view(bridge, id);
        }
    }

    fn on_pointer(&mut self, bridge: &mut Bridge, source: &dyn ScreenInfoSource, ev: WmEvent) {
        let WmEvent::Pointer { surface_id, sx, sy, buttons } = ev else { return };

        let prev = self.pointer_buttons;
        let cur = buttons;
        let left_pressed = (cur & BUTTON_LEFT != 0) && (prev & BUTTON_LEFT == 0);
        let right_pressed = (cur & BUTTON_RIGHT != 0) && (prev & BUTTON_RIGHT == 0);
        let middle_pressed = (cur & BUTTON_MIDDLE != 0) && (prev & BUTTON_MIDDLE == 0);

        self.pointer_buttons = cur;
        self.pointer_x = sx;
        self.pointer_y = sy;

        if surface_id == wire::UI_BAR_SURFACE_ID && left_pressed {
            self.handle_bar_click(bridge, source, sx);
            return;
        }

        if let Some(drag) = self.drag {
            let bm = drag.button_mask;
            let drag_button_released = bm != 0 && (cur & bm) == 0 && (prev & bm) != 0;
            if drag_button_released || (drag.requires_super && !self.super_down) {
                self.stop_drag(bridge);
                return;
            }

            let still_ok = self.is_visible(drag.view) && self.views.get(drag.view).map(|v| v.floating).unwrap_or(false);
            if !still_ok {
                self.stop_drag(bridge);
                return;
            }

            self.update_drag(bridge, drag, sx, sy);
            return;
        }

        if right_pressed {
            let Some(id) = self.view_at(surface_id) else { return };
            self.focus_view(bridge, id);
            let v = self.views.get(id).unwrap();
            let edges = resize_edges_for_point(v.x, v.y, v.w, v.h, sx, sy);
            if !edges.is_empty() {
                self.start_resize(bridge, id, sx, sy, BUTTON_RIGHT, edges, source);
            } else {
                self.start_drag(bridge, id, sx, sy, BUTTON_RIGHT, false, source);
            }
            return;
        }

        if left_pressed && self.super_down {
            let Some(id) = self.view_at(surface_id) else { return };
            self.focus_view(bridge, id);
            self.start_drag(bridge, id, sx, sy, BUTTON_LEFT, true, source);
            return;
        }

        if middle_pressed {
            let Some(id) = self.view_at(surface_id) else { return };
            self.focus_view(bridge, id);
            self.start_drag(bridge, id, sx, sy, BUTTON_MIDDLE, false, source);
        }
    }

    fn update_drag(&mut self, bridge: &mut Bridge, drag: Drag, sx: i32, sy: i32) {
        match drag.kind {
            DragKind::Resize { edges, start, start_px, start_py, mut preview_last, .. } => {
                let result = compute_resize(start, edges, sx - start_px, sy - start_py);

                let Some(v) = self.views.get(drag.view) else { return };
                let surface_id = v.surface_id;
                if v.x != result.x || v.y != result.y {
                    if let Some(v) = self.views.get_mut(drag.view) {
                        v.x = result.x;
                        v.y = result.y;
                    }
                    bridge.send_cmd(WmCmd::Move { surface_id, x: result.x, y: result.y });
                }
                if (result.w, result.h) != preview_last {
                    preview_last = (result.w, result.h);
                    bridge.send_cmd(WmCmd::PreviewRect { surface_id, w: result.w, h: result.h });
                }

                self.drag = Some(Drag {
                    kind: DragKind::Resize { edges, start, start_px, start_py, pending: result, preview_last },
                    ..drag
                });
            }
            DragKind::Move { off_x, off_y } => {
                let (nx, ny) = (sx - off_x, sy - off_y);
                let changed = self.views.get(drag.view).map(|v| v.x != nx || v.y != ny).unwrap_or(false);
                if changed {
                    self.move_view(bridge, drag.view, nx, ny);
                }
            }
        }
    }

    fn view_at(&self, surface_id: u32) -> Option<ViewId> {
        if surface_id == 0 {
            return None;
        }
        self.views.ids().into_iter().find(|&id| self.views.get(id).map(|v| v.surface_id == surface_id).unwrap_or(false))
    }

    fn on_key(&mut self, bridge: &mut Bridge, source: &dyn ScreenInfoSource, ev: WmEvent) {
        let WmEvent::Key { keycode, key_state, .. } = ev else { return };
        if key_state == 0 {
            return;
        }
        let kc = keycode as u8;

        if kc == KEY_SUPER_DOWN {
            self.super_down = true;
            return;
        }
        if kc == KEY_SUPER_UP {
            self.super_down = false;
            if self.drag.is_some() {
                self.stop_drag(bridge);
            }
            return;
        }

        if self.run_mode.active {
            self.handle_run_key(kc);
            return;
        }

        if (KEY_WORKSPACE_BASE..KEY_WORKSPACE_BASE + WORKSPACES as u8).contains(&kc) {
            self.switch_workspace(bridge, source, (kc - KEY_WORKSPACE_BASE) as u32);
            return;
        }
        if (KEY_MOVE_TO_WS_BASE..KEY_MOVE_TO_WS_BASE + WORKSPACES as u8).contains(&kc) {
            self.move_focused_to_ws(bridge, source, (kc - KEY_MOVE_TO_WS_BASE) as u32);
            return;
        }

        match kc {
            KEY_SPAWN_TERMINAL => self.pending_spawn = Some(APP_TERMINAL.to_string()),
            KEY_CLOSE_FOCUSED => self.close_focused(bridge),
            KEY_SPAWN_EXPLORER => self.pending_spawn = Some(APP_EXPLORER.to_string()),
            KEY_SPAWN_LAUNCHER => self.pending_spawn = Some(APP_LAUNCHER.to_string()),
            KEY_TOGGLE_FLOATING => self.toggle_floating(bridge, source),
            KEY_EXIT_WM => self.pending_exit = true,
            KEY_FOCUS_PREV => self.focus_next(bridge, -1),
            KEY_FOCUS_NEXT => self.focus_next(bridge, 1),
            _ => {}
        }
    }

    fn handle_run_key(&mut self, kc: u8) {
        if kc == KEY_RUN_ESCAPE {
            self.run_mode.cancel();
        } else if kc == KEY_RUN_BACKSPACE {
            self.run_mode.backspace();
        } else if kc == KEY_RUN_ENTER {
            if !self.run_mode.buf.is_empty() {
                self.pending_spawn = Some(self.run_mode.buf.clone());
            }
            self.run_mode.cancel();
        } else if (32..=126).contains(&kc) {
            self.run_mode.push_char(kc as char);
        }
    }

    fn handle_bar_click(&mut self, bridge: &mut Bridge, source: &dyn ScreenInfoSource, sx: i32) {
        if sx < 0 {
            return;
        }
        if let Some(ws) = crate::bar::workspace_hit(sx) {
            if ws < WORKSPACES {
                self.switch_workspace(bridge, source, ws);
            }
        }

        if crate::bar::run_hit(sx, WORKSPACES) {
            if self.run_mode.active {
                self.run_mode.cancel();
            } else {
                self.run_mode.enter();
            }
            return;
        }

        if let Some(idx) = crate::bar::launcher_pick(sx, WORKSPACES) {
            if let Some(name) = crate::bar::LAUNCHER_LABELS.get(idx) {
                self.pending_spawn = Some(name.to_lowercase());
            }
        }
    }
}

impl Default for WmState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::fakes::FakeScreenInfo;
    use wire::Geometry;

    fn bridge() -> Bridge {
        Bridge::new("/tmp/ycm_wm_state_test_nonexistent".to_string())
    }

    fn map_event(client_id: u32, surface_id: u32, x: i32, y: i32, w: u32, h: u32) -> WmEvent {
        WmEvent::Map { client_id, surface_id, geom: Geometry { x, y, w, h }, flags: WmEventFlags::empty() }
    }

    #[test]
    fn mapping_a_view_focuses_and_masters_it() {
        let mut st = WmState::new();
        let mut b = bridge();
        let source = FakeScreenInfo(Some((1280, 800)));

        st.handle_event(&mut b, &source, map_event(1, 10, 0, 0, 300, 200));
        assert_eq!(st.focused_label(), Some("c1:s10".to_string()));
    }

    #[test]
    fn second_mapped_view_becomes_stack_not_master() {
        let mut st = WmState::new();
        let mut b = bridge();
        let source = FakeScreenInfo(Some((1280, 800)));

        st.handle_event(&mut b, &source, map_event(1, 10, 0, 0, 300, 200));
        st.handle_event(&mut b, &source, map_event(2, 11, 0, 0, 300, 200));
        assert_eq!(st.focused_label(), Some("c2:s11".to_string()));
    }

    #[test]
    fn unmapping_focused_master_reselects_both() {
        let mut st = WmState::new();
        let mut b = bridge();
        let source = FakeScreenInfo(Some((1280, 800)));

        st.handle_event(&mut b, &source, map_event(1, 10, 0, 0, 300, 200));
        st.handle_event(&mut b, &source, map_event(2, 11, 0, 0, 300, 200));
        st.handle_event(&mut b, &source, WmEvent::Unmap { client_id: 2, surface_id: 11 });
        assert_eq!(st.focused_label(), Some("c1:s10".to_string()));
    }

    #[test]
    fn workspace_switch_hides_and_shows_views() {
        let mut st = WmState::new();
        let mut b = bridge();
        let source = FakeScreenInfo(Some((1280, 800)));

        st.handle_event(&mut b, &source, map_event(1, 10, 0, 0, 300, 200));
        st.switch_workspace(&mut b, &source, 1);
        assert_eq!(st.active_workspace(), 1);
        assert_eq!(st.focused_label(), None);

        st.switch_workspace(&mut b, &source, 0);
        assert_eq!(st.focused_label(), Some("c1:s10".to_string()));
    }

    #[test]
    fn key_spawn_terminal_queues_pending_spawn() {
        let mut st = WmState::new();
        let mut b = bridge();
        let source = FakeScreenInfo(Some((1280, 800)));
        st.on_key(&mut b, &source, WmEvent::Key { surface_id: 0, geom: Geometry { x: 0, y: 0, w: 0, h: 0 }, keycode: KEY_SPAWN_TERMINAL as u32, key_state: 1 });
        assert_eq!(st.take_pending_spawn(), Some(APP_TERMINAL.to_string()));
    }

    #[test]
    fn run_mode_enter_key_then_enter_queues_typed_name() {
        let mut st = WmState::new();
        for ch in "xterm".chars() {
            st.run_mode.push_char(ch);
        }
        st.run_mode.active = true;
        st.handle_run_key(KEY_RUN_ENTER);
        assert_eq!(st.take_pending_spawn(), Some("xterm".to_string()));
        assert!(!st.run_mode().active);
    }
}
