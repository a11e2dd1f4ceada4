// The wm's view table: one entry per mapped (client, surface) pair it
// has been told about. Generalized from `wm.c`'s fixed `wm_view_t
// views[WM_MAX_VIEWS]` array into an arena, per DESIGN.md - a handle
// here is a `SlabIndex` rather than an array position, but every field
// is the reference struct's.

use utils::arena::{Slab, SlabIndex};

pub type ViewId = SlabIndex;

#[derive(Debug, Clone)]
pub struct View {
    pub client_id: u32,
    pub surface_id: u32,
    pub workspace: u32,
    pub floating: bool,
    pub focused: bool,
    pub hidden: bool,
    pub is_ui: bool,
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
    /// Position stashed by `hide`, restored by `show` (§4.6's
    /// "hide views... to an agreed sentinel position").
    pub last_x: i32,
    pub last_y: i32,
}

impl View {
    fn new(client_id: u32, surface_id: u32, workspace: u32) -> Self {
        View {
            client_id,
            surface_id,
            workspace,
            floating: false,
            focused: false,
            hidden: false,
            is_ui: false,
            x: 0,
            y: 0,
            w: 0,
            h: 0,
            last_x: 0,
            last_y: 0,
        }
    }
}

#[derive(Default)]
pub struct ViewTable {
    slab: Slab<View>,
}

impl ViewTable {
    pub fn new() -> Self {
        ViewTable { slab: Slab::new() }
    }

    pub fn find(&self, client_id: u32, surface_id: u32) -> Option<ViewId> {
        self.slab
            .iter()
            .find(|(_, v)| v.client_id == client_id && v.surface_id == surface_id)
            .map(|(id, _)| id)
    }

    pub fn get_or_create(&mut self, client_id: u32, surface_id: u32, active_ws: u32) -> (ViewId, bool) {
        if let Some(id) = self.find(client_id, surface_id) {
            return (id, false);
        }
        let id = self.slab.insert(View::new(client_id, surface_id, active_ws));
        (id, true)
    }

    pub fn get(&self, id: ViewId) -> Option<&View> {
        self.slab.get(id)
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut View> {
        self.slab.get_mut(id)
    }

    pub fn remove(&mut self, id: ViewId) -> Option<View> {
        self.slab.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ViewId, &View)> {
        self.slab.iter()
    }

    pub fn ids(&self) -> Vec<ViewId> {
        self.slab.iter().map(|(id, _)| id).collect()
    }

    /// Visible on the active workspace per §4.6/`wm_is_view_visible_on_active_ws`:
    /// the bar is always visible; anything else needs a matching,
    /// non-hidden workspace.
    pub fn is_visible(&self, id: ViewId, active_ws: u32) -> bool {
        match self.get(id) {
            Some(v) if v.is_ui => true,
            Some(v) => v.workspace == active_ws && !v.hidden,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_reuses_existing_entry() {
        let mut t = ViewTable::new();
        let (a, created) = t.get_or_create(1, 7, 0);
        assert!(created);
        let (b, created2) = t.get_or_create(1, 7, 0);
        assert!(!created2);
        assert_eq!(a, b);
    }

    #[test]
    fn visibility_follows_workspace_and_hidden_flag() {
        let mut t = ViewTable::new();
        let (id, _) = t.get_or_create(1, 1, 0);
        assert!(t.is_visible(id, 0));
        assert!(!t.is_visible(id, 1));
        t.get_mut(id).unwrap().hidden = true;
        assert!(!t.is_visible(id, 0));
    }
}
