// A small-integer-handle slab arena
//
// Simplified from the source tree's Rc<RefCell<_>>-based entity/id
// tracker: this codebase has no need for an id to outlive or be shared
// independently of the aggregate that owns it (every arena here is a
// field of exactly one struct: the client table, the surface table, the
// per-workspace tiling-tree node list), so a plain Vec-backed slab with
// a free list is enough. Handles are bare indices, Copy, and carry no
// destructor.

/// An index into a `Slab<T>`. Cheap to copy and store anywhere (layout
/// tree nodes, view tables); does not keep its referent alive.
pub type SlabIndex = usize;

enum Slot<T> {
    Occupied(T),
    Free { next_free: Option<SlabIndex> },
}

/// A `Vec`-backed arena that hands out small-integer handles and reuses
/// freed slots before growing.
pub struct Slab<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<SlabIndex>,
    len: usize,
}

impl<T> Slab<T> {
    pub fn new() -> Self {
        Slab {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Slab {
            slots: Vec::with_capacity(cap),
            free_head: None,
            len: 0,
        }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a value, returning the handle it can be looked up by.
    pub fn insert(&mut self, value: T) -> SlabIndex {
        self.len += 1;
        match self.free_head {
            Some(idx) => {
                let next_free = match &self.slots[idx] {
                    Slot::Free { next_free } => *next_free,
                    Slot::Occupied(_) => unreachable!("free list pointed at occupied slot"),
                };
                self.free_head = next_free;
                self.slots[idx] = Slot::Occupied(value);
                idx
            }
            None => {
                self.slots.push(Slot::Occupied(value));
                self.slots.len() - 1
            }
        }
    }

    /// Remove the value at `idx`, returning it if the slot was occupied.
    pub fn remove(&mut self, idx: SlabIndex) -> Option<T> {
        match self.slots.get_mut(idx) {
            Some(slot @ Slot::Occupied(_)) => {
                let old = std::mem::replace(
                    slot,
                    Slot::Free {
                        next_free: self.free_head,
                    },
                );
                self.free_head = Some(idx);
                self.len -= 1;
                match old {
                    Slot::Occupied(v) => Some(v),
                    Slot::Free { .. } => unreachable!(),
                }
            }
            _ => None,
        }
    }

    pub fn get(&self, idx: SlabIndex) -> Option<&T> {
        match self.slots.get(idx) {
            Some(Slot::Occupied(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, idx: SlabIndex) -> Option<&mut T> {
        match self.slots.get_mut(idx) {
            Some(Slot::Occupied(v)) => Some(v),
            _ => None,
        }
    }

    pub fn contains(&self, idx: SlabIndex) -> bool {
        matches!(self.slots.get(idx), Some(Slot::Occupied(_)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlabIndex, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Slot::Occupied(v) => Some((i, v)),
            Slot::Free { .. } => None,
        })
    }
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_freed_slots_before_growing() {
        let mut slab: Slab<&str> = Slab::new();
        let a = slab.insert("a");
        let b = slab.insert("b");
        slab.remove(a);
        let c = slab.insert("c");
        assert_eq!(c, a, "freed slot should be reused rather than growing");
        assert_eq!(slab.get(b), Some(&"b"));
        assert_eq!(slab.len(), 2);
    }

    #[test]
    fn removed_handle_reads_back_none() {
        let mut slab: Slab<u32> = Slab::new();
        let id = slab.insert(42);
        assert_eq!(slab.remove(id), Some(42));
        assert_eq!(slab.get(id), None);
        assert!(!slab.contains(id));
    }

    #[test]
    fn iter_yields_only_occupied_slots() {
        let mut slab: Slab<u32> = Slab::new();
        let a = slab.insert(1);
        let _b = slab.insert(2);
        slab.remove(a);
        let remaining: Vec<_> = slab.iter().map(|(_, v)| *v).collect();
        assert_eq!(remaining, vec![2]);
    }
}
