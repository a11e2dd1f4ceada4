// Damage accumulator: a bounded set of axis-aligned screen rectangles,
// grown by union-with-coalescing and collapsed to a single
// screen-covering rectangle once saturated, per §3/§4.4.

use utils::region::Rect;

/// Above this many distinct rectangles, further damage collapses the
/// whole set into one full-screen rectangle rather than growing
/// unbounded - same bounded-cardinality guarantee as the receive ring.
const MAX_RECTS: usize = 32;

pub struct DamageSet {
    rects: Vec<Rect<i32>>,
    screen: Rect<i32>,
    full_screen: bool,
}

impl DamageSet {
    pub fn new(screen_w: i32, screen_h: i32) -> Self {
        DamageSet {
            rects: Vec::new(),
            screen: Rect::new(0, 0, screen_w, screen_h),
            full_screen: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.full_screen && self.rects.is_empty()
    }

    pub fn mark_full_screen(&mut self) {
        self.full_screen = true;
        self.rects.clear();
    }

    /// Add a rectangle, clipped to the screen. Tries to coalesce with
    /// an existing rectangle that overlaps or touches it before
    /// appending a new one; collapses to full-screen once the set
    /// would exceed `MAX_RECTS`.
    pub fn add(&mut self, rect: Rect<i32>) {
        if self.full_screen {
            return;
        }
        let clipped = rect.clip(&self.screen);
        if clipped.is_empty() {
            return;
        }

        for existing in self.rects.iter_mut() {
            if existing.intersects(&clipped) {
                *existing = existing.union(&clipped);
                return;
            }
        }

        if self.rects.len() >= MAX_RECTS {
            self.mark_full_screen();
            return;
        }
        self.rects.push(clipped);
    }

    /// The rectangles to redraw this frame. Empty unless `is_empty()`
    /// is false; a full-screen mark yields a single screen rect.
    pub fn rects(&self) -> Vec<Rect<i32>> {
        if self.full_screen {
            vec![self.screen]
        } else {
            self.rects.clone()
        }
    }

    pub fn clear(&mut self) {
        self.rects.clear();
        self.full_screen = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesces_overlapping_rects() {
        let mut dmg = DamageSet::new(800, 600);
        dmg.add(Rect::new(0, 0, 100, 100));
        dmg.add(Rect::new(50, 50, 100, 100));
        assert_eq!(dmg.rects().len(), 1);
    }

    #[test]
    fn clips_to_screen() {
        let mut dmg = DamageSet::new(800, 600);
        dmg.add(Rect::new(700, 500, 200, 200));
        let rects = dmg.rects();
        assert_eq!(rects.len(), 1);
        assert_eq!(rects[0].right(), 800);
        assert_eq!(rects[0].bottom(), 600);
    }

    #[test]
    fn collapses_to_full_screen_past_cap() {
        let mut dmg = DamageSet::new(800, 600);
        for i in 0..(MAX_RECTS as i32 + 1) {
            dmg.add(Rect::new(i * 2, i * 2, 1, 1));
        }
        let rects = dmg.rects();
        assert_eq!(rects.len(), 1);
        assert_eq!(rects[0], Rect::new(0, 0, 800, 600));
    }
}
