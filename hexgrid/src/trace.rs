use glam::{IVec2, Vec2};

use crate::Layout;

/// Iterator over the cells of a straight line between two cells.
///
/// The starting cell is not included, the target cell is always the last
/// one. Every step moves to an adjacent cell that is one step closer to the
/// target, picking the one whose center lies closest to the ideal line, so
/// the line has exactly `layout.dist(from, to)` cells.
#[derive(Clone, Debug)]
pub struct LineTracer {
    layout: Layout,
    pos: IVec2,
    to: IVec2,
    from_center: Vec2,
    to_center: Vec2,
    steps: i32,
    i: i32,
}

impl LineTracer {
    pub fn new(layout: Layout, from: IVec2, to: IVec2) -> Self {
        LineTracer {
            layout,
            pos: from,
            to,
            from_center: layout.center(from),
            to_center: layout.center(to),
            steps: layout.dist(from, to),
            i: 0,
        }
    }

    /// Walk the line while `is_clear` accepts cells, return whether the
    /// target was reached.
    pub fn is_full_trace(mut self, mut is_clear: impl FnMut(IVec2) -> bool) -> bool {
        let steps = self.steps;
        let mut n = 0;
        for p in self.by_ref() {
            if !is_clear(p) {
                return false;
            }
            n += 1;
        }
        n == steps
    }
}

impl Iterator for LineTracer {
    type Item = IVec2;

    fn next(&mut self) -> Option<Self::Item> {
        if self.i >= self.steps {
            return None;
        }
        self.i += 1;

        let target = self
            .from_center
            .lerp(self.to_center, self.i as f32 / self.steps as f32);
        let remaining = self.steps - self.i;
        let (layout, to) = (self.layout, self.to);

        let next = layout
            .neighbors(self.pos)
            .filter(|&p| layout.dist(p, to) == remaining)
            .min_by(|a, b| {
                let da = layout.center(*a).distance_squared(target);
                let db = layout.center(*b).distance_squared(target);
                da.total_cmp(&db)
            })?;

        self.pos = next;
        Some(next)
    }
}
