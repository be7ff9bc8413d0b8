//! Mutual critter visibility.
//!
//! Every critter keeps the set of critters it sees and the inverse set of
//! critters that see it. The two are always updated together under both
//! critters' relation locks, so `a` is in `b.observers` exactly when `b` is
//! in `a.visible`. Seeing is not symmetric, a sneaking critter can see an
//! observer that doesn't see it back.
use std::sync::MutexGuard;

use util::Snapshot;

use crate::{critter::VisSets, prelude::*};

/// Geometry of one side of a visibility check.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Viewer {
    pub pos: IVec2,
    pub dir: i32,
    pub look: i32,
    /// Sneak coefficient if the critter is in hidden mode.
    pub sneak: Option<i32>,
}

impl Viewer {
    fn new(cr: &Critter, cfg: &Config) -> Self {
        let look = cr.look(cfg);
        let sneak = cr.is_hidden().then(|| cr.sneak_coefficient(cfg));
        cr.with(|s| Viewer {
            pos: s.pos,
            dir: s.dir,
            look,
            sneak,
        })
    }
}

/// Look radius after the facing penalty.
fn directed_look(cfg: &Config, layout: Layout, look: i32, dir: i32, bearing: i32) -> i32 {
    if !cfg.look_checks.contains(LookChecks::DIR) {
        return look;
    }
    let i = layout.deviation(dir, bearing);
    look - look * cfg.look_dir[i] / 100
}

/// Radius within which an observer with radius `look` spots `target`.
///
/// `deviation` is how far off the observer's facing the target is.
fn effective_radius(cfg: &Config, look: i32, target: &Viewer, deviation: usize) -> i32 {
    let vis = match target.sneak {
        Some(mut sneak) => {
            if cfg.look_checks.contains(LookChecks::SNEAK_DIR) {
                sneak -= sneak * cfg.look_sneak_dir[deviation] / 100;
            }
            sneak /= cfg.sneak_divider.max(1);
            look - sneak.max(0)
        }
        None => look,
    };
    vis.max(cfg.look_minimum)
}

/// Built-in visibility geometry, returns whether `a` sees `b` and whether
/// `b` sees `a`.
///
/// `trace_clear` is only called when the critters are within sight range.
pub(crate) fn mutual_visibility(
    cfg: &Config,
    layout: Layout,
    a: &Viewer,
    b: &Viewer,
    trace_clear: impl FnOnce() -> bool,
) -> (bool, bool) {
    let dist = layout.dist(a.pos, b.pos);
    let bearing = layout.far_dir(a.pos, b.pos);

    let look_a = directed_look(cfg, layout, a.look, a.dir, bearing);
    let look_b = directed_look(cfg, layout, b.look, b.dir, layout.opposite(bearing));

    if dist > look_a && dist > look_b {
        return (false, false);
    }
    if cfg.look_checks.contains(LookChecks::TRACE) && !trace_clear() {
        return (false, false);
    }

    let a_sees =
        effective_radius(cfg, look_a, b, layout.deviation(a.dir, bearing)) >= dist;
    let back = layout.far_dir(b.pos, a.pos);
    let b_sees =
        effective_radius(cfg, look_b, a, layout.deviation(b.dir, back)) >= dist;

    (a_sees, b_sees)
}

/// Lock the relation sets of two critters, always in id order.
fn lock_pair<'a>(
    a: &'a Critter,
    b: &'a Critter,
) -> (MutexGuard<'a, VisSets>, MutexGuard<'a, VisSets>) {
    debug_assert!(a.id != b.id);
    if a.id < b.id {
        let ga = a.vis.lock().unwrap();
        let gb = b.vis.lock().unwrap();
        (ga, gb)
    } else {
        let gb = b.vis.lock().unwrap();
        let ga = a.vis.lock().unwrap();
        (ga, gb)
    }
}

impl Critter {
    /// Start seeing `other`, return whether anything changed.
    pub fn add_visible(&self, other: &Critter) -> bool {
        if self.id == other.id {
            return false;
        }
        let (mut me, mut them) = lock_pair(self, other);
        if !me.visible.insert(other.id) {
            return false;
        }
        them.observers.insert(self.id);
        me.version += 1;
        them.version += 1;
        true
    }

    /// Stop seeing `other`, return whether anything changed.
    pub fn remove_visible(&self, other: &Critter) -> bool {
        if self.id == other.id {
            return false;
        }
        let (mut me, mut them) = lock_pair(self, other);
        if !me.visible.shift_remove(&other.id) {
            return false;
        }
        them.observers.shift_remove(&self.id);
        me.version += 1;
        them.version += 1;
        true
    }

    pub fn sees(&self, id: CritterId) -> bool {
        self.vis.lock().unwrap().visible.contains(&id)
    }

    pub fn is_seen_by(&self, id: CritterId) -> bool {
        self.vis.lock().unwrap().observers.contains(&id)
    }

    pub fn visible_ids(&self) -> Vec<CritterId> {
        self.vis.lock().unwrap().visible.iter().copied().collect()
    }

    pub fn observer_ids(&self) -> Vec<CritterId> {
        self.vis.lock().unwrap().observers.iter().copied().collect()
    }

    /// Members of a secondary distance set.
    pub fn dist_set(&self, n: usize) -> Vec<CritterId> {
        let mut ret: Vec<CritterId> =
            self.vis.lock().unwrap().dist[n].iter().copied().collect();
        ret.sort();
        ret
    }

    /// Apply a visibility decision of this critter seeing `other`, notify on
    /// change.
    fn set_seeing(&self, r: &Runtime, other: &Critter, sees: bool) {
        if sees {
            if self.add_visible(other) {
                self.send(r, other.add_packet(false));
                r.raise(&Event::CritterShow {
                    critter: self.id,
                    shown: other.id,
                });
            }
        } else if self.remove_visible(other) {
            self.send(r, Packet::RemoveCritter { id: other.id });
            r.raise(&Event::CritterHide {
                critter: self.id,
                hidden: other.id,
            });
        }
    }

    /// Update the secondary distance sets of this critter for `other`.
    fn update_dist_sets(&self, r: &Runtime, other: &Critter, dist: i32, bound: [bool; 3]) {
        let thresholds = self.with(|s| s.show_cr_dist);
        for n in 0..3 {
            if thresholds[n] <= 0 || !bound[n] {
                continue;
            }
            let inside = thresholds[n] >= dist;
            let changed = {
                let mut vis = self.vis.lock().unwrap();
                if inside {
                    vis.dist[n].insert(other.id)
                } else {
                    vis.dist[n].remove(&other.id)
                }
            };
            if changed {
                r.raise(&if inside {
                    Event::show_dist(n, self.id, other.id)
                } else {
                    Event::hide_dist(n, self.id, other.id)
                });
            }
        }
    }

    /// Ask the script whether each side sees the other.
    fn script_look(&self, r: &Runtime, map: &Map, other: &Critter) -> Option<(bool, bool)> {
        let self_sees = r.check(&Event::CheckLook {
            map: map.id,
            observer: self.id,
            target: other.id,
        });
        let other_sees = r.check(&Event::CheckLook {
            map: map.id,
            observer: other.id,
            target: self.id,
        });
        match (self_sees, other_sees) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => {
                log::debug!("{}: look script failed for {}, using geometry", self.id, other.id);
                None
            }
        }
    }

    /// Recompute the visibility relations between this critter and every
    /// other critter on its map.
    pub fn process_visible_critters(&self, r: &Runtime) {
        if self.is_destroyed() {
            return;
        }

        let Some(map_id) = self.map_id() else {
            self.show_group(r);
            return;
        };
        let Some(map) = r.map(map_id) else {
            log::warn!("{}: visibility pass on missing {map_id}", self.id);
            return;
        };

        let cfg = &r.config;
        let layout = map.layout();
        let use_script = cfg.look_checks.contains(LookChecks::SCRIPT)
            && r.is_bound(EventKind::CheckLook);
        let dist_bound: [bool; 3] =
            std::array::from_fn(|n| r.is_bound(EventKind::show_dist(n)));
        let me = Viewer::new(self, cfg);

        for other in map.critters(FindType::ALL, true) {
            if other.id == self.id || other.is_destroyed() {
                continue;
            }
            let them = Viewer::new(&other, cfg);

            let decided = if use_script {
                self.script_look(r, &map, &other)
            } else {
                None
            };
            let (self_sees, other_sees) = decided.unwrap_or_else(|| {
                mutual_visibility(cfg, layout, &me, &them, || {
                    map.is_trace_clear(me.pos, them.pos)
                })
            });

            self.set_seeing(r, &other, self_sees);
            other.set_seeing(r, self, other_sees);

            let dist = layout.dist(me.pos, them.pos);
            self.update_dist_sets(r, &other, dist, dist_bound);
            other.update_dist_sets(r, self, dist, dist_bound);
        }
    }

    /// Show a critter on the global map its travel group.
    fn show_group(&self, r: &Runtime) {
        if !self.is_player() {
            return;
        }
        for id in self.with(|s| s.group.clone()) {
            if id == self.id {
                self.send(r, self.add_packet(true));
                self.send(r, Packet::AddAllItems);
            } else if let Some(cr) = r.critter(id) {
                self.send(r, cr.add_packet(false));
            }
        }
    }

    /// Sever every visibility relation, in both directions.
    ///
    /// Must be called before the critter leaves its map or is destroyed.
    pub fn clear_visible(&self, r: &Runtime) {
        for id in self.observer_ids() {
            if let Some(other) = r.critter(id) {
                if other.remove_visible(self) {
                    other.send(r, Packet::RemoveCritter { id: self.id });
                }
            }
        }
        for id in self.visible_ids() {
            if let Some(other) = r.critter(id) {
                self.remove_visible(&other);
            }
        }

        {
            let mut vis = self.vis.lock().unwrap();
            vis.visible.clear();
            vis.observers.clear();
            for set in vis.dist.iter_mut() {
                set.clear();
            }
            vis.version += 1;
        }
        self.vis_items.lock().unwrap().clear();
    }

    fn relation_snapshot(
        &self,
        r: &Runtime,
        observers: bool,
        find: FindType,
    ) -> Snapshot<Vec<CritterRef>> {
        let (version, ids) = {
            let vis = self.vis.lock().unwrap();
            let set = if observers {
                &vis.observers
            } else {
                &vis.visible
            };
            (vis.version, set.iter().copied().collect::<Vec<_>>())
        };
        Snapshot {
            version,
            items: ids
                .into_iter()
                .filter_map(|id| r.critter(id))
                .filter(|cr| cr.check_find(find))
                .collect(),
        }
    }

    fn relation(
        &self,
        r: &Runtime,
        observers: bool,
        find: FindType,
        sync_lock: bool,
    ) -> Vec<CritterRef> {
        let mut read = || self.relation_snapshot(r, observers, find);
        if !sync_lock {
            return read().items;
        }
        Snapshot::verified(&mut read, &mut |critters: &Vec<CritterRef>| {
            for cr in critters {
                cr.sync_lock();
            }
        })
        .items
    }

    /// Critters this critter sees.
    pub fn visible_critters(
        &self,
        r: &Runtime,
        find: FindType,
        sync_lock: bool,
    ) -> Vec<CritterRef> {
        self.relation(r, false, find, sync_lock)
    }

    /// Critters that see this critter.
    pub fn observers(
        &self,
        r: &Runtime,
        find: FindType,
        sync_lock: bool,
    ) -> Vec<CritterRef> {
        self.relation(r, true, find, sync_lock)
    }

    /// A critter this critter currently sees.
    pub fn crit_self(
        &self,
        r: &Runtime,
        id: CritterId,
        sync_lock: bool,
    ) -> Option<CritterRef> {
        if !self.sees(id) {
            return None;
        }
        let cr = r.critter(id)?;
        if sync_lock {
            cr.sync_lock();
            if !self.sees(id) {
                return self.crit_self(r, id, sync_lock);
            }
        }
        Some(cr)
    }

    /// Send a one-off view of a map as seen from `pos` facing `dir`.
    ///
    /// Relation sets are left alone.
    pub fn view_map(&self, r: &Runtime, map: &Map, look: i32, pos: IVec2, dir: i32) {
        if self.is_destroyed() {
            return;
        }
        let cfg = &r.config;
        let layout = map.layout();

        self.send(
            r,
            Packet::GameInfo {
                map: Some(map.id),
                turn_based: map.is_turn_based(),
            },
        );

        let use_script = cfg.look_checks.contains(LookChecks::SCRIPT)
            && r.is_bound(EventKind::CheckLook);

        for other in map.critters(FindType::ALL, true) {
            if other.id == self.id || other.is_destroyed() {
                continue;
            }

            if use_script {
                let seen = r.check(&Event::CheckLook {
                    map: map.id,
                    observer: self.id,
                    target: other.id,
                });
                if let Some(seen) = seen {
                    if seen {
                        self.send(r, other.add_packet(false));
                    }
                    continue;
                }
            }

            let target = Viewer::new(&other, cfg);
            let dist = layout.dist(pos, target.pos);
            let bearing = layout.far_dir(pos, target.pos);
            let look = directed_look(cfg, layout, look, dir, bearing);
            if dist > look {
                continue;
            }
            if cfg.look_checks.contains(LookChecks::TRACE)
                && !map.is_trace_clear(pos, target.pos)
            {
                continue;
            }
            let vis = effective_radius(cfg, look, &target, layout.deviation(dir, bearing));
            if vis >= dist {
                self.send(r, other.add_packet(false));
            }
        }

        for item in map.items() {
            if item.is(ItemFlags::HIDDEN) {
                continue;
            }
            if item.is(ItemFlags::ALWAYS_VIEW)
                || self.can_see_item_from(r, map, &item, pos, look)
            {
                self.send(r, Packet::add_item(&item));
            }
        }
    }
}
