//! Map state: critter and item collections and the cell flag grid.
use std::{
    fmt,
    sync::{Arc, Mutex, RwLock},
};

use hexgrid::LineTracer;
use serde::{Deserialize, Serialize};
use util::{Snapshot, SyncObject};

use crate::{
    hex_grid::HexGrid, prelude::*, turn_based::TurnState, MAP_LOOP_COUNT,
    TB_BATTLE_TIMEOUT,
};

#[derive(
    Copy,
    Clone,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Debug,
    Serialize,
    Deserialize,
)]
pub struct MapId(pub u32);

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map#{}", self.0)
    }
}

pub type MapRef = Arc<Map>;

#[derive(Default)]
struct Content {
    /// Bumped whenever the critter collections change.
    version: u64,
    critters: Vec<CritterRef>,
    players: Vec<CritterRef>,
    npcs: Vec<CritterRef>,

    items: IndexMap<ItemId, Item>,
    items_by_hex: HashMap<IVec2, Vec<ItemId>>,
    /// Items whose footprint covers the cell.
    block_lines_by_hex: HashMap<IVec2, Vec<ItemId>>,
}

impl Content {
    fn items_at(&self, p: IVec2) -> impl Iterator<Item = &Item> + '_ {
        self.items_by_hex
            .get(&p)
            .into_iter()
            .flatten()
            .filter_map(|id| self.items.get(id))
    }

    /// Rebuild the item derived flags of a cell from the items on it.
    fn recache_hex_flags(&self, grid: &mut HexGrid, p: IVec2) {
        let mut flags = HexFlags::empty();
        for item in self.items_at(p) {
            if !item.is(ItemFlags::NO_BLOCK) {
                flags |= HexFlags::BLOCK_ITEM;
            }
            if !item.is(ItemFlags::SHOOT_THRU) {
                flags |= HexFlags::NRAKE_ITEM;
            }
            if item.is(ItemFlags::GAG) {
                flags |= HexFlags::GAG_ITEM;
            }
            if item.is(ItemFlags::TRAP | ItemFlags::TRIGGER) {
                flags |= HexFlags::WALK_ITEM;
            }
        }

        // Footprints block whatever lies on the cell.
        if let Some(ids) = self.block_lines_by_hex.get(&p) {
            flags |= HexFlags::BLOCK_ITEM;
            if ids.iter().any(|id| {
                self.items
                    .get(id)
                    .is_some_and(|a| !a.is(ItemFlags::SHOOT_THRU))
            }) {
                flags |= HexFlags::NRAKE_ITEM;
            }
        }

        grid.unset(p, HexFlags::ITEM_CACHE);
        grid.set(p, flags);
    }

    fn footprint(layout: Layout, grid: &HexGrid, item: &Item) -> Vec<IVec2> {
        layout
            .block_line_cells(item.pos, &item.block_lines)
            .into_iter()
            .filter(|&p| grid.contains(p))
            .collect()
    }

    fn index_item(&mut self, layout: Layout, grid: &mut HexGrid, item: Item) {
        let (id, pos) = (item.id, item.pos);
        let footprint = Self::footprint(layout, grid, &item);
        self.items.insert(id, item);
        self.items_by_hex.entry(pos).or_default().push(id);
        self.recache_hex_flags(grid, pos);

        for p in footprint {
            self.block_lines_by_hex.entry(p).or_default().push(id);
            self.recache_hex_flags(grid, p);
        }
    }

    fn unindex_item(
        &mut self,
        layout: Layout,
        grid: &mut HexGrid,
        id: ItemId,
    ) -> Option<Item> {
        let item = self.items.shift_remove(&id)?;

        if let Some(ids) = self.items_by_hex.get_mut(&item.pos) {
            ids.retain(|&a| a != id);
            if ids.is_empty() {
                self.items_by_hex.remove(&item.pos);
            }
        }
        self.recache_hex_flags(grid, item.pos);

        for p in Self::footprint(layout, grid, &item) {
            if let Some(ids) = self.block_lines_by_hex.get_mut(&p) {
                ids.retain(|&a| a != id);
                if ids.is_empty() {
                    self.block_lines_by_hex.remove(&p);
                }
            }
            self.recache_hex_flags(grid, p);
        }

        Some(item)
    }
}

/// Live map instance.
///
/// Lock order is `content`, then `grid`, then critter state. Nothing is held
/// while calling scripts or the network sender.
pub struct Map {
    pub id: MapId,
    pub proto: Arc<ProtoMap>,
    layout: Layout,
    pub(crate) sync: SyncObject,
    content: Mutex<Content>,
    grid: RwLock<HexGrid>,
    pub(crate) turn: Mutex<TurnState>,
    loop_ticks: Mutex<[Instant; MAP_LOOP_COUNT]>,
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("id", &self.id)
            .field("proto", &self.proto.name)
            .finish_non_exhaustive()
    }
}

impl Map {
    pub(crate) fn new(
        id: MapId,
        proto: Arc<ProtoMap>,
        layout: Layout,
        now: Instant,
    ) -> Self {
        let grid = HexGrid::new(&proto);
        Map {
            id,
            proto,
            layout,
            sync: Default::default(),
            content: Default::default(),
            grid: RwLock::new(grid),
            turn: Default::default(),
            loop_ticks: Mutex::new([now; MAP_LOOP_COUNT]),
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn size(&self) -> IVec2 {
        self.proto.size
    }

    pub fn contains(&self, p: IVec2) -> bool {
        self.grid.read().unwrap().contains(p)
    }

    pub fn sync_lock(&self) {
        self.sync.lock();
    }

    /// Effective flags of a cell, `None` outside the map.
    pub fn hex_flags(&self, p: IVec2) -> Option<HexFlags> {
        self.grid.read().unwrap().get(p)
    }

    pub fn is_hex_passed(&self, p: IVec2) -> bool {
        self.hex_flags(p)
            .is_some_and(|f| !f.intersects(HexFlags::NO_WAY))
    }

    pub fn is_hex_raked(&self, p: IVec2) -> bool {
        self.hex_flags(p)
            .is_some_and(|f| !f.intersects(HexFlags::NO_SHOOT))
    }

    pub fn is_hex_trigger(&self, p: IVec2) -> bool {
        self.hex_flags(p)
            .is_some_and(|f| f.intersects(HexFlags::TRIGGER | HexFlags::WALK_ITEM))
    }

    /// Whether a footprint of `radius` centered on `p` fits.
    ///
    /// Footprint cells outside the map don't count as blocked.
    pub fn is_hexes_passed(&self, p: IVec2, radius: i32) -> bool {
        if !self.is_hex_passed(p) {
            return false;
        }
        let grid = self.grid.read().unwrap();
        self.layout.area(p, radius).all(|p| {
            grid.get(p).map_or(true, |f| !f.intersects(HexFlags::NO_WAY))
        })
    }

    /// Whether a critter with footprint `multihex` can move onto `p` while
    /// heading in `dir`.
    ///
    /// Only the cells entering the footprint are checked, the ones it
    /// already covers are assumed passable.
    pub fn is_move_passed(&self, p: IVec2, dir: i32, multihex: i32) -> bool {
        let layout = self.layout;
        if multihex <= 0 {
            return self.is_hex_passed(p);
        }

        // Leading cell of the footprint.
        let mut lead = p;
        for _ in 0..multihex {
            lead = layout.step(lead, dir);
        }
        if !self.is_hex_passed(lead) {
            return false;
        }

        // Walk along the leading edge both ways.
        let corner = layout == Layout::Square && dir % 2 != 0;
        let steps = if corner { multihex * 2 } else { multihex };
        let n = layout.dirs();
        let (mut cw, mut ccw) = match layout {
            Layout::Hex => ((dir + 2) % n, (dir + 4) % n),
            Layout::Square => ((dir + 2) % n, (dir + 6) % n),
        };
        if corner {
            cw = (cw + 1) % n;
            ccw = (ccw + 7) % n;
        }

        for edge_dir in [cw, ccw] {
            let mut q = lead;
            for _ in 0..steps {
                q = layout.step(q, edge_dir);
                if !self.is_hex_passed(q) {
                    return false;
                }
            }
        }
        true
    }

    /// Whether line of sight between two cells is unobstructed.
    ///
    /// The end cells themselves don't block.
    pub fn is_trace_clear(&self, from: IVec2, to: IVec2) -> bool {
        let grid = self.grid.read().unwrap();
        LineTracer::new(self.layout, from, to).is_full_trace(|p| {
            p == to || grid.get(p).is_some_and(|f| !f.intersects(HexFlags::NO_SHOOT))
        })
    }

    /// Find a free spot for a footprint of `multihex` at or around `p`.
    pub fn find_start_hex(
        &self,
        r: &Runtime,
        p: IVec2,
        multihex: i32,
        seek_radius: i32,
        skip_unsafe: bool,
    ) -> Option<IVec2> {
        let ok = |p: IVec2| {
            self.contains(p)
                && self.is_hexes_passed(p, multihex)
                && !(skip_unsafe && self.is_hex_trigger(p))
        };
        if ok(p) {
            return Some(p);
        }
        let seek_radius = seek_radius.min(r.config.max_hex_offset);
        self.layout.area(p, seek_radius).find(|&p| ok(p))
    }

    pub(crate) fn set_flag_critter(
        &self,
        r: &Runtime,
        p: IVec2,
        multihex: i32,
        dead: bool,
    ) {
        let mut grid = self.grid.write().unwrap();
        if !grid.contains(p) {
            log::warn!("{}: critter flag outside map at {p}", self.id);
            return;
        }
        if dead {
            grid.set(p, HexFlags::DEAD_CRITTER);
            return;
        }
        grid.set(p, HexFlags::CRITTER);
        let multihex = multihex.min(r.config.max_hex_offset);
        for q in self.layout.area(p, multihex) {
            if grid.contains(q) {
                grid.set(q, HexFlags::CRITTER);
            }
        }
    }

    pub(crate) fn unset_flag_critter(
        &self,
        r: &Runtime,
        p: IVec2,
        multihex: i32,
        dead: bool,
    ) {
        if dead {
            // Another corpse may still lie here.
            let corpses = self
                .content
                .lock()
                .unwrap()
                .critters
                .iter()
                .filter(|cr| cr.with(|s| s.is_dead() && s.pos == p))
                .count();
            if corpses <= 1 {
                let mut grid = self.grid.write().unwrap();
                if grid.contains(p) {
                    grid.unset(p, HexFlags::DEAD_CRITTER);
                }
            }
            return;
        }

        let mut grid = self.grid.write().unwrap();
        if !grid.contains(p) {
            log::warn!("{}: critter flag outside map at {p}", self.id);
            return;
        }
        grid.unset(p, HexFlags::CRITTER);
        let multihex = multihex.min(r.config.max_hex_offset);
        for q in self.layout.area(p, multihex) {
            if grid.contains(q) {
                grid.unset(q, HexFlags::CRITTER);
            }
        }
    }

    /// Put a critter on the map at its current position.
    pub fn add_critter(&self, r: &Runtime, cr: &CritterRef) -> bool {
        {
            let mut c = self.content.lock().unwrap();
            if c.critters.iter().any(|a| a.id == cr.id) {
                log::warn!("{}: {} added twice", self.id, cr.id);
                return false;
            }
            c.critters.push(cr.clone());
            if cr.is_player() {
                c.players.push(cr.clone());
            } else {
                c.npcs.push(cr.clone());
            }
            c.version += 1;
        }

        let turn_based = self.is_turn_based();
        let (pos, multihex, dead) = cr.with_mut(|s| {
            s.map = Some(self.id);
            s.battle_timeout = turn_based.then_some(TB_BATTLE_TIMEOUT);
            (s.pos, s.multihex, s.is_dead())
        });
        self.set_flag_critter(r, pos, multihex, dead);

        r.raise(&Event::MapInCritter {
            map: self.id,
            critter: cr.id,
        });
        true
    }

    /// Take a critter off the map.
    pub fn erase_critter(&self, r: &Runtime, cr: &Critter) -> bool {
        if !self.content.lock().unwrap().critters.iter().any(|a| a.id == cr.id) {
            log::warn!("{}: erasing missing {}", self.id, cr.id);
            return false;
        }

        let (pos, multihex, dead) = cr.with(|s| (s.pos, s.multihex, s.is_dead()));
        self.unset_flag_critter(r, pos, multihex, dead);

        {
            let mut c = self.content.lock().unwrap();
            c.critters.retain(|a| a.id != cr.id);
            c.players.retain(|a| a.id != cr.id);
            c.npcs.retain(|a| a.id != cr.id);
            c.version += 1;
        }

        cr.with_mut(|s| {
            s.map = None;
            s.battle_timeout = None;
        });

        r.raise(&Event::MapOutCritter {
            map: self.id,
            critter: cr.id,
        });
        r.request_gc();
        true
    }

    /// Critters on the map that match the filter.
    ///
    /// With `sync_lock`, every returned critter is sync locked and the list
    /// is guaranteed to still be current after the locking.
    pub fn critters(&self, find: FindType, sync_lock: bool) -> Vec<CritterRef> {
        self.snapshot(|c| &c.critters, find, sync_lock)
    }

    pub fn players(&self, sync_lock: bool) -> Vec<CritterRef> {
        self.snapshot(|c| &c.players, FindType::ALL, sync_lock)
    }

    pub fn npcs(&self, find: FindType, sync_lock: bool) -> Vec<CritterRef> {
        self.snapshot(|c| &c.npcs, find, sync_lock)
    }

    pub fn critter_count(&self) -> usize {
        self.content.lock().unwrap().critters.len()
    }

    fn snapshot(
        &self,
        list: impl Fn(&Content) -> &Vec<CritterRef>,
        find: FindType,
        sync_lock: bool,
    ) -> Vec<CritterRef> {
        let mut read = || {
            let c = self.content.lock().unwrap();
            Snapshot {
                version: c.version,
                items: list(&c)
                    .iter()
                    .filter(|cr| cr.check_find(find))
                    .cloned()
                    .collect::<Vec<_>>(),
            }
        };

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

    pub fn critter(&self, id: CritterId, sync_lock: bool) -> Option<CritterRef> {
        let find = || {
            self.content
                .lock()
                .unwrap()
                .critters
                .iter()
                .find(|cr| cr.id == id)
                .cloned()
        };

        let cr = find()?;
        if sync_lock {
            cr.sync_lock();
            // It may have left while we waited for the lock.
            if find().is_none() {
                return self.critter(id, sync_lock);
            }
        }
        Some(cr)
    }

    /// Critter standing on a cell, covering it with its footprint counts.
    pub fn hex_critter(&self, p: IVec2, dead: bool) -> Option<CritterRef> {
        let flag = if dead {
            HexFlags::DEAD_CRITTER
        } else {
            HexFlags::CRITTER
        };
        if !self.hex_flags(p)?.contains(flag) {
            return None;
        }

        let layout = self.layout;
        self.critters(FindType::ALL, false).into_iter().find(|cr| {
            cr.with(|s| {
                s.is_dead() == dead && layout.dist(s.pos, p) <= s.multihex.max(0)
            })
        })
    }

    pub fn critters_in_radius(
        &self,
        p: IVec2,
        radius: i32,
        find: FindType,
    ) -> Vec<CritterRef> {
        let layout = self.layout;
        self.critters(find, false)
            .into_iter()
            .filter(|cr| cr.with(|s| layout.dist(p, s.pos) <= radius + s.multihex))
            .collect()
    }

    pub fn item(&self, id: ItemId) -> Option<Item> {
        self.content.lock().unwrap().items.get(&id).cloned()
    }

    pub fn items(&self) -> Vec<Item> {
        self.content.lock().unwrap().items.values().cloned().collect()
    }

    pub fn items_at(&self, p: IVec2) -> Vec<Item> {
        self.content.lock().unwrap().items_at(p).cloned().collect()
    }

    /// Items within `radius` of `p`, optionally only of one prototype.
    pub fn items_at_radius(
        &self,
        p: IVec2,
        radius: i32,
        pid: Option<u16>,
    ) -> Vec<Item> {
        let layout = self.layout;
        self.content
            .lock()
            .unwrap()
            .items
            .values()
            .filter(|a| pid.map_or(true, |pid| a.pid == pid))
            .filter(|a| layout.dist(a.pos, p) <= radius)
            .cloned()
            .collect()
    }

    pub fn items_by_pid(&self, pid: u16) -> Vec<Item> {
        self.content
            .lock()
            .unwrap()
            .items
            .values()
            .filter(|a| a.pid == pid)
            .cloned()
            .collect()
    }

    /// Traps and triggers on a cell.
    ///
    /// A stale walk flag on a cell with none left gets cleared.
    pub fn traps_at(&self, p: IVec2) -> Vec<Item> {
        let traps: Vec<Item> = self
            .items_at(p)
            .into_iter()
            .filter(|a| a.is(ItemFlags::TRAP | ItemFlags::TRIGGER))
            .collect();
        if traps.is_empty() {
            let mut grid = self.grid.write().unwrap();
            if grid.contains(p) {
                grid.unset(p, HexFlags::WALK_ITEM);
            }
        }
        traps
    }

    /// Place an item on the map and show it to everyone who can see it.
    pub fn add_item(
        &self,
        r: &Runtime,
        item: Item,
        dropper: Option<CritterId>,
    ) -> bool {
        let item_id = item.id;
        {
            let mut c = self.content.lock().unwrap();
            if c.items.contains_key(&item_id) {
                log::warn!("{}: {item_id} is already on the map", self.id);
                return false;
            }
            let mut grid = self.grid.write().unwrap();
            if !grid.contains(item.pos) {
                log::warn!("{}: {item_id} placed outside map at {}", self.id, item.pos);
                return false;
            }
            c.index_item(self.layout, &mut grid, item.clone());
        }

        for cr in self.critters(FindType::ALL, false) {
            if item.is(ItemFlags::HIDDEN) && !item.is(ItemFlags::ALWAYS_VIEW) {
                continue;
            }
            if !item.is(ItemFlags::ALWAYS_VIEW) && !cr.can_see_item(r, self, &item) {
                continue;
            }
            if cr.add_vis_item(item_id) {
                cr.send(r, Packet::add_item(&item));
                r.raise(&Event::CritterShowItemOnMap {
                    critter: cr.id,
                    item: item_id,
                    added: true,
                    dropper,
                });
            }
        }
        true
    }

    /// Take an item off the map and hide it from everyone who saw it.
    pub fn erase_item(
        &self,
        r: &Runtime,
        id: ItemId,
        picker: Option<CritterId>,
    ) -> Option<Item> {
        let item = {
            let mut c = self.content.lock().unwrap();
            let mut grid = self.grid.write().unwrap();
            c.unindex_item(self.layout, &mut grid, id)
        };
        let Some(item) = item else {
            log::warn!("{}: erasing missing {id}", self.id);
            return None;
        };

        for cr in self.critters(FindType::ALL, false) {
            if cr.del_vis_item(id) {
                cr.send(r, Packet::EraseItemFromMap { id });
                r.raise(&Event::CritterHideItemOnMap {
                    critter: cr.id,
                    item: id,
                    removed: true,
                    picker,
                });
            }
        }
        Some(item)
    }

    /// Change an item in place and update who sees it.
    pub fn update_item(
        &self,
        r: &Runtime,
        id: ItemId,
        f: impl FnOnce(&mut Item),
    ) -> bool {
        {
            let mut c = self.content.lock().unwrap();
            let mut grid = self.grid.write().unwrap();
            let Some(mut item) = c.unindex_item(self.layout, &mut grid, id) else {
                return false;
            };
            let old_pos = item.pos;
            f(&mut item);
            item.id = id;
            if !grid.contains(item.pos) {
                log::warn!("{}: {id} moved outside map to {}", self.id, item.pos);
                item.pos = old_pos;
            }
            c.index_item(self.layout, &mut grid, item);
        }
        self.change_view_item(r, id);
        true
    }

    /// Re-evaluate every critter's view of one item after the item's
    /// visibility attributes changed.
    pub fn change_view_item(&self, r: &Runtime, id: ItemId) {
        let Some(item) = self.item(id) else {
            return;
        };

        for cr in self.critters(FindType::ALL, false) {
            if cr.has_vis_item(id) {
                let keep = !item.is(ItemFlags::HIDDEN)
                    && (item.is(ItemFlags::ALWAYS_VIEW) || cr.can_see_item(r, self, &item));
                if !keep {
                    cr.del_vis_item(id);
                    cr.send(r, Packet::EraseItemFromMap { id });
                    r.raise(&Event::CritterHideItemOnMap {
                        critter: cr.id,
                        item: id,
                        removed: false,
                        picker: None,
                    });
                }
            } else if !item.is(ItemFlags::HIDDEN) || item.is(ItemFlags::ALWAYS_VIEW) {
                if !item.is(ItemFlags::ALWAYS_VIEW) && !cr.can_see_item(r, self, &item) {
                    continue;
                }
                cr.add_vis_item(id);
                cr.send(r, Packet::add_item(&item));
                r.raise(&Event::CritterShowItemOnMap {
                    critter: cr.id,
                    item: id,
                    added: false,
                    dropper: None,
                });
            }
        }
    }

    /// Step a critter one cell and update what it and others see.
    pub fn move_critter(&self, r: &Runtime, cr: &Critter, dir: i32) -> bool {
        if !(0..self.layout.dirs()).contains(&dir) {
            return false;
        }
        let (pos, multihex, cond) = cr.with(|s| (s.pos, s.multihex, s.cond));
        if cond != crate::Cond::Life || cr.map_id() != Some(self.id) {
            return false;
        }
        let dest = self.layout.step(pos, dir);
        if !self.contains(dest) || !self.is_move_passed(dest, dir, multihex) {
            return false;
        }

        self.unset_flag_critter(r, pos, multihex, false);
        cr.with_mut(|s| {
            s.pos = dest;
            s.dir = dir;
        });
        self.set_flag_critter(r, dest, multihex, false);

        cr.process_visible_critters(r);
        cr.process_visible_items(r);
        true
    }

    /// Run the per-tick map logic.
    pub fn process(&self, r: &Runtime) {
        let now = r.now();
        let mut fired = Vec::new();
        {
            let mut ticks = self.loop_ticks.lock().unwrap();
            for (i, &period) in self.proto.loop_times.iter().enumerate() {
                if period > 0 && now - ticks[i] >= period {
                    ticks[i] = now;
                    fired.push(i as u32 + 1);
                }
            }
        }
        for index in fired {
            r.raise(&Event::MapLoop { map: self.id, index });
        }

        if self.is_turn_based() {
            self.process_turn_based(r);
        }
    }
}

#[cfg(test)]
mod test {
    use hexgrid::BlockLine;

    use super::*;
    use crate::{test_util::*, ScriptTable};

    #[test]
    fn critter_collections() {
        let (r, _) = runtime(Config::default());
        let map = open_map(&r, 10, 10);
        let player = player_at(&r, &map, ivec2(2, 2));
        let npc = npc_at(&r, &map, ivec2(5, 5));

        assert_eq!(map.critter_count(), 2);
        assert_eq!(map.players(false), vec![player.clone()]);
        assert_eq!(map.npcs(FindType::ALL, false), vec![npc.clone()]);
        assert!(!map.add_critter(&r, &npc));
        assert!(!map.is_hex_passed(ivec2(5, 5)));
        assert_eq!(map.hex_critter(ivec2(5, 5), false), Some(npc.clone()));

        assert!(map.erase_critter(&r, &npc));
        assert_eq!(map.critter_count(), 1);
        assert!(map.npcs(FindType::ALL, false).is_empty());
        assert_eq!(npc.map_id(), None);
        assert!(map.is_hex_passed(ivec2(5, 5)));
        assert!(!map.erase_critter(&r, &npc));

        assert_eq!(map.critter(player.id, true), Some(player.clone()));
        assert_eq!(map.critter(npc.id, true), None);
        util::release_all();
    }

    #[test]
    fn multihex_footprint() {
        let (r, _) = runtime(Config::default());
        let map = open_map(&r, 12, 12);
        let big = r.spawn(
            CritterKind::Npc,
            CritterState {
                pos: ivec2(5, 5),
                multihex: 1,
                ..Default::default()
            },
        );
        map.add_critter(&r, &big);

        for p in Layout::Hex.neighbors(ivec2(5, 5)) {
            assert!(!map.is_hex_passed(p));
            assert_eq!(map.hex_critter(p, false), Some(big.clone()));
        }
        assert!(map.is_hex_passed(ivec2(5, 8)));
        assert!(!map.is_hexes_passed(ivec2(5, 7), 1));
        assert_eq!(map.critters_in_radius(ivec2(5, 7), 1, FindType::ALL).len(), 1);

        // Stepping south only needs the cells entering the footprint.
        assert!(map.move_critter(&r, &big, 2));
        assert_eq!(big.pos(), ivec2(5, 6));
        assert!(map.is_hex_passed(ivec2(5, 4)));
        assert!(!map.is_hex_passed(ivec2(5, 7)));
    }

    #[test]
    fn corpses_share_a_cell() {
        let (r, _) = runtime(Config::default());
        let map = open_map(&r, 10, 10);
        let a = npc_at(&r, &map, ivec2(3, 3));
        let b = npc_at(&r, &map, ivec2(3, 4));
        a.kill(&r, None);
        assert!(map.is_hex_passed(ivec2(3, 3)));
        assert!(map.hex_critter(ivec2(3, 3), true).is_some());

        b.with_mut(|s| s.pos = ivec2(3, 3));
        b.kill(&r, Some(a.id));
        map.erase_critter(&r, &a);
        assert!(map.hex_flags(ivec2(3, 3)).unwrap().contains(HexFlags::DEAD_CRITTER));
        map.erase_critter(&r, &b);
        assert!(!map.hex_flags(ivec2(3, 3)).unwrap().contains(HexFlags::DEAD_CRITTER));
    }

    #[test]
    fn item_flags_recache() {
        let (r, _) = runtime(Config::default());
        let map = open_map(&r, 10, 10);
        let p = ivec2(4, 4);

        let a = r.new_item(1, p);
        let b = r.new_item(1, p);
        let (a_id, b_id) = (a.id, b.id);
        assert!(map.add_item(&r, a, None));
        assert!(map.add_item(&r, b, None));
        assert!(!map.is_hex_passed(p));
        assert!(!map.is_hex_raked(p));

        assert!(map.erase_item(&r, a_id, None).is_some());
        assert!(!map.is_hex_passed(p));

        assert!(map.erase_item(&r, b_id, None).is_some());
        assert!(map.is_hex_passed(p));
        assert!(map.is_hex_raked(p));
        assert!(map.erase_item(&r, b_id, None).is_none());
    }

    #[test]
    fn item_id_collision() {
        let (r, _) = runtime(Config::default());
        let map = open_map(&r, 10, 10);
        let item = r.new_item(1, ivec2(1, 1));
        assert!(map.add_item(&r, item.clone(), None));
        assert!(!map.add_item(&r, item.clone(), None));
        assert_eq!(map.items().len(), 1);

        let outside = r.new_item(1, ivec2(10, 1));
        assert!(!map.add_item(&r, outside, None));
    }

    #[test]
    fn item_footprint() {
        let (r, _) = runtime(Config::default());
        let map = open_map(&r, 10, 10);
        let mut car = r
            .new_item(2, ivec2(4, 4))
            .with_flags(ItemFlags::SHOOT_THRU | ItemFlags::NO_BLOCK);
        car.block_lines = vec![BlockLine(2, 2)];
        let car_id = car.id;
        map.add_item(&r, car, None);

        // The anchor cell itself neither blocks nor stops shots.
        assert!(map.is_hex_passed(ivec2(4, 4)));
        assert!(!map.is_hex_passed(ivec2(4, 5)));
        assert!(!map.is_hex_passed(ivec2(4, 6)));
        assert!(map.is_hex_raked(ivec2(4, 6)));

        map.update_item(&r, car_id, |a| a.pos = ivec2(6, 4));
        assert!(map.is_hex_passed(ivec2(4, 5)));
        assert!(!map.is_hex_passed(ivec2(6, 6)));

        map.erase_item(&r, car_id, None);
        assert!(map.is_hex_passed(ivec2(6, 6)));
    }

    #[test]
    fn footprint_over_loose_items() {
        let (r, _) = runtime(Config::default());
        let map = open_map(&r, 10, 10);
        let rug = r
            .new_item(1, ivec2(4, 5))
            .with_flags(ItemFlags::NO_BLOCK);
        let rug_id = rug.id;
        assert!(map.add_item(&r, rug, None));
        assert!(map.is_hex_passed(ivec2(4, 5)));
        assert!(!map.is_hex_raked(ivec2(4, 5)));

        let mut car = r
            .new_item(2, ivec2(4, 4))
            .with_flags(ItemFlags::SHOOT_THRU | ItemFlags::NO_BLOCK);
        car.block_lines = vec![BlockLine(2, 2)];
        let car_id = car.id;
        assert!(map.add_item(&r, car, None));

        assert!(!map.is_hex_passed(ivec2(4, 5)));
        assert!(!map.is_hex_passed(ivec2(4, 6)));
        // The rug still stops shots under the car.
        assert!(!map.is_hex_raked(ivec2(4, 5)));
        assert!(map.is_hex_raked(ivec2(4, 6)));

        // Lifting the rug leaves the footprint in place.
        assert!(map.erase_item(&r, rug_id, None).is_some());
        assert!(!map.is_hex_passed(ivec2(4, 5)));
        assert!(map.is_hex_raked(ivec2(4, 5)));

        map.erase_item(&r, car_id, None);
        assert!(map.is_hex_passed(ivec2(4, 5)));
    }

    #[test]
    fn item_queries() {
        let (r, _) = runtime(Config::default());
        let map = open_map(&r, 10, 10);
        let trap = r
            .new_item(7, ivec2(2, 2))
            .with_flags(ItemFlags::TRAP | ItemFlags::NO_BLOCK | ItemFlags::SHOOT_THRU);
        let trap_id = trap.id;
        map.add_item(&r, trap, None);
        map.add_item(&r, r.new_item(8, ivec2(2, 3)), None);
        map.add_item(&r, r.new_item(8, ivec2(8, 8)), None);

        assert!(map.is_hex_trigger(ivec2(2, 2)));
        assert_eq!(map.traps_at(ivec2(2, 2)).len(), 1);
        assert_eq!(map.items_by_pid(8).len(), 2);
        assert_eq!(map.items_at_radius(ivec2(2, 2), 1, None).len(), 2);
        assert_eq!(map.items_at_radius(ivec2(2, 2), 1, Some(8)).len(), 1);

        map.erase_item(&r, trap_id, None);
        assert!(map.traps_at(ivec2(2, 2)).is_empty());
        assert!(!map.is_hex_trigger(ivec2(2, 2)));
    }

    #[test]
    fn movement_and_start_hex() {
        let (r, _) = runtime(Config::default());
        let proto = ProtoMap::from_ascii(
            "walls",
            "
            .....
            .###.
            .....
            ",
        )
        .unwrap();
        let map = r.create_map(proto);
        let cr = npc_at(&r, &map, ivec2(1, 0));

        assert!(!map.move_critter(&r, &cr, 2));
        assert!(map.move_critter(&r, &cr, 3));
        assert_eq!(cr.pos(), ivec2(2, 0));
        assert!(!map.move_critter(&r, &cr, 9));

        assert_eq!(map.find_start_hex(&r, ivec2(0, 0), 0, 0, false), Some(ivec2(0, 0)));
        assert_eq!(map.find_start_hex(&r, ivec2(2, 1), 0, 0, false), None);
        let p = map.find_start_hex(&r, ivec2(2, 1), 0, 2, false).unwrap();
        assert!(map.is_hex_passed(p));
        assert_eq!(Layout::Hex.dist(p, ivec2(2, 1)), 1);

        assert!(!map.is_trace_clear(ivec2(2, 0), ivec2(2, 2)));
        assert!(map.is_trace_clear(ivec2(0, 0), ivec2(0, 2)));
    }

    #[test]
    fn map_loops() {
        let (r, clock) = runtime(Config::default());
        let script = Arc::new(ScriptTable::new().record(EventKind::MapLoop));
        let r = r.with_script(script.clone());
        let mut proto = ProtoMap::new("loops", ivec2(4, 4));
        proto.loop_times[0] = 1_000;
        proto.loop_times[2] = 3_000;
        let map = r.create_map(proto);

        clock.advance(1_000);
        map.process(&r);
        map.process(&r);
        clock.advance(2_000);
        map.process(&r);

        let indices: Vec<u32> = script
            .take_log()
            .into_iter()
            .filter_map(|e| match e {
                Event::MapLoop { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![1, 1, 3]);
    }
}
