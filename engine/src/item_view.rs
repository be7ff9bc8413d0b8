//! Which map items each critter sees.
use crate::prelude::*;

impl Critter {
    pub fn has_vis_item(&self, id: ItemId) -> bool {
        self.vis_items.lock().unwrap().contains(&id)
    }

    /// Return whether the item was newly added.
    pub fn add_vis_item(&self, id: ItemId) -> bool {
        self.vis_items.lock().unwrap().insert(id)
    }

    /// Return whether the item was in the set.
    pub fn del_vis_item(&self, id: ItemId) -> bool {
        self.vis_items.lock().unwrap().remove(&id)
    }

    pub fn vis_item_ids(&self) -> Vec<ItemId> {
        let mut ret: Vec<ItemId> =
            self.vis_items.lock().unwrap().iter().copied().collect();
        ret.sort();
        ret
    }

    /// Whether this critter notices a non-hidden item from where it stands.
    pub fn can_see_item(&self, r: &Runtime, map: &Map, item: &Item) -> bool {
        self.can_see_item_from(r, map, item, self.pos(), self.look(&r.config))
    }

    pub(crate) fn can_see_item_from(
        &self,
        r: &Runtime,
        map: &Map,
        item: &Item,
        pos: IVec2,
        look: i32,
    ) -> bool {
        if item.is(ItemFlags::TRAP)
            && r.config.look_checks.contains(LookChecks::ITEM_SCRIPT)
            && r.is_bound(EventKind::CheckTrapLook)
        {
            if let Some(seen) = r.check(&Event::CheckTrapLook {
                map: map.id,
                critter: self.id,
                item: item.id,
            }) {
                return seen;
            }
        }

        look >= map.layout().dist(pos, item.pos) + item.view_penalty()
    }

    /// Recompute the set of items this critter sees on its map.
    pub fn process_visible_items(&self, r: &Runtime) {
        if self.is_destroyed() {
            return;
        }
        let Some(map) = self.map_id().and_then(|id| r.map(id)) else {
            return;
        };

        for item in map.items() {
            let seen = if item.is(ItemFlags::HIDDEN) {
                continue;
            } else if item.is(ItemFlags::ALWAYS_VIEW) {
                true
            } else {
                self.can_see_item(r, &map, &item)
            };

            if seen {
                if self.add_vis_item(item.id) {
                    self.send(r, Packet::add_item(&item));
                    r.raise(&Event::CritterShowItemOnMap {
                        critter: self.id,
                        item: item.id,
                        added: false,
                        dropper: None,
                    });
                }
            } else if self.del_vis_item(item.id) {
                self.send(r, Packet::EraseItemFromMap { id: item.id });
                r.raise(&Event::CritterHideItemOnMap {
                    critter: self.id,
                    item: item.id,
                    removed: false,
                    picker: None,
                });
            }
        }
    }
}
