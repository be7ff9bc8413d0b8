use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc, Mutex, RwLock,
};

use rand::SeedableRng;
use util::{GameRng, RngExt};

use crate::{prelude::*, Clock, ScriptHost, Sender, SystemClock};

/// Main data container for the server game logic.
///
/// Holds the critter and map arenas and the capabilities the logic talks
/// to the outside world through. Shared between logic threads by reference.
pub struct Runtime {
    pub config: Config,
    clock: Arc<dyn Clock>,
    script: Arc<dyn ScriptHost>,
    pub(crate) net: Arc<dyn Sender>,
    rng: Mutex<GameRng>,
    critters: RwLock<IndexMap<CritterId, CritterRef>>,
    maps: RwLock<IndexMap<MapId, MapRef>>,
    gc_requested: AtomicBool,
    next_critter: AtomicU32,
    next_map: AtomicU32,
    next_item: AtomicU32,
}

impl Runtime {
    pub fn new(config: Config) -> Self {
        Runtime {
            config,
            clock: Arc::new(SystemClock::default()),
            script: Arc::new(()),
            net: Arc::new(()),
            rng: Mutex::new(GameRng::seed_from_u64(0xdeadbeef)),
            critters: Default::default(),
            maps: Default::default(),
            gc_requested: Default::default(),
            next_critter: AtomicU32::new(1),
            next_map: AtomicU32::new(1),
            next_item: AtomicU32::new(1),
        }
    }

    pub fn with_script(mut self, script: Arc<dyn ScriptHost>) -> Self {
        self.script = script;
        self
    }

    pub fn with_sender(mut self, net: Arc<dyn Sender>) -> Self {
        self.net = net;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock().unwrap() = util::srng(&seed);
        self
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn coin(&self) -> bool {
        self.rng.lock().unwrap().coin()
    }

    pub fn is_bound(&self, kind: EventKind) -> bool {
        self.script.is_bound(kind)
    }

    /// Run the script handler for an event if one is bound.
    pub fn raise(&self, event: &Event) -> Option<ScriptValue> {
        if !self.script.is_bound(event.kind()) {
            return None;
        }
        log::trace!("raise {event}: {event:?}");
        self.script.invoke(self, event)
    }

    /// Run a handler that answers yes or no.
    ///
    /// `None` if nothing is bound or the handler failed to give an answer.
    pub fn check(&self, event: &Event) -> Option<bool> {
        self.raise(event).and_then(|v| v.as_bool())
    }

    pub fn create_map(&self, proto: ProtoMap) -> MapRef {
        let id = MapId(self.next_map.fetch_add(1, Ordering::Relaxed));
        let map = Arc::new(Map::new(
            id,
            Arc::new(proto),
            self.config.map_layout,
            self.now(),
        ));
        log::debug!("{id}: created from {}", map.proto.name);
        self.maps.write().unwrap().insert(id, map.clone());
        map
    }

    pub fn map(&self, id: MapId) -> Option<MapRef> {
        self.maps.read().unwrap().get(&id).cloned()
    }

    pub fn maps(&self) -> Vec<MapRef> {
        self.maps.read().unwrap().values().cloned().collect()
    }

    /// Create a critter on the global map.
    pub fn spawn(&self, kind: CritterKind, state: CritterState) -> CritterRef {
        let id = CritterId(self.next_critter.fetch_add(1, Ordering::Relaxed));
        let cr = Arc::new(Critter::new(id, kind, state));
        self.critters.write().unwrap().insert(id, cr.clone());
        cr
    }

    pub fn critter(&self, id: CritterId) -> Option<CritterRef> {
        self.critters.read().unwrap().get(&id).cloned()
    }

    pub fn critters(&self) -> Vec<CritterRef> {
        self.critters.read().unwrap().values().cloned().collect()
    }

    /// Item with a fresh id, not placed anywhere yet.
    pub fn new_item(&self, pid: u16, pos: IVec2) -> Item {
        Item {
            id: ItemId(self.next_item.fetch_add(1, Ordering::Relaxed)),
            ..Item::new(pid, pos)
        }
    }

    /// Move a critter to a map, or to the global map with `None`.
    ///
    /// The critter lands on the nearest free cell around `pos`. Critters in
    /// combat can't leave their map.
    pub fn transfer(
        &self,
        cr: &CritterRef,
        to: Option<&MapRef>,
        pos: IVec2,
    ) -> bool {
        if cr.is_destroyed() {
            return false;
        }
        let (multihex, in_battle) =
            cr.with(|s| (s.multihex, s.battle_timeout.is_some()));
        let from = cr.map_id().and_then(|id| self.map(id));

        if in_battle && from.is_some() {
            log::debug!("{}: can't leave map during combat", cr.id);
            return false;
        }

        let start = match to {
            Some(map) => {
                let Some(p) = map.find_start_hex(
                    self,
                    pos,
                    multihex,
                    self.config.max_hex_offset,
                    true,
                ) else {
                    log::warn!("{}: no room for {} around {pos}", map.id, cr.id);
                    return false;
                };
                Some(p)
            }
            None => None,
        };

        cr.clear_visible(self);
        if let Some(from) = from {
            from.erase_critter(self, cr);
        }

        match (to, start) {
            (Some(map), Some(p)) => {
                cr.with_mut(|s| s.pos = p);
                map.add_critter(self, cr);
                cr.send(
                    self,
                    Packet::GameInfo {
                        map: Some(map.id),
                        turn_based: map.is_turn_based(),
                    },
                );
                cr.send(self, cr.add_packet(true));
                cr.process_visible_critters(self);
                cr.process_visible_items(self);
            }
            _ => {
                cr.with_mut(|s| s.map = None);
                cr.send(
                    self,
                    Packet::GameInfo {
                        map: None,
                        turn_based: false,
                    },
                );
                cr.process_visible_critters(self);
            }
        }
        true
    }

    /// Take a critter out of the game for good.
    pub fn remove_critter(&self, id: CritterId) -> bool {
        let Some(cr) = self.critter(id) else {
            return false;
        };
        if cr.is_destroyed() {
            return false;
        }

        cr.clear_visible(self);
        if let Some(map) = cr.map_id().and_then(|id| self.map(id)) {
            map.erase_critter(self, &cr);
        }
        cr.set_destroyed();
        self.request_gc();
        true
    }

    pub fn request_gc(&self) {
        self.gc_requested.store(true, Ordering::Release);
    }

    /// Drop destroyed critters from the arena if cleanup was requested.
    pub fn gc(&self) -> usize {
        if !self.gc_requested.swap(false, Ordering::AcqRel) {
            return 0;
        }
        let mut critters = self.critters.write().unwrap();
        let n = critters.len();
        critters.retain(|_, cr| !cr.is_destroyed());
        let dropped = n - critters.len();
        if dropped > 0 {
            log::debug!("gc: dropped {dropped} critters");
        }
        dropped
    }

    /// Run the updates of one map.
    ///
    /// Time events of critters in combat wait until the combat ends.
    pub fn process_map(&self, map: &Map) {
        map.process(self);
        for cr in map.critters(FindType::ALL, false) {
            if cr.with(|s| s.battle_timeout.is_none()) {
                cr.process_time_events(self);
            }
        }
    }

    /// Update the whole game state by one tick.
    pub fn tick(&self) {
        for map in self.maps() {
            self.process_map(&map);
        }
        for cr in self.critters() {
            if !cr.is_destroyed() && cr.map_id().is_none() {
                cr.process_time_events(self);
            }
        }
        util::release_all();
        self.gc();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{test_util::*, ScriptTable};

    #[test]
    fn ids_are_unique() {
        let (r, _) = runtime(Config::default());
        let a = r.spawn(CritterKind::Npc, Default::default());
        let b = r.spawn(CritterKind::Player, Default::default());
        assert_ne!(a.id, b.id);
        assert_eq!(r.critters().len(), 2);
        assert_eq!(r.critter(b.id), Some(b.clone()));
        assert_eq!(a.with(|s| s.group.clone()), vec![a.id]);

        let m1 = open_map(&r, 4, 4);
        let m2 = open_map(&r, 4, 4);
        assert_ne!(m1.id, m2.id);
        assert_ne!(r.new_item(1, IVec2::ZERO).id, r.new_item(1, IVec2::ZERO).id);
    }

    #[test]
    fn seeded_coins_repeat() {
        let a = Runtime::new(Config::default()).with_seed(7);
        let b = Runtime::new(Config::default()).with_seed(7);
        for _ in 0..32 {
            assert_eq!(a.coin(), b.coin());
        }
    }

    #[test]
    fn unbound_events_do_nothing() {
        let script = Arc::new(ScriptTable::new().record(EventKind::MapLoop));
        let (r, _) = runtime(Config::default());
        let r = r.with_script(script.clone());
        let e = Event::TurnBasedBegin { map: MapId(1) };
        assert_eq!(r.raise(&e), None);
        assert_eq!(r.check(&Event::MapLoop { map: MapId(1), index: 1 }), None);
        assert_eq!(script.take_log().len(), 1);
    }

    #[test]
    fn transfer_between_maps() {
        let script = Arc::new(
            ScriptTable::new()
                .record(EventKind::MapInCritter)
                .record(EventKind::MapOutCritter),
        );
        let (r, env) = runtime(Config::default());
        let r = r.with_script(script.clone());
        let m1 = open_map(&r, 10, 10);
        let m2 = open_map(&r, 10, 10);
        let guard = npc_at(&r, &m1, ivec2(3, 3));
        let stranger = npc_at(&r, &m2, ivec2(5, 5));

        let p = r.spawn(CritterKind::Player, Default::default());
        assert!(r.transfer(&p, Some(&m1), ivec2(3, 3)));
        // The requested cell is taken.
        assert_ne!(p.pos(), ivec2(3, 3));
        assert_eq!(Layout::Hex.dist(p.pos(), ivec2(3, 3)), 1);
        assert!(p.sees(guard.id) && guard.sees(p.id));
        let packets = env.drain_for(p.id);
        assert!(packets.contains(&Packet::GameInfo {
            map: Some(m1.id),
            turn_based: false
        }));

        assert!(r.transfer(&p, Some(&m2), ivec2(1, 1)));
        assert_eq!(m1.critter_count(), 1);
        assert!(!guard.is_seen_by(p.id) && !guard.sees(p.id));
        assert!(p.sees(stranger.id));
        assert_eq!(p.visible_ids(), vec![stranger.id]);

        assert!(r.transfer(&p, None, IVec2::ZERO));
        assert_eq!(p.map_id(), None);
        assert_eq!(m2.critter_count(), 1);
        assert!(stranger.observer_ids().is_empty());

        let moves: Vec<EventKind> = script.take_log().iter().map(|e| e.kind()).collect();
        assert_eq!(
            moves,
            vec![
                EventKind::MapInCritter,
                EventKind::MapInCritter,
                EventKind::MapInCritter,
                EventKind::MapOutCritter,
                EventKind::MapInCritter,
                EventKind::MapOutCritter,
            ]
        );
        util::release_all();
    }

    #[test]
    fn no_leaving_during_combat() {
        let (r, _) = runtime(Config::default());
        let m1 = open_map(&r, 10, 10);
        let m2 = open_map(&r, 10, 10);
        let a = npc_at(&r, &m1, ivec2(1, 1));
        m1.begin_turn_based(&r, None);
        assert!(!r.transfer(&a, Some(&m2), ivec2(1, 1)));
        m1.end_turn_based(&r);
        assert!(r.transfer(&a, Some(&m2), ivec2(1, 1)));
        util::release_all();
    }

    #[test]
    fn removal_and_gc() {
        let (r, env) = runtime(Config::default());
        let map = open_map(&r, 10, 10);
        let a = player_at(&r, &map, ivec2(1, 1));
        let b = npc_at(&r, &map, ivec2(2, 2));
        a.process_visible_critters(&r);
        env.drain();

        assert!(r.remove_critter(b.id));
        assert!(!r.remove_critter(b.id));
        assert!(b.is_destroyed());
        assert!(!a.sees(b.id));
        assert_eq!(env.drain(), vec![(a.id, Packet::RemoveCritter { id: b.id })]);
        assert!(map.is_hex_passed(ivec2(2, 2)));

        // Still reachable until collected.
        assert!(r.critter(b.id).is_some());
        assert_eq!(r.gc(), 1);
        assert_eq!(r.gc(), 0);
        assert!(r.critter(b.id).is_none());
        util::release_all();
    }

    #[test]
    fn tick_runs_maps_and_timers() {
        let script = Arc::new(
            ScriptTable::new()
                .record(EventKind::MapLoop)
                .record(EventKind::CritterTimeEvent),
        );
        let (r, env) = runtime(Config::default());
        let r = r.with_script(script.clone());
        let mut proto = ProtoMap::new("loop", ivec2(5, 5));
        proto.loop_times[1] = 500;
        let map = r.create_map(proto);
        let a = npc_at(&r, &map, ivec2(1, 1));
        let wanderer = r.spawn(CritterKind::Npc, Default::default());
        a.add_time_event(&r, 1, 0, 1);
        wanderer.add_time_event(&r, 2, 0, 1);

        env.advance(1_000);
        r.tick();
        let kinds: Vec<EventKind> = script.take_log().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::MapLoop,
                EventKind::CritterTimeEvent,
                EventKind::CritterTimeEvent
            ]
        );
        assert!(!map.sync.is_locked());

        // Combat holds timers back.
        a.add_time_event(&r, 3, 0, 1);
        map.begin_turn_based(&r, None);
        env.advance(400);
        r.tick();
        env.advance(1_000);
        r.tick();
        assert!(script
            .take_log()
            .iter()
            .all(|e| e.kind() != EventKind::CritterTimeEvent));
        util::release_all();
    }
}
