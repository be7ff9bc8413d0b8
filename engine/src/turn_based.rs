//! Turn-based combat scheduling on a map.
//!
//! While combat is on, critters act one at a time in an order regenerated
//! every round. The scheduler state lives in [`TurnState`] under the map's
//! `turn` lock, which is never held while critter state is touched or
//! scripts run.
use crate::{critter::Cond, prelude::*, Perks, TB_BATTLE_TIMEOUT};

#[derive(Clone, Debug)]
pub struct TurnState {
    pub on: bool,
    /// Deadline of the current turn.
    pub end_tick: Instant,
    /// Index of the acting critter in `sequence`, -1 at a round boundary.
    pub sequence_cur: i32,
    pub sequence: Vec<CritterId>,
    /// Set after the first deadline expiry, the turn ends on the second.
    pub timeout: bool,
    /// Game second combat started at.
    pub begin_second: u32,
    /// Script asked combat to stop at the next opportunity.
    pub need_end: bool,
    pub round: u32,
    /// Turns taken in the current round.
    pub turn: u32,
    /// Turns taken since combat started.
    pub whole_turn: u32,
}

impl Default for TurnState {
    fn default() -> Self {
        TurnState {
            on: false,
            end_tick: Default::default(),
            sequence_cur: -1,
            sequence: Vec::new(),
            timeout: false,
            begin_second: 0,
            need_end: false,
            round: 0,
            turn: 0,
            whole_turn: 0,
        }
    }
}

impl TurnState {
    /// Id of the critter whose turn it is.
    pub fn current(&self) -> Option<CritterId> {
        if !self.on || self.sequence_cur < 0 {
            return None;
        }
        self.sequence.get(self.sequence_cur as usize).copied()
    }

    /// Drop the entry under the cursor and step the cursor back so the
    /// next advance lands on the entry that followed it.
    fn splice_current(&mut self) {
        let i = self.sequence_cur;
        if i >= 0 && (i as usize) < self.sequence.len() {
            self.sequence.remove(i as usize);
            self.sequence_cur -= 1;
        }
    }

    fn check_cursor(&self) {
        debug_assert!(
            self.sequence_cur == -1
                || (0..self.sequence.len() as i32).contains(&self.sequence_cur),
            "bad turn cursor {} for {} entries",
            self.sequence_cur,
            self.sequence.len()
        );
    }
}

impl Map {
    pub fn is_turn_based(&self) -> bool {
        self.turn.lock().unwrap().on
    }

    /// Copy of the scheduler state.
    pub fn turn_state(&self) -> TurnState {
        self.turn.lock().unwrap().clone()
    }

    pub fn critter_turn_id(&self) -> Option<CritterId> {
        self.turn.lock().unwrap().current()
    }

    pub fn is_critter_turn(&self, id: CritterId) -> bool {
        self.critter_turn_id() == Some(id)
    }

    /// Milliseconds left in the current turn.
    pub fn critter_turn_time(&self, r: &Runtime) -> i64 {
        let t = self.turn.lock().unwrap();
        if !t.on {
            return 0;
        }
        (t.end_tick - r.now()).max(0)
    }

    /// Make the current turn end on the next map update.
    pub fn end_critter_turn(&self, r: &Runtime) {
        let mut t = self.turn.lock().unwrap();
        if t.on {
            t.end_tick = r.now();
            t.timeout = true;
        }
    }

    /// Ask combat to end when the current turn or round finishes.
    pub fn request_end_turn_based(&self) {
        let mut t = self.turn.lock().unwrap();
        if t.on {
            t.need_end = true;
        }
    }

    /// Start combat, `first` acts first regardless of turn order.
    pub fn begin_turn_based(&self, r: &Runtime, first: Option<&Critter>) {
        {
            let mut t = self.turn.lock().unwrap();
            if t.on {
                return;
            }
            *t = TurnState {
                on: true,
                end_tick: r.now(),
                begin_second: r.now().second(),
                ..Default::default()
            };
        }
        log::info!("{}: turn-based combat begins", self.id);

        for cr in self.critters(FindType::ACTIVE, true) {
            let is_first = first.is_some_and(|f| f.id == cr.id);
            cr.with_mut(|s| {
                s.move_ap = 0;
                s.turn_based_ac = 0;
                if !is_first {
                    s.current_ap = s.current_ap / AP_DIVIDER * AP_DIVIDER;
                }
                s.battle_timeout = Some(TB_BATTLE_TIMEOUT);
            });
            cr.send(
                r,
                Packet::GameInfo {
                    map: Some(self.id),
                    turn_based: true,
                },
            );
        }

        self.generate_sequence(r, first);
        r.raise(&Event::TurnBasedBegin { map: self.id });

        let stop = {
            let t = self.turn.lock().unwrap();
            t.need_end || t.sequence.is_empty()
        };
        if stop {
            self.end_turn_based(r);
        } else {
            self.next_critter_turn(r);
        }
    }

    /// Build the turn order for a round.
    ///
    /// Higher sequence, then agility, then luck go first. Remaining ties
    /// keep map order or reverse it, decided by one coin flip per call.
    pub(crate) fn generate_sequence(&self, r: &Runtime, first: Option<&Critter>) {
        let crs: Vec<CritterRef> = self
            .critters(FindType::ACTIVE, true)
            .into_iter()
            .filter(|cr| first.map_or(true, |f| f.id != cr.id))
            .collect();
        let keys: Vec<(i32, i32, i32)> = crs
            .iter()
            .map(|cr| cr.with(|s| (s.sequence, s.agility, s.luck)))
            .collect();

        let forward = r.coin();
        let mut order: Vec<usize> = (0..crs.len()).collect();
        order.sort_by(|&a, &b| {
            keys[b].cmp(&keys[a]).then_with(|| {
                if forward {
                    a.cmp(&b)
                } else {
                    b.cmp(&a)
                }
            })
        });

        let mut sequence = Vec::with_capacity(crs.len() + 1);
        if let Some(first) = first {
            sequence.push(first.id);
        }
        sequence.extend(order.into_iter().map(|i| crs[i].id));

        let mut t = self.turn.lock().unwrap();
        t.sequence = sequence;
        t.sequence_cur = -1;
    }

    /// Wrap up the acting critter's turn.
    fn finish_turn(&self, r: &Runtime, cr: &Critter) {
        cr.with_mut(|s| {
            let left = s.current_ap / AP_DIVIDER + s.move_ap;
            s.turn_based_ac = if left > 0 {
                if s.perks.contains(Perks::HTH_EVADE) {
                    left * 2
                } else {
                    left
                }
            } else {
                0
            };
            s.move_ap = 0;
            s.current_ap = s.current_ap.min(0);
        });
        r.raise(&Event::TurnBasedProcess {
            map: self.id,
            critter: cr.id,
            begin_turn: false,
        });
    }

    /// Give a critter its turn, return false if the turn is skipped.
    fn start_turn(&self, r: &Runtime, cr: &Critter) -> bool {
        let tick = r.config.turn_based_tick;
        let can_act = cr.with_mut(|s| {
            s.move_ap = s.max_move_ap;
            s.turn_based_ac = 0;
            let full = s.action_points * AP_DIVIDER;
            if s.current_ap < 0 {
                s.current_ap += full;
            } else {
                s.current_ap = full;
            }
            !(s.current_ap < 0 && s.move_ap == 0)
        });
        {
            let mut t = self.turn.lock().unwrap();
            t.end_tick = r.now() + tick;
            t.timeout = false;
        }

        if !can_act {
            log::debug!("{}: {} is out of action points", self.id, cr.id);
            return false;
        }
        if cr.cond() == Cond::Knockout && !cr.try_up_on_knockout() {
            log::debug!("{}: {} stays knocked out", self.id, cr.id);
            return false;
        }

        cr.send(
            r,
            Packet::TurnBasedTurn {
                id: cr.id,
                time_ms: tick.clamp(0, u32::MAX as i64) as u32,
            },
        );
        r.raise(&Event::TurnBasedProcess {
            map: self.id,
            critter: cr.id,
            begin_turn: true,
        });

        let mut t = self.turn.lock().unwrap();
        t.turn += 1;
        t.whole_turn += 1;
        true
    }

    /// Start a new round, return false if combat ended instead.
    fn begin_round(&self, r: &Runtime) -> bool {
        self.generate_sequence(r, None);
        {
            let mut t = self.turn.lock().unwrap();
            t.round += 1;
            t.turn = 0;
        }
        log::debug!("{}: combat round {}", self.id, self.turn_state().round);

        r.raise(&Event::TurnBasedBegin { map: self.id });

        let stop = {
            let t = self.turn.lock().unwrap();
            t.need_end || t.sequence.is_empty()
        };
        if stop {
            self.end_turn_based(r);
            return false;
        }
        true
    }

    /// End the current turn and hand the next one out.
    pub fn next_critter_turn(&self, r: &Runtime) {
        let current = {
            let t = self.turn.lock().unwrap();
            if !t.on {
                return;
            }
            t.current()
        };

        if let Some(id) = current {
            match self.critter(id, true) {
                Some(cr) => self.finish_turn(r, &cr),
                None => {
                    log::warn!("{}: acting {id} left the map", self.id);
                    self.turn.lock().unwrap().splice_current();
                }
            }
        }

        let mut new_rounds = 0;
        loop {
            let next = {
                let mut t = self.turn.lock().unwrap();
                if !t.on {
                    return;
                }
                if t.need_end {
                    None
                } else {
                    t.sequence_cur += 1;
                    let next = t.sequence.get(t.sequence_cur as usize).copied();
                    if next.is_none() {
                        t.sequence_cur = -1;
                    }
                    t.check_cursor();
                    Some(next)
                }
            };

            let Some(next) = next else {
                self.end_turn_based(r);
                return;
            };

            let Some(id) = next else {
                new_rounds += 1;
                if new_rounds > 1 {
                    // Nobody could act for a whole round, try again next
                    // update.
                    let mut t = self.turn.lock().unwrap();
                    t.end_tick = r.now();
                    t.timeout = true;
                    return;
                }
                if !self.begin_round(r) {
                    return;
                }
                continue;
            };

            match self.critter(id, true) {
                Some(cr) if !cr.is_dead() => {
                    if self.start_turn(r, &cr) {
                        return;
                    }
                }
                _ => {
                    let mut t = self.turn.lock().unwrap();
                    t.splice_current();
                    t.check_cursor();
                }
            }
        }
    }

    /// Stop combat and return everyone to real time.
    pub fn end_turn_based(&self, r: &Runtime) {
        // Handlers still see the counters of the finished battle, but the
        // map is already out of combat.
        let begin_second = {
            let mut t = self.turn.lock().unwrap();
            if !t.on {
                return;
            }
            t.on = false;
            t.begin_second
        };
        log::info!("{}: turn-based combat ends", self.id);

        r.raise(&Event::TurnBasedEnd { map: self.id });

        {
            let mut t = self.turn.lock().unwrap();
            // A handler may have started a new battle.
            if !t.on {
                *t = Default::default();
            }
        }

        let elapsed = r.now().second().saturating_sub(begin_second);
        for cr in self.critters(FindType::ALL, true) {
            cr.with_mut(|s| {
                s.battle_timeout = None;
                s.turn_based_ac = 0;
            });
            cr.continue_time_events(elapsed);
            cr.send(
                r,
                Packet::GameInfo {
                    map: Some(self.id),
                    turn_based: false,
                },
            );
        }
    }

    /// Advance the turn when its deadline has passed.
    ///
    /// The first expiry only starts a grace period, the turn changes when
    /// the grace period runs out too.
    pub fn process_turn_based(&self, r: &Runtime) {
        let advance = {
            let mut t = self.turn.lock().unwrap();
            if !t.on || r.now() < t.end_tick {
                return;
            }
            if t.timeout {
                true
            } else {
                t.timeout = true;
                t.end_tick = r.now() + r.config.turn_timeout_grace;
                false
            }
        };
        if advance {
            self.next_critter_turn(r);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{test_util::*, ScriptTable, ScriptValue};

    /// Three NPCs with descending sequence stats on a fresh map.
    fn trio(r: &Runtime) -> (MapRef, [CritterRef; 3]) {
        let map = open_map(r, 10, 10);
        let crs = [20, 15, 10].map(|seq| {
            let cr = npc_at(r, &map, ivec2(seq / 5, seq / 5));
            cr.with_mut(|s| s.sequence = seq);
            cr
        });
        (map, crs)
    }

    #[test]
    fn rounds_follow_sequence_stat() {
        let (r, _) = runtime(Config::default());
        let (map, [a, b, c]) = trio(&r);

        map.begin_turn_based(&r, None);
        assert!(map.is_turn_based());
        assert_eq!(map.turn_state().sequence, vec![a.id, b.id, c.id]);
        assert_eq!(map.critter_turn_id(), Some(a.id));
        assert!(a.with(|s| s.battle_timeout.is_some()));

        map.next_critter_turn(&r);
        assert_eq!(map.critter_turn_id(), Some(b.id));
        map.next_critter_turn(&r);
        assert_eq!(map.critter_turn_id(), Some(c.id));

        map.next_critter_turn(&r);
        let t = map.turn_state();
        assert_eq!(map.critter_turn_id(), Some(a.id));
        assert_eq!((t.round, t.turn, t.whole_turn), (1, 1, 4));
        util::release_all();
    }

    #[test]
    fn dead_participant_is_spliced() {
        let (r, _) = runtime(Config::default());
        let (map, [a, b, c]) = trio(&r);
        map.begin_turn_based(&r, None);
        assert_eq!(map.critter_turn_id(), Some(a.id));

        b.kill(&r, None);
        map.next_critter_turn(&r);

        // The third participant still acts in the same round.
        let t = map.turn_state();
        assert_eq!(map.critter_turn_id(), Some(c.id));
        assert_eq!(t.sequence, vec![a.id, c.id]);
        assert_eq!(t.sequence_cur, 1);
        assert_eq!(t.round, 0);

        // And the dead one stays out of the next round.
        map.next_critter_turn(&r);
        assert_eq!(map.turn_state().sequence, vec![a.id, c.id]);
        assert_eq!(map.critter_turn_id(), Some(a.id));
        util::release_all();
    }

    #[test]
    fn acting_critter_leaves_map() {
        let (r, _) = runtime(Config::default());
        let (map, [a, b, c]) = trio(&r);
        map.begin_turn_based(&r, None);
        map.next_critter_turn(&r);
        assert_eq!(map.critter_turn_id(), Some(b.id));

        map.erase_critter(&r, &b);
        map.next_critter_turn(&r);
        assert_eq!(map.critter_turn_id(), Some(c.id));
        assert_eq!(map.turn_state().sequence, vec![a.id, c.id]);
        util::release_all();
    }

    #[test]
    fn killing_the_actor_ends_its_turn() {
        let (r, env) = runtime(Config::default());
        let (map, [a, b, _]) = trio(&r);
        map.begin_turn_based(&r, None);
        env.advance(1_000);
        assert!(map.critter_turn_time(&r) > 0);

        a.kill(&r, Some(b.id));
        assert_eq!(map.critter_turn_time(&r), 0);
        map.process_turn_based(&r);
        assert_eq!(map.critter_turn_id(), Some(b.id));
        util::release_all();
    }

    #[test]
    fn first_actor_goes_first() {
        let (r, _) = runtime(Config::default());
        let (map, [a, b, c]) = trio(&r);
        c.with_mut(|s| s.current_ap = 250);
        b.with_mut(|s| s.current_ap = 250);

        map.begin_turn_based(&r, Some(&c));
        assert_eq!(map.turn_state().sequence, vec![c.id, a.id, b.id]);
        assert_eq!(map.critter_turn_id(), Some(c.id));
        assert_eq!(b.with(|s| s.current_ap), 200);
        // Turn start refills the pool.
        assert_eq!(c.with(|s| s.current_ap), 8 * AP_DIVIDER);
        util::release_all();
    }

    #[test]
    fn ties_share_one_coin_flip() {
        let (r, _) = runtime(Config::default());
        let map = open_map(&r, 10, 10);
        let crs: Vec<CritterRef> =
            (0..5).map(|i| npc_at(&r, &map, ivec2(i, 0))).collect();
        let ids: Vec<CritterId> = crs.iter().map(|cr| cr.id).collect();
        let reversed: Vec<CritterId> = ids.iter().rev().copied().collect();

        for _ in 0..10 {
            map.generate_sequence(&r, None);
            let seq = map.turn_state().sequence;
            assert!(seq == ids || seq == reversed);
        }

        crs[3].with_mut(|s| s.luck = 9);
        crs[1].kill(&r, None);
        map.generate_sequence(&r, None);
        let seq = map.turn_state().sequence;
        assert_eq!(seq.len(), 4);
        assert_eq!(seq[0], ids[3]);
        assert!(!seq.contains(&ids[1]));
        util::release_all();
    }

    #[test]
    fn deadline_and_grace() {
        let cfg = Config {
            turn_based_tick: 5_000,
            turn_timeout_grace: 1_000,
            ..Default::default()
        };
        let (r, env) = runtime(cfg);
        let (map, [a, b, _]) = trio(&r);
        map.begin_turn_based(&r, None);
        assert_eq!(map.critter_turn_time(&r), 5_000);

        env.advance(4_999);
        map.process_turn_based(&r);
        assert_eq!(map.critter_turn_id(), Some(a.id));

        env.advance(1);
        map.process_turn_based(&r);
        assert!(map.turn_state().timeout);
        assert_eq!(map.critter_turn_id(), Some(a.id));

        env.advance(999);
        map.process(&r);
        assert_eq!(map.critter_turn_id(), Some(a.id));
        env.advance(1);
        map.process(&r);
        assert_eq!(map.critter_turn_id(), Some(b.id));
        assert!(!map.turn_state().timeout);
        util::release_all();
    }

    #[test]
    fn leftover_points_become_armor() {
        let (r, _) = runtime(Config::default());
        let (map, [a, b, _]) = trio(&r);
        a.with_mut(|s| s.max_move_ap = 2);
        b.with_mut(|s| s.perks |= Perks::HTH_EVADE);

        map.begin_turn_based(&r, None);
        a.with_mut(|s| s.current_ap -= 3 * AP_DIVIDER);
        map.next_critter_turn(&r);
        assert_eq!(a.with(|s| (s.turn_based_ac, s.move_ap, s.current_ap)), (7, 0, 0));

        b.with_mut(|s| s.current_ap = 350);
        map.next_critter_turn(&r);
        assert_eq!(b.with(|s| s.turn_based_ac), 6);
        util::release_all();
    }

    #[test]
    fn overdrawn_and_knocked_out_critters_skip() {
        let (r, env) = runtime(Config::default());
        let (map, [a, b, c]) = trio(&r);
        b.with_mut(|s| s.current_ap = -10 * AP_DIVIDER);
        c.knockout(100);

        map.begin_turn_based(&r, None);
        env.drain();
        map.next_critter_turn(&r);
        // Both skipped, back to the top.
        assert_eq!(map.critter_turn_id(), Some(a.id));
        assert_eq!(b.with(|s| s.current_ap), -2 * AP_DIVIDER);
        assert_eq!(c.cond(), Cond::Knockout);
        assert_eq!(map.turn_state().round, 1);
        util::release_all();
    }

    #[test]
    fn stalled_round_waits() {
        let (r, _) = runtime(Config::default());
        let map = open_map(&r, 10, 10);
        let a = npc_at(&r, &map, ivec2(1, 1));
        a.knockout(1_000);

        map.begin_turn_based(&r, None);
        let t = map.turn_state();
        assert!(t.on);
        assert!(t.timeout);
        assert_eq!(map.critter_turn_id(), None);
        assert_eq!(t.sequence_cur, -1);
        util::release_all();
    }

    #[test]
    fn script_ends_combat() {
        let script = Arc::new(
            ScriptTable::new()
                .bind(EventKind::TurnBasedProcess, |r, e| {
                    if let Event::TurnBasedProcess {
                        map,
                        begin_turn: false,
                        ..
                    } = e
                    {
                        r.map(*map)?.request_end_turn_based();
                    }
                    Some(ScriptValue::Unit)
                })
                .record(EventKind::TurnBasedEnd),
        );
        let (r, _) = runtime(Config::default());
        let r = r.with_script(script.clone());
        let (map, [a, _, _]) = trio(&r);

        map.begin_turn_based(&r, None);
        assert_eq!(map.critter_turn_id(), Some(a.id));
        map.next_critter_turn(&r);
        assert!(!map.is_turn_based());
        assert!(a.with(|s| s.battle_timeout.is_none()));
        assert!(script
            .take_log()
            .contains(&Event::TurnBasedEnd { map: map.id }));
        util::release_all();
    }

    #[test]
    fn begin_handler_sees_the_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let script = {
            let seen = seen.clone();
            Arc::new(ScriptTable::new().bind(
                EventKind::TurnBasedBegin,
                move |r, e| {
                    let Event::TurnBasedBegin { map } = e else {
                        return None;
                    };
                    let t = r.map(*map)?.turn_state();
                    seen.lock().unwrap().push(t.sequence.len());
                    // Kill the last in line before the first round starts.
                    if t.round == 0 {
                        r.critter(*t.sequence.last()?)?.kill(r, None);
                    }
                    Some(ScriptValue::Unit)
                },
            ))
        };
        let (r, _) = runtime(Config::default());
        let r = r.with_script(script);
        let (map, [a, b, c]) = trio(&r);

        map.begin_turn_based(&r, None);
        assert_eq!(*seen.lock().unwrap(), vec![3]);
        assert!(c.is_dead());
        assert_eq!(map.critter_turn_id(), Some(a.id));

        map.next_critter_turn(&r);
        assert_eq!(map.critter_turn_id(), Some(b.id));

        // The corpse is passed over and the next round leaves it out.
        map.next_critter_turn(&r);
        assert_eq!(map.critter_turn_id(), Some(a.id));
        assert_eq!(map.turn_state().sequence, vec![a.id, b.id]);
        assert_eq!(*seen.lock().unwrap(), vec![3, 2]);
        util::release_all();
    }

    #[test]
    fn end_handler_sees_the_tally() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let script = {
            let seen = seen.clone();
            Arc::new(ScriptTable::new().bind(
                EventKind::TurnBasedEnd,
                move |r, e| {
                    let Event::TurnBasedEnd { map } = e else {
                        return None;
                    };
                    let map = r.map(*map)?;
                    let t = map.turn_state();
                    seen.lock()
                        .unwrap()
                        .push((map.is_turn_based(), t.round, t.whole_turn));
                    Some(ScriptValue::Unit)
                },
            ))
        };
        let (r, _) = runtime(Config::default());
        let r = r.with_script(script);
        let (map, _) = trio(&r);

        map.begin_turn_based(&r, None);
        map.next_critter_turn(&r);
        map.end_turn_based(&r);

        assert_eq!(*seen.lock().unwrap(), vec![(false, 0, 2)]);
        let t = map.turn_state();
        assert_eq!((t.on, t.whole_turn, t.sequence_cur), (false, 0, -1));
        assert!(t.sequence.is_empty());

        // Ending twice does nothing.
        map.end_turn_based(&r);
        assert_eq!(seen.lock().unwrap().len(), 1);
        util::release_all();
    }

    #[test]
    fn corpses_stay_out_of_combat() {
        let (r, _) = runtime(Config::default());
        let (map, [a, _, _]) = trio(&r);
        let corpse = npc_at(&r, &map, ivec2(8, 8));
        corpse.with_mut(|s| s.current_ap = 250);
        corpse.kill(&r, None);
        a.with_mut(|s| s.current_ap = 250);

        map.begin_turn_based(&r, None);
        corpse.with(|s| {
            assert_eq!(s.current_ap, 250);
            assert!(s.battle_timeout.is_none());
        });
        assert!(a.with(|s| s.battle_timeout.is_some()));
        assert!(!map.turn_state().sequence.contains(&corpse.id));
        util::release_all();
    }

    #[test]
    fn empty_map_ends_at_once() {
        let (r, _) = runtime(Config::default());
        let map = open_map(&r, 10, 10);
        let a = npc_at(&r, &map, ivec2(1, 1));
        a.kill(&r, None);
        map.begin_turn_based(&r, None);
        assert!(!map.is_turn_based());
    }

    #[test]
    fn time_events_resume_after_combat() {
        let (r, env) = runtime(Config::default());
        let (map, [a, _, _]) = trio(&r);
        a.add_time_event(&r, 1, 0, 10);
        env.advance(2_000);

        map.begin_turn_based(&r, None);
        env.advance(30_000);
        map.end_turn_based(&r);

        assert_eq!(a.with(|s| s.time_events[0].fire_second), 40);
        assert_eq!(map.turn_state().sequence_cur, -1);
        util::release_all();
    }

    #[test]
    fn players_are_told() {
        let (r, env) = runtime(Config::default());
        let map = open_map(&r, 10, 10);
        let p = player_at(&r, &map, ivec2(1, 1));
        map.begin_turn_based(&r, None);

        let packets = env.drain_for(p.id);
        assert_eq!(
            packets,
            vec![
                Packet::GameInfo {
                    map: Some(map.id),
                    turn_based: true
                },
                Packet::TurnBasedTurn {
                    id: p.id,
                    time_ms: 30_000
                },
            ]
        );
        map.end_turn_based(&r);
        assert_eq!(
            env.drain_for(p.id),
            vec![Packet::GameInfo {
                map: Some(map.id),
                turn_based: false
            }]
        );
        util::release_all();
    }
}
