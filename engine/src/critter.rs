//! Critter records and their local state.
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, RwLock,
    },
};

use bitflags::bitflags;
use derives::KebabFlags;
use serde::{Deserialize, Serialize};
use util::SyncObject;

use crate::{prelude::*, Cond::*};

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
pub struct CritterId(pub u32);

impl fmt::Display for CritterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cr#{}", self.0)
    }
}

/// Life state.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Hash, Debug, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Cond {
    #[default]
    Life,
    Knockout,
    Dead,
}

#[derive(
    Copy, Clone, Default, Eq, PartialEq, Hash, Debug, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum CritterKind {
    Player,
    #[default]
    Npc,
}

bitflags! {
    #[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Debug, KebabFlags)]
    pub struct Perks: u8 {
        /// Sneaking, observers need to beat the sneak skill.
        const HIDDEN = 0x01;
        /// Leftover action points count double for turn-based armor class.
        const HTH_EVADE = 0x02;
    }
}

bitflags! {
    /// Critter search filter.
    #[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Debug, KebabFlags)]
    pub struct FindType: u8 {
        const LIFE = 0x01;
        const KNOCKOUT = 0x02;
        const DEAD = 0x04;
        const ONLY_PLAYERS = 0x10;
        const ONLY_NPC = 0x20;
    }
}

impl FindType {
    /// Any critter regardless of condition.
    pub const ALL: FindType = FindType::LIFE
        .union(FindType::KNOCKOUT)
        .union(FindType::DEAD);

    /// Critters that can take part in combat.
    pub const ACTIVE: FindType = FindType::LIFE.union(FindType::KNOCKOUT);
}

/// Pending timed script callback.
#[derive(
    Copy, Clone, Default, Eq, PartialEq, Hash, Debug, Serialize, Deserialize,
)]
pub struct TimeEvent {
    pub id: u32,
    /// Game second at which the event fires.
    pub fire_second: u32,
    /// Script defined event type.
    pub identifier: i32,
    pub rate: u32,
}

/// Mutable critter attributes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CritterState {
    pub pos: IVec2,
    pub dir: i32,
    pub cond: Cond,
    /// Footprint radius, 0 for a single cell critter.
    pub multihex: i32,
    pub perks: Perks,

    pub perception: i32,
    pub agility: i32,
    pub luck: i32,
    /// Turn order priority.
    pub sequence: i32,
    pub sneak: i32,
    pub bonus_look: i32,
    pub items_weight: i32,
    pub hp: i32,

    /// Full action point pool in whole points.
    pub action_points: i32,
    /// Current action points in `AP_DIVIDER` units, may go negative.
    pub current_ap: i32,
    pub max_move_ap: i32,
    pub move_ap: i32,
    /// Armor class bonus earned from unspent points last turn.
    pub turn_based_ac: i32,
    /// Action points still needed to stand up when knocked out.
    pub knockout_ap: i32,

    /// Distance thresholds of the three secondary visibility sets, 0 for
    /// inactive.
    pub show_cr_dist: [i32; 3],

    pub map: Option<MapId>,
    /// Travel group when on the global map, the critter itself included.
    pub group: Vec<CritterId>,
    /// Battle timeout in seconds, blocks leaving the map while set.
    pub battle_timeout: Option<u32>,

    pub time_events: Vec<TimeEvent>,
    pub next_time_event_id: u32,

    /// Whether a client is attached to a player critter.
    pub connected: bool,
}

impl Default for CritterState {
    fn default() -> Self {
        CritterState {
            pos: IVec2::ZERO,
            dir: 0,
            cond: Life,
            multihex: 0,
            perks: Perks::empty(),
            perception: 5,
            agility: 5,
            luck: 5,
            sequence: 10,
            sneak: 0,
            bonus_look: 0,
            items_weight: 0,
            hp: 30,
            action_points: 8,
            current_ap: 8 * AP_DIVIDER,
            max_move_ap: 0,
            move_ap: 0,
            turn_based_ac: 0,
            knockout_ap: 0,
            show_cr_dist: [0; 3],
            map: None,
            group: Vec::new(),
            battle_timeout: None,
            time_events: Vec::new(),
            next_time_event_id: 1,
            connected: true,
        }
    }
}

impl CritterState {
    pub fn is_alive(&self) -> bool {
        self.cond == Life
    }

    pub fn is_dead(&self) -> bool {
        self.cond == Dead
    }
}

/// Relation sets of a critter, see the visibility module.
#[derive(Default, Debug)]
pub(crate) struct VisSets {
    /// Critters this critter sees.
    pub visible: IndexSet<CritterId>,
    /// Critters that see this critter.
    pub observers: IndexSet<CritterId>,
    /// Secondary sets of critters within the `show_cr_dist` thresholds.
    pub dist: [HashSet<CritterId>; 3],
    /// Bumped on every change to `visible` or `observers`.
    pub version: u64,
}

pub type CritterRef = Arc<Critter>;

pub struct Critter {
    pub id: CritterId,
    pub kind: CritterKind,
    pub(crate) sync: SyncObject,
    destroyed: AtomicBool,
    state: RwLock<CritterState>,
    pub(crate) vis: Mutex<VisSets>,
    pub(crate) vis_items: Mutex<HashSet<ItemId>>,
}

impl PartialEq for Critter {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Critter {}

impl fmt::Debug for Critter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Critter")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &*self.state.read().unwrap())
            .finish_non_exhaustive()
    }
}

impl Critter {
    pub fn new(id: CritterId, kind: CritterKind, mut state: CritterState) -> Self {
        if state.group.is_empty() {
            state.group.push(id);
        }
        Critter {
            id,
            kind,
            sync: Default::default(),
            destroyed: Default::default(),
            state: RwLock::new(state),
            vis: Default::default(),
            vis_items: Default::default(),
        }
    }

    /// Access state using a closure.
    pub fn with<U>(&self, f: impl FnOnce(&CritterState) -> U) -> U {
        f(&self.state.read().unwrap())
    }

    /// Access and mutate state using a closure.
    pub fn with_mut<U>(&self, f: impl FnOnce(&mut CritterState) -> U) -> U {
        f(&mut self.state.write().unwrap())
    }

    pub fn state(&self) -> CritterState {
        self.with(|s| s.clone())
    }

    pub fn pos(&self) -> IVec2 {
        self.with(|s| s.pos)
    }

    pub fn dir(&self) -> i32 {
        self.with(|s| s.dir)
    }

    pub fn cond(&self) -> Cond {
        self.with(|s| s.cond)
    }

    pub fn map_id(&self) -> Option<MapId> {
        self.with(|s| s.map)
    }

    pub fn is_player(&self) -> bool {
        self.kind == CritterKind::Player
    }

    pub fn is_npc(&self) -> bool {
        self.kind == CritterKind::Npc
    }

    pub fn is_dead(&self) -> bool {
        self.cond() == Dead
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub(crate) fn set_destroyed(&self) {
        self.destroyed.store(true, Ordering::Release);
    }

    /// Take the logical sync lock of this critter for the rest of the
    /// current work cycle.
    pub fn sync_lock(&self) {
        self.sync.lock();
    }

    /// Effective look radius.
    pub fn look(&self, cfg: &Config) -> i32 {
        self.with(|s| {
            (cfg.look_normal + 3 * s.perception + s.bonus_look + s.multihex)
                .max(cfg.look_minimum)
        })
    }

    /// Sneak skill after the carried weight penalty.
    pub fn sneak_coefficient(&self, cfg: &Config) -> i32 {
        self.with(|s| {
            let mut ret = s.sneak.max(0);
            if cfg.look_checks.contains(LookChecks::SNEAK_WEIGHT) {
                ret -= s.items_weight / cfg.look_weight;
            }
            ret
        })
    }

    pub fn is_hidden(&self) -> bool {
        self.with(|s| s.perks.contains(Perks::HIDDEN))
    }

    pub fn check_find(&self, find: FindType) -> bool {
        if find.contains(FindType::ONLY_PLAYERS) && !self.is_player() {
            return false;
        }
        if find.contains(FindType::ONLY_NPC) && !self.is_npc() {
            return false;
        }
        match self.cond() {
            Life => find.contains(FindType::LIFE),
            Knockout => find.contains(FindType::KNOCKOUT),
            Dead => find.contains(FindType::DEAD),
        }
    }

    /// Send a packet to the client controlling this critter.
    ///
    /// Does nothing for NPCs and disconnected players.
    pub fn send(&self, r: &Runtime, packet: Packet) {
        if self.is_player() && self.with(|s| s.connected) {
            r.net.send(self.id, packet);
        }
    }

    /// Packet describing this critter to a client.
    pub(crate) fn add_packet(&self, chosen: bool) -> Packet {
        self.with(|s| Packet::AddCritter {
            id: self.id,
            pos: s.pos,
            dir: s.dir,
            chosen,
        })
    }

    /// Spend action points to get up from knockout.
    ///
    /// Returns whether the critter is standing afterwards.
    pub fn try_up_on_knockout(&self) -> bool {
        self.with_mut(|s| {
            if s.cond != Knockout {
                return s.cond == Life;
            }
            if s.hp <= 0 {
                return false;
            }

            if s.knockout_ap > 0 {
                let cur_ap = s.current_ap / AP_DIVIDER;
                if cur_ap <= 0 {
                    return false;
                }
                let ap = s.knockout_ap.min(cur_ap);
                s.current_ap -= ap * AP_DIVIDER;
                s.knockout_ap -= ap;
                if s.knockout_ap > 0 {
                    return false;
                }
            }

            // Wait until regeneration brings points back to zero.
            if s.current_ap < 0 {
                return false;
            }

            s.cond = Life;
            true
        })
    }

    /// Knock the critter out, it must spend `lost_ap` to get up.
    pub fn knockout(&self, lost_ap: i32) {
        self.with_mut(|s| {
            if s.cond == Life {
                s.cond = Knockout;
                s.knockout_ap = lost_ap.max(0);
            }
        });
    }

    /// Take hit points off, knocking out or killing the critter when they
    /// run low enough.
    pub fn damage(&self, r: &Runtime, amount: i32, attacker: Option<CritterId>) {
        let hp = self.with_mut(|s| {
            s.hp -= amount.max(0);
            s.hp
        });
        if hp <= r.config.dead_hit_points {
            self.kill(r, attacker);
        } else if hp <= 0 {
            self.knockout(-hp);
        }
    }

    /// Turn the critter into a corpse.
    pub fn kill(&self, r: &Runtime, killer: Option<CritterId>) {
        let Some((pos, multihex, map)) = self.with_mut(|s| {
            if s.cond == Dead {
                return None;
            }
            s.hp = s.hp.min(0);
            s.cond = Dead;
            Some((s.pos, s.multihex, s.map))
        }) else {
            return;
        };

        log::debug!("{} died", self.id);

        let Some(map) = map.and_then(|id| r.map(id)) else {
            return;
        };
        map.unset_flag_critter(r, pos, multihex, false);
        map.set_flag_critter(r, pos, multihex, true);

        r.raise(&Event::MapCritterDead {
            map: map.id,
            critter: self.id,
            killer,
        });

        if map.is_critter_turn(self.id) {
            map.end_critter_turn(r);
        }
    }

    /// Schedule a timed script callback `seconds` from now, return its id.
    pub fn add_time_event(
        &self,
        r: &Runtime,
        identifier: i32,
        rate: u32,
        seconds: u32,
    ) -> u32 {
        let fire_second = r.now().second() + seconds;
        self.with_mut(|s| {
            let id = s.next_time_event_id;
            s.next_time_event_id += 1;
            insert_time_event(
                &mut s.time_events,
                TimeEvent {
                    id,
                    fire_second,
                    identifier,
                    rate,
                },
            );
            id
        })
    }

    pub fn erase_time_event(&self, id: u32) -> bool {
        self.with_mut(|s| {
            let n = s.time_events.len();
            s.time_events.retain(|e| e.id != id);
            s.time_events.len() != n
        })
    }

    /// Push every pending time event later by `offset` seconds.
    pub fn continue_time_events(&self, offset: u32) {
        if offset == 0 {
            return;
        }
        self.with_mut(|s| {
            for e in s.time_events.iter_mut() {
                e.fire_second = e.fire_second.saturating_add(offset);
            }
        });
    }

    /// Fire every time event that is due.
    ///
    /// A handler that returns `Uint(n)` reschedules its event `n` seconds
    /// ahead, otherwise the event is dropped.
    pub fn process_time_events(&self, r: &Runtime) -> usize {
        let now = r.now().second();
        let due: Vec<TimeEvent> = self.with_mut(|s| {
            let n = s.time_events.partition_point(|e| e.fire_second <= now);
            s.time_events.drain(..n).collect()
        });

        for event in &due {
            let ret = r.raise(&Event::CritterTimeEvent {
                critter: self.id,
                event: *event,
            });
            if let Some(secs) = ret.and_then(|v| v.as_uint()) {
                let next = TimeEvent {
                    fire_second: now + secs.max(1),
                    ..*event
                };
                self.with_mut(|s| insert_time_event(&mut s.time_events, next));
            }
        }

        due.len()
    }
}

/// Keep the list sorted by firing time, insertion order among equals.
fn insert_time_event(events: &mut Vec<TimeEvent>, event: TimeEvent) {
    let i = events.partition_point(|e| e.fire_second <= event.fire_second);
    events.insert(i, event);
}
