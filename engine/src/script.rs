//! Interface to the game logic scripts.
use std::{fmt, sync::Mutex};

use strum::{EnumDiscriminants, IntoStaticStr};
use util::HashMap;

use crate::{prelude::*, TimeEvent};

/// Engine events that script handlers can be bound to.
///
/// Critter arguments come in the order the handler sees them, the critter
/// whose handler runs is first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoStaticStr, EnumDiscriminants)]
#[strum(serialize_all = "kebab-case")]
#[strum_discriminants(name(EventKind))]
#[strum_discriminants(derive(Hash, IntoStaticStr))]
#[strum_discriminants(strum(serialize_all = "kebab-case"))]
pub enum Event {
    /// Decide whether `observer` can see `target`, replaces the built-in
    /// geometry when bound. Expects a `Bool` result.
    CheckLook {
        map: MapId,
        observer: CritterId,
        target: CritterId,
    },
    /// Decide whether `critter` notices a trap. Expects a `Bool` result.
    CheckTrapLook {
        map: MapId,
        critter: CritterId,
        item: ItemId,
    },

    CritterShow { critter: CritterId, shown: CritterId },
    CritterHide { critter: CritterId, hidden: CritterId },
    CritterShowDist1 { critter: CritterId, shown: CritterId },
    CritterShowDist2 { critter: CritterId, shown: CritterId },
    CritterShowDist3 { critter: CritterId, shown: CritterId },
    CritterHideDist1 { critter: CritterId, hidden: CritterId },
    CritterHideDist2 { critter: CritterId, hidden: CritterId },
    CritterHideDist3 { critter: CritterId, hidden: CritterId },

    /// `added` is set when the item was just placed on the map and `dropper`
    /// is whoever put it there.
    CritterShowItemOnMap {
        critter: CritterId,
        item: ItemId,
        added: bool,
        dropper: Option<CritterId>,
    },
    /// `removed` is set when the item was just taken off the map and
    /// `picker` is whoever took it.
    CritterHideItemOnMap {
        critter: CritterId,
        item: ItemId,
        removed: bool,
        picker: Option<CritterId>,
    },

    MapInCritter { map: MapId, critter: CritterId },
    MapOutCritter { map: MapId, critter: CritterId },
    MapCritterDead {
        map: MapId,
        critter: CritterId,
        killer: Option<CritterId>,
    },
    /// Loop timer `index`, counted from 1, elapsed.
    MapLoop { map: MapId, index: u32 },

    TurnBasedBegin { map: MapId },
    TurnBasedEnd { map: MapId },
    TurnBasedProcess {
        map: MapId,
        critter: CritterId,
        begin_turn: bool,
    },

    /// Expects `Uint(n)` to fire again after `n` seconds, anything else
    /// drops the event.
    CritterTimeEvent { critter: CritterId, event: TimeEvent },
}

impl Event {
    /// Show event for one of the three distance threshold sets.
    pub(crate) fn show_dist(n: usize, critter: CritterId, shown: CritterId) -> Event {
        match n {
            0 => Event::CritterShowDist1 { critter, shown },
            1 => Event::CritterShowDist2 { critter, shown },
            _ => Event::CritterShowDist3 { critter, shown },
        }
    }

    pub(crate) fn hide_dist(n: usize, critter: CritterId, hidden: CritterId) -> Event {
        match n {
            0 => Event::CritterHideDist1 { critter, hidden },
            1 => Event::CritterHideDist2 { critter, hidden },
            _ => Event::CritterHideDist3 { critter, hidden },
        }
    }

    pub fn kind(&self) -> EventKind {
        self.into()
    }
}

impl EventKind {
    pub(crate) fn show_dist(n: usize) -> EventKind {
        [
            EventKind::CritterShowDist1,
            EventKind::CritterShowDist2,
            EventKind::CritterShowDist3,
        ][n]
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{name}")
    }
}

/// Value returned by a script handler.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ScriptValue {
    Unit,
    Bool(bool),
    Uint(u32),
}

impl ScriptValue {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            ScriptValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_uint(self) -> Option<u32> {
        match self {
            ScriptValue::Uint(n) => Some(n),
            _ => None,
        }
    }
}

/// Script capability.
///
/// The engine never holds data locks while calling into the host, handlers
/// are free to query and mutate the runtime.
pub trait ScriptHost: Send + Sync {
    /// Whether a handler is bound for the event kind.
    fn is_bound(&self, kind: EventKind) -> bool;

    /// Run the handler for the event.
    ///
    /// Returns `None` if no handler ran or the handler failed.
    fn invoke(&self, r: &Runtime, event: &Event) -> Option<ScriptValue>;
}

/// No scripts.
impl ScriptHost for () {
    fn is_bound(&self, _kind: EventKind) -> bool {
        false
    }

    fn invoke(&self, _r: &Runtime, _event: &Event) -> Option<ScriptValue> {
        None
    }
}

type Handler =
    Box<dyn Fn(&Runtime, &Event) -> Option<ScriptValue> + Send + Sync>;

/// Script host made of native closures, records every event it handles.
#[derive(Default)]
pub struct ScriptTable {
    handlers: HashMap<EventKind, Handler>,
    log: Mutex<Vec<Event>>,
}

impl ScriptTable {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn bind(
        mut self,
        kind: EventKind,
        f: impl Fn(&Runtime, &Event) -> Option<ScriptValue> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(kind, Box::new(f));
        self
    }

    /// Bind a handler that does nothing, so the event gets recorded.
    pub fn record(self, kind: EventKind) -> Self {
        self.bind(kind, |_, _| Some(ScriptValue::Unit))
    }

    /// Drain recorded events.
    pub fn take_log(&self) -> Vec<Event> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }
}

impl ScriptHost for ScriptTable {
    fn is_bound(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    fn invoke(&self, r: &Runtime, event: &Event) -> Option<ScriptValue> {
        let f = self.handlers.get(&event.kind())?;
        self.log.lock().unwrap().push(*event);
        f(r, event)
    }
}
