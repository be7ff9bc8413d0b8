//! Server-side game logic: map state, critter visibility and turn-based
//! combat scheduling.

/// Action points are stored in fractional units, this many per whole point.
pub const AP_DIVIDER: i32 = 100;

/// Battle timeout in seconds given to everyone on a map in turn-based mode.
/// Long enough to never expire before combat ends.
pub const TB_BATTLE_TIMEOUT: u32 = 100_000_000;

/// Number of periodic loop timers a map can run.
pub const MAP_LOOP_COUNT: usize = 5;

mod config;
pub use config::{Config, LookChecks};

mod critter;
pub use critter::{
    Cond, Critter, CritterId, CritterKind, CritterRef, CritterState,
    FindType, Perks, TimeEvent,
};

mod hex_grid;
pub use hex_grid::{HexFlags, HexGrid, ProtoMap};

mod item;
pub use item::{Item, ItemFlags, ItemId};

mod item_view;

mod map;
pub use map::{Map, MapId, MapRef};

mod net;
pub use net::{channel, ChannelSender, Outbox, Packet, Sender};

pub mod prelude;

mod runtime;
pub use runtime::Runtime;

mod script;
pub use script::{Event, EventKind, ScriptHost, ScriptTable, ScriptValue};

mod time;
pub use time::{Clock, Instant, ManualClock, SystemClock};

mod turn_based;
pub use turn_based::TurnState;

mod visibility;

#[cfg(test)]
mod test_util;
