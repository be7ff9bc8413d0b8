pub use crate::{
    Config, Critter, CritterId, CritterKind, CritterRef, CritterState,
    Event, EventKind, FindType, HexFlags, Instant, Item, ItemFlags, ItemId,
    LookChecks, Map, MapId, MapRef, Packet, ProtoMap, Runtime, ScriptValue,
    AP_DIVIDER,
};
pub use glam::{ivec2, IVec2};
pub use hexgrid::Layout;
pub use util::{HashMap, HashSet, IndexMap, IndexSet};
