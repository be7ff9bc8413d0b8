use std::fmt;

use bitflags::bitflags;
use derives::KebabFlags;
use glam::IVec2;
use hexgrid::BlockLine;
use serde::{Deserialize, Serialize};

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
pub struct ItemId(pub u32);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

bitflags! {
    #[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Debug, KebabFlags)]
    pub struct ItemFlags: u16 {
        /// Never shown to anyone.
        const HIDDEN = 0x01;
        /// Shown to everyone on the map regardless of distance.
        const ALWAYS_VIEW = 0x02;
        /// Seen only up close, the trap value adds to the distance.
        const TRAP = 0x04;
        const TRIGGER = 0x08;
        /// Doesn't block movement.
        const NO_BLOCK = 0x10;
        /// Doesn't block line of sight.
        const SHOOT_THRU = 0x20;
        const GAG = 0x40;
    }
}

/// Item lying on a map.
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Prototype identifier.
    pub pid: u16,
    pub pos: IVec2,
    pub flags: ItemFlags,
    /// Extra distance needed to notice a trap.
    pub trap_value: i32,
    /// Extra footprint, walked from `pos`.
    pub block_lines: Vec<BlockLine>,
}

impl Item {
    pub fn new(pid: u16, pos: IVec2) -> Self {
        Item {
            pid,
            pos,
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: ItemFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is(&self, flags: ItemFlags) -> bool {
        self.flags.intersects(flags)
    }

    /// Distance penalty to add when checking whether the item is noticed.
    pub fn view_penalty(&self) -> i32 {
        if self.is(ItemFlags::TRAP) {
            self.trap_value
        } else {
            0
        }
    }
}
