use anyhow::bail;
use bitflags::bitflags;
use derives::KebabFlags;
use glam::{ivec2, IVec2};

use crate::MAP_LOOP_COUNT;

bitflags! {
    /// Map cell flags.
    ///
    /// The low byte holds static flags authored into the map prototype, the
    /// high byte holds dynamic flags maintained at runtime.
    #[derive(Copy, Clone, Default, Eq, PartialEq, Hash, Debug, KebabFlags)]
    pub struct HexFlags: u16 {
        const BLOCK = 0x01;
        const NOT_RAKE = 0x02;
        const WALL = 0x04;
        const SCENERY = 0x08;
        const SCENERY_GRID = 0x10;
        const TRIGGER = 0x20;

        const CRITTER = 0x100;
        const DEAD_CRITTER = 0x200;
        const GAG_ITEM = 0x400;
        const BLOCK_ITEM = 0x800;
        const NRAKE_ITEM = 0x1000;
        const WALK_ITEM = 0x2000;
    }
}

impl HexFlags {
    /// Flags that stop movement.
    pub const NO_WAY: HexFlags = HexFlags::BLOCK
        .union(HexFlags::CRITTER)
        .union(HexFlags::BLOCK_ITEM);

    /// Flags that stop line of sight and projectiles.
    pub const NO_SHOOT: HexFlags = HexFlags::NOT_RAKE.union(HexFlags::NRAKE_ITEM);

    /// Flags recomputed from the items on a cell.
    pub const ITEM_CACHE: HexFlags = HexFlags::GAG_ITEM
        .union(HexFlags::BLOCK_ITEM)
        .union(HexFlags::NRAKE_ITEM)
        .union(HexFlags::WALK_ITEM);

    pub const STATIC: HexFlags = HexFlags::from_bits_truncate(0xff);
}

/// Per-map flat array of cell flags.
#[derive(Clone, Debug)]
pub struct HexGrid {
    size: IVec2,
    statics: Vec<HexFlags>,
    dynamic: Vec<HexFlags>,
}

impl HexGrid {
    pub fn new(proto: &ProtoMap) -> Self {
        HexGrid {
            size: proto.size,
            statics: proto.static_flags.clone(),
            dynamic: vec![HexFlags::empty(); proto.static_flags.len()],
        }
    }

    pub fn size(&self) -> IVec2 {
        self.size
    }

    pub fn contains(&self, p: IVec2) -> bool {
        p.x >= 0 && p.y >= 0 && p.x < self.size.x && p.y < self.size.y
    }

    fn idx(&self, p: IVec2) -> usize {
        assert!(self.contains(p), "hex {p} outside grid {}", self.size);
        (p.y * self.size.x + p.x) as usize
    }

    /// Effective flags of a cell, the union of static and dynamic flags.
    ///
    /// Panics if the cell is outside the grid.
    pub fn flags(&self, p: IVec2) -> HexFlags {
        let i = self.idx(p);
        self.statics[i] | self.dynamic[i]
    }

    /// Effective flags, `None` outside the grid.
    pub fn get(&self, p: IVec2) -> Option<HexFlags> {
        self.contains(p).then(|| self.flags(p))
    }

    pub fn is(&self, p: IVec2, flags: HexFlags) -> bool {
        self.flags(p).intersects(flags)
    }

    pub fn set(&mut self, p: IVec2, flags: HexFlags) {
        debug_assert!((flags & HexFlags::STATIC).is_empty());
        let i = self.idx(p);
        self.dynamic[i] |= flags;
    }

    pub fn unset(&mut self, p: IVec2, flags: HexFlags) {
        let i = self.idx(p);
        self.dynamic[i] &= !flags;
    }
}

/// Read-only map template.
#[derive(Clone, Debug)]
pub struct ProtoMap {
    pub name: String,
    pub size: IVec2,
    pub static_flags: Vec<HexFlags>,
    /// Periods of the map loop timers in milliseconds, zero for inactive.
    pub loop_times: [i64; MAP_LOOP_COUNT],
}

impl ProtoMap {
    /// Empty open map.
    pub fn new(name: impl Into<String>, size: IVec2) -> Self {
        assert!(size.x > 0 && size.y > 0, "bad map size {size}");
        ProtoMap {
            name: name.into(),
            size,
            static_flags: vec![HexFlags::empty(); (size.x * size.y) as usize],
            loop_times: Default::default(),
        }
    }

    /// Build a map from a character grid.
    ///
    /// `.` is open floor, `#` is wall, `~` blocks movement but not sight and
    /// `^` is a trigger cell.
    pub fn from_ascii(name: impl Into<String>, text: &str) -> anyhow::Result<Self> {
        let lines: Vec<&str> = text
            .lines()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .collect();
        if lines.is_empty() {
            bail!("empty map");
        }

        let w = lines[0].chars().count();
        let mut static_flags = Vec::with_capacity(w * lines.len());
        for (y, line) in lines.iter().enumerate() {
            if line.chars().count() != w {
                bail!("ragged map row {y}");
            }
            for (x, c) in line.chars().enumerate() {
                static_flags.push(match c {
                    '.' => HexFlags::empty(),
                    '#' => HexFlags::BLOCK | HexFlags::NOT_RAKE | HexFlags::WALL,
                    '~' => HexFlags::BLOCK,
                    '^' => HexFlags::TRIGGER,
                    _ => bail!("unknown map cell {c:?} at {x}, {y}"),
                });
            }
        }

        Ok(ProtoMap {
            name: name.into(),
            size: ivec2(w as i32, lines.len() as i32),
            static_flags,
            loop_times: Default::default(),
        })
    }
}
