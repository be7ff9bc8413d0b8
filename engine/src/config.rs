use std::path::Path;

use anyhow::{bail, Context};
use bitflags::bitflags;
use derives::KebabFlags;
use hexgrid::Layout;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Optional parts of the critter visibility computation.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, KebabFlags)]
    pub struct LookChecks: u32 {
        /// Look radius shrinks when the target is off to the side or behind.
        const DIR = 0x01;
        /// Sneaking is easier behind the observer's back.
        const SNEAK_DIR = 0x02;
        /// Carried weight penalizes sneaking.
        const SNEAK_WEIGHT = 0x04;
        /// Line of sight must be clear.
        const TRACE = 0x08;
        /// A bound `CheckLook` script event replaces the geometry.
        const SCRIPT = 0x10;
        /// A bound `CheckTrapLook` script event decides trap visibility.
        const ITEM_SCRIPT = 0x20;
    }
}

/// Immutable server configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub map_layout: Layout,
    pub look_checks: LookChecks,
    /// Base look radius before perception is added.
    pub look_normal: i32,
    /// Effective look radius never goes below this.
    pub look_minimum: i32,
    /// Percentage of look radius lost per direction step between facing and
    /// the bearing to the target.
    pub look_dir: [i32; 5],
    /// Percentage of the sneaker's skill lost per direction step between
    /// the observer's facing and the bearing to the sneaker.
    pub look_sneak_dir: [i32; 5],
    /// Carried weight units that cost one point of sneak.
    pub look_weight: i32,
    pub sneak_divider: i32,
    /// Milliseconds per turn in turn-based combat.
    pub turn_based_tick: i64,
    /// Milliseconds of grace after a turn deadline before the turn is
    /// forcibly passed.
    pub turn_timeout_grace: i64,
    pub dead_hit_points: i32,
    /// Largest footprint or search radius accepted for ring walks.
    pub max_hex_offset: i32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            map_layout: Layout::Hex,
            look_checks: LookChecks::DIR
                | LookChecks::SNEAK_DIR
                | LookChecks::TRACE
                | LookChecks::SCRIPT,
            look_normal: 20,
            look_minimum: 6,
            look_dir: [0, 20, 40, 60, 60],
            look_sneak_dir: [90, 60, 30, 0, 0],
            look_weight: 200,
            sneak_divider: 6,
            turn_based_tick: 30_000,
            turn_timeout_grace: 1_000,
            dead_hit_points: -6,
            max_hex_offset: 50,
        }
    }
}

impl Config {
    /// Load configuration from an IDM file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = Self::parse(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> anyhow::Result<Config> {
        let config: Config = idm::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sneak_divider <= 0 {
            bail!("sneak-divider must be positive, got {}", self.sneak_divider);
        }
        if self.look_weight <= 0 {
            bail!("look-weight must be positive, got {}", self.look_weight);
        }
        if self.look_minimum < 0 {
            bail!("look-minimum can't be negative");
        }
        if !(1..=50).contains(&self.max_hex_offset) {
            bail!("max-hex-offset must be within 1..=50");
        }
        if self.turn_based_tick <= 0 || self.turn_timeout_grace < 0 {
            bail!("invalid turn timing");
        }
        for pct in self.look_dir.iter().chain(&self.look_sneak_dir) {
            if !(0..=100).contains(pct) {
                bail!("direction percentages must be within 0..=100");
            }
        }
        Ok(())
    }
}
