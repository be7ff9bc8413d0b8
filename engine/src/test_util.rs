use std::sync::Arc;

use crate::{channel, prelude::*, ManualClock, Outbox};

/// Test side of a runtime's clock and network.
pub struct Env {
    pub clock: Arc<ManualClock>,
    pub outbox: Outbox,
}

impl Env {
    pub fn advance(&self, millis: i64) {
        self.clock.advance(millis);
    }

    pub fn drain(&self) -> Vec<(CritterId, Packet)> {
        self.outbox.drain()
    }

    pub fn drain_for(&self, id: CritterId) -> Vec<Packet> {
        self.outbox.drain_for(id)
    }
}

/// Runtime with a manual clock and a recording sender.
pub fn runtime(config: Config) -> (Runtime, Env) {
    let clock = Arc::new(ManualClock::default());
    let (sender, outbox) = channel();
    let r = Runtime::new(config)
        .with_seed(1)
        .with_clock(clock.clone())
        .with_sender(Arc::new(sender));
    (r, Env { clock, outbox })
}

/// Empty map with no static obstacles.
pub fn open_map(r: &Runtime, w: i32, h: i32) -> MapRef {
    r.create_map(ProtoMap::new("test", ivec2(w, h)))
}

pub fn critter_at(
    r: &Runtime,
    map: &Map,
    kind: CritterKind,
    pos: IVec2,
) -> CritterRef {
    let cr = r.spawn(
        kind,
        CritterState {
            pos,
            ..Default::default()
        },
    );
    assert!(map.add_critter(r, &cr));
    cr
}

pub fn player_at(r: &Runtime, map: &Map, pos: IVec2) -> CritterRef {
    critter_at(r, map, CritterKind::Player, pos)
}

pub fn npc_at(r: &Runtime, map: &Map, pos: IVec2) -> CritterRef {
    critter_at(r, map, CritterKind::Npc, pos)
}
