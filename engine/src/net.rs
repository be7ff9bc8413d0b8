//! Outgoing notifications to connected players.

use std::sync::{mpsc, Mutex};

use derive_more::Deref;

use crate::prelude::*;

/// Messages the server pushes to a client.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Packet {
    /// Critter came into view. `chosen` marks the receiver's own critter.
    AddCritter {
        id: CritterId,
        pos: IVec2,
        dir: i32,
        chosen: bool,
    },
    RemoveCritter { id: CritterId },
    /// Resend the receiver's inventory.
    AddAllItems,
    AddItemOnMap { id: ItemId, pid: u16, pos: IVec2 },
    EraseItemFromMap { id: ItemId },
    /// Map level state, `None` when on the global map.
    GameInfo {
        map: Option<MapId>,
        turn_based: bool,
    },
    /// It's now `id`'s turn and it lasts `time_ms`.
    TurnBasedTurn { id: CritterId, time_ms: u32 },
}

impl Packet {
    pub(crate) fn add_item(item: &Item) -> Packet {
        Packet::AddItemOnMap {
            id: item.id,
            pid: item.pid,
            pos: item.pos,
        }
    }
}

/// Network capability, fire and forget.
pub trait Sender: Send + Sync {
    fn send(&self, to: CritterId, packet: Packet);
}

/// Sending disabled.
impl Sender for () {
    fn send(&self, _to: CritterId, _packet: Packet) {}
}

/// Sender that pushes everything into a channel.
pub struct ChannelSender(Mutex<mpsc::Sender<(CritterId, Packet)>>);

impl Sender for ChannelSender {
    fn send(&self, to: CritterId, packet: Packet) {
        // Receiver gone means nobody is listening anymore, drop the packet.
        let _ = self.0.lock().unwrap().send((to, packet));
    }
}

#[derive(Deref)]
pub struct Outbox(mpsc::Receiver<(CritterId, Packet)>);

impl Outbox {
    /// Collect everything sent so far.
    pub fn drain(&self) -> Vec<(CritterId, Packet)> {
        self.0.try_iter().collect()
    }

    /// Collect everything sent so far to one critter.
    pub fn drain_for(&self, id: CritterId) -> Vec<Packet> {
        self.drain()
            .into_iter()
            .filter_map(|(to, p)| (to == id).then_some(p))
            .collect()
    }
}

pub fn channel() -> (ChannelSender, Outbox) {
    let (send, recv) = mpsc::channel();
    (ChannelSender(Mutex::new(send)), Outbox(recv))
}
