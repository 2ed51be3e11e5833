//! Actor and world-event messages.
//!
//! Everything here is keyed by per-map net id. Missiles are position-synced
//! only at spawn; clients simulate their flight locally. Puffs, blood, and
//! teleport fog are spawn-only effects and never receive position updates.

use crate::math::{Angle, Fixed};
use crate::types::{
    ActivationKind, ActorPosition, ActorTargetKind, MiscState, NetId, SectorPosition,
};
use crate::{Decode, Encode, Message, MessageKind, MessageSide};

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::PuffSpawned, side = MessageSide::Clientbound)]
pub struct PuffSpawnedS2c {
    pub world_index: u32,
    pub net_id: NetId,
    pub shooter_net_id: NetId,
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    /// Aim slope indicator used to pick the puff animation.
    pub updown: i32,
    pub particles: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::BloodSpawned, side = MessageSide::Clientbound)]
pub struct BloodSpawnedS2c {
    pub world_index: u32,
    pub net_id: NetId,
    pub shooter_net_id: NetId,
    pub target_net_id: NetId,
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub damage: i32,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::ActorSpawned, side = MessageSide::Clientbound)]
pub struct ActorSpawnedS2c {
    pub world_index: u32,
    pub net_id: NetId,
    pub actor_type: u32,
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub angle: Angle,
    pub flags: u32,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::ActorPosition, side = MessageSide::Clientbound)]
pub struct ActorPositionS2c {
    pub world_index: u32,
    pub net_id: NetId,
    pub position: ActorPosition,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::ActorMiscState, side = MessageSide::Clientbound)]
pub struct ActorMiscStateS2c {
    pub world_index: u32,
    pub net_id: NetId,
    pub misc_state: MiscState,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::ActorTarget, side = MessageSide::Clientbound)]
pub struct ActorTargetS2c {
    pub world_index: u32,
    pub net_id: NetId,
    pub target_kind: ActorTargetKind,
    pub target_net_id: NetId,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::ActorState, side = MessageSide::Clientbound)]
pub struct ActorStateS2c {
    pub world_index: u32,
    pub net_id: NetId,
    pub state_number: u32,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::ActorDamaged, side = MessageSide::Clientbound)]
pub struct ActorDamagedS2c {
    pub world_index: u32,
    pub target_net_id: NetId,
    pub inflictor_net_id: NetId,
    pub source_net_id: NetId,
    pub damage: i32,
    pub health: i32,
    pub mod_type: u32,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::ActorKilled, side = MessageSide::Clientbound)]
pub struct ActorKilledS2c {
    pub world_index: u32,
    pub target_net_id: NetId,
    pub inflictor_net_id: NetId,
    pub source_net_id: NetId,
    pub damage: i32,
    pub mod_type: u32,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::ActorRemoved, side = MessageSide::Clientbound)]
pub struct ActorRemovedS2c {
    pub world_index: u32,
    pub net_id: NetId,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::LineActivated, side = MessageSide::Clientbound)]
pub struct LineActivatedS2c {
    pub world_index: u32,
    pub actor_net_id: NetId,
    pub line_number: u32,
    pub side: u8,
    pub activation: ActivationKind,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::MonsterActive, side = MessageSide::Clientbound)]
pub struct MonsterActiveS2c {
    pub world_index: u32,
    pub net_id: NetId,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::MonsterAwakened, side = MessageSide::Clientbound)]
pub struct MonsterAwakenedS2c {
    pub world_index: u32,
    pub net_id: NetId,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::MissileSpawned, side = MessageSide::Clientbound)]
pub struct MissileSpawnedS2c {
    pub world_index: u32,
    pub net_id: NetId,
    pub source_net_id: NetId,
    pub actor_type: u32,
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub momx: Fixed,
    pub momy: Fixed,
    pub momz: Fixed,
    pub angle: Angle,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::MissileExploded, side = MessageSide::Clientbound)]
pub struct MissileExplodedS2c {
    pub world_index: u32,
    pub net_id: NetId,
    /// Remaining animation tics, so the explosion ends simultaneously
    /// everywhere.
    pub tics: u32,
}

/// A boss-brain spawn cube in flight.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::CubeSpawned, side = MessageSide::Clientbound)]
pub struct CubeSpawnedS2c {
    pub world_index: u32,
    pub net_id: NetId,
    pub target_net_id: NetId,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::SectorPosition, side = MessageSide::Clientbound)]
pub struct SectorPositionS2c {
    pub world_index: u32,
    pub sector_number: u32,
    pub position: SectorPosition,
}
