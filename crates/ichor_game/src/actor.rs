//! Map objects.
//!
//! Actors live in a generational slab inside [`World`](crate::World);
//! cross-references (target, tracer, last enemy) are net ids rather than
//! pointers, which is also exactly what goes over the wire.

use ichor_protocol::math::{Angle, Fixed};
use ichor_protocol::types::{ActorPosition, MiscState, NetId, PlayerPosition};
use serde::{Deserialize, Serialize};

/// A slab slot paired with a generation counter, so a stale id can never
/// reach an actor that replaced a removed one.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, PartialOrd, Ord,
)]
pub struct ActorId {
    pub index: u32,
    pub generation: u32,
}

/// The kinds of map object the core cares about. The renderer-facing
/// bestiary is much larger; everything else reaches the core as `Other`
/// with its editor number.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ActorKind {
    Player,
    TeleportFog,
    Puff,
    Blood,
    Barrel,
    RocketMissile,
    PlasmaMissile,
    BfgMissile,
    BrainCube,
    FlagStand,
    Flag,
    Monster(u16),
    Other(u16),
}

impl ActorKind {
    pub const fn is_missile_kind(self) -> bool {
        matches!(
            self,
            Self::RocketMissile | Self::PlasmaMissile | Self::BfgMissile | Self::BrainCube
        )
    }

    /// Spawn-only effects: broadcast once, never position-synced.
    pub const fn is_effect(self) -> bool {
        matches!(self, Self::TeleportFog | Self::Puff | Self::Blood)
    }

    /// Stable integer used on the wire.
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Player => 0,
            Self::TeleportFog => 1,
            Self::Puff => 2,
            Self::Blood => 3,
            Self::Barrel => 4,
            Self::RocketMissile => 5,
            Self::PlasmaMissile => 6,
            Self::BfgMissile => 7,
            Self::BrainCube => 8,
            Self::FlagStand => 9,
            Self::Flag => 10,
            Self::Monster(n) => 0x1_0000 | n as u32,
            Self::Other(n) => 0x2_0000 | n as u32,
        }
    }

    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Player,
            1 => Self::TeleportFog,
            2 => Self::Puff,
            3 => Self::Blood,
            4 => Self::Barrel,
            5 => Self::RocketMissile,
            6 => Self::PlasmaMissile,
            7 => Self::BfgMissile,
            8 => Self::BrainCube,
            9 => Self::FlagStand,
            10 => Self::Flag,
            n if n & 0x1_0000 != 0 => Self::Monster((n & 0xFFFF) as u16),
            n => Self::Other((n & 0xFFFF) as u16),
        }
    }
}

/// Actor flag bits, snapshot wholesale into the rings.
pub struct ActorFlags;

impl ActorFlags {
    pub const SOLID: u32 = 1;
    pub const SHOOTABLE: u32 = 1 << 1;
    pub const NOGRAVITY: u32 = 1 << 2;
    pub const NOCLIP: u32 = 1 << 3;
    pub const FLY: u32 = 1 << 4;
    pub const MISSILE: u32 = 1 << 5;
    pub const CORPSE: u32 = 1 << 6;
    pub const COUNTKILL: u32 = 1 << 7;
    pub const NOBLOOD: u32 = 1 << 8;
    /// Set during an unlagged evaluation on targets that were not alive at
    /// the rewound tic.
    pub const NODAMAGE: u32 = 1 << 9;
    pub const SPECTATOR: u32 = 1 << 10;
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Actor {
    pub kind: ActorKind,
    pub net_id: NetId,
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub momx: Fixed,
    pub momy: Fixed,
    pub momz: Fixed,
    pub angle: Angle,
    pub pitch: Fixed,
    pub radius: Fixed,
    pub height: Fixed,
    pub health: i32,
    pub flags: u32,
    pub flags2: u32,
    pub flags3: u32,
    pub flags4: u32,
    pub friction: Fixed,
    pub movefactor: Fixed,
    pub reaction_time: i32,
    pub state_number: u32,
    /// Remaining tics in the current state.
    pub tics: i32,
    pub target: NetId,
    pub tracer: NetId,
    pub last_enemy: NetId,
    /// Owning player slot, if this is a player body.
    pub player: Option<u32>,
    pub view_z: Fixed,
    pub floor_clip: Fixed,
    pub jump_time: u8,
}

impl Actor {
    pub fn new(kind: ActorKind, x: Fixed, y: Fixed, z: Fixed, angle: Angle) -> Self {
        let (radius, height, health) = match kind {
            ActorKind::Player => (Fixed::from_int(16), Fixed::from_int(56), 100),
            ActorKind::Barrel => (Fixed::from_int(10), Fixed::from_int(42), 20),
            ActorKind::Monster(_) => (Fixed::from_int(20), Fixed::from_int(56), 60),
            _ => (Fixed::from_int(8), Fixed::from_int(16), 1000),
        };

        Self {
            kind,
            net_id: NetId::NONE,
            x,
            y,
            z,
            momx: Fixed::ZERO,
            momy: Fixed::ZERO,
            momz: Fixed::ZERO,
            angle,
            pitch: Fixed::ZERO,
            radius,
            height,
            health,
            flags: match kind {
                ActorKind::Player | ActorKind::Barrel | ActorKind::Monster(_) => {
                    ActorFlags::SOLID | ActorFlags::SHOOTABLE
                }
                k if k.is_missile_kind() => ActorFlags::MISSILE | ActorFlags::NOGRAVITY,
                _ => 0,
            },
            flags2: 0,
            flags3: 0,
            flags4: 0,
            friction: Fixed(0xE800),
            movefactor: Fixed(0x2000),
            reaction_time: 0,
            state_number: 0,
            tics: -1,
            target: NetId::NONE,
            tracer: NetId::NONE,
            last_enemy: NetId::NONE,
            player: None,
            view_z: Fixed::from_int(41),
            floor_clip: Fixed::ZERO,
            jump_time: 0,
        }
    }

    pub fn is_missile(&self) -> bool {
        self.flags & ActorFlags::MISSILE != 0
    }

    pub fn is_shootable(&self) -> bool {
        self.flags & ActorFlags::SHOOTABLE != 0 && self.flags & ActorFlags::NODAMAGE == 0
    }

    /// Snapshot of everything the position ring stores.
    pub fn save_position(&self, world_index: u32) -> PlayerPosition {
        PlayerPosition {
            world_index,
            x: self.x,
            y: self.y,
            z: self.z,
            momx: self.momx,
            momy: self.momy,
            momz: self.momz,
            angle: self.angle,
            pitch: self.pitch,
            view_z: self.view_z,
            floor_clip: self.floor_clip,
            jump_time: self.jump_time,
            flags: self.flags,
        }
    }

    /// Restores a position snapshot wholesale. The inverse of
    /// [`save_position`](Self::save_position), bit for bit.
    pub fn load_position(&mut self, pos: &PlayerPosition) {
        self.x = pos.x;
        self.y = pos.y;
        self.z = pos.z;
        self.momx = pos.momx;
        self.momy = pos.momy;
        self.momz = pos.momz;
        self.angle = pos.angle;
        self.pitch = pos.pitch;
        self.view_z = pos.view_z;
        self.floor_clip = pos.floor_clip;
        self.jump_time = pos.jump_time;
        self.flags = pos.flags;
    }

    pub fn save_misc_state(&self, world_index: u32) -> MiscState {
        MiscState {
            world_index,
            flags: self.flags,
            flags2: self.flags2,
            flags3: self.flags3,
            flags4: self.flags4,
            friction: self.friction,
            movefactor: self.movefactor,
            reaction_time: self.reaction_time,
        }
    }

    pub fn load_misc_state(&mut self, misc: &MiscState) {
        self.flags = misc.flags;
        self.flags2 = misc.flags2;
        self.flags3 = misc.flags3;
        self.flags4 = misc.flags4;
        self.friction = misc.friction;
        self.movefactor = misc.movefactor;
        self.reaction_time = misc.reaction_time;
    }

    pub fn save_actor_position(&self, world_index: u32) -> ActorPosition {
        ActorPosition {
            world_index,
            x: self.x,
            y: self.y,
            z: self.z,
            momx: self.momx,
            momy: self.momy,
            momz: self.momz,
            angle: self.angle,
        }
    }
}
