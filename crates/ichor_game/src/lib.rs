//! The deterministic world model underneath the client/server core.
//!
//! Everything here must behave identically for the same inputs: the server
//! simulates authoritatively, clients predict with the same code, and demo
//! playback re-runs it from recorded inputs. No wall-clock time, no
//! platform-dependent iteration order, and all randomness comes from the
//! seeded [`SimRng`](rng::SimRng).

pub mod actor;
pub mod combat;
pub mod map;
pub mod player;
pub mod rng;
pub mod sector;
pub mod snapshot;
pub mod world;

pub use actor::{Actor, ActorFlags, ActorId, ActorKind};
pub use map::MapInfo;
pub use player::Player;
pub use rng::SimRng;
pub use sector::{Mover, MoverKind, Sector};
pub use snapshot::GameSnapshot;
pub use world::World;

/// Simulation tics per second.
pub const TICRATE: u32 = 35;

/// Depth of the per-player and per-sector position rings; also the maximum
/// unlagged rewind window, in tics.
pub const MAX_POSITIONS: usize = 128;

/// dmflags: rule switches every client must agree on.
pub mod dmflags {
    pub const ITEMS_RESPAWN: u32 = 1;
    pub const WEAPONS_STAY: u32 = 1 << 1;
    pub const MONSTERS_RESPAWN: u32 = 1 << 2;
    pub const FALLING_DAMAGE: u32 = 1 << 3;
    pub const SPAWN_ARMOR: u32 = 1 << 4;
    pub const SPAWN_SUPER_ITEMS: u32 = 1 << 5;
    pub const RESPAWN_PROTECTION: u32 = 1 << 6;
    pub const ALLOW_EXIT: u32 = 1 << 7;
    pub const ALLOW_JUMP: u32 = 1 << 8;
    pub const ALLOW_FREELOOK: u32 = 1 << 9;
    pub const INFINITE_AMMO: u32 = 1 << 10;
    pub const ALLOW_TARGET_NAMES: u32 = 1 << 11;
    pub const ALLOW_MOVEBOB_CHANGE: u32 = 1 << 12;
    pub const ALLOW_WEAPON_SPEED_CHANGE: u32 = 1 << 13;
}

/// dmflags2: the second word of rule switches.
pub mod dmflags2 {
    pub const ALLOW_CHASECAM: u32 = 1;
    pub const FRIENDLY_FIRE: u32 = 1 << 1;
    pub const KEEP_ITEMS_ON_EXIT: u32 = 1 << 2;
    pub const DROP_WEAPONS: u32 = 1 << 3;
    pub const SILENT_BFG: u32 = 1 << 4;
}
