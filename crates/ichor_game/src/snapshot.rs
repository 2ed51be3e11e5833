//! Full-state snapshots.
//!
//! The same bytes back three consumers: the `gamestate`/`currentstate`
//! messages to joining clients, demo checkpoint save files, and the sync
//! barrier after a map change. The format is versioned by build; there is
//! no cross-version compatibility, by contract.

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

use crate::player::Player;
use crate::world::World;

/// Bumped whenever any serialized structure changes shape.
pub const SNAPSHOT_VERSION: u32 = 3;

#[derive(Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub version: u32,
    pub map_name: String,
    pub level_time: u32,
    pub world: World,
    pub players: Vec<Option<Player>>,
}

impl GameSnapshot {
    pub fn capture(map_name: &str, world: &World, players: &[Option<Player>]) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            map_name: map_name.into(),
            level_time: world.level_time,
            world: world.clone(),
            players: players.to_vec(),
        }
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(self).context("serializing game snapshot")
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let snapshot: Self =
            serde_json::from_slice(bytes).context("deserializing game snapshot")?;

        ensure!(
            snapshot.version == SNAPSHOT_VERSION,
            "snapshot version {} does not match this build ({})",
            snapshot.version,
            SNAPSHOT_VERSION
        );

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use ichor_protocol::math::{Angle, Fixed};

    use super::*;
    use crate::actor::{Actor, ActorKind};
    use crate::map::MapInfo;

    #[test]
    fn snapshot_round_trips() {
        let mut world = World::new(&MapInfo::arena("MAP01"), 99);
        let id = world.spawn(Actor::new(
            ActorKind::Barrel,
            Fixed::from_int(10),
            Fixed::from_int(20),
            Fixed::ZERO,
            Angle::NORTH,
        ));
        world.assign_net_id(id);

        let players = vec![None, Some(Player::new(1))];

        let snapshot = GameSnapshot::capture("MAP01", &world, &players);
        let bytes = snapshot.to_bytes().unwrap();
        let restored = GameSnapshot::from_bytes(&bytes).unwrap();

        assert_eq!(restored.map_name, "MAP01");
        assert_eq!(restored.world.actor_count(), world.actor_count());
        assert_eq!(restored.players[1].as_ref().unwrap().name, "Player1");

        // Same build, same bytes.
        assert_eq!(restored.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn version_mismatch_rejected() {
        let world = World::new(&MapInfo::arena("MAP01"), 1);
        let mut snapshot = GameSnapshot::capture("MAP01", &world, &[]);
        snapshot.version = SNAPSHOT_VERSION + 1;

        let bytes = snapshot.to_bytes().unwrap();
        assert!(GameSnapshot::from_bytes(&bytes).is_err());
    }
}
