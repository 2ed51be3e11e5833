//! The slice of a loaded map the core needs.
//!
//! WAD parsing and real geometry belong to the engine proper; the core sees
//! maps as named collections of spawn points, sectors, and initial things.
//! The test maps built here stand in for the WAD loader in headless and
//! test configurations.

use ichor_protocol::math::{Angle, Fixed};
use serde::{Deserialize, Serialize};

use crate::actor::ActorKind;
use crate::sector::Sector;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub x: Fixed,
    pub y: Fixed,
    pub angle: Angle,
}

impl SpawnPoint {
    pub fn new(x: i32, y: i32, angle: Angle) -> Self {
        Self {
            x: Fixed::from_int(x),
            y: Fixed::from_int(y),
            angle,
        }
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ThingDef {
    pub kind: ActorKind,
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub angle: Angle,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct MapInfo {
    pub name: String,
    pub player_starts: Vec<SpawnPoint>,
    pub deathmatch_starts: Vec<SpawnPoint>,
    /// Indexed by team color (red, blue).
    pub team_starts: [Vec<SpawnPoint>; 2],
    pub sectors: Vec<Sector>,
    pub things: Vec<ThingDef>,
}

impl MapInfo {
    /// A featureless arena: one tall sector, starts in a ring. What the
    /// headless server uses when no geometry loader is wired in.
    pub fn arena(name: &str) -> Self {
        let ring = |radius: i32, count: usize| -> Vec<SpawnPoint> {
            (0..count)
                .map(|i| {
                    let angle = Angle((i as u32).wrapping_mul(u32::MAX / count as u32));
                    let (dx, dy) = angle.direction();
                    SpawnPoint {
                        x: dx * radius,
                        y: dy * radius,
                        angle: angle + Angle::WEST,
                    }
                })
                .collect()
        };

        Self {
            name: name.into(),
            player_starts: ring(256, 8),
            deathmatch_starts: ring(512, 16),
            team_starts: [ring(640, 8), ring(768, 8)],
            sectors: vec![Sector::new(Fixed::ZERO, Fixed::from_int(128))],
            things: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_has_enough_starts() {
        let map = MapInfo::arena("MAP01");

        assert!(!map.player_starts.is_empty());
        assert_eq!(map.deathmatch_starts.len(), 16);
        assert!(!map.sectors.is_empty());
    }
}
