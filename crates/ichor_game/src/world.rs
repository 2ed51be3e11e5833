//! The actor table, the net-id registry, and the per-tic think pass.

use std::collections::BTreeMap;

use ichor_protocol::math::{Angle, Fixed};
use ichor_protocol::types::NetId;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::actor::{Actor, ActorFlags, ActorId, ActorKind};
use crate::map::MapInfo;
use crate::rng::SimRng;
use crate::sector::{Mover, Sector};

/// Friction applied to grounded actors each tic.
const GROUND_FRICTION: Fixed = Fixed(0xE800);

/// Momentum below this rounds to a stop.
const STOP_SPEED: Fixed = Fixed(0x1000);

const GRAVITY: Fixed = Fixed::ONE;

#[derive(Clone, Serialize, Deserialize)]
pub struct World {
    slots: Vec<Option<Actor>>,
    generations: Vec<u32>,
    free: Vec<u32>,
    net_ids: BTreeMap<u32, ActorId>,
    next_net_id: u32,
    pub sectors: Vec<Sector>,
    pub movers: Vec<Mover>,
    pub level_time: u32,
    pub rng: SimRng,
}

/// A world event the server relays to clients. Produced in deterministic
/// order within a tic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorldEvent {
    MissileExploded { id: ActorId },
    ActorKilled { id: ActorId, source: NetId },
    SectorMoved { sector: usize },
}

impl World {
    pub fn new(map: &MapInfo, rng_seed: u32) -> Self {
        let mut world = Self {
            slots: vec![],
            generations: vec![],
            free: vec![],
            net_ids: BTreeMap::new(),
            next_net_id: NetId::FIRST_DYNAMIC,
            sectors: map.sectors.clone(),
            movers: vec![],
            level_time: 0,
            rng: SimRng::new(rng_seed),
        };

        for thing in &map.things {
            let id = world.spawn(Actor::new(
                thing.kind,
                thing.x,
                thing.y,
                thing.z,
                thing.angle,
            ));
            world.assign_net_id(id);
        }

        world
    }

    /// Inserts an actor without a net id. Callers that replicate the actor
    /// follow up with [`assign_net_id`](Self::assign_net_id).
    pub fn spawn(&mut self, actor: Actor) -> ActorId {
        match self.free.pop() {
            Some(index) => {
                let generation = self.generations[index as usize];
                self.slots[index as usize] = Some(actor);
                ActorId { index, generation }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Some(actor));
                self.generations.push(0);
                ActorId {
                    index,
                    generation: 0,
                }
            }
        }
    }

    /// Hands the actor the next net id from the per-map sequence, or the
    /// reserved id for spawn-only effects.
    pub fn assign_net_id(&mut self, id: ActorId) -> NetId {
        let net_id = match self.get(id).map(|a| a.kind) {
            Some(ActorKind::TeleportFog) => NetId::FOG,
            Some(ActorKind::Puff) => NetId::PUFF,
            Some(ActorKind::Blood) => NetId::BLOOD,
            _ => {
                let n = NetId(self.next_net_id);
                self.next_net_id += 1;
                n
            }
        };

        if let Some(actor) = self.get_mut(id) {
            actor.net_id = net_id;
        }

        // Reserved effect ids are shared; only dynamic ids resolve back.
        if net_id.0 >= NetId::FIRST_DYNAMIC {
            self.net_ids.insert(net_id.0, id);
        }

        net_id
    }

    pub fn remove(&mut self, id: ActorId) {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return;
        };

        if self.generations[id.index as usize] != id.generation {
            return;
        }

        if let Some(actor) = slot.take() {
            if actor.net_id.0 >= NetId::FIRST_DYNAMIC {
                self.net_ids.remove(&actor.net_id.0);
            }

            self.generations[id.index as usize] += 1;
            self.free.push(id.index);
            trace!(?id, net_id = actor.net_id.0, "actor removed");
        }
    }

    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        if *self.generations.get(id.index as usize)? != id.generation {
            return None;
        }
        self.slots.get(id.index as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        if *self.generations.get(id.index as usize)? != id.generation {
            return None;
        }
        self.slots.get_mut(id.index as usize)?.as_mut()
    }

    pub fn lookup_net_id(&self, net_id: NetId) -> Option<ActorId> {
        self.net_ids.get(&net_id.0).copied()
    }

    /// Iterates live actors in slot order, which is the deterministic
    /// iteration order the broadcast pass relies on.
    pub fn actors(&self) -> impl Iterator<Item = (ActorId, &Actor)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref().map(|actor| {
                (
                    ActorId {
                        index: i as u32,
                        generation: self.generations[i],
                    },
                    actor,
                )
            })
        })
    }

    pub fn actor_ids(&self) -> Vec<ActorId> {
        self.actors().map(|(id, _)| id).collect()
    }

    /// The number of live actors.
    pub fn actor_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// One simulation tic: movers run, missiles fly, momentum integrates
    /// and decays. Player bodies integrate here too; a player whose
    /// command queue ran dry keeps coasting on its previous momentum;
    /// commands only steer and thrust.
    pub fn tick(&mut self) -> Vec<WorldEvent> {
        let mut events = vec![];

        for mover_index in 0..self.movers.len() {
            let mover = &mut self.movers[mover_index];
            let sector_index = mover.sector;

            if let Some(sector) = self.sectors.get_mut(sector_index) {
                if mover.tick(sector) {
                    events.push(WorldEvent::SectorMoved {
                        sector: sector_index,
                    });
                }
            }
        }

        self.movers.retain(|m| !m.finished);

        for index in 0..self.slots.len() {
            let Some(actor) = self.slots[index].as_mut() else {
                continue;
            };

            let id = ActorId {
                index: index as u32,
                generation: self.generations[index],
            };

            if actor.is_missile() {
                actor.x += actor.momx;
                actor.y += actor.momy;
                actor.z += actor.momz;

                // Missiles die against the arena's outer bound.
                let limit = Fixed::from_int(8192);
                if actor.x.abs() > limit || actor.y.abs() > limit {
                    events.push(WorldEvent::MissileExploded { id });
                }
                continue;
            }

            if actor.tics > 0 {
                actor.tics -= 1;
            }

            actor.x += actor.momx;
            actor.y += actor.momy;

            let floor = self
                .sectors
                .first()
                .map_or(Fixed::ZERO, |s| s.floor_height);

            if actor.z > floor && actor.flags & ActorFlags::NOGRAVITY == 0 {
                actor.momz -= GRAVITY;
                actor.z = (actor.z + actor.momz).max(floor);
            } else {
                actor.momz = Fixed::ZERO;
            }

            if actor.z <= floor {
                if actor.momx.abs() < STOP_SPEED && actor.momy.abs() < STOP_SPEED {
                    actor.momx = Fixed::ZERO;
                    actor.momy = Fixed::ZERO;
                } else {
                    actor.momx = actor.momx.fixed_mul(GROUND_FRICTION);
                    actor.momy = actor.momy.fixed_mul(GROUND_FRICTION);
                }
            }
        }

        self.level_time += 1;
        events
    }

    /// Drops every actor and restarts net-id enumeration; the map-change
    /// path rebuilds the registry from the new map's spawn set.
    pub fn clear_for_new_map(&mut self, map: &MapInfo) {
        *self = World::new(map, self.rng.seed());
    }

    /// Spawns a spawn-only effect actor and returns its reserved net id.
    pub fn spawn_effect(&mut self, kind: ActorKind, x: Fixed, y: Fixed, z: Fixed) -> NetId {
        let id = self.spawn(Actor::new(kind, x, y, z, Angle::ZERO));
        self.assign_net_id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapInfo;

    fn world() -> World {
        World::new(&MapInfo::arena("MAP01"), 0x1993)
    }

    #[test]
    fn net_ids_start_after_reserved_range() {
        let mut world = world();

        let a = world.spawn(Actor::new(
            ActorKind::Barrel,
            Fixed::ZERO,
            Fixed::ZERO,
            Fixed::ZERO,
            Angle::ZERO,
        ));
        let net_id = world.assign_net_id(a);

        assert!(net_id.0 >= NetId::FIRST_DYNAMIC);
        assert_eq!(world.lookup_net_id(net_id), Some(a));
    }

    #[test]
    fn effects_get_reserved_ids() {
        let mut world = world();

        let puff = world.spawn_effect(ActorKind::Puff, Fixed::ZERO, Fixed::ZERO, Fixed::ZERO);
        assert_eq!(puff, NetId::PUFF);

        let blood = world.spawn_effect(ActorKind::Blood, Fixed::ZERO, Fixed::ZERO, Fixed::ZERO);
        assert_eq!(blood, NetId::BLOOD);
    }

    #[test]
    fn stale_ids_do_not_resolve() {
        let mut world = world();

        let a = world.spawn(Actor::new(
            ActorKind::Barrel,
            Fixed::ZERO,
            Fixed::ZERO,
            Fixed::ZERO,
            Angle::ZERO,
        ));
        world.remove(a);

        assert!(world.get(a).is_none());

        // The slot is reused with a bumped generation.
        let b = world.spawn(Actor::new(
            ActorKind::Barrel,
            Fixed::ZERO,
            Fixed::ZERO,
            Fixed::ZERO,
            Angle::ZERO,
        ));
        assert_eq!(a.index, b.index);
        assert_ne!(a.generation, b.generation);
        assert!(world.get(a).is_none());
        assert!(world.get(b).is_some());
    }

    #[test]
    fn new_map_restarts_net_id_enumeration() {
        let mut world = world();

        let a = world.spawn(Actor::new(
            ActorKind::Barrel,
            Fixed::ZERO,
            Fixed::ZERO,
            Fixed::ZERO,
            Angle::ZERO,
        ));
        let first = world.assign_net_id(a);

        world.clear_for_new_map(&MapInfo::arena("MAP02"));

        let b = world.spawn(Actor::new(
            ActorKind::Barrel,
            Fixed::ZERO,
            Fixed::ZERO,
            Fixed::ZERO,
            Angle::ZERO,
        ));
        let second = world.assign_net_id(b);

        assert_eq!(first, second);
        assert_eq!(world.lookup_net_id(second), Some(b));
    }

    #[test]
    fn missiles_fly_straight() {
        let mut world = world();

        let m = world.spawn(Actor::new(
            ActorKind::RocketMissile,
            Fixed::ZERO,
            Fixed::ZERO,
            Fixed::from_int(32),
            Angle::ZERO,
        ));
        world.get_mut(m).unwrap().momx = Fixed::from_int(20);

        world.tick();
        world.tick();

        assert_eq!(world.get(m).unwrap().x, Fixed::from_int(40));
    }

    #[test]
    fn friction_stops_ground_movement() {
        let mut world = world();

        let a = world.spawn(Actor::new(
            ActorKind::Barrel,
            Fixed::ZERO,
            Fixed::ZERO,
            Fixed::ZERO,
            Angle::ZERO,
        ));
        world.get_mut(a).unwrap().momx = Fixed::from_int(8);

        for _ in 0..200 {
            world.tick();
        }

        assert_eq!(world.get(a).unwrap().momx, Fixed::ZERO);
    }
}
