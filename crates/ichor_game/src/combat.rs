//! Hitscan and radius damage evaluation.
//!
//! These are the calls the unlagged engine brackets: the caller rewinds
//! other players to the shooter's perceived tic, evaluates, and restores.
//! Damage thrust mutates momentum, which is exactly the part the restore
//! path has to carry across.

use ichor_protocol::math::{Angle, Fixed};
use ichor_protocol::types::NetId;

use crate::actor::ActorId;
use crate::rng::SimRng;
use crate::world::World;

/// Classic hitscan range.
pub const MISSILE_RANGE: Fixed = Fixed(32 * 64 * 65536);

/// Momentum imparted per point of damage.
const THRUST_PER_DAMAGE: i32 = 3000;

/// What a hitscan trace found.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TraceHit {
    /// An actor, and the distance along the trace.
    Actor { id: ActorId, distance: Fixed },
    /// Nothing shootable within range.
    Nothing,
}

/// Walks a trace from `(x, y)` along `angle` and returns the closest
/// shootable actor, ignoring the shooter. Geometry-free: actors block by
/// their radius, which is what the core needs for unlagged verification;
/// real wall clipping lives with the map code.
pub fn trace_shot(
    world: &World,
    shooter: Option<ActorId>,
    x: Fixed,
    y: Fixed,
    angle: Angle,
    range: Fixed,
) -> TraceHit {
    let (dx, dy) = angle.direction();

    let mut best: Option<(ActorId, Fixed)> = None;

    for (id, actor) in world.actors() {
        if Some(id) == shooter || !actor.is_shootable() {
            continue;
        }

        let to_x = actor.x - x;
        let to_y = actor.y - y;

        // Project the target center onto the trace direction.
        let along = to_x.fixed_mul(dx) + to_y.fixed_mul(dy);

        if along <= Fixed::ZERO || along > range {
            continue;
        }

        // Perpendicular distance from the trace line.
        let across = to_x.fixed_mul(dy) - to_y.fixed_mul(dx);

        if across.abs() > actor.radius {
            continue;
        }

        if best.map_or(true, |(_, d)| along < d) {
            best = Some((id, along));
        }
    }

    match best {
        Some((id, distance)) => TraceHit::Actor { id, distance },
        None => TraceHit::Nothing,
    }
}

/// Outcome of a damage application.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DamageResult {
    pub target: ActorId,
    pub damage: i32,
    pub health: i32,
    pub died: bool,
}

/// Applies damage with the classic thrust away from the inflictor.
pub fn damage_actor(
    world: &mut World,
    target_id: ActorId,
    inflictor: Option<(Fixed, Fixed)>,
    source: NetId,
    damage: i32,
) -> Option<DamageResult> {
    let target = world.get_mut(target_id)?;

    if !target.is_shootable() {
        return None;
    }

    if let Some((from_x, from_y)) = inflictor {
        let dx = target.x - from_x;
        let dy = target.y - from_y;
        let thrust_angle = point_angle(dx, dy);
        let (tx, ty) = thrust_angle.direction();
        let thrust = Fixed(damage.saturating_mul(THRUST_PER_DAMAGE));

        target.momx += tx.fixed_mul(thrust);
        target.momy += ty.fixed_mul(thrust);
    }

    target.health -= damage;
    let health = target.health;
    let died = health <= 0;

    if died {
        target.last_enemy = source;
    }

    Some(DamageResult {
        target: target_id,
        damage,
        health,
        died,
    })
}

/// A pistol-class hitscan: trace, then damage with a random roll.
pub fn line_attack(
    world: &mut World,
    shooter: ActorId,
    angle: Angle,
    range: Fixed,
    rng: &mut SimRng,
    damage_scale: i32,
) -> Option<DamageResult> {
    let (x, y, source_net_id) = {
        let actor = world.get(shooter)?;
        (actor.x, actor.y, actor.net_id)
    };

    match trace_shot(world, Some(shooter), x, y, angle, range) {
        TraceHit::Actor { id, .. } => {
            let damage = rng.damage_roll(3, damage_scale);
            damage_actor(world, id, Some((x, y)), source_net_id, damage)
        }
        TraceHit::Nothing => None,
    }
}

/// Radius damage around an exploding inflictor. Damage falls off linearly
/// with distance; everything shootable in range takes thrust away from the
/// blast, including (half-strength) the source itself.
pub fn radius_attack(
    world: &mut World,
    inflictor: ActorId,
    source: NetId,
    damage: i32,
) -> Vec<DamageResult> {
    let Some((x, y, radius)) = world
        .get(inflictor)
        .map(|a| (a.x, a.y, Fixed::from_int(damage)))
    else {
        return vec![];
    };

    let mut results = vec![];

    for id in world.actor_ids() {
        if id == inflictor {
            continue;
        }

        let Some(actor) = world.get(id) else { continue };
        if !actor.is_shootable() {
            continue;
        }

        let dx = (actor.x - x).abs();
        let dy = (actor.y - y).abs();
        let dist = dx.max(dy);

        if dist >= radius {
            continue;
        }

        let scaled = damage - dist.to_int();
        if scaled <= 0 {
            continue;
        }

        let is_source = actor.net_id == source;
        let dealt = if is_source { scaled / 2 } else { scaled };

        if let Some(result) = damage_actor(world, id, Some((x, y)), source, dealt) {
            results.push(result);
        }
    }

    results
}

/// Angle from the origin to `(dx, dy)`.
pub fn point_angle(dx: Fixed, dy: Fixed) -> Angle {
    let radians = (dy.to_float()).atan2(dx.to_float());
    Angle::from_degrees(radians.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Actor, ActorKind};
    use crate::map::MapInfo;

    fn world_with(positions: &[(i32, i32)]) -> (World, Vec<ActorId>) {
        let mut world = World::new(&MapInfo::arena("MAP01"), 1);
        let mut ids = vec![];

        for &(x, y) in positions {
            let id = world.spawn(Actor::new(
                ActorKind::Player,
                Fixed::from_int(x),
                Fixed::from_int(y),
                Fixed::ZERO,
                Angle::ZERO,
            ));
            world.assign_net_id(id);
            ids.push(id);
        }

        (world, ids)
    }

    #[test]
    fn trace_hits_closest_target() {
        let (world, ids) = world_with(&[(0, 0), (128, 0), (256, 0)]);

        let hit = trace_shot(
            &world,
            Some(ids[0]),
            Fixed::ZERO,
            Fixed::ZERO,
            Angle::EAST,
            MISSILE_RANGE,
        );

        assert_eq!(
            hit,
            TraceHit::Actor {
                id: ids[1],
                distance: Fixed::from_int(128)
            }
        );
    }

    #[test]
    fn trace_misses_off_axis_targets() {
        let (world, ids) = world_with(&[(0, 0), (128, 64)]);

        let hit = trace_shot(
            &world,
            Some(ids[0]),
            Fixed::ZERO,
            Fixed::ZERO,
            Angle::EAST,
            MISSILE_RANGE,
        );

        assert_eq!(hit, TraceHit::Nothing);
    }

    #[test]
    fn trace_ignores_targets_behind() {
        let (world, ids) = world_with(&[(0, 0), (-128, 0)]);

        let hit = trace_shot(
            &world,
            Some(ids[0]),
            Fixed::ZERO,
            Fixed::ZERO,
            Angle::EAST,
            MISSILE_RANGE,
        );

        assert_eq!(hit, TraceHit::Nothing);
    }

    #[test]
    fn damage_applies_thrust_away_from_inflictor() {
        let (mut world, ids) = world_with(&[(0, 0), (128, 0)]);
        let source = world.get(ids[0]).unwrap().net_id;

        let result = damage_actor(
            &mut world,
            ids[1],
            Some((Fixed::ZERO, Fixed::ZERO)),
            source,
            20,
        )
        .unwrap();

        assert_eq!(result.health, 80);
        assert!(!result.died);

        // Thrust points east, away from the shot origin.
        let target = world.get(ids[1]).unwrap();
        assert!(target.momx > Fixed::ZERO);
        assert_eq!(target.momy.to_int(), 0);
    }

    #[test]
    fn line_attack_is_deterministic() {
        let (mut world_a, ids_a) = world_with(&[(0, 0), (128, 0)]);
        let (mut world_b, ids_b) = world_with(&[(0, 0), (128, 0)]);

        let mut rng_a = SimRng::new(42);
        let mut rng_b = SimRng::new(42);

        let a = line_attack(
            &mut world_a,
            ids_a[0],
            Angle::EAST,
            MISSILE_RANGE,
            &mut rng_a,
            5,
        )
        .unwrap();
        let b = line_attack(
            &mut world_b,
            ids_b[0],
            Angle::EAST,
            MISSILE_RANGE,
            &mut rng_b,
            5,
        )
        .unwrap();

        assert_eq!(a.damage, b.damage);
        assert_eq!(a.health, b.health);
    }

    #[test]
    fn radius_attack_falls_off_and_spares_the_distant() {
        let (mut world, ids) = world_with(&[(0, 0), (32, 0), (500, 0)]);
        let source = world.get(ids[0]).unwrap().net_id;

        let barrel = world.spawn(Actor::new(
            ActorKind::Barrel,
            Fixed::ZERO,
            Fixed::ZERO,
            Fixed::ZERO,
            Angle::ZERO,
        ));
        world.assign_net_id(barrel);

        let results = radius_attack(&mut world, barrel, source, 128);

        let hit_ids: Vec<ActorId> = results.iter().map(|r| r.target).collect();
        assert!(hit_ids.contains(&ids[0]));
        assert!(hit_ids.contains(&ids[1]));
        assert!(!hit_ids.contains(&ids[2]));

        // The nearer victim takes more.
        let near = results.iter().find(|r| r.target == ids[1]).unwrap();
        let far = results.iter().find(|r| r.target == ids[0]).unwrap();
        let _ = far;
        assert!(near.damage <= 128);
    }
}
