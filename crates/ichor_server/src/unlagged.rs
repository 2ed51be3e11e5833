//! The unlagged engine.
//!
//! When a shooter's command fires a hitscan or radius attack, every OTHER
//! in-game player (and every sector plane) is rolled back to the tic the
//! shooter saw, the damage check runs, and everything is restored, keeping
//! any momentum the evaluation added so damage thrust survives the restore.
//! The shooter is not rewound: their client predicted from its own present,
//! and the server treats that present as truth.

use ichor_game::{ActorFlags, MAX_POSITIONS};
use ichor_protocol::types::PlayerState;

use crate::client::ClientTable;
use crate::session::Session;

/// Clamps a rewind target into the ring's live window ending at
/// `current_index`. Older shots are evaluated against the oldest snapshot
/// rather than rejected.
fn clamp_rewind_index(command_index: u32, current_index: u32) -> u32 {
    let window = MAX_POSITIONS as u32;
    let oldest = current_index.wrapping_sub(window - 1);

    if current_index.wrapping_sub(command_index) >= window {
        oldest
    } else {
        command_index
    }
}

/// Rewinds the world to what `shooter` saw. Pair with
/// [`end_unlagged`]; the pair must bracket exactly one damage evaluation.
pub fn start_unlagged(session: &mut Session, clients: &mut ClientTable, shooter: usize) {
    // Never for the server's own pseudo-spectator.
    if shooter == 0 {
        return;
    }

    let current_index = session.world_index.wrapping_sub(1);
    let command_index = clamp_rewind_index(
        clients
            .get(shooter)
            .map_or(current_index, |c| c.command_world_index),
        current_index,
    );

    for i in clients.in_game_indices() {
        if i == shooter {
            continue;
        }

        let Some(actor_id) = session.players[i].as_ref().and_then(|p| p.actor) else {
            continue;
        };

        let ring_slot = command_index as usize % MAX_POSITIONS;

        let client = clients.get_mut(i).unwrap();
        let rewound_position = client.positions[ring_slot];
        let rewound_misc = client.misc_states[ring_slot];
        let rewound_state = client.player_states[ring_slot];

        if let Some(actor) = session.world.get_mut(actor_id) {
            client.saved_position = actor.save_position(current_index);
            client.saved_misc_state = actor.save_misc_state(current_index);

            actor.load_position(&rewound_position);
            actor.load_misc_state(&rewound_misc);

            // A target that was not alive at that tic cannot be hurt by a
            // shot aimed at its old body.
            if rewound_state != PlayerState::Live {
                actor.flags |= ActorFlags::NODAMAGE;
            }
        }
    }

    session.load_sector_positions_at(command_index);
}

/// Restores the present, preserving momentum accrued during the
/// evaluation (damage thrust) on top of each player's real state.
pub fn end_unlagged(session: &mut Session, clients: &mut ClientTable, shooter: usize) {
    if shooter == 0 {
        return;
    }

    let current_index = session.world_index.wrapping_sub(1);
    let command_index = clamp_rewind_index(
        clients
            .get(shooter)
            .map_or(current_index, |c| c.command_world_index),
        current_index,
    );

    for i in clients.in_game_indices() {
        if i == shooter {
            continue;
        }

        let Some(actor_id) = session.players[i].as_ref().and_then(|p| p.actor) else {
            continue;
        };

        let ring_slot = command_index as usize % MAX_POSITIONS;
        let client = clients.get_mut(i).unwrap();
        let old_position = client.positions[ring_slot];

        if let Some(actor) = session.world.get_mut(actor_id) {
            // Thrust applied during the evaluation is the difference from
            // the rewound-tic momentum.
            let added_momx = actor.momx - old_position.momx;
            let added_momy = actor.momy - old_position.momy;

            actor.load_position(&client.saved_position);
            actor.load_misc_state(&client.saved_misc_state);

            actor.momx += added_momx;
            actor.momy += added_momy;
        }
    }

    session.load_sector_positions_at(current_index);
}

#[cfg(test)]
mod tests {
    use ichor_config::ServerConfig;
    use ichor_game::combat::{line_attack, MISSILE_RANGE};
    use ichor_game::SimRng;
    use ichor_protocol::math::{Angle, Fixed};
    use ichor_protocol::types::TeamColor;

    use super::*;

    fn setup() -> (Session, ClientTable) {
        let config = ServerConfig::from_json(
            r#"{
                "resources": [{ "name": "DOOM2.WAD", "type": "iwad" }],
                "server": {
                    "game_type": "dm",
                    "moderator_password": "m",
                    "administrator_password": "a"
                },
                "options": {},
                "maps": ["MAP01"]
            }"#,
        )
        .unwrap();

        let mut session = Session::new(&config, 0, 1);
        let mut clients = ClientTable::new();

        for i in [1usize, 2] {
            session.init_player(i);
            session.spawn_player_actor(i, TeamColor::None, false);
            let client = clients.get_mut(i).unwrap();
            client.in_game = true;
            client.spectating = false;
        }

        (session, clients)
    }

    /// Positions player `n`'s actor and records the ring snapshot for the
    /// given tic, the way the broadcast pass does each tic.
    fn place_at_tic(
        session: &mut Session,
        clients: &mut ClientTable,
        n: usize,
        tic: u32,
        x: i32,
        y: i32,
    ) {
        let actor_id = session.players[n].as_ref().unwrap().actor.unwrap();
        let actor = session.world.get_mut(actor_id).unwrap();
        actor.x = Fixed::from_int(x);
        actor.y = Fixed::from_int(y);

        let position = actor.save_position(tic);
        let misc = actor.save_misc_state(tic);

        let client = clients.get_mut(n).unwrap();
        client.positions[tic as usize % MAX_POSITIONS] = position;
        client.misc_states[tic as usize % MAX_POSITIONS] = misc;
        client.player_states[tic as usize % MAX_POSITIONS] = PlayerState::Live;
    }

    #[test]
    fn shot_is_evaluated_against_the_rewound_position() {
        let (mut session, mut clients) = setup();

        let shooter = session.players[1].as_ref().unwrap().actor.unwrap();
        {
            let actor = session.world.get_mut(shooter).unwrap();
            actor.x = Fixed::ZERO;
            actor.y = Fixed::ZERO;
        }

        // At tic 100, player 2 stood on the shooter's line of fire; by the
        // current tic (105) they have strafed far off it.
        place_at_tic(&mut session, &mut clients, 2, 100, 200, 0);
        for tic in 101..=104 {
            place_at_tic(&mut session, &mut clients, 2, tic, 200, 400);
        }
        session.world_index = 106; // current tic is 105

        clients.get_mut(1).unwrap().command_world_index = 100;

        start_unlagged(&mut session, &mut clients, 1);

        let mut rng = SimRng::new(9);
        let result = line_attack(
            &mut session.world,
            shooter,
            Angle::EAST,
            MISSILE_RANGE,
            &mut rng,
            5,
        );

        let hit = result.expect("rewound target must be hit");
        assert!(hit.damage > 0);

        end_unlagged(&mut session, &mut clients, 1);

        // Restored to the present position, with the damage thrust kept.
        let target_id = session.players[2].as_ref().unwrap().actor.unwrap();
        let target = session.world.get(target_id).unwrap();
        assert_eq!(target.x, Fixed::from_int(200));
        assert_eq!(target.y, Fixed::from_int(400));
        assert!(target.momx > Fixed::ZERO, "damage thrust must survive");

        // And the rewound-tic health loss is authoritative.
        assert!(session.players[2].is_some());
        assert_eq!(
            session.world.get(target_id).unwrap().health,
            100 - hit.damage
        );
    }

    #[test]
    fn dead_at_that_tic_targets_take_no_damage() {
        let (mut session, mut clients) = setup();

        let shooter = session.players[1].as_ref().unwrap().actor.unwrap();
        place_at_tic(&mut session, &mut clients, 2, 100, 200, 0);
        clients.get_mut(2).unwrap().player_states[100 % MAX_POSITIONS] = PlayerState::Dead;

        session.world_index = 106;
        clients.get_mut(1).unwrap().command_world_index = 100;

        start_unlagged(&mut session, &mut clients, 1);

        let mut rng = SimRng::new(9);
        let result = ichor_game::combat::line_attack(
            &mut session.world,
            shooter,
            Angle::EAST,
            MISSILE_RANGE,
            &mut rng,
            5,
        );

        assert!(result.is_none(), "dead-at-that-tic target must be immune");

        end_unlagged(&mut session, &mut clients, 1);
    }

    #[test]
    fn older_than_window_clamps_to_oldest() {
        assert_eq!(clamp_rewind_index(100, 100), 100);
        assert_eq!(clamp_rewind_index(100, 105), 100);

        let current = 1000;
        let oldest = current - (MAX_POSITIONS as u32 - 1);
        assert_eq!(clamp_rewind_index(oldest, current), oldest);
        assert_eq!(clamp_rewind_index(oldest - 1, current), oldest);
        assert_eq!(clamp_rewind_index(0, current), oldest);
    }

    #[test]
    fn sectors_rewind_and_restore() {
        let (mut session, mut clients) = setup();

        session.world_index = 100;
        session.world.sectors[0].floor_height = Fixed::from_int(16);
        session.save_sector_positions();

        for tic in 101..=105 {
            session.world_index = tic;
            session.world.sectors[0].floor_height = Fixed::from_int(64);
            session.save_sector_positions();
        }

        session.world_index = 106;
        clients.get_mut(1).unwrap().command_world_index = 100;

        start_unlagged(&mut session, &mut clients, 1);
        assert_eq!(session.world.sectors[0].floor_height, Fixed::from_int(16));

        end_unlagged(&mut session, &mut clients, 1);
        assert_eq!(session.world.sectors[0].floor_height, Fixed::from_int(64));
    }
}
