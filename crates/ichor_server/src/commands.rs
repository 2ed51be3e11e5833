//! The per-client command queue: receive-side dedup, the jitter buffer,
//! and command execution.

use ichor_game::combat::{self, TraceHit};
use ichor_game::{Actor, ActorKind};
use ichor_protocol::math::{Angle, Fixed};
use ichor_protocol::messages::{
    ActorDamagedS2c, ActorKilledS2c, BloodSpawnedS2c, MissileSpawnedS2c, PlayerCommandC2s,
    PuffSpawnedS2c,
};
use ichor_protocol::types::{NetId, PlayerCommand, PlayerState, QueueLevel, TeamColor, WeaponType};

use crate::queue;
use crate::unlagged::{end_unlagged, start_unlagged};
use crate::Server;

/// Extra commands runnable in one tic while draining an overfull buffer.
const MAX_EXTRA_COMMANDS: u32 = 2;

impl Server {
    /// The jitter-buffer target depth for one client, recomputed every tic:
    /// zero on a clean link, otherwise one plus terms linear in loss and
    /// round-trip time. The shape (monotonic in both, lower bound one) is
    /// the contract; the constants are calibration.
    pub(crate) fn command_buffer_size(&self, index: usize) -> u32 {
        if !self.session.options.buffer_commands {
            return 0;
        }

        let Some(client) = self.clients.get(index) else {
            return 0;
        };

        if client.packet_loss == 0 {
            return 0;
        }

        u32::from(client.packet_loss) / 2 + client.transit_lag / 99 + 1
    }

    /// Accepts a command bundle: commands at or before the last received
    /// index are retransmits and are dropped silently.
    pub(crate) fn handle_player_commands(&mut self, index: usize, msg: PlayerCommandC2s) {
        // Commands are only meaningful while a level is running.
        if self.should_send_new_map || self.awaiting_sync_since.is_some() {
            return;
        }

        let Some(client) = self.clients.get_mut(index) else {
            return;
        };

        if !client.in_game {
            return;
        }

        client.received_command_for_current_map = true;
        let last_index = client.last_command_received_index;

        for command in msg.commands.iter() {
            // Retransmits carry indices we have already seen.
            if command.index <= last_index {
                client.commands_dropped += 1;
                continue;
            }

            client.commands.push_back(*command);
            client.last_command_received_index = command.index;
        }
    }

    /// Runs commands for one client this tic: none until the buffer first
    /// reaches its target depth, then one per tic plus up to two extra
    /// while the queue runs over the target.
    pub(crate) fn run_player_commands(&mut self, index: usize) {
        let buffer_size = self.command_buffer_size(index);

        let Some(client) = self.clients.get_mut(index) else {
            return;
        };

        if client.commands.is_empty() {
            return;
        }

        if !client.command_buffer_filled {
            if client.commands.len() as u32 >= buffer_size {
                client.command_buffer_filled = true;
                client.buffering = false;
            } else {
                return;
            }
        }

        let mut commands_run = 0;

        loop {
            let Some(command) = self.clients.get_mut(index).unwrap().commands.pop_front()
            else {
                break;
            };

            self.run_one_command(index, &command);
            commands_run += 1;

            let queued = self.clients.get(index).unwrap().commands.len() as u32;
            if queued <= buffer_size || commands_run > MAX_EXTRA_COMMANDS {
                break;
            }
        }
    }

    /// Executes a single command under the client's option overrides.
    fn run_one_command(&mut self, index: usize, command: &PlayerCommand) {
        let options = self.clients.get(index).unwrap().options.clone();
        self.session.load_client_options(&options);

        {
            let client = self.clients.get_mut(index).unwrap();
            client.command_world_index = command.world_index;
        }

        self.apply_command(index, command);

        {
            let client = self.clients.get_mut(index).unwrap();
            client.last_command_run_index = command.index;
            client.last_command_run_world_index = command.world_index;
        }

        self.session.restore_server_options();
    }

    fn apply_command(&mut self, index: usize, command: &PlayerCommand) {
        let spectating = self.clients.get(index).map_or(true, |c| c.spectating);

        if spectating {
            // A spectator pressing use is a join request.
            if command.has_button(PlayerCommand::BT_USE) {
                self.handle_join_request(index);
            }
            self.move_player(index, command);
            return;
        }

        if command.has_action(PlayerCommand::AT_SPECTATE) {
            self.spectate_player(index);
            return;
        }

        let alive = self
            .session
            .player(index)
            .is_some_and(|p| p.state == PlayerState::Live);

        if !alive {
            if command.has_action(PlayerCommand::AT_RESPAWN) {
                self.respawn_player(index);
            }
            return;
        }

        self.move_player(index, command);
        self.check_special_touches(index);

        if command.has_button(PlayerCommand::BT_CHANGE) {
            if let Some(player) = self.session.player_mut(index) {
                player.select_weapon(command.weapon_select);
            }
        }

        if command.has_button(PlayerCommand::BT_ATTACK) {
            self.fire_weapon(index);
        }
    }

    fn move_player(&mut self, index: usize, command: &PlayerCommand) {
        let Some(actor_id) = self.session.players[index].as_ref().and_then(|p| p.actor)
        else {
            return;
        };

        let Some(angle) = self.session.world.get(actor_id).map(|a| a.angle) else {
            return;
        };

        let delta = self
            .session
            .player_mut(index)
            .map(|p| p.apply_command_movement(command, angle));

        let Some(delta) = delta else { return };

        if let Some(actor) = self.session.world.get_mut(actor_id) {
            actor.angle = delta.angle;
            actor.pitch = delta.pitch;

            // Commands steer and thrust; the world tick integrates, so a
            // client whose queue runs dry keeps its previous momentum.
            actor.momx += delta.thrust_x;
            actor.momy += delta.thrust_y;

            if delta.jump && actor.z <= Fixed::ZERO && actor.jump_time == 0 {
                actor.momz = Fixed::from_int(8);
                actor.jump_time = 18;
            }

            if actor.jump_time > 0 {
                actor.jump_time -= 1;
            }
        }
    }

    /// Fires the ready weapon. Hitscans and radius damage run inside the
    /// unlagged bracket; projectiles do not (they are simulated forward).
    fn fire_weapon(&mut self, index: usize) {
        let can_fire = self
            .session
            .player_mut(index)
            .map_or(false, |player| {
                if player.refire_wait > 0 {
                    player.refire_wait -= 1;
                    return false;
                }
                player.resolve_pending_weapon();
                true
            });

        if !can_fire {
            return;
        }

        let weapon = self
            .session
            .player(index)
            .map_or(WeaponType::Pistol, |p| p.ready_weapon);

        // The muzzle-flash sprite state, mirrored to remote views.
        self.broadcast_player_weapon_state(index, 0, weapon as u32 + 1);

        match weapon {
            WeaponType::RocketLauncher | WeaponType::PlasmaRifle | WeaponType::Bfg => {
                self.fire_missile(index, weapon);
            }
            _ => self.fire_hitscan(index, weapon),
        }

        if let Some(player) = self.session.player_mut(index) {
            player.refire_wait = match weapon {
                WeaponType::Chaingun | WeaponType::PlasmaRifle => 3,
                WeaponType::Pistol | WeaponType::Shotgun => 12,
                WeaponType::SuperShotgun | WeaponType::RocketLauncher => 25,
                WeaponType::Bfg => 35,
                WeaponType::Fist | WeaponType::Chainsaw => 8,
            };
        }
    }

    fn fire_hitscan(&mut self, index: usize, weapon: WeaponType) {
        let Some(shooter_id) = self.session.players[index].as_ref().and_then(|p| p.actor)
        else {
            return;
        };

        start_unlagged(&mut self.session, &mut self.clients, index);

        let (origin_x, origin_y, angle, shooter_net_id) = {
            let Some(actor) = self.session.world.get(shooter_id) else {
                end_unlagged(&mut self.session, &mut self.clients, index);
                return;
            };
            (actor.x, actor.y, actor.angle, actor.net_id)
        };

        let pellets: u32 = match weapon {
            WeaponType::Shotgun => 7,
            WeaponType::SuperShotgun => 20,
            _ => 1,
        };

        let mut killed = vec![];

        for _ in 0..pellets {
            let spread = if pellets > 1 {
                Angle((self.session.world.rng.spread() << 14) as u32)
            } else {
                Angle::ZERO
            };

            let aim = angle + spread;
            let range = if matches!(weapon, WeaponType::Fist | WeaponType::Chainsaw) {
                Fixed::from_int(64)
            } else {
                combat::MISSILE_RANGE
            };

            match combat::trace_shot(
                &self.session.world,
                Some(shooter_id),
                origin_x,
                origin_y,
                aim,
                range,
            ) {
                TraceHit::Actor { id, distance } => {
                    let damage = self.session.world.rng.damage_roll(3, 5);

                    if let Some(result) = combat::damage_actor(
                        &mut self.session.world,
                        id,
                        Some((origin_x, origin_y)),
                        shooter_net_id,
                        damage,
                    ) {
                        let target_net_id =
                            self.session.world.get(id).map_or(NetId::NONE, |a| a.net_id);
                        let (dx, dy) = aim.direction();
                        let hit_x = origin_x + dx.fixed_mul(distance);
                        let hit_y = origin_y + dy.fixed_mul(distance);

                        self.broadcast_blood(shooter_net_id, target_net_id, hit_x, hit_y, damage);
                        self.broadcast(&ActorDamagedS2c {
                            world_index: self.session.world_index,
                            target_net_id,
                            inflictor_net_id: shooter_net_id,
                            source_net_id: shooter_net_id,
                            damage: result.damage,
                            health: result.health,
                            mod_type: weapon as u32,
                        });

                        if result.died {
                            killed.push((id, target_net_id, result.damage));
                        }
                    }
                }
                TraceHit::Nothing => {
                    let (dx, dy) = aim.direction();
                    let puff_x = origin_x + dx.fixed_mul(range);
                    let puff_y = origin_y + dy.fixed_mul(range);
                    self.broadcast_puff(shooter_net_id, puff_x, puff_y);
                }
            }
        }

        end_unlagged(&mut self.session, &mut self.clients, index);

        for (target_id, target_net_id, damage) in killed {
            self.handle_kill(index, target_id, target_net_id, shooter_net_id, damage);
        }
    }

    fn fire_missile(&mut self, index: usize, weapon: WeaponType) {
        let Some(shooter_id) = self.session.players[index].as_ref().and_then(|p| p.actor)
        else {
            return;
        };

        let Some((x, y, z, angle, shooter_net_id)) = self
            .session
            .world
            .get(shooter_id)
            .map(|a| (a.x, a.y, a.z, a.angle, a.net_id))
        else {
            return;
        };

        let kind = match weapon {
            WeaponType::RocketLauncher => ActorKind::RocketMissile,
            WeaponType::Bfg => ActorKind::BfgMissile,
            _ => ActorKind::PlasmaMissile,
        };

        let speed = match kind {
            ActorKind::RocketMissile => 20,
            ActorKind::BfgMissile => 25,
            _ => 25,
        };

        let (dx, dy) = angle.direction();
        let mut missile = Actor::new(kind, x, y, z + Fixed::from_int(32), angle);
        missile.momx = dx * speed;
        missile.momy = dy * speed;
        missile.target = shooter_net_id;

        let id = self.session.world.spawn(missile);
        let net_id = self.session.world.assign_net_id(id);

        let Some(actor) = self.session.world.get(id) else {
            return;
        };

        self.broadcast(&MissileSpawnedS2c {
            world_index: self.session.world_index,
            net_id,
            source_net_id: shooter_net_id,
            actor_type: kind.to_raw(),
            x: actor.x,
            y: actor.y,
            z: actor.z,
            momx: actor.momx,
            momy: actor.momy,
            momz: actor.momz,
            angle: actor.angle,
        });
    }

    pub(crate) fn handle_kill(
        &mut self,
        killer: usize,
        target_id: ichor_game::ActorId,
        target_net_id: NetId,
        source_net_id: NetId,
        damage: i32,
    ) {
        let victim_number = self
            .session
            .world
            .get(target_id)
            .and_then(|a| a.player)
            .map(|n| n as usize);

        self.broadcast(&ActorKilledS2c {
            world_index: self.session.world_index,
            target_net_id,
            inflictor_net_id: source_net_id,
            source_net_id,
            damage,
            mod_type: 0,
        });

        if let Some(victim) = victim_number {
            let game_tic = self.session.game_tic;
            if let Some(player) = self.session.player_mut(victim) {
                player.state = PlayerState::Dead;
                player.death_tic = game_tic;
            }

            if killer != victim {
                if let Some(player) = self.session.player_mut(killer) {
                    player.frags += 1;
                }
            } else if let Some(player) = self.session.player_mut(killer) {
                player.frags -= 1;
            }

            let killer_name = self.player_name(killer);
            let victim_name = self.player_name(victim);
            self.broadcast_message(&format!("{killer_name} fragged {victim_name}."));
        } else {
            self.session.world.remove(target_id);
        }
    }

    fn respawn_player(&mut self, index: usize) {
        let team = self
            .clients
            .get(index)
            .map_or(TeamColor::None, |c| c.team);
        let (actor_id, point) = self.session.spawn_player_actor(index, team, false);
        let net_id = self
            .session
            .world
            .get(actor_id)
            .map_or(NetId::NONE, |a| a.net_id);

        self.broadcast(&ichor_protocol::messages::PlayerSpawnedS2c {
            world_index: self.session.world_index,
            player_number: index as u32,
            net_id,
            as_spectator: false,
            x: point.x,
            y: point.y,
            z: Fixed::ZERO,
            angle: point.angle,
        });
    }

    /// A spectating client pressed use. Admission always requires this
    /// fresh press, never silent promotion from the queue.
    pub(crate) fn handle_join_request(&mut self, index: usize) {
        use ichor_protocol::types::{AuthLevel, TeamColor};

        let mut changes = vec![];

        {
            let Some(client) = self.clients.get_mut(index) else {
                return;
            };

            if client.afk {
                client.afk = false;
                changes.push(queue::QueueChange::Afk(index, false));
            }

            if client.auth_level < AuthLevel::Player {
                self.broadcast_queue_changes(&changes);
                self.send_hud_message_to(index, "Unauthorized.");
                return;
            }
        }

        let max_players = self.session.settings.max_players;
        let join_time_limit = self.config.server.join_time_limit;
        let game_tic = self.session.game_tic;

        if self.clients.get(index).unwrap().queue_level == QueueLevel::None {
            queue::put_in_queue(
                &mut self.clients,
                index,
                max_players,
                join_time_limit,
                game_tic,
                &mut changes,
            );
        }

        let client = self.clients.get(index).unwrap();
        let team = client.team;
        let level = client.queue_level;

        let room = queue::room_in_game(
            &self.clients,
            index,
            max_players,
            join_time_limit,
            game_tic,
        );

        if level == QueueLevel::Waiting || !room {
            self.broadcast_queue_changes(&changes);
            self.send_hud_message_to(index, "No open slots.");
            return;
        }

        // Team games require a chosen team with room on it.
        if self.session.settings.game_type.has_teams() {
            if team == TeamColor::None {
                self.broadcast_queue_changes(&changes);
                self.send_hud_message_to(index, "Pick a team first.");
                return;
            }

            if self.clients.team_playing_count(team)
                >= self.session.settings.max_players_per_team
            {
                self.broadcast_queue_changes(&changes);
                self.send_hud_message_to(index, "Team is full.");
                return;
            }
        }

        queue::set_client_playing(&mut self.clients, index, game_tic, &mut changes);
        self.broadcast_queue_changes(&changes);

        self.clients.get_mut(index).unwrap().spectating = false;
        self.session.set_spectator(index, false);

        let (actor_id, point) = self.session.spawn_player_actor(index, team, false);
        let net_id = self
            .session
            .world
            .get(actor_id)
            .map_or(NetId::NONE, |a| a.net_id);

        self.broadcast(&ichor_protocol::messages::PlayerSpawnedS2c {
            world_index: self.session.world_index,
            player_number: index as u32,
            net_id,
            as_spectator: false,
            x: point.x,
            y: point.y,
            z: Fixed::ZERO,
            angle: point.angle,
        });

        let name = self.player_name(index);
        if self.session.settings.game_type.has_teams() {
            self.broadcast_message(&format!(
                "{name} has entered the game on the {} team!",
                team.name()
            ));
        } else {
            self.broadcast_message(&format!("{name} has entered the game!"));
        }
    }

    // Puffs and blood are spawn-only effects on reserved net ids; nothing
    // is kept in the world for them and they never get position updates.

    fn broadcast_puff(&mut self, shooter_net_id: NetId, x: Fixed, y: Fixed) {
        self.broadcast(&PuffSpawnedS2c {
            world_index: self.session.world_index,
            net_id: NetId::PUFF,
            shooter_net_id,
            x,
            y,
            z: Fixed::from_int(32),
            updown: 0,
            particles: false,
        });
    }

    fn broadcast_blood(
        &mut self,
        shooter_net_id: NetId,
        target_net_id: NetId,
        x: Fixed,
        y: Fixed,
        damage: i32,
    ) {
        self.broadcast(&BloodSpawnedS2c {
            world_index: self.session.world_index,
            net_id: NetId::BLOOD,
            shooter_net_id,
            target_net_id,
            x,
            y,
            z: Fixed::from_int(32),
            damage,
        });
    }
}
