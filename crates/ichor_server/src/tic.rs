//! The server tic loop and the map/session lifecycle.

use std::collections::HashMap;
use std::time::Duration;

use ichor_game::world::WorldEvent;
use ichor_game::{ActorId, ActorKind, TICRATE, MAX_POSITIONS};
use ichor_network::Event;
use ichor_protocol::messages::{
    ActorMiscStateS2c, ActorPositionS2c, ActorSpawnedS2c, ClientStatusS2c, CurrentStateS2c,
    GameStateS2c, InitialStateS2c, MapCompletedS2c, MapStartedS2c, MissileExplodedS2c,
    PlayerPositionS2c, PlayerSpawnedS2c, SectorPositionS2c, SyncS2c, TicFinishedS2c,
    VoteResultS2c,
};
use ichor_protocol::types::{ActorPosition, DisconnectReason, MiscState, StateRequest};
use tracing::{error, info, warn};

use crate::queue;
use crate::vote::VoteOutcome;
use crate::{Server, CONNECT_GRACE_TICS};

/// Tics a client has to acknowledge a new map's snapshot before being
/// dropped from the sync barrier.
const SYNC_BARRIER_TICS: u32 = 30 * TICRATE;

/// Previous-tic snapshots used for the actor delta broadcast.
#[derive(Default)]
pub(crate) struct ActorDeltas {
    positions: HashMap<ActorId, ActorPosition>,
    misc_states: HashMap<ActorId, MiscState>,
}

impl Server {
    /// Drains transport events into the handlers, waiting up to `budget`.
    /// The driving loop spends the slack between tics in here, so receives
    /// never wait for the next tic boundary.
    pub fn pump_transport(&mut self, budget: Duration) {
        let events = match self.net.service(budget) {
            Ok(events) => events,
            Err(e) => {
                error!(error = %e, "transport failure");
                return;
            }
        };

        for event in events {
            match event {
                Event::Connect { peer } => self.handle_connect(peer),
                Event::Receive { peer, payload, .. } => self.handle_receive(peer, &payload),
                Event::Disconnect { peer, .. } => self.handle_transport_disconnect(peer),
            }
        }
    }

    /// One full tic, in the contractual order.
    pub fn run_tic(&mut self) {
        self.pump_transport(Duration::ZERO);

        let empty = self.clients.is_empty();

        if empty {
            self.handle_empty_tic();
            self.flush_removals();
        } else {
            self.simulate_tic();
        }

        // Master upkeep runs whether or not anyone is connected.
        if !self.master.is_empty() {
            let state = self.master_state_json();
            self.master.update(self.session.game_tic, &state);
            self.master.pump(self.session.game_tic);
        }

        self.session.world_index = self.session.world_index.wrapping_add(1);
        self.session.game_tic = self.session.game_tic.wrapping_add(1);
    }

    fn handle_empty_tic(&mut self) {
        // An empty server resets its map so the next joiner starts fresh.
        if self.session.world.level_time > 0 {
            info!("server empty, resetting map");
            let map_number = self.session.map_number;
            self.session.change_map(&self.config, map_number);
            self.session.world_index = 0;
        }

        if self.vote.take().is_some() {
            info!("vote discarded, no players left");
        }
    }

    fn simulate_tic(&mut self) {
        self.refresh_client_telemetry();
        self.enforce_connect_grace();
        self.reconcile_sync_barrier();

        let commands_allowed = self.awaiting_sync_since.is_none() && !self.should_send_new_map;

        if commands_allowed {
            for i in self.clients.in_game_indices() {
                self.run_player_commands(i);
            }
        }

        let world_events = self.session.world.tick();
        self.broadcast_world_events(&world_events);

        self.save_and_broadcast_player_positions();
        self.broadcast_actor_deltas();

        if self.session.game_tic % TICRATE == 0 {
            self.broadcast_client_statuses();
        }

        self.resolve_vote();

        let mut changes = vec![];
        queue::update_queue_levels(&mut self.clients, self.session.game_tic, &mut changes);
        queue::mark_queue_clients_afk(
            &mut self.clients,
            self.config.server.join_time_limit,
            self.session.game_tic,
            &mut changes,
        );
        self.broadcast_queue_changes(&changes);

        self.check_map_completion();

        // New clients and map changes are addressed after the game loop has
        // finished for this tic.
        self.handle_state_requests();

        if self.should_send_new_map {
            self.send_new_map();
        }

        // Deferred removals broadcast before the tic closes so their
        // `playerremoved` shares this world index.
        self.flush_removals();

        // Terminates the tic on the client side; every reliable message with
        // this world index has already been queued.
        self.broadcast(&TicFinishedS2c {
            world_index: self.session.world_index,
        });
    }

    fn refresh_client_telemetry(&mut self) {
        for i in self.clients.connected_indices() {
            let Some(peer) = self.clients.get(i).and_then(|c| c.peer) else {
                continue;
            };

            let rtt = self.net.round_trip_time(peer);
            let loss = self.net.packet_loss_percent(peer);

            let client = self.clients.get_mut(i).unwrap();
            client.transit_lag = rtt;
            client.packet_loss = loss.min(100);
        }
    }

    /// Drops peers that connected but never requested the initial state.
    fn enforce_connect_grace(&mut self) {
        for i in self.clients.connected_indices() {
            let client = self.clients.get(i).unwrap();

            if client.connecting
                && !client.in_game
                && self.session.game_tic.wrapping_sub(client.join_tic) > CONNECT_GRACE_TICS
            {
                self.disconnect_client(i, DisconnectReason::NoReason);
            }
        }
    }

    /// The post-map-change barrier: tic 0 of a new map does not execute
    /// commands until every in-game client has acknowledged the snapshot.
    fn reconcile_sync_barrier(&mut self) {
        let Some(since) = self.awaiting_sync_since else {
            return;
        };

        let mut all_acked = true;

        for i in self.clients.in_game_indices() {
            if !self.clients.get(i).unwrap().received_game_state {
                all_acked = false;

                if self.session.game_tic.wrapping_sub(since) > SYNC_BARRIER_TICS {
                    warn!(player = i, "dropped at the map sync barrier");
                    self.disconnect_client(i, DisconnectReason::LatencyLimit);
                }
            }
        }

        if all_acked {
            self.awaiting_sync_since = None;
        }
    }

    fn broadcast_world_events(&mut self, events: &[WorldEvent]) {
        for event in events {
            match event {
                WorldEvent::SectorMoved { sector } => {
                    let position = self.session.world.sectors[*sector]
                        .save_position(self.session.world_index);

                    self.broadcast(&SectorPositionS2c {
                        world_index: self.session.world_index,
                        sector_number: *sector as u32,
                        position,
                    });
                }
                WorldEvent::MissileExploded { id } => {
                    let Some(net_id) = self.session.world.get(*id).map(|a| a.net_id) else {
                        continue;
                    };

                    self.broadcast(&MissileExplodedS2c {
                        world_index: self.session.world_index,
                        net_id,
                        tics: 8,
                    });
                    self.session.world.remove(*id);
                }
                WorldEvent::ActorKilled { .. } => {}
            }
        }

        self.session.save_sector_positions();
    }

    /// Saves every player's snapshot into its rings and broadcasts the
    /// authoritative position: unsequenced once the client's jitter buffer
    /// has filled, reliable while it is still buffering.
    fn save_and_broadcast_player_positions(&mut self) {
        let world_index = self.session.world_index;
        let ring_slot = world_index as usize % MAX_POSITIONS;

        for i in self.clients.in_game_indices() {
            let Some(actor_id) = self.session.players[i].as_ref().and_then(|p| p.actor)
            else {
                continue;
            };

            let Some(actor) = self.session.world.get(actor_id) else {
                continue;
            };

            let position = actor.save_position(world_index);
            let misc_state = actor.save_misc_state(world_index);
            let player_state = self.session.player(i).map(|p| p.state).unwrap_or_default();

            let (buffering, last_index_run, last_world_index_run) = {
                let client = self.clients.get_mut(i).unwrap();
                client.positions[ring_slot] = position;
                client.misc_states[ring_slot] = misc_state;
                client.player_states[ring_slot] = player_state;

                (
                    client.buffering,
                    client.last_command_run_index,
                    client.last_command_run_world_index,
                )
            };

            let msg = PlayerPositionS2c {
                world_index,
                player_number: i as u32,
                position,
                last_index_run,
                last_world_index_run,
            };

            if buffering {
                self.broadcast(&msg);
            } else {
                self.broadcast_unreliable(&msg);
            }
        }
    }

    /// Broadcasts `actorposition`/`actormiscstate` for every non-player
    /// actor that changed since its previous snapshot. Missiles are skipped
    /// (clients fly them locally); spawn-only effects never appear here at
    /// all.
    fn broadcast_actor_deltas(&mut self) {
        let world_index = self.session.world_index;
        let mut position_updates = vec![];
        let mut misc_updates = vec![];

        for (id, actor) in self.session.world.actors() {
            if actor.player.is_some() || actor.kind.is_effect() {
                continue;
            }

            let position = actor.save_actor_position(world_index);
            let misc_state = actor.save_misc_state(world_index);
            let net_id = actor.net_id;

            let previous = self.actor_deltas.positions.insert(id, position);
            if previous.map_or(true, |p| differs(&p, &position)) && !actor.is_missile() {
                position_updates.push(ActorPositionS2c {
                    world_index,
                    net_id,
                    position,
                });
            }

            let previous = self.actor_deltas.misc_states.insert(id, misc_state);
            if previous.map_or(false, |m| {
                (m.flags, m.flags2, m.flags3, m.flags4, m.friction, m.movefactor)
                    != (
                        misc_state.flags,
                        misc_state.flags2,
                        misc_state.flags3,
                        misc_state.flags4,
                        misc_state.friction,
                        misc_state.movefactor,
                    )
            }) {
                misc_updates.push(ActorMiscStateS2c {
                    world_index,
                    net_id,
                    misc_state,
                });
            }
        }

        for msg in position_updates {
            self.broadcast(&msg);
        }
        for msg in misc_updates {
            self.broadcast(&msg);
        }
    }

    fn broadcast_client_statuses(&mut self) {
        for i in self.clients.in_game_indices() {
            let client = self.clients.get(i).unwrap();

            let client_lag = self
                .session
                .world_index
                .saturating_sub(client.last_command_run_world_index);

            let msg = ClientStatusS2c {
                world_index: self.session.world_index,
                client_number: i as u32,
                client_lag,
                server_lag: client.commands.len() as u32,
                transit_lag: client.transit_lag,
                packet_loss: client.packet_loss,
            };

            self.broadcast(&msg);
        }
    }

    fn resolve_vote(&mut self) {
        let Some(vote) = self.vote.as_ref() else {
            return;
        };

        let eligible = (1..self.clients.len())
            .filter(|&i| {
                self.clients
                    .get(i)
                    .is_some_and(|c| c.in_game && !c.spectating && !c.afk)
            })
            .count() as u32;

        let Some(outcome) = vote.outcome(self.session.game_tic, eligible) else {
            return;
        };

        let command = vote.command().to_owned();
        let passed = outcome == VoteOutcome::Passed;

        self.broadcast(&VoteResultS2c {
            world_index: self.session.world_index,
            passed,
        });

        self.vote = None;

        if passed {
            info!(%command, "vote passed");
            let output = crate::console::dispatch(self, &command);
            if !output.is_empty() {
                info!("{output}");
            }
        } else {
            info!(%command, "vote failed");
        }
    }

    /// Answers outstanding state requests. Runs after the game loop so a
    /// request never observes a half-simulated tic.
    fn handle_state_requests(&mut self) {
        use ichor_protocol::types::AuthLevel;

        for i in self.clients.connected_indices() {
            let Some(client) = self.clients.get_mut(i) else {
                continue;
            };

            if client.auth_level < AuthLevel::Spectator {
                continue;
            }

            let Some(request) = client.current_request.take() else {
                continue;
            };

            match request {
                StateRequest::InitialState => self.send_initial_state(i),
                StateRequest::CurrentState => self.send_current_state(i),
                StateRequest::Sync => self.send_sync(i),
            }
        }
    }

    fn send_initial_state(&mut self, index: usize) {
        let msg = InitialStateS2c {
            world_index: self.session.world_index,
            player_number: index as u32,
            map_number: self.session.map_number as u32,
            rng_seed: self.session.rng_seed,
            settings: self.session.settings.clone(),
        };

        self.send_to(index, &msg);
    }

    /// The full join sequence: spectator body, game state, introductions.
    /// A client that is already in game (resyncing after a map change)
    /// gets a bare `currentstate` snapshot instead.
    fn send_current_state(&mut self, index: usize) {
        info!(
            world_index = self.session.world_index,
            player = index,
            "sending current state"
        );

        let was_in_game = self.clients.get(index).is_some_and(|c| c.in_game);

        if was_in_game {
            match self.session.snapshot() {
                Ok(snapshot) => {
                    let msg = CurrentStateS2c {
                        world_index: self.session.world_index,
                        snapshot,
                    };
                    self.send_to(index, &msg);
                    self.clients.get_mut(index).unwrap().received_game_state = true;
                }
                Err(e) => {
                    error!(error = %e, "could not serialize game state");
                    self.disconnect_client(index, DisconnectReason::NoReason);
                }
            }
            return;
        }

        self.session.init_player(index);

        {
            let client = self.clients.get_mut(index).unwrap();
            client.join_tic = self.session.game_tic;
            client.in_game = true;
            client.connecting = false;
            client.spectating = true;
        }

        let team = self
            .clients
            .get(index)
            .map(|c| c.team)
            .unwrap_or_default();
        let (actor_id, point) = self.session.spawn_player_actor(index, team, true);
        let net_id = self
            .session
            .world
            .get(actor_id)
            .map(|a| a.net_id)
            .unwrap_or_default();

        // Everyone else spawns a spectator body for the newcomer; the
        // newcomer itself spawns from the snapshot below.
        self.broadcast_excluding(
            index,
            &PlayerSpawnedS2c {
                world_index: self.session.world_index,
                player_number: index as u32,
                net_id,
                as_spectator: true,
                x: point.x,
                y: point.y,
                z: ichor_protocol::math::Fixed::ZERO,
                angle: point.angle,
            },
        );

        match self.session.snapshot() {
            Ok(snapshot) => {
                let msg = GameStateS2c {
                    world_index: self.session.world_index,
                    map_number: self.session.map_number as u32,
                    rng_seed: self.session.rng_seed,
                    snapshot,
                };
                self.send_to(index, &msg);
            }
            Err(e) => {
                error!(error = %e, "could not serialize game state");
                self.disconnect_client(index, DisconnectReason::NoReason);
                return;
            }
        }

        self.clients.get_mut(index).unwrap().received_game_state = true;
        self.send_client_intros(index);
    }

    fn send_sync(&mut self, index: usize) {
        if let Some(client) = self.clients.get_mut(index) {
            client.connecting = false;
        }

        let msg = SyncS2c {
            world_index: self.session.world_index,
            game_tic: self.session.game_tic,
            level_time: self.session.world.level_time,
            level_start_tic: self.session.level_start_tic,
            base_tic: self.session.level_start_tic,
        };

        self.send_to(index, &msg);
    }

    /// Ends the map when a rule limit is reached.
    fn check_map_completion(&mut self) {
        if self.should_send_new_map || self.awaiting_sync_since.is_some() {
            return;
        }

        let frag_limit = self.session.settings.frag_limit;
        let time_limit = self.session.settings.time_limit;

        let frags_reached = frag_limit > 0
            && self
                .session
                .players
                .iter()
                .flatten()
                .any(|p| p.frags >= frag_limit as i32);

        let time_reached =
            time_limit > 0 && self.session.world.level_time >= time_limit * 60 * TICRATE;

        if frags_reached || time_reached {
            info!(
                map = %self.session.map.name,
                frags_reached,
                time_reached,
                "map completed"
            );
            self.complete_map(true);
        }
    }

    /// Map completion: pick the next map, announce it, load it, and arm the
    /// new-map broadcast for the next tic. Failure to load leaves the
    /// current map running.
    pub fn complete_map(&mut self, enter_intermission: bool) {
        let next = self.session.next_map_number(&self.config);
        self.change_to_map(next, enter_intermission);
    }

    pub(crate) fn change_to_map(&mut self, map_number: usize, enter_intermission: bool) {
        if map_number >= self.config.maps.len() {
            warn!(map_number, "map change rejected, no such map");
            return;
        }

        // Resource failure aborts the rotation and keeps the current map.
        let map_name = self.config.maps[map_number].name().to_owned();
        if let Err(e) = self.load_map_resources(map_number) {
            error!(map = %map_name, error = %e, "map change aborted");
            return;
        }

        self.broadcast(&MapCompletedS2c {
            world_index: self.session.world_index,
            new_map_number: map_number as u32,
            enter_intermission,
        });

        for i in self.clients.in_game_indices() {
            self.clients.get_mut(i).unwrap().reset_for_new_map();
        }

        self.session.change_map(&self.config, map_number);
        self.actor_deltas = ActorDeltas::default();
        self.should_send_new_map = true;

        if let Some(demo) = self.demo.as_mut() {
            let name = self.config.maps[map_number].name().to_owned();
            if let Err(e) = demo.new_map(&name) {
                error!(error = %e, "demo error, recording aborted");
                self.demo = None;
            }
        }
    }

    fn load_map_resources(&mut self, map_number: usize) -> anyhow::Result<()> {
        use ichor_config::RawResource;

        let entry = &self.config.maps[map_number];
        let wads = entry.wads().to_vec();

        for wad in wads {
            if self.resources.by_name(&wad).is_some() {
                continue;
            }

            let raw = RawResource {
                name: wad.clone(),
                resource_type: ichor_config::ResourceType::Pwad,
                alternates: vec![],
            };

            let folders: Vec<std::path::PathBuf> = self
                .config
                .server
                .wad_folders
                .iter()
                .map(std::path::PathBuf::from)
                .collect();

            let store = ichor_config::ResourceStore::resolve(
                &[raw],
                &folders,
                self.config.server.wad_repository.as_deref(),
                std::path::Path::new("wad_cache"),
            )?;

            self.resources
                .resources
                .extend(store.resources.into_iter());
        }

        Ok(())
    }

    /// The first tic of a new map: world index resets, `mapstarted` goes
    /// out, flags and stands get their spawn events, and the sync barrier
    /// arms.
    fn send_new_map(&mut self) {
        self.session.world_index = 0;
        self.session.level_start_tic = self.session.game_tic;

        for i in self.clients.in_game_indices() {
            let client = self.clients.get_mut(i).unwrap();
            client.received_game_state = false;
        }

        self.broadcast(&MapStartedS2c {
            world_index: 0,
            settings: self.session.settings.clone(),
        });

        // Flag stands and flags exist at spawn; clients bind their net ids
        // from these events.
        let flag_actors: Vec<_> = self
            .session
            .world
            .actors()
            .filter(|(_, a)| matches!(a.kind, ActorKind::FlagStand | ActorKind::Flag))
            .map(|(_, a)| (a.net_id, a.kind, a.x, a.y, a.z, a.angle, a.flags))
            .collect();

        for (net_id, kind, x, y, z, angle, flags) in flag_actors {
            self.broadcast(&ActorSpawnedS2c {
                world_index: 0,
                net_id,
                actor_type: kind.to_raw(),
                x,
                y,
                z,
                angle,
                flags,
            });
        }

        self.awaiting_sync_since = Some(self.session.game_tic);
        self.should_send_new_map = false;
    }

    /// The state document POSTed to masters.
    pub(crate) fn master_state_json(&self) -> serde_json::Value {
        let players: Vec<serde_json::Value> = self
            .clients
            .in_game_indices()
            .into_iter()
            .map(|i| {
                let client = self.clients.get(i).unwrap();
                let name = self.player_name(i);
                let frags = self.session.player(i).map_or(0, |p| p.frags);
                let time = self
                    .session
                    .game_tic
                    .saturating_sub(client.join_tic)
                    / TICRATE;

                serde_json::json!({
                    "name": name,
                    "lag": client.transit_lag,
                    "packet_loss": client.packet_loss,
                    "frags": frags,
                    "time": time,
                    "playing": !client.spectating,
                })
            })
            .collect();

        let mut state = serde_json::json!({
            "players": players,
            "map": self.session.map.name,
        });

        if self.session.settings.game_type.has_teams() {
            let mut team_scores = serde_json::Map::new();

            for team in [
                ichor_protocol::types::TeamColor::Red,
                ichor_protocol::types::TeamColor::Blue,
            ] {
                let score: i32 = self
                    .clients
                    .in_game_indices()
                    .into_iter()
                    .filter(|&i| self.clients.get(i).unwrap().team == team)
                    .map(|i| self.session.player(i).map_or(0, |p| p.frags))
                    .sum();

                team_scores.insert(team.name().to_owned(), serde_json::json!(score));
            }

            state["team_scores"] = serde_json::Value::Object(team_scores);
        }

        state
    }
}

fn differs(a: &ActorPosition, b: &ActorPosition) -> bool {
    (a.x, a.y, a.z, a.momx, a.momy, a.momz, a.angle)
        != (b.x, b.y, b.z, b.momx, b.momy, b.momz, b.angle)
}
