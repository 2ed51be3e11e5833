//! Global engine state as a value: the world, the players, the map
//! rotation, and the per-sector position rings.
//!
//! Everything the old engines kept in globals is threaded through the tic
//! loop as a `Session`, and the per-client option overrides become a scoped
//! load/restore pair around the one-client tick.

use ichor_config::{MapEntry, OptionsConfig, ServerConfig};
use ichor_game::map::SpawnPoint;
use ichor_game::player::spectator_flags;
use ichor_game::{Actor, ActorId, ActorKind, GameSnapshot, MapInfo, Player, World, MAX_POSITIONS};
use ichor_protocol::math::Fixed;
use ichor_protocol::types::{ClientOptions, GameType, SectorPosition, Settings, TeamColor};
use ichor_protocol::MAX_CLIENTS;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

pub struct Session {
    pub settings: Settings,
    pub options: OptionsConfig,
    pub world: World,
    pub map: MapInfo,
    pub players: Vec<Option<Player>>,

    /// The server's monotonic simulation counter, reset to 0 on map change.
    pub world_index: u32,
    /// Monotonic across maps.
    pub game_tic: u32,
    pub level_start_tic: u32,
    pub rng_seed: u32,

    /// Current map in the rotation, 0-based.
    pub map_number: usize,
    /// Shuffle rotation bookkeeping.
    pub maps_used: Vec<bool>,

    /// Per-sector position rings, addressed modulo `MAX_POSITIONS`.
    pub sector_rings: Vec<Vec<SectorPosition>>,

    /// The server-wide options saved while a client override is loaded.
    saved_options: Option<ClientOptions>,
    /// The options the simulation currently honors.
    pub active_options: ClientOptions,
}

impl Session {
    pub fn new(config: &ServerConfig, map_number: usize, rng_seed: u32) -> Self {
        let map_entry = &config.maps[map_number];
        let options = config
            .options_for_map(map_entry)
            .expect("per-map overrides were validated at load");
        let settings = options.to_settings(config.server.game_type);

        let map = MapInfo::arena(map_entry.name());
        let world = World::new(&map, rng_seed);
        let sector_rings = Self::fresh_sector_rings(&world);

        let mut players = Vec::with_capacity(MAX_CLIENTS + 1);
        players.resize_with(MAX_CLIENTS + 1, || None);

        Self {
            settings,
            options,
            world,
            map,
            players,
            world_index: 0,
            game_tic: 0,
            level_start_tic: 0,
            rng_seed,
            map_number,
            maps_used: vec![false; config.maps.len()],
            sector_rings,
            saved_options: None,
            active_options: ClientOptions::default(),
        }
    }

    fn fresh_sector_rings(world: &World) -> Vec<Vec<SectorPosition>> {
        world
            .sectors
            .iter()
            .map(|_| vec![SectorPosition::default(); MAX_POSITIONS])
            .collect()
    }

    /// Gives slot `number` its default identity.
    pub fn init_player(&mut self, number: usize) {
        self.players[number] = Some(Player::new(number as u32));
    }

    pub fn remove_player(&mut self, number: usize) {
        if let Some(player) = self.players[number].take() {
            if let Some(actor) = player.actor {
                self.world.remove(actor);
            }
        }
    }

    pub fn player(&self, number: usize) -> Option<&Player> {
        self.players.get(number)?.as_ref()
    }

    pub fn player_mut(&mut self, number: usize) -> Option<&mut Player> {
        self.players.get_mut(number)?.as_mut()
    }

    /// The spawn point for a joining player under the current rules.
    pub fn spawn_point(&mut self, number: usize, team: TeamColor, as_spectator: bool) -> SpawnPoint {
        if as_spectator {
            return self.map.player_starts[0];
        }

        let starts = match self.settings.game_type {
            GameType::Coop => &self.map.player_starts,
            GameType::Deathmatch | GameType::Duel => &self.map.deathmatch_starts,
            GameType::TeamDeathmatch | GameType::CaptureTheFlag => match team {
                TeamColor::Red => &self.map.team_starts[0],
                TeamColor::Blue => &self.map.team_starts[1],
                TeamColor::None => &self.map.player_starts,
            },
        };

        if starts.is_empty() {
            return self.map.player_starts[0];
        }

        let pick = match self.settings.game_type {
            GameType::Coop => number % starts.len(),
            _ => self.world.rng.next_u8() as usize % starts.len(),
        };

        starts[pick]
    }

    /// Creates (or replaces) the player's body at a fresh spawn point and
    /// returns the new actor id with the spawn point used.
    pub fn spawn_player_actor(
        &mut self,
        number: usize,
        team: TeamColor,
        as_spectator: bool,
    ) -> (ActorId, SpawnPoint) {
        let point = self.spawn_point(number, team, as_spectator);

        if let Some(old) = self.players[number].as_ref().and_then(|p| p.actor) {
            self.world.remove(old);
        }

        let mut actor = Actor::new(
            ActorKind::Player,
            point.x,
            point.y,
            self.world
                .sectors
                .first()
                .map_or(Fixed::ZERO, |s| s.floor_height),
            point.angle,
        );
        actor.player = Some(number as u32);

        if as_spectator {
            actor.flags |= spectator_flags();
        }

        let id = self.world.spawn(actor);
        self.world.assign_net_id(id);

        if let Some(player) = self.player_mut(number) {
            player.actor = Some(id);
            player.state = ichor_protocol::types::PlayerState::Live;
            player.health = 100;
        }

        (id, point)
    }

    /// Toggles the physics and flags of the "flying, intangible, no ammo"
    /// mode on the player's body.
    pub fn set_spectator(&mut self, number: usize, spectating: bool) {
        let Some(actor_id) = self.players[number].as_ref().and_then(|p| p.actor) else {
            return;
        };

        if let Some(actor) = self.world.get_mut(actor_id) {
            if spectating {
                actor.flags |= spectator_flags();
                actor.flags &= !(ichor_game::ActorFlags::SOLID | ichor_game::ActorFlags::SHOOTABLE);
            } else {
                actor.flags &= !spectator_flags();
                actor.flags |= ichor_game::ActorFlags::SOLID | ichor_game::ActorFlags::SHOOTABLE;
            }
        }

        if spectating {
            if let Some(player) = self.player_mut(number) {
                player.ammo = [0; 4];
            }
        }
    }

    /// Loads one client's option overrides into the simulation for the
    /// duration of that client's tick.
    pub fn load_client_options(&mut self, options: &ClientOptions) {
        self.saved_options = Some(self.active_options.clone());
        self.active_options = options.clone();
    }

    /// Restores the server-wide options after a client's tick.
    pub fn restore_server_options(&mut self) {
        if let Some(saved) = self.saved_options.take() {
            self.active_options = saved;
        }
    }

    /// Writes every sector's current heights into its ring at this tic.
    pub fn save_sector_positions(&mut self) {
        let index = self.world_index as usize % MAX_POSITIONS;

        for (sector, ring) in self.world.sectors.iter().zip(&mut self.sector_rings) {
            ring[index] = sector.save_position(self.world_index);
        }
    }

    /// Rewinds (or restores) every sector to its state at `world_index`.
    pub fn load_sector_positions_at(&mut self, world_index: u32) {
        let index = world_index as usize % MAX_POSITIONS;

        for (sector, ring) in self.world.sectors.iter_mut().zip(&self.sector_rings) {
            sector.load_position(&ring[index]);
        }
    }

    /// Decides the next map number under the configured rotation policy.
    pub fn next_map_number(&mut self, config: &ServerConfig) -> usize {
        use ichor_config::RandomizeMaps;

        match config.server.randomize_maps {
            RandomizeMaps::None => (self.map_number + 1) % config.maps.len(),
            RandomizeMaps::Random => rand::thread_rng().gen_range(0..config.maps.len()),
            RandomizeMaps::Shuffle => {
                self.maps_used[self.map_number] = true;

                let unused: Vec<usize> = (0..config.maps.len())
                    .filter(|&i| !self.maps_used[i])
                    .collect();

                match unused.choose(&mut rand::thread_rng()) {
                    Some(&next) => next,
                    None => {
                        // Every map has been played; restart the permutation.
                        self.maps_used.fill(false);
                        rand::thread_rng().gen_range(0..config.maps.len())
                    }
                }
            }
        }
    }

    /// Tears down the old map and sets up `map_number`. Player records
    /// survive; their actors do not.
    pub fn change_map<'a>(&mut self, config: &'a ServerConfig, map_number: usize) -> &'a MapEntry {
        let entry = &config.maps[map_number];

        self.options = config
            .options_for_map(entry)
            .expect("per-map overrides were validated at load");
        self.settings = self.options.to_settings(config.server.game_type);

        self.map = MapInfo::arena(entry.name());
        self.map_number = map_number;

        self.world.clear_for_new_map(&self.map.clone());
        self.sector_rings = Self::fresh_sector_rings(&self.world);

        for player in self.players.iter_mut().flatten() {
            player.actor = None;
            player.frags = 0;
        }

        self.level_start_tic = self.game_tic;
        info!(map = %entry.name(), "map loaded");

        entry
    }

    /// Serializes the full game state.
    pub fn snapshot(&self) -> anyhow::Result<Vec<u8>> {
        GameSnapshot::capture(&self.map.name, &self.world, &self.players).to_bytes()
    }

    /// Count of eligible voters: in-game, not spectating, not AFK is
    /// enforced by the caller against the client table; the session only
    /// knows about players.
    pub fn player_count(&self) -> usize {
        self.players.iter().flatten().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig::from_json(
            r#"{
                "resources": [{ "name": "DOOM2.WAD", "type": "iwad" }],
                "server": {
                    "game_type": "dm",
                    "moderator_password": "m",
                    "administrator_password": "a"
                },
                "options": {},
                "maps": ["MAP01", "MAP02", "MAP03"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn spawned_player_has_a_live_body() {
        let mut session = Session::new(&config(), 0, 7);
        session.init_player(1);

        let (id, _) = session.spawn_player_actor(1, TeamColor::None, false);

        let actor = session.world.get(id).unwrap();
        assert_eq!(actor.player, Some(1));
        assert!(actor.is_shootable());
        assert_eq!(session.player(1).unwrap().actor, Some(id));
    }

    #[test]
    fn spectator_mode_toggles_flags_and_ammo() {
        let mut session = Session::new(&config(), 0, 7);
        session.init_player(1);
        let (id, _) = session.spawn_player_actor(1, TeamColor::None, false);

        session.set_spectator(1, true);
        let actor = session.world.get(id).unwrap();
        assert!(actor.flags & ichor_game::ActorFlags::NOCLIP != 0);
        assert!(!actor.is_shootable());
        assert_eq!(session.player(1).unwrap().ammo, [0; 4]);

        session.set_spectator(1, false);
        assert!(session.world.get(id).unwrap().is_shootable());
    }

    #[test]
    fn option_overrides_are_scoped() {
        let mut session = Session::new(&config(), 0, 7);
        let server_default = session.active_options.clone();

        let overrides = ClientOptions {
            autoaim: false,
            weapon_speed: 2,
            ..ClientOptions::default()
        };

        session.load_client_options(&overrides);
        assert!(!session.active_options.autoaim);

        session.restore_server_options();
        assert_eq!(session.active_options, server_default);
    }

    #[test]
    fn sector_rings_round_trip() {
        let mut session = Session::new(&config(), 0, 7);

        session.world_index = 10;
        session.world.sectors[0].floor_height = Fixed::from_int(32);
        session.save_sector_positions();

        session.world_index = 20;
        session.world.sectors[0].floor_height = Fixed::from_int(64);
        session.save_sector_positions();

        session.load_sector_positions_at(10);
        assert_eq!(session.world.sectors[0].floor_height, Fixed::from_int(32));

        session.load_sector_positions_at(20);
        assert_eq!(session.world.sectors[0].floor_height, Fixed::from_int(64));
    }

    #[test]
    fn sequential_rotation_wraps() {
        let config = config();
        let mut session = Session::new(&config, 2, 7);

        assert_eq!(session.next_map_number(&config), 0);
    }

    #[test]
    fn shuffle_rotation_visits_everything() {
        let mut json = config();
        json.server.randomize_maps = ichor_config::RandomizeMaps::Shuffle;

        let mut session = Session::new(&json, 0, 7);
        let mut visited = vec![0usize; 3];
        visited[0] += 1;

        for _ in 0..2 {
            let next = session.next_map_number(&json);
            visited[next] += 1;
            session.change_map(&json, next);
        }

        // After a full cycle every map was used exactly once.
        assert_eq!(visited, vec![1, 1, 1]);
    }

    #[test]
    fn map_change_resets_world_but_keeps_players(){
        let config = config();
        let mut session = Session::new(&config, 0, 7);
        session.init_player(1);
        session.spawn_player_actor(1, TeamColor::None, false);
        session.player_mut(1).unwrap().frags = 10;

        session.change_map(&config, 1);

        let player = session.player(1).unwrap();
        assert_eq!(player.actor, None);
        assert_eq!(player.frags, 0);
        assert_eq!(session.map.name, "MAP02");
    }
}
