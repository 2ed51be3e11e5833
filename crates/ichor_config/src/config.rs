//! The server JSON document and its validation.

use std::path::Path;

use ichor_protocol::types::{BfgType, DeathAction, GameType, Settings};
use ichor_protocol::MAX_CLIENTS;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::resources::RawResource;
use crate::ConfigError;

pub const DEFAULT_PORT: u16 = 10666;

/// The parsed and validated server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub options: OptionsConfig,
    pub resources: Vec<RawResource>,
    pub maps: Vec<MapEntry>,
    pub masters: Vec<MasterConfig>,
    /// The raw `options` object, kept so per-map overrides can be merged
    /// over it and re-validated.
    raw_options: Value,
}

#[derive(Clone, Debug, Deserialize)]
struct RawConfig {
    resources: Vec<RawResource>,
    server: ServerSection,
    options: Value,
    maps: Vec<MapEntry>,
    #[serde(default)]
    masters: Vec<MasterConfig>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerSection {
    /// `"public"` binds every interface and reports the first public IPv4
    /// to the masters; anything else is a literal bind address.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_player_clients")]
    pub max_player_clients: u32,
    #[serde(default)]
    pub max_admin_clients: u32,
    pub game_type: GameType,
    #[serde(default)]
    pub randomize_maps: RandomizeMaps,
    #[serde(default, skip_serializing)]
    pub spectator_password: Option<String>,
    #[serde(default, skip_serializing)]
    pub player_password: Option<String>,
    #[serde(default, skip_serializing)]
    pub moderator_password: Option<String>,
    #[serde(default, skip_serializing)]
    pub administrator_password: Option<String>,
    #[serde(default)]
    pub wad_repository: Option<String>,
    #[serde(default)]
    pub wad_folders: Vec<String>,
    /// Seconds a `can_join` client has to actually join before being
    /// marked AFK.
    #[serde(default = "default_join_time_limit")]
    pub join_time_limit: u32,
}

fn default_address() -> String {
    String::from("public")
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_max_player_clients() -> u32 {
    MAX_CLIENTS as u32
}

const fn default_join_time_limit() -> u32 {
    30
}

#[derive(Copy, Clone, Default, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RandomizeMaps {
    #[default]
    None,
    Random,
    Shuffle,
}

/// Every recognized gameplay option, each with its documented default.
/// Unknown keys in the document are ignored for forward compatibility;
/// invalid values on known keys fail fast.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct OptionsConfig {
    pub max_players: u32,
    pub max_players_per_team: u32,
    pub number_of_teams: u32,
    pub skill: u32,
    pub frag_limit: u32,
    pub time_limit: u32,
    pub score_limit: u32,
    pub death_time_limit: u32,
    pub death_time_expired_action: DeathAction,
    pub respawn_protection_time: u32,
    pub friendly_damage_percentage: u32,
    pub friend_distance: u32,
    pub dogs: u32,
    pub bfg_type: BfgType,
    pub dmflags: u32,
    pub dmflags2: u32,
    pub compatflags: u32,
    pub buffer_commands: bool,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            max_players: MAX_CLIENTS as u32,
            max_players_per_team: 8,
            number_of_teams: 0,
            skill: 5,
            frag_limit: 0,
            time_limit: 0,
            score_limit: 0,
            death_time_limit: 0,
            death_time_expired_action: DeathAction::Spectate,
            respawn_protection_time: 0,
            friendly_damage_percentage: 0,
            friend_distance: 128,
            dogs: 0,
            bfg_type: BfgType::Bfg9000,
            dmflags: 0,
            dmflags2: 0,
            compatflags: 0,
            buffer_commands: true,
        }
    }
}

impl OptionsConfig {
    /// Parses an `options` object, dropping unknown keys with a warning.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let Value::Object(map) = value else {
            return Err(ConfigError::Invalid(String::from(
                "'options' is not an object",
            )));
        };

        let known: Vec<&str> = vec![
            "max_players",
            "max_players_per_team",
            "number_of_teams",
            "skill",
            "frag_limit",
            "time_limit",
            "score_limit",
            "death_time_limit",
            "death_time_expired_action",
            "respawn_protection_time",
            "friendly_damage_percentage",
            "friend_distance",
            "dogs",
            "bfg_type",
            "dmflags",
            "dmflags2",
            "compatflags",
            "buffer_commands",
        ];

        let mut filtered = serde_json::Map::new();
        for (key, val) in map {
            if known.contains(&key.as_str()) {
                filtered.insert(key.clone(), val.clone());
            } else {
                warn!(option = %key, "ignoring unknown option");
            }
        }

        let options: Self = serde_json::from_value(Value::Object(filtered)).map_err(|e| {
            ConfigError::Invalid(format!("invalid option value: {e}"))
        })?;

        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_range("max_players", self.max_players, 1, MAX_CLIENTS as i64)?;
        check_range("max_players_per_team", self.max_players_per_team, 1, 16)?;
        check_range("number_of_teams", self.number_of_teams, 0, 2)?;
        check_range("skill", self.skill, 1, 5)?;
        check_range("frag_limit", self.frag_limit, 0, 100_000)?;
        check_range("time_limit", self.time_limit, 0, 100_000)?;
        check_range("score_limit", self.score_limit, 0, 100_000)?;
        check_range("death_time_limit", self.death_time_limit, 0, 100_000)?;
        check_range(
            "respawn_protection_time",
            self.respawn_protection_time,
            0,
            100_000,
        )?;
        check_range(
            "friendly_damage_percentage",
            self.friendly_damage_percentage,
            0,
            100,
        )?;
        check_range("friend_distance", self.friend_distance, 1, 1024)?;
        check_range("dogs", self.dogs, 0, 3)?;
        Ok(())
    }

    /// The settings block broadcast to clients and stamped into demos.
    pub fn to_settings(&self, game_type: GameType) -> Settings {
        Settings {
            game_type,
            skill: self.skill,
            max_players: if game_type == GameType::Duel {
                2
            } else {
                self.max_players
            },
            max_players_per_team: self.max_players_per_team,
            number_of_teams: self.number_of_teams,
            frag_limit: self.frag_limit,
            time_limit: self.time_limit,
            score_limit: self.score_limit,
            death_time_limit: self.death_time_limit,
            death_time_expired_action: self.death_time_expired_action,
            respawn_protection_time: self.respawn_protection_time,
            friendly_damage_percentage: self.friendly_damage_percentage,
            friend_distance: self.friend_distance,
            dogs: self.dogs,
            bfg_type: self.bfg_type,
            dmflags: self.dmflags,
            dmflags2: self.dmflags2,
            compatflags: self.compatflags,
        }
    }
}

fn check_range(
    option: &'static str,
    value: u32,
    min: i64,
    max: i64,
) -> Result<(), ConfigError> {
    if i64::from(value) < min {
        return Err(ConfigError::OptionTooSmall { option, min });
    }
    if i64::from(value) > max {
        return Err(ConfigError::OptionTooLarge { option, max });
    }
    Ok(())
}

/// One entry of the map rotation: either a bare name or a name with extra
/// wads and option overrides.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MapEntry {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        wads: Vec<String>,
        #[serde(default)]
        overrides: Option<Value>,
    },
}

impl MapEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Full { name, .. } => name,
        }
    }

    pub fn wads(&self) -> &[String] {
        match self {
            Self::Name(_) => &[],
            Self::Full { wads, .. } => wads,
        }
    }

    pub fn overrides(&self) -> Option<&Value> {
        match self {
            Self::Name(_) => None,
            Self::Full { overrides, .. } => overrides.as_ref(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MasterConfig {
    pub address: String,
    pub group: String,
    pub name: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let raw: RawConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: path.display().to_string(),
                source,
            })?;

        Self::from_raw(raw)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_json::from_str(text).map_err(|source| ConfigError::Json {
                path: String::from("<inline>"),
                source,
            })?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let options = OptionsConfig::from_value(&raw.options)?;
        let server = raw.server;

        if server.port == 0 {
            return Err(ConfigError::OptionTooSmall {
                option: "port",
                min: 1,
            });
        }

        if server.max_player_clients + server.max_admin_clients > MAX_CLIENTS as u32 {
            return Err(ConfigError::Invalid(format!(
                "'max_player_clients' ({}) plus 'max_admin_clients' ({}) exceeds the {} client slots",
                server.max_player_clients, server.max_admin_clients, MAX_CLIENTS
            )));
        }

        for (option, password) in [
            ("moderator_password", &server.moderator_password),
            ("administrator_password", &server.administrator_password),
        ] {
            if password.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::Invalid(format!("'{option}' must be set")));
            }
        }

        if server.game_type.has_teams() && options.number_of_teams != 2 {
            return Err(ConfigError::Invalid(format!(
                "'{:?}' requires 'number_of_teams' to be 2",
                server.game_type
            )));
        }

        if raw.maps.is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "'maps' must list at least one map",
            )));
        }

        for map in &raw.maps {
            if map.name().is_empty() || map.name().len() > 8 {
                return Err(ConfigError::Invalid(format!(
                    "map name '{}' must be 1-8 characters",
                    map.name()
                )));
            }

            // Overrides re-enter the full validator so a bad per-map value
            // fails at startup, not at rotation time.
            if let Some(overrides) = map.overrides() {
                Self::merge_options(&raw.options, overrides)?;
            }
        }

        let iwad_count = raw
            .resources
            .iter()
            .filter(|r| r.is_iwad())
            .count();
        match iwad_count {
            0 => {
                return Err(ConfigError::Invalid(String::from(
                    "no IWAD specified in 'resources'",
                )))
            }
            1 => {}
            _ => {
                return Err(ConfigError::Invalid(String::from(
                    "cannot specify multiple IWAD files",
                )))
            }
        }

        Ok(Self {
            server,
            options,
            resources: raw.resources,
            maps: raw.maps,
            masters: raw.masters,
            raw_options: raw.options,
        })
    }

    /// Applies a per-map override object on top of the base options and
    /// re-validates the result.
    pub fn options_for_map(&self, map: &MapEntry) -> Result<OptionsConfig, ConfigError> {
        match map.overrides() {
            Some(overrides) => Self::merge_options(&self.raw_options, overrides),
            None => Ok(self.options.clone()),
        }
    }

    fn merge_options(base: &Value, patch: &Value) -> Result<OptionsConfig, ConfigError> {
        let Value::Object(patch) = patch else {
            return Err(ConfigError::Invalid(String::from(
                "map 'overrides' is not an object",
            )));
        };

        let mut merged = match base {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };

        for (key, val) in patch {
            merged.insert(key.clone(), val.clone());
        }

        OptionsConfig::from_value(&Value::Object(merged))
    }

    /// The effective settings for the lobby map.
    pub fn settings(&self) -> Settings {
        self.options.to_settings(self.server.game_type)
    }

    /// The configuration echoed to master servers: resources, options, and
    /// maps, with passwords replaced by `requires_*` booleans.
    pub fn public_json(&self) -> Value {
        serde_json::json!({
            "server": {
                "address": self.server.address,
                "port": self.server.port,
                "game_type": self.server.game_type,
                "max_player_clients": self.server.max_player_clients,
                "max_admin_clients": self.server.max_admin_clients,
                "requires_spectator_password": self.server.spectator_password.is_some(),
                "requires_player_password": self.server.player_password.is_some(),
            },
            "resources": self.resources,
            "options": self.options,
            "maps": self.maps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config(server_patch: &str, options: &str) -> String {
        format!(
            r#"{{
                "resources": [
                    {{ "name": "DOOM2.WAD", "type": "iwad" }}
                ],
                "server": {{
                    "game_type": "dm",
                    "moderator_password": "mod",
                    "administrator_password": "admin"
                    {server_patch}
                }},
                "options": {options},
                "maps": ["MAP01", {{ "name": "MAP07", "overrides": {{ "frag_limit": 30 }} }}]
            }}"#
        )
    }

    #[test]
    fn minimal_config_parses() {
        let config = ServerConfig::from_json(&minimal_config("", "{}")).unwrap();

        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.maps.len(), 2);
        assert_eq!(config.settings().game_type, GameType::Deathmatch);
    }

    #[test]
    fn unknown_options_are_ignored() {
        let config =
            ServerConfig::from_json(&minimal_config("", r#"{ "hover_boots": true }"#)).unwrap();

        assert_eq!(config.options.skill, 5);
    }

    #[test]
    fn invalid_option_value_fails_fast() {
        let err = ServerConfig::from_json(&minimal_config("", r#"{ "skill": 9 }"#)).unwrap_err();

        assert!(err.to_string().contains("skill"));
    }

    #[test]
    fn bfg_type_enumerated() {
        let config = ServerConfig::from_json(&minimal_config(
            "",
            r#"{ "bfg_type": "plasma burst" }"#,
        ))
        .unwrap();
        assert_eq!(config.options.bfg_type, BfgType::PlasmaBurst);

        assert!(
            ServerConfig::from_json(&minimal_config("", r#"{ "bfg_type": "12000" }"#)).is_err()
        );
    }

    #[test]
    fn admin_passwords_required() {
        let json = r#"{
            "resources": [{ "name": "DOOM2.WAD", "type": "iwad" }],
            "server": { "game_type": "coop", "moderator_password": "mod" },
            "options": {},
            "maps": ["MAP01"]
        }"#;

        let err = ServerConfig::from_json(json).unwrap_err();
        assert!(err.to_string().contains("administrator_password"));
    }

    #[test]
    fn client_budget_overflow_rejected() {
        let err = ServerConfig::from_json(&minimal_config(
            r#", "max_player_clients": 12, "max_admin_clients": 8"#,
            "{}",
        ))
        .unwrap_err();

        assert!(err.to_string().contains("max_player_clients"));
    }

    #[test]
    fn team_games_require_two_teams() {
        let json = minimal_config("", "{}").replace("\"dm\"", "\"ctf\"");
        assert!(ServerConfig::from_json(&json).is_err());

        let json = minimal_config("", r#"{ "number_of_teams": 2 }"#).replace("\"dm\"", "\"ctf\"");
        assert!(ServerConfig::from_json(&json).is_ok());
    }

    #[test]
    fn duel_forces_two_players() {
        let json = minimal_config("", "{}").replace("\"dm\"", "\"duel\"");
        let config = ServerConfig::from_json(&json).unwrap();

        assert_eq!(config.settings().max_players, 2);
    }

    #[test]
    fn per_map_overrides_revalidate() {
        let config = ServerConfig::from_json(&minimal_config("", "{}")).unwrap();
        let options = config.options_for_map(&config.maps[1]).unwrap();

        assert_eq!(options.frag_limit, 30);
        assert_eq!(config.options.frag_limit, 0);

        // A bad override fails at load time.
        let bad = minimal_config("", "{}").replace(
            r#"{ "frag_limit": 30 }"#,
            r#"{ "skill": 11 }"#,
        );
        assert!(ServerConfig::from_json(&bad).is_err());
    }

    #[test]
    fn iwad_must_be_unique() {
        let json = r#"{
            "resources": [
                { "name": "DOOM2.WAD", "type": "iwad" },
                { "name": "TNT.WAD", "type": "iwad" }
            ],
            "server": { "game_type": "coop", "moderator_password": "m", "administrator_password": "a" },
            "options": {},
            "maps": ["MAP01"]
        }"#;

        assert!(ServerConfig::from_json(json).is_err());
    }

    #[test]
    fn public_json_hides_passwords() {
        let config = ServerConfig::from_json(&minimal_config(
            r#", "spectator_password": "hunter2""#,
            "{}",
        ))
        .unwrap();

        let public = serde_json::to_string(&config.public_json()).unwrap();
        assert!(!public.contains("hunter2"));
        assert!(public.contains("requires_spectator_password"));
    }
}
