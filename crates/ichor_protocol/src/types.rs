//! Wire-level data types shared by multiple messages and by the simulation.

use serde::{Deserialize, Serialize};

use crate::math::{Angle, Fixed};
use crate::{Decode, Encode};

/// Identifies a spawned map object across the wire for the duration of one
/// map. Zero is "no actor"; the low reserved range covers the spawn-only
/// effect actors every client can synthesize locally.
#[derive(
    Copy,
    Clone,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Encode,
    Decode,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct NetId(pub u32);

impl NetId {
    pub const NONE: Self = Self(0);
    /// Teleport fog from the previous map carries over its reserved id.
    pub const FOG: Self = Self(1);
    pub const PUFF: Self = Self(2);
    pub const BLOOD: Self = Self(3);

    /// First id handed out by per-map enumeration.
    pub const FIRST_DYNAMIC: u32 = 4;

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Why a peer was disconnected. The integer values are stable on the wire.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug, Encode, Decode)]
pub enum DisconnectReason {
    #[default]
    NoReason = 0,
    ServerFull = 1,
    InvalidMessage = 2,
    LatencyLimit = 3,
    CommandFlood = 4,
    Kicked = 5,
    Banned = 6,
}

impl DisconnectReason {
    /// The string shown to players, indexed like the historical table.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoReason => "",
            Self::ServerFull => "Server is full",
            Self::InvalidMessage => "Invalid message received",
            Self::LatencyLimit => "Latency limit exceeded",
            Self::CommandFlood => "Command flood",
            Self::Kicked => "Kicked",
            Self::Banned => "Banned",
        }
    }
}

/// Authorization levels form a total order; gameplay messages require at
/// least [`Spectator`](Self::Spectator).
#[derive(
    Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Debug, Encode, Decode,
)]
pub enum AuthLevel {
    #[default]
    None = 0,
    Spectator = 1,
    Player = 2,
    Moderator = 3,
    Administrator = 4,
}

/// A client's admission state on the join queue.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug, Encode, Decode)]
pub enum QueueLevel {
    #[default]
    None = 0,
    Waiting = 1,
    CanJoin = 2,
    Playing = 3,
}

/// The game mode the server is running.
#[derive(
    Copy, Clone, Default, PartialEq, Eq, Debug, Encode, Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    #[default]
    Coop = 0,
    #[serde(rename = "dm")]
    Deathmatch = 1,
    #[serde(rename = "tdm")]
    TeamDeathmatch = 2,
    #[serde(rename = "ctf")]
    CaptureTheFlag = 3,
    Duel = 4,
}

impl GameType {
    pub const fn has_teams(self) -> bool {
        matches!(self, Self::TeamDeathmatch | Self::CaptureTheFlag)
    }
}

#[derive(Copy, Clone, Default, PartialEq, Eq, Debug, Encode, Decode)]
pub enum TeamColor {
    #[default]
    None = 0,
    Red = 1,
    Blue = 2,
}

impl TeamColor {
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Red => "red",
            Self::Blue => "blue",
        }
    }
}

/// What happens when a dead player exhausts the death time limit.
#[derive(
    Copy, Clone, Default, PartialEq, Eq, Debug, Encode, Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DeathAction {
    #[default]
    Spectate = 0,
    Respawn = 1,
}

/// BFG behavior variants.
#[derive(
    Copy, Clone, Default, PartialEq, Eq, Debug, Encode, Decode, Serialize, Deserialize,
)]
pub enum BfgType {
    #[default]
    #[serde(rename = "9000")]
    Bfg9000 = 0,
    #[serde(rename = "2704")]
    Bfg2704 = 1,
    #[serde(rename = "11000")]
    Bfg11k = 2,
    #[serde(rename = "bouncing")]
    Bouncing = 3,
    #[serde(rename = "plasma burst")]
    PlasmaBurst = 4,
}

/// The nine weapon slots.
#[derive(
    Copy, Clone, Default, PartialEq, Eq, Debug, Encode, Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WeaponType {
    #[default]
    Fist = 0,
    Pistol = 1,
    Shotgun = 2,
    Chaingun = 3,
    RocketLauncher = 4,
    PlasmaRifle = 5,
    Bfg = 6,
    Chainsaw = 7,
    SuperShotgun = 8,
}

impl WeaponType {
    pub const COUNT: usize = 9;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Fist,
        Self::Pistol,
        Self::Shotgun,
        Self::Chaingun,
        Self::RocketLauncher,
        Self::PlasmaRifle,
        Self::Bfg,
        Self::Chainsaw,
        Self::SuperShotgun,
    ];
}

/// Which state transfer a client is asking for.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode)]
pub enum StateRequest {
    InitialState = 0,
    CurrentState = 1,
    Sync = 2,
}

/// Who a player message is addressed to.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode)]
pub enum RecipientKind {
    Server = 0,
    Player = 1,
    Team = 2,
    All = 3,
    Auth = 4,
    Rcon = 5,
    Vote = 6,
}

/// Which actor back-reference an `actortarget` message updates.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode)]
pub enum ActorTargetKind {
    Target = 0,
    Tracer = 1,
    LastEnemy = 2,
}

/// How a line special was triggered.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode)]
pub enum ActivationKind {
    Crossed = 0,
    Used = 1,
    Shot = 2,
}

/// Announcer sound events for team games.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode)]
pub enum AnnouncerEvent {
    FlagTaken = 0,
    FlagDropped = 1,
    FlagReturned = 2,
    FlagCaptured = 3,
    RoundStarted = 4,
    RoundWon = 5,
    RoundLost = 6,
}

/// A player's life-cycle state; rewound shots against a player who was not
/// live at the rewound tic deal no damage.
#[derive(
    Copy, Clone, Default, PartialEq, Eq, Debug, Encode, Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    #[default]
    Live = 0,
    Dead = 1,
    Reborn = 2,
}

/// Every gameplay switch the server dictates, snapshotted into demos and
/// echoed to clients in `initialstate` and `mapstarted`.
#[derive(Clone, PartialEq, Eq, Debug, Encode, Decode, Serialize, Deserialize)]
pub struct Settings {
    pub game_type: GameType,
    pub skill: u32,
    pub max_players: u32,
    pub max_players_per_team: u32,
    pub number_of_teams: u32,
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
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            game_type: GameType::Coop,
            skill: 5,
            max_players: 16,
            max_players_per_team: 8,
            number_of_teams: 0,
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
        }
    }
}

/// Per-client option overrides the server loads while ticking that client.
#[derive(Clone, PartialEq, Eq, Debug, Encode, Decode, Serialize, Deserialize)]
pub struct ClientOptions {
    pub player_bobbing: bool,
    pub bobbing_intensity: Fixed,
    pub doom_weapon_toggles: bool,
    pub autoaim: bool,
    pub weapon_speed: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            player_bobbing: true,
            bobbing_intensity: Fixed::ONE,
            doom_weapon_toggles: true,
            autoaim: true,
            weapon_speed: 0,
        }
    }
}

/// The per-client record broadcast in `clientinit`.
#[derive(Clone, Default, PartialEq, Eq, Debug, Encode, Decode)]
pub struct ClientInfo {
    pub auth_level: AuthLevel,
    pub queue_level: QueueLevel,
    pub queue_position: u32,
    pub team: TeamColor,
    pub spectating: bool,
    pub afk: bool,
    pub frags: i32,
    pub death_time: u32,
    pub transit_lag: u32,
    pub packet_loss: u8,
}

/// One field of a player's public info, as carried by `playerinfoupdated`.
/// Clients may only update their own entry, and only within what their auth
/// level and the server's dmflags permit.
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
pub enum PlayerInfo {
    Name(crate::Bounded<String, 32>),
    Skin(crate::Bounded<String, 32>),
    PlayerClass(crate::Bounded<String, 32>),
    ColorMap(u8),
    Team(TeamColor),
    Spectating(bool),
    QueueLevel(QueueLevel),
    QueuePosition(u32),
    Afk(bool),
    Frags(i32),
    WeaponPreference { slot: u8, weapon: WeaponType },
    PlayerBobbing(bool),
    BobbingIntensity(Fixed),
    WeaponToggles(bool),
    AutoAim(bool),
    WeaponSpeed(u32),
}

/// A player position snapshot. Written to the position ring every tic,
/// broadcast unsequenced every tic, and restored wholesale by the unlagged
/// rewind, so the fields must round-trip bit-identically.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug, Encode, Decode)]
pub struct PlayerPosition {
    /// The tic this snapshot belongs to.
    pub world_index: u32,
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub momx: Fixed,
    pub momy: Fixed,
    pub momz: Fixed,
    pub angle: Angle,
    pub pitch: Fixed,
    pub view_z: Fixed,
    pub floor_clip: Fixed,
    pub jump_time: u8,
    pub flags: u32,
}

/// The slow-moving actor state that rides alongside position snapshots.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug, Encode, Decode)]
pub struct MiscState {
    pub world_index: u32,
    pub flags: u32,
    pub flags2: u32,
    pub flags3: u32,
    pub flags4: u32,
    pub friction: Fixed,
    pub movefactor: Fixed,
    pub reaction_time: i32,
}

/// A non-player actor position snapshot.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug, Encode, Decode)]
pub struct ActorPosition {
    pub world_index: u32,
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub momx: Fixed,
    pub momy: Fixed,
    pub momz: Fixed,
    pub angle: Angle,
}

/// A sector's moving-plane heights at a given tic.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug, Encode, Decode)]
pub struct SectorPosition {
    pub world_index: u32,
    pub ceiling_height: Fixed,
    pub floor_height: Fixed,
}

/// One tic of player input. Fixed size on the wire; `world_index` is the
/// server tic the client believed it was executing in, which anchors the
/// unlagged rewind.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug, Encode, Decode)]
pub struct PlayerCommand {
    /// Per-client sequence number.
    pub index: u32,
    pub world_index: u32,
    pub forward_move: i8,
    pub side_move: i8,
    pub angle_turn: i16,
    pub look: i16,
    pub buttons: u8,
    pub weapon_select: u8,
    pub actions: u8,
    /// Legacy chat sideband.
    pub chat_char: u8,
}

impl PlayerCommand {
    pub const BT_ATTACK: u8 = 1;
    pub const BT_USE: u8 = 1 << 1;
    pub const BT_CHANGE: u8 = 1 << 2;
    pub const BT_JUMP: u8 = 1 << 3;

    pub const AT_RESPAWN: u8 = 1;
    pub const AT_SPECTATE: u8 = 1 << 1;

    pub const fn has_button(&self, button: u8) -> bool {
        self.buttons & button != 0
    }

    pub const fn has_action(&self, action: u8) -> bool {
        self.actions & action != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T>(value: T) -> usize
    where
        T: Encode + for<'a> Decode<'a> + PartialEq + std::fmt::Debug,
    {
        let mut buf = vec![];
        value.encode(&mut buf).unwrap();

        let mut r = &buf[..];
        let decoded = T::decode(&mut r).unwrap();

        assert_eq!(value, decoded);
        assert!(r.is_empty());
        buf.len()
    }

    #[test]
    fn player_command_is_fixed_size() {
        let size = round_trip(PlayerCommand {
            index: 3,
            world_index: 100,
            forward_move: 25,
            side_move: -25,
            angle_turn: 640,
            look: -32,
            buttons: PlayerCommand::BT_ATTACK | PlayerCommand::BT_USE,
            weapon_select: 2,
            actions: 0,
            chat_char: 0,
        });

        assert_eq!(size, 18);
    }

    #[test]
    fn position_snapshot_round_trips_bit_identically() {
        round_trip(PlayerPosition {
            world_index: 12345,
            x: Fixed(-0x7FFF_0001),
            y: Fixed(0x1234_5678),
            z: Fixed::from_int(24),
            momx: Fixed(-3),
            momy: Fixed::ZERO,
            momz: Fixed(1),
            angle: Angle::SOUTH,
            pitch: Fixed::from_int(-10),
            view_z: Fixed::from_int(41),
            floor_clip: Fixed::ZERO,
            jump_time: 7,
            flags: 0xDEAD_BEEF,
        });
    }

    #[test]
    fn settings_round_trip() {
        round_trip(Settings {
            game_type: GameType::CaptureTheFlag,
            number_of_teams: 2,
            frag_limit: 50,
            dmflags: 0x41,
            ..Settings::default()
        });
    }

    #[test]
    fn player_info_variants_round_trip() {
        round_trip(PlayerInfo::Name(crate::Bounded(String::from("zombieman"))));
        round_trip(PlayerInfo::Team(TeamColor::Blue));
        round_trip(PlayerInfo::WeaponPreference {
            slot: 1,
            weapon: WeaponType::SuperShotgun,
        });
    }

    #[test]
    fn auth_levels_are_ordered() {
        assert!(AuthLevel::None < AuthLevel::Spectator);
        assert!(AuthLevel::Spectator < AuthLevel::Player);
        assert!(AuthLevel::Player < AuthLevel::Moderator);
        assert!(AuthLevel::Moderator < AuthLevel::Administrator);
    }

    #[test]
    fn game_type_serde_names() {
        assert_eq!(
            serde_json::to_value(GameType::TeamDeathmatch).unwrap(),
            serde_json::json!("tdm")
        );
        assert_eq!(
            serde_json::from_value::<BfgType>(serde_json::json!("plasma burst")).unwrap(),
            BfgType::PlasmaBurst
        );
    }
}
