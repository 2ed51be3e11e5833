use thiserror::Error;

use crate::MessageSide;

/// Every kind of message on the wire.
///
/// This is a closed set and the integer values are the wire-compatibility
/// contract: never reorder, never reuse. The three `Special*` kinds are
/// reserved slots for a per-thinker map-special protocol that never shipped;
/// sending or receiving them is a protocol violation.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(u32)]
pub enum MessageKind {
    GameState = 0,
    InitialState = 1,
    CurrentState = 2,
    Sync = 3,
    MapStarted = 4,
    MapCompleted = 5,
    ClientInit = 6,
    AuthResult = 7,
    ClientStatus = 8,
    PlayerPosition = 9,
    PlayerSpawned = 10,
    PlayerInfoUpdated = 11,
    PlayerWeaponState = 12,
    PlayerRemoved = 13,
    PlayerTouchedSpecial = 14,
    ServerMessage = 15,
    PlayerMessage = 16,
    AnnouncerEvent = 17,
    PuffSpawned = 18,
    BloodSpawned = 19,
    ActorSpawned = 20,
    ActorPosition = 21,
    ActorMiscState = 22,
    ActorTarget = 23,
    ActorState = 24,
    ActorDamaged = 25,
    ActorKilled = 26,
    ActorRemoved = 27,
    LineActivated = 28,
    MonsterActive = 29,
    MonsterAwakened = 30,
    MissileSpawned = 31,
    MissileExploded = 32,
    CubeSpawned = 33,
    SpecialSpawned = 34,
    SpecialStatus = 35,
    SpecialRemoved = 36,
    SectorPosition = 37,
    Vote = 38,
    VoteResult = 39,
    TicFinished = 40,
    ClientRequest = 41,
    PlayerCommand = 42,
    VoteRequest = 43,
}

/// The integer tag did not name a known message kind.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Error)]
#[error("unknown message kind {0}")]
pub struct UnknownMessageKind(pub u32);

impl MessageKind {
    /// The side(s) allowed to send this kind.
    pub const fn side(self) -> MessageSide {
        use MessageKind::*;

        match self {
            ClientRequest | PlayerCommand | VoteRequest => MessageSide::Serverbound,
            PlayerMessage | PlayerInfoUpdated => MessageSide::Both,
            _ => MessageSide::Clientbound,
        }
    }

    /// The display name used in logs, matching the historical message names.
    pub const fn name(self) -> &'static str {
        use MessageKind::*;

        match self {
            GameState => "game state",
            InitialState => "initial state",
            CurrentState => "current state",
            Sync => "sync",
            MapStarted => "map started",
            MapCompleted => "map completed",
            ClientInit => "client init",
            AuthResult => "auth result",
            ClientStatus => "client status",
            PlayerPosition => "player position",
            PlayerSpawned => "player spawned",
            PlayerInfoUpdated => "player info updated",
            PlayerWeaponState => "player weapon state",
            PlayerRemoved => "player removed",
            PlayerTouchedSpecial => "player touched special",
            ServerMessage => "server message",
            PlayerMessage => "player message",
            AnnouncerEvent => "announcer event",
            PuffSpawned => "puff spawned",
            BloodSpawned => "blood spawned",
            ActorSpawned => "actor spawned",
            ActorPosition => "actor position",
            ActorMiscState => "actor misc state",
            ActorTarget => "actor target",
            ActorState => "actor state",
            ActorDamaged => "actor damaged",
            ActorKilled => "actor killed",
            ActorRemoved => "actor removed",
            LineActivated => "line activated",
            MonsterActive => "monster active",
            MonsterAwakened => "monster awakened",
            MissileSpawned => "missile spawned",
            MissileExploded => "missile exploded",
            CubeSpawned => "cube spawned",
            SpecialSpawned => "special spawned",
            SpecialStatus => "special status",
            SpecialRemoved => "special removed",
            SectorPosition => "sector position",
            Vote => "vote",
            VoteResult => "vote result",
            TicFinished => "tic finished",
            ClientRequest => "client request",
            PlayerCommand => "player command",
            VoteRequest => "vote request",
        }
    }

    /// Whether this kind is a reserved slot with no shipping payload.
    pub const fn is_reserved(self) -> bool {
        matches!(
            self,
            Self::SpecialSpawned | Self::SpecialStatus | Self::SpecialRemoved
        )
    }
}

impl TryFrom<u32> for MessageKind {
    type Error = UnknownMessageKind;

    fn try_from(n: u32) -> Result<Self, UnknownMessageKind> {
        use MessageKind::*;

        Ok(match n {
            0 => GameState,
            1 => InitialState,
            2 => CurrentState,
            3 => Sync,
            4 => MapStarted,
            5 => MapCompleted,
            6 => ClientInit,
            7 => AuthResult,
            8 => ClientStatus,
            9 => PlayerPosition,
            10 => PlayerSpawned,
            11 => PlayerInfoUpdated,
            12 => PlayerWeaponState,
            13 => PlayerRemoved,
            14 => PlayerTouchedSpecial,
            15 => ServerMessage,
            16 => PlayerMessage,
            17 => AnnouncerEvent,
            18 => PuffSpawned,
            19 => BloodSpawned,
            20 => ActorSpawned,
            21 => ActorPosition,
            22 => ActorMiscState,
            23 => ActorTarget,
            24 => ActorState,
            25 => ActorDamaged,
            26 => ActorKilled,
            27 => ActorRemoved,
            28 => LineActivated,
            29 => MonsterActive,
            30 => MonsterAwakened,
            31 => MissileSpawned,
            32 => MissileExploded,
            33 => CubeSpawned,
            34 => SpecialSpawned,
            35 => SpecialStatus,
            36 => SpecialRemoved,
            37 => SectorPosition,
            38 => Vote,
            39 => VoteResult,
            40 => TicFinished,
            41 => ClientRequest,
            42 => PlayerCommand,
            43 => VoteRequest,
            n => return Err(UnknownMessageKind(n)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_stable() {
        // The wire contract: these values may never change.
        assert_eq!(MessageKind::GameState as u32, 0);
        assert_eq!(MessageKind::ServerMessage as u32, 15);
        assert_eq!(MessageKind::SectorPosition as u32, 37);
        assert_eq!(MessageKind::TicFinished as u32, 40);
        assert_eq!(MessageKind::VoteRequest as u32, 43);
    }

    #[test]
    fn round_trip_all_kinds() {
        for n in 0..44 {
            let kind = MessageKind::try_from(n).unwrap();
            assert_eq!(kind as u32, n);
        }

        assert_eq!(MessageKind::try_from(44), Err(UnknownMessageKind(44)));
    }

    #[test]
    fn sides() {
        assert_eq!(
            MessageKind::PlayerCommand.side(),
            MessageSide::Serverbound
        );
        assert_eq!(MessageKind::PlayerMessage.side(), MessageSide::Both);
        assert_eq!(
            MessageKind::TicFinished.side(),
            MessageSide::Clientbound
        );
        assert!(!MessageKind::TicFinished.side().sendable_by_client());
        assert!(MessageKind::PlayerInfoUpdated.side().sendable_by_client());
    }
}
