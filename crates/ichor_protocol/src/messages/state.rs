//! Session and state-transfer messages.

use crate::types::{AuthLevel, ClientInfo, Settings, StateRequest};
use crate::{Decode, Encode, Message, MessageKind, MessageSide};

/// The full serialized game state, sent to a client that is joining
/// mid-session. The snapshot bytes are the engine save format and are only
/// meaningful to the exact build that wrote them.
#[derive(Clone, PartialEq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::GameState, side = MessageSide::Clientbound)]
pub struct GameStateS2c {
    pub world_index: u32,
    pub map_number: u32,
    pub rng_seed: u32,
    pub snapshot: Vec<u8>,
}

/// The first message a connecting client receives, assigning its player
/// number and describing the session.
#[derive(Clone, PartialEq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::InitialState, side = MessageSide::Clientbound)]
pub struct InitialStateS2c {
    pub world_index: u32,
    pub player_number: u32,
    pub map_number: u32,
    pub rng_seed: u32,
    pub settings: Settings,
}

/// A fresh snapshot in answer to `clientrequest(current_state)`, also used
/// for the post-map-change resync.
#[derive(Clone, PartialEq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::CurrentState, side = MessageSide::Clientbound)]
pub struct CurrentStateS2c {
    pub world_index: u32,
    pub snapshot: Vec<u8>,
}

/// Clock alignment for a client that has loaded the map.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::Sync, side = MessageSide::Clientbound)]
pub struct SyncS2c {
    pub world_index: u32,
    pub game_tic: u32,
    pub level_time: u32,
    pub level_start_tic: u32,
    pub base_tic: u32,
}

#[derive(Clone, PartialEq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::MapStarted, side = MessageSide::Clientbound)]
pub struct MapStartedS2c {
    pub world_index: u32,
    pub settings: Settings,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::MapCompleted, side = MessageSide::Clientbound)]
pub struct MapCompletedS2c {
    pub world_index: u32,
    pub new_map_number: u32,
    pub enter_intermission: bool,
}

/// Introduces one client's public record to another client.
#[derive(Clone, PartialEq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::ClientInit, side = MessageSide::Clientbound)]
pub struct ClientInitS2c {
    pub world_index: u32,
    pub client_number: u32,
    pub client: ClientInfo,
}

/// The reply to every auth attempt. `level` is the client's current level,
/// which a failed attempt leaves unchanged.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::AuthResult, side = MessageSide::Clientbound)]
pub struct AuthResultS2c {
    pub world_index: u32,
    pub success: bool,
    pub level: AuthLevel,
}

/// Once-a-second connection telemetry for the scoreboard.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::ClientStatus, side = MessageSide::Clientbound)]
pub struct ClientStatusS2c {
    pub world_index: u32,
    pub client_number: u32,
    /// Tics between now and the last command the server ran for this client.
    pub client_lag: u32,
    /// Commands sitting in the server-side queue.
    pub server_lag: u32,
    /// Round-trip time in milliseconds.
    pub transit_lag: u32,
    /// Loss percentage, 0..=100.
    pub packet_loss: u8,
}

/// Terminates tic `world_index` on the client side: every reliable message
/// for that tic has already been delivered when this arrives.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::TicFinished, side = MessageSide::Clientbound)]
pub struct TicFinishedS2c {
    pub world_index: u32,
}

/// A client asking for a state transfer.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::ClientRequest, side = MessageSide::Serverbound)]
pub struct ClientRequestC2s {
    pub request: StateRequest,
}
