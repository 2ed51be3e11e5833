//! Player-related messages.

use crate::math::{Angle, Fixed};
use crate::types::{
    AnnouncerEvent, DisconnectReason, NetId, PlayerCommand, PlayerInfo, PlayerPosition,
    RecipientKind,
};
use crate::{Bounded, Decode, Encode, Message, MessageKind, MessageSide, MAX_STRING_SIZE};

/// The per-tic authoritative position broadcast. Unsequenced in steady
/// state; receivers drop anything older than what they have already applied.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::PlayerPosition, side = MessageSide::Clientbound)]
pub struct PlayerPositionS2c {
    pub world_index: u32,
    pub player_number: u32,
    pub position: PlayerPosition,
    /// Sequence number of the last command run for this player, for
    /// client-side prediction reconciliation.
    pub last_index_run: u32,
    pub last_world_index_run: u32,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::PlayerSpawned, side = MessageSide::Clientbound)]
pub struct PlayerSpawnedS2c {
    pub world_index: u32,
    pub player_number: u32,
    pub net_id: NetId,
    pub as_spectator: bool,
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub angle: Angle,
}

/// One updated field of a player's public info. Clients send these for their
/// own entry only; the server rebroadcasts accepted updates.
#[derive(Clone, PartialEq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::PlayerInfoUpdated, side = MessageSide::Both)]
pub struct PlayerInfoUpdated {
    pub world_index: u32,
    pub player_number: u32,
    pub info: PlayerInfo,
}

/// Weapon sprite state change (raise/lower/flash), mirrored so remote
/// clients can animate other players' weapons.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::PlayerWeaponState, side = MessageSide::Clientbound)]
pub struct PlayerWeaponStateS2c {
    pub world_index: u32,
    pub player_number: u32,
    pub psprite_position: u8,
    pub state_number: u32,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::PlayerRemoved, side = MessageSide::Clientbound)]
pub struct PlayerRemovedS2c {
    pub world_index: u32,
    pub player_number: u32,
    pub reason: DisconnectReason,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::PlayerTouchedSpecial, side = MessageSide::Clientbound)]
pub struct PlayerTouchedSpecialS2c {
    pub world_index: u32,
    pub player_number: u32,
    pub thing_net_id: NetId,
}

/// Text from the server console or generated by game events.
#[derive(Clone, PartialEq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::ServerMessage, side = MessageSide::Clientbound)]
pub struct ServerMessageS2c {
    pub world_index: u32,
    pub is_hud_message: bool,
    pub prepend_name: bool,
    pub message: Bounded<String, MAX_STRING_SIZE>,
}

/// Chat, auth attempts, rcon, and vote ballots. Carries no world index in
/// either direction.
#[derive(Clone, PartialEq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::PlayerMessage, side = MessageSide::Both)]
pub struct PlayerMessage {
    pub sender_number: u32,
    pub recipient_kind: RecipientKind,
    pub recipient_number: u32,
    pub message: Bounded<String, MAX_STRING_SIZE>,
}

/// A bundle of one or more input commands. Commands whose `index` is not
/// newer than the last received index are retransmits and are dropped.
#[derive(Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::PlayerCommand, side = MessageSide::Serverbound)]
pub struct PlayerCommandC2s {
    pub commands: Bounded<Vec<PlayerCommand>, 32>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::AnnouncerEvent, side = MessageSide::Clientbound)]
pub struct AnnouncerEventS2c {
    pub world_index: u32,
    pub event: AnnouncerEvent,
    pub source_net_id: NetId,
}
