//! The fixed-size client table.
//!
//! Slot 0 is the server's own pseudo-spectator: always present, never
//! attached to a peer. Slots `1..=MAX_CLIENTS` bind to transport peers by
//! `connect_id`. A slot is zeroed before first use and again the moment its
//! client leaves, so stale state can never leak between sessions.

use std::collections::VecDeque;
use std::net::SocketAddr;

use ichor_game::MAX_POSITIONS;
use ichor_network::PeerId;
use ichor_protocol::types::{
    AuthLevel, ClientInfo, ClientOptions, MiscState, PlayerCommand, PlayerPosition, PlayerState,
    QueueLevel, StateRequest, TeamColor, WeaponType,
};
use ichor_protocol::MAX_CLIENTS;

/// One slot of the client table.
#[derive(Clone, Debug)]
pub struct ServerClient {
    // Connection.
    pub peer: Option<PeerId>,
    pub connect_id: u32,
    pub address: Option<SocketAddr>,
    /// Allocated but not yet in game (awaiting the state handshake).
    pub connecting: bool,
    pub in_game: bool,

    // Authorization.
    pub auth_level: AuthLevel,
    pub last_auth_attempt_tic: u32,

    // Command queue.
    pub commands: VecDeque<PlayerCommand>,
    pub command_buffer_filled: bool,
    pub commands_dropped: u32,
    pub last_command_received_index: u32,
    pub last_command_run_index: u32,
    pub last_command_run_world_index: u32,
    /// The `world_index` the command being executed claimed to see; anchors
    /// the unlagged rewind.
    pub command_world_index: u32,
    pub received_command_for_current_map: bool,
    /// Positions go reliable until the jitter buffer first fills.
    pub buffering: bool,

    // Rings, addressed modulo `MAX_POSITIONS` by world index.
    pub positions: Vec<PlayerPosition>,
    pub misc_states: Vec<MiscState>,
    pub player_states: Vec<PlayerState>,
    pub saved_position: PlayerPosition,
    pub saved_misc_state: MiscState,

    // Preferences and per-client option overrides.
    pub weapon_preferences: [WeaponType; WeaponType::COUNT],
    pub options: ClientOptions,

    // Join queue.
    pub queue_level: QueueLevel,
    pub queue_position: u32,
    pub finished_waiting_tic: u32,
    pub afk: bool,

    // Session state.
    pub received_game_state: bool,
    pub current_request: Option<StateRequest>,
    pub team: TeamColor,
    pub spectating: bool,
    pub join_tic: u32,
    pub death_time: u32,

    // Telemetry, refreshed from the transport every tic.
    pub transit_lag: u32,
    pub packet_loss: u8,
}

impl Default for ServerClient {
    fn default() -> Self {
        Self {
            peer: None,
            connect_id: 0,
            address: None,
            connecting: false,
            in_game: false,
            auth_level: AuthLevel::None,
            last_auth_attempt_tic: 0,
            commands: VecDeque::new(),
            command_buffer_filled: false,
            commands_dropped: 0,
            last_command_received_index: 0,
            last_command_run_index: 0,
            last_command_run_world_index: 0,
            command_world_index: 0,
            received_command_for_current_map: false,
            buffering: true,
            positions: vec![PlayerPosition::default(); MAX_POSITIONS],
            misc_states: vec![MiscState::default(); MAX_POSITIONS],
            player_states: vec![PlayerState::default(); MAX_POSITIONS],
            saved_position: PlayerPosition::default(),
            saved_misc_state: MiscState::default(),
            weapon_preferences: WeaponType::ALL,
            options: ClientOptions::default(),
            queue_level: QueueLevel::None,
            queue_position: 0,
            finished_waiting_tic: 0,
            afk: false,
            received_game_state: false,
            current_request: None,
            team: TeamColor::None,
            spectating: true,
            join_tic: 0,
            death_time: 0,
            transit_lag: 0,
            packet_loss: 0,
        }
    }
}

impl ServerClient {
    /// Whether gameplay messages may be sent to this client at all.
    pub fn receives_gameplay(&self) -> bool {
        self.auth_level >= AuthLevel::Spectator
    }

    /// Resets everything tied to the current map while keeping the
    /// connection, auth, queue state, and preferences.
    pub fn reset_for_new_map(&mut self) {
        self.commands.clear();
        self.command_buffer_filled = false;
        self.commands_dropped = 0;
        self.last_command_received_index = 0;
        self.last_command_run_index = 0;
        self.last_command_run_world_index = 0;
        self.command_world_index = 0;
        self.received_command_for_current_map = false;
        self.buffering = true;
        self.received_game_state = false;
        self.positions.fill(PlayerPosition::default());
        self.misc_states.fill(MiscState::default());
        self.player_states.fill(PlayerState::default());
    }

    /// Reorders the preference permutation so `weapon` sits at `slot`,
    /// swapping the displaced entry into the weapon's old place.
    pub fn set_weapon_preference(&mut self, slot: usize, weapon: WeaponType) {
        if slot >= self.weapon_preferences.len() {
            return;
        }

        if let Some(old_slot) = self
            .weapon_preferences
            .iter()
            .position(|&w| w == weapon)
        {
            self.weapon_preferences.swap(old_slot, slot);
        } else {
            self.weapon_preferences[slot] = weapon;
        }
    }

    /// The public record broadcast in `clientinit`.
    pub fn info(&self, frags: i32) -> ClientInfo {
        ClientInfo {
            auth_level: self.auth_level,
            queue_level: self.queue_level,
            queue_position: self.queue_position,
            team: self.team,
            spectating: self.spectating,
            afk: self.afk,
            frags,
            death_time: self.death_time,
            transit_lag: self.transit_lag,
            packet_loss: self.packet_loss,
        }
    }
}

/// All client slots. Index 0 is the server itself.
pub struct ClientTable {
    slots: Vec<ServerClient>,
}

impl Default for ClientTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientTable {
    pub fn new() -> Self {
        let mut slots = vec![ServerClient::default(); MAX_CLIENTS + 1];

        // The server's own slot is always "in game" as a spectator.
        slots[0].in_game = true;
        slots[0].auth_level = AuthLevel::Administrator;

        Self { slots }
    }

    pub fn get(&self, index: usize) -> Option<&ServerClient> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ServerClient> {
        self.slots.get_mut(index)
    }

    /// Full reset of one slot; used before first use and after disconnect.
    pub fn zero(&mut self, index: usize) {
        if index > 0 && index < self.slots.len() {
            self.slots[index] = ServerClient::default();
        }
    }

    /// The lowest free slot, or `None` when the table is full.
    pub fn find_free_slot(&self) -> Option<usize> {
        (1..self.slots.len()).find(|&i| {
            let slot = &self.slots[i];
            !slot.in_game && !slot.connecting
        })
    }

    /// Resolves a transport session to its client index.
    pub fn by_connect_id(&self, connect_id: u32) -> Option<usize> {
        (1..self.slots.len()).find(|&i| {
            let slot = &self.slots[i];
            (slot.in_game || slot.connecting) && slot.connect_id == connect_id
        })
    }

    pub fn by_peer(&self, peer: PeerId) -> Option<usize> {
        (1..self.slots.len()).find(|&i| self.slots[i].peer == Some(peer))
    }

    /// Indices of connected remote clients (in game or connecting).
    pub fn connected_indices(&self) -> Vec<usize> {
        (1..self.slots.len())
            .filter(|&i| self.slots[i].in_game || self.slots[i].connecting)
            .collect()
    }

    /// Indices of clients that are fully in game.
    pub fn in_game_indices(&self) -> Vec<usize> {
        (1..self.slots.len())
            .filter(|&i| self.slots[i].in_game)
            .collect()
    }

    /// Count of clients currently playing (not spectating).
    pub fn playing_count(&self) -> u32 {
        (1..self.slots.len())
            .filter(|&i| self.slots[i].in_game && !self.slots[i].spectating)
            .count() as u32
    }

    pub fn team_playing_count(&self, team: TeamColor) -> u32 {
        (1..self.slots.len())
            .filter(|&i| {
                let slot = &self.slots[i];
                slot.in_game && !slot.spectating && slot.team == team
            })
            .count() as u32
    }

    /// True when no remote client is connected or connecting.
    pub fn is_empty(&self) -> bool {
        self.connected_indices().is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
