//! Connection lifecycle and inbound message dispatch.

use ichor_network::PeerId;
use ichor_protocol::frame::MessageFrame;
use ichor_protocol::messages::{
    AuthResultS2c, ClientInitS2c, ClientRequestC2s, PlayerCommandC2s, PlayerInfoUpdated,
    PlayerMessage, PlayerRemovedS2c, VoteRequestC2s, VoteS2c,
};
use ichor_protocol::types::{
    AuthLevel, DisconnectReason, PlayerInfo, QueueLevel, RecipientKind, StateRequest,
};
use ichor_protocol::MessageKind;
use tracing::{debug, info, warn};

use crate::auth::{authorize_client, implicit_auth_level, AuthAttempt};
use crate::queue::{self, QueueChange};
use crate::vote::{ActiveVote, Ballot, VoteRejection};
use crate::Server;

/// Default ballot window in seconds.
const VOTE_DURATION_SECS: u32 = 30;

/// Default fraction of eligible players a vote needs.
const VOTE_THRESHOLD: f64 = 0.5;

impl Server {
    /// A peer finished the transport handshake.
    pub(crate) fn handle_connect(&mut self, peer: PeerId) {
        let Some(address) = self.net.peer_addr(peer) else {
            return;
        };
        let connect_id = self.net.connect_id(peer).unwrap_or(0);

        let Some(index) = self.clients.find_free_slot() else {
            info!(%address, "rejecting connection, server is full");
            self.net
                .disconnect(peer, DisconnectReason::ServerFull as u8);
            return;
        };

        self.clients.zero(index);

        {
            let client = self.clients.get_mut(index).unwrap();
            client.peer = Some(peer);
            client.connect_id = connect_id;
            client.address = Some(address);
            client.auth_level = implicit_auth_level(&self.config.server);
            client.join_tic = self.session.game_tic;
        }

        let ip = address.ip().to_string();
        if let Some((_, ban)) = self.access.get_ban(&ip) {
            let text = match ban.duration {
                Some(minutes) => format!(
                    "Temporarily banned for {} minutes: {} ({}): {}",
                    minutes, ban.name, ip, ban.reason
                ),
                None => format!("Banned: {} ({}): {}", ban.name, ip, ban.reason),
            };

            info!(%address, "rejecting banned address");
            self.send_message_to(index, &text);
            self.net.disconnect(peer, DisconnectReason::Banned as u8);
            self.clients.zero(index);
            return;
        }

        {
            let client = self.clients.get_mut(index).unwrap();
            client.connecting = true;
            client.current_request = Some(StateRequest::InitialState);
        }

        info!(
            player = index,
            connect_id,
            %address,
            "player connected"
        );
    }

    /// A payload arrived from a peer.
    pub(crate) fn handle_receive(&mut self, peer: PeerId, payload: &[u8]) {
        let Some(index) = self.clients.by_peer(peer) else {
            debug!(?peer, "payload from unbound peer dropped");
            return;
        };

        // Demos record every inbound packet before it is dispatched.
        if let Some(demo) = self.demo.as_mut() {
            if let Err(e) = demo.write_network_message(index as i32, payload) {
                tracing::error!(error = %e, "demo error, recording aborted");
                self.demo = None;
            }
        }

        let frame = match MessageFrame::parse(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(player = index, error = %e, "malformed message");
                self.disconnect_client(index, DisconnectReason::InvalidMessage);
                return;
            }
        };

        if !frame.kind.side().sendable_by_client() || frame.kind.is_reserved() {
            warn!(
                player = index,
                kind = frame.kind.name(),
                "client sent a server-only message"
            );
            self.disconnect_client(index, DisconnectReason::InvalidMessage);
            return;
        }

        let result = match frame.kind {
            MessageKind::ClientRequest => frame
                .decode::<ClientRequestC2s>()
                .map(|msg| self.handle_client_request(index, msg)),
            MessageKind::PlayerMessage => frame
                .decode::<PlayerMessage>()
                .map(|msg| self.handle_player_message(index, msg)),
            MessageKind::PlayerInfoUpdated => frame
                .decode::<PlayerInfoUpdated>()
                .map(|msg| self.handle_player_info(index, msg)),
            MessageKind::PlayerCommand => frame
                .decode::<PlayerCommandC2s>()
                .map(|msg| self.handle_player_commands(index, msg)),
            MessageKind::VoteRequest => frame
                .decode::<VoteRequestC2s>()
                .map(|msg| self.handle_vote_request(index, msg)),
            _ => unreachable!("side check covers every other kind"),
        };

        if let Err(e) = result {
            warn!(
                player = index,
                kind = frame.kind.name(),
                error = %e,
                "undecodable message"
            );
            self.disconnect_client(index, DisconnectReason::InvalidMessage);
        }
    }

    fn handle_client_request(&mut self, index: usize, msg: ClientRequestC2s) {
        if let Some(client) = self.clients.get_mut(index) {
            client.current_request = Some(msg.request);
        }
    }

    fn handle_player_message(&mut self, index: usize, msg: PlayerMessage) {
        // Auth messages predate a valid sender number; everything else must
        // name its own slot.
        if msg.recipient_kind != RecipientKind::Auth && msg.sender_number != index as u32 {
            self.disconnect_client(index, DisconnectReason::InvalidMessage);
            return;
        }

        match msg.recipient_kind {
            RecipientKind::Auth => {
                let attempt = authorize_client(
                    self.clients.get_mut(index).unwrap(),
                    &self.config.server,
                    self.session.game_tic,
                    &msg.message,
                );

                if let AuthAttempt::Evaluated { success, level } = attempt {
                    let reply = AuthResultS2c {
                        world_index: self.session.world_index,
                        success,
                        level,
                    };
                    self.send_to(index, &reply);
                }
            }
            RecipientKind::Vote => {
                let ballot = if msg.message.eq_ignore_ascii_case("yea") {
                    Some(Ballot::Yea)
                } else if msg.message.eq_ignore_ascii_case("nay") {
                    Some(Ballot::Nay)
                } else {
                    None
                };

                let Some(ballot) = ballot else { return };
                self.cast_ballot(index, ballot, msg);
            }
            RecipientKind::Rcon => {
                if self.clients.get(index).map(|c| c.auth_level)
                    < Some(AuthLevel::Moderator)
                {
                    self.send_message_to(index, "Unauthorized.");
                    return;
                }

                info!(player = index, command = %*msg.message, "rcon");
                let output = crate::console::dispatch(self, &msg.message);
                self.send_message_to(index, &output);
            }
            RecipientKind::Server => {
                let name = self.player_name(index);
                info!("{name}: {}", *msg.message);
            }
            RecipientKind::Player => {
                let recipient = msg.recipient_number as usize;
                if self.clients.get(recipient).is_some_and(|c| c.in_game) {
                    self.send_to(recipient, &msg);
                }
            }
            RecipientKind::Team => {
                self.send_to_team(index, &msg);
            }
            RecipientKind::All => {
                let name = self.player_name(index);
                info!("{name}: {}", *msg.message);
                self.broadcast_excluding(index, &msg);
            }
        }
    }

    fn cast_ballot(&mut self, index: usize, ballot: Ballot, msg: PlayerMessage) {
        let eligible_to_vote = self
            .clients
            .get(index)
            .is_some_and(|c| c.in_game && !c.spectating && !c.afk);

        if !eligible_to_vote {
            self.send_message_to(index, VoteRejection::SpectatorsCannotVote.message());
            return;
        }

        let Some(vote) = self.vote.as_mut() else {
            self.send_message_to(index, VoteRejection::NoVoteRunning.message());
            return;
        };

        match vote.cast(index, ballot) {
            Ok(()) => {
                let name = self.player_name(index);
                let verdict = match ballot {
                    Ballot::Yea => "yes",
                    Ballot::Nay => "no",
                };
                self.broadcast_message(&format!("{name} voted {verdict}."));
                self.broadcast_excluding(index, &msg);
            }
            Err(rejection) => {
                self.send_message_to(index, rejection.message());
            }
        }
    }

    fn handle_player_info(&mut self, index: usize, msg: PlayerInfoUpdated) {
        // Clients may only send info updates for themselves.
        if msg.player_number != index as u32 {
            warn!(
                player = index,
                claimed = msg.player_number,
                "info update for another player"
            );
            self.disconnect_client(index, DisconnectReason::InvalidMessage);
            return;
        }

        let accepted = self.apply_player_info(index, &msg.info);

        if accepted {
            let rebroadcast = PlayerInfoUpdated {
                world_index: self.session.world_index,
                player_number: msg.player_number,
                info: msg.info,
            };
            self.broadcast(&rebroadcast);
        }
    }

    /// Applies one client-sent info field, bounded by auth and dmflags.
    /// Returns whether the update was accepted.
    fn apply_player_info(&mut self, index: usize, info: &PlayerInfo) -> bool {
        use ichor_game::dmflags;

        match info {
            PlayerInfo::Name(name) => {
                if let Some(player) = self.session.player_mut(index) {
                    player.name = name.0.clone();
                }
                true
            }
            PlayerInfo::Skin(skin) => {
                if let Some(player) = self.session.player_mut(index) {
                    player.skin = skin.0.clone();
                }
                true
            }
            PlayerInfo::PlayerClass(class) => {
                if let Some(player) = self.session.player_mut(index) {
                    player.player_class = class.0.clone();
                }
                true
            }
            PlayerInfo::ColorMap(colormap) => {
                if let Some(player) = self.session.player_mut(index) {
                    player.colormap = *colormap;
                }
                true
            }
            PlayerInfo::Team(team) => {
                self.set_player_team(index, *team);
                // set_player_team broadcasts on its own.
                false
            }
            PlayerInfo::Spectating(spectating) => {
                if *spectating {
                    self.spectate_player(index);
                }
                // Joining requires a fresh use press, never an info update.
                false
            }
            PlayerInfo::WeaponPreference { slot, weapon } => {
                if let Some(client) = self.clients.get_mut(index) {
                    client.set_weapon_preference(*slot as usize, *weapon);
                }
                true
            }
            PlayerInfo::PlayerBobbing(on) => {
                let allowed =
                    self.session.settings.dmflags & dmflags::ALLOW_MOVEBOB_CHANGE != 0;
                if allowed {
                    if let Some(client) = self.clients.get_mut(index) {
                        client.options.player_bobbing = *on;
                    }
                }
                allowed
            }
            PlayerInfo::BobbingIntensity(intensity) => {
                let allowed =
                    self.session.settings.dmflags & dmflags::ALLOW_MOVEBOB_CHANGE != 0;
                if allowed {
                    if let Some(client) = self.clients.get_mut(index) {
                        client.options.bobbing_intensity = *intensity;
                    }
                }
                allowed
            }
            PlayerInfo::WeaponToggles(on) => {
                if let Some(client) = self.clients.get_mut(index) {
                    client.options.doom_weapon_toggles = *on;
                }
                true
            }
            PlayerInfo::AutoAim(on) => {
                if let Some(client) = self.clients.get_mut(index) {
                    client.options.autoaim = *on;
                }
                true
            }
            PlayerInfo::WeaponSpeed(speed) => {
                let allowed =
                    self.session.settings.dmflags & dmflags::ALLOW_WEAPON_SPEED_CHANGE != 0;
                if allowed {
                    if let Some(client) = self.clients.get_mut(index) {
                        client.options.weapon_speed = *speed;
                    }
                }
                allowed
            }
            // Queue state, AFK, and frags are server-authoritative.
            PlayerInfo::QueueLevel(_)
            | PlayerInfo::QueuePosition(_)
            | PlayerInfo::Afk(_)
            | PlayerInfo::Frags(_) => {
                warn!(player = index, "ignoring server-authoritative info update");
                false
            }
        }
    }

    fn handle_vote_request(&mut self, index: usize, msg: VoteRequestC2s) {
        let is_spectator = self
            .clients
            .get(index)
            .map_or(true, |c| !c.in_game || c.spectating);

        if is_spectator {
            self.send_message_to(index, VoteRejection::SpectatorsCannotVote.message());
            return;
        }

        if self.vote.is_some() {
            self.send_message_to(index, VoteRejection::VoteAlreadyRunning.message());
            return;
        }

        match ActiveVote::new(
            &msg.command,
            self.session.game_tic,
            VOTE_DURATION_SECS,
            VOTE_THRESHOLD,
            0,
        ) {
            Ok(vote) => {
                let announcement = VoteS2c {
                    world_index: self.session.world_index,
                    command: msg.command.clone(),
                    duration: vote.duration(),
                    threshold: vote.threshold(),
                    max_votes: vote.max_votes(),
                };

                let name = self.player_name(index);
                self.broadcast_message(&format!("{name} called a vote: {}", *msg.command));
                self.broadcast(&announcement);
                self.vote = Some(vote);
            }
            Err(rejection) => {
                self.send_message_to(index, rejection.message());
            }
        }
    }

    /// Marks a client for removal at tic end and drops its peer now.
    pub fn disconnect_client(&mut self, index: usize, reason: DisconnectReason) {
        let Some(client) = self.clients.get_mut(index) else {
            return;
        };

        if client.peer.is_none() && !client.in_game && !client.connecting {
            return;
        }

        if reason == DisconnectReason::NoReason {
            info!(player = index, "player disconnected");
        } else {
            info!(player = index, reason = reason.as_str(), "disconnecting player");
        }

        if let Some(peer) = client.peer.take() {
            self.net.disconnect(peer, reason as u8);
        }

        if !self.pending_removals.iter().any(|(i, _)| *i == index) {
            self.pending_removals.push((index, reason));
        }
    }

    /// The transport reported a peer gone (timeout or remote close).
    pub(crate) fn handle_transport_disconnect(&mut self, peer: PeerId) {
        if let Some(index) = self.clients.by_peer(peer) {
            if let Some(client) = self.clients.get_mut(index) {
                client.peer = None;
            }
            self.disconnect_client(index, DisconnectReason::NoReason);
        }
    }

    /// Flushes deferred removals: queue advancement, the removal
    /// broadcast, actor teardown, and the slot zero.
    pub(crate) fn flush_removals(&mut self) {
        let removals = std::mem::take(&mut self.pending_removals);

        for (index, reason) in removals {
            let was_in_game = self.clients.get(index).is_some_and(|c| c.in_game);

            let mut changes = vec![];
            queue::remove_from_queue(
                &mut self.clients,
                index,
                self.session.game_tic,
                &mut changes,
            );
            self.broadcast_queue_changes(&changes);

            if was_in_game {
                if let Some(actor_id) =
                    self.session.players[index].as_ref().and_then(|p| p.actor)
                {
                    if let Some(net_id) = self.session.world.get(actor_id).map(|a| a.net_id) {
                        self.broadcast(&ichor_protocol::messages::ActorRemovedS2c {
                            world_index: self.session.world_index,
                            net_id,
                        });
                    }
                }

                self.broadcast(&PlayerRemovedS2c {
                    world_index: self.session.world_index,
                    player_number: index as u32,
                    reason,
                });
            }

            self.session.remove_player(index);
            self.clients.zero(index);
        }
    }

    /// Publishes queue reconciliation results as player info updates.
    pub(crate) fn broadcast_queue_changes(&mut self, changes: &[QueueChange]) {
        for &change in changes {
            let (player_number, info) = match change {
                QueueChange::Level(i, level) => (i as u32, PlayerInfo::QueueLevel(level)),
                QueueChange::Position(i, position) => {
                    (i as u32, PlayerInfo::QueuePosition(position))
                }
                QueueChange::Afk(i, afk) => (i as u32, PlayerInfo::Afk(afk)),
            };

            self.broadcast(&PlayerInfoUpdated {
                world_index: self.session.world_index,
                player_number,
                info,
            });
        }
    }

    /// Introduces client `index` to everyone already connected, and everyone
    /// already connected to `index`.
    pub(crate) fn send_client_intros(&mut self, index: usize) {
        for i in self.clients.in_game_indices() {
            if i == index {
                continue;
            }

            let frags = self.session.player(i).map_or(0, |p| p.frags);
            let info = self.clients.get(i).unwrap().info(frags);
            self.send_to(
                index,
                &ClientInitS2c {
                    world_index: self.session.world_index,
                    client_number: i as u32,
                    client: info,
                },
            );
        }

        let frags = self.session.player(index).map_or(0, |p| p.frags);
        let info = self.clients.get(index).unwrap().info(frags);
        self.broadcast_excluding(
            index,
            &ClientInitS2c {
                world_index: self.session.world_index,
                client_number: index as u32,
                client: info,
            },
        );
    }

    pub(crate) fn player_name(&self, index: usize) -> String {
        self.session
            .player(index)
            .map_or_else(|| format!("Player{index}"), |p| p.name.clone())
    }

    /// Moves a playing client back to spectating, freeing its game slot.
    pub fn spectate_player(&mut self, index: usize) {
        let was_playing = self
            .clients
            .get(index)
            .is_some_and(|c| c.in_game && !c.spectating);

        if !was_playing {
            return;
        }

        self.clients.get_mut(index).unwrap().spectating = true;
        self.session.set_spectator(index, true);

        let mut changes = vec![];
        queue::remove_from_queue(
            &mut self.clients,
            index,
            self.session.game_tic,
            &mut changes,
        );
        self.broadcast_queue_changes(&changes);

        self.broadcast(&PlayerInfoUpdated {
            world_index: self.session.world_index,
            player_number: index as u32,
            info: PlayerInfo::Spectating(true),
        });

        let name = self.player_name(index);
        self.broadcast_message(&format!("{name} left the game."));
    }

    /// Switches a client's team: respawn to the team start and requeue at
    /// the tail.
    pub(crate) fn set_player_team(&mut self, index: usize, team: ichor_protocol::types::TeamColor) {
        let Some(client) = self.clients.get_mut(index) else {
            return;
        };

        if client.team == team {
            return;
        }

        client.team = team;

        self.broadcast(&PlayerInfoUpdated {
            world_index: self.session.world_index,
            player_number: index as u32,
            info: PlayerInfo::Team(team),
        });

        // A mid-game team switch respawns the player as a spectator and
        // sends them to the back of the line.
        let was_playing = self
            .clients
            .get(index)
            .is_some_and(|c| c.queue_level == QueueLevel::Playing);

        if was_playing {
            self.spectate_player(index);

            let mut changes = vec![];
            queue::put_at_queue_end(
                &mut self.clients,
                index,
                self.session.settings.max_players,
                self.config.server.join_time_limit,
                self.session.game_tic,
                &mut changes,
            );
            self.broadcast_queue_changes(&changes);
        }
    }
}
