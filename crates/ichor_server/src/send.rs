//! The single send choke point and the broadcast helpers built on it.
//!
//! Every outbound message passes [`Server::should_send_to`]: a client that
//! has not reached spectator authorization may only be sent the handshake
//! quartet (`initialstate`, `currentstate`, `authresult`, `mapstarted`);
//! anything else is silently suppressed here rather than audited at every
//! call site.

use ichor_network::SendMode;
use ichor_protocol::frame::encode_message;
use ichor_protocol::messages::ServerMessageS2c;
use ichor_protocol::{Bounded, Encode, Message, MessageKind, MAX_STRING_SIZE};
use tracing::{debug, warn};

use crate::Server;

/// Kinds deliverable before spectator authorization.
const PRE_AUTH_KINDS: [MessageKind; 4] = [
    MessageKind::InitialState,
    MessageKind::CurrentState,
    MessageKind::AuthResult,
    MessageKind::MapStarted,
];

impl Server {
    pub(crate) fn should_send_to(&self, index: usize, kind: MessageKind) -> bool {
        let Some(client) = self.clients.get(index) else {
            return false;
        };

        if client.peer.is_none() {
            return false;
        }

        client.receives_gameplay() || PRE_AUTH_KINDS.contains(&kind)
    }

    /// Sends a message on the reliable channel.
    pub(crate) fn send_to<M: Message + Encode>(&mut self, index: usize, msg: &M) {
        self.send_with_mode(index, msg, SendMode::Reliable);
    }

    /// Sends a message on the unsequenced channel.
    pub(crate) fn send_unreliable_to<M: Message + Encode>(&mut self, index: usize, msg: &M) {
        self.send_with_mode(index, msg, SendMode::Unsequenced);
    }

    fn send_with_mode<M: Message + Encode>(&mut self, index: usize, msg: &M, mode: SendMode) {
        if !self.should_send_to(index, M::KIND) {
            return;
        }

        let peer = self
            .clients
            .get(index)
            .and_then(|c| c.peer)
            .expect("checked by should_send_to");

        let payload = match encode_message(msg) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(message = M::NAME, error = %e, "dropping unencodable message");
                return;
            }
        };

        if let Err(e) = self.net.send(peer, &payload, mode) {
            debug!(client = index, message = M::NAME, error = %e, "send failed");
        }
    }

    /// Sends to every connected client.
    pub(crate) fn broadcast<M: Message + Encode>(&mut self, msg: &M) {
        for i in self.clients.connected_indices() {
            self.send_to(i, msg);
        }
    }

    pub(crate) fn broadcast_unreliable<M: Message + Encode>(&mut self, msg: &M) {
        for i in self.clients.connected_indices() {
            self.send_unreliable_to(i, msg);
        }
    }

    pub(crate) fn broadcast_excluding<M: Message + Encode>(&mut self, excluded: usize, msg: &M) {
        for i in self.clients.connected_indices() {
            if i != excluded {
                self.send_to(i, msg);
            }
        }
    }

    /// Sends to everyone on `sender`'s team except the sender.
    pub(crate) fn send_to_team<M: Message + Encode>(&mut self, sender: usize, msg: &M) {
        let Some(team) = self.clients.get(sender).map(|c| c.team) else {
            return;
        };

        for i in self.clients.connected_indices() {
            if i != sender && self.clients.get(i).map(|c| c.team) == Some(team) {
                self.send_to(i, msg);
            }
        }
    }

    /// A console-style text message to one client.
    pub(crate) fn send_message_to(&mut self, index: usize, text: &str) {
        let msg = server_message(text, false, false, self.session.world_index);
        self.send_to(index, &msg);
    }

    /// A HUD-style text message to one client.
    pub(crate) fn send_hud_message_to(&mut self, index: usize, text: &str) {
        let msg = server_message(text, true, false, self.session.world_index);
        self.send_to(index, &msg);
    }

    pub(crate) fn broadcast_message(&mut self, text: &str) {
        tracing::info!("{text}");
        let msg = server_message(text, false, false, self.session.world_index);
        self.broadcast(&msg);
    }

    pub(crate) fn broadcast_hud_message(&mut self, text: &str) {
        tracing::info!("{text}");
        let msg = server_message(text, true, false, self.session.world_index);
        self.broadcast(&msg);
    }
}

fn server_message(
    text: &str,
    is_hud_message: bool,
    prepend_name: bool,
    world_index: u32,
) -> ServerMessageS2c {
    let mut text = text.to_owned();
    text.truncate(MAX_STRING_SIZE - 1);

    ServerMessageS2c {
        world_index,
        is_hud_message,
        prepend_name,
        message: Bounded(text),
    }
}
