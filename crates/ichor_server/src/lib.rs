//! The authoritative server.
//!
//! A single-threaded tic loop owns every client record, the session, and
//! the transport. The only concurrent work is the master-advertisement HTTP
//! client, whose completions are drained back into the loop once per tic.

pub mod auth;
pub mod client;
pub mod commands;
pub mod console;
pub mod events;
pub mod handler;
pub mod master;
pub mod queue;
pub mod send;
pub mod session;
pub mod tic;
pub mod unlagged;
pub mod vote;

use std::path::PathBuf;

use ichor_config::{AccessList, ResourceStore, ServerConfig};
use ichor_demo::DemoRecorder;
use ichor_game::TICRATE;
use ichor_network::Host;
use ichor_protocol::types::DisconnectReason;
use ichor_protocol::{MAX_CHANNELS, MAX_CLIENTS};
use tracing::info;

use crate::client::ClientTable;
use crate::master::MasterClient;
use crate::session::Session;
use crate::vote::ActiveVote;

pub use crate::client::ServerClient;

/// Tics a connecting peer gets to request the initial state before being
/// dropped.
pub const CONNECT_GRACE_TICS: u32 = 10 * TICRATE;

/// The server. Owns everything; the tic loop drives it.
pub struct Server {
    pub config: ServerConfig,
    pub resources: ResourceStore,
    pub access: AccessList,
    pub net: Host,
    pub clients: ClientTable,
    pub session: Session,
    pub master: MasterClient,
    pub vote: Option<ActiveVote>,
    pub demo: Option<DemoRecorder>,

    /// Removals deferred to tic end so mid-tic references stay valid.
    pub(crate) pending_removals: Vec<(usize, DisconnectReason)>,
    /// Previous-tic actor snapshots for the delta broadcast.
    pub(crate) actor_deltas: tic::ActorDeltas,
    /// Set by a map change; the next tic announces the new map.
    pub(crate) should_send_new_map: bool,
    /// World index 0 of a new map does not execute commands until every
    /// in-game client has acknowledged the snapshot.
    pub(crate) awaiting_sync_since: Option<u32>,
}

impl Server {
    /// Binds the transport and builds a server around a validated
    /// configuration.
    pub fn new(
        config: ServerConfig,
        resources: ResourceStore,
        access_list_path: PathBuf,
        rng_seed: u32,
    ) -> anyhow::Result<Self> {
        let bind_address = if config.server.address == "public" {
            String::from("0.0.0.0")
        } else {
            config.server.address.clone()
        };

        // A little slack over the client table so an overflow connect still
        // reaches the slot search and earns its "server full" code.
        let net = Host::listen(
            (bind_address.as_str(), config.server.port),
            MAX_CLIENTS + 4,
            MAX_CHANNELS,
        )?;

        let access = AccessList::load(&access_list_path)?;
        let master = MasterClient::new(config.masters.clone(), &user_agent())?;
        let session = Session::new(&config, 0, rng_seed);

        info!(
            address = %bind_address,
            port = config.server.port,
            map = %config.maps[0].name(),
            "server ready"
        );

        Ok(Self {
            config,
            resources,
            access,
            net,
            clients: ClientTable::new(),
            session,
            master,
            vote: None,
            demo: None,
            pending_removals: Vec::new(),
            actor_deltas: tic::ActorDeltas::default(),
            should_send_new_map: false,
            awaiting_sync_since: None,
        })
    }

    /// Orderly shutdown: delist from masters, close the demo, drop peers.
    pub fn shutdown(mut self) {
        for i in self.clients.connected_indices() {
            if let Some(peer) = self.clients.get(i).and_then(|c| c.peer) {
                self.net.disconnect(peer, DisconnectReason::NoReason as u8);
            }
        }

        if let Some(demo) = self.demo.take() {
            match demo.finish() {
                Ok(path) => info!(archive = %path.display(), "demo closed"),
                Err(e) => tracing::error!(error = %e, "demo close failed"),
            }
        }

        self.master.delist();
        info!("server stopped");
    }
}

/// The user agent for master and repository requests.
pub fn user_agent() -> String {
    format!("ichor-server/{}", env!("CARGO_PKG_VERSION"))
}
