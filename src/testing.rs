//! Test scaffolding: a real server on a loopback port plus scripted
//! clients speaking the real protocol over the real transport.
//!
//! Reduces boilerplate in scenario tests.

use std::time::Duration;

use ichor_config::{ResourceStore, ServerConfig};
use ichor_network::{Event, Host, PeerId, SendMode};
use ichor_protocol::frame::{encode_message, MessageFrame};
use ichor_protocol::messages::{ClientRequestC2s, PlayerCommandC2s, PlayerMessage};
use ichor_protocol::types::{PlayerCommand, RecipientKind, StateRequest};
use ichor_protocol::{Bounded, Encode, Message, MessageKind};
use ichor_server::Server;

/// A server bound to an ephemeral loopback port, with its scratch
/// directories kept alive for the test's duration.
pub struct ScenarioServer {
    pub server: Server,
    _dir: tempfile::TempDir,
}

/// The baseline test configuration: deathmatch, open passwords, three maps.
pub fn test_config_json() -> String {
    String::from(
        r#"{
            "resources": [{ "name": "DOOM2.WAD", "type": "iwad" }],
            "server": {
                "game_type": "dm",
                "moderator_password": "modpass",
                "administrator_password": "adminpass",
                "join_time_limit": 5
            },
            "options": { "max_players": 4 },
            "maps": ["MAP01", "MAP02", "MAP03"]
        }"#,
    )
}

impl ScenarioServer {
    pub fn start() -> Self {
        Self::start_with(&test_config_json(), |_| {})
    }

    /// Builds a server from `json`, letting `customize` adjust the loaded
    /// configuration (passwords, limits) before anything binds.
    pub fn start_with(json: &str, customize: impl FnOnce(&mut ServerConfig)) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");

        // A stand-in IWAD so resource resolution and hashing are real.
        let iwad = dir.path().join("DOOM2.WAD");
        std::fs::write(&iwad, b"IWAD test payload").unwrap();

        let mut config = ServerConfig::from_json(json).expect("test config is valid");
        config.server.wad_folders = vec![dir.path().display().to_string()];
        customize(&mut config);

        let resources = ResourceStore::resolve(
            &config.resources,
            &[dir.path().to_path_buf()],
            None,
            &dir.path().join("cache"),
        )
        .expect("test resources resolve");

        let mut server = bind_ephemeral(config, resources, dir.path());

        // Burn one tic so the session is past its zeroth world index.
        server.run_tic();

        Self { server, _dir: dir }
    }

    pub fn addr(&self) -> std::net::SocketAddr {
        let mut addr = self.server.net.local_addr().expect("bound socket");
        addr.set_ip(std::net::Ipv4Addr::LOCALHOST.into());
        addr
    }

    /// Runs `n` server tics, letting every scripted client pump between
    /// tics.
    pub fn run_tics(&mut self, clients: &mut [&mut TestClient], n: usize) {
        for _ in 0..n {
            for client in clients.iter_mut() {
                client.pump();
            }
            self.server.run_tic();
        }

        for client in clients.iter_mut() {
            client.pump();
        }
    }
}

fn bind_ephemeral(
    mut config: ServerConfig,
    resources: ResourceStore,
    dir: &std::path::Path,
) -> Server {
    // The configured port is irrelevant to tests; bind whatever is free.
    config.server.address = String::from("127.0.0.1");
    config.server.port = pick_free_port();

    Server::new(
        config,
        resources,
        dir.join("access_list.json"),
        0x1CC0_FFEE,
    )
    .expect("test server binds")
}

fn pick_free_port() -> u16 {
    // Bind-then-drop; the small race is acceptable in tests.
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

/// A scripted client: a real transport host plus a log of every frame the
/// server has sent it.
pub struct TestClient {
    pub host: Host,
    pub peer: Option<PeerId>,
    pub received: Vec<MessageFrame>,
    pub disconnect_reason: Option<u8>,
    next_command_index: u32,
}

impl TestClient {
    pub fn connect(addr: std::net::SocketAddr) -> Self {
        Self {
            host: Host::connect(addr).expect("client binds"),
            peer: None,
            received: vec![],
            disconnect_reason: None,
            next_command_index: 1,
        }
    }

    /// Drains transport events into the frame log.
    pub fn pump(&mut self) {
        let events = self
            .host
            .service(Duration::from_millis(2))
            .expect("client service");

        for event in events {
            match event {
                Event::Connect { peer } => self.peer = Some(peer),
                Event::Receive { payload, .. } => {
                    if let Ok(frame) = MessageFrame::parse(&payload) {
                        self.received.push(frame);
                    }
                }
                Event::Disconnect { reason, .. } => {
                    self.disconnect_reason = Some(reason);
                    self.peer = None;
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.peer.is_some()
    }

    pub fn send<M: Message + Encode>(&mut self, msg: &M) {
        let Some(peer) = self.peer else { return };
        let payload = encode_message(msg).expect("encodable");
        self.host
            .send(peer, &payload, SendMode::Reliable)
            .expect("send");
    }

    pub fn request(&mut self, request: StateRequest) {
        self.send(&ClientRequestC2s { request });
    }

    pub fn send_chat(&mut self, player_number: u32, text: &str) {
        self.send(&PlayerMessage {
            sender_number: player_number,
            recipient_kind: RecipientKind::All,
            recipient_number: 0,
            message: Bounded(text.to_owned()),
        });
    }

    /// One input command with the given buttons, stamped against the
    /// claimed world index.
    pub fn send_command(&mut self, world_index: u32, buttons: u8) {
        let command = PlayerCommand {
            index: self.next_command_index,
            world_index,
            buttons,
            ..Default::default()
        };
        self.next_command_index += 1;

        self.send(&PlayerCommandC2s {
            commands: Bounded(vec![command]),
        });
    }

    pub fn frames_of(&self, kind: MessageKind) -> Vec<&MessageFrame> {
        self.received.iter().filter(|f| f.kind == kind).collect()
    }

    pub fn last_of(&self, kind: MessageKind) -> Option<&MessageFrame> {
        self.received.iter().rev().find(|f| f.kind == kind)
    }

    pub fn has_received(&self, kind: MessageKind) -> bool {
        self.received.iter().any(|f| f.kind == kind)
    }
}

/// Connects a client and pumps both sides until the transport handshake
/// completes and the server has allocated its slot.
pub fn connect_client(scenario: &mut ScenarioServer, rounds: usize) -> TestClient {
    let mut client = TestClient::connect(scenario.addr());

    for _ in 0..rounds {
        client.pump();
        scenario.server.run_tic();
        if client.is_connected() {
            break;
        }
    }

    client.pump();
    client
}

/// Drives a fresh client all the way into the game as a spectator: the
/// initial-state handshake followed by the current-state snapshot.
pub fn join_as_spectator(scenario: &mut ScenarioServer, rounds: usize) -> TestClient {
    let mut client = connect_client(scenario, rounds);

    for _ in 0..rounds {
        scenario.run_tics(&mut [&mut client], 1);
        if client.has_received(MessageKind::InitialState) {
            break;
        }
    }

    client.request(StateRequest::CurrentState);

    for _ in 0..rounds {
        scenario.run_tics(&mut [&mut client], 1);
        if client.has_received(MessageKind::GameState) {
            break;
        }
    }

    client
}
