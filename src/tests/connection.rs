//! Connection lifecycle scenarios: the lone connect handshake, the full
//! server, bans, auth, and protocol-violation disconnects.

use ichor_protocol::messages::{AuthResultS2c, InitialStateS2c, TicFinishedS2c};
use ichor_protocol::types::{AuthLevel, DisconnectReason, RecipientKind, StateRequest};
use ichor_protocol::{Bounded, MessageKind, MAX_CLIENTS};

use crate::testing::{connect_client, join_as_spectator, ScenarioServer, TestClient};

#[test]
fn lone_connect_handshake() {
    let mut scenario = ScenarioServer::start();

    let mut client = connect_client(&mut scenario, 50);
    assert!(client.is_connected());

    // The server answers the implicit initial-state request with this
    // client's player number.
    scenario.run_tics(&mut [&mut client], 5);

    let initial = client
        .last_of(MessageKind::InitialState)
        .expect("initial state must arrive")
        .decode::<InitialStateS2c>()
        .unwrap();
    assert_eq!(initial.player_number, 1);
    assert_eq!(initial.map_number, 0);

    // Requesting the current state yields the full snapshot and puts the
    // player in game as a spectator.
    client.request(StateRequest::CurrentState);
    scenario.run_tics(&mut [&mut client], 5);

    assert!(client.has_received(MessageKind::GameState));
    assert!(scenario.server.clients.get(1).unwrap().in_game);
    assert!(scenario.server.clients.get(1).unwrap().spectating);

    // A second client is introduced to player 1 via clientinit.
    let second = join_as_spectator(&mut scenario, 50);
    assert!(second.has_received(MessageKind::ClientInit));
}

#[test]
fn every_tic_ends_with_ticfinished() {
    let mut scenario = ScenarioServer::start();
    let mut client = join_as_spectator(&mut scenario, 50);

    let before = client.frames_of(MessageKind::TicFinished).len();
    scenario.run_tics(&mut [&mut client], 10);
    let after = client.frames_of(MessageKind::TicFinished).len();

    assert!(after > before, "ticfinished must flow every tic");

    // Within the reliable stream, nothing tagged with a tic arrives after
    // that tic's ticfinished marker.
    let mut last_finished = None::<u32>;
    for frame in &client.received {
        if frame.kind == MessageKind::TicFinished {
            let msg = frame.decode::<TicFinishedS2c>().unwrap();
            if let Some(previous) = last_finished {
                assert!(msg.world_index >= previous);
            }
            last_finished = Some(msg.world_index);
        }
    }
}

#[test]
fn seventeenth_client_is_turned_away() {
    let mut scenario = ScenarioServer::start();

    let mut clients: Vec<TestClient> = (0..MAX_CLIENTS)
        .map(|_| TestClient::connect(scenario.addr()))
        .collect();

    for _ in 0..100 {
        for client in &mut clients {
            client.pump();
        }
        scenario.server.run_tic();

        if clients.iter().all(TestClient::is_connected) {
            break;
        }
    }

    assert!(
        clients.iter().all(TestClient::is_connected),
        "all {MAX_CLIENTS} clients should fit"
    );

    // One more: the transport accepts the raw connect, the server finds no
    // free slot and sends it away with code 1.
    let mut overflow = TestClient::connect(scenario.addr());
    for _ in 0..100 {
        overflow.pump();
        scenario.server.run_tic();
        if overflow.disconnect_reason.is_some() {
            break;
        }
    }

    assert_eq!(
        overflow.disconnect_reason,
        Some(DisconnectReason::ServerFull as u8)
    );
}

#[test]
fn banned_address_is_rejected_before_game_state() {
    let mut scenario = ScenarioServer::start();
    scenario
        .server
        .access
        .add_ban("127.0.0.*", "localhost", "testing", None)
        .unwrap();

    let mut client = TestClient::connect(scenario.addr());
    for _ in 0..100 {
        client.pump();
        scenario.server.run_tic();
        if client.disconnect_reason.is_some() {
            break;
        }
    }

    assert_eq!(
        client.disconnect_reason,
        Some(DisconnectReason::Banned as u8)
    );

    // The human-readable notice arrives; game state never does.
    assert!(client.has_received(MessageKind::ServerMessage));
    assert!(!client.has_received(MessageKind::GameState));
    assert!(!client.has_received(MessageKind::InitialState));
}

#[test]
fn server_only_message_kind_disconnects_the_sender() {
    let mut scenario = ScenarioServer::start();
    let mut client = join_as_spectator(&mut scenario, 50);

    // ticfinished is strictly server-to-client.
    client.send(&TicFinishedS2c { world_index: 1 });

    for _ in 0..50 {
        scenario.run_tics(&mut [&mut client], 1);
        if client.disconnect_reason.is_some() {
            break;
        }
    }

    assert_eq!(
        client.disconnect_reason,
        Some(DisconnectReason::InvalidMessage as u8)
    );
}

#[test]
fn auth_ladder_over_the_wire() {
    let mut scenario = ScenarioServer::start();
    let mut client = join_as_spectator(&mut scenario, 50);

    client.send(&ichor_protocol::messages::PlayerMessage {
        sender_number: 0,
        recipient_kind: RecipientKind::Auth,
        recipient_number: 0,
        message: Bounded(String::from("adminpass")),
    });

    for _ in 0..50 {
        scenario.run_tics(&mut [&mut client], 1);
        if client.has_received(MessageKind::AuthResult) {
            break;
        }
    }

    let result = client
        .last_of(MessageKind::AuthResult)
        .expect("auth result must arrive")
        .decode::<AuthResultS2c>()
        .unwrap();

    assert!(result.success);
    assert_eq!(result.level, AuthLevel::Administrator);
    assert_eq!(
        scenario.server.clients.get(1).unwrap().auth_level,
        AuthLevel::Administrator
    );
}
