//! Steady-state gameplay over the wire: command flow, position broadcasts,
//! chat relay, telemetry, and voting.

use ichor_game::TICRATE;
use ichor_protocol::messages::{
    ClientStatusS2c, PlayerCommandC2s, PlayerMessage, PlayerPositionS2c, VoteRequestC2s,
    VoteResultS2c,
};
use ichor_protocol::types::{PlayerCommand, RecipientKind};
use ichor_protocol::{Bounded, MessageKind};

use crate::testing::{join_as_spectator, ScenarioServer, TestClient};

fn enter_game(scenario: &mut ScenarioServer, client: &mut TestClient) {
    client.send_command(1, PlayerCommand::BT_USE);
    scenario.run_tics(&mut [client], 5);
}

#[test]
fn commands_apply_in_order_and_retransmits_drop() {
    let mut scenario = ScenarioServer::start();
    let mut client = join_as_spectator(&mut scenario, 50);
    enter_game(&mut scenario, &mut client);

    for _ in 0..5 {
        client.send_command(scenario.server.session.world_index, 0);
        scenario.run_tics(&mut [&mut client], 1);
    }

    let slot = scenario.server.clients.get(1).unwrap();
    let received = slot.last_command_received_index;
    assert!(received >= 6, "use press plus five moves");

    // Applied commands never outrun received ones.
    assert!(slot.last_command_run_index <= received);

    // A duplicate bundle with already-seen indices changes nothing.
    let replay = PlayerCommandC2s {
        commands: Bounded(vec![PlayerCommand {
            index: 2,
            world_index: 2,
            ..Default::default()
        }]),
    };
    client.send(&replay);
    scenario.run_tics(&mut [&mut client], 2);

    assert_eq!(
        scenario.server.clients.get(1).unwrap().last_command_received_index,
        received
    );
}

#[test]
fn authoritative_positions_flow_with_world_indices() {
    let mut scenario = ScenarioServer::start();
    let mut client = join_as_spectator(&mut scenario, 50);
    enter_game(&mut scenario, &mut client);

    scenario.run_tics(&mut [&mut client], 10);

    let positions: Vec<PlayerPositionS2c> = client
        .frames_of(MessageKind::PlayerPosition)
        .into_iter()
        .map(|f| f.decode().unwrap())
        .collect();

    assert!(!positions.is_empty());

    // Per player, the tic stamps never regress within the stream we saw.
    let mine: Vec<&PlayerPositionS2c> =
        positions.iter().filter(|p| p.player_number == 1).collect();
    assert!(!mine.is_empty());
    for pair in mine.windows(2) {
        assert!(pair[1].world_index >= pair[0].world_index);
    }

    // The snapshot the message carries is stamped with its own tic.
    for position in &mine {
        assert_eq!(position.world_index, position.position.world_index);
    }
}

#[test]
fn chat_relays_to_other_clients() {
    let mut scenario = ScenarioServer::start();
    let mut alice = join_as_spectator(&mut scenario, 50);
    let mut bob = join_as_spectator(&mut scenario, 50);

    alice.send_chat(1, "dibs on the rocket launcher");

    for _ in 0..20 {
        scenario.run_tics(&mut [&mut alice, &mut bob], 1);
        if bob.has_received(MessageKind::PlayerMessage) {
            break;
        }
    }

    let relayed = bob
        .last_of(MessageKind::PlayerMessage)
        .expect("chat must relay")
        .decode::<PlayerMessage>()
        .unwrap();

    assert_eq!(relayed.sender_number, 1);
    assert_eq!(*relayed.message, "dibs on the rocket launcher");

    // The sender does not get its own chat echoed back.
    assert!(!alice.has_received(MessageKind::PlayerMessage));
}

#[test]
fn client_status_telemetry_flows_every_second() {
    let mut scenario = ScenarioServer::start();
    let mut client = join_as_spectator(&mut scenario, 50);
    enter_game(&mut scenario, &mut client);

    scenario.run_tics(&mut [&mut client], TICRATE as usize + 5);

    let statuses: Vec<ClientStatusS2c> = client
        .frames_of(MessageKind::ClientStatus)
        .into_iter()
        .map(|f| f.decode().unwrap())
        .collect();

    assert!(!statuses.is_empty());
    assert!(statuses.iter().any(|s| s.client_number == 1));
    assert!(statuses.iter().all(|s| s.packet_loss <= 100));
}

#[test]
fn vote_passes_and_runs_its_command() {
    let mut scenario = ScenarioServer::start();
    let mut alice = join_as_spectator(&mut scenario, 50);
    let mut bob = join_as_spectator(&mut scenario, 50);

    enter_game(&mut scenario, &mut alice);
    enter_game(&mut scenario, &mut bob);

    alice.send(&VoteRequestC2s {
        command: Bounded(String::from("map 2")),
    });

    for _ in 0..20 {
        scenario.run_tics(&mut [&mut alice, &mut bob], 1);
        if bob.has_received(MessageKind::Vote) {
            break;
        }
    }
    assert!(bob.has_received(MessageKind::Vote));

    for (client, number) in [(&mut alice, 1u32), (&mut bob, 2u32)] {
        client.send(&PlayerMessage {
            sender_number: number,
            recipient_kind: RecipientKind::Vote,
            recipient_number: 0,
            message: Bounded(String::from("yea")),
        });
    }

    for _ in 0..30 {
        scenario.run_tics(&mut [&mut alice, &mut bob], 1);
        if alice.has_received(MessageKind::VoteResult) {
            break;
        }
    }

    let result = alice
        .last_of(MessageKind::VoteResult)
        .expect("vote must resolve")
        .decode::<VoteResultS2c>()
        .unwrap();
    assert!(result.passed);

    // The passed command ran: the rotation moved to map 2 (index 1).
    for _ in 0..10 {
        scenario.run_tics(&mut [&mut alice, &mut bob], 1);
        if alice.has_received(MessageKind::MapCompleted) {
            break;
        }
    }

    assert!(alice.has_received(MessageKind::MapCompleted));
    assert_eq!(scenario.server.session.map_number, 1);
}

#[test]
fn spectator_vote_request_is_rejected() {
    let mut scenario = ScenarioServer::start();
    let mut client = join_as_spectator(&mut scenario, 50);

    client.send(&VoteRequestC2s {
        command: Bounded(String::from("map 2")),
    });

    scenario.run_tics(&mut [&mut client], 10);

    assert!(!client.has_received(MessageKind::Vote));
    assert!(scenario.server.vote.is_none());
    assert!(client.has_received(MessageKind::ServerMessage));
}
