//! Join-queue scenarios over the wire.

use ichor_protocol::types::{PlayerCommand, QueueLevel};
use ichor_protocol::MessageKind;

use crate::testing::{join_as_spectator, ScenarioServer, TestClient};

fn join_game(scenario: &mut ScenarioServer, client: &mut TestClient, claimed_tic: u32) {
    // A spectator pressing use is the join request.
    client.send_command(claimed_tic, PlayerCommand::BT_USE);
    scenario.run_tics(&mut [client], 5);
}

#[test]
fn spectator_pressing_use_enters_the_game() {
    let mut scenario = ScenarioServer::start();
    let mut client = join_as_spectator(&mut scenario, 50);

    assert!(scenario.server.clients.get(1).unwrap().spectating);

    join_game(&mut scenario, &mut client, 1);

    let slot = scenario.server.clients.get(1).unwrap();
    assert!(!slot.spectating);
    assert_eq!(slot.queue_level, QueueLevel::Playing);
    assert!(client.has_received(MessageKind::PlayerSpawned));
}

#[test]
fn third_client_waits_for_a_vacancy() {
    // Two playing slots.
    let mut scenario = ScenarioServer::start_with(
        &crate::testing::test_config_json().replace(
            r#""max_players": 4"#,
            r#""max_players": 2"#,
        ),
        |_| {},
    );

    let mut first = join_as_spectator(&mut scenario, 50);
    let mut second = join_as_spectator(&mut scenario, 50);
    let mut third = join_as_spectator(&mut scenario, 50);

    join_game(&mut scenario, &mut first, 1);
    join_game(&mut scenario, &mut second, 2);

    assert_eq!(scenario.server.clients.playing_count(), 2);

    // Client 3 presses use: admission denied, queued at position 1.
    join_game(&mut scenario, &mut third, 3);

    let slot = scenario.server.clients.get(3).unwrap();
    assert_eq!(slot.queue_level, QueueLevel::Waiting);
    assert_eq!(slot.queue_position, 1);

    // Client 1 spectates; within a tic client 3 advances to can_join.
    scenario.server.spectate_player(1);
    scenario.run_tics(&mut [&mut first, &mut second, &mut third], 2);

    let slot = scenario.server.clients.get(3).unwrap();
    assert_eq!(slot.queue_level, QueueLevel::CanJoin);
    assert_eq!(slot.queue_position, 0);

    // Promotion still takes a fresh use press.
    join_game(&mut scenario, &mut third, 10);
    assert_eq!(
        scenario.server.clients.get(3).unwrap().queue_level,
        QueueLevel::Playing
    );
}

#[test]
fn queue_positions_compact_on_disconnect() {
    let mut scenario = ScenarioServer::start_with(
        &crate::testing::test_config_json().replace(
            r#""max_players": 4"#,
            r#""max_players": 1"#,
        ),
        |_| {},
    );

    let mut first = join_as_spectator(&mut scenario, 50);
    let mut second = join_as_spectator(&mut scenario, 50);
    let mut third = join_as_spectator(&mut scenario, 50);

    join_game(&mut scenario, &mut first, 1);
    join_game(&mut scenario, &mut second, 2);
    join_game(&mut scenario, &mut third, 3);

    assert_eq!(scenario.server.clients.get(2).unwrap().queue_position, 1);
    assert_eq!(scenario.server.clients.get(3).unwrap().queue_position, 2);

    // The waiter at position 1 leaves entirely; position 2 slides down.
    scenario
        .server
        .disconnect_client(2, ichor_protocol::types::DisconnectReason::NoReason);
    scenario.run_tics(&mut [&mut first, &mut third], 2);

    assert!(!scenario.server.clients.get(2).unwrap().in_game);
    assert_eq!(scenario.server.clients.get(3).unwrap().queue_position, 1);
}
