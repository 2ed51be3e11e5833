//! The join queue.
//!
//! Three levels above `none`: `waiting` (has a position), `can_join`
//! (position 0, inside the grace window), and `playing`. Admission always
//! requires a fresh button press; the reconciler only ever moves clients
//! between `waiting` and `can_join`.

use ichor_game::TICRATE;
use ichor_protocol::types::QueueLevel;

use crate::client::ClientTable;

/// A queue-visible state change, for the caller to broadcast as a player
/// info update.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum QueueChange {
    Level(usize, QueueLevel),
    Position(usize, u32),
    Afk(usize, bool),
}

/// Re-derives every queued client's level from its position. Position 0
/// promotes to `can_join` and stamps the grace-window clock.
pub fn update_queue_levels(
    clients: &mut ClientTable,
    game_tic: u32,
    changes: &mut Vec<QueueChange>,
) {
    for i in clients.in_game_indices() {
        let client = clients.get_mut(i).unwrap();

        if client.queue_level == QueueLevel::None || client.queue_level == QueueLevel::Playing {
            continue;
        }

        let new_level = if client.queue_position == 0 {
            if client.queue_level != QueueLevel::CanJoin {
                client.finished_waiting_tic = game_tic;
            }
            QueueLevel::CanJoin
        } else {
            QueueLevel::Waiting
        };

        if client.queue_level != new_level {
            client.queue_level = new_level;
            changes.push(QueueChange::Level(i, new_level));
        }
    }
}

/// The position a newly queueing client receives: 0 when the admission
/// budget still has room, else one past the deepest position in use.
///
/// AFK clients do not count against `max_players`; neither does a
/// `can_join` client that has out-stayed the grace window.
pub fn new_queue_position(
    clients: &ClientTable,
    max_players: u32,
    join_time_limit: u32,
    game_tic: u32,
) -> u32 {
    let tic_limit = join_time_limit * TICRATE;
    let mut occupying = 0u32;
    let mut max_position = None::<u32>;

    for i in clients.in_game_indices() {
        let client = clients.get(i).unwrap();

        match client.queue_level {
            QueueLevel::Playing => occupying += 1,
            QueueLevel::CanJoin => {
                let waited = game_tic.saturating_sub(client.finished_waiting_tic);
                if waited <= tic_limit && !client.afk {
                    occupying += 1;
                }
            }
            QueueLevel::Waiting => {
                max_position = Some(max_position.map_or(client.queue_position, |m: u32| {
                    m.max(client.queue_position)
                }));
            }
            QueueLevel::None => {}
        }
    }

    if occupying < max_players {
        0
    } else {
        max_position.map_or(1, |m| m + 1)
    }
}

/// Whether the admission budget has room for `index` to start playing,
/// counting playing and in-grace `can_join` clients other than `index`
/// itself. AFK clients never count.
pub fn room_in_game(
    clients: &ClientTable,
    index: usize,
    max_players: u32,
    join_time_limit: u32,
    game_tic: u32,
) -> bool {
    let tic_limit = join_time_limit * TICRATE;
    let mut occupying = 0u32;

    for i in clients.in_game_indices() {
        if i == index {
            continue;
        }

        let client = clients.get(i).unwrap();

        if client.afk {
            continue;
        }

        match client.queue_level {
            QueueLevel::Playing => occupying += 1,
            QueueLevel::CanJoin => {
                if game_tic.saturating_sub(client.finished_waiting_tic) <= tic_limit {
                    occupying += 1;
                }
            }
            _ => {}
        }
    }

    occupying < max_players
}

/// Puts a client into the queue at the computed position.
pub fn put_in_queue(
    clients: &mut ClientTable,
    index: usize,
    max_players: u32,
    join_time_limit: u32,
    game_tic: u32,
    changes: &mut Vec<QueueChange>,
) {
    let position = new_queue_position(clients, max_players, join_time_limit, game_tic);

    let client = clients.get_mut(index).unwrap();
    client.queue_position = position;
    changes.push(QueueChange::Position(index, position));

    client.queue_level = if position > 0 {
        QueueLevel::Waiting
    } else {
        client.finished_waiting_tic = game_tic;
        QueueLevel::CanJoin
    };
    changes.push(QueueChange::Level(index, client.queue_level));

    update_queue_levels(clients, game_tic, changes);
}

/// Marks the client as playing; its vacated queue position advances
/// everyone behind it.
pub fn set_client_playing(
    clients: &mut ClientTable,
    index: usize,
    game_tic: u32,
    changes: &mut Vec<QueueChange>,
) {
    advance_past(clients, index, changes);

    let client = clients.get_mut(index).unwrap();
    client.queue_level = QueueLevel::Playing;
    client.afk = false;
    changes.push(QueueChange::Level(index, QueueLevel::Playing));

    update_queue_levels(clients, game_tic, changes);
}

/// Removes a client from the queue entirely (disconnect or spectate),
/// advancing everyone behind it. Within one tic, position `k+1` becomes
/// `k`, so position 1 slides to 0 and promotes on the next reconcile.
pub fn remove_from_queue(
    clients: &mut ClientTable,
    index: usize,
    game_tic: u32,
    changes: &mut Vec<QueueChange>,
) {
    advance_past(clients, index, changes);

    let client = clients.get_mut(index).unwrap();
    if client.queue_level != QueueLevel::None {
        client.queue_level = QueueLevel::None;
        client.queue_position = 0;
        changes.push(QueueChange::Level(index, QueueLevel::None));
    }

    update_queue_levels(clients, game_tic, changes);
}

/// Requeues a client at the tail (team switches).
pub fn put_at_queue_end(
    clients: &mut ClientTable,
    index: usize,
    max_players: u32,
    join_time_limit: u32,
    game_tic: u32,
    changes: &mut Vec<QueueChange>,
) {
    remove_from_queue(clients, index, game_tic, changes);
    put_in_queue(clients, index, max_players, join_time_limit, game_tic, changes);
}

fn advance_past(clients: &mut ClientTable, index: usize, changes: &mut Vec<QueueChange>) {
    let Some(vacated) = clients.get(index).map(|c| c.queue_position) else {
        return;
    };

    if clients.get(index).map(|c| c.queue_level) == Some(QueueLevel::None) {
        return;
    }

    for i in clients.in_game_indices() {
        if i == index {
            continue;
        }

        let client = clients.get_mut(i).unwrap();
        if client.queue_level != QueueLevel::None && client.queue_position > vacated {
            client.queue_position -= 1;
            changes.push(QueueChange::Position(i, client.queue_position));
        }
    }
}

/// Flags `can_join` clients that out-stayed the grace window as AFK.
pub fn mark_queue_clients_afk(
    clients: &mut ClientTable,
    join_time_limit: u32,
    game_tic: u32,
    changes: &mut Vec<QueueChange>,
) {
    let tic_limit = join_time_limit * TICRATE;

    for i in clients.in_game_indices() {
        let client = clients.get_mut(i).unwrap();

        if client.queue_level != QueueLevel::CanJoin || client.afk {
            continue;
        }

        if game_tic.saturating_sub(client.finished_waiting_tic) > tic_limit {
            client.afk = true;
            changes.push(QueueChange::Afk(i, true));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_playing(count: usize) -> ClientTable {
        let mut table = ClientTable::new();

        for i in 1..=count {
            let client = table.get_mut(i).unwrap();
            client.in_game = true;
            client.spectating = false;
            client.queue_level = QueueLevel::Playing;
        }

        table
    }

    #[test]
    fn room_in_game_means_position_zero() {
        let table = table_with_playing(1);
        assert_eq!(new_queue_position(&table, 2, 30, 100), 0);
    }

    #[test]
    fn full_game_queues_behind_the_deepest_waiter() {
        let mut table = table_with_playing(2);

        // Scenario: max_players=2, both slots playing, a third queues.
        let mut changes = vec![];
        table.get_mut(3).unwrap().in_game = true;
        put_in_queue(&mut table, 3, 2, 30, 100, &mut changes);

        let third = table.get(3).unwrap();
        assert_eq!(third.queue_level, QueueLevel::Waiting);
        assert_eq!(third.queue_position, 1);

        // A fourth lines up behind the third.
        table.get_mut(4).unwrap().in_game = true;
        put_in_queue(&mut table, 4, 2, 30, 100, &mut changes);
        assert_eq!(table.get(4).unwrap().queue_position, 2);
    }

    #[test]
    fn vacancy_advances_the_queue_within_one_reconcile() {
        let mut table = table_with_playing(2);
        let mut changes = vec![];

        table.get_mut(3).unwrap().in_game = true;
        put_in_queue(&mut table, 3, 2, 30, 100, &mut changes);
        assert_eq!(table.get(3).unwrap().queue_position, 1);

        // Player 1 leaves the game.
        remove_from_queue(&mut table, 1, 200, &mut changes);

        let third = table.get(3).unwrap();
        assert_eq!(third.queue_position, 0);
        assert_eq!(third.queue_level, QueueLevel::CanJoin);
        assert_eq!(third.finished_waiting_tic, 200);
    }

    #[test]
    fn afk_clients_do_not_count_against_the_budget() {
        let mut table = table_with_playing(1);
        let mut changes = vec![];

        // A can_join client hogging position 0, now AFK.
        {
            let hog = table.get_mut(2).unwrap();
            hog.in_game = true;
            hog.queue_level = QueueLevel::CanJoin;
            hog.finished_waiting_tic = 0;
        }

        mark_queue_clients_afk(&mut table, 30, 30 * TICRATE + 1, &mut changes);
        assert!(table.get(2).unwrap().afk);
        assert_eq!(changes, vec![QueueChange::Afk(2, true)]);

        // With the hog AFK, a newcomer is admitted immediately.
        assert_eq!(new_queue_position(&table, 2, 30, 30 * TICRATE + 1), 0);
    }

    #[test]
    fn grace_window_holds_a_slot() {
        let mut table = table_with_playing(1);

        let waiter = table.get_mut(2).unwrap();
        waiter.in_game = true;
        waiter.queue_level = QueueLevel::CanJoin;
        waiter.finished_waiting_tic = 100;

        // Inside the window the can_join client occupies the second slot.
        assert_eq!(new_queue_position(&table, 2, 30, 110), 1);
    }

    #[test]
    fn requeue_at_end_goes_to_the_tail() {
        let mut table = table_with_playing(2);
        let mut changes = vec![];

        for i in 3..=4 {
            table.get_mut(i).unwrap().in_game = true;
            put_in_queue(&mut table, i, 2, 30, 100, &mut changes);
        }

        // Client 3 (position 1) switches teams and drops to the tail.
        put_at_queue_end(&mut table, 3, 2, 30, 100, &mut changes);

        assert_eq!(table.get(4).unwrap().queue_position, 1);
        assert_eq!(table.get(3).unwrap().queue_position, 2);
    }
}
