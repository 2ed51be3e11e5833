//! The password ladder.

use ichor_config::ServerSection;
use ichor_game::TICRATE;
use ichor_protocol::types::AuthLevel;

use crate::client::ServerClient;

/// The outcome of one auth attempt.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AuthAttempt {
    /// Dropped by the per-tic rate limit; no reply is owed.
    RateLimited,
    /// Evaluated; `success` is whether the level went up.
    Evaluated { success: bool, level: AuthLevel },
}

/// Compares `password` against each configured password from highest to
/// lowest; the result is the highest level whose password matched. Missing
/// spectator/player passwords auto-match; missing moderator/administrator
/// passwords never match (the config validator requires them anyway).
/// Failed attempts never demote.
pub fn authorize_client(
    client: &mut ServerClient,
    server: &ServerSection,
    game_tic: u32,
    password: &str,
) -> AuthAttempt {
    // One attempt per second per client, to hamper brute forcing.
    if client.last_auth_attempt_tic != 0
        && client.last_auth_attempt_tic + TICRATE > game_tic
    {
        return AuthAttempt::RateLimited;
    }

    client.last_auth_attempt_tic = game_tic;

    let mut level = AuthLevel::None;

    if matches(server.spectator_password.as_deref(), password, true) {
        level = AuthLevel::Spectator;
    }

    if matches(server.player_password.as_deref(), password, true) {
        level = AuthLevel::Player;
    }

    if matches(server.moderator_password.as_deref(), password, false) {
        level = AuthLevel::Moderator;
    }

    if matches(server.administrator_password.as_deref(), password, false) {
        level = AuthLevel::Administrator;
    }

    if level > client.auth_level {
        client.auth_level = level;
        AuthAttempt::Evaluated {
            success: true,
            level,
        }
    } else {
        AuthAttempt::Evaluated {
            success: false,
            level: client.auth_level,
        }
    }
}

/// The auth level granted to a fresh connection before any attempt: unset
/// spectator (and player) passwords promote automatically.
pub fn implicit_auth_level(server: &ServerSection) -> AuthLevel {
    if server.spectator_password.is_none() {
        if server.player_password.is_none() {
            AuthLevel::Player
        } else {
            AuthLevel::Spectator
        }
    } else {
        AuthLevel::None
    }
}

fn matches(configured: Option<&str>, attempt: &str, open_when_unset: bool) -> bool {
    match configured {
        Some(password) => password == attempt,
        None => open_when_unset,
    }
}
