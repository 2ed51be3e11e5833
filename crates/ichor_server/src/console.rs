//! The console command registry.
//!
//! One table of `{name, handler}`; the headless stdin console, rcon, and
//! passed votes all dispatch through it. Every dispatched command that is
//! not a no-op is appended to an active demo as a `console_command` frame.

use ichor_protocol::types::DisconnectReason;
use rand::Rng;
use tracing::info;

use crate::Server;

type Handler = fn(&mut Server, &[&str]) -> String;

struct Command {
    name: &'static str,
    usage: &'static str,
    handler: Handler,
}

const COMMANDS: [Command; 11] = [
    Command {
        name: "kick",
        usage: "kick <player> [reason]",
        handler: cmd_kick,
    },
    Command {
        name: "ban",
        usage: "ban <player> <reason> [minutes]",
        handler: cmd_ban,
    },
    Command {
        name: "unban",
        usage: "unban <address>",
        handler: cmd_unban,
    },
    Command {
        name: "list_bans",
        usage: "list_bans",
        handler: cmd_list_bans,
    },
    Command {
        name: "whitelist",
        usage: "whitelist <address> <name>",
        handler: cmd_whitelist,
    },
    Command {
        name: "unwhitelist",
        usage: "unwhitelist <address>",
        handler: cmd_unwhitelist,
    },
    Command {
        name: "list_whitelists",
        usage: "list_whitelists",
        handler: cmd_list_whitelists,
    },
    Command {
        name: "coinflip",
        usage: "coinflip",
        handler: cmd_coinflip,
    },
    Command {
        name: "random_map_number",
        usage: "random_map_number",
        handler: cmd_random_map_number,
    },
    Command {
        name: "map",
        usage: "map <n>",
        handler: cmd_map,
    },
    Command {
        name: "say",
        usage: "say <message>",
        handler: cmd_say,
    },
];

/// Runs one console command line against the server and returns its output.
pub fn dispatch(server: &mut Server, line: &str) -> String {
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return String::new();
    };
    let args: Vec<&str> = parts.collect();

    let Some(command) = COMMANDS.iter().find(|c| c.name == name) else {
        return format!("Unknown command '{name}'.");
    };

    if let Some(demo) = server.demo.as_mut() {
        let options = args.join(" ");
        if let Err(e) = demo.write_console_command(0, 0, name, &options) {
            tracing::error!(error = %e, "demo error, recording aborted");
            server.demo = None;
        }
    }

    info!(command = name, "console command");
    (command.handler)(server, &args)
}

fn parse_player(server: &Server, arg: &str) -> Result<usize, String> {
    let number: usize = arg
        .parse()
        .map_err(|_| format!("'{arg}' is not a player number"))?;

    if number == 0 || server.clients.get(number).map_or(true, |c| !c.in_game) {
        return Err(format!("No player {number}."));
    }

    Ok(number)
}

fn cmd_kick(server: &mut Server, args: &[&str]) -> String {
    let Some(&target) = args.first() else {
        return String::from("Usage: kick <player> [reason]");
    };

    let number = match parse_player(server, target) {
        Ok(number) => number,
        Err(message) => return message,
    };

    let reason = if args.len() > 1 {
        args[1..].join(" ")
    } else {
        String::from("kicked")
    };

    let name = server.player_name(number);
    server.broadcast_message(&format!("{name} was kicked: {reason}"));
    server.disconnect_client(number, DisconnectReason::Kicked);

    format!("Kicked player {number}.")
}

fn cmd_ban(server: &mut Server, args: &[&str]) -> String {
    if args.len() < 2 {
        return String::from("Usage: ban <player> <reason> [minutes]");
    }

    let number = match parse_player(server, args[0]) {
        Ok(number) => number,
        Err(message) => return message,
    };

    let Some(address) = server.clients.get(number).and_then(|c| c.address) else {
        return format!("No address for player {number}.");
    };

    let minutes = args.get(2).and_then(|m| m.parse::<u64>().ok());
    let reason_end = if minutes.is_some() {
        args.len() - 1
    } else {
        args.len()
    };
    let reason = args[1..reason_end].join(" ");
    let name = server.player_name(number);

    if let Err(e) =
        server
            .access
            .add_ban(&address.ip().to_string(), &name, &reason, minutes)
    {
        return e.to_string();
    }

    server.broadcast_message(&format!("{name} was banned: {reason}"));
    server.disconnect_client(number, DisconnectReason::Banned);

    format!("Banned {}.", address.ip())
}

fn cmd_unban(server: &mut Server, args: &[&str]) -> String {
    let Some(&address) = args.first() else {
        return String::from("Usage: unban <address>");
    };

    match server.access.remove_ban(address) {
        Ok(()) => format!("Unbanned {address}."),
        Err(e) => e.to_string(),
    }
}

fn cmd_list_bans(server: &mut Server, _args: &[&str]) -> String {
    let mut lines = vec![];

    for (pattern, entry) in server.access.bans() {
        lines.push(format!("{pattern}#{}: {}", entry.name, entry.reason));
    }

    if lines.is_empty() {
        String::from("No bans.")
    } else {
        lines.join("\n")
    }
}

fn cmd_whitelist(server: &mut Server, args: &[&str]) -> String {
    if args.len() < 2 {
        return String::from("Usage: whitelist <address> <name>");
    }

    match server.access.add_whitelist(args[0], &args[1..].join(" ")) {
        Ok(()) => format!("Whitelisted {}.", args[0]),
        Err(e) => e.to_string(),
    }
}

fn cmd_unwhitelist(server: &mut Server, args: &[&str]) -> String {
    let Some(&address) = args.first() else {
        return String::from("Usage: unwhitelist <address>");
    };

    match server.access.remove_whitelist(address) {
        Ok(()) => format!("Unwhitelisted {address}."),
        Err(e) => e.to_string(),
    }
}

fn cmd_list_whitelists(server: &mut Server, _args: &[&str]) -> String {
    let lines: Vec<String> = server
        .access
        .whitelists()
        .map(|(address, name)| format!("{address}: {name}"))
        .collect();

    if lines.is_empty() {
        String::from("No whitelist entries.")
    } else {
        lines.join("\n")
    }
}

fn cmd_coinflip(server: &mut Server, _args: &[&str]) -> String {
    let result = if rand::thread_rng().gen_bool(0.5) {
        "heads"
    } else {
        "tails"
    };

    server.broadcast_message(&format!("Coin flip: {result}."));
    result.to_owned()
}

fn cmd_random_map_number(server: &mut Server, _args: &[&str]) -> String {
    let number = rand::thread_rng().gen_range(0..server.config.maps.len());
    let name = server.config.maps[number].name().to_owned();

    server.broadcast_message(&format!("Random map: {} ({}).", number + 1, name));
    (number + 1).to_string()
}

fn cmd_map(server: &mut Server, args: &[&str]) -> String {
    let Some(&arg) = args.first() else {
        return String::from("Usage: map <n>");
    };

    // 1-based on the console, 0-based internally.
    let Ok(number) = arg.parse::<usize>() else {
        return format!("'{arg}' is not a map number");
    };

    if number == 0 || number > server.config.maps.len() {
        return format!(
            "Map number must be 1..{} (got {number}).",
            server.config.maps.len()
        );
    }

    server.change_to_map(number - 1, true);
    format!("Changing to map {number}.")
}

fn cmd_say(server: &mut Server, args: &[&str]) -> String {
    if args.is_empty() {
        return String::from("Usage: say <message>");
    }

    server.broadcast_message(&format!("[console]: {}", args.join(" ")));
    String::new()
}
