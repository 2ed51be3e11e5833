use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use ichor_config::{ResourceStore, ResourceType, ServerConfig};
use ichor_demo::{DemoHeader, DemoRecorder, DemoResource, DemoType};
use ichor_game::TICRATE;
use ichor_protocol::types::ClientOptions;
use ichor_protocol::Bounded;
use ichor_server::{console, Server};
use rand::Rng;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// The dedicated ichor server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to the server configuration document.
    #[arg(long, default_value = "server.json")]
    server_config: PathBuf,

    /// Overrides IWAD resolution with an explicit file.
    #[arg(long)]
    iwad: Option<PathBuf>,

    /// Path of the ban/whitelist file.
    #[arg(long, default_value = "access_list.json")]
    access_list: PathBuf,

    /// Directory to record a serverside demo into.
    #[arg(long)]
    record_demo: Option<PathBuf>,

    /// Directory where fetched PWADs are cached.
    #[arg(long, default_value = "wad_cache")]
    wad_cache: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()) {
        // Startup failures are fatal with a single line naming the cause.
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ServerConfig::load(&cli.server_config)?;

    let mut folders: Vec<PathBuf> = config
        .server
        .wad_folders
        .iter()
        .map(PathBuf::from)
        .collect();
    folders.push(PathBuf::from("."));

    if let Some(iwad) = &cli.iwad {
        apply_iwad_override(&mut config, &mut folders, iwad)?;
    }

    let resources = ResourceStore::resolve(
        &config.resources,
        &folders,
        config.server.wad_repository.as_deref(),
        &cli.wad_cache,
    )?;

    let rng_seed: u32 = rand::thread_rng().gen();
    let mut server = Server::new(config, resources, cli.access_list, rng_seed)?;

    if !server.master.is_empty() {
        let listing = server.config.public_json();
        server.master.advertise(&listing)?;
    }

    if let Some(folder) = &cli.record_demo {
        server.demo = Some(start_demo(&server, folder)?);
    }

    run_loop(&mut server);
    server.shutdown();
    Ok(())
}

/// Replaces the configured IWAD entry with the explicit file.
fn apply_iwad_override(
    config: &mut ServerConfig,
    folders: &mut Vec<PathBuf>,
    iwad: &PathBuf,
) -> anyhow::Result<()> {
    let file_name = iwad
        .file_name()
        .context("IWAD override has no file name")?
        .to_string_lossy()
        .into_owned();

    if let Some(parent) = iwad.parent() {
        folders.insert(0, parent.to_path_buf());
    }

    let entry = config
        .resources
        .iter_mut()
        .find(|r| r.is_iwad())
        .context("no IWAD entry to override")?;

    entry.name = file_name;
    entry.alternates.clear();
    Ok(())
}

fn start_demo(server: &Server, folder: &std::path::Path) -> anyhow::Result<DemoRecorder> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let header = DemoHeader {
        version: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
        subversion: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
        protocol_version: ichor_protocol::PROTOCOL_VERSION,
        demo_type: DemoType::Server,
        settings: server.session.settings.clone(),
        local_options: ClientOptions::default(),
        timestamp,
        length: 0,
        map_name: Bounded(server.session.map.name.clone()),
        resource_count: 0,
        console_player: 0,
    };

    let resources = server
        .resources
        .resources
        .iter()
        .map(|r| DemoResource {
            name: r.name.clone(),
            resource_type: match r.resource_type {
                ResourceType::Iwad => 0,
                ResourceType::Pwad => 1,
                ResourceType::Deh => 2,
            },
            sha1: r.sha1.clone(),
        })
        .collect();

    let map_name = server.session.map.name.clone();
    Ok(DemoRecorder::start(
        folder,
        "server",
        header,
        resources,
        &map_name,
    )?)
}

/// The wall-clock loop: console input drains before each tic; the slack
/// between tics is spent inside the transport poll.
fn run_loop(server: &mut Server) {
    let (console_tx, console_rx) = flume::unbounded::<String>();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();

        loop {
            line.clear();
            match std::io::BufRead::read_line(&mut stdin.lock(), &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() && console_tx.send(trimmed.to_owned()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let tic_duration = Duration::from_micros(1_000_000 / u64::from(TICRATE));
    let mut next_tic = Instant::now();

    loop {
        while let Ok(line) = console_rx.try_recv() {
            if line == "quit" || line == "exit" {
                info!("console requested shutdown");
                return;
            }

            let output = console::dispatch(server, &line);
            if !output.is_empty() {
                info!("{output}");
            }
        }

        server.run_tic();

        next_tic += tic_duration;
        let now = Instant::now();

        if next_tic > now {
            server.pump_transport(next_tic - now);
        } else {
            next_tic = now;
        }
    }
}
