//! Master-server advertisement.
//!
//! On startup the server PUTs its public configuration to every configured
//! master; every two seconds (staggered per master) it POSTs a state
//! document; on shutdown it DELETEs the listing. Updates are asynchronous:
//! the requests run on a private tokio runtime and their outcomes come back
//! over a channel drained once per tic, so master records stay owned by the
//! main loop and a slow master can never stall a tic.

use std::time::Duration;

use flume::{Receiver, Sender};
use ichor_config::{digest_hex, MasterConfig};
use ichor_game::TICRATE;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{info, warn};

/// Tics between state updates per master.
const UPDATE_INTERVAL_TICS: u32 = 2 * TICRATE;

/// Per-request timeout; the first timeout disables the master.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Error)]
pub enum MasterError {
    #[error("master '{0}' already has a server listed under this name")]
    AlreadyListed(String),
    #[error("master '{0}' rejected our credentials")]
    AuthFailed(String),
    #[error("could not reach master '{master}': {message}")]
    Unreachable { master: String, message: String },
    #[error("could not build http client: {0}")]
    Client(String),
}

#[derive(Debug)]
struct MasterRecord {
    config: MasterConfig,
    disabled: bool,
    updating: bool,
    last_update_tic: u32,
}

#[derive(Debug)]
struct Completion {
    master: usize,
    status: Option<u16>,
    error: Option<String>,
}

pub struct MasterClient {
    runtime: Runtime,
    http: reqwest::Client,
    masters: Vec<MasterRecord>,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
}

impl MasterClient {
    pub fn new(configs: Vec<MasterConfig>, user_agent: &str) -> Result<Self, MasterError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| MasterError::Client(e.to_string()))?;

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MasterError::Client(e.to_string()))?;

        let (completions_tx, completions_rx) = flume::unbounded();

        Ok(Self {
            runtime,
            http,
            masters: configs
                .into_iter()
                .map(|config| MasterRecord {
                    config,
                    disabled: false,
                    updating: false,
                    last_update_tic: 0,
                })
                .collect(),
            completions_tx,
            completions_rx,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.masters.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.masters.iter().filter(|m| !m.disabled).count()
    }

    fn listing_url(config: &MasterConfig) -> String {
        format!(
            "{}/servers/{}/{}",
            config.address.trim_end_matches('/'),
            config.group,
            config.name
        )
    }

    /// HTTP Basic credentials: the password on the wire is the SHA-1 of the
    /// configured password, so the plaintext never leaves the server.
    fn password_digest(config: &MasterConfig) -> String {
        digest_hex(&Sha1::digest(config.password.as_bytes()))
    }

    /// Lists the server with every master. Blocking; runs once at startup.
    /// A 301 (name collision) or 401 (bad credentials) is fatal; an
    /// unreachable or otherwise unhappy master is disabled and skipped.
    pub fn advertise(&mut self, public_config: &serde_json::Value) -> Result<(), MasterError> {
        let body = serde_json::to_string_pretty(public_config)
            .expect("public config serialization is infallible");

        for i in 0..self.masters.len() {
            let master = &self.masters[i];
            let url = Self::listing_url(&master.config);
            let request = self
                .http
                .put(&url)
                .basic_auth(
                    &master.config.username,
                    Some(Self::password_digest(&master.config)),
                )
                .body(body.clone())
                .send();

            let response = self.runtime.block_on(request);

            match response {
                Ok(response) => match response.status().as_u16() {
                    201 => {
                        info!(master = %master.config.address, "listed with master");
                    }
                    301 => {
                        return Err(MasterError::AlreadyListed(
                            master.config.address.clone(),
                        ))
                    }
                    401 => {
                        return Err(MasterError::AuthFailed(master.config.address.clone()))
                    }
                    status => {
                        warn!(
                            master = %master.config.address,
                            status,
                            "unexpected response to listing, disabling master"
                        );
                        self.masters[i].disabled = true;
                    }
                },
                Err(e) => {
                    warn!(
                        master = %master.config.address,
                        error = %e,
                        "could not reach master, disabling"
                    );
                    self.masters[i].disabled = true;
                }
            }
        }

        Ok(())
    }

    /// Kicks off asynchronous state POSTs for masters whose stagger slot is
    /// this tic. Non-blocking.
    pub fn update(&mut self, game_tic: u32, state: &serde_json::Value) {
        let body = serde_json::to_string_pretty(state)
            .expect("state serialization is infallible");

        for (i, master) in self.masters.iter_mut().enumerate() {
            if master.disabled || master.updating {
                continue;
            }

            // Stagger by master index so the masters are not all hit on the
            // same tic.
            if (game_tic + i as u32 * 7) % UPDATE_INTERVAL_TICS != 0 {
                continue;
            }

            master.updating = true;

            let request = self
                .http
                .post(Self::listing_url(&master.config))
                .basic_auth(
                    &master.config.username,
                    Some(Self::password_digest(&master.config)),
                )
                .body(body.clone());
            let completions = self.completions_tx.clone();

            self.runtime.spawn(async move {
                let completion = match request.send().await {
                    Ok(response) => Completion {
                        master: i,
                        status: Some(response.status().as_u16()),
                        error: None,
                    },
                    Err(e) => Completion {
                        master: i,
                        status: None,
                        error: Some(e.to_string()),
                    },
                };

                let _ = completions.send(completion);
            });
        }
    }

    /// Applies completed requests to the master records. Called once per
    /// tic from the main loop.
    pub fn pump(&mut self, game_tic: u32) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            let Some(master) = self.masters.get_mut(completion.master) else {
                continue;
            };

            master.updating = false;

            match (completion.status, completion.error) {
                (Some(200), _) => {
                    master.last_update_tic = game_tic;
                }
                (Some(status @ (401 | 408)), _) => {
                    warn!(
                        master = %master.config.address,
                        status,
                        "master refused update, disabling"
                    );
                    master.disabled = true;
                }
                (Some(status), _) => {
                    warn!(
                        master = %master.config.address,
                        status,
                        "unexpected master response, disabling"
                    );
                    master.disabled = true;
                }
                (None, error) => {
                    warn!(
                        master = %master.config.address,
                        error = error.as_deref().unwrap_or("unknown"),
                        "master update failed, disabling"
                    );
                    master.disabled = true;
                }
            }
        }
    }

    /// Removes the listing from every still-active master. Blocking; runs
    /// once at shutdown.
    pub fn delist(&mut self) {
        for master in &self.masters {
            if master.disabled {
                continue;
            }

            let request = self
                .http
                .delete(Self::listing_url(&master.config))
                .basic_auth(
                    &master.config.username,
                    Some(Self::password_digest(&master.config)),
                )
                .send();

            match self.runtime.block_on(request) {
                Ok(response) if response.status().as_u16() == 401 => {
                    warn!(master = %master.config.address, "delist rejected");
                }
                Ok(_) => info!(master = %master.config.address, "delisted"),
                Err(e) => {
                    warn!(master = %master.config.address, error = %e, "delist failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    use super::*;

    /// A one-shot HTTP stub that answers `count` requests with `status` and
    /// records each request line.
    fn stub_master(status: u16, count: usize) -> (String, std::thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let mut request_lines = vec![];

            for _ in 0..count {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);

                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                request_lines.push(request_line.trim().to_owned());

                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if let Some(value) = line
                        .to_ascii_lowercase()
                        .strip_prefix("content-length:")
                        .map(str::trim)
                        .and_then(|v| v.parse::<usize>().ok())
                    {
                        content_length = value;
                    }
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                }

                let mut body = vec![0u8; content_length];
                reader.read_exact(&mut body).unwrap();

                let reason = match status {
                    200 => "OK",
                    201 => "Created",
                    301 => "Moved Permanently",
                    401 => "Unauthorized",
                    _ => "Whatever",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                reader.get_mut().write_all(response.as_bytes()).unwrap();
            }

            request_lines
        });

        (format!("http://{addr}"), handle)
    }

    fn master_config(address: &str) -> MasterConfig {
        MasterConfig {
            address: address.to_owned(),
            group: String::from("testing"),
            name: String::from("Duel 1"),
            username: String::from("server"),
            password: String::from("hunter2"),
        }
    }

    #[test]
    fn advertise_put_hits_the_listing_url() {
        let (address, handle) = stub_master(201, 1);
        let mut client =
            MasterClient::new(vec![master_config(&address)], "ichor-test").unwrap();

        client
            .advertise(&serde_json::json!({ "options": {} }))
            .unwrap();
        assert_eq!(client.active_count(), 1);

        let requests = handle.join().unwrap();
        assert_eq!(requests, vec!["PUT /servers/testing/Duel%201 HTTP/1.1"]);
    }

    #[test]
    fn advertise_401_is_fatal() {
        let (address, handle) = stub_master(401, 1);
        let mut client =
            MasterClient::new(vec![master_config(&address)], "ichor-test").unwrap();

        let err = client
            .advertise(&serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, MasterError::AuthFailed(_)));

        handle.join().unwrap();
    }

    #[test]
    fn unreachable_master_is_disabled_not_fatal() {
        // Nothing listens on this port.
        let mut client = MasterClient::new(
            vec![master_config("http://127.0.0.1:9")],
            "ichor-test",
        )
        .unwrap();

        client.advertise(&serde_json::json!({})).unwrap();
        assert_eq!(client.active_count(), 0);
    }

    #[test]
    fn update_completions_disable_on_bad_status() {
        let (address, handle) = stub_master(408, 1);
        let mut client =
            MasterClient::new(vec![master_config(&address)], "ichor-test").unwrap();

        client.update(0, &serde_json::json!({ "players": 0 }));

        // Wait for the async POST to resolve, then apply it.
        handle.join().unwrap();
        for _ in 0..100 {
            client.pump(1);
            if client.active_count() == 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(client.active_count(), 0);
    }
}
