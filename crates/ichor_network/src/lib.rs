//! An ENet-equivalent transport over UDP.
//!
//! Two channels with fixed semantics: channel 0 is reliable and ordered
//! (retransmission, duplicate suppression, in-order delivery, fragmentation
//! of oversized payloads), channel 1 is unreliable and unsequenced
//! (duplicates dropped, no ordering, no retransmission). A three-way salt
//! handshake establishes a session `connect_id` which identifies the peer
//! for its lifetime. Round-trip time and packet loss are measured per peer;
//! large payloads are zlib-compressed when that helps.

mod packet;
mod peer;

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::packet::{
    read_datagram, write_datagram, Datagram, PayloadHeader, COMPRESS_THRESHOLD, FLAG_COMPRESSED,
    FLAG_FRAGMENT, FLAG_RELIABLE, FRAGMENT_SIZE,
};
use crate::peer::{ConnectionState, Peer, ReceivedPayload};

pub use ichor_protocol::{MAX_CHANNELS, RELIABLE_CHANNEL, UNRELIABLE_CHANNEL};

/// Handle to a remote endpoint within a [`Host`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct PeerId(u32);

/// Delivery semantics for [`Host::send`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SendMode {
    /// Channel 0: delivered exactly once, in order.
    Reliable,
    /// Channel 1: fire and forget, unordered, duplicates dropped.
    Unsequenced,
}

/// Transport-level events yielded by [`Host::service`].
#[derive(Clone, Debug)]
pub enum Event {
    /// The handshake with a peer completed.
    Connect { peer: PeerId },
    /// A payload arrived on a channel.
    Receive {
        peer: PeerId,
        channel: u8,
        payload: Bytes,
    },
    /// The peer disconnected, timed out, or was reset.
    Disconnect { peer: PeerId, reason: u8 },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("unknown peer")]
    UnknownPeer,
    #[error("peer is not connected")]
    NotConnected,
    #[error("payload of {0} bytes is too large for an unsequenced packet")]
    PayloadTooLarge(usize),
    #[error("reliable send window is full")]
    SendWindowFull,
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// How long a silent peer is kept before it is considered gone.
const PEER_TIMEOUT: Duration = Duration::from_secs(10);

/// Resend cadence for unanswered handshake datagrams.
const HANDSHAKE_RESEND: Duration = Duration::from_millis(500);

/// Idle interval after which a keepalive carries outstanding acks.
const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(250);

/// A bound socket with its set of peers. Both the server (via
/// [`listen`](Host::listen)) and the client (via [`connect`](Host::connect))
/// are hosts; only the number of peers differs.
pub struct Host {
    socket: UdpSocket,
    peers: HashMap<PeerId, Peer>,
    by_addr: HashMap<SocketAddr, PeerId>,
    next_peer_id: u32,
    max_peers: usize,
    is_server: bool,
    /// Client side: the peer representing the server.
    server_peer: Option<PeerId>,
}

impl Host {
    /// Binds a server host.
    pub fn listen<A: ToSocketAddrs>(
        addr: A,
        max_peers: usize,
        max_channels: usize,
    ) -> Result<Self, TransportError> {
        assert!(max_channels <= MAX_CHANNELS);

        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        Ok(Self {
            socket,
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            next_peer_id: 1,
            max_peers,
            is_server: true,
            server_peer: None,
        })
    }

    /// Binds an ephemeral client host and begins the handshake with the
    /// server. The resulting peer surfaces in a [`Event::Connect`] once the
    /// handshake completes.
    pub fn connect(server_addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.set_nonblocking(true)?;

        let now = Instant::now();
        let mut peer = Peer::new(server_addr, ConnectionState::Requesting, now);
        peer.client_salt = rand::thread_rng().gen();

        let mut host = Self {
            socket,
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            next_peer_id: 1,
            max_peers: 1,
            is_server: false,
            server_peer: None,
        };

        let id = host.insert_peer(peer);
        host.server_peer = Some(id);
        host.send_handshake(id)?;

        Ok(host)
    }

    /// The local socket address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Client side: the peer representing the server.
    pub fn server_peer(&self) -> Option<PeerId> {
        self.server_peer
    }

    pub fn peer_addr(&self, peer: PeerId) -> Option<SocketAddr> {
        self.peers.get(&peer).map(|p| p.addr)
    }

    /// The session id agreed during the handshake.
    pub fn connect_id(&self, peer: PeerId) -> Option<u32> {
        self.peers.get(&peer).map(|p| p.connect_id)
    }

    /// Smoothed round-trip time in milliseconds.
    pub fn round_trip_time(&self, peer: PeerId) -> u32 {
        self.peers
            .get(&peer)
            .map_or(0, |p| p.ack_tracker.srtt_ms())
    }

    /// Reliable-channel loss over the recent window, as a percentage.
    pub fn packet_loss_percent(&self, peer: PeerId) -> u8 {
        self.peers
            .get(&peer)
            .map_or(0, |p| p.ack_tracker.loss_percent())
    }

    /// Pumps the socket, retransmits, and collects events, waiting up to
    /// `timeout` for something to happen.
    pub fn service(&mut self, timeout: Duration) -> Result<Vec<Event>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut events = vec![];

        loop {
            let now = Instant::now();

            self.pump_socket(&mut events, now)?;
            self.drive_timers(&mut events, now)?;

            if !events.is_empty() || Instant::now() >= deadline {
                return Ok(events);
            }

            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Queues `payload` to `peer` with the given delivery mode.
    pub fn send(
        &mut self,
        peer_id: PeerId,
        payload: &[u8],
        mode: SendMode,
    ) -> Result<(), TransportError> {
        let peer = self.peers.get_mut(&peer_id).ok_or(TransportError::UnknownPeer)?;

        if peer.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }

        let (data, compressed) = maybe_compress(payload);
        let now = Instant::now();

        match mode {
            SendMode::Reliable => {
                if !peer.ack_tracker.has_capacity() {
                    return Err(TransportError::SendWindowFull);
                }

                let fragments: Vec<&[u8]> = if data.len() > FRAGMENT_SIZE {
                    data.chunks(FRAGMENT_SIZE).collect()
                } else {
                    vec![&data[..]]
                };

                let count = fragments.len();
                let (ack, ack_bits) = peer.receive_tracker.ack_data();

                for (index, chunk) in fragments.into_iter().enumerate() {
                    let sequence = peer.next_sequence(RELIABLE_CHANNEL as usize);

                    let mut flags = FLAG_RELIABLE;
                    if compressed {
                        flags |= FLAG_COMPRESSED;
                    }
                    if count > 1 {
                        flags |= FLAG_FRAGMENT;
                    }

                    let header = Datagram::Payload(PayloadHeader {
                        connect_id: peer.connect_id,
                        channel: RELIABLE_CHANNEL,
                        flags,
                        sequence,
                        ack,
                        ack_bits,
                        fragment_index: index as u16,
                        fragment_count: if count > 1 { count as u16 } else { 0 },
                    });

                    let datagram = write_datagram(&header, chunk)
                        .map_err(|e| TransportError::Malformed(e.to_string()))?;

                    self.socket.send_to(&datagram, peer.addr)?;
                    peer.ack_tracker.track(sequence, datagram, now);
                    peer.last_send = now;
                }
            }
            SendMode::Unsequenced => {
                if data.len() > FRAGMENT_SIZE {
                    return Err(TransportError::PayloadTooLarge(payload.len()));
                }

                let sequence = peer.next_sequence(UNRELIABLE_CHANNEL as usize);
                let (ack, ack_bits) = peer.receive_tracker.ack_data();

                let mut flags = 0;
                if compressed {
                    flags |= FLAG_COMPRESSED;
                }

                let header = Datagram::Payload(PayloadHeader {
                    connect_id: peer.connect_id,
                    channel: UNRELIABLE_CHANNEL,
                    flags,
                    sequence,
                    ack,
                    ack_bits,
                    fragment_index: 0,
                    fragment_count: 0,
                });

                let datagram = write_datagram(&header, &data)
                    .map_err(|e| TransportError::Malformed(e.to_string()))?;

                self.socket.send_to(&datagram, peer.addr)?;
                peer.last_send = now;
            }
        }

        peer.ack_dirty = false;
        Ok(())
    }

    /// Notifies the peer it is being dropped, then immediately resets the
    /// slot so it can be reused by the next connect.
    pub fn disconnect(&mut self, peer_id: PeerId, reason: u8) {
        if let Some(peer) = self.peers.get(&peer_id) {
            let notice = write_datagram(&Datagram::Disconnect { reason }, &[])
                .expect("disconnect datagram is fixed size");

            // Fired twice since the notice itself is unreliable.
            let _ = self.socket.send_to(&notice, peer.addr);
            let _ = self.socket.send_to(&notice, peer.addr);
        }

        self.reset(peer_id);
    }

    /// Drops all state for a peer without notifying it.
    pub fn reset(&mut self, peer_id: PeerId) {
        if let Some(peer) = self.peers.remove(&peer_id) {
            self.by_addr.remove(&peer.addr);
            debug!(?peer_id, addr = %peer.addr, "peer reset");
        }
    }

    /// Number of peers in any state.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn insert_peer(&mut self, peer: Peer) -> PeerId {
        let id = PeerId(self.next_peer_id);
        self.next_peer_id += 1;

        self.by_addr.insert(peer.addr, id);
        self.peers.insert(id, peer);
        id
    }

    fn send_handshake(&mut self, peer_id: PeerId) -> Result<(), TransportError> {
        let Some(peer) = self.peers.get_mut(&peer_id) else {
            return Ok(());
        };

        let datagram = match peer.state {
            ConnectionState::Requesting => Datagram::ConnectRequest {
                client_salt: peer.client_salt,
            },
            ConnectionState::Challenging => Datagram::ConnectChallenge {
                server_salt: peer.server_salt,
            },
            ConnectionState::Responding => Datagram::ConnectResponse {
                combined_salt: peer.client_salt ^ peer.server_salt,
            },
            _ => return Ok(()),
        };

        let bytes = write_datagram(&datagram, &[])
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        self.socket.send_to(&bytes, peer.addr)?;
        peer.last_send = Instant::now();

        Ok(())
    }

    fn pump_socket(&mut self, events: &mut Vec<Event>, now: Instant) -> Result<(), TransportError> {
        let mut buf = [0u8; 2048];

        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((size, addr)) => {
                    let Some((datagram, payload)) = read_datagram(&buf[..size]) else {
                        trace!(%addr, "ignoring foreign datagram");
                        continue;
                    };

                    self.handle_datagram(addr, datagram, payload, events, now)?;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                // A previous send to a vanished peer can surface here.
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn handle_datagram(
        &mut self,
        addr: SocketAddr,
        datagram: Datagram,
        payload: &[u8],
        events: &mut Vec<Event>,
        now: Instant,
    ) -> Result<(), TransportError> {
        match datagram {
            Datagram::ConnectRequest { client_salt } => {
                if !self.is_server {
                    return Ok(());
                }

                if let Some(&id) = self.by_addr.get(&addr) {
                    // Retransmitted request; repeat the challenge.
                    self.send_handshake(id)?;
                    return Ok(());
                }

                if self.peers.len() >= self.max_peers {
                    let notice = write_datagram(&Datagram::Disconnect { reason: 1 }, &[])
                        .expect("disconnect datagram is fixed size");
                    self.socket.send_to(&notice, addr)?;
                    return Ok(());
                }

                let mut peer = Peer::new(addr, ConnectionState::Challenging, now);
                peer.client_salt = client_salt;
                peer.server_salt = rand::thread_rng().gen();

                let id = self.insert_peer(peer);
                self.send_handshake(id)?;
            }
            Datagram::ConnectChallenge { server_salt } => {
                let Some(&id) = self.by_addr.get(&addr) else {
                    return Ok(());
                };
                let peer = self.peers.get_mut(&id).unwrap();

                if self.is_server || peer.state == ConnectionState::Connected {
                    return Ok(());
                }

                peer.state = ConnectionState::Responding;
                peer.server_salt = server_salt;
                peer.connect_id = salt_to_connect_id(peer.client_salt ^ server_salt);
                peer.last_receive = now;

                self.send_handshake(id)?;
            }
            Datagram::ConnectResponse { combined_salt } => {
                let Some(&id) = self.by_addr.get(&addr) else {
                    return Ok(());
                };
                let peer = self.peers.get_mut(&id).unwrap();

                if !self.is_server {
                    return Ok(());
                }

                if combined_salt != peer.client_salt ^ peer.server_salt {
                    warn!(%addr, "bad connect response salt");
                    return Ok(());
                }

                peer.last_receive = now;

                if peer.state == ConnectionState::Challenging {
                    peer.state = ConnectionState::Connected;
                    peer.connect_id = salt_to_connect_id(combined_salt);

                    let accept = write_datagram(
                        &Datagram::ConnectAccept {
                            connect_id: peer.connect_id,
                        },
                        &[],
                    )
                    .expect("accept datagram is fixed size");
                    self.socket.send_to(&accept, addr)?;

                    events.push(Event::Connect { peer: id });
                } else {
                    // Response retransmit; repeat the accept.
                    let accept = write_datagram(
                        &Datagram::ConnectAccept {
                            connect_id: peer.connect_id,
                        },
                        &[],
                    )
                    .expect("accept datagram is fixed size");
                    self.socket.send_to(&accept, addr)?;
                }
            }
            Datagram::ConnectAccept { connect_id } => {
                let Some(&id) = self.by_addr.get(&addr) else {
                    return Ok(());
                };
                let peer = self.peers.get_mut(&id).unwrap();

                if self.is_server {
                    return Ok(());
                }

                peer.last_receive = now;

                if peer.state == ConnectionState::Responding {
                    peer.state = ConnectionState::Connected;
                    peer.connect_id = connect_id;
                    events.push(Event::Connect { peer: id });
                }
            }
            Datagram::Disconnect { reason } => {
                if let Some(&id) = self.by_addr.get(&addr) {
                    self.reset(id);
                    events.push(Event::Disconnect { peer: id, reason });
                }
            }
            Datagram::KeepAlive {
                connect_id,
                ack,
                ack_bits,
            } => {
                let Some(&id) = self.by_addr.get(&addr) else {
                    return Ok(());
                };
                let peer = self.peers.get_mut(&id).unwrap();

                if peer.state == ConnectionState::Connected && peer.connect_id == connect_id {
                    peer.last_receive = now;
                    peer.ack_tracker.process_ack(ack, ack_bits, now);
                }
            }
            Datagram::Payload(header) => {
                let Some(&id) = self.by_addr.get(&addr) else {
                    return Ok(());
                };
                let peer = self.peers.get_mut(&id).unwrap();

                if peer.state != ConnectionState::Connected
                    || peer.connect_id != header.connect_id
                {
                    return Ok(());
                }

                peer.last_receive = now;
                peer.ack_tracker.process_ack(header.ack, header.ack_bits, now);

                match header.channel {
                    RELIABLE_CHANNEL => {
                        // Acks are owed whether or not this is a duplicate.
                        peer.ack_dirty = true;

                        if !peer.receive_tracker.record(header.sequence) {
                            return Ok(());
                        }

                        let fragment = (header.flags & FLAG_FRAGMENT != 0)
                            .then_some((header.fragment_index, header.fragment_count));

                        peer.reorder.insert(
                            header.sequence,
                            ReceivedPayload {
                                data: Bytes::copy_from_slice(payload),
                                compressed: header.flags & FLAG_COMPRESSED != 0,
                                fragment,
                            },
                        );

                        Self::deliver_in_order(id, peer, events)?;
                    }
                    UNRELIABLE_CHANNEL => {
                        if !peer.unsequenced_tracker.record(header.sequence) {
                            return Ok(());
                        }

                        let data = if header.flags & FLAG_COMPRESSED != 0 {
                            Bytes::from(decompress(payload)?)
                        } else {
                            Bytes::copy_from_slice(payload)
                        };

                        events.push(Event::Receive {
                            peer: id,
                            channel: UNRELIABLE_CHANNEL,
                            payload: data,
                        });
                    }
                    other => {
                        trace!(channel = other, "payload on unknown channel dropped");
                    }
                }
            }
        }

        Ok(())
    }

    /// Drains the reorder buffer from `next_deliver` forward, assembling
    /// fragment groups as their parts complete.
    fn deliver_in_order(
        id: PeerId,
        peer: &mut Peer,
        events: &mut Vec<Event>,
    ) -> Result<(), TransportError> {
        while let Some(received) = peer.reorder.remove(&peer.next_deliver) {
            let sequence = peer.next_deliver;
            peer.next_deliver = peer.next_deliver.wrapping_add(1);

            match received.fragment {
                None => {
                    let data = if received.compressed {
                        Bytes::from(decompress(&received.data)?)
                    } else {
                        received.data
                    };

                    events.push(Event::Receive {
                        peer: id,
                        channel: RELIABLE_CHANNEL,
                        payload: data,
                    });
                }
                Some((index, count)) => {
                    let group = sequence.wrapping_sub(u32::from(index));

                    let assembly = peer.assemblies.entry(group).or_default();
                    assembly.insert(index as usize, count as usize, &received.data);

                    if let Some(whole) = assembly.try_assemble() {
                        peer.assemblies.remove(&group);

                        let data = if received.compressed {
                            Bytes::from(decompress(&whole)?)
                        } else {
                            Bytes::from(whole)
                        };

                        events.push(Event::Receive {
                            peer: id,
                            channel: RELIABLE_CHANNEL,
                            payload: data,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Retransmissions, handshake resends, keepalive acks, and timeouts.
    fn drive_timers(&mut self, events: &mut Vec<Event>, now: Instant) -> Result<(), TransportError> {
        let mut timed_out = vec![];

        for (&id, peer) in &mut self.peers {
            if peer.is_timed_out(PEER_TIMEOUT, now) {
                timed_out.push(id);
                continue;
            }

            match peer.state {
                ConnectionState::Connected => {
                    for data in peer.ack_tracker.due_for_retransmit(now) {
                        self.socket.send_to(&data, peer.addr)?;
                    }

                    if peer.ack_dirty
                        && now.duration_since(peer.last_send) >= KEEPALIVE_INTERVAL
                    {
                        let (ack, ack_bits) = peer.receive_tracker.ack_data();
                        let keepalive = write_datagram(
                            &Datagram::KeepAlive {
                                connect_id: peer.connect_id,
                                ack,
                                ack_bits,
                            },
                            &[],
                        )
                        .expect("keepalive datagram is fixed size");

                        self.socket.send_to(&keepalive, peer.addr)?;
                        peer.last_send = now;
                        peer.ack_dirty = false;
                    }
                }
                ConnectionState::Requesting
                | ConnectionState::Challenging
                | ConnectionState::Responding => {
                    if now.duration_since(peer.last_send) >= HANDSHAKE_RESEND {
                        let datagram = match peer.state {
                            ConnectionState::Requesting => Datagram::ConnectRequest {
                                client_salt: peer.client_salt,
                            },
                            ConnectionState::Challenging => Datagram::ConnectChallenge {
                                server_salt: peer.server_salt,
                            },
                            ConnectionState::Responding => Datagram::ConnectResponse {
                                combined_salt: peer.client_salt ^ peer.server_salt,
                            },
                            _ => unreachable!(),
                        };

                        let bytes = write_datagram(&datagram, &[])
                            .map_err(|e| TransportError::Malformed(e.to_string()))?;
                        self.socket.send_to(&bytes, peer.addr)?;
                        peer.last_send = now;
                    }
                }
                ConnectionState::Disconnecting => {}
            }
        }

        for id in timed_out {
            self.reset(id);
            events.push(Event::Disconnect {
                peer: id,
                reason: 0,
            });
        }

        Ok(())
    }
}

fn salt_to_connect_id(combined: u64) -> u32 {
    ((combined >> 32) ^ combined) as u32
}

/// Deflates payloads worth deflating. Returns the bytes to send and whether
/// they are compressed.
fn maybe_compress(payload: &[u8]) -> (Vec<u8>, bool) {
    if payload.len() < COMPRESS_THRESHOLD {
        return (payload.to_vec(), false);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(4));

    let compressed = encoder
        .write_all(payload)
        .and_then(|()| encoder.finish())
        .ok();

    match compressed {
        Some(data) if data.len() < payload.len() => (data, true),
        _ => (payload.to_vec(), false),
    }
}

fn decompress(data: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut out = vec![];

    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| TransportError::Malformed(format!("bad compressed payload: {e}")))?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs both hosts until `pred` is satisfied or the budget runs out,
    /// accumulating events per host.
    fn pump(
        server: &mut Host,
        client: &mut Host,
        mut rounds: u32,
        mut pred: impl FnMut(&[Event], &[Event]) -> bool,
    ) -> (Vec<Event>, Vec<Event>) {
        let mut server_events = vec![];
        let mut client_events = vec![];

        while rounds > 0 {
            server_events.extend(server.service(Duration::from_millis(5)).unwrap());
            client_events.extend(client.service(Duration::from_millis(5)).unwrap());

            if pred(&server_events, &client_events) {
                break;
            }
            rounds -= 1;
        }

        (server_events, client_events)
    }

    fn connected_pair() -> (Host, Host, PeerId, PeerId) {
        let mut server = Host::listen("127.0.0.1:0", 16, MAX_CHANNELS).unwrap();
        let server_addr = server.local_addr().unwrap();

        let mut client = Host::connect(server_addr).unwrap();

        let (server_events, client_events) = pump(&mut server, &mut client, 100, |s, c| {
            s.iter().any(|e| matches!(e, Event::Connect { .. }))
                && c.iter().any(|e| matches!(e, Event::Connect { .. }))
        });

        let server_side = server_events
            .iter()
            .find_map(|e| match e {
                Event::Connect { peer } => Some(*peer),
                _ => None,
            })
            .expect("server saw no connect");

        let client_side = client_events
            .iter()
            .find_map(|e| match e {
                Event::Connect { peer } => Some(*peer),
                _ => None,
            })
            .expect("client saw no connect");

        (server, client, server_side, client_side)
    }

    #[test]
    fn handshake_completes() {
        let (server, client, server_side, client_side) = connected_pair();

        let id = server.connect_id(server_side).unwrap();
        assert_ne!(id, 0);
        assert_eq!(client.connect_id(client_side), Some(id));
    }

    #[test]
    fn reliable_payloads_arrive_in_order() {
        let (mut server, mut client, _, client_side) = connected_pair();

        for i in 0u32..20 {
            client
                .send(client_side, &i.to_le_bytes(), SendMode::Reliable)
                .unwrap();
        }

        let (server_events, _) = pump(&mut server, &mut client, 200, |s, _| {
            s.iter()
                .filter(|e| matches!(e, Event::Receive { .. }))
                .count()
                >= 20
        });

        let received: Vec<u32> = server_events
            .iter()
            .filter_map(|e| match e {
                Event::Receive { payload, .. } => {
                    Some(u32::from_le_bytes(payload[..4].try_into().unwrap()))
                }
                _ => None,
            })
            .collect();

        assert_eq!(received, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn oversized_reliable_payload_fragments() {
        let (mut server, mut client, server_side, _) = connected_pair();

        // Random-ish incompressible payload, larger than one fragment.
        let big: Vec<u8> = (0..10_000u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 13) as u8)
            .collect();

        server.send(server_side, &big, SendMode::Reliable).unwrap();

        let (_, client_events) = pump(&mut server, &mut client, 200, |_, c| {
            c.iter().any(|e| matches!(e, Event::Receive { .. }))
        });

        let payload = client_events
            .iter()
            .find_map(|e| match e {
                Event::Receive { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .expect("fragmented payload never arrived");

        assert_eq!(&payload[..], &big[..]);
    }

    #[test]
    fn compressible_payload_round_trips() {
        let (mut server, mut client, server_side, _) = connected_pair();

        let redundant = vec![7u8; 4096];
        server
            .send(server_side, &redundant, SendMode::Reliable)
            .unwrap();

        let (_, client_events) = pump(&mut server, &mut client, 200, |_, c| {
            c.iter().any(|e| matches!(e, Event::Receive { .. }))
        });

        let payload = client_events
            .iter()
            .find_map(|e| match e {
                Event::Receive { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .unwrap();

        assert_eq!(&payload[..], &redundant[..]);
    }

    #[test]
    fn unsequenced_payload_arrives() {
        let (mut server, mut client, _, client_side) = connected_pair();

        client
            .send(client_side, b"position", SendMode::Unsequenced)
            .unwrap();

        let (server_events, _) = pump(&mut server, &mut client, 100, |s, _| {
            s.iter().any(|e| matches!(e, Event::Receive { .. }))
        });

        assert!(server_events.iter().any(|e| matches!(
            e,
            Event::Receive {
                channel: UNRELIABLE_CHANNEL,
                ..
            }
        )));
    }

    #[test]
    fn disconnect_notifies_peer() {
        let (mut server, mut client, server_side, _) = connected_pair();

        server.disconnect(server_side, 5);
        assert_eq!(server.peer_count(), 0);

        let (_, client_events) = pump(&mut server, &mut client, 100, |_, c| {
            c.iter().any(|e| matches!(e, Event::Disconnect { .. }))
        });

        assert!(client_events
            .iter()
            .any(|e| matches!(e, Event::Disconnect { reason: 5, .. })));
    }

    #[test]
    fn full_host_refuses_connects() {
        let mut server = Host::listen("127.0.0.1:0", 1, MAX_CHANNELS).unwrap();
        let server_addr = server.local_addr().unwrap();

        let mut first = Host::connect(server_addr).unwrap();
        pump(&mut server, &mut first, 100, |s, _| {
            s.iter().any(|e| matches!(e, Event::Connect { .. }))
        });

        let mut second = Host::connect(server_addr).unwrap();
        let (_, second_events) = pump(&mut server, &mut second, 100, |_, c| {
            c.iter().any(|e| matches!(e, Event::Disconnect { .. }))
        });

        assert!(second_events
            .iter()
            .any(|e| matches!(e, Event::Disconnect { reason: 1, .. })));
    }
}
