//! Per-peer connection state: reliability bookkeeping, ordering, RTT and
//! loss estimation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::packet::sequence_greater_than;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum ConnectionState {
    /// Client side: request sent, waiting for the challenge.
    Requesting,
    /// Server side: challenge sent, waiting for the response.
    Challenging,
    /// Client side: response sent, waiting for the accept.
    Responding,
    Connected,
    Disconnecting,
}

/// Tracks sent reliable packets until they are acknowledged, retransmitting
/// on timeout, and derives the smoothed RTT and loss estimates from their
/// fate.
#[derive(Debug)]
pub(crate) struct AckTracker {
    pending: VecDeque<PendingPacket>,
    srtt: f32,
    rtt_var: f32,
    /// Of the last `LOSS_WINDOW` resolved packets, which needed at least one
    /// retransmission.
    loss_history: VecDeque<bool>,
}

#[derive(Debug)]
pub(crate) struct PendingPacket {
    pub sequence: u32,
    pub data: Vec<u8>,
    pub first_send: Instant,
    pub last_send: Instant,
    pub retransmits: u32,
}

const LOSS_WINDOW: usize = 64;
const MAX_PENDING: usize = 1024;

impl AckTracker {
    pub(crate) fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            srtt: 100.0,
            rtt_var: 50.0,
            loss_history: VecDeque::with_capacity(LOSS_WINDOW),
        }
    }

    /// Whether the send window still has room.
    pub(crate) fn has_capacity(&self) -> bool {
        self.pending.len() < MAX_PENDING
    }

    pub(crate) fn track(&mut self, sequence: u32, data: Vec<u8>, now: Instant) {
        self.pending.push_back(PendingPacket {
            sequence,
            data,
            first_send: now,
            last_send: now,
            retransmits: 0,
        });
    }

    /// Marks packets covered by `(ack, ack_bits)` as delivered and updates
    /// the RTT estimate from packets that were never retransmitted.
    pub(crate) fn process_ack(&mut self, ack: u32, ack_bits: u32, now: Instant) {
        let mut resolved = vec![];

        for (i, pending) in self.pending.iter().enumerate() {
            let acked = if pending.sequence == ack {
                true
            } else if sequence_greater_than(ack, pending.sequence) {
                let diff = ack.wrapping_sub(pending.sequence);
                diff <= 32 && (ack_bits & (1 << (diff - 1))) != 0
            } else {
                false
            };

            if acked {
                resolved.push(i);
            }
        }

        for &i in resolved.iter().rev() {
            let packet = self.pending.remove(i).unwrap();

            if packet.retransmits == 0 {
                let rtt = now.duration_since(packet.first_send).as_secs_f32() * 1000.0;
                self.update_rtt(rtt);
            }

            self.record_outcome(packet.retransmits > 0);
        }
    }

    /// Returns packets whose retransmission timeout has elapsed, refreshing
    /// their send times.
    pub(crate) fn due_for_retransmit(&mut self, now: Instant) -> Vec<Vec<u8>> {
        let rto = Duration::from_millis((self.srtt + 4.0 * self.rtt_var).max(50.0) as u64);
        let mut due = vec![];

        for pending in &mut self.pending {
            if now.duration_since(pending.last_send) >= rto {
                pending.last_send = now;
                pending.retransmits += 1;
                due.push(pending.data.clone());
            }
        }

        due
    }

    fn update_rtt(&mut self, rtt: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let diff = (rtt - self.srtt).abs();
        self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
        self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt;
    }

    fn record_outcome(&mut self, lost: bool) {
        if self.loss_history.len() >= LOSS_WINDOW {
            self.loss_history.pop_front();
        }
        self.loss_history.push_back(lost);
    }

    pub(crate) fn srtt_ms(&self) -> u32 {
        self.srtt as u32
    }

    /// Loss percentage over the recent window, 0..=100.
    pub(crate) fn loss_percent(&self) -> u8 {
        if self.loss_history.is_empty() {
            return 0;
        }

        let lost = self.loss_history.iter().filter(|&&l| l).count();
        ((lost * 100) / self.loss_history.len()).min(100) as u8
    }
}

/// Tracks received sequence numbers for ack generation and duplicate
/// suppression.
#[derive(Debug, Default)]
pub(crate) struct ReceiveTracker {
    last_received: u32,
    received_bits: u32,
    recent: VecDeque<u32>,
}

const MAX_RECENT: usize = 256;

impl ReceiveTracker {
    /// Records a sequence. Returns false for duplicates.
    pub(crate) fn record(&mut self, sequence: u32) -> bool {
        if self.recent.contains(&sequence) {
            return false;
        }

        if self.recent.len() >= MAX_RECENT {
            self.recent.pop_front();
        }
        self.recent.push_back(sequence);

        if sequence_greater_than(sequence, self.last_received) {
            let diff = sequence.wrapping_sub(self.last_received);
            if diff <= 32 {
                self.received_bits = (self.received_bits << diff) | (1 << (diff - 1));
            } else {
                self.received_bits = 0;
            }
            self.last_received = sequence;
        } else {
            let diff = self.last_received.wrapping_sub(sequence);
            if diff > 0 && diff <= 32 {
                self.received_bits |= 1 << (diff - 1);
            }
        }

        true
    }

    pub(crate) fn ack_data(&self) -> (u32, u32) {
        (self.last_received, self.received_bits)
    }
}

/// An in-progress reassembly of a fragmented reliable payload.
#[derive(Debug, Default)]
pub(crate) struct FragmentAssembly {
    parts: Vec<Option<Vec<u8>>>,
}

impl FragmentAssembly {
    pub(crate) fn insert(&mut self, index: usize, count: usize, data: &[u8]) {
        if self.parts.len() != count {
            self.parts = vec![None; count];
        }

        if index < count {
            self.parts[index] = Some(data.to_vec());
        }
    }

    pub(crate) fn try_assemble(&mut self) -> Option<Vec<u8>> {
        if self.parts.is_empty() || self.parts.iter().any(|p| p.is_none()) {
            return None;
        }

        let mut whole = vec![];
        for part in self.parts.drain(..) {
            whole.extend_from_slice(&part.unwrap());
        }

        Some(whole)
    }
}

/// One remote endpoint.
#[derive(Debug)]
pub(crate) struct Peer {
    pub addr: SocketAddr,
    pub state: ConnectionState,
    pub client_salt: u64,
    pub server_salt: u64,
    pub connect_id: u32,
    pub last_receive: Instant,
    pub last_send: Instant,

    /// Next outgoing sequence per channel.
    pub send_sequence: [u32; 2],
    /// Reliability bookkeeping for channel 0.
    pub ack_tracker: AckTracker,
    pub receive_tracker: ReceiveTracker,
    /// Unsequenced-channel duplicate suppression.
    pub unsequenced_tracker: ReceiveTracker,

    /// Next reliable sequence to deliver in order.
    pub next_deliver: u32,
    /// Reliable payloads received ahead of order, keyed by sequence.
    pub reorder: BTreeMap<u32, ReceivedPayload>,
    /// Fragment groups under reassembly, keyed by the group's first
    /// sequence number.
    pub assemblies: HashMap<u32, FragmentAssembly>,
    /// Piggyback acks owed to the other side.
    pub ack_dirty: bool,
}

#[derive(Debug)]
pub(crate) struct ReceivedPayload {
    pub data: Bytes,
    pub compressed: bool,
    pub fragment: Option<(u16, u16)>,
}

impl Peer {
    pub(crate) fn new(addr: SocketAddr, state: ConnectionState, now: Instant) -> Self {
        Self {
            addr,
            state,
            client_salt: 0,
            server_salt: 0,
            connect_id: 0,
            last_receive: now,
            last_send: now,
            send_sequence: [0; 2],
            ack_tracker: AckTracker::new(),
            receive_tracker: ReceiveTracker::default(),
            unsequenced_tracker: ReceiveTracker::default(),
            next_deliver: 0,
            reorder: BTreeMap::new(),
            assemblies: HashMap::new(),
            ack_dirty: false,
        }
    }

    pub(crate) fn next_sequence(&mut self, channel: usize) -> u32 {
        let seq = self.send_sequence[channel];
        self.send_sequence[channel] = seq.wrapping_add(1);
        seq
    }

    pub(crate) fn is_timed_out(&self, timeout: Duration, now: Instant) -> bool {
        now.duration_since(self.last_receive) > timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_tracker_bitfield() {
        let mut tracker = ReceiveTracker::default();

        tracker.record(1);
        tracker.record(2);
        tracker.record(3);

        let (ack, bits) = tracker.ack_data();
        assert_eq!(ack, 3);
        assert_eq!(bits & 0b11, 0b11);
    }

    #[test]
    fn receive_tracker_out_of_order() {
        let mut tracker = ReceiveTracker::default();

        tracker.record(3);
        tracker.record(1);
        tracker.record(2);

        let (ack, bits) = tracker.ack_data();
        assert_eq!(ack, 3);
        assert_eq!(bits & 0b11, 0b11);
    }

    #[test]
    fn duplicate_detection() {
        let mut tracker = ReceiveTracker::default();

        assert!(tracker.record(1));
        assert!(!tracker.record(1));
        assert!(tracker.record(2));
    }

    #[test]
    fn ack_resolves_pending() {
        let now = Instant::now();
        let mut tracker = AckTracker::new();

        tracker.track(1, vec![1], now);
        tracker.track(2, vec![2], now);
        tracker.track(3, vec![3], now);

        // Ack 3 with a history bit for 1 but not 2.
        tracker.process_ack(3, 0b10, now + Duration::from_millis(20));

        assert_eq!(tracker.pending.len(), 1);
        assert_eq!(tracker.pending[0].sequence, 2);
        assert_eq!(tracker.loss_percent(), 0);
    }

    #[test]
    fn retransmit_counts_as_loss() {
        let now = Instant::now();
        let mut tracker = AckTracker::new();

        tracker.track(1, vec![1], now);

        let due = tracker.due_for_retransmit(now + Duration::from_secs(2));
        assert_eq!(due.len(), 1);

        tracker.process_ack(1, 0, now + Duration::from_secs(3));
        assert!(tracker.loss_percent() > 0);
    }

    #[test]
    fn fragment_reassembly() {
        let mut assembly = FragmentAssembly::default();

        assembly.insert(0, 3, b"aa");
        assert!(assembly.try_assemble().is_none());
        assembly.insert(2, 3, b"cc");
        assembly.insert(1, 3, b"bb");

        assert_eq!(assembly.try_assemble().unwrap(), b"aabbcc");
    }
}
