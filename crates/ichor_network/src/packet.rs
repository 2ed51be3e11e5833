//! The datagram format underneath the message protocol.
//!
//! Every datagram starts with a magic/version pair. Control datagrams drive
//! the connect handshake and teardown; payload datagrams carry one channel
//! payload plus piggybacked acknowledgements for the reliable channel.

use anyhow::ensure;
use ichor_protocol::{Decode, Encode};

pub(crate) const PROTOCOL_MAGIC: u32 = 0x4943_4852;
pub(crate) const TRANSPORT_VERSION: u32 = 1;

/// Hard ceiling for a single datagram on the wire.
pub(crate) const MAX_DATAGRAM_SIZE: usize = 1400;

/// Payload bytes per fragment of an oversized reliable payload.
pub(crate) const FRAGMENT_SIZE: usize = 1150;

/// Payloads at or above this size are zlib-deflated if that actually helps.
pub(crate) const COMPRESS_THRESHOLD: usize = 512;

pub(crate) const FLAG_RELIABLE: u8 = 1;
pub(crate) const FLAG_COMPRESSED: u8 = 1 << 1;
pub(crate) const FLAG_FRAGMENT: u8 = 1 << 2;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

/// Serial-number comparison with wraparound.
#[inline]
pub(crate) fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode)]
pub(crate) struct Preamble {
    pub magic: u32,
    pub version: u32,
}

impl Preamble {
    pub(crate) fn new() -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: TRANSPORT_VERSION,
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == TRANSPORT_VERSION
    }
}

/// Everything after the preamble.
#[derive(Clone, PartialEq, Eq, Debug, Encode, Decode)]
pub(crate) enum Datagram {
    /// First handshake step; the client offers its salt.
    ConnectRequest { client_salt: u64 },
    /// The server answers with its own salt.
    ConnectChallenge { server_salt: u64 },
    /// The client echoes the XOR of both salts, proving it owns its address.
    ConnectResponse { combined_salt: u64 },
    /// Connection established; `connect_id` identifies the session.
    ConnectAccept { connect_id: u32 },
    Disconnect { reason: u8 },
    /// Ack carrier for an otherwise idle reliable channel.
    KeepAlive {
        connect_id: u32,
        ack: u32,
        ack_bits: u32,
    },
    Payload(PayloadHeader),
}

/// Header of a payload datagram; the payload bytes follow it raw.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode)]
pub(crate) struct PayloadHeader {
    pub connect_id: u32,
    pub channel: u8,
    pub flags: u8,
    /// Sequence number within the channel's space.
    pub sequence: u32,
    /// Highest reliable sequence seen from the other side.
    pub ack: u32,
    /// Receipt history for the 32 sequences before `ack`.
    pub ack_bits: u32,
    /// Present when `FLAG_FRAGMENT` is set: index within the group and the
    /// total group size.
    pub fragment_index: u16,
    pub fragment_count: u16,
}

pub(crate) fn write_datagram(datagram: &Datagram, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(64 + payload.len());

    Preamble::new().encode(&mut buf)?;
    datagram.encode(&mut buf)?;
    buf.extend_from_slice(payload);

    ensure!(
        buf.len() <= MAX_DATAGRAM_SIZE,
        "datagram of {} bytes exceeds maximum",
        buf.len()
    );

    Ok(buf)
}

/// Splits a raw datagram into its header and trailing payload bytes. Returns
/// `None` for datagrams that are not ours.
pub(crate) fn read_datagram(data: &[u8]) -> Option<(Datagram, &[u8])> {
    let mut r = data;

    let preamble = Preamble::decode(&mut r).ok()?;
    if !preamble.is_valid() {
        return None;
    }

    let datagram = Datagram::decode(&mut r).ok()?;
    Some((datagram, r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_comparison() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(sequence_greater_than(0, u32::MAX));
        assert!(!sequence_greater_than(u32::MAX, 0));
    }

    #[test]
    fn datagram_round_trip() {
        let header = Datagram::Payload(PayloadHeader {
            connect_id: 0xABCD,
            channel: 0,
            flags: FLAG_RELIABLE,
            sequence: 9,
            ack: 3,
            ack_bits: 0b101,
            fragment_index: 0,
            fragment_count: 0,
        });

        let bytes = write_datagram(&header, b"hello").unwrap();
        let (decoded, payload) = read_datagram(&bytes).unwrap();

        assert_eq!(decoded, header);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn foreign_datagrams_ignored() {
        assert!(read_datagram(b"GET / HTTP/1.1").is_none());
        assert!(read_datagram(&[]).is_none());
    }

    #[test]
    fn oversized_datagram_rejected() {
        let header = Datagram::KeepAlive {
            connect_id: 1,
            ack: 0,
            ack_bits: 0,
        };

        assert!(write_datagram(&header, &[0; MAX_DATAGRAM_SIZE]).is_err());
    }
}
