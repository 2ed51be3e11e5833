//! Whole-message framing.
//!
//! The transport delivers one marshalled message per packet payload. A frame
//! is the leading `u32` kind tag plus the untouched body bytes; decoding into
//! a concrete [`Message`] type checks the tag and demands that the body is
//! fully consumed, so a length field that disagrees with the actual packet
//! size surfaces as an error here.

use anyhow::{ensure, Context};
use bytes::{BufMut, Bytes, BytesMut};

use crate::{Decode, Encode, Message, MessageKind, MAX_MESSAGE_SIZE};

/// A received message, split into its kind tag and undecoded body.
#[derive(Clone, Debug)]
pub struct MessageFrame {
    pub kind: MessageKind,
    pub body: Bytes,
}

impl MessageFrame {
    /// Splits a packet payload into kind and body.
    pub fn parse(payload: &[u8]) -> anyhow::Result<Self> {
        ensure!(
            payload.len() <= MAX_MESSAGE_SIZE,
            "message of {} bytes exceeds maximum size",
            payload.len()
        );

        let mut r = payload;
        let raw = u32::decode(&mut r).context("failed to decode message kind")?;
        let kind = MessageKind::try_from(raw)?;

        Ok(Self {
            kind,
            body: Bytes::copy_from_slice(r),
        })
    }

    /// Attempts to decode this frame as message type `M`. An error is
    /// returned if the kind does not match, the body fails to decode, or
    /// decoding leaves bytes unconsumed.
    pub fn decode<'a, M>(&'a self) -> anyhow::Result<M>
    where
        M: Message + Decode<'a>,
    {
        ensure!(
            M::KIND == self.kind,
            "message kind mismatch while decoding '{}': expected {:?}, got {:?}",
            M::NAME,
            M::KIND,
            self.kind
        );

        let mut r = &self.body[..];

        let msg = M::decode(&mut r)?;

        ensure!(
            r.is_empty(),
            "missed {} bytes while decoding '{}'",
            r.len(),
            M::NAME
        );

        Ok(msg)
    }
}

/// Marshals a message into a standalone packet payload.
pub fn encode_message<M>(msg: &M) -> anyhow::Result<Bytes>
where
    M: Message + Encode,
{
    let mut buf = BytesMut::new();

    msg.encode_with_kind((&mut buf).writer())
        .with_context(|| format!("failed to encode '{}'", M::NAME))?;

    ensure!(
        buf.len() <= MAX_MESSAGE_SIZE,
        "encoded '{}' of {} bytes exceeds maximum size",
        M::NAME,
        buf.len()
    );

    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::TicFinishedS2c;

    #[test]
    fn frame_round_trip() {
        let msg = TicFinishedS2c { world_index: 77 };

        let payload = encode_message(&msg).unwrap();
        let frame = MessageFrame::parse(&payload).unwrap();

        assert_eq!(frame.kind, MessageKind::TicFinished);
        assert_eq!(frame.decode::<TicFinishedS2c>().unwrap(), msg);
    }

    #[test]
    fn kind_mismatch_rejected() {
        let msg = TicFinishedS2c { world_index: 1 };
        let payload = encode_message(&msg).unwrap();
        let frame = MessageFrame::parse(&payload).unwrap();

        assert!(frame
            .decode::<crate::messages::VoteResultS2c>()
            .is_err());
    }

    #[test]
    fn trailing_bytes_rejected() {
        let msg = TicFinishedS2c { world_index: 1 };
        let mut payload = encode_message(&msg).unwrap().to_vec();
        payload.push(0xFF);

        let frame = MessageFrame::parse(&payload).unwrap();
        assert!(frame.decode::<TicFinishedS2c>().is_err());
    }

    #[test]
    fn unknown_kind_rejected() {
        let payload = 9999u32.to_le_bytes();
        assert!(MessageFrame::parse(&payload).is_err());
    }
}
