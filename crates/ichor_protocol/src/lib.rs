//! Wire protocol for the ichor client/server core.
//!
//! Every message on the wire begins with a `u32` [`MessageKind`] tag.
//! Server-to-client messages carry a `world_index` field (the server tic at
//! transmission) so receivers can order state by tic independently of
//! transport arrival order. All integers are little-endian and fixed width;
//! marshalled structs contain no padding beyond what is documented here.

/// Used only by macros. Not public API.
#[doc(hidden)]
pub mod __private {
    pub use anyhow::{anyhow, bail, ensure, Context, Result};

    pub use crate::{Decode, Encode, Message};
}

// This allows us to use our own derive macros internally.
extern crate self as ichor_protocol;

mod bounded;
pub mod frame;
mod impls;
mod kind;
pub mod math;
pub mod messages;
pub mod types;

use std::io::Write;

pub use bounded::Bounded;
pub use frame::MessageFrame;
pub use ichor_protocol_macros::{Decode, Encode, Message};
pub use kind::MessageKind;
pub use math::{Angle, Fixed};
pub use {anyhow, bytes};

/// The maximum number of bytes in a single marshalled message, including the
/// leading kind tag. Game state snapshots are the only messages that come
/// anywhere near this.
pub const MAX_MESSAGE_SIZE: usize = 2097152;

/// The protocol version this library currently targets. Bumped on any wire
/// change; peers with mismatched versions refuse to talk.
pub const PROTOCOL_VERSION: u32 = 2;

/// The maximum byte length of a chat/auth/rcon message string, including the
/// NUL terminator.
pub const MAX_STRING_SIZE: usize = 256;

/// The number of connectable clients. The server's client table carries one
/// extra slot (index 0) for its own pseudo-spectator; player numbers on the
/// wire are `1..=MAX_CLIENTS`.
pub const MAX_CLIENTS: usize = 16;

/// Number of transport channels. Channel 0 is reliable-ordered, channel 1 is
/// unreliable-unsequenced.
pub const MAX_CHANNELS: usize = 2;

/// The reliable-ordered transport channel.
pub const RELIABLE_CHANNEL: u8 = 0;

/// The unreliable-unsequenced transport channel.
pub const UNRELIABLE_CHANNEL: u8 = 1;

/// The `Encode` trait allows objects to be written to the wire. It is the
/// inverse of [`Decode`].
///
/// # Deriving
///
/// This trait can be implemented automatically for structs and enums by using
/// the [`Encode`][macro] derive macro. All components of the type must
/// implement `Encode`. Components are encoded in the order they appear in the
/// type definition.
///
/// For enums, the variant to encode is marked by a leading `u8` tag. Tag
/// values are assigned to variants using the rules of regular enum
/// discriminants: explicit `Variant = n` sets the tag, later variants count
/// up from there.
///
/// [macro]: ichor_protocol_macros::Encode
pub trait Encode {
    /// Writes this object to the provided writer.
    ///
    /// If this type also implements [`Decode`] then successful calls to this
    /// function returning `Ok(())` must always successfully [`decode`] using
    /// the data that was written to the writer. The exact number of bytes
    /// that were originally written must be consumed during the decoding.
    ///
    /// [`decode`]: Decode::decode
    fn encode(&self, w: impl Write) -> anyhow::Result<()>;

    /// Like [`Encode::encode`], except that a whole slice of values is
    /// encoded with no leading length prefix.
    ///
    /// This is important for `u8` slices, which can be written in a single
    /// call. Stable Rust has no impl specialization, so the slice
    /// specialization is part of the trait.
    fn encode_slice(slice: &[Self], mut w: impl Write) -> anyhow::Result<()>
    where
        Self: Sized,
    {
        for value in slice {
            value.encode(&mut w)?;
        }

        Ok(())
    }
}

/// The `Decode` trait allows objects to be read from the wire. It is the
/// inverse of [`Encode`].
///
/// `Decode` is parameterized by a lifetime. This allows the decoded value to
/// borrow data from the byte slice it was read from.
pub trait Decode<'a>: Sized {
    /// Reads this object from the provided byte slice.
    ///
    /// Implementations of `Decode` are expected to shrink the slice from the
    /// front as bytes are read.
    fn decode(r: &mut &'a [u8]) -> anyhow::Result<Self>;
}

/// Types that are complete wire messages.
///
/// In serialized form, a message begins with a `u32` [`MessageKind`] followed
/// by the body. The implementations of [`Encode`] and [`Decode`] on `Self`
/// are expected to only encode/decode the _body_ of the message without the
/// leading kind tag.
pub trait Message: std::fmt::Debug {
    /// The leading kind tag of this message.
    const KIND: MessageKind;
    /// The name of this message for logging purposes.
    const NAME: &'static str;
    /// The side(s) allowed to send this message.
    const SIDE: MessageSide;

    /// Encodes this message's kind tag first, followed by the message body.
    fn encode_with_kind(&self, mut w: impl Write) -> anyhow::Result<()>
    where
        Self: Encode,
    {
        use anyhow::Context;

        (Self::KIND as u32)
            .encode(&mut w)
            .context("failed to encode message kind")?;

        self.encode(w)
    }
}

/// The side a message is allowed to originate from. An inbound message whose
/// kind is not sendable by the sending side is a protocol violation.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MessageSide {
    /// Server -> client only.
    Clientbound,
    /// Client -> server only.
    Serverbound,
    /// Both directions (chat relay and player info updates).
    Both,
}

impl MessageSide {
    /// Whether a client is permitted to send messages of this side.
    pub fn sendable_by_client(self) -> bool {
        matches!(self, Self::Serverbound | Self::Both)
    }
}
