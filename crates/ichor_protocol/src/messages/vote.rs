//! Voting messages.

use crate::{Bounded, Decode, Encode, Message, MessageKind, MessageSide, MAX_STRING_SIZE};

/// Announces a new vote to every client.
#[derive(Clone, PartialEq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::Vote, side = MessageSide::Clientbound)]
pub struct VoteS2c {
    pub world_index: u32,
    pub command: Bounded<String, MAX_STRING_SIZE>,
    /// Seconds until the vote expires.
    pub duration: u32,
    /// Fraction of eligible players required to pass.
    pub threshold: f64,
    pub max_votes: u32,
}

#[derive(Copy, Clone, PartialEq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::VoteResult, side = MessageSide::Clientbound)]
pub struct VoteResultS2c {
    pub world_index: u32,
    pub passed: bool,
}

/// A client proposing a vote. The command text must match the closed set of
/// votable commands.
#[derive(Clone, PartialEq, Debug, Encode, Decode, Message)]
#[message(kind = MessageKind::VoteRequest, side = MessageSide::Serverbound)]
pub struct VoteRequestC2s {
    pub command: Bounded<String, MAX_STRING_SIZE>,
}
