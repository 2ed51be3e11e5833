//! # Ichor
//!
//! A framework for building authoritative client/server cores for
//! Doom-family games in Rust.
//!
//! One server holds the truth: it simulates the world at a fixed 35 Hz tic
//! rate, buffers client inputs against jitter, rewinds other players for
//! lag-compensated hit detection, and streams typed messages to every
//! client over a dual-channel (reliable-ordered + unsequenced) transport.
//! Sessions can be recorded wholesale into demo archives and replayed
//! byte-for-byte.
//!
//! The crates:
//! - [`protocol`]: the wire codec and the full message taxonomy.
//! - [`network`]: the transport.
//! - [`game`]: the deterministic world model.
//! - [`config`]: the server JSON document, resources, and access lists.
//! - [`server`]: the tic loop and everything it owns.
//! - [`demo`]: recording, playback, and checkpointing.

pub use ichor_config as config;
pub use ichor_demo as demo;
pub use ichor_game as game;
pub use ichor_network as network;
pub use ichor_protocol as protocol;
pub use ichor_server as server;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use ichor_config::{AccessList, ResourceStore, ServerConfig};
    pub use ichor_demo::{DemoReader, DemoRecorder};
    pub use ichor_game::{MapInfo, World, MAX_POSITIONS, TICRATE};
    pub use ichor_network::{Event, Host, SendMode};
    pub use ichor_protocol::{
        Bounded, Decode, Encode, Message, MessageFrame, MessageKind, MessageSide, MAX_CLIENTS,
    };
    pub use ichor_server::Server;
}
