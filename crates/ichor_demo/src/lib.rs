//! Demo recording and playback.
//!
//! A demo is a directory tree archived into a `.ecd` zip when closed:
//!
//! ```text
//! {timestamp}/
//!   info.json                  top-level metadata (versions, author, date)
//!   {map_index}/
//!     demodata.bin             header + packet/command/console stream
//!     info.json                per-map settings snapshot
//!     toc.json                 checkpoint index
//!     save{idx}.sav            checkpoint save state
//!     save{idx}.png            checkpoint screenshot
//! ```
//!
//! Recording writes every inbound packet into the stream *before* it is
//! dispatched, so playback reinjects the identical byte sequence through the
//! same handlers. That model assumes bit-identical simulation behavior,
//! which holds within one build.

mod archive;
mod format;
mod playback;
mod record;

use thiserror::Error;

pub use archive::{pack_archive, unpack_archive, ARCHIVE_EXTENSION};
pub use format::{
    Checkpoint, DemoFrame, DemoHeader, DemoInfo, DemoResource, DemoType, MapInfoJson,
    TableOfContents, DEMO_FORMAT_VERSION,
};
pub use playback::DemoReader;
pub use record::DemoRecorder;

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("demo I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("demo folder is not defined")]
    FolderNotDefined,
    #[error("demo already exists: {0}")]
    AlreadyExists(String),
    #[error("demo not found: {0}")]
    NotFound(String),
    #[error("malformed demo structure: {0}")]
    Malformed(String),
    #[error("unknown demo packet type {0}")]
    UnknownPacketType(u8),
    #[error("demo resource mismatch: {0}")]
    ResourceMismatch(String),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("{0}")]
    Codec(String),
}

impl DemoError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
