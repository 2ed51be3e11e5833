//! The on-disk demo format: header, frames, and metadata documents.

use ichor_protocol::types::{ClientOptions, PlayerCommand, Settings};
use ichor_protocol::{Bounded, Decode, Encode};
use serde::{Deserialize, Serialize};

/// Bumped whenever the stream layout changes.
pub const DEMO_FORMAT_VERSION: u32 = 2;

/// Frame markers. `HeaderEnd` terminates the header block; everything after
/// it is a stream of the other three.
const MARKER_HEADER_END: u8 = 0;
const MARKER_NETWORK_MESSAGE: u8 = 1;
const MARKER_PLAYER_COMMAND: u8 = 2;
const MARKER_CONSOLE_COMMAND: u8 = 3;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemoType {
    Client = 0,
    Server = 1,
}

/// The fixed header at the start of every `demodata.bin`, followed by
/// `resource_count` [`DemoResource`] records and the end-of-header marker.
#[derive(Clone, PartialEq, Debug, Encode, Decode)]
pub struct DemoHeader {
    pub version: u32,
    pub subversion: u32,
    pub protocol_version: u32,
    pub demo_type: DemoType,
    pub settings: Settings,
    pub local_options: ClientOptions,
    /// Seconds since the epoch at recording start.
    pub timestamp: u64,
    /// Total stream length in frames; zero while recording is in progress.
    pub length: u32,
    pub map_name: Bounded<String, 9>,
    pub resource_count: u32,
    pub console_player: u32,
}

#[derive(Clone, PartialEq, Eq, Debug, Encode, Decode)]
pub struct DemoResource {
    pub name: String,
    /// 0 iwad, 1 pwad, 2 deh; mirrors the resource table.
    pub resource_type: u8,
    pub sha1: String,
}

/// One frame of the demo stream.
#[derive(Clone, PartialEq, Debug)]
pub enum DemoFrame {
    /// An inbound packet, written before it was dispatched. Client demos
    /// always record player number 0.
    NetworkMessage { player_number: i32, data: Vec<u8> },
    PlayerCommand(PlayerCommand),
    ConsoleCommand {
        command_type: i32,
        source: i32,
        name: String,
        options: String,
    },
}

impl DemoFrame {
    pub(crate) fn write(&self, mut w: impl std::io::Write) -> anyhow::Result<()> {
        match self {
            Self::NetworkMessage {
                player_number,
                data,
            } => {
                MARKER_NETWORK_MESSAGE.encode(&mut w)?;
                player_number.encode(&mut w)?;
                data.encode(&mut w)?;
            }
            Self::PlayerCommand(cmd) => {
                MARKER_PLAYER_COMMAND.encode(&mut w)?;
                cmd.encode(&mut w)?;
            }
            Self::ConsoleCommand {
                command_type,
                source,
                name,
                options,
            } => {
                MARKER_CONSOLE_COMMAND.encode(&mut w)?;
                command_type.encode(&mut w)?;
                source.encode(&mut w)?;
                name.encode(&mut w)?;
                options.encode(&mut w)?;
            }
        }

        Ok(())
    }

    /// Reads the next frame, or `None` at the end of the stream.
    pub(crate) fn read(r: &mut &[u8]) -> anyhow::Result<Option<Self>> {
        if r.is_empty() {
            return Ok(None);
        }

        let marker = u8::decode(r)?;

        Ok(Some(match marker {
            MARKER_NETWORK_MESSAGE => Self::NetworkMessage {
                player_number: i32::decode(r)?,
                data: Vec::decode(r)?,
            },
            MARKER_PLAYER_COMMAND => Self::PlayerCommand(PlayerCommand::decode(r)?),
            MARKER_CONSOLE_COMMAND => Self::ConsoleCommand {
                command_type: i32::decode(r)?,
                source: i32::decode(r)?,
                name: String::decode(r)?,
                options: String::decode(r)?,
            },
            other => anyhow::bail!("unknown demo packet type {other}"),
        }))
    }
}

pub(crate) fn write_header(
    header: &DemoHeader,
    resources: &[DemoResource],
    mut w: impl std::io::Write,
) -> anyhow::Result<()> {
    header.encode(&mut w)?;

    for resource in resources {
        resource.encode(&mut w)?;
    }

    MARKER_HEADER_END.encode(&mut w)?;
    Ok(())
}

pub(crate) fn read_header(r: &mut &[u8]) -> anyhow::Result<(DemoHeader, Vec<DemoResource>)> {
    let header = DemoHeader::decode(r)?;

    let mut resources = Vec::with_capacity(header.resource_count as usize);
    for _ in 0..header.resource_count {
        resources.push(DemoResource::decode(r)?);
    }

    let marker = u8::decode(r)?;
    anyhow::ensure!(
        marker == MARKER_HEADER_END,
        "malformed demo header, demo likely corrupt"
    );

    Ok((header, resources))
}

/// `info.json` at the archive root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DemoInfo {
    pub version: u32,
    pub subversion: u32,
    pub protocol_version: u32,
    pub demo_type: DemoType,
    pub author: String,
    /// ISO-like timestamp, also the archive's top-level directory name.
    pub date: String,
    pub map_count: u32,
}

/// `info.json` inside each map directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MapInfoJson {
    pub map_name: String,
    pub settings: Settings,
    pub length: u32,
}

/// `toc.json` inside each map directory.
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct TableOfContents {
    pub checkpoints: Vec<Checkpoint>,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Offset into `demodata.bin` where playback resumes.
    pub byte_index: u64,
    pub index: u32,
    pub world_index: u32,
    pub data_file: String,
    pub screenshot_file: String,
}

impl TableOfContents {
    /// The latest checkpoint at or before `target`, for rewind.
    pub fn checkpoint_before(&self, target: u32) -> Option<&Checkpoint> {
        self.checkpoints
            .iter()
            .filter(|c| c.world_index <= target)
            .max_by_key(|c| c.world_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> DemoHeader {
        DemoHeader {
            version: 4,
            subversion: 0,
            protocol_version: ichor_protocol::PROTOCOL_VERSION,
            demo_type: DemoType::Server,
            settings: Settings::default(),
            local_options: ClientOptions::default(),
            timestamp: 1_700_000_000,
            length: 0,
            map_name: Bounded(String::from("MAP01")),
            resource_count: 1,
            console_player: 0,
        }
    }

    #[test]
    fn header_round_trips() {
        let resources = vec![DemoResource {
            name: String::from("DOOM2.WAD"),
            resource_type: 0,
            sha1: String::from("a9993e364706816aba3e25717850c26c9cd0d89d"),
        }];

        let mut buf = vec![];
        write_header(&header(), &resources, &mut buf).unwrap();

        let mut r = &buf[..];
        let (decoded, decoded_resources) = read_header(&mut r).unwrap();

        assert_eq!(decoded, header());
        assert_eq!(decoded_resources, resources);
        assert!(r.is_empty());
    }

    #[test]
    fn frames_round_trip() {
        let frames = vec![
            DemoFrame::NetworkMessage {
                player_number: 3,
                data: vec![9, 9, 9],
            },
            DemoFrame::PlayerCommand(PlayerCommand {
                index: 1,
                world_index: 2,
                forward_move: 25,
                ..Default::default()
            }),
            DemoFrame::ConsoleCommand {
                command_type: 0,
                source: 0,
                name: String::from("kick"),
                options: String::from("2 spamming"),
            },
        ];

        let mut buf = vec![];
        for frame in &frames {
            frame.write(&mut buf).unwrap();
        }

        let mut r = &buf[..];
        let mut decoded = vec![];
        while let Some(frame) = DemoFrame::read(&mut r).unwrap() {
            decoded.push(frame);
        }

        assert_eq!(decoded, frames);
    }

    #[test]
    fn truncated_header_marker_rejected() {
        let mut buf = vec![];
        write_header(&header(), &[], &mut buf).unwrap();

        // resource_count of 1 but no resource record follows: the header
        // decode consumes the end marker as a resource and fails.
        let mut r = &buf[..];
        assert!(read_header(&mut r).is_err());
    }

    #[test]
    fn checkpoint_lookup_picks_latest_at_or_before() {
        let toc = TableOfContents {
            checkpoints: vec![
                Checkpoint {
                    byte_index: 100,
                    index: 0,
                    world_index: 35,
                    data_file: String::from("save0.sav"),
                    screenshot_file: String::from("save0.png"),
                },
                Checkpoint {
                    byte_index: 900,
                    index: 1,
                    world_index: 350,
                    data_file: String::from("save1.sav"),
                    screenshot_file: String::from("save1.png"),
                },
            ],
        };

        assert_eq!(toc.checkpoint_before(34), None);
        assert_eq!(toc.checkpoint_before(35).unwrap().index, 0);
        assert_eq!(toc.checkpoint_before(349).unwrap().index, 0);
        assert_eq!(toc.checkpoint_before(9999).unwrap().index, 1);
    }
}
