//! The playback side.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::archive::unpack_archive;
use crate::format::{
    read_header, DemoFrame, DemoHeader, DemoInfo, DemoResource, TableOfContents,
};
use crate::DemoError;

/// A demo opened for playback. Frames are pulled sequentially and reinjected
/// into the same handlers that consumed them live.
pub struct DemoReader {
    root: PathBuf,
    info: DemoInfo,
    map_index: u32,
    map: Option<OpenMap>,
}

struct OpenMap {
    header: DemoHeader,
    resources: Vec<DemoResource>,
    toc: TableOfContents,
    data: Vec<u8>,
    /// Offset of the first frame (just past the header block).
    body_start: usize,
    cursor: usize,
}

impl DemoReader {
    /// Unpacks a `.ecd` archive into `work_dir` and opens its first map.
    pub fn open(archive_path: &Path, work_dir: &Path) -> Result<Self, DemoError> {
        if !archive_path.is_file() {
            return Err(DemoError::NotFound(archive_path.display().to_string()));
        }

        let root = unpack_archive(archive_path, work_dir)?;

        let info_path = root.join("info.json");
        let info: DemoInfo = serde_json::from_str(
            &fs::read_to_string(&info_path).map_err(|e| DemoError::io(&info_path, e))?,
        )?;

        let mut reader = Self {
            root,
            info,
            map_index: 0,
            map: None,
        };

        reader.load_map(0)?;
        info!(demo = %archive_path.display(), "demo opened for playback");
        Ok(reader)
    }

    pub fn info(&self) -> &DemoInfo {
        &self.info
    }

    pub fn map_index(&self) -> u32 {
        self.map_index
    }

    pub fn header(&self) -> Option<&DemoHeader> {
        self.map.as_ref().map(|m| &m.header)
    }

    /// The `{name, sha1}` pairs recorded in the current map's header, for
    /// cross-checking against local resources before playback starts.
    pub fn resources(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().flat_map(|m| {
            m.resources
                .iter()
                .map(|r| (r.name.as_str(), r.sha1.as_str()))
        })
    }

    pub fn table_of_contents(&self) -> Option<&TableOfContents> {
        self.map.as_ref().map(|m| &m.toc)
    }

    /// Loads map `index` from the archive and resets the frame cursor.
    pub fn load_map(&mut self, index: u32) -> Result<(), DemoError> {
        let dir = self.root.join(index.to_string());

        if !dir.is_dir() {
            return Err(DemoError::Malformed(format!(
                "demo has no map directory {index}"
            )));
        }

        let data_path = dir.join("demodata.bin");
        let data = fs::read(&data_path).map_err(|e| DemoError::io(&data_path, e))?;

        let mut r = &data[..];
        let (header, resources) =
            read_header(&mut r).map_err(|e| DemoError::Malformed(e.to_string()))?;
        let body_start = data.len() - r.len();

        let toc_path = dir.join("toc.json");
        let toc = if toc_path.is_file() {
            serde_json::from_str(
                &fs::read_to_string(&toc_path).map_err(|e| DemoError::io(&toc_path, e))?,
            )?
        } else {
            TableOfContents::default()
        };

        self.map_index = index;
        self.map = Some(OpenMap {
            header,
            resources,
            toc,
            data,
            body_start,
            cursor: body_start,
        });

        Ok(())
    }

    pub fn load_next_map(&mut self) -> Result<(), DemoError> {
        if self.map_index + 1 >= self.info.map_count {
            return Err(DemoError::Malformed(String::from("no next map")));
        }
        self.load_map(self.map_index + 1)
    }

    pub fn load_previous_map(&mut self) -> Result<(), DemoError> {
        if self.map_index == 0 {
            return Err(DemoError::Malformed(String::from("no previous map")));
        }
        self.load_map(self.map_index - 1)
    }

    /// The next frame of the current map, or `None` at end of stream.
    pub fn next_frame(&mut self) -> Result<Option<DemoFrame>, DemoError> {
        let Some(map) = self.map.as_mut() else {
            return Ok(None);
        };

        let mut r = &map.data[map.cursor..];
        let frame = DemoFrame::read(&mut r).map_err(|e| DemoError::Codec(e.to_string()))?;
        map.cursor = map.data.len() - r.len();

        Ok(frame)
    }

    /// True when the current map's stream is exhausted.
    pub fn finished(&self) -> bool {
        self.map
            .as_ref()
            .map_or(true, |m| m.cursor >= m.data.len())
    }

    /// Positions the cursor at a checkpoint's byte offset. The caller is
    /// expected to load the matching save state first.
    pub fn seek(&mut self, byte_index: u64) -> Result<(), DemoError> {
        let Some(map) = self.map.as_mut() else {
            return Err(DemoError::Malformed(String::from("no open map")));
        };

        let offset = byte_index as usize;
        if offset < map.body_start || offset > map.data.len() {
            return Err(DemoError::Malformed(format!(
                "seek offset {offset} outside demo body"
            )));
        }

        map.cursor = offset;
        Ok(())
    }

    /// Reads the save state bytes for a checkpoint of the current map.
    pub fn checkpoint_state(&self, data_file: &str) -> Result<Vec<u8>, DemoError> {
        let dir = self.root.join(self.map_index.to_string());
        let path = dir.join(data_file);
        fs::read(&path).map_err(|e| DemoError::io(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use ichor_protocol::types::{ClientOptions, PlayerCommand, Settings};
    use ichor_protocol::Bounded;

    use super::*;
    use crate::format::DemoType;
    use crate::record::DemoRecorder;

    fn header() -> DemoHeader {
        DemoHeader {
            version: 4,
            subversion: 0,
            protocol_version: ichor_protocol::PROTOCOL_VERSION,
            demo_type: DemoType::Server,
            settings: Settings::default(),
            local_options: ClientOptions::default(),
            timestamp: 1_754_000_000,
            length: 0,
            map_name: Bounded(String::from("MAP01")),
            resource_count: 0,
            console_player: 0,
        }
    }

    fn resources() -> Vec<DemoResource> {
        vec![DemoResource {
            name: String::from("DOOM2.WAD"),
            resource_type: 0,
            sha1: String::from("a9993e364706816aba3e25717850c26c9cd0d89d"),
        }]
    }

    #[test]
    fn record_then_replay_round_trips() {
        let dir = tempfile::tempdir().unwrap();

        let mut recorder =
            DemoRecorder::start(dir.path(), "server", header(), resources(), "MAP01").unwrap();

        recorder.write_network_message(2, &[1, 2, 3]).unwrap();
        recorder
            .write_player_command(PlayerCommand {
                index: 7,
                world_index: 40,
                ..Default::default()
            })
            .unwrap();
        recorder
            .add_checkpoint(40, b"savestate", b"not really a png")
            .unwrap();
        recorder.write_network_message(2, &[4, 5]).unwrap();

        recorder.new_map("MAP02").unwrap();
        recorder.write_console_command(0, 0, "map", "2").unwrap();

        let archive = recorder.finish().unwrap();
        assert!(archive.extension().is_some_and(|e| e == "ecd"));

        let work = tempfile::tempdir().unwrap();
        let mut reader = DemoReader::open(&archive, work.path()).unwrap();

        assert_eq!(reader.info().map_count, 2);
        assert_eq!(reader.info().protocol_version, ichor_protocol::PROTOCOL_VERSION);
        assert_eq!(
            reader.resources().collect::<Vec<_>>(),
            vec![("DOOM2.WAD", "a9993e364706816aba3e25717850c26c9cd0d89d")]
        );

        // Map 0 frames in order.
        assert_eq!(
            reader.next_frame().unwrap().unwrap(),
            DemoFrame::NetworkMessage {
                player_number: 2,
                data: vec![1, 2, 3]
            }
        );
        let Some(DemoFrame::PlayerCommand(cmd)) = reader.next_frame().unwrap() else {
            panic!("expected a player command frame");
        };
        assert_eq!(cmd.index, 7);
        assert_eq!(
            reader.next_frame().unwrap().unwrap(),
            DemoFrame::NetworkMessage {
                player_number: 2,
                data: vec![4, 5]
            }
        );
        assert_eq!(reader.next_frame().unwrap(), None);
        assert!(reader.finished());

        // The checkpoint is indexed and its save state is readable.
        let toc = reader.table_of_contents().unwrap().clone();
        assert_eq!(toc.checkpoints.len(), 1);
        let checkpoint = &toc.checkpoints[0];
        assert_eq!(checkpoint.world_index, 40);
        assert_eq!(
            reader.checkpoint_state(&checkpoint.data_file).unwrap(),
            b"savestate"
        );

        // Rewind: seek back to the checkpoint and replay forward.
        reader.seek(checkpoint.byte_index).unwrap();
        assert_eq!(
            reader.next_frame().unwrap().unwrap(),
            DemoFrame::NetworkMessage {
                player_number: 2,
                data: vec![4, 5]
            }
        );

        // Second map.
        reader.load_next_map().unwrap();
        assert_eq!(reader.header().unwrap().map_name.0, "MAP02");
        assert_eq!(
            reader.next_frame().unwrap().unwrap(),
            DemoFrame::ConsoleCommand {
                command_type: 0,
                source: 0,
                name: String::from("map"),
                options: String::from("2"),
            }
        );
        assert!(reader.load_next_map().is_err());
    }

    #[test]
    fn missing_archive_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DemoReader::open(&dir.path().join("nope.ecd"), dir.path()),
            Err(DemoError::NotFound(_))
        ));
    }
}
