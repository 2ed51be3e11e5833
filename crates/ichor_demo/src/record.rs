//! The recording side.

use std::fs::{self, File};
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use ichor_protocol::types::PlayerCommand;
use ichor_protocol::Bounded;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::info;

use crate::archive::pack_archive;
use crate::format::{
    write_header, Checkpoint, DemoFrame, DemoHeader, DemoInfo, DemoResource, MapInfoJson,
    TableOfContents,
};
use crate::DemoError;

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]_[hour][minute][second]");

/// An in-progress recording. One map directory is open at a time; closing
/// the recorder bundles the tree into the `.ecd` archive.
pub struct DemoRecorder {
    root: PathBuf,
    timestamp_name: String,
    info: DemoInfo,
    header_template: DemoHeader,
    resources: Vec<DemoResource>,
    current: Option<OpenMap>,
    map_index: u32,
}

struct OpenMap {
    dir: PathBuf,
    data: BufWriter<File>,
    toc: TableOfContents,
    frames_written: u32,
    map_name: String,
}

impl DemoRecorder {
    /// Creates the staging directory and opens the first map.
    pub fn start(
        folder: &Path,
        author: &str,
        mut header: DemoHeader,
        resources: Vec<DemoResource>,
        first_map_name: &str,
    ) -> Result<Self, DemoError> {
        if folder.as_os_str().is_empty() {
            return Err(DemoError::FolderNotDefined);
        }

        let now = OffsetDateTime::from_unix_timestamp(header.timestamp as i64)
            .map_err(|e| DemoError::Malformed(e.to_string()))?;
        let timestamp_name = now
            .format(TIMESTAMP_FORMAT)
            .map_err(|e| DemoError::Malformed(e.to_string()))?;

        let root = folder.join(&timestamp_name);
        if root.exists() {
            return Err(DemoError::AlreadyExists(root.display().to_string()));
        }

        fs::create_dir_all(&root).map_err(|e| DemoError::io(&root, e))?;

        header.resource_count = resources.len() as u32;

        let info = DemoInfo {
            version: header.version,
            subversion: header.subversion,
            protocol_version: header.protocol_version,
            demo_type: header.demo_type,
            author: author.to_owned(),
            date: timestamp_name.clone(),
            map_count: 0,
        };

        let mut recorder = Self {
            root,
            timestamp_name,
            info,
            header_template: header,
            resources,
            current: None,
            map_index: 0,
        };

        recorder.write_info()?;
        recorder.open_map(first_map_name)?;

        info!(demo = %recorder.root.display(), "demo recording started");
        Ok(recorder)
    }

    pub fn timestamp_name(&self) -> &str {
        &self.timestamp_name
    }

    fn write_info(&self) -> Result<(), DemoError> {
        let path = self.root.join("info.json");
        let text = serde_json::to_string_pretty(&self.info)?;
        fs::write(&path, text).map_err(|e| DemoError::io(&path, e))
    }

    fn open_map(&mut self, map_name: &str) -> Result<(), DemoError> {
        let dir = self.root.join(self.map_index.to_string());
        fs::create_dir_all(&dir).map_err(|e| DemoError::io(&dir, e))?;

        let mut header = self.header_template.clone();
        header.map_name = Bounded(map_name.to_owned());
        header.length = 0;

        let data_path = dir.join("demodata.bin");
        let file = File::create(&data_path).map_err(|e| DemoError::io(&data_path, e))?;
        let mut data = BufWriter::new(file);

        write_header(&header, &self.resources, &mut data)
            .map_err(|e| DemoError::Codec(e.to_string()))?;

        let map_info = MapInfoJson {
            map_name: map_name.to_owned(),
            settings: header.settings.clone(),
            length: 0,
        };
        let info_path = dir.join("info.json");
        fs::write(&info_path, serde_json::to_string_pretty(&map_info)?)
            .map_err(|e| DemoError::io(&info_path, e))?;

        self.current = Some(OpenMap {
            dir,
            data,
            toc: TableOfContents::default(),
            frames_written: 0,
            map_name: map_name.to_owned(),
        });

        Ok(())
    }

    fn current(&mut self) -> Result<&mut OpenMap, DemoError> {
        self.current
            .as_mut()
            .ok_or_else(|| DemoError::Malformed(String::from("no open map")))
    }

    fn write_frame(&mut self, frame: &DemoFrame) -> Result<(), DemoError> {
        let map = self.current()?;

        frame
            .write(&mut map.data)
            .map_err(|e| DemoError::Codec(e.to_string()))?;
        map.frames_written += 1;

        Ok(())
    }

    /// Records an inbound packet. Must be called before the packet is
    /// dispatched so playback observes the pre-dispatch order.
    pub fn write_network_message(
        &mut self,
        player_number: i32,
        data: &[u8],
    ) -> Result<(), DemoError> {
        self.write_frame(&DemoFrame::NetworkMessage {
            player_number,
            data: data.to_vec(),
        })
    }

    pub fn write_player_command(&mut self, command: PlayerCommand) -> Result<(), DemoError> {
        self.write_frame(&DemoFrame::PlayerCommand(command))
    }

    pub fn write_console_command(
        &mut self,
        command_type: i32,
        source: i32,
        name: &str,
        options: &str,
    ) -> Result<(), DemoError> {
        self.write_frame(&DemoFrame::ConsoleCommand {
            command_type,
            source,
            name: name.to_owned(),
            options: options.to_owned(),
        })
    }

    /// Appends an optional human-readable line to the map's event log.
    pub fn log_event(&mut self, line: &str) -> Result<(), DemoError> {
        let map = self.current()?;
        let path = map.dir.join("log.txt");

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| DemoError::io(&path, e))?;
        writeln!(file, "{line}").map_err(|e| DemoError::io(&path, e))
    }

    /// Flushes the stream, records its offset in the table of contents, and
    /// writes the save state plus screenshot beside it.
    pub fn add_checkpoint(
        &mut self,
        world_index: u32,
        save_state: &[u8],
        screenshot_png: &[u8],
    ) -> Result<(), DemoError> {
        let map = self.current()?;

        map.data
            .flush()
            .map_err(|e| DemoError::io(&map.dir, e))?;
        let byte_index = map
            .data
            .get_mut()
            .stream_position()
            .map_err(|e| DemoError::io(&map.dir, e))?;

        let index = map.toc.checkpoints.len() as u32;
        let data_file = format!("save{index}.sav");
        let screenshot_file = format!("save{index}.png");

        let save_path = map.dir.join(&data_file);
        fs::write(&save_path, save_state).map_err(|e| DemoError::io(&save_path, e))?;

        let shot_path = map.dir.join(&screenshot_file);
        fs::write(&shot_path, screenshot_png).map_err(|e| DemoError::io(&shot_path, e))?;

        map.toc.checkpoints.push(Checkpoint {
            byte_index,
            index,
            world_index,
            data_file,
            screenshot_file,
        });

        let toc_path = map.dir.join("toc.json");
        fs::write(&toc_path, serde_json::to_string_pretty(&map.toc)?)
            .map_err(|e| DemoError::io(&toc_path, e))?;

        Ok(())
    }

    /// Closes the current map directory and opens the next.
    pub fn new_map(&mut self, map_name: &str) -> Result<(), DemoError> {
        self.close_current_map()?;
        self.map_index += 1;
        self.open_map(map_name)
    }

    fn close_current_map(&mut self) -> Result<(), DemoError> {
        let Some(mut map) = self.current.take() else {
            return Ok(());
        };

        map.data
            .flush()
            .map_err(|e| DemoError::io(&map.dir, e))?;

        // Rewrite the per-map info with the final frame count.
        let map_info = MapInfoJson {
            map_name: map.map_name.clone(),
            settings: self.header_template.settings.clone(),
            length: map.frames_written,
        };
        let info_path = map.dir.join("info.json");
        fs::write(&info_path, serde_json::to_string_pretty(&map_info)?)
            .map_err(|e| DemoError::io(&info_path, e))?;

        Ok(())
    }

    /// Finishes the recording: closes the open map, rewrites the top-level
    /// info, and bundles everything into `{folder}/{timestamp}.ecd`.
    pub fn finish(mut self) -> Result<PathBuf, DemoError> {
        self.close_current_map()?;

        self.info.map_count = self.map_index + 1;
        self.write_info()?;

        let parent = self
            .root
            .parent()
            .ok_or(DemoError::FolderNotDefined)?
            .to_path_buf();
        let archive_path = parent.join(format!("{}.{}", self.timestamp_name, crate::ARCHIVE_EXTENSION));

        pack_archive(&self.root, &archive_path)?;
        fs::remove_dir_all(&self.root).map_err(|e| DemoError::io(&self.root, e))?;

        info!(archive = %archive_path.display(), "demo recording finished");
        Ok(archive_path)
    }
}
