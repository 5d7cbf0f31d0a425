//! dump sink: persists raw stream events into per-file outputs
//!
//! layout: each binlog file starts with the 4-byte magic followed by
//! raw event bodies; a `<name>.next` sidecar names the successor and
//! the bare `.next` marker points to the first file of the chain
use crate::error::{Error, Result};
use bytes::Bytes;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tailbin_core::binlog::{Event, EventHeaderFlags, BINLOG_MAGIC};

#[derive(Debug)]
pub struct DumpSink {
    dir: PathBuf,
    current: Option<CurrentFile>,
}

#[derive(Debug)]
struct CurrentFile {
    name: String,
    file: File,
    pos: u64,
}

impl DumpSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(DumpSink { dir, current: None })
    }

    /// route one decoded event and its raw bytes
    ///
    /// rotate switches files; a format description arriving mid-file
    /// (resume at a non-4 offset) is dropped; heartbeats carry no
    /// persistent payload
    pub fn apply(&mut self, event: &Event, raw: &Bytes) -> Result<()> {
        match event {
            Event::Rotate(e) => {
                let artificial = e.header.timestamp == 0
                    || e.header.flags.contains(EventHeaderFlags::ARTIFICIAL);
                if !artificial && self.current.is_some() {
                    self.append(raw)?;
                }
                self.rotate(&e.data.filename()?)
            }
            Event::FormatDescription(_) => match &self.current {
                Some(cur) if cur.pos == 4 => self.append(raw),
                Some(cur) => {
                    log::debug!(
                        "dropping mid-file format description: file={}, pos={}",
                        cur.name,
                        cur.pos
                    );
                    Ok(())
                }
                None => Err(Error::Protocol(
                    "stream did not begin with a rotate event".to_owned(),
                )),
            },
            Event::Heartbeat(_) => Ok(()),
            _ => self.append(raw),
        }
    }

    fn append(&mut self, raw: &[u8]) -> Result<()> {
        let cur = self.current.as_mut().ok_or_else(|| {
            Error::Protocol("stream did not begin with a rotate event".to_owned())
        })?;
        cur.file.write_all(raw)?;
        cur.pos += raw.len() as u64;
        Ok(())
    }

    /// close the current file, write its successor sidecar and open
    /// the named file, creating it magic-prefixed when new
    fn rotate(&mut self, name: &str) -> Result<()> {
        match self.current.take() {
            Some(cur) => {
                if cur.name != name {
                    fs::write(self.dir.join(format!("{}.next", cur.name)), name)?;
                }
            }
            None => {
                // bootstrap marker for the first file of the chain
                let marker = self.dir.join(".next");
                if !marker.exists() {
                    fs::write(marker, name)?;
                }
            }
        }
        let path = self.dir.join(name);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut pos = file.metadata()?.len();
        if pos == 0 {
            file.write_all(&BINLOG_MAGIC)?;
            pos = 4;
        }
        self.current = Some(CurrentFile {
            name: name.to_owned(),
            file,
            pos,
        });
        Ok(())
    }

    /// name and write position of the file currently being appended
    pub fn position(&self) -> Option<(&str, u64)> {
        self.current.as_ref().map(|c| (c.name.as_str(), c.pos))
    }
}
