//! local directory twin of the replication stream: reads the
//! persisted layout written by the dump sink
use crate::binlog::{activate_rows, ActiveRows, MasterStatus};
use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;
use tailbin_core::binlog::{ChecksumMode, Event, EventReader, LogRow, BINLOG_MAGIC};

const TAIL_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// blocking reader over a directory of persisted binlog files,
/// following the `.next` sidecar chain
#[derive(Debug)]
pub struct LocalBinlog {
    dir: PathBuf,
    // convert end of chain into polling instead of end of stream
    blocking: bool,
    reader: EventReader,
    file: Option<CurrentFile>,
    rows: Option<ActiveRows>,
}

#[derive(Debug)]
struct CurrentFile {
    name: String,
    file: File,
    offset: u64,
}

impl LocalBinlog {
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("binlog directory {:?} not found", dir),
            )));
        }
        Ok(LocalBinlog {
            dir,
            blocking: false,
            reader: EventReader::new(ChecksumMode::Auto),
            file: None,
            rows: None,
        })
    }

    /// wait for new data at the end of the chain instead of
    /// reporting end of stream
    pub fn tail(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// files of the chain, bootstrap marker first
    pub fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut name = self.marker(".next")?.ok_or_else(|| {
            Error::Protocol(format!("no bootstrap marker in {:?}", self.dir))
        })?;
        loop {
            let next = self.marker(&format!("{}.next", name))?;
            files.push(name);
            match next {
                Some(next) => name = next,
                None => break,
            }
        }
        Ok(files)
    }

    /// last file of the chain and its current length
    pub fn master_status(&self) -> Result<MasterStatus> {
        let files = self.list_files()?;
        // list_files never returns an empty chain
        let file = files.last().cloned().unwrap_or_default();
        let position = fs::metadata(self.dir.join(&file))?.len();
        Ok(MasterStatus { file, position })
    }

    /// position the stream at a byte offset of a chain file
    ///
    /// the format description at the head of the file is always
    /// consumed first so the checksum width is known
    pub fn seek(&mut self, name: &str, pos: u64) -> Result<()> {
        self.open_file(name)?;
        self.rows = None;
        self.reader = EventReader::new(ChecksumMode::Auto);
        self.reader.set_position(name, pos.max(4));
        if pos > 4 {
            // learn the checksum width, do not surface the event
            self.read_one()?;
            let cur = self.file.as_mut().ok_or(Error::ConnectionClosed)?;
            if cur.offset < pos {
                cur.file.seek(SeekFrom::Start(pos))?;
                cur.offset = pos;
            }
        }
        Ok(())
    }

    /// next event; `None` is the end of a non-blocking stream
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        if self.file.is_none() {
            let first = self.marker(".next")?.ok_or_else(|| {
                Error::Protocol(format!("no bootstrap marker in {:?}", self.dir))
            })?;
            self.seek(&first, 4)?;
        }
        loop {
            if let Some(event) = self.read_one()? {
                self.rows = activate_rows(&event);
                return Ok(Some(event));
            }
            let name = match &self.file {
                Some(cur) => cur.name.clone(),
                None => return Err(Error::ConnectionClosed),
            };
            match self.marker(&format!("{}.next", name))? {
                Some(next) => {
                    self.seek(&next, 4)?;
                }
                None if self.blocking => std::thread::sleep(TAIL_POLL_INTERVAL),
                None => return Ok(None),
            }
        }
    }

    /// pull one row pair from the rows event last returned by
    /// [LocalBinlog::next_event]
    pub fn next_row(&mut self) -> Result<Option<(LogRow, Option<LogRow>)>> {
        let (reader, rows) = (&self.reader, &mut self.rows);
        let active = match rows {
            Some(active) => active,
            None => return Ok(None),
        };
        match active.next_row(reader)? {
            Some(pair) => Ok(Some(pair)),
            None => {
                self.rows = None;
                Ok(None)
            }
        }
    }

    /// idempotent, releases the file handle
    pub fn close(&mut self) {
        self.file = None;
        self.rows = None;
    }

    fn open_file(&mut self, name: &str) -> Result<()> {
        let mut file = File::open(self.dir.join(name))?;
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if magic != BINLOG_MAGIC {
            return Err(tailbin_core::Error::MalformedPacket(format!(
                "invalid binlog magic in {}: {:02x?}",
                name, magic
            ))
            .into());
        }
        self.file = Some(CurrentFile {
            name: name.to_owned(),
            file,
            offset: 4,
        });
        Ok(())
    }

    /// read one event off the current file; `None` at a clean or
    /// partially written tail, with the offset rewound
    fn read_one(&mut self) -> Result<Option<Event>> {
        let header_len = self.reader.header_len();
        let cur = self.file.as_mut().ok_or(Error::ConnectionClosed)?;
        let mut hdr = vec![0u8; header_len];
        if !read_exact_or_rewind(&mut cur.file, &mut hdr, cur.offset)? {
            return Ok(None);
        }
        let event_len =
            u32::from_le_bytes([hdr[9], hdr[10], hdr[11], hdr[12]]) as usize;
        if event_len < header_len {
            return Err(tailbin_core::Error::MalformedPacket(format!(
                "event length {} shorter than header",
                event_len
            ))
            .into());
        }
        let mut rest = vec![0u8; event_len - header_len];
        if !read_exact_or_rewind(&mut cur.file, &mut rest, cur.offset)? {
            return Ok(None);
        }
        let mut raw = BytesMut::with_capacity(event_len);
        raw.put_slice(&hdr);
        raw.put_slice(&rest);
        let event = self.reader.read_event(&mut raw.freeze())?;
        cur.offset += event_len as u64;
        Ok(Some(event))
    }

    /// contents of a sidecar marker file, `None` when absent
    fn marker(&self, name: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.dir.join(name)) {
            Ok(s) => Ok(Some(s.trim().to_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// read exactly `buf` bytes; on a short read (a writer is mid
/// append) rewind to `rewind_to` and report false
fn read_exact_or_rewind(file: &mut File, buf: &mut [u8], rewind_to: u64) -> Result<bool> {
    let mut read = 0;
    while read < buf.len() {
        match file.read(&mut buf[read..]) {
            Ok(0) => {
                file.seek(SeekFrom::Start(rewind_to))?;
                return Ok(false);
            }
            Ok(n) => read += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}
