//! Record tap.
//!
//! Every encoded request and response can be appended to a text log for
//! offline diagnostics and replay. One record per line:
//!
//! ```text
//! 2024-05-01.12:00:00.123456|>|42|5352010108000000...
//! ```
//!
//! The fields are the local timestamp, the direction (`>` request, `<`
//! response), the correlation id and the frame bytes in hex. Lines starting
//! with `#` are comments.

use crate::error::{Result, SairedisError};
use crate::proto::CorrelationId;
use chrono::{Local, NaiveDateTime};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d.%H:%M:%S%.6f";

/// Direction of a recorded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    pub const fn symbol(self) -> char {
        match self {
            Direction::Request => '>',
            Direction::Response => '<',
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            ">" => Some(Direction::Request),
            "<" => Some(Direction::Response),
            _ => None,
        }
    }
}

/// One parsed record line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub timestamp: NaiveDateTime,
    pub direction: Direction,
    pub correlation_id: CorrelationId,
    pub frame: Vec<u8>,
}

/// Append-only record log writer.
#[derive(Debug)]
pub struct Recorder {
    path: PathBuf,
    file: File,
    rotate: AtomicBool,
}

impl Recorder {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = Self::open_file(&path)?;
        let mut recorder = Self {
            path,
            file,
            rotate: AtomicBool::new(false),
        };
        recorder.write_banner()?;
        info!(path = %recorder.path.display(), "recording enabled");
        Ok(recorder)
    }

    fn open_file(path: &Path) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(SairedisError::Io)
    }

    fn write_banner(&mut self) -> Result<()> {
        writeln!(self.file, "#|recording on: {}", self.path.display())?;
        self.file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Asks for the file to be reopened before the next record, after an
    /// external rotation moved it away.
    pub fn request_log_rotate(&self) {
        self.rotate.store(true, Ordering::Release);
    }

    fn reopen_if_requested(&mut self) -> Result<()> {
        if self.rotate.swap(false, Ordering::AcqRel) {
            self.file = Self::open_file(&self.path)?;
            self.write_banner()?;
            info!(path = %self.path.display(), "record log reopened");
        }
        Ok(())
    }

    /// Appends one record and flushes it.
    pub fn record(&mut self, direction: Direction, id: CorrelationId, frame: &[u8]) -> Result<()> {
        self.reopen_if_requested()?;
        writeln!(
            self.file,
            "{}|{}|{}|{}",
            Local::now().format(TIMESTAMP_FORMAT),
            direction.symbol(),
            id,
            hex::encode(frame)
        )?;
        self.file.flush()?;
        Ok(())
    }

    /// Appends a comment line.
    pub fn comment(&mut self, text: &str) -> Result<()> {
        self.reopen_if_requested()?;
        writeln!(self.file, "#|{text}")?;
        self.file.flush()?;
        Ok(())
    }
}

/// Parses one line; `None` for comments and blank lines.
pub fn parse_record_line(line: &str, line_no: usize) -> Result<Option<RecordEntry>> {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let bad = |reason: String| SairedisError::Record {
        line: line_no,
        reason,
    };

    let mut fields = line.splitn(4, '|');
    let (Some(ts), Some(dir), Some(id), Some(data)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(bad("expected 4 fields".to_string()));
    };

    let timestamp = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
        .map_err(|e| bad(format!("timestamp {ts:?}: {e}")))?;
    let direction = Direction::from_symbol(dir).ok_or_else(|| bad(format!("direction {dir:?}")))?;
    let correlation_id = id
        .parse()
        .map_err(|e| bad(format!("correlation id {id:?}: {e}")))?;
    let frame = hex::decode(data).map_err(|e| bad(format!("frame: {e}")))?;

    Ok(Some(RecordEntry {
        timestamp,
        direction,
        correlation_id,
        frame,
    }))
}

/// Reads a whole record log.
pub struct RecordReader;

impl RecordReader {
    pub fn read(path: impl AsRef<Path>) -> Result<Vec<RecordEntry>> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parses records from any buffered reader. Malformed lines fail the read.
    pub fn from_reader(reader: impl BufRead) -> Result<Vec<RecordEntry>> {
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if let Some(entry) = parse_record_line(&line, index + 1)? {
                entries.push(entry);
            }
        }
        if entries.is_empty() {
            warn!("record log holds no records");
        }
        Ok(entries)
    }
}
