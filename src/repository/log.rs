//! Append-only notification log.
//!
//! Each entry is framed as:
//!
//! ```text
//! magic (4) | version (1) | body length (u32 LE) | body (MessagePack) | crc32 of body (u32 LE)
//! ```

use crate::error::{FeedError, Result};
use crate::types::{Notification, NotificationId, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes for each log entry.
const LOG_MAGIC: &[u8; 4] = b"NTF\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Bytes ahead of an entry body (magic + version + length).
const HEADER_SIZE: usize = 4 + 1 + 4;

/// Fixed bytes around an entry body (header + checksum).
const ENTRY_OVERHEAD: usize = HEADER_SIZE + 4;

/// Largest body a single entry may carry.
const MAX_ENTRY_SIZE: usize = 16 * 1024 * 1024;

/// A single change recorded in the log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) enum LogEntry {
    /// A notification was saved for a recipient.
    Created(Notification),

    /// A notification was marked read (`Some`) or unread (`None`).
    ReadStateChanged {
        id: NotificationId,
        read_at: Option<Timestamp>,
    },
}

/// Outcome of decoding the bytes at one log position.
enum Frame {
    /// A complete, verified entry and its framed length.
    Entry(LogEntry, usize),

    /// A well-formed prefix of a frame that runs past the end of the data.
    Incomplete,
}

struct LogWriter {
    file: File,

    /// Current file size (for appending).
    file_size: u64,

    /// Number of writes since last sync.
    writes_since_sync: u64,
}

/// Append-only notification log.
pub(crate) struct NotificationLog {
    /// Path to the log file.
    path: PathBuf,

    writer: Mutex<LogWriter>,

    /// Sync every N writes.
    sync_interval: u64,
}

impl NotificationLog {
    /// Default sync interval - sync every 100 writes.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 100;

    /// Open or create a notification log with default sync interval.
    #[cfg(test)]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sync_interval(path, Self::DEFAULT_SYNC_INTERVAL)
    }

    /// Open or create a notification log with custom sync interval.
    /// - sync_interval = 0 or 1: sync every write
    /// - sync_interval = 100: sync every 100 writes
    pub fn open_with_sync_interval(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_size = file.metadata()?.len();

        Ok(Self {
            path,
            writer: Mutex::new(LogWriter {
                file,
                file_size,
                writes_since_sync: 0,
            }),
            sync_interval: sync_interval.max(1),
        })
    }

    /// Append an entry to the log.
    ///
    /// Returns the offset where it was written. If the write or its sync
    /// fails, the frame is cut back off and the log is left as it was.
    pub fn append(&self, entry: &LogEntry) -> Result<u64> {
        let body = rmp_serde::to_vec_named(entry)?;
        if body.len() > MAX_ENTRY_SIZE {
            return Err(FeedError::Serialization(format!(
                "log entry too large: {} bytes",
                body.len()
            )));
        }

        let mut frame = Vec::with_capacity(body.len() + ENTRY_OVERHEAD);
        frame.extend_from_slice(LOG_MAGIC);
        frame.push(LOG_VERSION);
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(&body);
        frame.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());

        let mut writer = self.writer.lock();
        let offset = writer.file_size;
        let sync = writer.writes_since_sync + 1 >= self.sync_interval;

        if let Err(e) = Self::write_frame(&mut writer, offset, &frame, sync) {
            if let Err(rollback) = writer.file.set_len(offset) {
                warn!(
                    path = %self.path.display(),
                    offset,
                    error = %rollback,
                    "failed to cut back partial log entry"
                );
            }
            return Err(e.into());
        }

        writer.file_size = offset + frame.len() as u64;
        writer.writes_since_sync = if sync { 0 } else { writer.writes_since_sync + 1 };

        Ok(offset)
    }

    fn write_frame(writer: &mut LogWriter, offset: u64, frame: &[u8], sync: bool) -> io::Result<()> {
        writer.file.seek(SeekFrom::Start(offset))?;
        writer.file.write_all(frame)?;
        if sync {
            writer.file.sync_all()?;
        }
        Ok(())
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.file.sync_all()?;
        writer.writes_since_sync = 0;
        Ok(())
    }

    /// Get current file size.
    pub fn size(&self) -> u64 {
        self.writer.lock().file_size
    }

    /// Read every entry from the start of the log.
    ///
    /// A torn entry at the tail (from a crash mid-append) is cut off so that
    /// later appends start on a clean boundary. An entry counts as torn only
    /// when nothing valid follows it, so at most one frame is ever dropped.
    /// Corruption anywhere else is an error and leaves the file untouched.
    pub fn read_all(&self) -> Result<Vec<LogEntry>> {
        let mut writer = self.writer.lock();
        let end = writer.file_size;

        let mut bytes = Vec::new();
        writer.file.seek(SeekFrom::Start(0))?;
        (&writer.file).take(end).read_to_end(&mut bytes)?;

        let mut entries = Vec::new();
        let mut offset = 0usize;

        while offset < bytes.len() {
            match Self::decode_frame(&bytes[offset..])? {
                Frame::Entry(entry, len) => {
                    entries.push(entry);
                    offset += len;
                }
                Frame::Incomplete => {
                    if Self::frame_follows(&bytes[offset + 1..]) {
                        return Err(FeedError::InvalidFormat(format!(
                            "log entry at offset {} overruns the entries after it",
                            offset
                        )));
                    }

                    warn!(
                        path = %self.path.display(),
                        offset,
                        dropped = bytes.len() - offset,
                        "truncating torn entry at end of notification log"
                    );
                    writer.file.set_len(offset as u64)?;
                    writer.file.sync_all()?;
                    writer.file_size = offset as u64;
                    break;
                }
            }
        }

        Ok(entries)
    }

    /// Decode the frame at the start of `bytes`.
    ///
    /// The length field is bounded by [`MAX_ENTRY_SIZE`] before anything is
    /// sliced, so a corrupted length never drives an allocation.
    fn decode_frame(bytes: &[u8]) -> Result<Frame> {
        // Magic
        let seen = bytes.len().min(LOG_MAGIC.len());
        if bytes[..seen] != LOG_MAGIC[..seen] {
            return Err(FeedError::InvalidFormat("Invalid log entry magic".into()));
        }

        // Version
        if let Some(&version) = bytes.get(LOG_MAGIC.len()) {
            if version != LOG_VERSION {
                return Err(FeedError::InvalidFormat(format!(
                    "Unsupported log version: {}",
                    version
                )));
            }
        }

        if bytes.len() < HEADER_SIZE {
            return Ok(Frame::Incomplete);
        }

        // Body
        let body_len = read_u32(&bytes[5..HEADER_SIZE]) as usize;
        if body_len > MAX_ENTRY_SIZE {
            return Err(FeedError::InvalidFormat(format!(
                "log entry length {} exceeds limit of {} bytes",
                body_len, MAX_ENTRY_SIZE
            )));
        }

        let frame_len = body_len + ENTRY_OVERHEAD;
        if bytes.len() < frame_len {
            return Ok(Frame::Incomplete);
        }
        let body = &bytes[HEADER_SIZE..HEADER_SIZE + body_len];

        // Checksum
        let stored_checksum = read_u32(&bytes[HEADER_SIZE + body_len..frame_len]);
        let computed_checksum = crc32fast::hash(body);

        if stored_checksum != computed_checksum {
            return Err(FeedError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        let entry = rmp_serde::from_slice(body)?;
        Ok(Frame::Entry(entry, frame_len))
    }

    /// Whether a complete, checksummed entry starts anywhere in `bytes`.
    fn frame_follows(bytes: &[u8]) -> bool {
        (0..bytes.len()).any(|start| {
            bytes[start..].starts_with(LOG_MAGIC)
                && matches!(Self::decode_frame(&bytes[start..]), Ok(Frame::Entry(..)))
        })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}
