//! Durable repository backed by an append-only log.

use crate::error::{FeedError, Result};
use crate::types::{
    NewNotification, Notification, NotificationId, Pagination, ReadState, Recipient, Timestamp,
};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::index::NotificationIndex;
use super::log::{LogEntry, NotificationLog};
use super::Repository;

/// Magic bytes for the repository manifest.
const MANIFEST_MAGIC: &[u8; 4] = b"NFD\0";

/// Current repository format version.
const MANIFEST_VERSION: u8 = 1;

/// Log repository configuration.
#[derive(Clone, Debug)]
pub struct LogRepositoryConfig {
    /// Base directory for the repository.
    pub path: PathBuf,

    /// Whether to create the repository if it doesn't exist.
    pub create_if_missing: bool,

    /// Sync the log every N writes.
    pub sync_interval: u64,
}

impl Default for LogRepositoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./notifications"),
            create_if_missing: true,
            sync_interval: NotificationLog::DEFAULT_SYNC_INTERVAL,
        }
    }
}

/// Repository that persists every change to a log on disk and serves
/// queries from an index rebuilt on open.
///
/// The directory is locked for exclusive access while the repository is open.
pub struct LogRepository {
    config: LogRepositoryConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    log: NotificationLog,

    index: NotificationIndex,

    /// Next notification ID; also serializes writes.
    next_id: Mutex<u64>,
}

impl LogRepository {
    /// Open an existing repository or create a new one.
    pub fn open_or_create(config: LogRepositoryConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(FeedError::NotInitialized)
        }
    }

    /// Create a new repository.
    ///
    /// A log already present in the directory is replayed, so ids keep
    /// counting from what it holds.
    pub fn create(config: LogRepositoryConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;
        Self::write_manifest(&config.path)?;

        info!(path = %config.path.display(), "created notification repository");
        Self::load(config, lock_file)
    }

    /// Open an existing repository, replaying its log.
    pub fn open(config: LogRepositoryConfig) -> Result<Self> {
        let lock_file = Self::acquire_lock(&config.path)?;
        Self::verify_manifest(&config.path)?;

        Self::load(config, lock_file)
    }

    fn load(config: LogRepositoryConfig, lock_file: File) -> Result<Self> {
        let log = NotificationLog::open_with_sync_interval(
            config.path.join("notifications.log"),
            config.sync_interval,
        )?;

        let index = NotificationIndex::new();
        let replayed = Self::replay(&log, &index)?;
        let next_id = index.max_id().map_or(1, |id| id.0 + 1);

        info!(
            path = %config.path.display(),
            entries = replayed,
            notifications = index.count(),
            bytes = log.size(),
            "opened notification repository"
        );

        Ok(Self {
            config,
            _lock_file: lock_file,
            log,
            index,
            next_id: Mutex::new(next_id),
        })
    }

    /// Rebuild the index from the log. Returns the number of entries applied.
    fn replay(log: &NotificationLog, index: &NotificationIndex) -> Result<usize> {
        let entries = log.read_all()?;
        let count = entries.len();

        for entry in entries {
            match entry {
                LogEntry::Created(notification) => {
                    if index.get(notification.id).is_some() {
                        warn!(
                            id = %notification.id,
                            "duplicate notification id in log, keeping the later entry"
                        );
                    }
                    index.insert(notification);
                }
                LogEntry::ReadStateChanged { id, read_at } => {
                    if index.set_read_at(id, read_at).is_err() {
                        warn!(%id, "read state change for unknown notification in log");
                    }
                }
            }
        }

        Ok(count)
    }

    /// Repository configuration.
    pub fn config(&self) -> &LogRepositoryConfig {
        &self.config
    }

    /// Get a notification by ID.
    pub fn get(&self, id: NotificationId) -> Option<Notification> {
        self.index.get(id)
    }

    /// Number of stored notifications.
    pub fn count(&self) -> usize {
        self.index.count()
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    fn set_state(&self, notification: &Notification, state: ReadState) -> Result<Notification> {
        let _write = self.next_id.lock();

        let current = self
            .index
            .get(notification.id)
            .ok_or(FeedError::NotificationNotFound(notification.id))?;
        if current.state() == state {
            return Ok(current);
        }

        let read_at = match state {
            ReadState::Read => Some(Timestamp::now()),
            ReadState::Unread => None,
        };

        self.log.append(&LogEntry::ReadStateChanged {
            id: current.id,
            read_at,
        })?;
        let updated = self.index.set_read_at(current.id, read_at)?;
        debug!(id = %updated.id, ?state, "changed read state");

        Ok(updated)
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join("MANIFEST"))?;

        file.write_all(MANIFEST_MAGIC)?;
        file.write_all(&[MANIFEST_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != MANIFEST_MAGIC {
            return Err(FeedError::InvalidFormat("Invalid repository magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != MANIFEST_VERSION {
            return Err(FeedError::InvalidFormat(format!(
                "Unsupported repository version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| FeedError::Locked)?;

        Ok(lock_file)
    }
}

impl Repository for LogRepository {
    fn save(&self, recipient: &Recipient, notification: NewNotification) -> Result<Notification> {
        let mut next_id = self.next_id.lock();

        let notification = Notification {
            id: NotificationId(*next_id),
            recipient: recipient.clone(),
            fields: notification.fields,
            created_at: Timestamp::now(),
            read_at: None,
        };

        // A failed append leaves no entry behind, so the id stays free.
        self.log.append(&LogEntry::Created(notification.clone()))?;
        *next_id += 1;
        self.index.insert(notification.clone());

        debug!(id = %notification.id, %recipient, "saved notification");
        Ok(notification)
    }

    fn get_notifications(
        &self,
        recipients: &[Recipient],
        page: Pagination,
    ) -> Result<Vec<Notification>> {
        Ok(self.index.query(recipients, ReadState::Unread, page))
    }

    fn get_read_notifications(
        &self,
        recipients: &[Recipient],
        page: Pagination,
    ) -> Result<Vec<Notification>> {
        Ok(self.index.query(recipients, ReadState::Read, page))
    }

    fn read(&self, notification: &Notification) -> Result<Notification> {
        self.set_state(notification, ReadState::Read)
    }

    fn unread(&self, notification: &Notification) -> Result<Notification> {
        self.set_state(notification, ReadState::Unread)
    }
}

impl Drop for LogRepository {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.log.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Payload;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> LogRepositoryConfig {
        LogRepositoryConfig {
            path: dir.path().join("feed"),
            ..Default::default()
        }
    }

    #[test]
    fn test_open_missing_without_create() {
        let dir = TempDir::new().unwrap();
        let config = LogRepositoryConfig {
            create_if_missing: false,
            ..test_config(&dir)
        };

        assert!(matches!(
            LogRepository::open_or_create(config),
            Err(FeedError::NotInitialized)
        ));
    }

    #[test]
    fn test_next_id_continues_after_reopen() {
        let dir = TempDir::new().unwrap();
        let alice = Recipient::new("user", 1);

        {
            let repo = LogRepository::open_or_create(test_config(&dir)).unwrap();
            for body in ["one", "two", "three"] {
                let new = repo.new_notification(Payload::from(body).into_fields());
                repo.save(&alice, new).unwrap();
            }
        }

        let repo = LogRepository::open_or_create(test_config(&dir)).unwrap();
        let new = repo.new_notification(Payload::from("four").into_fields());
        let saved = repo.save(&alice, new).unwrap();
        assert_eq!(saved.id, NotificationId(4));
        assert_eq!(repo.count(), 4);
    }

    #[test]
    fn test_idempotent_read_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let repo = LogRepository::open_or_create(test_config(&dir)).unwrap();
        let alice = Recipient::new("user", 1);

        let new = repo.new_notification(Payload::from("hello").into_fields());
        let saved = repo.save(&alice, new).unwrap();

        let first = repo.read(&saved).unwrap();
        let size = repo.log.size();
        let second = repo.read(&saved).unwrap();

        assert_eq!(repo.log.size(), size);
        assert_eq!(first.read_at, second.read_at);
    }

    #[test]
    fn test_create_replays_existing_log() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let alice = Recipient::new("user", 1);

        {
            let repo = LogRepository::open_or_create(config.clone()).unwrap();
            for body in ["one", "two"] {
                let new = repo.new_notification(Payload::from(body).into_fields());
                repo.save(&alice, new).unwrap();
            }
        }
        fs::remove_file(config.path.join("MANIFEST")).unwrap();

        let repo = LogRepository::open_or_create(config.clone()).unwrap();
        assert!(config.path.join("MANIFEST").exists());
        assert_eq!(repo.count(), 2);

        let new = repo.new_notification(Payload::from("three").into_fields());
        assert_eq!(repo.save(&alice, new).unwrap().id, NotificationId(3));
    }

    #[test]
    fn test_create_takes_lock_before_manifest() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let _held = LogRepository::open_or_create(config.clone()).unwrap();
        fs::remove_file(config.path.join("MANIFEST")).unwrap();

        assert!(matches!(
            LogRepository::create(config.clone()),
            Err(FeedError::Locked)
        ));
        assert!(!config.path.join("MANIFEST").exists());
    }

    #[test]
    fn test_bad_manifest() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        fs::create_dir_all(&config.path).unwrap();
        fs::write(config.path.join("MANIFEST"), b"XXXX\x01").unwrap();

        assert!(matches!(
            LogRepository::open_or_create(config),
            Err(FeedError::InvalidFormat(_))
        ));
    }
}
