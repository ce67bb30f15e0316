//! Shared append-only CSV log store

use crate::config::StorageSettings;
use crate::types::{Record, CSV_HEADER};
use crate::Result;
use chrono::Utc;
use chrono_tz::Tz;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// The single shared log behind all sessions.
///
/// Every operation runs under one mutex, so appends are strictly
/// serialized and a snapshot can never observe a half-written record.
/// The lock is only held for the file operation itself, never across
/// peer-socket I/O.
pub struct CsvStore {
    log_path: PathBuf,
    timezone: Tz,
    timestamp_format: String,
    lock: Mutex<()>,
}

impl CsvStore {
    /// Create a store over the configured log path. Does not touch the
    /// filesystem until [`CsvStore::initialize`] is called.
    pub fn new(settings: &StorageSettings) -> Self {
        Self {
            log_path: settings.log_path.clone(),
            timezone: settings.timezone,
            timestamp_format: settings.timestamp_format.clone(),
            lock: Mutex::new(()),
        }
    }

    /// Ensure the log file exists and starts with the header row.
    /// Idempotent; an existing file is left untouched.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        if !tokio::fs::try_exists(&self.log_path).await? {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&self.log_path)
                .await?;
            file.write_all(CSV_HEADER.as_bytes()).await?;
            file.write_all(b"\n").await?;
            file.flush().await?;
        }
        Ok(())
    }

    /// Append one record, assigning the server-side timestamp at the
    /// moment of the write. Returns the assigned timestamp.
    ///
    /// On error the caller must not assume the record was persisted.
    pub async fn append(&self, record: &Record) -> Result<String> {
        let _guard = self.lock.lock().await;
        let timestamp = Utc::now()
            .with_timezone(&self.timezone)
            .format(&self.timestamp_format)
            .to_string();

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.log_path)
            .await?;
        let line = record.to_csv_line(&timestamp);
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;

        Ok(timestamp)
    }

    /// Read the full current log, header included, one entry per line.
    /// Returns an empty sequence if the file does not exist yet.
    pub async fn snapshot(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        self.read_lines().await
    }

    /// Read the current log and hand it to `deliver` while the exclusion
    /// region is still held.
    ///
    /// Sessions queue snapshots for fanout through this method: because
    /// no append can land between the read and the hand-off, snapshots
    /// reach every outbound queue in log order and a client can never
    /// receive one older than a snapshot it has already seen. `deliver`
    /// must only enqueue (never touch peer sockets), so the lock is not
    /// held across network I/O.
    pub async fn with_snapshot<T>(&self, deliver: impl FnOnce(Vec<String>) -> T) -> Result<T> {
        let _guard = self.lock.lock().await;
        let lines = self.read_lines().await?;
        Ok(deliver(lines))
    }

    async fn read_lines(&self) -> Result<Vec<String>> {
        if !tokio::fs::try_exists(&self.log_path).await? {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.log_path).await?;
        Ok(content.lines().map(str::to_string).collect())
    }
}
