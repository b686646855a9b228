//! File-backed command log: one file per roaming network per month

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::string::FromUtf8Error;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::entry::{log_file_name, log_file_prefix, LogEntry};
use super::CommandLog;
use crate::domain::ids::RoamingNetworkId;
use crate::shared::InfraError;

pub struct FileCommandLog {
    dir: PathBuf,
    store_name: String,
    roaming_network_id: RoamingNetworkId,
    sync_writes: bool,
    /// Serializes appends so on-disk order equals call order. Holds the
    /// file last written by this process, known to end with a newline.
    write_lock: Mutex<Option<PathBuf>>,
}

impl FileCommandLog {
    /// Open (and create if needed) the log directory.
    pub async fn open(
        dir: impl Into<PathBuf>,
        store_name: impl Into<String>,
        roaming_network_id: RoamingNetworkId,
        sync_writes: bool,
    ) -> Result<Self, InfraError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| InfraError::LogDirectoryUnavailable {
                path: dir.clone(),
                source,
            })?;

        let log = Self {
            dir,
            store_name: store_name.into(),
            roaming_network_id,
            sync_writes,
            write_lock: Mutex::new(None),
        };
        info!(
            dir = %log.dir.display(),
            roaming_network = %log.roaming_network_id,
            "Command log opened"
        );
        Ok(log)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn roaming_network_id(&self) -> &RoamingNetworkId {
        &self.roaming_network_id
    }

    pub fn path_for(&self, timestamp: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(log_file_name(&self.store_name, &self.roaming_network_id, timestamp))
    }

    /// This roaming network's files, most recent month first.
    ///
    /// Failing to list the directory is the one error that aborts replay.
    pub async fn list_files_newest_first(&self) -> Result<Vec<PathBuf>, InfraError> {
        let unavailable = |source| InfraError::LogDirectoryUnavailable {
            path: self.dir.clone(),
            source,
        };

        let prefix = log_file_prefix(&self.store_name, &self.roaming_network_id);
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(unavailable)?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_month_file = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".log"))
                .is_some_and(is_year_month);
            if is_month_file {
                names.push(name);
            }
        }

        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names.into_iter().map(|n| self.dir.join(n)).collect())
    }

    /// All lines of `path`, last physical line first.
    ///
    /// Lines are decoded one by one, so a torn multibyte write only spoils
    /// its own line.
    pub async fn read_lines_newest_first(
        path: &Path,
    ) -> Result<Vec<Result<String, FromUtf8Error>>, InfraError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| InfraError::io(path, e))?;

        let mut lines: Vec<&[u8]> = content.split(|b| *b == b'\n').collect();
        if lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        Ok(lines
            .into_iter()
            .rev()
            .map(|line| String::from_utf8(line.strip_suffix(b"\r").unwrap_or(line).to_vec()))
            .collect())
    }

    fn header(&self, timestamp: DateTime<Utc>) -> String {
        format!(
            "# {} command log, roaming network {}, {:04}-{:02}\n",
            self.store_name,
            self.roaming_network_id,
            timestamp.year(),
            timestamp.month()
        )
    }
}

/// Whether the last byte of a non-empty file is a newline.
async fn ends_with_newline(path: &Path) -> std::io::Result<bool> {
    let mut file = tokio::fs::File::open(path).await?;
    if file.metadata().await?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

/// `YYYY-MM`
fn is_year_month(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 7
        && bytes[4] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || b.is_ascii_digit())
}

#[async_trait]
impl CommandLog for FileCommandLog {
    async fn append(&self, entry: &LogEntry) -> Result<(), InfraError> {
        let encoded = entry.encode()?;

        let mut last_written = self.write_lock.lock().await;
        let path = self.path_for(entry.timestamp);

        let is_new = !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| InfraError::io(&path, e))?;

        // A crash can leave a torn last line; never extend it.
        let torn_tail = !is_new
            && last_written.as_deref() != Some(path.as_path())
            && !ends_with_newline(&path)
                .await
                .map_err(|e| InfraError::io(&path, e))?;
        if torn_tail {
            warn!(file = %path.display(), "Command log ends with a partial line, starting a new one");
        }
        *last_written = None;

        let mut line = String::with_capacity(encoded.len() + 2);
        if torn_tail {
            line.push('\n');
        }
        line.push_str(&encoded);
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| InfraError::io(&path, e))?;

        if is_new {
            file.write_all(self.header(entry.timestamp).as_bytes())
                .await
                .map_err(|e| InfraError::io(&path, e))?;
        }

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| InfraError::io(&path, e))?;
        file.flush().await.map_err(|e| InfraError::io(&path, e))?;
        if self.sync_writes {
            file.sync_data().await.map_err(|e| InfraError::io(&path, e))?;
        }
        *last_written = Some(path.clone());

        debug!(
            session_id = %entry.id,
            command = %entry.command,
            file = %path.display(),
            "Command appended"
        );
        Ok(())
    }
}
