use super::PersistenceError;
use super::block::{render_block, render_line};
use crate::domain::LogEntry;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// The append-only log file for one service run.
///
/// Opened once at startup under a name derived from the start time and
/// never rotated. The handle is released when the value is dropped.
pub struct SessionLogFile {
    path: PathBuf,
    file: File,
}

impl SessionLogFile {
    pub fn file_name(started_at: DateTime<Local>) -> String {
        format!("syslog_{}.log", started_at.format("%Y-%m-%d-%H-%M-%S"))
    }

    pub async fn create(dir: &Path, started_at: DateTime<Local>) -> Result<Self, PersistenceError> {
        let path = dir.join(Self::file_name(started_at));
        let open_error = |source| PersistenceError::Open {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(dir).await.map_err(open_error)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(open_error)?;

        let mut session = Self { path, file };
        session
            .write_all(render_line(started_at, "syslog server start").as_bytes())
            .await?;
        Ok(session)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one delimiter-bracketed block.
    ///
    /// The block is rendered up front and handed to a single `write_all`, so
    /// a failed write never interleaves with another entry.
    pub async fn write_entry(&mut self, entry: &LogEntry) -> Result<(), PersistenceError> {
        let block = render_block(entry);
        self.write_all(block.as_bytes()).await
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), PersistenceError> {
        self.file.write_all(bytes).await?;
        self.file.flush().await?;
        Ok(())
    }

    /// Flush to disk and release the handle.
    pub async fn close(mut self) -> Result<(), PersistenceError> {
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }
}
