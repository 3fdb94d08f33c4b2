//! Persistence sink: the single consumer of the ingestion pipeline.

pub mod block;
pub mod console;
pub mod session_file;

pub use block::{DELIMITER_WIDTH, render_block};
pub use console::{ConsoleMirror, ENTRY_TARGET};
pub use session_file::SessionLogFile;

use crate::pipeline::PipelineReceiver;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to open session log {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write session log: {0}")]
    Write(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReport {
    pub path: PathBuf,
    pub entries_written: u64,
}

pub struct PersistenceSink {
    file: SessionLogFile,
    mirror: ConsoleMirror,
}

impl PersistenceSink {
    pub fn new(file: SessionLogFile) -> Self {
        Self {
            file,
            mirror: ConsoleMirror,
        }
    }

    /// Drain the pipeline in arrival order until it is closed and empty.
    ///
    /// The first write failure ends the run; dropping the receiver then
    /// closes the pipeline so producers stop queueing.
    pub async fn run(self, mut receiver: PipelineReceiver) -> Result<SinkReport, PersistenceError> {
        let Self { mut file, mirror } = self;
        let path = file.path().to_path_buf();
        let mut entries_written = 0_u64;

        while let Some(entry) = receiver.recv().await {
            if let Err(e) = file.write_entry(&entry).await {
                error!(path = %path.display(), error = %e, "Failed to persist entry");
                return Err(e);
            }
            mirror.mirror(&entry);
            entries_written += 1;
        }

        file.close().await?;
        info!(path = %path.display(), entries_written, "Persistence sink drained");
        Ok(SinkReport {
            path,
            entries_written,
        })
    }
}
