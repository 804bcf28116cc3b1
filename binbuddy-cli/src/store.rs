//! JSON-lines file sink for finished results.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use binbuddy_core::{PortError, RecordSink, StoredRecord};

/// Appends one JSON object per line to a file.
pub(crate) struct JsonlSink {
    path: PathBuf,
    // serializes appends from concurrent requests
    write_lock: Mutex<()>,
}

impl JsonlSink {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn store(&self, record: &StoredRecord) -> Result<(), PortError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|err| io_error(&self.path, &err))?;
        file.write_all(&line)
            .await
            .map_err(|err| io_error(&self.path, &err))?;
        file.flush().await.map_err(|err| io_error(&self.path, &err))
    }
}

fn io_error(path: &Path, err: &io::Error) -> PortError {
    PortError::Internal(format!("cannot write {}: {err}", path.display()))
}
