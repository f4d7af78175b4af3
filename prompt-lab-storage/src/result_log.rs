//! Append-only JSON Lines log of run results.

use async_trait::async_trait;
use prompt_lab_core::{CoreError, Result, ResultSink, RunResult};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One `RunResult` per line. Each record is written with a single
/// `write_all` while holding the lock, so concurrent appends never
/// interleave partial lines.
pub struct JsonlResultLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlResultLog {
    /// Opens `path` for appending, creating it and its parent directories.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path.as_ref(), false).await
    }

    /// Creates `path`, discarding any previous contents.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path.as_ref(), true).await
    }

    async fn open_with(path: &Path, truncate: bool) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                CoreError::Storage(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let file = options.open(path).await.map_err(|e| {
            CoreError::Storage(format!("failed to open {}: {}", path.display(), e))
        })?;

        info!(path = %path.display(), truncate, "Opened result log");
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record back. Blank lines are skipped; a malformed line is
    /// reported with its 1-based line number.
    pub async fn read_all(path: impl AsRef<Path>) -> Result<Vec<RunResult>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            CoreError::Storage(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut results = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let result: RunResult = serde_json::from_str(line).map_err(|e| {
                CoreError::Storage(format!(
                    "{}:{}: malformed record: {}",
                    path.display(),
                    index + 1,
                    e
                ))
            })?;
            results.push(result);
        }

        debug!(path = %path.display(), records = results.len(), "Read result log");
        Ok(results)
    }
}

#[async_trait]
impl ResultSink for JsonlResultLog {
    async fn append(&self, result: &RunResult) -> Result<()> {
        let mut line = serde_json::to_vec(result)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await.map_err(|e| {
            CoreError::Storage(format!("failed to append to {}: {}", self.path.display(), e))
        })?;
        file.flush().await.map_err(|e| {
            CoreError::Storage(format!("failed to flush {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}
