use crate::utils::validation::{ValidationError, sanitize_filename};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const STAGED_PREFIX: &str = "upload-";

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("invalid filename: {0}")]
    InvalidFilename(#[from] ValidationError),

    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("failed to persist upload: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
#[error("failed to remove staged file {path}: {source}")]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// An upload persisted to local storage.
///
/// The file is removed by [`StagedFile::cleanup`], or when the value is
/// dropped on any other exit path.
#[derive(Debug)]
pub struct StagedFile {
    path: TempPath,
    original_filename: String,
    size: u64,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn cleanup(self) -> Result<(), CleanupError> {
        let path = self.path.to_path_buf();
        self.path
            .close()
            .map_err(|source| CleanupError { path, source })
    }
}

/// Writes incoming uploads to uniquely named files in the staging directory.
#[derive(Debug, Clone)]
pub struct StageManager {
    dir: PathBuf,
    max_file_size: usize,
}

impl StageManager {
    pub fn new(dir: impl Into<PathBuf>, max_file_size: usize) -> Self {
        Self {
            dir: dir.into(),
            max_file_size,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn stage<'a>(
        &self,
        filename: &str,
        mut reader: impl AsyncRead + Unpin + Send + 'a,
    ) -> Result<StagedFile, StagingError> {
        let original_filename = sanitize_filename(filename)?;

        tokio::fs::create_dir_all(&self.dir).await?;

        let temp_file = tempfile::Builder::new()
            .prefix(STAGED_PREFIX)
            .tempfile_in(&self.dir)?;
        let mut temp_file_async = tokio::fs::File::from_std(temp_file.reopen()?);
        // From here on the path is removed on drop, including the early returns below
        let path = temp_file.into_temp_path();

        let mut buffer = [0u8; 8192];
        let mut total_size: u64 = 0;

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            total_size += n as u64;
            if total_size > self.max_file_size as u64 {
                return Err(StagingError::TooLarge {
                    limit: self.max_file_size,
                });
            }
            temp_file_async.write_all(&buffer[..n]).await?;
        }
        temp_file_async.flush().await?;
        temp_file_async.sync_all().await?;

        tracing::debug!(
            "Staged {} ({} bytes) at {}",
            original_filename,
            total_size,
            path.display()
        );

        Ok(StagedFile {
            path,
            original_filename,
            size: total_size,
        })
    }

    /// Removes staged files left behind by a previous process.
    pub async fn sweep_stale(&self) -> std::io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let is_staged = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(STAGED_PREFIX));
            if !is_staged || !entry.file_type().await?.is_file() {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    "Could not remove stale staged file {}: {}",
                    entry.path().display(),
                    e
                ),
            }
        }

        Ok(removed)
    }
}
