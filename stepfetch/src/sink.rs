//! Output file management.
//!
//! The byte sink owns the single rule that makes resuming safe: the local
//! file must agree with the offset the caller claims before any new bytes
//! are appended. A file shorter than the claimed offset means some other
//! process interfered with it, and the job fails loudly instead of
//! resuming over corrupt data. A file *longer* than the claimed offset is
//! tolerated and truncated back, which drops trailing bytes left by a
//! prior partial or overlapping write.
//!
//! [`PackageSink`] is a seam: the downloader only needs prepare/append/
//! discard, so tests (and callers with exotic storage) can substitute
//! their own sink.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while managing the output file.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Resuming, but the output file does not exist.
    #[error("The package file is missing while resuming from offset {0}")]
    Missing(i64),

    /// Resuming, but the output file holds fewer bytes than claimed.
    #[error("The package file is smaller than expected ({actual} bytes on disk, {claimed} claimed)")]
    SmallerThanExpected { claimed: u64, actual: u64 },

    /// I/O error opening, truncating, seeking, writing or removing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte sink for one download job.
pub trait PackageSink {
    /// Make the sink consistent with the claimed offset before streaming.
    fn prepare(&mut self, offset: i64) -> Result<(), SinkError>;

    /// Append a chunk, returning how many bytes were actually written.
    fn append(&mut self, chunk: &[u8]) -> Result<usize, SinkError>;

    /// Remove the output entirely. Called when a write-count mismatch makes
    /// the partial file untrustworthy; the job restarts from scratch.
    fn discard(&mut self) -> Result<(), SinkError>;
}

/// File-backed sink at `temp_dir/basename`.
pub struct FileSink {
    path: PathBuf,
    file: Option<File>,
}

impl FileSink {
    pub fn new(temp_dir: &Path, basename: &str) -> Self {
        Self {
            path: temp_dir.join(basename),
            file: None,
        }
    }

    /// The output file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PackageSink for FileSink {
    fn prepare(&mut self, offset: i64) -> Result<(), SinkError> {
        // `offset` is the index of the last byte written, so the file must
        // hold `offset + 1` bytes for the resume to be trustworthy. The
        // next range request starts at `offset + 1`, and the file is
        // truncated to exactly that length so the append lands there.
        let resume_at = (offset + 1).max(0) as u64;

        if offset > 0 {
            let metadata = fs::metadata(&self.path).map_err(|_| SinkError::Missing(offset))?;

            if metadata.len() < resume_at {
                return Err(SinkError::SmallerThanExpected {
                    claimed: resume_at,
                    actual: metadata.len(),
                });
            }
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.set_len(resume_at)?;
        file.seek(SeekFrom::Start(resume_at))?;

        self.file = Some(file);
        Ok(())
    }

    fn append(&mut self, chunk: &[u8]) -> Result<usize, SinkError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| SinkError::Io(std::io::Error::other("sink not prepared")))?;

        // A single write call, so a short count is visible to the caller
        // instead of being papered over by a retry loop.
        let written = file.write(chunk)?;
        file.flush()?;

        Ok(written)
    }

    fn discard(&mut self) -> Result<(), SinkError> {
        self.file = None;

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
