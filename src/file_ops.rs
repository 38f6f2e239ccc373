//! Atomic file output
//!
//! Every artifact this crate writes (envelopes, decrypted plaintext, key
//! files) goes through [`AtomicFile`]: the data lands in a tempfile next to
//! the target, is flushed and fsynced, and is only then renamed into place.
//! Observers see either the previous file, the complete new file, or
//! nothing. Dropping an uncommitted `AtomicFile` removes the tempfile.

use crate::error::{ErrorCategory, ErrorKind, HybridboxError, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Mode for files holding secrets or decrypted data.
pub const PRIVATE_MODE: u32 = 0o600;

/// Mode for files that are safe to share, such as public keys.
pub const PUBLIC_MODE: u32 = 0o644;

/// Output file that only becomes visible under its final name on commit.
pub struct AtomicFile {
    temp: tempfile::NamedTempFile,
    target: PathBuf,
    mode: u32,
}

impl AtomicFile {
    /// Creates a tempfile in the directory of `target`.
    ///
    /// `mode` is applied on Unix right before the rename.
    pub fn create(target: &Path, mode: u32) -> Result<Self> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
            HybridboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to create tempfile in {}", dir.display()),
                e,
            )
        })?;
        log::debug!(
            "staging {} via {}",
            target.display(),
            temp.path().display()
        );
        Ok(Self {
            temp,
            target: target.to_path_buf(),
            mode,
        })
    }

    /// Final path the data is renamed to on commit.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Flushes, fsyncs and renames the tempfile onto the target.
    pub fn commit(mut self) -> Result<()> {
        // Flush and fsync() such that the rename later, if it succeeds, will
        // always point to a valid file.
        self.temp.flush().map_err(|e| {
            HybridboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to flush tempfile",
                e,
            )
        })?;
        self.temp.as_file().sync_all().map_err(|e| {
            HybridboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to sync file prior to rename",
                e,
            )
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(self.mode);
            self.temp.as_file().set_permissions(perms).map_err(|e| {
                HybridboxError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to set tempfile permissions",
                    e,
                )
            })?;
        }
        #[cfg(not(unix))]
        let _ = self.mode;

        let target = self.target;
        self.temp.persist(&target).map_err(|e| {
            HybridboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to rename to target file {}", target.display()),
                e,
            )
        })?;
        log::debug!("committed {}", target.display());
        Ok(())
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

/// Atomically writes `contents` to `path` with the given mode.
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let mut file = AtomicFile::create(path, mode)?;
    file.write_all(contents).map_err(|e| write_error(path, e))?;
    file.commit()
}

/// Opens an input file for streaming.
pub fn open_input(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| read_error(path, e))
}

pub(crate) fn read_error(path: &Path, err: io::Error) -> HybridboxError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    HybridboxError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}

pub(crate) fn write_error(path: &Path, err: io::Error) -> HybridboxError {
    HybridboxError::with_kind_and_source(
        ErrorCategory::Internal,
        ErrorKind::Io,
        format!("failed to write {}", path.display()),
        err,
    )
}
