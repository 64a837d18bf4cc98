//! Atomic durable file replacement.
//!
//! A [`StagedFile`] is a temporary file created next to its destination.
//! [`StagedFile::commit`] syncs the bytes to disk and persists the temporary
//! file over the destination, so a reader only ever observes the previous
//! content or the complete new content. Dropping a staged file without
//! committing deletes the temporary file.
//!
//! The completion ledger, every intermediate archive and the final merged
//! archive go through this type.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile};

/// Suffix of the randomly named staging files.
pub const STAGING_SUFFIX: &str = ".partial";

/// A file being written at a staging path, renamed into place on commit.
#[derive(Debug)]
pub struct StagedFile {
    dest: PathBuf,
    file: NamedTempFile,
}

impl StagedFile {
    /// Stage `dest` at `<dir>/<name>.XXXXXX.partial`.
    ///
    /// # Errors
    /// Returns an error if the directory or the staging file cannot be created.
    pub fn create(dest: impl Into<PathBuf>) -> io::Result<Self> {
        let dest = dest.into();
        let dir = parent_dir(&dest);
        fs::create_dir_all(dir)?;
        let mut prefix = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        prefix.push(".");
        let file = Builder::new()
            .prefix(&prefix)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(dir)?;
        Ok(Self { dest, file })
    }

    /// Stage `dest` at a fixed staging path, replacing a stale file left there.
    ///
    /// The staging path must live on the same filesystem as `dest` for the
    /// final rename to be atomic; keeping both in one directory guarantees it.
    ///
    /// # Errors
    /// Returns an error if a stale staging file cannot be removed or the
    /// staging file cannot be created.
    pub fn create_with_staging(
        dest: impl Into<PathBuf>,
        staging: impl Into<PathBuf>,
    ) -> io::Result<Self> {
        let dest = dest.into();
        let staging = staging.into();
        let dir = parent_dir(&staging);
        fs::create_dir_all(dir)?;
        match fs::remove_file(&staging) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        let name = staging.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("staging path {} has no file name", staging.display()),
            )
        })?;
        let file = Builder::new()
            .prefix(name)
            .suffix("")
            .rand_bytes(0)
            .tempfile_in(dir)?;
        Ok(Self { dest, file })
    }

    /// Final destination of this file.
    #[must_use]
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Path the bytes are written to until commit.
    #[must_use]
    pub fn staging(&self) -> &Path {
        self.file.path()
    }

    /// Sync to disk and atomically move the staging file over the destination.
    ///
    /// # Errors
    /// Returns an error if syncing or renaming fails; the staging file is then
    /// removed and the destination is left untouched.
    pub fn commit(mut self) -> io::Result<PathBuf> {
        self.file.flush()?;
        self.file.as_file().sync_all()?;
        self.file.persist(&self.dest).map_err(|e| e.error)?;
        sync_parent_dir(&self.dest);
        Ok(self.dest)
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

// Persist the rename itself. Best effort: not every platform can open a directory.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Ok(dir) = File::open(parent_dir(path)) {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
