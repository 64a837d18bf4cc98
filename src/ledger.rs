//! Durable record of completed input files.
//!
//! The ledger lives in the work directory as a line-oriented text file named
//! [`LEDGER_FILE`]; each line is
//!
//! ```text
//! <input file name>\t<intermediate file name>
//! ```
//!
//! A line holding only the input name is also accepted; its intermediate name
//! is then derived from the input name and the current intermediate codec.
//!
//! Every update rewrites the whole set to [`LEDGER_TEMP_FILE`], syncs it and
//! renames it over the canonical file, so a reader sees either the previous
//! set or the new one. An entry is only ever added after its intermediate
//! output has been committed.

use crate::error::{ExtractError, Result};
use crate::io::compression::Algorithm;
use crate::planner::intermediate_name;
use crate::staged::StagedFile;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Canonical ledger file name inside the work directory.
pub const LEDGER_FILE: &str = "completed";
/// Staging file used while replacing the ledger.
pub const LEDGER_TEMP_FILE: &str = "completed_temp";

/// Set of completed inputs and the intermediate file each one produced.
#[derive(Debug)]
pub struct CompletionLedger {
    work_dir: PathBuf,
    path: PathBuf,
    temp_path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl CompletionLedger {
    fn empty(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            path: work_dir.join(LEDGER_FILE),
            temp_path: work_dir.join(LEDGER_TEMP_FILE),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Start a new run: persist an empty ledger, replacing any previous one.
    ///
    /// Intermediates of an earlier run may be overwritten by this one, so their
    /// entries must not survive.
    ///
    /// # Errors
    /// Returns [`ExtractError::LedgerIo`] if the empty ledger cannot be written.
    pub fn create_fresh(work_dir: impl AsRef<Path>) -> Result<Self> {
        let ledger = Self::empty(work_dir.as_ref());
        ledger.persist(&ledger.lock())?;
        Ok(ledger)
    }

    /// Load the ledger from `work_dir`.
    ///
    /// A missing ledger file is not an error: a warning is logged and an
    /// empty ledger is returned.
    ///
    /// # Errors
    /// Returns [`ExtractError::LedgerIo`] if the file exists but cannot be read.
    pub fn load(work_dir: impl AsRef<Path>, intermediate: Algorithm) -> Result<Self> {
        let ledger = Self::empty(work_dir.as_ref());
        let text = match fs::read_to_string(&ledger.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %ledger.path.display(), "no resume file found; starting from an empty ledger");
                return Ok(ledger);
            }
            Err(source) => {
                return Err(ExtractError::LedgerIo {
                    path: ledger.path.clone(),
                    source,
                });
            }
        };

        {
            let mut entries = ledger.lock();
            for line in text.lines() {
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                let (input, output) = match line.split_once('\t') {
                    Some((input, output)) => (input.to_string(), output.to_string()),
                    None => (line.to_string(), intermediate_name(line, intermediate)),
                };
                entries.insert(input, output);
            }
            debug!(path = %ledger.path.display(), entries = entries.len(), "loaded completion ledger");
        }
        Ok(ledger)
    }

    /// Canonical ledger path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn contains(&self, input_name: &str) -> bool {
        self.lock().contains_key(input_name)
    }

    /// Snapshot of `input name -> intermediate path`, in input-name order.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, PathBuf> {
        self.lock()
            .iter()
            .map(|(input, output)| (input.clone(), self.work_dir.join(output)))
            .collect()
    }

    /// Drop an entry from memory; the next persisted update omits it.
    pub(crate) fn forget(&self, input_name: &str) -> bool {
        self.lock().remove(input_name).is_some()
    }

    /// Record `input_name` as complete and atomically persist the full set.
    ///
    /// Callers must only invoke this after `intermediate` has been committed.
    /// Concurrent callers are serialized. On failure the in-memory set is
    /// left as it was before the call.
    ///
    /// # Errors
    /// Returns [`ExtractError::LedgerIo`] if the ledger cannot be replaced.
    pub fn append_and_persist(&self, input_name: &str, intermediate: &Path) -> Result<()> {
        let output = intermediate
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ExtractError::LedgerIo {
                path: self.path.clone(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("intermediate path {} has no UTF-8 file name", intermediate.display()),
                ),
            })?
            .to_string();

        let mut entries = self.lock();
        let previous = entries.insert(input_name.to_string(), output);
        if let Err(e) = self.persist(&entries) {
            match previous {
                Some(prev) => entries.insert(input_name.to_string(), prev),
                None => entries.remove(input_name),
            };
            return Err(e);
        }
        debug!(input = input_name, completed = entries.len(), "ledger updated");
        Ok(())
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let ledger_err = |source| ExtractError::LedgerIo {
            path: self.path.clone(),
            source,
        };
        let staged = StagedFile::create_with_staging(&self.path, &self.temp_path).map_err(ledger_err)?;
        let mut w = BufWriter::new(staged);
        for (input, output) in entries {
            writeln!(w, "{input}\t{output}").map_err(ledger_err)?;
        }
        let staged = w.into_inner().map_err(|e| ledger_err(e.into_error()))?;
        staged.commit().map_err(ledger_err)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
