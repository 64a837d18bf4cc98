//! Streaming comparison of two record sources.
//!
//! Source A is either a single archive or a directory of archives read in
//! file-name order; source B is a single archive. Both are walked in lockstep
//! and compared record by record as JSON values. Typical use is checking a
//! merged extraction against its inputs filtered with the same predicate.

use crate::error::{ExtractError, Result};
use crate::io::compression::Algorithm;
use crate::io::records::{Record, RecordReader};
use crate::predicate::Predicate;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Records between progress messages when A is a single file.
const PROGRESS_EVERY: u64 = 1000;

#[derive(Clone, Debug, Default)]
pub struct VerifyOptions {
    /// Filter applied to source A only.
    pub predicate: Predicate,
    /// Advance B to the first record of A. When A is a directory, A also
    /// starts at this file name.
    pub skip_to: Option<String>,
    /// Drop this many records from both sources before comparing.
    pub skip_iter: Option<u64>,
}

/// Which source ran out first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

#[derive(Clone, Debug, PartialEq)]
pub enum VerifyOutcome {
    /// Both sources held the same records.
    Equal { compared: u64 },
    /// The records at `index` (0-based, after skipping) differ.
    Mismatch { index: u64, left: Value, right: Value },
    /// One source ended after `compared` equal records while the other continued.
    LengthMismatch { compared: u64, exhausted: Side },
}

impl VerifyOutcome {
    #[must_use]
    pub fn is_equal(&self) -> bool {
        matches!(self, Self::Equal { .. })
    }
}

type Records = Box<dyn Iterator<Item = Result<Record>>>;

/// Lazily chains the archives of a directory, in file-name order.
struct DirectoryRecords {
    files: std::vec::IntoIter<PathBuf>,
    current: Option<RecordReader>,
}

impl DirectoryRecords {
    fn open(dir: &Path, start_with: Option<&str>) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|source| ExtractError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && Algorithm::from_path(p).is_some())
            .collect();
        files.sort();

        if let Some(start) = start_with {
            let pos = files
                .iter()
                .position(|p| p.file_name().is_some_and(|n| n == start))
                .ok_or_else(|| {
                    ExtractError::Config(format!("{start} not found in {}", dir.display()))
                })?;
            files.drain(..pos);
        }

        Ok(Self {
            files: files.into_iter(),
            current: None,
        })
    }
}

impl Iterator for DirectoryRecords {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                match reader.next() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }
            let path = self.files.next()?;
            debug!(path = %path.display(), "verifying");
            match RecordReader::open(&path) {
                Ok(reader) => self.current = Some(reader),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Number of records in an archive.
///
/// # Errors
/// Returns the first decode error.
pub fn count_records(path: impl AsRef<Path>) -> Result<u64> {
    let mut n = 0;
    for record in RecordReader::open(path)? {
        record?;
        n += 1;
    }
    Ok(n)
}

/// Compare source `a` (file or directory) with archive `b`.
///
/// # Errors
/// Returns any decode error from either source, or [`ExtractError::Config`]
/// if `skip_to` names a missing file or the first record of `a` never
/// appears in `b`.
pub fn verify(
    a: impl AsRef<Path>,
    b: impl AsRef<Path>,
    options: &VerifyOptions,
) -> Result<VerifyOutcome> {
    let a = a.as_ref();
    let a_is_dir = a.is_dir();
    let mut left: Records = if a_is_dir {
        Box::new(DirectoryRecords::open(a, options.skip_to.as_deref())?)
    } else {
        Box::new(RecordReader::open(a)?)
    };
    let mut right: Records = Box::new(RecordReader::open(b)?);

    if !options.predicate.is_keep_all() {
        let predicate = options.predicate.clone();
        left = Box::new(left.filter(move |r| r.as_ref().map_or(true, |r| predicate.keep(r))));
    }

    if options.skip_to.is_some()
        && let Some(first) = left.next().transpose()?
    {
        advance_until(&mut right, &first)?;
    }

    if let Some(n) = options.skip_iter {
        skip(&mut left, n)?;
        skip(&mut right, n)?;
    }

    let mut index = 0u64;
    loop {
        match (left.next().transpose()?, right.next().transpose()?) {
            (Some(l), Some(r)) => {
                if l != r {
                    return Ok(VerifyOutcome::Mismatch {
                        index,
                        left: l.into_value(),
                        right: r.into_value(),
                    });
                }
            }
            (None, None) => return Ok(VerifyOutcome::Equal { compared: index }),
            (None, Some(_)) => {
                return Ok(VerifyOutcome::LengthMismatch {
                    compared: index,
                    exhausted: Side::A,
                });
            }
            (Some(_), None) => {
                return Ok(VerifyOutcome::LengthMismatch {
                    compared: index,
                    exhausted: Side::B,
                });
            }
        }
        index += 1;
        if !a_is_dir && index % PROGRESS_EVERY == 0 {
            debug!(compared = index, "verify progress");
        }
    }
}

fn skip(records: &mut Records, n: u64) -> Result<()> {
    for _ in 0..n {
        if records.next().transpose()?.is_none() {
            break;
        }
    }
    Ok(())
}

fn advance_until(records: &mut Records, target: &Record) -> Result<()> {
    for record in records.by_ref() {
        if record? == *target {
            return Ok(());
        }
    }
    Err(ExtractError::Config(
        "first record of the first input never appears in the second input".to_string(),
    ))
}
