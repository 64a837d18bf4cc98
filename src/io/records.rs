//! Newline-delimited JSON records inside compressed archives.
//!
//! This module provides:
//! - [`Record`]: one JSON object line, kept verbatim alongside its parsed value
//! - [`RecordReader`]: a lazy, fallible iterator over the records of an archive
//! - [`RecordWriter`]: a staged sink that becomes visible only once finished
//! - [`read_records`]: read a whole archive into memory
//!
//! # Notes
//! - Empty/whitespace-only lines are skipped on read.
//! - Records are written back exactly as they were read, so filtering and
//!   merging never reformat a record.

use crate::error::{ExtractError, Result};
use crate::io::compression::{FinishWrite, open_reader, open_writer};
use serde_json::Value;
use std::io::{self, BufRead, BufReader, Lines, Read, Write};
use std::path::{Path, PathBuf};

/// One JSON object, with the exact line it was read from.
#[derive(Clone, Debug)]
pub struct Record {
    raw: String,
    value: Value,
}

impl Record {
    /// Parse a single line.
    ///
    /// # Errors
    /// Returns an error if the line is not valid JSON or is not a JSON object.
    pub fn parse(line: String) -> io::Result<Self> {
        let value: Value = serde_json::from_str(&line)?;
        if !value.is_object() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "record is not a JSON object",
            ));
        }
        Ok(Self { raw: line, value })
    }

    /// Build a record from a value, serializing it compactly.
    ///
    /// # Errors
    /// Returns an error if `value` is not a JSON object.
    pub fn from_value(value: Value) -> io::Result<Self> {
        if !value.is_object() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "record is not a JSON object",
            ));
        }
        let raw = serde_json::to_string(&value)?;
        Ok(Self { raw, value })
    }

    /// The line as it appeared in the archive.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// String value of a top-level field; `None` if absent, null or not a string.
    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.value.get(name).and_then(Value::as_str)
    }
}

/// Records compare by JSON value, not by their textual form.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

/// Lazy reader over the records of one archive.
///
/// Yields `Err` at most once: after a decode failure the iterator is exhausted.
pub struct RecordReader {
    path: PathBuf,
    lines: Lines<BufReader<Box<dyn Read>>>,
    line_no: u64,
    failed: bool,
}

impl RecordReader {
    /// Open an archive, detecting its codec.
    ///
    /// # Errors
    /// Returns [`ExtractError::Decode`] if the file cannot be opened or its
    /// decoder cannot be initialised.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rdr = open_reader(&path)?;
        Ok(Self {
            path,
            lines: BufReader::new(rdr).lines(),
            line_no: 0,
            failed: false,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode_error(&mut self, source: io::Error) -> ExtractError {
        self.failed = true;
        ExtractError::Decode {
            path: self.path.clone(),
            line: Some(self.line_no),
            source,
        }
    }
}

impl Iterator for RecordReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(self.decode_error(e))),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(Record::parse(line).map_err(|e| self.decode_error(e)));
        }
    }
}

/// Staged writer of records into a (usually compressed) archive.
///
/// Nothing appears at the destination path until [`RecordWriter::finish`]
/// succeeds; dropping the writer discards the partial output.
pub struct RecordWriter {
    path: PathBuf,
    inner: Box<dyn FinishWrite>,
    written: u64,
}

impl RecordWriter {
    /// Create a writer whose codec follows the extension of `path`.
    ///
    /// # Errors
    /// Returns [`ExtractError::Config`] for an unusable level and
    /// [`ExtractError::Encode`] if the staging file cannot be created.
    pub fn create(path: impl AsRef<Path>, level: Option<i32>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = open_writer(&path, level)?;
        Ok(Self {
            path,
            inner,
            written: 0,
        })
    }

    /// Append one record followed by a newline.
    ///
    /// # Errors
    /// Returns [`ExtractError::Encode`] on any write failure.
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        self.inner
            .write_all(record.raw().as_bytes())
            .and_then(|()| self.inner.write_all(b"\n"))
            .map_err(|source| ExtractError::Encode {
                path: self.path.clone(),
                source,
            })?;
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Finish the stream, fsync it and move it into place.
    ///
    /// # Returns
    /// The number of records written.
    ///
    /// # Errors
    /// Returns [`ExtractError::Encode`] if the trailer, sync or rename fails.
    pub fn finish(self) -> Result<u64> {
        let encode_err = |source| ExtractError::Encode {
            path: self.path.clone(),
            source,
        };
        let staged = self.inner.finalize().map_err(encode_err)?;
        staged.commit().map_err(encode_err)?;
        Ok(self.written)
    }
}

/// Read every record of an archive into memory.
///
/// # Errors
/// Returns the first decode error encountered.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    RecordReader::open(path)?.collect()
}

/// Write `records` to a new archive at `path`.
///
/// # Returns
/// The number of records written.
///
/// # Errors
/// Returns an error if the archive cannot be created or written.
pub fn write_records<'a>(
    path: impl AsRef<Path>,
    level: Option<i32>,
    records: impl IntoIterator<Item = &'a Record>,
) -> Result<u64> {
    let mut w = RecordWriter::create(path, level)?;
    for record in records {
        w.write_record(record)?;
    }
    w.finish()
}
