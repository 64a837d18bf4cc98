//! Stream one archive through a [`Predicate`] into another archive.
//!
//! [`filter_archive`] is the body of every extraction task and of the
//! single-file `extract-one` command. Output is staged: it appears at its
//! destination only when every record has been written and the encoder has
//! been finished, so an aborted filter never leaves a truncated archive behind.

use crate::error::{ExtractError, Result};
use crate::io::records::{RecordReader, RecordWriter};
use crate::predicate::Predicate;
use crate::runner::CancelToken;
use std::path::Path;
use tracing::debug;

/// Kept records between progress messages.
const PROGRESS_EVERY: u64 = 1000;

/// Record counts of one filtered archive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub read: u64,
    pub kept: u64,
}

/// Copy the records of `input` that satisfy `predicate` into `output`.
///
/// The codec of `output` follows its extension; `level` overrides the codec's
/// default compression level. When `cancel` is given it is checked before
/// every record and the function returns [`ExtractError::Cancelled`] as soon
/// as it is set, discarding the partial output.
///
/// # Errors
/// Returns [`ExtractError::Decode`] for unreadable input,
/// [`ExtractError::Encode`] for write failures and
/// [`ExtractError::Cancelled`] when cancelled.
pub fn filter_archive(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    predicate: &Predicate,
    level: Option<i32>,
    cancel: Option<&CancelToken>,
) -> Result<FilterStats> {
    let reader = RecordReader::open(input)?;
    let mut writer = RecordWriter::create(output, level)?;
    let mut stats = FilterStats::default();

    for record in reader {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(ExtractError::Cancelled);
        }
        let record = record?;
        stats.read += 1;
        if predicate.keep(&record) {
            writer.write_record(&record)?;
            stats.kept += 1;
            if stats.kept % PROGRESS_EVERY == 0 {
                debug!(kept = stats.kept, read = stats.read, "filter progress");
            }
        }
    }

    writer.finish()?;
    Ok(stats)
}
