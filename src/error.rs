//! Error kinds raised by the extraction pipeline.
//!
//! Every variant that concerns a file carries its path, so the message printed
//! for a fatal error always names the offending input.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the library.
pub type Result<T, E = ExtractError> = std::result::Result<T, E>;

/// Errors produced while planning, filtering, persisting or merging archives.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A corrupt or unreadable archive, or a line that is not a JSON object.
    #[error("failed to decode {}{}: {source}", path.display(), fmt_line(*line))]
    Decode {
        /// Archive being read.
        path: PathBuf,
        /// 1-based line number inside the decompressed stream, when known.
        line: Option<u64>,
        /// Underlying codec, I/O or JSON error.
        #[source]
        source: io::Error,
    },

    /// Failure writing an intermediate or final archive.
    #[error("failed to write {}: {source}", path.display())]
    Encode {
        /// Archive being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The task stopped because another task failed first.
    #[error("task cancelled after a failure elsewhere in the run")]
    Cancelled,

    /// The completion ledger could not be read or replaced.
    #[error("completion ledger {} is unusable: {source}", path.display())]
    LedgerIo {
        /// Canonical ledger path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An intermediate output listed as complete could not be read back.
    #[error("cannot merge intermediate output {}{}: {source}", path.display(), fmt_line(*line))]
    MergeRead {
        /// Intermediate archive being merged.
        path: PathBuf,
        /// 1-based line number, when known.
        line: Option<u64>,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A worker thread panicked while processing an input.
    #[error("worker panicked while processing {}: {message}", path.display())]
    WorkerPanic {
        /// Input being processed.
        path: PathBuf,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// A task failed; names the input file it was processing.
    #[error("error in {input}: {source}")]
    Task {
        /// Input file name within the input directory.
        input: String,
        /// What went wrong while filtering or recording it.
        #[source]
        source: Box<ExtractError>,
    },

    /// Invalid options (unknown extension, level out of range, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Directory access outside of archive decoding.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    /// `true` for the expected fan-out of a real failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The underlying error, looking through [`ExtractError::Task`].
    #[must_use]
    pub fn cause(&self) -> &ExtractError {
        match self {
            Self::Task { source, .. } => source.cause(),
            other => other,
        }
    }

    /// Re-label a decode failure as a merge failure for the same file.
    pub(crate) fn into_merge_read(self) -> Self {
        match self {
            Self::Decode { path, line, source } => Self::MergeRead { path, line, source },
            other => other,
        }
    }
}

fn fmt_line(line: Option<u64>) -> String {
    line.map(|l| format!(" (line {l})")).unwrap_or_default()
}
