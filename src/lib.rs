//! # redsift
//!
//! Resumable, parallel extraction of filtered records from directories of
//! compressed newline-delimited JSON archives (zstd, xz, bzip2), such as the
//! monthly Reddit comment and submission dumps.
//!
//! ## Pipeline
//!
//! 1. The [`planner`] lists the input archives, smallest first, and skips
//!    those the [`ledger`] already records as complete.
//! 2. The [`runner`] filters every remaining archive on a bounded rayon pool,
//!    writing one intermediate archive per input into the work directory and
//!    recording each success in the ledger.
//! 3. The [`merge`] step concatenates all intermediates, in path order, into
//!    the final archive.
//!
//! The first failing task cancels the rest; the run then returns that error
//! and no final archive is produced. Re-running with `resume` set picks up
//! from the ledger without redoing completed inputs.
//!
//! ## Quick Start
//!
//! ```no_run
//! use redsift::{ExtractConfig, Predicate, extract};
//! # fn main() -> anyhow::Result<()> {
//!
//! let config = ExtractConfig {
//!     input_dir: "dumps/comments".into(),
//!     work_dir: "/tmp/reddit_extract".into(),
//!     output: "askscience.zst".into(),
//!     predicate: Predicate::subreddit(Some("AskScience")),
//!     resume: true,
//!     ..Default::default()
//! };
//! let summary = extract::run(&config)?;
//! println!("{} records", summary.records);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `compression-zstd` - `.zst` archives
//! - `compression-bzip2` - `.bz2` archives
//! - `compression-xz` - `.xz` archives
//!
//! All three are enabled by default.

pub mod error;
pub mod extract;
pub mod filter;
pub mod io;
pub mod ledger;
pub mod logging;
pub mod merge;
pub mod planner;
pub mod predicate;
pub mod runner;
pub mod staged;
pub mod verify;

pub use error::{ExtractError, Result};
pub use extract::{ExtractConfig, ExtractSummary};
pub use filter::{FilterStats, filter_archive};
pub use io::compression::{Algorithm, CodecConfig};
pub use io::records::{Record, RecordReader, RecordWriter};
pub use ledger::CompletionLedger;
pub use predicate::Predicate;
pub use runner::{CancelToken, RunReport, Runner, TaskState};
pub use verify::{VerifyOptions, VerifyOutcome};
