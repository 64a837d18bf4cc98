//! End-to-end directory extraction: plan, filter in parallel, merge.

use crate::error::{ExtractError, Result};
use crate::io::compression::{Algorithm, CodecConfig, validate_level};
use crate::ledger::CompletionLedger;
use crate::merge::merge;
use crate::planner::plan;
use crate::predicate::Predicate;
use crate::runner::{RunReport, Runner, WorkerConfig, default_threads};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Name of the default work directory under the system temp dir.
pub const DEFAULT_WORK_DIR_NAME: &str = "reddit_extract";

/// Options of one extraction run.
#[derive(Clone, Debug)]
pub struct ExtractConfig {
    /// Directory holding the input archives.
    pub input_dir: PathBuf,
    /// Directory for intermediates and the completion ledger.
    pub work_dir: PathBuf,
    /// Final merged archive; its extension selects the codec.
    pub output: PathBuf,
    pub predicate: Predicate,
    /// Worker count.
    pub threads: usize,
    /// Codec of the per-file intermediates.
    pub intermediate: CodecConfig,
    /// Compression level of the final archive.
    pub final_level: Option<i32>,
    /// Reuse the ledger and intermediates of a previous run.
    pub resume: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            work_dir: std::env::temp_dir().join(DEFAULT_WORK_DIR_NAME),
            output: PathBuf::from("out.zst"),
            predicate: Predicate::keep_all(),
            threads: default_threads(),
            intermediate: CodecConfig::default(),
            final_level: None,
            resume: false,
        }
    }
}

impl ExtractConfig {
    /// Reject unusable codec settings before any file is touched.
    ///
    /// # Errors
    /// Returns [`ExtractError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.intermediate.validate()?;
        let final_algo = Algorithm::from_path(&self.output);
        validate_level(final_algo, self.final_level)?;
        if let Some(algo) = final_algo {
            algo.codec()?;
        }
        Ok(())
    }
}

/// Outcome of a successful run.
#[derive(Clone, Debug, Default)]
pub struct ExtractSummary {
    /// Inputs processed by this run.
    pub processed: usize,
    /// Intermediates reused from a previous run.
    pub resumed: usize,
    /// Records in the final archive.
    pub records: u64,
    pub report: RunReport,
}

/// Run the whole pipeline described by `config`.
///
/// Nothing is written to `config.output` unless every task and the merge
/// succeed.
///
/// # Errors
/// Returns the first fatal error: invalid configuration, an unusable work
/// directory or ledger, a failed task (after all in-flight tasks settled) or
/// a failed merge.
pub fn run(config: &ExtractConfig) -> Result<ExtractSummary> {
    config.validate()?;
    fs::create_dir_all(&config.work_dir).map_err(|source| ExtractError::Io {
        path: config.work_dir.clone(),
        source,
    })?;

    let ledger = if config.resume {
        CompletionLedger::load(&config.work_dir, config.intermediate.algorithm)?
    } else {
        CompletionLedger::create_fresh(&config.work_dir)?
    };

    let plan = plan(
        &config.input_dir,
        &config.work_dir,
        config.intermediate.algorithm,
        &ledger,
    )?;
    info!(
        pending = plan.tasks.len(),
        resumed = plan.resumed.len(),
        threads = config.threads,
        intermediate = %config.intermediate.algorithm,
        level = config.intermediate.effective_level(),
        "starting extraction"
    );

    let worker = WorkerConfig {
        predicate: config.predicate.clone(),
        level: config.intermediate.level,
    };
    let report = Runner::new(config.threads).run(&plan.tasks, &worker, &ledger)?;

    let mut outputs = plan.resumed.clone();
    outputs.extend(report.outputs.iter().cloned());
    let records = merge(&outputs, &config.output, config.final_level)?;

    Ok(ExtractSummary {
        processed: report.outputs.len(),
        resumed: plan.resumed.len(),
        records,
        report,
    })
}
