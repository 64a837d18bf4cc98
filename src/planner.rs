//! Input enumeration and task planning.
//!
//! The planner lists the archives of an input directory, orders them by size
//! (smallest first, ties broken by name), binds each to its intermediate
//! output path in the work directory and leaves out inputs the ledger already
//! marks as complete.
//!
//! Small files go first so the pool stays busy while the few large archives
//! are still decoding, instead of ending the run with one long straggler.

use crate::error::{ExtractError, Result};
use crate::io::compression::Algorithm;
use crate::ledger::CompletionLedger;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An archive found in the input directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputFile {
    /// File name within the input directory; the identity used by the ledger.
    pub name: String,
    pub path: PathBuf,
    /// Size in bytes, used for ordering.
    pub size: u64,
    /// Codec implied by the extension.
    pub algorithm: Algorithm,
}

/// One input bound to the intermediate archive it will produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub input: InputFile,
    pub output: PathBuf,
}

/// Ordered work for one run.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    /// Inputs still to process, smallest first.
    pub tasks: Vec<Task>,
    /// Intermediates already produced by a previous run.
    pub resumed: Vec<PathBuf>,
}

/// `RC_2015-01.bz2` with intermediate codec zst becomes `RC_2015-01.zst`.
#[must_use]
pub fn intermediate_name(input_name: &str, algorithm: Algorithm) -> String {
    let stem = Path::new(input_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(input_name);
    format!("{stem}.{}", algorithm.extension())
}

/// List the supported archives directly inside `input_dir`, smallest first.
///
/// Subdirectories, files with other extensions, non-UTF-8 names and names
/// holding a tab or line break are skipped.
///
/// # Errors
/// Returns [`ExtractError::Io`] if the directory or an entry's metadata
/// cannot be read.
pub fn scan_inputs(input_dir: impl AsRef<Path>) -> Result<Vec<InputFile>> {
    let input_dir = input_dir.as_ref();
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ExtractError::Io { path, source }
    };

    let mut inputs = Vec::new();
    for entry in fs::read_dir(input_dir).map_err(io_err(input_dir))? {
        let entry = entry.map_err(io_err(input_dir))?;
        let path = entry.path();
        let Some(algorithm) = Algorithm::from_path(&path) else {
            continue;
        };
        let meta = fs::metadata(&path).map_err(io_err(&path))?;
        if !meta.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %path.display(), "skipping input with a non UTF-8 name");
            continue;
        };
        // The ledger is tab-separated and line-oriented.
        if name.contains(['\t', '\n', '\r']) {
            warn!(path = %path.display(), "skipping input with a tab or line break in its name");
            continue;
        }
        inputs.push(InputFile {
            name,
            path,
            size: meta.len(),
            algorithm,
        });
    }

    inputs.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.name.cmp(&b.name)));
    Ok(inputs)
}

/// Build the task list for a run.
///
/// Ledger entries whose intermediate file is missing are dropped from the
/// ledger (with a warning) and their inputs are planned again.
///
/// # Errors
/// Returns [`ExtractError::Io`] if the input directory cannot be listed and
/// [`ExtractError::Config`] if two inputs would share an intermediate file.
pub fn plan(
    input_dir: impl AsRef<Path>,
    work_dir: impl AsRef<Path>,
    intermediate: Algorithm,
    ledger: &CompletionLedger,
) -> Result<Plan> {
    let work_dir = work_dir.as_ref();
    let inputs = scan_inputs(input_dir)?;

    let mut resumed = Vec::new();
    for (input, output) in ledger.entries() {
        if output.is_file() {
            resumed.push(output);
        } else {
            warn!(
                input = %input,
                intermediate = %output.display(),
                "intermediate output listed in the ledger is missing; reprocessing"
            );
            ledger.forget(&input);
        }
    }

    let mut claimed: HashMap<String, String> = HashMap::new();
    let mut tasks = Vec::with_capacity(inputs.len());
    for input in inputs {
        let out_name = intermediate_name(&input.name, intermediate);
        if let Some(other) = claimed.insert(out_name.clone(), input.name.clone()) {
            return Err(ExtractError::Config(format!(
                "inputs {other} and {} would both write {out_name}",
                input.name
            )));
        }
        if ledger.contains(&input.name) {
            debug!(input = %input.name, "already completed; skipping");
            continue;
        }
        tasks.push(Task {
            output: work_dir.join(&out_name),
            input,
        });
    }

    Ok(Plan { tasks, resumed })
}
