//! Bounded parallel execution of extraction tasks.
//!
//! [`Runner::run`] keeps at most `threads` tasks in flight on a dedicated
//! rayon pool. The calling thread dispatches tasks in plan order and waits on a
//! channel for whichever task finishes next. Each success is recorded in the
//! [`CompletionLedger`] before the next result is looked at.
//!
//! # Cancellation
//!
//! The first failure sets the run's [`CancelToken`]. From then on no task is
//! dispatched, workers stop at their next record boundary and report
//! [`TaskOutcome::Cancelled`], and the runner waits for every in-flight task
//! to settle before returning the original error. Cancelled and failed tasks
//! never reach the ledger and their partial outputs are removed.

use crate::error::{ExtractError, Result};
use crate::filter::{FilterStats, filter_archive};
use crate::ledger::CompletionLedger;
use crate::planner::Task;
use crate::predicate::Predicate;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared, set-once cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` for the call that set the flag.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Lifecycle of a task: `Pending -> Running -> {Succeeded, Failed, Cancelled}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// What a worker reports back for one task.
#[derive(Debug)]
pub enum TaskOutcome {
    Succeeded(FilterStats),
    Failed(ExtractError),
    Cancelled,
}

/// Per-task settings shared by every worker of a run.
#[derive(Clone, Debug, Default)]
pub struct WorkerConfig {
    pub predicate: Predicate,
    /// Compression level of intermediate outputs; codec default when `None`.
    pub level: Option<i32>,
}

/// Final state of one task.
#[derive(Clone, Debug)]
pub struct TaskReport {
    pub input: String,
    pub output: PathBuf,
    pub state: TaskState,
    pub stats: Option<FilterStats>,
}

/// How every task of a run settled.
#[derive(Clone, Debug, Default)]
pub struct RunReport {
    /// Every task, in dispatch order.
    pub tasks: Vec<TaskReport>,
    /// Intermediates produced by this run, in completion order.
    pub outputs: Vec<PathBuf>,
}

impl RunReport {
    /// Records kept across all succeeded tasks.
    #[must_use]
    pub fn records_kept(&self) -> u64 {
        self.tasks.iter().filter_map(|t| t.stats).map(|s| s.kept).sum()
    }
}

/// Default worker count: all cores but one, at least one.
#[must_use]
pub fn default_threads() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

pub struct Runner {
    pub threads: usize,
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            threads: default_threads(),
        }
    }
}

/// Scheduler-side bookkeeping for one run.
struct RunState {
    cancel: CancelToken,
    states: Vec<TaskState>,
    stats: Vec<Option<FilterStats>>,
    in_flight: usize,
    outputs: Vec<PathBuf>,
    first_error: Option<ExtractError>,
}

impl RunState {
    fn new(n: usize) -> Self {
        Self {
            cancel: CancelToken::new(),
            states: vec![TaskState::Pending; n],
            stats: vec![None; n],
            in_flight: 0,
            outputs: Vec::new(),
            first_error: None,
        }
    }

    fn start(&mut self, idx: usize) {
        debug_assert_eq!(self.states[idx], TaskState::Pending);
        self.states[idx] = TaskState::Running;
        self.in_flight += 1;
    }

    fn settle(&mut self, idx: usize, state: TaskState) {
        debug_assert_eq!(self.states[idx], TaskState::Running);
        self.states[idx] = state;
        self.in_flight -= 1;
    }

    fn on_outcome(
        &mut self,
        task: &Task,
        idx: usize,
        outcome: TaskOutcome,
        ledger: &CompletionLedger,
    ) {
        match outcome {
            TaskOutcome::Succeeded(stats) => {
                // Only a committed output with a persisted ledger entry counts.
                match ledger.append_and_persist(&task.input.name, &task.output) {
                    Ok(()) => {
                        self.stats[idx] = Some(stats);
                        self.settle(idx, TaskState::Succeeded);
                        self.outputs.push(task.output.clone());
                        info!(
                            input = %task.input.name,
                            read = stats.read,
                            kept = stats.kept,
                            "completed"
                        );
                    }
                    Err(e) => {
                        self.settle(idx, TaskState::Failed);
                        self.fail(&task.input.name, e);
                    }
                }
            }
            TaskOutcome::Failed(e) => {
                self.settle(idx, TaskState::Failed);
                self.fail(&task.input.name, e);
            }
            TaskOutcome::Cancelled => {
                self.settle(idx, TaskState::Cancelled);
                debug!(input = %task.input.name, "cancelled");
            }
        }
    }

    fn fail(&mut self, input: &str, err: ExtractError) {
        if self.cancel.cancel() {
            info!("cancelling outstanding tasks");
        }
        if self.first_error.is_none() {
            error!(input, error = %err, "task failed");
            self.first_error = Some(ExtractError::Task {
                input: input.to_string(),
                source: Box::new(err),
            });
        } else {
            warn!(input, error = %err, "additional task failure");
        }
    }
}

impl Runner {
    #[must_use]
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    /// Execute `tasks` and record each success in `ledger`.
    ///
    /// # Errors
    /// Returns the first task failure (decode, encode or ledger write) once
    /// every in-flight task has settled, or [`ExtractError::Config`] if the
    /// worker pool cannot be started.
    pub fn run(
        &self,
        tasks: &[Task],
        config: &WorkerConfig,
        ledger: &CompletionLedger,
    ) -> Result<RunReport> {
        match self.run_settled(tasks, config, ledger)? {
            (_, Some(err)) => Err(err),
            (report, None) => Ok(report),
        }
    }

    /// Like [`Runner::run`], but hand back the report alongside the first
    /// task failure instead of discarding it.
    ///
    /// # Errors
    /// Returns [`ExtractError::Config`] if the worker pool cannot be started.
    pub fn run_settled(
        &self,
        tasks: &[Task],
        config: &WorkerConfig,
        ledger: &CompletionLedger,
    ) -> Result<(RunReport, Option<ExtractError>)> {
        let threads = self.threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("redsift-worker-{i}"))
            .build()
            .map_err(|e| ExtractError::Config(format!("cannot start worker pool: {e}")))?;

        let mut state = RunState::new(tasks.len());
        let (tx, rx) = mpsc::channel::<(usize, TaskOutcome)>();

        pool.in_place_scope(|scope| {
            let mut next = 0;
            loop {
                while state.in_flight < threads
                    && next < tasks.len()
                    && !state.cancel.is_cancelled()
                {
                    let idx = next;
                    next += 1;
                    state.start(idx);
                    let task = &tasks[idx];
                    let tx = tx.clone();
                    let cancel = state.cancel.clone();
                    debug!(input = %task.input.name, size = task.input.size, "dispatching");
                    scope.spawn(move |_| {
                        let outcome = run_task(task, config, &cancel);
                        // The receiver outlives the scope.
                        let _ = tx.send((idx, outcome));
                    });
                }
                if state.in_flight == 0 {
                    break;
                }
                let Ok((idx, outcome)) = rx.recv() else {
                    break;
                };
                state.on_outcome(&tasks[idx], idx, outcome, ledger);
            }
        });

        let RunState {
            states,
            stats,
            outputs,
            first_error,
            ..
        } = state;
        let tasks = tasks
            .iter()
            .zip(states)
            .zip(stats)
            .map(|((task, state), stats)| TaskReport {
                input: task.input.name.clone(),
                output: task.output.clone(),
                state,
                stats,
            })
            .collect();
        Ok((RunReport { tasks, outputs }, first_error))
    }
}

fn run_task(task: &Task, config: &WorkerConfig, cancel: &CancelToken) -> TaskOutcome {
    if cancel.is_cancelled() {
        return TaskOutcome::Cancelled;
    }
    guarded(&task.input.path, || {
        filter_archive(
            &task.input.path,
            &task.output,
            &config.predicate,
            config.level,
            Some(cancel),
        )
    })
}

/// Run one task body, turning a panic into [`ExtractError::WorkerPanic`].
fn guarded(path: &Path, body: impl FnOnce() -> Result<FilterStats>) -> TaskOutcome {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(stats)) => TaskOutcome::Succeeded(stats),
        Ok(Err(ExtractError::Cancelled)) => TaskOutcome::Cancelled,
        Ok(Err(e)) => TaskOutcome::Failed(e),
        Err(payload) => TaskOutcome::Failed(ExtractError::WorkerPanic {
            path: path.to_path_buf(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panicking_task_becomes_worker_panic() {
        let outcome = guarded(Path::new("in/RC_2015-01.zst"), || panic!("boom"));
        match outcome {
            TaskOutcome::Failed(ExtractError::WorkerPanic { path, message }) => {
                assert_eq!(path, Path::new("in/RC_2015-01.zst"));
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn formatted_panic_message_is_kept() {
        let outcome = guarded(Path::new("x.zst"), || panic!("bad record {}", 7));
        assert!(matches!(
            outcome,
            TaskOutcome::Failed(ExtractError::WorkerPanic { ref message, .. }) if message == "bad record 7"
        ));
    }

    #[test]
    fn non_string_payload_is_described() {
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn cancellation_is_not_a_failure() {
        let outcome = guarded(Path::new("x.zst"), || Err(ExtractError::Cancelled));
        assert!(matches!(outcome, TaskOutcome::Cancelled));
    }
}
