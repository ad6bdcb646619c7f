//! Solver invocation: one external program, one instance, one time budget.
//!
//! The invoker spawns the solver, writes the instance to its stdin, drains
//! stdout and stderr while waiting, and enforces a hard wall-clock timeout.
//! Every failure mode is reported through [`InvocationStatus`]; nothing here
//! returns an error, so a misbehaving solver never stops an experiment.
//!
//! The child is always reaped before [`SolverInvoker::invoke`] returns,
//! including after a timeout kill.

use std::fmt;
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::SolverSpec;

/// Matches either label form solvers use to report their selection size.
static SCORE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:Number of rectangles selected|Rectangles selected)\s*:\s*(\d+)")
        .expect("score pattern is a valid regex")
});

/// How long to keep draining pipes after the child has exited or been killed.
///
/// Grandchildren that inherited the pipes can keep them open indefinitely.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Outcome class of a single invocation. Exactly one holds per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    /// Exited successfully and reported a score
    Ok,
    /// Killed after exceeding its budget
    Timeout,
    /// Exited with a non-zero code or was killed by a signal
    Error,
    /// Exited successfully but no score line was found
    ParseError,
    /// The program could not be located or started
    ExecNotFound,
}

impl InvocationStatus {
    /// All statuses, in reporting order.
    pub const ALL: [InvocationStatus; 5] = [
        Self::Ok,
        Self::Timeout,
        Self::Error,
        Self::ParseError,
        Self::ExecNotFound,
    ];

    /// Name used in logs and the run log.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Timeout => "timeout",
            Self::Error => "error",
            Self::ParseError => "parse_error",
            Self::ExecNotFound => "exec_not_found",
        }
    }

    pub fn is_failure(&self) -> bool {
        *self != Self::Ok
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of running one solver against one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    /// Reported selection size; present only when `status` is `Ok`
    pub score: Option<u64>,
    /// Wall-clock time until exit or forced termination
    pub elapsed: Duration,
    /// Captured stdout followed by stderr, for diagnostics
    pub raw_output: String,
    pub status: InvocationStatus,
}

impl InvocationResult {
    /// A successful invocation that reported `score`.
    pub fn ok(score: u64, elapsed: Duration, raw_output: impl Into<String>) -> Self {
        Self {
            score: Some(score),
            elapsed,
            raw_output: raw_output.into(),
            status: InvocationStatus::Ok,
        }
    }

    /// A failed invocation. `status` must not be `Ok`.
    pub fn failed(
        status: InvocationStatus,
        elapsed: Duration,
        raw_output: impl Into<String>,
    ) -> Self {
        debug_assert!(status.is_failure());
        Self {
            score: None,
            elapsed,
            raw_output: raw_output.into(),
            status,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == InvocationStatus::Ok
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Extract the first reported score from solver output.
///
/// Returns `None` when no score line exists or the number does not fit in a `u64`.
pub fn parse_score(output: &str) -> Option<u64> {
    SCORE_PATTERN
        .captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Runs external solver programs.
#[derive(Debug, Clone)]
pub struct SolverInvoker {
    drain_grace: Duration,
}

impl Default for SolverInvoker {
    fn default() -> Self {
        Self {
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }
}

impl SolverInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how long pipes are drained after the child is gone.
    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Run `spec` with `input` on stdin under `spec.timeout_secs`.
    pub async fn invoke(&self, spec: &SolverSpec, input: &str) -> InvocationResult {
        let budget = spec.timeout();
        let start = Instant::now();

        let mut child = match Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    solver = %spec.label,
                    program = %spec.program.display(),
                    error = %e,
                    "Solver could not be started"
                );
                return InvocationResult::failed(
                    InvocationStatus::ExecNotFound,
                    Duration::ZERO,
                    format!("failed to start {}: {}", spec.program.display(), e),
                );
            }
        };

        // Feed stdin and drain both output pipes concurrently with the wait,
        // so neither side can block on a full pipe buffer.
        let stdin_task = child.stdin.take().map(|mut stdin| {
            let bytes = input.as_bytes().to_vec();
            tokio::spawn(async move {
                stdin.write_all(&bytes).await?;
                stdin.shutdown().await
            })
        });
        let stdout_task = child.stdout.take().map(spawn_drain);
        let stderr_task = child.stderr.take().map(spawn_drain);

        let exit = match tokio::time::timeout(budget, child.wait()).await {
            Ok(Ok(status)) => Exit::Exited(status),
            Ok(Err(e)) => Exit::WaitFailed(e.to_string()),
            Err(_) => {
                // kill() also waits, so the child is reaped here.
                if let Err(e) = child.kill().await {
                    warn!(solver = %spec.label, error = %e, "Failed to kill timed-out solver");
                }
                Exit::TimedOut
            }
        };
        let elapsed = start.elapsed();

        if let Some(task) = stdin_task {
            match join_within(self.drain_grace, task).await {
                Some(Err(e)) if e.kind() != ErrorKind::BrokenPipe => {
                    debug!(solver = %spec.label, error = %e, "Writing instance to solver failed");
                }
                _ => {}
            }
        }

        let mut raw_output = String::new();
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            if let Some(bytes) = join_within(self.drain_grace, task).await {
                raw_output.push_str(&String::from_utf8_lossy(&bytes));
            }
        }

        let result = match exit {
            Exit::TimedOut => {
                raw_output.push_str(&format!(
                    "\n[killed after {:.1}s timeout]\n",
                    budget.as_secs_f64()
                ));
                InvocationResult::failed(InvocationStatus::Timeout, elapsed, raw_output)
            }
            Exit::WaitFailed(message) => {
                raw_output.push_str(&format!("\n[wait failed: {}]\n", message));
                InvocationResult::failed(InvocationStatus::Error, elapsed, raw_output)
            }
            Exit::Exited(status) if !status.success() => {
                debug!(solver = %spec.label, status = %status, "Solver exited unsuccessfully");
                InvocationResult::failed(InvocationStatus::Error, elapsed, raw_output)
            }
            Exit::Exited(_) => match parse_score(&raw_output) {
                Some(score) => InvocationResult::ok(score, elapsed, raw_output),
                None => InvocationResult::failed(InvocationStatus::ParseError, elapsed, raw_output),
            },
        };

        if result.status.is_failure() {
            warn!(
                solver = %spec.label,
                status = %result.status,
                elapsed_secs = format!("{:.3}", result.elapsed_secs()),
                "Solver invocation failed"
            );
        }

        result
    }
}

/// How the wait on the child ended.
enum Exit {
    Exited(std::process::ExitStatus),
    WaitFailed(String),
    TimedOut,
}

fn spawn_drain<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!(error = %e, "Reading solver output failed");
        }
        buf
    })
}

/// Await a helper task for at most `grace`, aborting it if it overruns.
async fn join_within<T>(grace: Duration, mut task: JoinHandle<T>) -> Option<T> {
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            debug!(error = %e, "Solver I/O task failed");
            None
        }
        Err(_) => {
            task.abort();
            None
        }
    }
}
