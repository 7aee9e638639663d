//! Execution backends: in-process routine call vs. isolated child process.
//!
//! Every worker carries a [`WorkerConfig`] choosing one of two modes:
//! - **Local**: the routine runs as a future on this process's event loop.
//!   Cheap, but a panic-free contract is on the routine author.
//! - **Isolated**: the job is shipped to a freshly spawned OS process over a
//!   one-shot message exchange. True parallelism and fault containment: a
//!   crash or hang in worker code cannot corrupt this process's state.
//!
//! Either way the outcome funnels into the same job-complete / job-fail
//! reporting; the pool does not care which backend ran the job.

pub mod process;

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{EngineError, Job};

pub use self::process::{ExecRequest, ExecResponse, ExecStatus, ProcessExecutor};

/// The processing routine a worker runs in local mode.
///
/// Takes the whole [`Job`] so the routine can decode the payload as it likes
/// (JSON, bytes, ...). An `Err` becomes the job's failure reason verbatim.
#[async_trait]
pub trait JobRoutine: Send + Sync {
    async fn run(&self, job: &Job) -> Result<(), EngineError>;
}

/// Execution mode of one worker.
#[derive(Clone)]
pub enum ExecMode {
    /// Invoke the routine in-process.
    Local,

    /// Spawn a child process per job and exchange one request/response.
    Isolated(IsolatedConfig),
}

/// Configuration for isolated execution.
#[derive(Debug, Clone)]
pub struct IsolatedConfig {
    /// Executable implementing the child side of the exchange
    /// (e.g. `conveyor-runner`).
    pub program: std::path::PathBuf,

    /// Extra arguments passed to the child.
    pub args: Vec<String>,

    /// Reference to the worker's routine source, shipped in the request so
    /// the child knows what to load.
    pub routine_source: String,

    /// Shared context forwarded to every isolated invocation of this worker.
    pub context: serde_json::Value,
}

/// Per-worker execution configuration.
#[derive(Clone)]
pub struct WorkerConfig {
    pub mode: ExecMode,
}

impl WorkerConfig {
    pub fn local() -> Self {
        Self {
            mode: ExecMode::Local,
        }
    }

    pub fn isolated(config: IsolatedConfig) -> Self {
        Self {
            mode: ExecMode::Isolated(config),
        }
    }
}

/// Run one job through the worker's configured backend.
///
/// Returns the failure reason on error; the caller persists it via
/// `fail_job`. Spawn-level failures of isolated execution come back with a
/// `spawn failed:` prefix so they are distinguishable from worker-code
/// failures.
pub async fn run_job(
    routine: &Arc<dyn JobRoutine>,
    config: &WorkerConfig,
    job: &Job,
) -> Result<(), String> {
    match &config.mode {
        ExecMode::Local => routine.run(job).await.map_err(|e| e.to_string()),
        ExecMode::Isolated(isolated) => {
            ProcessExecutor::new(isolated.clone()).execute(job).await
        }
    }
}
