use thiserror::Error;

use super::JobId;

/// Engine-wide error taxonomy.
///
/// Structural errors (`QueueAlreadyExists`, `MissingStoreConnection`,
/// `UnknownQueue`, `JobAlreadyExists`) are raised synchronously to the caller
/// and never leave partial state behind. Per-job execution errors never take
/// this path: they are recorded on the job record as FAILED and surfaced via
/// the job-failed event.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("queue already registered: {0}")]
    QueueAlreadyExists(String),

    #[error("job already exists: {0}")]
    JobAlreadyExists(JobId),

    #[error("no store connection resolvable for queue: {0}")]
    MissingStoreConnection(String),

    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    #[error("unknown job: {0}")]
    UnknownJob(JobId),

    #[error("store: {0}")]
    Store(String),

    #[error("codec: {0}")]
    Codec(String),

    #[error("{0}")]
    Routine(String),
}
