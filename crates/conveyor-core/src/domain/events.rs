//! Lifecycle events an external listener may subscribe to.
//!
//! Internal coordination (worker-added, pool-request, pool-process,
//! job-complete, job-fail) travels as typed messages on each queue's actor
//! channel; only these lifecycle events cross the engine boundary.

use super::{JobId, WorkerId};

/// Events published on the engine's broadcast channel.
///
/// A lagging subscriber loses old events, it never blocks the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    QueueRegistered {
        queue: String,
    },
    WorkerRegistered {
        queue: String,
        worker: WorkerId,
    },
    JobCompleted {
        queue: String,
        job: JobId,
    },
    JobFailed {
        queue: String,
        job: JobId,
        reason: String,
    },
}
