//! Job model and lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::JobId;

/// Job status.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Failed
/// - Running -> Stalled (startup drain after a crashed process) -> Running
///
/// Stalled is a side channel, not a step of the normal lifecycle: only the
/// one-shot recovery pass at process startup moves jobs into it, and draining
/// it puts them back through Running like any other claim.
///
/// Design note: Using an enum ensures exhaustive matching and prevents
/// invalid states. Serialized as SCREAMING_SNAKE_CASE, which is also the
/// spelling used in the persisted list keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Enqueued, waiting to be claimed.
    Pending,

    /// Claimed by a worker, execution in flight.
    Running,

    /// Left in Running by a previous process; retried once at startup.
    Stalled,

    /// Finished successfully.
    Completed,

    /// Finished with an error (reason recorded on the job record).
    Failed,
}

impl JobStatus {
    /// Spelling used in persisted keys and the wire protocol.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Stalled => "STALLED",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Is a job in this state eligible to be claimed by `fetch_jobs`?
    pub fn is_claimable(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Stalled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A claimed job as handed to a worker: id plus decompressed payload.
///
/// The payload is opaque bytes end to end; routines decode it however they
/// like (JSON, bytes, ...). Canonical job state stays in the store, this is
/// only the transient copy inside a worker's local batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub payload: Vec<u8>,
}

impl Job {
    pub fn new(id: impl Into<JobId>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// A job record as persisted: status and failure reason included, payload
/// still in its at-rest (compressed) form.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredJob {
    pub id: JobId,
    pub status: JobStatus,
    pub payload: Vec<u8>,
    pub failure_reason: Option<String>,
}

/// Per-status job counts for one queue (observability).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub stalled: usize,
    pub completed: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(JobStatus::Pending, "PENDING", false, true)]
    #[case(JobStatus::Running, "RUNNING", false, false)]
    #[case(JobStatus::Stalled, "STALLED", false, true)]
    #[case(JobStatus::Completed, "COMPLETED", true, false)]
    #[case(JobStatus::Failed, "FAILED", true, false)]
    fn status_table(
        #[case] status: JobStatus,
        #[case] name: &str,
        #[case] terminal: bool,
        #[case] claimable: bool,
    ) {
        assert_eq!(status.as_str(), name);
        assert_eq!(status.is_terminal(), terminal);
        assert_eq!(status.is_claimable(), claimable);
    }

    #[test]
    fn status_serializes_as_screaming_snake_case() {
        let s = serde_json::to_string(&JobStatus::Completed).unwrap();
        assert_eq!(s, "\"COMPLETED\"");

        let back: JobStatus = serde_json::from_str("\"STALLED\"").unwrap();
        assert_eq!(back, JobStatus::Stalled);
    }
}
