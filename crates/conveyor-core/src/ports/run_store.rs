//! RunStore port - ジョブ状態の正本（source of truth）
//!
//! RunStore は以下を管理します：
//! - per-job record（id, 圧縮済み payload, status, failure reason）
//! - status ごとの ordered list（PENDING / RUNNING / STALLED / COMPLETED / FAILED）
//!
//! # 設計原則
//! - Every operation is indivisible: no concurrent reader may observe a job
//!   half-updated (record written but not listed, or listed twice).
//! - The pop side of a claim is atomic, so two concurrent `fetch_jobs` calls
//!   can never both receive the same job id.
//! - A networked implementation maps these onto the store's own atomicity
//!   primitive (scripted execution or a transaction); the in-memory one uses
//!   a single critical section per call.

use async_trait::async_trait;

use crate::domain::{EngineError, Job, JobId, JobStatus, StatusCounts, StoredJob};

/// Persistence port for one engine's job state, namespaced per queue.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Atomically check non-existence of `id` in `queue`, then write the job
    /// record (status Pending, payload compressed at rest) and push the id
    /// onto the Pending list.
    ///
    /// The check and the write are one indivisible unit; two concurrent
    /// enqueues with the same id cannot both succeed.
    ///
    /// # Errors
    /// [`EngineError::JobAlreadyExists`] if the id is already present.
    async fn enqueue_job(&self, queue: &str, id: &JobId, payload: &[u8])
    -> Result<(), EngineError>;

    /// Atomically pop up to `limit` ids from the `from` list, moving each
    /// into the Running list and setting its status to Running. Returns the
    /// claimed jobs with decompressed payloads.
    ///
    /// An empty source list yields an empty `Vec`, not an error. Each
    /// individual pop-and-move is atomic; reading the claimed records may be
    /// batched non-atomically since each job is already exclusively owned.
    async fn fetch_jobs(
        &self,
        queue: &str,
        from: JobStatus,
        limit: usize,
    ) -> Result<Vec<Job>, EngineError>;

    /// Atomically set status Completed, remove the id from the Running list
    /// and push it onto the Completed list.
    async fn complete_job(&self, queue: &str, id: &JobId) -> Result<(), EngineError>;

    /// Atomically set status Failed with `reason`, remove the id from the
    /// Running list and push it onto the Failed list.
    async fn fail_job(&self, queue: &str, id: &JobId, reason: &str) -> Result<(), EngineError>;

    /// Overwrite the stored payload of an existing record. No status change.
    async fn update_job_payload(
        &self,
        queue: &str,
        id: &JobId,
        payload: &[u8],
    ) -> Result<(), EngineError>;

    /// Atomically drain every id in the `from` list into the `to` list,
    /// updating each record's status to `to`. Returns the moved ids in the
    /// order they held in `from`.
    ///
    /// Order contract: replaying the `to` list from its claim end reproduces
    /// the original `from` processing order. Used once per process per queue
    /// for the Running -> Stalled crash-recovery drain.
    async fn move_all(
        &self,
        queue: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<Vec<JobId>, EngineError>;

    /// Current job record, or `None` if the id was never enqueued.
    async fn job_record(&self, queue: &str, id: &JobId) -> Result<Option<StoredJob>, EngineError>;

    /// Observability: per-status counts for one queue.
    async fn counts_by_status(&self, queue: &str) -> Result<StatusCounts, EngineError>;
}
