//! InMemoryRunStore - 開発用の RunStore 実装
//!
//! Keeps the same on-disk shape a networked store would use, just in process
//! memory:
//! - one record per job at `<namespace>:<queue>:runs:<jobId>`
//! - one ordered id list per status at `<namespace>:<queue>:runs:<STATUS>`
//!
//! # Atomicity
//! Every port operation takes the single state mutex once and performs the
//! whole transition inside that critical section. That is this
//! implementation's equivalent of the scripted check-and-insert / atomic
//! pop-and-push a networked store would use: no half-updated record is ever
//! observable, and two concurrent claims cannot pop the same id.
//!
//! # List orientation
//! Lists are FIFO: enqueue pushes to the back, claims pop from the front, and
//! `move_all` drains front-to-back. Popping the destination from the front
//! therefore replays the source's original processing order. An adapter for
//! a store with LIFO-oriented lists must pick its push/pop ends to preserve
//! the same replay order, not assume them.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{EngineError, Job, JobId, JobStatus, StatusCounts, StoredJob};
use crate::ports::{PayloadCodec, RunStore};

/// Fields of one persisted job record.
#[derive(Debug, Clone)]
struct RecordFields {
    payload: Vec<u8>,
    status: JobStatus,
    failure_reason: Option<String>,
}

#[derive(Default)]
struct StoreState {
    /// record key -> fields
    records: HashMap<String, RecordFields>,
    /// list key -> job ids
    lists: HashMap<String, VecDeque<String>>,
}

/// In-memory [`RunStore`] implementation.
pub struct InMemoryRunStore {
    namespace: String,
    codec: Arc<dyn PayloadCodec>,
    state: Mutex<StoreState>,
}

impl InMemoryRunStore {
    pub fn new(namespace: impl Into<String>, codec: Arc<dyn PayloadCodec>) -> Self {
        Self {
            namespace: namespace.into(),
            codec,
            state: Mutex::new(StoreState::default()),
        }
    }

    fn record_key(&self, queue: &str, id: &JobId) -> String {
        format!("{}:{}:runs:{}", self.namespace, queue, id)
    }

    fn list_key(&self, queue: &str, status: JobStatus) -> String {
        format!("{}:{}:runs:{}", self.namespace, queue, status.as_str())
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn enqueue_job(
        &self,
        queue: &str,
        id: &JobId,
        payload: &[u8],
    ) -> Result<(), EngineError> {
        let stored = self.codec.compress(payload)?;
        let record_key = self.record_key(queue, id);
        let pending_key = self.list_key(queue, JobStatus::Pending);

        // Existence check and write stay inside one critical section.
        let mut state = self.state.lock().await;
        if state.records.contains_key(&record_key) {
            return Err(EngineError::JobAlreadyExists(id.clone()));
        }
        state.records.insert(
            record_key,
            RecordFields {
                payload: stored,
                status: JobStatus::Pending,
                failure_reason: None,
            },
        );
        state
            .lists
            .entry(pending_key)
            .or_default()
            .push_back(id.to_string());
        Ok(())
    }

    async fn fetch_jobs(
        &self,
        queue: &str,
        from: JobStatus,
        limit: usize,
    ) -> Result<Vec<Job>, EngineError> {
        let from_key = self.list_key(queue, from);
        let running_key = self.list_key(queue, JobStatus::Running);

        // Claim phase: pop-and-move each id atomically.
        let claimed = {
            let mut state = self.state.lock().await;
            let mut claimed = Vec::new();
            for _ in 0..limit {
                let Some(id) = state.lists.get_mut(&from_key).and_then(VecDeque::pop_front)
                else {
                    break;
                };
                state
                    .lists
                    .entry(running_key.clone())
                    .or_default()
                    .push_back(id.clone());
                let record_key = format!("{}:{}:runs:{}", self.namespace, queue, id);
                let Some(record) = state.records.get_mut(&record_key) else {
                    // List/record divergence would be a store bug; surface it.
                    return Err(EngineError::Store(format!(
                        "listed job without record: {record_key}"
                    )));
                };
                record.status = JobStatus::Running;
                claimed.push((id, record.payload.clone()));
            }
            claimed
        };

        // Read phase: each job is exclusively ours now, so decompression can
        // happen outside the critical section.
        claimed
            .into_iter()
            .map(|(id, stored)| {
                let payload = self.codec.decompress(&stored)?;
                Ok(Job::new(JobId::new(id), payload))
            })
            .collect()
    }

    async fn complete_job(&self, queue: &str, id: &JobId) -> Result<(), EngineError> {
        self.finish_job(queue, id, JobStatus::Completed, None).await
    }

    async fn fail_job(&self, queue: &str, id: &JobId, reason: &str) -> Result<(), EngineError> {
        self.finish_job(queue, id, JobStatus::Failed, Some(reason.to_string()))
            .await
    }

    async fn update_job_payload(
        &self,
        queue: &str,
        id: &JobId,
        payload: &[u8],
    ) -> Result<(), EngineError> {
        let stored = self.codec.compress(payload)?;
        let record_key = self.record_key(queue, id);

        let mut state = self.state.lock().await;
        let record = state
            .records
            .get_mut(&record_key)
            .ok_or_else(|| EngineError::UnknownJob(id.clone()))?;
        record.payload = stored;
        Ok(())
    }

    async fn move_all(
        &self,
        queue: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<Vec<JobId>, EngineError> {
        let from_key = self.list_key(queue, from);
        let to_key = self.list_key(queue, to);

        let mut state = self.state.lock().await;
        let drained: Vec<String> = state
            .lists
            .get_mut(&from_key)
            .map(|list| list.drain(..).collect())
            .unwrap_or_default();

        // Front-to-back append keeps the destination replayable in the
        // source's original processing order.
        for id in &drained {
            state
                .lists
                .entry(to_key.clone())
                .or_default()
                .push_back(id.clone());
            let record_key = format!("{}:{}:runs:{}", self.namespace, queue, id);
            if let Some(record) = state.records.get_mut(&record_key) {
                record.status = to;
            }
        }
        Ok(drained.into_iter().map(JobId::new).collect())
    }

    async fn job_record(&self, queue: &str, id: &JobId) -> Result<Option<StoredJob>, EngineError> {
        let record_key = self.record_key(queue, id);
        let state = self.state.lock().await;
        Ok(state.records.get(&record_key).map(|record| StoredJob {
            id: id.clone(),
            status: record.status,
            payload: record.payload.clone(),
            failure_reason: record.failure_reason.clone(),
        }))
    }

    async fn counts_by_status(&self, queue: &str) -> Result<StatusCounts, EngineError> {
        let state = self.state.lock().await;
        let len = |status: JobStatus| {
            state
                .lists
                .get(&self.list_key(queue, status))
                .map_or(0, VecDeque::len)
        };
        Ok(StatusCounts {
            pending: len(JobStatus::Pending),
            running: len(JobStatus::Running),
            stalled: len(JobStatus::Stalled),
            completed: len(JobStatus::Completed),
            failed: len(JobStatus::Failed),
        })
    }
}

impl InMemoryRunStore {
    /// Shared tail of complete/fail: one critical section moving the id out
    /// of Running into its terminal list and updating the record.
    async fn finish_job(
        &self,
        queue: &str,
        id: &JobId,
        terminal: JobStatus,
        reason: Option<String>,
    ) -> Result<(), EngineError> {
        debug_assert!(terminal.is_terminal());
        let record_key = self.record_key(queue, id);
        let running_key = self.list_key(queue, JobStatus::Running);
        let terminal_key = self.list_key(queue, terminal);

        let mut state = self.state.lock().await;
        if !state.records.contains_key(&record_key) {
            return Err(EngineError::UnknownJob(id.clone()));
        }
        if let Some(running) = state.lists.get_mut(&running_key) {
            running.retain(|member| member != id.as_str());
        }
        state
            .lists
            .entry(terminal_key)
            .or_default()
            .push_back(id.to_string());
        let record = state
            .records
            .get_mut(&record_key)
            .expect("checked above inside the same lock");
        record.status = terminal;
        record.failure_reason = reason;
        Ok(())
    }
}
