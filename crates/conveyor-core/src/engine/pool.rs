//! Per-queue worker pool actor.
//!
//! One actor owns one queue's runtime state: the worker registry, the FIFO
//! queue of idle worker ids, and the one-shot stalled-recovery flags. All of
//! it is mutated only by this actor's event loop, so no locking is needed.
//!
//! # Event protocol (delivered in emission order)
//! - **worker-added**: insert the worker idle, run startup recovery if this
//!   is the queue's first worker, then feed it a pool-request.
//! - **job-added**: if an idle worker exists, target it with a pool-request.
//! - **pool-request**: claim up to the fetch limit (stalled first, else
//!   pending) and append to the worker's local batch; no jobs, no change.
//! - **pool-process**: empty batch parks the worker idle; otherwise mark it
//!   busy and launch every batched job without awaiting.
//! - **job-complete / job-fail**: persist the terminal state, publish the
//!   lifecycle event, and count the batch down; at zero the worker goes back
//!   to idle and re-arms itself with a fresh pool-request.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use crate::domain::{EngineEvent, Job, JobId, JobStatus, WorkerId};
use crate::exec::{self, JobRoutine, WorkerConfig};
use crate::ports::RunStore;

/// Messages consumed by one queue's pool actor.
pub(crate) enum PoolEvent {
    WorkerAdded {
        worker: WorkerId,
        routine: Arc<dyn JobRoutine>,
        config: WorkerConfig,
    },
    JobAdded(JobId),
    PoolRequest(WorkerId),
    PoolProcess(WorkerId),
    JobComplete {
        worker: WorkerId,
        job: JobId,
    },
    JobFail {
        worker: WorkerId,
        job: JobId,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerStatus {
    Idle,
    Busy,
}

/// One registered worker: routine, execution config, and its locally-held
/// batch. Canonical job state stays in the store; `batch` is transient.
struct WorkerRecord {
    routine: Arc<dyn JobRoutine>,
    config: WorkerConfig,
    status: WorkerStatus,
    batch: Vec<Job>,
    /// Jobs of the current batch still in flight.
    outstanding: usize,
}

/// Actor state for one queue.
pub(crate) struct QueuePool {
    queue: String,
    store: Arc<dyn RunStore>,
    fetch_limit: usize,
    /// Own handle, for re-emitting follow-up events onto the same channel.
    tx: mpsc::UnboundedSender<PoolEvent>,
    events: broadcast::Sender<EngineEvent>,
    workers: HashMap<WorkerId, WorkerRecord>,
    /// Idle workers, fed oldest first.
    idle: VecDeque<WorkerId>,
    /// Startup recovery (Running -> Stalled) already ran for this process.
    recovery_ran: bool,
    /// Stalled list came back empty once; never consult it again.
    stalled_drained: bool,
}

impl QueuePool {
    pub(crate) fn new(
        queue: String,
        store: Arc<dyn RunStore>,
        fetch_limit: usize,
        tx: mpsc::UnboundedSender<PoolEvent>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            queue,
            store,
            fetch_limit,
            tx,
            events,
            workers: HashMap::new(),
            idle: VecDeque::new(),
            recovery_ran: false,
            stalled_drained: false,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PoolEvent>) {
        // Queues live for the process lifetime; the loop ends with the runtime.
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
        }
    }

    async fn handle(&mut self, event: PoolEvent) {
        match event {
            PoolEvent::WorkerAdded {
                worker,
                routine,
                config,
            } => self.on_worker_added(worker, routine, config).await,
            PoolEvent::JobAdded(job) => self.on_job_added(job),
            PoolEvent::PoolRequest(worker) => self.on_pool_request(worker).await,
            PoolEvent::PoolProcess(worker) => self.on_pool_process(worker),
            PoolEvent::JobComplete { worker, job } => {
                self.on_job_complete(worker, job).await;
            }
            PoolEvent::JobFail {
                worker,
                job,
                reason,
            } => {
                self.on_job_fail(worker, job, reason).await;
            }
        }
    }

    /// Startup protocol: before this queue reacts to anything else, drain
    /// jobs a previous process left in Running into Stalled. Runs once per
    /// process lifetime, on the first worker.
    async fn on_worker_added(
        &mut self,
        worker: WorkerId,
        routine: Arc<dyn JobRoutine>,
        config: WorkerConfig,
    ) {
        if !self.recovery_ran {
            self.recovery_ran = true;
            match self
                .store
                .move_all(&self.queue, JobStatus::Running, JobStatus::Stalled)
                .await
            {
                Ok(moved) if moved.is_empty() => self.stalled_drained = true,
                Ok(moved) => {
                    info!(queue = %self.queue, count = moved.len(), "recovered stalled jobs");
                }
                Err(e) => error!(queue = %self.queue, error = %e, "stalled recovery failed"),
            }
        }

        self.workers.insert(
            worker,
            WorkerRecord {
                routine,
                config,
                status: WorkerStatus::Idle,
                batch: Vec::new(),
                outstanding: 0,
            },
        );
        self.idle.push_back(worker);
        self.emit(PoolEvent::PoolRequest(worker));
    }

    fn on_job_added(&mut self, job: JobId) {
        debug!(queue = %self.queue, job = %job, "job added");
        // Target the longest-idle worker. It stays in the idle queue until
        // pool-process actually marks it busy, so an empty fetch leaves
        // state untouched.
        if let Some(&worker) = self.idle.front() {
            self.emit(PoolEvent::PoolRequest(worker));
        }
    }

    async fn on_pool_request(&mut self, worker: WorkerId) {
        if !self.workers.contains_key(&worker) {
            return;
        }
        let jobs = match self.claim_batch().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(queue = %self.queue, error = %e, "claim failed");
                return;
            }
        };
        if jobs.is_empty() {
            return; // no state change
        }
        let Some(record) = self.workers.get_mut(&worker) else {
            return;
        };
        record.batch.extend(jobs);
        self.emit(PoolEvent::PoolProcess(worker));
    }

    /// Claim up to the fetch limit. Stalled is drained with priority until it
    /// comes back empty once; from then on claims go straight to Pending for
    /// the rest of the process's life.
    async fn claim_batch(&mut self) -> Result<Vec<Job>, crate::domain::EngineError> {
        if !self.stalled_drained {
            let jobs = self
                .store
                .fetch_jobs(&self.queue, JobStatus::Stalled, self.fetch_limit)
                .await?;
            if !jobs.is_empty() {
                return Ok(jobs);
            }
            self.stalled_drained = true;
        }
        self.store
            .fetch_jobs(&self.queue, JobStatus::Pending, self.fetch_limit)
            .await
    }

    fn on_pool_process(&mut self, worker: WorkerId) {
        let Some(record) = self.workers.get_mut(&worker) else {
            return;
        };
        if record.batch.is_empty() {
            record.status = WorkerStatus::Idle;
            if !self.idle.contains(&worker) {
                self.idle.push_back(worker);
            }
            return;
        }

        record.status = WorkerStatus::Busy;
        self.idle.retain(|idle| *idle != worker);
        record.outstanding += record.batch.len();

        // Drain most-recently-fetched first. Every job is launched without
        // awaiting the previous one; the batch countdown is the only bound.
        while let Some(job) = record.batch.pop() {
            let routine = Arc::clone(&record.routine);
            let config = record.config.clone();
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let event = match exec::run_job(&routine, &config, &job).await {
                    Ok(()) => PoolEvent::JobComplete {
                        worker,
                        job: job.id,
                    },
                    Err(reason) => PoolEvent::JobFail {
                        worker,
                        job: job.id,
                        reason,
                    },
                };
                let _ = tx.send(event);
            });
        }
    }

    async fn on_job_complete(&mut self, worker: WorkerId, job: JobId) {
        match self.store.complete_job(&self.queue, &job).await {
            Ok(()) => {
                let _ = self.events.send(EngineEvent::JobCompleted {
                    queue: self.queue.clone(),
                    job,
                });
            }
            Err(e) => error!(queue = %self.queue, job = %job, error = %e, "complete failed"),
        }
        self.settle(worker);
    }

    async fn on_job_fail(&mut self, worker: WorkerId, job: JobId, reason: String) {
        match self.store.fail_job(&self.queue, &job, &reason).await {
            Ok(()) => {
                let _ = self.events.send(EngineEvent::JobFailed {
                    queue: self.queue.clone(),
                    job,
                    reason,
                });
            }
            Err(e) => error!(queue = %self.queue, job = %job, error = %e, "fail report failed"),
        }
        self.settle(worker);
    }

    /// Batch countdown: when the last in-flight job of a batch lands, the
    /// worker goes back to idle and immediately asks for more work.
    fn settle(&mut self, worker: WorkerId) {
        let Some(record) = self.workers.get_mut(&worker) else {
            return;
        };
        record.outstanding = record.outstanding.saturating_sub(1);
        if record.outstanding == 0 && record.batch.is_empty() {
            record.status = WorkerStatus::Idle;
            if !self.idle.contains(&worker) {
                self.idle.push_back(worker);
            }
            self.emit(PoolEvent::PoolRequest(worker));
        }
    }

    fn emit(&self, event: PoolEvent) {
        // send 失敗 = engine が既に落ちている。ここでは無視してよい
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EngineError;
    use crate::impls::InMemoryRunStore;
    use crate::ports::PassthroughCodec;
    use async_trait::async_trait;
    use std::time::Duration;
    use ulid::Ulid;

    struct OkRoutine;

    #[async_trait]
    impl JobRoutine for OkRoutine {
        async fn run(&self, _job: &Job) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct Harness {
        pool: QueuePool,
        rx: mpsc::UnboundedReceiver<PoolEvent>,
        store: Arc<InMemoryRunStore>,
    }

    /// Drives the actor by hand so worker bookkeeping is directly
    /// observable between events.
    fn harness() -> Harness {
        let store = Arc::new(InMemoryRunStore::new("conveyor", Arc::new(PassthroughCodec)));
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(16);
        let pool = QueuePool::new("mail".to_string(), store.clone(), 10, tx, events);
        Harness { pool, rx, store }
    }

    fn worker_id() -> WorkerId {
        WorkerId::from_ulid(Ulid::new())
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<PoolEvent>) -> PoolEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event expected")
            .expect("channel open")
    }

    #[tokio::test]
    async fn new_worker_is_parked_idle_when_queue_is_empty() {
        let mut h = harness();
        let w = worker_id();

        h.pool
            .handle(PoolEvent::WorkerAdded {
                worker: w,
                routine: Arc::new(OkRoutine),
                config: WorkerConfig::local(),
            })
            .await;

        // worker-added emits a pool-request for the newcomer.
        let PoolEvent::PoolRequest(target) = recv(&mut h.rx).await else {
            panic!("expected pool-request");
        };
        assert_eq!(target, w);

        h.pool.handle(PoolEvent::PoolRequest(w)).await;

        // Nothing to claim: no pool-process, worker still idle, batch empty.
        assert!(h.rx.try_recv().is_err());
        let record = h.pool.workers.get(&w).unwrap();
        assert_eq!(record.status, WorkerStatus::Idle);
        assert!(record.batch.is_empty());
        assert_eq!(h.pool.idle.front(), Some(&w));
    }

    #[tokio::test]
    async fn dispatch_marks_busy_and_settle_restores_idle() {
        let mut h = harness();
        let w = worker_id();
        h.store
            .enqueue_job("mail", &JobId::new("a"), b"x")
            .await
            .unwrap();

        h.pool
            .handle(PoolEvent::WorkerAdded {
                worker: w,
                routine: Arc::new(OkRoutine),
                config: WorkerConfig::local(),
            })
            .await;
        recv(&mut h.rx).await; // pool-request from worker-added

        h.pool.handle(PoolEvent::PoolRequest(w)).await;
        let PoolEvent::PoolProcess(target) = recv(&mut h.rx).await else {
            panic!("expected pool-process");
        };
        assert_eq!(target, w);
        assert_eq!(h.pool.workers.get(&w).unwrap().batch.len(), 1);

        h.pool.handle(PoolEvent::PoolProcess(w)).await;

        // In dispatch: busy, off the idle queue, batch drained, one in flight.
        let record = h.pool.workers.get(&w).unwrap();
        assert_eq!(record.status, WorkerStatus::Busy);
        assert!(record.batch.is_empty());
        assert_eq!(record.outstanding, 1);
        assert!(!h.pool.idle.contains(&w));

        // The spawned execution reports back through the channel.
        let done = recv(&mut h.rx).await;
        assert!(matches!(done, PoolEvent::JobComplete { .. }));
        h.pool.handle(done).await;

        // Countdown hit zero: idle again, re-armed with a pool-request.
        let record = h.pool.workers.get(&w).unwrap();
        assert_eq!(record.status, WorkerStatus::Idle);
        assert_eq!(record.outstanding, 0);
        assert!(h.pool.idle.contains(&w));
        assert!(matches!(recv(&mut h.rx).await, PoolEvent::PoolRequest(_)));
        assert_eq!(
            h.store
                .job_record("mail", &JobId::new("a"))
                .await
                .unwrap()
                .unwrap()
                .status,
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn first_worker_runs_stalled_recovery_before_anything_else() {
        let mut h = harness();
        // Simulate a crashed predecessor: one job stuck in Running.
        h.store
            .enqueue_job("mail", &JobId::new("a"), b"x")
            .await
            .unwrap();
        h.store
            .fetch_jobs("mail", JobStatus::Pending, 1)
            .await
            .unwrap();
        assert_eq!(h.store.counts_by_status("mail").await.unwrap().running, 1);

        let w = worker_id();
        h.pool
            .handle(PoolEvent::WorkerAdded {
                worker: w,
                routine: Arc::new(OkRoutine),
                config: WorkerConfig::local(),
            })
            .await;

        // Recovery moved the job to Stalled before any pool-request ran.
        assert_eq!(h.store.counts_by_status("mail").await.unwrap().stalled, 1);
        assert!(!h.pool.stalled_drained);

        // The next claim serves the stalled job.
        recv(&mut h.rx).await;
        h.pool.handle(PoolEvent::PoolRequest(w)).await;
        assert_eq!(h.pool.workers.get(&w).unwrap().batch.len(), 1);
        assert_eq!(h.store.counts_by_status("mail").await.unwrap().stalled, 0);
    }

    #[tokio::test]
    async fn recovery_with_nothing_stalled_skips_the_stalled_list_for_good() {
        let mut h = harness();
        let w = worker_id();
        h.pool
            .handle(PoolEvent::WorkerAdded {
                worker: w,
                routine: Arc::new(OkRoutine),
                config: WorkerConfig::local(),
            })
            .await;
        assert!(h.pool.stalled_drained);
    }

    #[tokio::test]
    async fn second_worker_does_not_rerun_recovery() {
        let mut h = harness();
        let first = worker_id();
        h.pool
            .handle(PoolEvent::WorkerAdded {
                worker: first,
                routine: Arc::new(OkRoutine),
                config: WorkerConfig::local(),
            })
            .await;

        // A job gets stuck in Running after startup (still-busy worker).
        h.store
            .enqueue_job("mail", &JobId::new("late"), b"x")
            .await
            .unwrap();
        h.store
            .fetch_jobs("mail", JobStatus::Pending, 1)
            .await
            .unwrap();

        let second = worker_id();
        h.pool
            .handle(PoolEvent::WorkerAdded {
                worker: second,
                routine: Arc::new(OkRoutine),
                config: WorkerConfig::local(),
            })
            .await;

        // One-shot pass: the late Running job is not recovered.
        assert_eq!(h.store.counts_by_status("mail").await.unwrap().stalled, 0);
        assert_eq!(h.store.counts_by_status("mail").await.unwrap().running, 1);
        assert_eq!(h.pool.idle.len(), 2);
    }
}
