//! Engine - キュー登録・投入・ワーカー登録の表面
//!
//! The engine is an explicit instance, constructed from [`EngineConfig`] and
//! passed by reference: no ambient global state. It owns the map from queue
//! name to queue handle; everything after the initial calls happens inside
//! the per-queue pool actor ([`pool`]).
//!
//! Design:
//! - Structural errors (duplicate queue, missing store, unknown queue) are
//!   raised synchronously and leave no partial state.
//! - `enqueue` is fire-and-forget relative to eventual execution: routine
//!   errors only surface as FAILED job state and a job-failed event.

mod pool;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, info};

use crate::domain::{EngineError, EngineEvent, JobId, StatusCounts, StoredJob, WorkerId};
use crate::exec::{JobRoutine, WorkerConfig};
use crate::ports::{IdGenerator, RunStore, SystemClock, UlidGenerator};

use self::pool::{PoolEvent, QueuePool};

/// Default number of jobs claimed per pool-request.
pub const DEFAULT_FETCH_LIMIT: usize = 10;

/// Engine-wide configuration.
pub struct EngineConfig {
    /// Fallback store for queues registered without their own connection.
    pub default_store: Option<Arc<dyn RunStore>>,

    /// Fixed per-request claim limit.
    pub fetch_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_store: None,
            fetch_limit: DEFAULT_FETCH_LIMIT,
        }
    }
}

impl EngineConfig {
    pub fn with_default_store(store: Arc<dyn RunStore>) -> Self {
        Self {
            default_store: Some(store),
            ..Self::default()
        }
    }
}

/// Registration options for one queue.
pub struct QueueOptions {
    pub name: String,
    /// Queue-specific store connection; falls back to the engine default.
    pub store: Option<Arc<dyn RunStore>>,
}

impl QueueOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = Some(store);
        self
    }
}

struct QueueHandle {
    store: Arc<dyn RunStore>,
    tx: mpsc::UnboundedSender<PoolEvent>,
}

/// The dispatch engine: registry of queues, entry point for producers.
pub struct Engine {
    config: EngineConfig,
    id_gen: Arc<dyn IdGenerator>,
    events: broadcast::Sender<EngineEvent>,
    queues: Mutex<HashMap<String, QueueHandle>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            id_gen: Arc::new(UlidGenerator::new(SystemClock)),
            events,
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to lifecycle events (queue-registered, worker-registered,
    /// job-completed, job-failed).
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Register a queue and spawn its pool actor.
    ///
    /// # Errors
    /// - [`EngineError::QueueAlreadyExists`] if the name is taken.
    /// - [`EngineError::MissingStoreConnection`] if neither the options nor
    ///   the engine provide a store. No queue state is created on failure.
    pub async fn register_queue(&self, opts: QueueOptions) -> Result<(), EngineError> {
        let mut queues = self.queues.lock().await;
        if queues.contains_key(&opts.name) {
            return Err(EngineError::QueueAlreadyExists(opts.name));
        }
        let store = opts
            .store
            .or_else(|| self.config.default_store.clone())
            .ok_or_else(|| EngineError::MissingStoreConnection(opts.name.clone()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let actor = QueuePool::new(
            opts.name.clone(),
            Arc::clone(&store),
            self.config.fetch_limit,
            tx.clone(),
            self.events.clone(),
        );
        tokio::spawn(actor.run(rx));
        queues.insert(opts.name.clone(), QueueHandle { store, tx });
        drop(queues);

        info!(queue = %opts.name, "queue registered");
        let _ = self
            .events
            .send(EngineEvent::QueueRegistered { queue: opts.name });
        Ok(())
    }

    /// Persist a job on `queue` and signal the pool.
    ///
    /// # Errors
    /// - [`EngineError::UnknownQueue`] if the queue was never registered.
    /// - [`EngineError::JobAlreadyExists`] if the id collides (the atomic
    ///   check-and-insert leaves the existing record untouched).
    pub async fn enqueue(
        &self,
        queue: &str,
        id: impl Into<JobId>,
        payload: &[u8],
    ) -> Result<(), EngineError> {
        let (store, tx) = self.handle(queue).await?;
        let id = id.into();
        store.enqueue_job(queue, &id, payload).await?;
        debug!(queue, job = %id, "job enqueued");
        let _ = tx.send(PoolEvent::JobAdded(id));
        Ok(())
    }

    /// Register a worker on `queue` with its routine and execution config.
    ///
    /// The first worker of a queue triggers the one-shot stalled recovery
    /// inside the pool actor before any event is reacted to.
    pub async fn register_worker(
        &self,
        queue: &str,
        routine: Arc<dyn JobRoutine>,
        config: WorkerConfig,
    ) -> Result<WorkerId, EngineError> {
        let (_, tx) = self.handle(queue).await?;
        let worker = self.id_gen.worker_id();
        let _ = tx.send(PoolEvent::WorkerAdded {
            worker,
            routine,
            config,
        });

        info!(queue, %worker, "worker registered");
        let _ = self.events.send(EngineEvent::WorkerRegistered {
            queue: queue.to_string(),
            worker,
        });
        Ok(worker)
    }

    /// Current record of one job, or `None` if it was never enqueued.
    pub async fn job_record(
        &self,
        queue: &str,
        id: &JobId,
    ) -> Result<Option<StoredJob>, EngineError> {
        let (store, _) = self.handle(queue).await?;
        store.job_record(queue, id).await
    }

    /// Per-status counts for one queue.
    pub async fn counts(&self, queue: &str) -> Result<StatusCounts, EngineError> {
        let (store, _) = self.handle(queue).await?;
        store.counts_by_status(queue).await
    }

    async fn handle(
        &self,
        queue: &str,
    ) -> Result<(Arc<dyn RunStore>, mpsc::UnboundedSender<PoolEvent>), EngineError> {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|handle| (Arc::clone(&handle.store), handle.tx.clone()))
            .ok_or_else(|| EngineError::UnknownQueue(queue.to_string()))
    }
}
