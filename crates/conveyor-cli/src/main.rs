use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::{Duration, sleep};

use conveyor_core::{
    Engine, EngineConfig, EngineError, InMemoryRunStore, Job, JobId, JobRoutine, PassthroughCodec,
    QueueOptions, WorkerConfig,
};

#[derive(Debug, Deserialize)]
struct HelloPayload {
    name: String,
}

struct HelloRoutine {
    remaining_failures: AtomicU32,
}

impl HelloRoutine {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl JobRoutine for HelloRoutine {
    async fn run(&self, job: &Job) -> Result<(), EngineError> {
        let p: HelloPayload = serde_json::from_slice(&job.payload)
            .map_err(|e| EngineError::Routine(format!("json decode: {e}")))?;

        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(EngineError::Routine(format!(
                "intentional failure (left={left})"
            )));
        }

        println!("Hello, {}!", p.name);
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // (A) Store と Engine を用意
    let store = Arc::new(InMemoryRunStore::new("conveyor", Arc::new(PassthroughCodec)));
    let engine = Engine::new(EngineConfig::with_default_store(store));

    // (B) キューと worker を登録（今回は local 実行 1 本）
    engine
        .register_queue(QueueOptions::new("greetings"))
        .await
        .expect("register queue");
    engine
        .register_worker(
            "greetings",
            Arc::new(HelloRoutine::new(0)),
            WorkerConfig::local(),
        )
        .await
        .expect("register worker");

    // (C) ジョブ投入（id は呼び出し側が決める）
    let payload = serde_json::to_vec(&serde_json::json!({ "name": "conveyor" })).unwrap();
    engine
        .enqueue("greetings", "hello-1", &payload)
        .await
        .expect("enqueue");
    println!("enqueued job: hello-1");

    // (D) 完了をポーリングで待つ（Completed / Failed のどちらか）
    let id = JobId::new("hello-1");
    loop {
        let record = engine
            .job_record("greetings", &id)
            .await
            .expect("queue exists")
            .expect("job exists");
        if record.status.is_terminal() {
            println!(
                "final status: {} reason={:?}",
                record.status, record.failure_reason
            );
            println!("counts: {:?}", engine.counts("greetings").await.unwrap());
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
}
