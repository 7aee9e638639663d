//! conveyor-core
//!
//! Core building blocks for the Conveyor job-queue engine.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, job, events, errors）
//! - **ports**: 抽象化レイヤー（RunStore, PayloadCodec, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryRunStore など開発用）
//! - **exec**: 実行バックエンド（in-process / isolated process）
//! - **engine**: Engine とキューごとの worker pool actor
//!
//! # Data flow
//! A producer registers a queue on the [`engine::Engine`] and enqueues jobs.
//! The engine persists each job through the [`ports::RunStore`] port and
//! signals the queue's pool actor, which claims jobs, hands them to a worker's
//! execution backend, and records the terminal state back through the store.

pub mod domain;
pub mod ports;
pub mod impls;
pub mod exec;
pub mod engine;

pub use domain::{EngineError, EngineEvent, Job, JobId, JobStatus, StatusCounts, StoredJob, WorkerId};
pub use engine::{Engine, EngineConfig, QueueOptions};
pub use exec::{ExecMode, IsolatedConfig, JobRoutine, WorkerConfig};
pub use impls::InMemoryRunStore;
pub use ports::{PassthroughCodec, PayloadCodec, RunStore};
