//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部コラボレーター（共有ストア、圧縮、ID 生成、時刻）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - The store is the source of truth for job state; the only in-process
//!   copies are the transient jobs inside a worker's local batch.
//! - Every state transition is one atomic store operation. Nothing outside
//!   the [`RunStore`] implementation mutates a job's status.
//! - Production adapters (networked store client, real compression) live in
//!   their own crates; this workspace ships development implementations only.

pub mod clock;
pub mod codec;
pub mod id_generator;
pub mod run_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::codec::{PassthroughCodec, PayloadCodec};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::run_store::RunStore;
