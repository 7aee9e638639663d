//! Impls - 実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryRunStore**: 開発用の RunStore
//!
//! # 本番用実装
//! Networked store adapters belong in their own crates (e.g. a
//! `conveyor-redis` mapping the atomic operations onto scripted execution
//! and pop-and-push list commands); this workspace only ships the
//! development implementation.

pub mod memory_store;

pub use self::memory_store::InMemoryRunStore;
