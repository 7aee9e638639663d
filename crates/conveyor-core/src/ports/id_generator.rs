//! IdGenerator port - ID 生成の抽象化
//!
//! The engine mints exactly one kind of id itself: worker ids. Job ids are
//! supplied by the producer, queue names by registration.
//!
//! # ULID の特性
//! - 時刻でソート可能
//! - 分散環境で生成可能（調整不要）

use ulid::Ulid;

use crate::domain::WorkerId;
use crate::ports::Clock;

/// Generates worker ids.
///
/// # Thread Safety
/// `Send + Sync` so one generator can serve every queue of an engine.
pub trait IdGenerator: Send + Sync {
    fn worker_id(&self) -> WorkerId;
}

/// ULID-based generator.
///
/// Takes a [`Clock`] so tests can pin the timestamp component with
/// `FixedClock` while the random component keeps ids unique.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn worker_id(&self) -> WorkerId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        WorkerId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
