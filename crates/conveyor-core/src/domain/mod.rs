//! Domain model (IDs, jobs, events, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod job;

pub use self::errors::EngineError;
pub use self::events::EngineEvent;
pub use self::ids::{JobId, WorkerId};
pub use self::job::{Job, JobStatus, StatusCounts, StoredJob};
