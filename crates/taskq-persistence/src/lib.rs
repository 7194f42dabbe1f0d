mod memory;
mod store;

pub use memory::MemoryTaskStore;
pub use store::{RocksTaskStore, StoreConfig};

use chrono::{DateTime, Utc};
use taskq_core::{Invocation, InvocationId, InvocationState, ResultStatus, TaskResult};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),

    #[error("Task error: {0}")]
    TaskError(#[from] taskq_core::TaskError),

    #[error("Invocation not found: {0}")]
    InvocationNotFound(String),

    #[error("Invocation already exists: {0}")]
    InvocationAlreadyExists(String),

    #[error("Result already recorded for invocation {0}")]
    ResultAlreadyRecorded(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Number of invocations in each state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// One consistent view of an invocation: where it is and what it produced
#[derive(Debug, Clone)]
pub struct InvocationRecord {
    pub state: InvocationState,
    /// Present while queued or running
    pub invocation: Option<Invocation>,
    /// Present once terminal
    pub result: Option<TaskResult>,
}

impl InvocationRecord {
    fn from_parts(invocation: Option<Invocation>, result: Option<TaskResult>) -> Option<Self> {
        let state = match (&invocation, &result) {
            (Some(invocation), _) => invocation.state,
            (None, Some(result)) => match result.status {
                ResultStatus::Succeeded => InvocationState::Succeeded,
                ResultStatus::Failed => InvocationState::Failed,
            },
            (None, None) => return None,
        };
        Some(InvocationRecord {
            state,
            invocation,
            result,
        })
    }
}

/// Durable broker state: the invocation queue plus the result backend.
///
/// Implementations must make every state move atomic. A result is accepted
/// only for a running invocation and at most once per invocation id.
pub trait TaskStore: Send + Sync {
    /// Persist a new invocation in the queued state
    fn enqueue(&self, invocation: &Invocation) -> Result<()>;

    /// Move a queued invocation to running on behalf of `worker_id`
    fn mark_running(&self, id: &InvocationId, worker_id: &str) -> Result<Invocation>;

    /// Move a running invocation back to the queue, claimable after `delay_secs`
    fn requeue(&self, id: &InvocationId, delay_secs: u64) -> Result<Invocation>;

    /// Write the terminal result and retire the running invocation
    fn record_result(&self, result: &TaskResult) -> Result<()>;

    /// Look up a queued or running invocation
    fn get_invocation(&self, id: &InvocationId) -> Result<Option<Invocation>>;

    /// Look up a terminal result
    fn get_result(&self, id: &InvocationId) -> Result<Option<TaskResult>>;

    /// All queued invocations, oldest first
    fn queued(&self) -> Result<Vec<Invocation>>;

    /// All running invocations
    fn running(&self) -> Result<Vec<Invocation>>;

    /// Drop results completed before `cutoff`, returning how many were removed
    fn expire_results_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    fn counts(&self) -> Result<StoreCounts>;

    /// Invocation and result read as a single snapshot, so a concurrent
    /// `record_result` never makes a live invocation look unknown
    fn lookup(&self, id: &InvocationId) -> Result<Option<InvocationRecord>>;

    /// Current state of an invocation, whichever side of the store it is on
    fn state(&self, id: &InvocationId) -> Result<Option<InvocationState>> {
        Ok(self.lookup(id)?.map(|record| record.state))
    }
}

/// Validate a result against the running invocation it retires
fn finish_invocation(running: Option<Invocation>, result: &TaskResult) -> Result<Invocation> {
    let mut invocation = running
        .ok_or_else(|| PersistenceError::InvocationNotFound(result.invocation_id.to_string()))?;
    invocation.finish(result.is_success())?;
    Ok(invocation)
}
