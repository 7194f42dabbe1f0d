use crate::{
    finish_invocation, InvocationRecord, PersistenceError, Result, StoreCounts, TaskStore,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use taskq_core::{Invocation, InvocationId, TaskResult};

#[derive(Default)]
struct Inner {
    queued: HashMap<InvocationId, Invocation>,
    running: HashMap<InvocationId, Invocation>,
    results: HashMap<InvocationId, TaskResult>,
}

/// Non-durable store for tests and single-process setups
#[derive(Default)]
pub struct MemoryTaskStore {
    inner: RwLock<Inner>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryTaskStore {
    fn enqueue(&self, invocation: &Invocation) -> Result<()> {
        let mut inner = self.inner.write();
        let id = invocation.id;
        if inner.queued.contains_key(&id)
            || inner.running.contains_key(&id)
            || inner.results.contains_key(&id)
        {
            return Err(PersistenceError::InvocationAlreadyExists(id.to_string()));
        }
        inner.queued.insert(id, invocation.clone());
        Ok(())
    }

    fn mark_running(&self, id: &InvocationId, worker_id: &str) -> Result<Invocation> {
        let mut inner = self.inner.write();
        let mut invocation = inner
            .queued
            .remove(id)
            .ok_or_else(|| PersistenceError::InvocationNotFound(id.to_string()))?;

        if let Err(e) = invocation.claim(worker_id) {
            inner.queued.insert(*id, invocation);
            return Err(e.into());
        }
        inner.running.insert(*id, invocation.clone());
        Ok(invocation)
    }

    fn requeue(&self, id: &InvocationId, delay_secs: u64) -> Result<Invocation> {
        let mut inner = self.inner.write();
        let mut invocation = inner
            .running
            .remove(id)
            .ok_or_else(|| PersistenceError::InvocationNotFound(id.to_string()))?;

        if let Err(e) = invocation.requeue(delay_secs) {
            inner.running.insert(*id, invocation);
            return Err(e.into());
        }
        inner.queued.insert(*id, invocation.clone());
        Ok(invocation)
    }

    fn record_result(&self, result: &TaskResult) -> Result<()> {
        let mut inner = self.inner.write();
        let id = result.invocation_id;
        if inner.results.contains_key(&id) {
            return Err(PersistenceError::ResultAlreadyRecorded(id.to_string()));
        }

        finish_invocation(inner.running.get(&id).cloned(), result)?;
        inner.running.remove(&id);
        inner.results.insert(id, result.clone());
        Ok(())
    }

    fn get_invocation(&self, id: &InvocationId) -> Result<Option<Invocation>> {
        let inner = self.inner.read();
        Ok(inner
            .queued
            .get(id)
            .or_else(|| inner.running.get(id))
            .cloned())
    }

    fn get_result(&self, id: &InvocationId) -> Result<Option<TaskResult>> {
        Ok(self.inner.read().results.get(id).cloned())
    }

    fn lookup(&self, id: &InvocationId) -> Result<Option<InvocationRecord>> {
        let inner = self.inner.read();
        let invocation = inner.queued.get(id).or_else(|| inner.running.get(id)).cloned();
        Ok(InvocationRecord::from_parts(
            invocation,
            inner.results.get(id).cloned(),
        ))
    }

    fn queued(&self) -> Result<Vec<Invocation>> {
        let mut queued: Vec<Invocation> = self.inner.read().queued.values().cloned().collect();
        queued.sort_by_key(|inv| inv.submitted_at);
        Ok(queued)
    }

    fn running(&self) -> Result<Vec<Invocation>> {
        Ok(self.inner.read().running.values().cloned().collect())
    }

    fn expire_results_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.inner.write();
        let before = inner.results.len();
        inner.results.retain(|_, result| result.completed_at >= cutoff);
        Ok(before - inner.results.len())
    }

    fn counts(&self) -> Result<StoreCounts> {
        let inner = self.inner.read();
        let succeeded = inner.results.values().filter(|r| r.is_success()).count();
        Ok(StoreCounts {
            queued: inner.queued.len(),
            running: inner.running.len(),
            succeeded,
            failed: inner.results.len() - succeeded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;

    #[test]
    fn test_lifecycle_success() {
        conformance::lifecycle_success(&MemoryTaskStore::new());
    }

    #[test]
    fn test_lookup_during_result_write() {
        conformance::lookup_during_result_write(&MemoryTaskStore::new(), 2000);
    }

    #[test]
    fn test_result_written_once() {
        conformance::result_written_once(&MemoryTaskStore::new());
    }

    #[test]
    fn test_result_requires_running() {
        conformance::result_requires_running(&MemoryTaskStore::new());
    }

    #[test]
    fn test_requeue_and_recovery_order() {
        conformance::requeue_and_recovery_order(&MemoryTaskStore::new());
    }

    #[test]
    fn test_expiry() {
        conformance::expiry(&MemoryTaskStore::new());
    }
}
