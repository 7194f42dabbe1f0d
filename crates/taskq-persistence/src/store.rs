use crate::{
    finish_invocation, InvocationRecord, PersistenceError, Result, StoreCounts, TaskStore,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::path::PathBuf;
use taskq_core::{Invocation, InvocationId, TaskResult};
use tracing::{debug, info};

/// Configuration for the RocksDB store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_dir: PathBuf::from("./data"),
        }
    }
}

/// Column family names
const CF_QUEUED: &str = "queued";
const CF_RUNNING: &str = "running";
const CF_RESULTS: &str = "results";

/// Durable store using RocksDB.
///
/// Each state lives in its own column family and every transition is a
/// single `WriteBatch`, so a crash never leaves an invocation in two places.
pub struct RocksTaskStore {
    db: DB,
    // serializes read-check-write sequences across callers
    write_lock: Mutex<()>,
}

impl RocksTaskStore {
    /// Open or create the store under `config.data_dir`
    pub fn open(config: StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let db_path = config.data_dir.join("tasks");

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_QUEUED, Options::default()),
            ColumnFamilyDescriptor::new(CF_RUNNING, Options::default()),
            ColumnFamilyDescriptor::new(CF_RESULTS, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, db_path, cf_descriptors)?;
        info!("Opened task store at {:?}", config.data_dir);

        Ok(RocksTaskStore {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PersistenceError::Other(format!("CF {} not found", name)))
    }

    fn get_invocation_in(&self, cf_name: &str, id: &InvocationId) -> Result<Option<Invocation>> {
        match self.db.get_cf(self.cf(cf_name)?, id.as_bytes())? {
            Some(value) => Ok(Some(Invocation::from_bytes(&value)?)),
            None => Ok(None),
        }
    }

    fn invocations_in(&self, cf_name: &str) -> Result<Vec<Invocation>> {
        let mut invocations = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf_name)?, IteratorMode::Start) {
            let (_key, value) = item?;
            invocations.push(Invocation::from_bytes(&value)?);
        }
        Ok(invocations)
    }

    fn results(&self) -> Result<Vec<TaskResult>> {
        let mut results = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_RESULTS)?, IteratorMode::Start) {
            let (_key, value) = item?;
            results.push(TaskResult::from_bytes(&value)?);
        }
        Ok(results)
    }

    fn count_in(&self, cf_name: &str) -> Result<usize> {
        let mut count = 0;
        for item in self.db.iterator_cf(self.cf(cf_name)?, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Move an invocation between column families in one batch
    fn move_invocation(&self, from: &str, to: &str, invocation: &Invocation) -> Result<()> {
        let key = invocation.id.as_bytes();
        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(from)?, key);
        batch.put_cf(self.cf(to)?, key, invocation.to_bytes()?);
        self.db.write(batch)?;
        Ok(())
    }
}

impl TaskStore for RocksTaskStore {
    fn enqueue(&self, invocation: &Invocation) -> Result<()> {
        let _guard = self.write_lock.lock();
        let key = invocation.id.as_bytes();

        for cf_name in [CF_QUEUED, CF_RUNNING, CF_RESULTS] {
            if self.db.get_cf(self.cf(cf_name)?, key)?.is_some() {
                return Err(PersistenceError::InvocationAlreadyExists(
                    invocation.id.to_string(),
                ));
            }
        }

        self.db
            .put_cf(self.cf(CF_QUEUED)?, key, invocation.to_bytes()?)?;
        debug!("Enqueued invocation {} ({})", invocation.id, invocation.task_name);
        Ok(())
    }

    fn mark_running(&self, id: &InvocationId, worker_id: &str) -> Result<Invocation> {
        let _guard = self.write_lock.lock();
        let mut invocation = self
            .get_invocation_in(CF_QUEUED, id)?
            .ok_or_else(|| PersistenceError::InvocationNotFound(id.to_string()))?;

        invocation.claim(worker_id)?;
        self.move_invocation(CF_QUEUED, CF_RUNNING, &invocation)?;

        debug!("Invocation {} running on {}", id, worker_id);
        Ok(invocation)
    }

    fn requeue(&self, id: &InvocationId, delay_secs: u64) -> Result<Invocation> {
        let _guard = self.write_lock.lock();
        let mut invocation = self
            .get_invocation_in(CF_RUNNING, id)?
            .ok_or_else(|| PersistenceError::InvocationNotFound(id.to_string()))?;

        invocation.requeue(delay_secs)?;
        self.move_invocation(CF_RUNNING, CF_QUEUED, &invocation)?;

        debug!("Requeued invocation {} (delay {}s)", id, delay_secs);
        Ok(invocation)
    }

    fn record_result(&self, result: &TaskResult) -> Result<()> {
        let _guard = self.write_lock.lock();
        let id = result.invocation_id;
        let key = id.as_bytes();

        let results_cf = self.cf(CF_RESULTS)?;
        if self.db.get_cf(results_cf, key)?.is_some() {
            return Err(PersistenceError::ResultAlreadyRecorded(id.to_string()));
        }

        finish_invocation(self.get_invocation_in(CF_RUNNING, &id)?, result)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_RUNNING)?, key);
        batch.put_cf(results_cf, key, result.to_bytes()?);
        self.db.write(batch)?;

        debug!("Recorded {} result for {}", result.status.as_str(), id);
        Ok(())
    }

    fn get_invocation(&self, id: &InvocationId) -> Result<Option<Invocation>> {
        Ok(self.lookup(id)?.and_then(|record| record.invocation))
    }

    fn get_result(&self, id: &InvocationId) -> Result<Option<TaskResult>> {
        match self.db.get_cf(self.cf(CF_RESULTS)?, id.as_bytes())? {
            Some(value) => Ok(Some(TaskResult::from_bytes(&value)?)),
            None => Ok(None),
        }
    }

    fn lookup(&self, id: &InvocationId) -> Result<Option<InvocationRecord>> {
        // All three reads see the same point in time
        let snapshot = self.db.snapshot();
        let key = id.as_bytes();

        let mut invocation = None;
        for cf_name in [CF_QUEUED, CF_RUNNING] {
            if let Some(value) = snapshot.get_cf(self.cf(cf_name)?, key)? {
                invocation = Some(Invocation::from_bytes(&value)?);
                break;
            }
        }

        let result = match snapshot.get_cf(self.cf(CF_RESULTS)?, key)? {
            Some(value) => Some(TaskResult::from_bytes(&value)?),
            None => None,
        };

        Ok(InvocationRecord::from_parts(invocation, result))
    }

    fn queued(&self) -> Result<Vec<Invocation>> {
        let mut queued = self.invocations_in(CF_QUEUED)?;
        queued.sort_by_key(|inv| inv.submitted_at);
        Ok(queued)
    }

    fn running(&self) -> Result<Vec<Invocation>> {
        self.invocations_in(CF_RUNNING)
    }

    fn expire_results_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let results_cf = self.cf(CF_RESULTS)?;

        let mut batch = WriteBatch::default();
        let mut count = 0;
        for result in self.results()? {
            if result.completed_at < cutoff {
                batch.delete_cf(results_cf, result.invocation_id.as_bytes());
                count += 1;
            }
        }

        if count > 0 {
            self.db.write(batch)?;
            info!("Expired {} results older than {}", count, cutoff);
        }
        Ok(count)
    }

    fn counts(&self) -> Result<StoreCounts> {
        let results = self.results()?;
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Ok(StoreCounts {
            queued: self.count_in(CF_QUEUED)?,
            running: self.count_in(CF_RUNNING)?,
            succeeded,
            failed: results.len() - succeeded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;
    use taskq_core::{tasks, InvocationState};
    use tempfile::TempDir;

    fn open(temp_dir: &TempDir) -> RocksTaskStore {
        RocksTaskStore::open(StoreConfig {
            data_dir: temp_dir.path().to_path_buf(),
        })
        .unwrap()
    }

    #[test]
    fn test_lifecycle_success() {
        let temp_dir = TempDir::new().unwrap();
        conformance::lifecycle_success(&open(&temp_dir));
    }

    #[test]
    fn test_result_written_once() {
        let temp_dir = TempDir::new().unwrap();
        conformance::result_written_once(&open(&temp_dir));
    }

    #[test]
    fn test_result_requires_running() {
        let temp_dir = TempDir::new().unwrap();
        conformance::result_requires_running(&open(&temp_dir));
    }

    #[test]
    fn test_requeue_and_recovery_order() {
        let temp_dir = TempDir::new().unwrap();
        conformance::requeue_and_recovery_order(&open(&temp_dir));
    }

    #[test]
    fn test_lookup_during_result_write() {
        let temp_dir = TempDir::new().unwrap();
        conformance::lookup_during_result_write(&open(&temp_dir), 300);
    }

    #[test]
    fn test_expiry() {
        let temp_dir = TempDir::new().unwrap();
        conformance::expiry(&open(&temp_dir));
    }

    #[test]
    fn test_state_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let queued = tasks::add_invocation(2, 3).unwrap();
        let running = tasks::run_violin_invocation("/data/experiment1").unwrap();

        {
            let store = open(&temp_dir);
            store.enqueue(&queued).unwrap();
            store.enqueue(&running).unwrap();
            store.mark_running(&running.id, "worker-1").unwrap();
        }

        let store = open(&temp_dir);
        assert_eq!(
            store.state(&queued.id).unwrap(),
            Some(InvocationState::Queued)
        );
        let in_flight = store.running().unwrap();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].id, running.id);
        assert_eq!(in_flight[0].worker_id.as_deref(), Some("worker-1"));

        let (x, y) = tasks::decode_add_args(store.get_invocation(&queued.id).unwrap().unwrap().args())
            .unwrap();
        assert_eq!((x, y), (serde_json::json!(2), serde_json::json!(3)));
    }
}
