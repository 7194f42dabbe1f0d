use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use taskq_core::InvocationId;

/// Information about a connected worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub current_invocations: Vec<InvocationId>,
    pub cpu_usage_percent: f32,
    pub memory_usage_mb: u64,
}

impl WorkerInfo {
    pub fn new(worker_id: String) -> Self {
        let now = Utc::now();
        WorkerInfo {
            worker_id,
            registered_at: now,
            last_heartbeat: now,
            current_invocations: Vec::new(),
            cpu_usage_percent: 0.0,
            memory_usage_mb: 0,
        }
    }

    /// Heartbeat seen within the timeout
    pub fn is_alive(&self, timeout_secs: i64) -> bool {
        Utc::now() - self.last_heartbeat < Duration::seconds(timeout_secs)
    }

    pub fn heartbeat(&mut self, cpu: f32, memory: u64) {
        self.last_heartbeat = Utc::now();
        self.cpu_usage_percent = cpu;
        self.memory_usage_mb = memory;
    }
}

/// Registry of workers and the invocations they hold
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerInfo>>,
    heartbeat_timeout_secs: i64,
}

impl WorkerRegistry {
    pub fn new(heartbeat_timeout_secs: i64) -> Self {
        WorkerRegistry {
            workers: RwLock::new(HashMap::new()),
            heartbeat_timeout_secs,
        }
    }

    /// Register a worker on first contact; returns true if it was new
    pub fn touch(&self, worker_id: &str) -> bool {
        let mut workers = self.workers.write();
        if let Some(worker) = workers.get_mut(worker_id) {
            worker.last_heartbeat = Utc::now();
            false
        } else {
            workers.insert(worker_id.to_string(), WorkerInfo::new(worker_id.to_string()));
            true
        }
    }

    /// Update worker heartbeat; returns false for unknown workers
    pub fn update_heartbeat(&self, worker_id: &str, cpu: f32, memory: u64) -> bool {
        let mut workers = self.workers.write();
        match workers.get_mut(worker_id) {
            Some(worker) => {
                worker.heartbeat(cpu, memory);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, worker_id: &str) -> Option<WorkerInfo> {
        self.workers.read().get(worker_id).cloned()
    }

    pub fn all_workers(&self) -> Vec<WorkerInfo> {
        let mut workers: Vec<_> = self.workers.read().values().cloned().collect();
        workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        workers
    }

    pub fn assign(&self, worker_id: &str, id: InvocationId) {
        if let Some(worker) = self.workers.write().get_mut(worker_id) {
            if !worker.current_invocations.contains(&id) {
                worker.current_invocations.push(id);
            }
        }
    }

    pub fn release(&self, worker_id: &str, id: &InvocationId) {
        if let Some(worker) = self.workers.write().get_mut(worker_id) {
            worker.current_invocations.retain(|held| held != id);
        }
    }

    /// Remove workers whose heartbeat timed out, returning them with the
    /// invocations they still held
    pub fn remove_dead(&self) -> Vec<WorkerInfo> {
        let mut workers = self.workers.write();
        let dead: Vec<String> = workers
            .values()
            .filter(|w| !w.is_alive(self.heartbeat_timeout_secs))
            .map(|w| w.worker_id.clone())
            .collect();

        dead.iter().filter_map(|id| workers.remove(id)).collect()
    }

    pub fn count_alive(&self) -> usize {
        self.workers
            .read()
            .values()
            .filter(|w| w.is_alive(self.heartbeat_timeout_secs))
            .count()
    }
}
