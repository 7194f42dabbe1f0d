use crate::config::{BrokerConfig, StoreBackend};
use crate::{metrics::BrokerMetrics, queue::InvocationQueue, worker_registry::WorkerRegistry};
use taskq_core::{FailureKind, InvocationState, TaskFailure, TaskResult};
use taskq_persistence::{MemoryTaskStore, PersistenceError, RocksTaskStore, TaskStore};
use taskq_protocol::{
    AckResponse, ClaimRequest, HeartbeatRequest, Message, MessageCodec, QueryRequest,
    ReportRequest, SubmitRequest,
};

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_util::codec::Framed;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const MAINTENANCE_INTERVAL_SECS: u64 = 10;

/// Snapshot of broker state for the REST API and the admin CLI
#[derive(Debug, Clone, Serialize)]
pub struct BrokerStats {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub queue_depth: usize,
    pub workers_alive: usize,
}

/// Message broker plus result backend front-end
pub struct Broker {
    config: Arc<BrokerConfig>,
    queue: Arc<InvocationQueue>,
    store: Arc<dyn TaskStore>,
    workers: Arc<WorkerRegistry>,
    metrics: Arc<BrokerMetrics>,
    shutdown: Arc<Notify>,
}

impl Broker {
    /// Open the configured store and recover its state
    pub fn new(config: BrokerConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn TaskStore> = match config.persistence.backend {
            StoreBackend::Rocksdb => Arc::new(RocksTaskStore::open(config.to_store_config())?),
            StoreBackend::Memory => {
                warn!("Using in-memory store; invocations will not survive a restart");
                Arc::new(MemoryTaskStore::new())
            }
        };
        Self::with_store(config, store)
    }

    /// Build a broker over an existing store.
    ///
    /// Invocations left running by a previous process are re-queued, since
    /// the workers holding them are no longer connected to us.
    pub fn with_store(config: BrokerConfig, store: Arc<dyn TaskStore>) -> anyhow::Result<Self> {
        // Re-queue invocations orphaned by the last shutdown
        for invocation in store.running()? {
            warn!(
                "Recovering invocation {} left running on {:?}",
                invocation.id, invocation.worker_id
            );
            store.requeue(&invocation.id, 0)?;
        }

        // Load queued invocations into memory
        let queue = InvocationQueue::new();
        let queued = store.queued()?;
        info!("Loading {} queued invocations", queued.len());
        for invocation in queued {
            queue.push(invocation);
        }

        let workers = WorkerRegistry::new(config.workers.heartbeat_timeout_secs);
        let metrics = BrokerMetrics::new()?;
        metrics.invocations_queued.set(queue.len() as i64);

        Ok(Broker {
            config: Arc::new(config),
            queue: Arc::new(queue),
            store,
            workers: Arc::new(workers),
            metrics: Arc::new(metrics),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.broker.host, self.config.broker.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Broker listening on {}", addr);
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        // Start background maintenance
        let broker = self.clone();
        tokio::spawn(async move {
            broker.maintenance_loop().await;
        });

        // Accept connections
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            debug!("New connection from {}", addr);
                            let broker = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = broker.handle_connection(stream).await {
                                    error!("Connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Shutting down broker");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_connection(&self, stream: TcpStream) -> anyhow::Result<()> {
        let mut framed = Framed::new(stream, MessageCodec);

        while let Some(result) = framed.next().await {
            match result {
                Ok(message) => {
                    let response = self.handle_message(message);
                    framed.send(response).await?;
                }
                Err(e) => {
                    error!("Protocol error: {}", e);
                    break;
                }
            }
        }

        Ok(())
    }

    pub(crate) fn handle_message(&self, message: Message) -> Message {
        match message {
            Message::Submit(req) => self.handle_submit(req),
            Message::Claim(req) => self.handle_claim(req),
            Message::Report(req) => self.handle_report(req),
            Message::Heartbeat(req) => self.handle_heartbeat(req),
            Message::Query(req) => self.handle_query(req),
            Message::Ack(_) | Message::Nack(_) => Message::nack("Unsupported message type"),
        }
    }

    fn handle_submit(&self, req: SubmitRequest) -> Message {
        let invocation = req.invocation;

        if invocation.state != InvocationState::Queued || invocation.attempt != 0 {
            return Message::nack(format!(
                "Invocation {} must be submitted fresh, got state {} attempt {}",
                invocation.id, invocation.state, invocation.attempt
            ));
        }

        // Check queue depth threshold
        if self.queue.len() >= self.config.broker.queue_depth_threshold {
            warn!("Queue depth threshold exceeded, rejecting {}", invocation.id);
            return Message::nack("Queue depth threshold exceeded");
        }

        // Store to persistence first
        if let Err(e) = self.store.enqueue(&invocation) {
            error!("Failed to enqueue invocation {}: {}", invocation.id, e);
            return Message::nack(format!("Failed to enqueue invocation: {}", e));
        }

        // Update metrics
        let id = invocation.id;
        self.metrics.inc_invocations("submitted", &invocation.task_name);
        self.metrics.invocations_queued.inc();
        info!("Queued {} invocation {}", invocation.task_name, id);

        // Add to in-memory queue
        self.queue.push(invocation);

        Message::ack_with_message(format!("Invocation {} queued", id))
    }

    fn handle_claim(&self, req: ClaimRequest) -> Message {
        let worker_id = req.worker_id;

        // Register worker if not already registered
        if self.workers.touch(&worker_id) {
            info!("Registered new worker: {}", worker_id);
        }

        let accepts = |inv: &taskq_core::Invocation| {
            req.task_names.is_empty() || req.task_names.contains(&inv.task_name)
        };

        // Take the oldest ready invocation this worker can run
        let Some(invocation) = self.queue.pop_ready(accepts) else {
            return Message::ack_with_message("No invocations available");
        };
        let id = invocation.id;

        // Claim it in persistence
        match self.store.mark_running(&id, &worker_id) {
            Ok(claimed) => {
                self.workers.assign(&worker_id, id);
                self.metrics.invocations_queued.dec();
                self.metrics.invocations_running.inc();
                debug!("Worker {} claimed invocation {}", worker_id, id);

                Message::Ack(AckResponse {
                    invocation: Some(claimed),
                    ..AckResponse::default()
                })
            }
            Err(PersistenceError::InvocationNotFound(_)) => {
                // store moved on without us; drop the stale queue entry
                warn!("Dropping stale queue entry {}", id);
                self.metrics.invocations_queued.dec();
                Message::ack_with_message("No invocations available")
            }
            Err(e) => {
                error!("Failed to claim invocation {}: {}", id, e);
                // Put it back in the queue
                self.queue.push(invocation);
                Message::nack(format!("Failed to claim invocation: {}", e))
            }
        }
    }

    fn handle_report(&self, req: ReportRequest) -> Message {
        let result = req.result;
        let id = result.invocation_id;

        let running = match self.store.lookup(&id) {
            Ok(Some(record)) => match (record.invocation, record.result) {
                (Some(inv), _) if inv.state == InvocationState::Running => inv,
                (_, Some(_)) => {
                    return Message::nack(format!("Result already recorded for {}", id))
                }
                _ => return Message::nack(format!("Invocation {} is not running", id)),
            },
            Ok(None) => return Message::nack(format!("Invocation {} is not running", id)),
            Err(e) => return Message::nack(format!("Error loading invocation: {}", e)),
        };

        // Only the holding worker may report
        if running.worker_id.as_deref() != Some(req.worker_id.as_str()) {
            warn!(
                "Worker {} reported {} held by {:?}",
                req.worker_id, id, running.worker_id
            );
            return Message::nack(format!("Invocation {} is held by another worker", id));
        }

        // Remove invocation from worker
        self.workers.release(&req.worker_id, &id);

        // Failed with retries left: back to the queue, no result yet
        let retryable = result
            .error
            .as_ref()
            .map(|failure| failure.kind.is_retryable())
            .unwrap_or(false);
        if retryable && running.can_retry() {
            let delay = running.retry_delay_seconds(
                self.config.retry.base_delay_secs,
                self.config.retry.max_delay_secs,
            );
            return match self.store.requeue(&id, delay) {
                Ok(requeued) => {
                    info!(
                        "Invocation {} failed on attempt {}, retrying in {}s",
                        id, requeued.attempt, delay
                    );
                    self.metrics.inc_invocations("retried", &requeued.task_name);
                    self.metrics.invocations_running.dec();
                    self.metrics.invocations_queued.inc();
                    self.queue.push(requeued);
                    Message::ack_with_message(format!("Invocation {} re-queued", id))
                }
                Err(e) => {
                    error!("Failed to requeue invocation {}: {}", id, e);
                    Message::nack(format!("Failed to requeue invocation: {}", e))
                }
            };
        }

        self.write_result(&result)
    }

    /// Record the terminal result exactly once
    fn write_result(&self, result: &TaskResult) -> Message {
        let id = result.invocation_id;
        match self.store.record_result(result) {
            Ok(()) => {
                // Update metrics
                let outcome = if result.is_success() { "succeeded" } else { "failed" };
                self.metrics.inc_invocations(outcome, &result.task_name);
                self.metrics.invocations_running.dec();
                if let Some(started_at) = result.started_at {
                    let secs = (result.completed_at - started_at).num_milliseconds() as f64 / 1000.0;
                    self.metrics.observe_duration(&result.task_name, secs);
                }

                match &result.error {
                    None => info!("Invocation {} succeeded", id),
                    Some(failure) => info!("Invocation {} failed: {}", id, failure),
                }
                Message::ack_with_message("Result recorded")
            }
            Err(e) => {
                warn!("Rejected result for {}: {}", id, e);
                Message::nack(format!("Failed to record result: {}", e))
            }
        }
    }

    fn handle_heartbeat(&self, req: HeartbeatRequest) -> Message {
        let worker_id = req.worker_id;

        if self.workers.touch(&worker_id) {
            info!("Registered new worker: {}", worker_id);
        }
        self.workers
            .update_heartbeat(&worker_id, req.cpu_usage_percent, req.memory_usage_mb);
        debug!(
            "Heartbeat from {} ({} active)",
            worker_id, req.current_task_count
        );

        Message::ack()
    }

    fn handle_query(&self, req: QueryRequest) -> Message {
        let id = req.invocation_id;

        // queue and result backend read together
        match self.store.lookup(&id) {
            Ok(Some(record)) => Message::Ack(AckResponse {
                invocation: record.invocation,
                state: Some(record.state),
                result: record.result,
                message: None,
            }),
            Ok(None) => Message::nack(format!("Invocation {} not found", id)),
            Err(e) => Message::nack(format!("Error querying invocation: {}", e)),
        }
    }

    async fn maintenance_loop(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.reclaim_from_dead_workers();
                    self.expire_results();
                    self.refresh_metrics();
                }
                _ = self.shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Take back invocations held by workers that stopped heartbeating
    pub fn reclaim_from_dead_workers(&self) {
        for worker in self.workers.remove_dead() {
            warn!(
                "Worker {} timed out holding {} invocations",
                worker.worker_id,
                worker.current_invocations.len()
            );

            for id in worker.current_invocations {
                // Skip anything that already finished or moved on
                let running = match self.store.get_invocation(&id) {
                    Ok(Some(inv)) if inv.state == InvocationState::Running => inv,
                    Ok(_) => continue,
                    Err(e) => {
                        error!("Failed to load invocation {}: {}", id, e);
                        continue;
                    }
                };

                if running.can_retry() {
                    let delay = running.retry_delay_seconds(
                        self.config.retry.base_delay_secs,
                        self.config.retry.max_delay_secs,
                    );
                    // Get invocation and add back to queue
                    match self.store.requeue(&id, delay) {
                        Ok(requeued) => {
                            self.metrics.invocations_running.dec();
                            self.metrics.invocations_queued.inc();
                            self.queue.push(requeued);
                        }
                        Err(e) => error!("Failed to requeue invocation {}: {}", id, e),
                    }
                } else {
                    // Out of attempts
                    let failure = TaskFailure::new(
                        FailureKind::WorkerLost,
                        format!("worker {} stopped heartbeating", worker.worker_id),
                    );
                    self.write_result(&TaskResult::failure(&running, failure));
                }
            }
        }
    }

    /// Drop results older than the retention window
    pub fn expire_results(&self) {
        let retention = chrono::Duration::seconds(self.config.persistence.result_retention_secs as i64);
        if let Err(e) = self.store.expire_results_before(Utc::now() - retention) {
            error!("Failed to expire results: {}", e);
        }
    }

    fn refresh_metrics(&self) {
        match self.store.counts() {
            Ok(counts) => {
                self.metrics.invocations_queued.set(counts.queued as i64);
                self.metrics.invocations_running.set(counts.running as i64);
            }
            Err(e) => error!("Failed to count invocations: {}", e),
        }
        self.metrics
            .workers_connected
            .set(self.workers.count_alive() as i64);
    }

    pub fn stats(&self) -> taskq_persistence::Result<BrokerStats> {
        let counts = self.store.counts()?;
        Ok(BrokerStats {
            queued: counts.queued,
            running: counts.running,
            succeeded: counts.succeeded,
            failed: counts.failed,
            queue_depth: self.queue.len(),
            workers_alive: self.workers.count_alive(),
        })
    }

    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        self.metrics.clone()
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        self.store.clone()
    }

    pub fn workers(&self) -> Arc<WorkerRegistry> {
        self.workers.clone()
    }

    pub fn queue(&self) -> Arc<InvocationQueue> {
        self.queue.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskq_core::{tasks, Invocation};

    fn broker_with(config: BrokerConfig) -> Broker {
        Broker::with_store(config, Arc::new(MemoryTaskStore::new())).unwrap()
    }

    fn broker() -> Broker {
        broker_with(BrokerConfig::default())
    }

    fn submit(broker: &Broker, invocation: &Invocation) {
        let reply = broker.handle_message(Message::Submit(SubmitRequest {
            invocation: invocation.clone(),
        }));
        assert!(matches!(reply, Message::Ack(_)), "{:?}", reply);
    }

    fn claim(broker: &Broker, worker_id: &str) -> Option<Invocation> {
        match broker.handle_message(Message::Claim(ClaimRequest {
            worker_id: worker_id.to_string(),
            task_names: vec![],
        })) {
            Message::Ack(ack) => ack.invocation,
            other => panic!("claim failed: {:?}", other),
        }
    }

    fn report(broker: &Broker, worker_id: &str, result: TaskResult) -> Message {
        broker.handle_message(Message::Report(ReportRequest {
            worker_id: worker_id.to_string(),
            result,
        }))
    }

    fn query(broker: &Broker, invocation: &Invocation) -> AckResponse {
        match broker.handle_message(Message::Query(QueryRequest {
            invocation_id: invocation.id,
        })) {
            Message::Ack(ack) => ack,
            other => panic!("query failed: {:?}", other),
        }
    }

    #[test]
    fn test_submit_claim_report_query() {
        let broker = broker();
        let invocation = tasks::add_invocation(2, 3).unwrap();
        submit(&broker, &invocation);

        assert_eq!(query(&broker, &invocation).state, Some(InvocationState::Queued));

        let claimed = claim(&broker, "worker-1").unwrap();
        assert_eq!(claimed.id, invocation.id);
        assert_eq!(query(&broker, &invocation).state, Some(InvocationState::Running));

        let reply = report(&broker, "worker-1", TaskResult::success(&claimed, b"5".to_vec()));
        assert!(matches!(reply, Message::Ack(_)));

        let ack = query(&broker, &invocation);
        assert_eq!(ack.state, Some(InvocationState::Succeeded));
        assert_eq!(ack.result.unwrap().value_json(), Some(serde_json::json!(5)));
        assert_eq!(broker.stats().unwrap().succeeded, 1);
    }

    #[test]
    fn test_query_never_misses_an_invocation_being_reported() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let broker = broker();
        for _ in 0..500 {
            let invocation = tasks::add_invocation(2, 3).unwrap();
            submit(&broker, &invocation);
            let claimed = claim(&broker, "worker-1").unwrap();
            let done = AtomicBool::new(false);

            std::thread::scope(|scope| {
                scope.spawn(|| {
                    report(&broker, "worker-1", TaskResult::success(&claimed, b"5".to_vec()));
                    done.store(true, Ordering::SeqCst);
                });

                while !done.load(Ordering::SeqCst) {
                    query(&broker, &invocation);
                }
            });

            assert_eq!(query(&broker, &invocation).state, Some(InvocationState::Succeeded));
        }
    }

    #[test]
    fn test_second_report_is_rejected() {
        let broker = broker();
        let invocation = tasks::add_invocation(1, 1).unwrap();
        submit(&broker, &invocation);
        let claimed = claim(&broker, "worker-1").unwrap();

        report(&broker, "worker-1", TaskResult::success(&claimed, b"2".to_vec()));
        let again = report(
            &broker,
            "worker-1",
            TaskResult::failure(&claimed, TaskFailure::argument("duplicate")),
        );
        assert!(matches!(again, Message::Nack(_)));
        assert!(query(&broker, &invocation).result.unwrap().is_success());
    }

    #[test]
    fn test_report_from_other_worker_is_rejected() {
        let broker = broker();
        let invocation = tasks::add_invocation(1, 1).unwrap();
        submit(&broker, &invocation);
        let claimed = claim(&broker, "worker-1").unwrap();

        let reply = report(&broker, "worker-2", TaskResult::success(&claimed, b"2".to_vec()));
        assert!(matches!(reply, Message::Nack(_)));
        assert_eq!(query(&broker, &invocation).state, Some(InvocationState::Running));
    }

    #[test]
    fn test_resubmitting_same_id_is_rejected() {
        let broker = broker();
        let invocation = tasks::add_invocation(1, 1).unwrap();
        submit(&broker, &invocation);

        let reply = broker.handle_message(Message::Submit(SubmitRequest {
            invocation: invocation.clone(),
        }));
        assert!(matches!(reply, Message::Nack(_)));
        assert_eq!(broker.queue().len(), 1);
    }

    #[test]
    fn test_failure_without_retries_is_final() {
        let broker = broker();
        let invocation = tasks::run_violin_invocation("/missing").unwrap();
        submit(&broker, &invocation);
        let claimed = claim(&broker, "worker-1").unwrap();

        report(
            &broker,
            "worker-1",
            TaskResult::failure(&claimed, TaskFailure::not_found("/missing does not exist")),
        );

        let ack = query(&broker, &invocation);
        assert_eq!(ack.state, Some(InvocationState::Failed));
        assert_eq!(ack.result.unwrap().error.unwrap().kind, FailureKind::NotFound);
    }

    #[test]
    fn test_retryable_failure_is_requeued_with_backoff() {
        let broker = broker();
        let invocation = Invocation::builder(tasks::RUN_VIOLIN, &["/data"])
            .unwrap()
            .max_retries(1)
            .build()
            .unwrap();
        submit(&broker, &invocation);
        let claimed = claim(&broker, "worker-1").unwrap();

        report(
            &broker,
            "worker-1",
            TaskResult::failure(
                &claimed,
                TaskFailure::external_process("Rscript exited with 1", Some(1), "boom"),
            ),
        );

        let ack = query(&broker, &invocation);
        assert_eq!(ack.state, Some(InvocationState::Queued));
        assert!(ack.result.is_none());
        let requeued = ack.invocation.unwrap();
        assert_eq!(requeued.attempt, 1);
        assert!(requeued.not_before > Utc::now());

        // still backing off
        assert!(claim(&broker, "worker-1").is_none());
    }

    #[test]
    fn test_argument_failure_is_not_retried() {
        let broker = broker();
        let invocation = Invocation::builder(tasks::ADD, &["a", "b"])
            .unwrap()
            .max_retries(3)
            .build()
            .unwrap();
        submit(&broker, &invocation);
        let claimed = claim(&broker, "worker-1").unwrap();

        report(
            &broker,
            "worker-1",
            TaskResult::failure(&claimed, TaskFailure::argument("add expects two numbers")),
        );
        assert_eq!(query(&broker, &invocation).state, Some(InvocationState::Failed));
    }

    #[test]
    fn test_queue_depth_threshold() {
        let mut config = BrokerConfig::default();
        config.broker.queue_depth_threshold = 1;
        let broker = broker_with(config);

        submit(&broker, &tasks::add_invocation(1, 1).unwrap());
        let reply = broker.handle_message(Message::Submit(SubmitRequest {
            invocation: tasks::add_invocation(2, 2).unwrap(),
        }));
        assert!(matches!(reply, Message::Nack(_)));
    }

    #[test]
    fn test_claim_respects_task_names() {
        let broker = broker();
        let add = tasks::add_invocation(1, 1).unwrap();
        submit(&broker, &add);

        let reply = broker.handle_message(Message::Claim(ClaimRequest {
            worker_id: "violin-only".to_string(),
            task_names: vec![tasks::RUN_VIOLIN.to_string()],
        }));
        match reply {
            Message::Ack(ack) => assert!(ack.invocation.is_none()),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(claim(&broker, "any").unwrap().id, add.id);
    }

    #[test]
    fn test_dead_worker_invocation_fails_as_worker_lost() {
        let mut config = BrokerConfig::default();
        config.workers.heartbeat_timeout_secs = 1;
        let broker = broker_with(config);

        let invocation = tasks::add_invocation(1, 1).unwrap();
        submit(&broker, &invocation);
        claim(&broker, "worker-1").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(1100));
        broker.reclaim_from_dead_workers();

        let ack = query(&broker, &invocation);
        assert_eq!(ack.state, Some(InvocationState::Failed));
        assert_eq!(ack.result.unwrap().error.unwrap().kind, FailureKind::WorkerLost);
    }

    #[test]
    fn test_startup_recovers_running_invocations() {
        let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());
        let queued = tasks::add_invocation(1, 2).unwrap();
        let running = tasks::add_invocation(3, 4).unwrap();
        store.enqueue(&queued).unwrap();
        store.enqueue(&running).unwrap();
        store.mark_running(&running.id, "gone").unwrap();

        let broker = Broker::with_store(BrokerConfig::default(), store.clone()).unwrap();

        assert!(store.running().unwrap().is_empty());
        assert_eq!(broker.queue().len(), 2);
        assert!(claim(&broker, "worker-1").is_some());
    }

    #[test]
    fn test_expire_results_respects_retention() {
        let mut config = BrokerConfig::default();
        config.persistence.result_retention_secs = 0;
        let broker = broker_with(config);

        let invocation = tasks::add_invocation(1, 1).unwrap();
        submit(&broker, &invocation);
        let claimed = claim(&broker, "worker-1").unwrap();
        report(&broker, "worker-1", TaskResult::success(&claimed, b"2".to_vec()));

        std::thread::sleep(std::time::Duration::from_millis(10));
        broker.expire_results();
        assert!(matches!(
            broker.handle_message(Message::Query(QueryRequest {
                invocation_id: invocation.id
            })),
            Message::Nack(_)
        ));
    }
}
