use crate::{config::WorkerConfig, executor::TaskExecutor, handler::TaskRegistry};
use taskq_core::{Invocation, TaskResult};
use taskq_protocol::{ClaimRequest, HeartbeatRequest, Message, MessageCodec, ReportRequest};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const CLAIM_POLL_INTERVAL_MS: u64 = 100;

/// Worker process that claims invocations and executes them
pub struct Worker {
    config: WorkerConfig,
    worker_id: String,
    registry: Arc<TaskRegistry>,
    active_tasks: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(config: WorkerConfig, registry: TaskRegistry) -> Self {
        let worker_id = config.generate_worker_id();

        Worker {
            config,
            worker_id,
            registry: Arc::new(registry),
            active_tasks: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    /// Token that stops the worker when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run until shutdown or until the broker connection drops
    pub async fn run(&self) -> anyhow::Result<()> {
        info!(
            "Starting worker {} (concurrency: {}, tasks: {:?})",
            self.worker_id,
            self.config.concurrency,
            self.registry.task_names()
        );

        // Connect to broker
        let stream = TcpStream::connect(&self.config.broker_address).await?;
        info!("Connected to broker at {}", self.config.broker_address);
        let mut framed = Framed::new(stream, MessageCodec);

        let executor = Arc::new(TaskExecutor::new(
            self.registry.clone(),
            Duration::from_secs(self.config.task_timeout_secs),
        ));
        // Finished tasks hand their results back to this loop
        let (results_tx, mut results_rx) = mpsc::channel::<TaskResult>(self.config.concurrency.max(1));

        let mut heartbeat =
            tokio::time::interval(Duration::from_secs(self.config.heartbeat_interval_secs.max(1)));
        let mut poll = tokio::time::interval(Duration::from_millis(CLAIM_POLL_INTERVAL_MS));

        // Main worker loop
        loop {
            tokio::select! {
                biased;

                // Check for shutdown
                _ = self.shutdown.cancelled() => {
                    info!("Worker shutting down gracefully");
                    break;
                }

                // Report result
                Some(result) = results_rx.recv() => {
                    self.report(&mut framed, result).await?;
                }

                // Send heartbeat
                _ = heartbeat.tick() => {
                    self.heartbeat(&mut framed).await?;
                }

                // Claim invocations if we have capacity
                _ = poll.tick() => {
                    if self.active_tasks() >= self.config.concurrency {
                        continue;
                    }
                    if let Some(invocation) = self.claim(&mut framed).await? {
                        self.spawn_execution(executor.clone(), invocation, results_tx.clone());
                    }
                }
            }
        }

        self.drain(&mut framed, &mut results_rx).await
    }

    async fn claim(
        &self,
        framed: &mut Framed<TcpStream, MessageCodec>,
    ) -> anyhow::Result<Option<Invocation>> {
        let claim = Message::Claim(ClaimRequest {
            worker_id: self.worker_id.clone(),
            task_names: self.registry.task_names(),
        });

        match request(framed, claim).await? {
            Message::Ack(ack) => Ok(ack.invocation),
            Message::Nack(nack) => {
                debug!("Claim rejected: {}", nack.error);
                Ok(None)
            }
            other => {
                warn!("Unexpected reply to claim: {:?}", other.message_type());
                Ok(None)
            }
        }
    }

    fn spawn_execution(
        &self,
        executor: Arc<TaskExecutor>,
        invocation: Invocation,
        results_tx: mpsc::Sender<TaskResult>,
    ) {
        // Increment active task count
        let active_tasks = self.active_tasks.clone();
        active_tasks.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            // Execute invocation
            let result = executor.run(&invocation).await;
            if results_tx.send(result).await.is_err() {
                error!("Dropped result for {}: worker loop has stopped", invocation.id);
            }
            active_tasks.fetch_sub(1, Ordering::SeqCst);
        });
    }

    async fn report(
        &self,
        framed: &mut Framed<TcpStream, MessageCodec>,
        result: TaskResult,
    ) -> anyhow::Result<()> {
        let id = result.invocation_id;
        let report = Message::Report(ReportRequest {
            worker_id: self.worker_id.clone(),
            result,
        });

        // Wait for acknowledgment
        match request(framed, report).await? {
            Message::Ack(_) => debug!("Result for {} acknowledged", id),
            Message::Nack(nack) => warn!("Broker rejected result for {}: {}", id, nack.error),
            other => warn!("Unexpected reply to report: {:?}", other.message_type()),
        }
        Ok(())
    }

    async fn heartbeat(&self, framed: &mut Framed<TcpStream, MessageCodec>) -> anyhow::Result<()> {
        let (cpu, memory) = get_system_stats();
        let heartbeat = Message::Heartbeat(HeartbeatRequest {
            worker_id: self.worker_id.clone(),
            current_task_count: self.active_tasks(),
            cpu_usage_percent: cpu,
            memory_usage_mb: memory,
        });

        if let Message::Nack(nack) = request(framed, heartbeat).await? {
            warn!("Heartbeat rejected: {}", nack.error);
        }
        Ok(())
    }

    /// Stop claiming and keep reporting until in-flight work finishes or the
    /// grace period runs out
    async fn drain(
        &self,
        framed: &mut Framed<TcpStream, MessageCodec>,
        results_rx: &mut mpsc::Receiver<TaskResult>,
    ) -> anyhow::Result<()> {
        info!("Waiting for {} active tasks to complete...", self.active_tasks());

        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(self.config.graceful_shutdown_timeout_secs);
        let mut check = tokio::time::interval(Duration::from_millis(100));

        loop {
            tokio::select! {
                Some(result) = results_rx.recv() => {
                    self.report(framed, result).await?;
                }
                _ = check.tick() => {
                    if self.active_tasks() == 0 && results_rx.is_empty() {
                        info!("All tasks completed, shutting down");
                        return Ok(());
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(
                        "Shutdown deadline exceeded, {} tasks still active",
                        self.active_tasks()
                    );
                    return Ok(());
                }
            }
        }
    }
}

/// Send one message and wait for the broker's reply
async fn request(
    framed: &mut Framed<TcpStream, MessageCodec>,
    message: Message,
) -> anyhow::Result<Message> {
    framed.send(message).await?;
    match framed.next().await {
        Some(reply) => Ok(reply?),
        None => anyhow::bail!("connection closed by broker"),
    }
}

/// CPU and memory (MB) of this process
fn get_system_stats() -> (f32, u64) {
    let mut sys = sysinfo::System::new_all();
    sys.refresh_all();

    match sys.process(sysinfo::Pid::from_u32(std::process::id())) {
        Some(process) => (process.cpu_usage(), process.memory() / 1024 / 1024),
        None => (0.0, 0),
    }
}
