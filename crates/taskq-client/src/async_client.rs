use crate::{ClientError, Result};
use taskq_core::{tasks, Invocation, InvocationId, InvocationState, TaskResult};
use taskq_protocol::{AckResponse, Message, MessageCodec, QueryRequest, SubmitRequest};

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

const POLL_INTERVAL_MS: u64 = 200;

/// Async client for the task queue
#[derive(Debug, Clone)]
pub struct TaskQueueAsyncClient {
    broker_address: String,
}

impl TaskQueueAsyncClient {
    /// Connect to broker
    pub async fn connect(broker_address: impl Into<String>) -> Result<Self> {
        let broker_address = broker_address.into();

        // fail fast on a bad address
        let _ = TcpStream::connect(&broker_address)
            .await
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;

        Ok(TaskQueueAsyncClient { broker_address })
    }

    /// Enqueue `task_name(*args)`, where `args` encodes as a JSON array
    pub async fn submit<A: Serialize + ?Sized>(
        &self,
        task_name: impl Into<String>,
        args: &A,
    ) -> Result<AsyncResult> {
        let invocation = Invocation::new(task_name, args)?;
        self.send_invocation(invocation).await
    }

    /// Enqueue a prepared invocation
    pub async fn send_invocation(&self, invocation: Invocation) -> Result<AsyncResult> {
        let id = invocation.id;
        let task_name = invocation.task_name.clone();

        match self.request(Message::Submit(SubmitRequest { invocation })).await? {
            Message::Ack(_) => {
                debug!("Submitted {} invocation {}", task_name, id);
                Ok(AsyncResult {
                    id,
                    client: self.clone(),
                })
            }
            Message::Nack(nack) => Err(ClientError::ServerError(nack.error)),
            _ => Err(ClientError::ProtocolError("Unexpected response".to_string())),
        }
    }

    /// Enqueue `add(x, y)`
    pub async fn add(
        &self,
        x: impl Into<serde_json::Value>,
        y: impl Into<serde_json::Value>,
    ) -> Result<AsyncResult> {
        self.send_invocation(tasks::add_invocation(x, y)?).await
    }

    /// Enqueue `run_violin(path)`
    pub async fn run_violin(&self, path: impl AsRef<Path>) -> Result<AsyncResult> {
        self.send_invocation(tasks::run_violin_invocation(path)?).await
    }

    /// Current state of an invocation
    pub async fn status(&self, id: InvocationId) -> Result<InvocationState> {
        self.query(id)
            .await?
            .state
            .ok_or_else(|| ClientError::ProtocolError("Query reply without state".to_string()))
    }

    /// Terminal result, if one has been written
    pub async fn get_result(&self, id: InvocationId) -> Result<Option<TaskResult>> {
        Ok(self.query(id).await?.result)
    }

    /// Poll until the result is written or `timeout` elapses
    pub async fn wait_for_result(&self, id: InvocationId, timeout: Duration) -> Result<TaskResult> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(result) = self.get_result(id).await? {
                return Ok(result);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ClientError::Timeout);
            }
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    /// Full query reply: state, the invocation while live, the result once terminal
    pub async fn query(&self, id: InvocationId) -> Result<AckResponse> {
        match self.request(Message::Query(QueryRequest { invocation_id: id })).await? {
            Message::Ack(ack) => Ok(ack),
            Message::Nack(_) => Err(ClientError::InvocationNotFound(id)),
            _ => Err(ClientError::ProtocolError("Unexpected response".to_string())),
        }
    }

    async fn request(&self, message: Message) -> Result<Message> {
        let stream = TcpStream::connect(&self.broker_address)
            .await
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;

        let mut framed = Framed::new(stream, MessageCodec);
        framed
            .send(message)
            .await
            .map_err(|e| ClientError::ProtocolError(e.to_string()))?;

        match framed.next().await {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(e)) => Err(ClientError::ProtocolError(e.to_string())),
            None => Err(ClientError::ConnectionError("Connection closed".to_string())),
        }
    }
}

/// Handle to an enqueued invocation
#[derive(Debug, Clone)]
pub struct AsyncResult {
    id: InvocationId,
    client: TaskQueueAsyncClient,
}

impl AsyncResult {
    pub fn id(&self) -> InvocationId {
        self.id
    }

    pub async fn status(&self) -> Result<InvocationState> {
        self.client.status(self.id).await
    }

    /// Result if already written, without waiting
    pub async fn result(&self) -> Result<Option<TaskResult>> {
        self.client.get_result(self.id).await
    }

    /// Wait for the result
    pub async fn get(&self, timeout: Duration) -> Result<TaskResult> {
        self.client.wait_for_result(self.id, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use taskq_broker::{Broker, BrokerConfig};
    use taskq_persistence::MemoryTaskStore;
    use tokio::net::TcpListener;

    async fn start_broker() -> String {
        let broker = Arc::new(
            Broker::with_store(BrokerConfig::default(), Arc::new(MemoryTaskStore::new())).unwrap(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(broker.serve(listener));
        addr
    }

    #[tokio::test]
    async fn test_submit_and_poll_without_worker() {
        let client = TaskQueueAsyncClient::connect(start_broker().await)
            .await
            .unwrap();

        let handle = client.add(2, 3).await.unwrap();
        assert_eq!(handle.status().await.unwrap(), InvocationState::Queued);
        assert!(handle.result().await.unwrap().is_none());

        let ack = client.query(handle.id()).await.unwrap();
        let queued = ack.invocation.unwrap();
        assert_eq!(queued.task_name, tasks::ADD);
        assert_eq!(
            queued.decode_args::<serde_json::Value>().unwrap(),
            serde_json::json!([2, 3])
        );

        assert!(matches!(
            handle.get(Duration::from_millis(300)).await,
            Err(ClientError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_each_submission_gets_a_distinct_id() {
        let client = TaskQueueAsyncClient::connect(start_broker().await)
            .await
            .unwrap();

        let first = client.add(2, 3).await.unwrap();
        let second = client.add(2, 3).await.unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[tokio::test]
    async fn test_unknown_invocation() {
        let client = TaskQueueAsyncClient::connect(start_broker().await)
            .await
            .unwrap();

        let id = InvocationId::new_v4();
        assert!(matches!(
            client.status(id).await,
            Err(ClientError::InvocationNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_invalid_invocation_is_rejected_locally() {
        let client = TaskQueueAsyncClient::connect(start_broker().await)
            .await
            .unwrap();

        assert!(matches!(
            client.submit("", &[1, 2]).await,
            Err(ClientError::InvalidInvocation(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(matches!(
            TaskQueueAsyncClient::connect(addr).await,
            Err(ClientError::ConnectionError(_))
        ));
    }
}
