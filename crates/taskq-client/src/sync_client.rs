use crate::async_client::TaskQueueAsyncClient;
use crate::{ClientError, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use taskq_core::{Invocation, InvocationId, InvocationState, TaskResult};

/// Blocking client (wraps the async client on its own runtime).
///
/// Must not be used from inside an async context.
pub struct TaskQueueClient {
    runtime: tokio::runtime::Runtime,
    inner: TaskQueueAsyncClient,
}

impl TaskQueueClient {
    /// Connect to broker
    pub fn connect(broker_address: impl Into<String>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;
        let inner = runtime.block_on(TaskQueueAsyncClient::connect(broker_address))?;

        Ok(TaskQueueClient { runtime, inner })
    }

    pub fn submit<A: Serialize + ?Sized>(
        &self,
        task_name: impl Into<String>,
        args: &A,
    ) -> Result<InvocationId> {
        let handle = self.runtime.block_on(self.inner.submit(task_name, args))?;
        Ok(handle.id())
    }

    pub fn send_invocation(&self, invocation: Invocation) -> Result<InvocationId> {
        let handle = self.runtime.block_on(self.inner.send_invocation(invocation))?;
        Ok(handle.id())
    }

    pub fn add(
        &self,
        x: impl Into<serde_json::Value>,
        y: impl Into<serde_json::Value>,
    ) -> Result<InvocationId> {
        let handle = self.runtime.block_on(self.inner.add(x, y))?;
        Ok(handle.id())
    }

    pub fn run_violin(&self, path: impl AsRef<Path>) -> Result<InvocationId> {
        let handle = self.runtime.block_on(self.inner.run_violin(path))?;
        Ok(handle.id())
    }

    pub fn status(&self, id: InvocationId) -> Result<InvocationState> {
        self.runtime.block_on(self.inner.status(id))
    }

    pub fn get_result(&self, id: InvocationId) -> Result<Option<TaskResult>> {
        self.runtime.block_on(self.inner.get_result(id))
    }

    pub fn wait_for_result(&self, id: InvocationId, timeout: Duration) -> Result<TaskResult> {
        self.runtime.block_on(self.inner.wait_for_result(id, timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use taskq_broker::{Broker, BrokerConfig};
    use taskq_persistence::MemoryTaskStore;

    #[test]
    fn test_blocking_client_against_broker() {
        let broker_runtime = tokio::runtime::Runtime::new().unwrap();
        let addr = broker_runtime.block_on(async {
            let broker = Arc::new(
                Broker::with_store(BrokerConfig::default(), Arc::new(MemoryTaskStore::new()))
                    .unwrap(),
            );
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap().to_string();
            tokio::spawn(broker.serve(listener));
            addr
        });

        let client = TaskQueueClient::connect(addr).unwrap();
        let id = client.run_violin("/data/experiment1").unwrap();

        assert_eq!(client.status(id).unwrap(), InvocationState::Queued);
        assert!(client.get_result(id).unwrap().is_none());
        assert!(matches!(
            client.wait_for_result(id, Duration::from_millis(250)),
            Err(ClientError::Timeout)
        ));
    }
}
