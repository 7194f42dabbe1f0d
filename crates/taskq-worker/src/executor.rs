use crate::handler::{HandlerResult, TaskRegistry};
use std::sync::Arc;
use std::time::Duration;
use taskq_core::{FailureKind, Invocation, TaskFailure, TaskResult};
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Runs invocations against the registry, turning every way a task body can
/// go wrong into a failed result.
pub struct TaskExecutor {
    registry: Arc<TaskRegistry>,
    default_timeout: Duration,
}

impl TaskExecutor {
    pub fn new(registry: Arc<TaskRegistry>, default_timeout: Duration) -> Self {
        TaskExecutor {
            registry,
            default_timeout,
        }
    }

    /// Execute a claimed invocation and build its result
    pub async fn run(&self, invocation: &Invocation) -> TaskResult {
        match self.execute(invocation).await {
            Ok(value) => {
                info!("Invocation {} succeeded", invocation.id);
                TaskResult::success(invocation, value)
            }
            Err(failure) => {
                warn!("Invocation {} failed: {}", invocation.id, failure);
                TaskResult::failure(invocation, failure)
            }
        }
    }

    /// Execute with timeout and panic capture
    pub async fn execute(&self, invocation: &Invocation) -> HandlerResult {
        let handler = self.registry.get(&invocation.task_name).ok_or_else(|| {
            TaskFailure::new(
                FailureKind::UnknownTask,
                format!("no task registered under {:?}", invocation.task_name),
            )
        })?;

        let timeout_duration = if invocation.timeout_seconds > 0 {
            Duration::from_secs(invocation.timeout_seconds as u64)
        } else {
            self.default_timeout
        };

        info!(
            "Executing {} invocation {} with timeout {:?}",
            invocation.task_name, invocation.id, timeout_duration
        );

        // own task so a panic surfaces as a JoinError instead of unwinding here
        let args = invocation.args().to_vec();
        let handle = tokio::spawn(async move { handler.execute(args).await });
        let abort = handle.abort_handle();

        match timeout(timeout_duration, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_panic() => {
                error!("Invocation {} panicked", invocation.id);
                Err(TaskFailure::new(
                    FailureKind::Panicked,
                    panic_message(e.into_panic()),
                ))
            }
            Ok(Err(_)) => Err(TaskFailure::new(
                FailureKind::Environment,
                "task was cancelled",
            )),
            Err(_) => {
                abort.abort();
                error!(
                    "Invocation {} timed out after {:?}",
                    invocation.id, timeout_duration
                );
                Err(TaskFailure::new(
                    FailureKind::Timeout,
                    format!("execution timed out after {:?}", timeout_duration),
                ))
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("task panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("task panicked: {}", s)
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::TaskHandler;
    use crate::tasks::AddTask;
    use async_trait::async_trait;
    use taskq_core::{tasks, ResultStatus};

    struct Sleep;

    #[async_trait]
    impl TaskHandler for Sleep {
        fn params(&self) -> &'static [&'static str] {
            &[]
        }

        async fn execute(&self, _args: Vec<u8>) -> HandlerResult {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(b"null".to_vec())
        }
    }

    struct Explode;

    #[async_trait]
    impl TaskHandler for Explode {
        fn params(&self) -> &'static [&'static str] {
            &[]
        }

        async fn execute(&self, _args: Vec<u8>) -> HandlerResult {
            panic!("boom");
        }
    }

    fn executor() -> TaskExecutor {
        let registry = TaskRegistry::new();
        registry.register(tasks::ADD, AddTask).unwrap();
        registry.register("sleep", Sleep).unwrap();
        registry.register("explode", Explode).unwrap();
        TaskExecutor::new(Arc::new(registry), Duration::from_secs(30))
    }

    fn claimed(mut invocation: Invocation) -> Invocation {
        invocation.claim("worker-1").unwrap();
        invocation
    }

    #[tokio::test]
    async fn test_success_result() {
        let invocation = claimed(tasks::add_invocation(2, 3).unwrap());
        let result = executor().run(&invocation).await;

        assert_eq!(result.status, ResultStatus::Succeeded);
        assert_eq!(result.value_json(), Some(serde_json::json!(5)));
        assert_eq!(result.worker_id.as_deref(), Some("worker-1"));
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let invocation = claimed(Invocation::new("multiply", &[2, 3]).unwrap());
        let failure = executor().execute(&invocation).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::UnknownTask);
    }

    #[tokio::test]
    async fn test_timeout() {
        let invocation = Invocation::builder("sleep", &())
            .unwrap()
            .timeout_seconds(1)
            .build()
            .unwrap();
        let failure = executor().execute(&invocation).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let invocation = Invocation::new("explode", &()).unwrap();
        let failure = executor().execute(&invocation).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Panicked);
        assert!(failure.message.contains("boom"));
    }
}
