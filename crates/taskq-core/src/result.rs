use crate::{Invocation, InvocationId, Result, TaskError, TaskName};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Terminal outcome of an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultStatus {
    Succeeded,
    Failed,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Succeeded => "SUCCEEDED",
            ResultStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a failed invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Arguments were missing, of the wrong arity or the wrong type
    Argument,
    /// A required file or directory does not exist
    NotFound,
    /// The external process could not be spawned or exited non-zero
    ExternalProcess,
    /// The external process succeeded but its output file is absent
    OutputMissing,
    /// The execution environment could not be prepared
    Environment,
    /// No task definition is registered under the requested name
    UnknownTask,
    /// Execution exceeded its timeout
    Timeout,
    /// The task body panicked
    Panicked,
    /// The worker stopped heartbeating while holding the invocation
    WorkerLost,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Argument => "argument",
            FailureKind::NotFound => "not_found",
            FailureKind::ExternalProcess => "external_process",
            FailureKind::OutputMissing => "output_missing",
            FailureKind::Environment => "environment",
            FailureKind::UnknownTask => "unknown_task",
            FailureKind::Timeout => "timeout",
            FailureKind::Panicked => "panicked",
            FailureKind::WorkerLost => "worker_lost",
        }
    }

    /// Whether another attempt could produce a different outcome
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureKind::Argument | FailureKind::UnknownTask)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload attached to a failed result
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Exit code of the external process, when one ran
    pub exit_code: Option<i32>,
    /// Captured standard error of the external process
    pub stderr: Option<String>,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        TaskFailure {
            kind,
            message: message.into(),
            exit_code: None,
            stderr: None,
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Argument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    pub fn external_process(
        message: impl Into<String>,
        exit_code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        let stderr = stderr.into();
        TaskFailure {
            kind: FailureKind::ExternalProcess,
            message: message.into(),
            exit_code,
            stderr: (!stderr.is_empty()).then_some(stderr),
        }
    }
}

/// Outcome of one invocation, written once by the broker on behalf of a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub invocation_id: InvocationId,
    pub task_name: TaskName,
    pub status: ResultStatus,

    /// JSON-encoded return value (success only)
    pub value: Option<Vec<u8>>,

    /// Error payload (failure only)
    pub error: Option<TaskFailure>,

    /// Worker that produced the outcome
    pub worker_id: Option<String>,

    /// Attempts consumed, including the final one
    pub attempts: u32,

    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    /// Successful result carrying an already-encoded JSON value
    pub fn success(invocation: &Invocation, value: Vec<u8>) -> Self {
        Self::from_invocation(invocation, ResultStatus::Succeeded, Some(value), None)
    }

    /// Failed result carrying the error payload
    pub fn failure(invocation: &Invocation, error: TaskFailure) -> Self {
        Self::from_invocation(invocation, ResultStatus::Failed, None, Some(error))
    }

    fn from_invocation(
        invocation: &Invocation,
        status: ResultStatus,
        value: Option<Vec<u8>>,
        error: Option<TaskFailure>,
    ) -> Self {
        TaskResult {
            invocation_id: invocation.id,
            task_name: invocation.task_name.clone(),
            status,
            value,
            error,
            worker_id: invocation.worker_id.clone(),
            attempts: invocation.attempt,
            started_at: invocation.claimed_at,
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Succeeded
    }

    /// Decode the return value into a concrete type
    pub fn value_as<T: DeserializeOwned>(&self) -> Option<serde_json::Result<T>> {
        self.value.as_deref().map(serde_json::from_slice)
    }

    /// Return value as a generic JSON value
    pub fn value_json(&self) -> Option<serde_json::Value> {
        self.value_as::<serde_json::Value>().and_then(|v| v.ok())
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(TaskError::from)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(TaskError::from)
    }
}
