use crate::{Result, TaskError, MAX_ARGS_SIZE};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for an invocation
pub type InvocationId = Uuid;

/// Registered task name (e.g., "add", "run_violin")
pub type TaskName = String;

/// Lifecycle of a single invocation.
///
/// `Queued -> Running -> {Succeeded | Failed}`. The broker may move a
/// `Running` invocation back to `Queued` when it schedules a retry or when
/// the worker holding it stops heartbeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvocationState {
    /// Waiting in the broker for a worker to claim it
    Queued,
    /// Claimed by a worker and executing
    Running,
    /// Finished with a value
    Succeeded,
    /// Finished with an error payload
    Failed,
}

impl InvocationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationState::Queued => "queued",
            InvocationState::Running => "running",
            InvocationState::Succeeded => "succeeded",
            InvocationState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationState::Succeeded | InvocationState::Failed)
    }

    pub fn can_transition_to(&self, next: InvocationState) -> bool {
        use InvocationState::*;
        matches!(
            (self, next),
            (Queued, Running) | (Running, Succeeded) | (Running, Failed) | (Running, Queued)
        )
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvocationState {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(InvocationState::Queued),
            "running" => Ok(InvocationState::Running),
            "succeeded" => Ok(InvocationState::Succeeded),
            "failed" => Ok(InvocationState::Failed),
            other => Err(TaskError::Other(format!("unknown invocation state: {}", other))),
        }
    }
}

/// One request to execute a named task with a fixed argument tuple.
///
/// Arguments are JSON-encoded at construction and cannot be changed
/// afterwards; everything else is broker bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Unique invocation identifier
    pub id: InvocationId,

    /// Name of the task definition to run
    pub task_name: TaskName,

    /// JSON-encoded positional arguments
    args: Vec<u8>,

    /// When the caller submitted the invocation
    pub submitted_at: DateTime<Utc>,

    /// Current lifecycle state
    pub state: InvocationState,

    /// Number of times this invocation has been handed to a worker
    pub attempt: u32,

    /// Broker-level retry budget (0 = never retried)
    pub max_retries: u32,

    /// Earliest time a worker may claim it
    pub not_before: DateTime<Utc>,

    /// Execution timeout in seconds (0 = worker default)
    pub timeout_seconds: u32,

    /// Worker currently holding the invocation
    pub worker_id: Option<String>,

    /// When the current attempt was claimed
    pub claimed_at: Option<DateTime<Utc>>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Invocation {
    /// Create an invocation, encoding `args` as a JSON value
    pub fn new<A: Serialize + ?Sized>(task_name: impl Into<TaskName>, args: &A) -> Result<Self> {
        Self::builder(task_name, args)?.build()
    }

    /// Create an invocation from already-encoded JSON arguments
    pub fn from_json_args(task_name: impl Into<TaskName>, args: Vec<u8>) -> Result<Self> {
        InvocationBuilder::from_json_args(task_name.into(), args)?.build()
    }

    pub fn builder<A: Serialize + ?Sized>(
        task_name: impl Into<TaskName>,
        args: &A,
    ) -> Result<InvocationBuilder> {
        let encoded = serde_json::to_vec(args)?;
        InvocationBuilder::from_json_args(task_name.into(), encoded)
    }

    /// Raw JSON argument bytes
    pub fn args(&self) -> &[u8] {
        &self.args
    }

    /// Decode the arguments into a concrete type
    pub fn decode_args<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.args)
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(TaskError::from)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(TaskError::from)
    }

    /// Check if the invocation may be claimed now
    pub fn is_ready(&self) -> bool {
        self.not_before <= Utc::now()
    }

    /// Check if a failed attempt should be re-queued
    pub fn can_retry(&self) -> bool {
        self.attempt <= self.max_retries
    }

    /// Back-off before the next attempt: `base * 2^(attempt - 1)`, capped at `max`
    pub fn retry_delay_seconds(&self, base: u64, max: u64) -> u64 {
        let exponent = self.attempt.saturating_sub(1).min(31);
        base.saturating_mul(2u64.pow(exponent)).min(max)
    }

    fn transition(&mut self, next: InvocationState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the invocation as claimed by a worker
    pub fn claim(&mut self, worker_id: impl Into<String>) -> Result<()> {
        self.transition(InvocationState::Running)?;
        self.attempt += 1;
        self.worker_id = Some(worker_id.into());
        self.claimed_at = Some(self.updated_at);
        Ok(())
    }

    /// Put a running invocation back in the queue, optionally delayed
    pub fn requeue(&mut self, delay_secs: u64) -> Result<()> {
        self.transition(InvocationState::Queued)?;
        self.worker_id = None;
        self.claimed_at = None;
        self.not_before = self.updated_at + chrono::Duration::seconds(delay_secs as i64);
        Ok(())
    }

    /// Move a running invocation to its terminal state
    pub fn finish(&mut self, succeeded: bool) -> Result<()> {
        let next = if succeeded {
            InvocationState::Succeeded
        } else {
            InvocationState::Failed
        };
        self.transition(next)
    }
}

/// Builder for invocations with non-default broker options
pub struct InvocationBuilder {
    task_name: TaskName,
    args: Vec<u8>,
    max_retries: u32,
    timeout_seconds: u32,
    not_before: Option<DateTime<Utc>>,
}

impl InvocationBuilder {
    fn from_json_args(task_name: TaskName, args: Vec<u8>) -> Result<Self> {
        if task_name.trim().is_empty() {
            return Err(TaskError::EmptyTaskName);
        }
        if args.len() > MAX_ARGS_SIZE {
            return Err(TaskError::ArgsTooLarge {
                max: MAX_ARGS_SIZE,
                actual: args.len(),
            });
        }
        // Reject anything that is not a JSON document up front
        serde_json::from_slice::<serde_json::Value>(&args)?;

        Ok(InvocationBuilder {
            task_name,
            args,
            max_retries: 0,
            timeout_seconds: 0,
            not_before: None,
        })
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn timeout_seconds(mut self, timeout_seconds: u32) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn not_before(mut self, not_before: DateTime<Utc>) -> Self {
        self.not_before = Some(not_before);
        self
    }

    pub fn build(self) -> Result<Invocation> {
        let now = Utc::now();
        Ok(Invocation {
            id: Uuid::new_v4(),
            task_name: self.task_name,
            args: self.args,
            submitted_at: now,
            state: InvocationState::Queued,
            attempt: 0,
            max_retries: self.max_retries,
            not_before: self.not_before.unwrap_or(now),
            timeout_seconds: self.timeout_seconds,
            worker_id: None,
            claimed_at: None,
            updated_at: now,
        })
    }
}
