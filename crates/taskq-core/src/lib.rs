mod error;
mod invocation;
mod result;
pub mod tasks;

pub use error::{Result, TaskError};
pub use invocation::{Invocation, InvocationBuilder, InvocationId, InvocationState, TaskName};
pub use result::{FailureKind, ResultStatus, TaskFailure, TaskResult};

pub const MAX_ARGS_SIZE: usize = 10 * 1024 * 1024; // 10MB
