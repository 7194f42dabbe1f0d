mod async_client;
mod sync_client;

pub use async_client::{AsyncResult, TaskQueueAsyncClient};
pub use sync_client::TaskQueueClient;

use taskq_core::InvocationId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Invalid invocation: {0}")]
    InvalidInvocation(#[from] taskq_core::TaskError),

    #[error("Invocation not found: {0}")]
    InvocationNotFound(InvocationId),

    #[error("Timeout")]
    Timeout,

    #[error("Server error: {0}")]
    ServerError(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
