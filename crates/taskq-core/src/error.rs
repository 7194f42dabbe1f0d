use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Arguments exceed maximum allowed size of {max} bytes (got {actual})")]
    ArgsTooLarge { max: usize, actual: usize },

    #[error("Task name must not be empty")]
    EmptyTaskName,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("Argument encoding error: {0}")]
    ArgumentEncoding(#[from] serde_json::Error),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TaskError>;
