mod message;
mod codec;

pub use message::{
    AckResponse, ClaimRequest, HeartbeatRequest, Message, MessageType, NackResponse,
    QueryRequest, ReportRequest, SubmitRequest,
};
pub use codec::MessageCodec;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Maximum frame size: 11MB (10MB of arguments or result value + envelope)
pub const MAX_MESSAGE_SIZE: usize = 11 * 1024 * 1024;
