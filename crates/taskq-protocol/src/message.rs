use serde::{Deserialize, Serialize};
use taskq_core::{Invocation, InvocationId, InvocationState, TaskResult};

/// Message types for the TCP protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Submit = 1,
    Claim = 2,
    Report = 3,
    Heartbeat = 4,
    Ack = 5,
    Nack = 6,
    Query = 7,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::Submit),
            2 => Some(MessageType::Claim),
            3 => Some(MessageType::Report),
            4 => Some(MessageType::Heartbeat),
            5 => Some(MessageType::Ack),
            6 => Some(MessageType::Nack),
            7 => Some(MessageType::Query),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Caller enqueues an invocation
    Submit(SubmitRequest),

    /// Worker asks for the next invocation
    Claim(ClaimRequest),

    /// Worker reports the outcome of an invocation
    Report(ReportRequest),

    /// Worker heartbeat
    Heartbeat(HeartbeatRequest),

    /// Positive acknowledgment
    Ack(AckResponse),

    /// Negative acknowledgment
    Nack(NackResponse),

    /// Caller polls an invocation by id
    Query(QueryRequest),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Submit(_) => MessageType::Submit,
            Message::Claim(_) => MessageType::Claim,
            Message::Report(_) => MessageType::Report,
            Message::Heartbeat(_) => MessageType::Heartbeat,
            Message::Ack(_) => MessageType::Ack,
            Message::Nack(_) => MessageType::Nack,
            Message::Query(_) => MessageType::Query,
        }
    }

    pub fn ack() -> Self {
        Message::Ack(AckResponse::default())
    }

    pub fn ack_with_message(message: impl Into<String>) -> Self {
        Message::Ack(AckResponse {
            message: Some(message.into()),
            ..AckResponse::default()
        })
    }

    pub fn nack(error: impl Into<String>) -> Self {
        Message::Nack(NackResponse {
            error: error.into(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub invocation: Invocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub worker_id: String,
    /// Task names this worker can execute (empty = any)
    pub task_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub worker_id: String,
    pub result: TaskResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub worker_id: String,
    pub current_task_count: usize,
    pub cpu_usage_percent: f32,
    pub memory_usage_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub invocation_id: InvocationId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AckResponse {
    /// Invocation handed out (Claim) or looked up (Query)
    pub invocation: Option<Invocation>,
    /// Current state (Query)
    pub state: Option<InvocationState>,
    /// Terminal outcome, once written (Query)
    pub result: Option<TaskResult>,
    /// Optional human-readable message
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NackResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_conversion() {
        assert_eq!(MessageType::from_u8(1), Some(MessageType::Submit));
        assert_eq!(MessageType::from_u8(7), Some(MessageType::Query));
        assert_eq!(MessageType::from_u8(99), None);

        assert_eq!(MessageType::Submit.as_u8(), 1);
        assert_eq!(MessageType::Query.as_u8(), 7);
    }

    #[test]
    fn test_message_type_matches_variant() {
        assert_eq!(Message::ack().message_type(), MessageType::Ack);
        assert_eq!(Message::nack("boom").message_type(), MessageType::Nack);
    }
}
