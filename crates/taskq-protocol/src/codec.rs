use crate::{Message, MessageType, ProtocolError, Result, MAX_MESSAGE_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Bytes taken by the length prefix
const LENGTH_PREFIX: usize = 4;

/// Length prefix plus the message type byte
const HEADER_LEN: usize = LENGTH_PREFIX + 1;

/// Length-prefixed framing for broker traffic.
///
/// Frame format: [4-byte length (big-endian)] [1-byte message type] [bincode payload].
/// The length counts the type byte and the payload.
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        // Peek at the length without consuming it
        let length = (&src[..LENGTH_PREFIX]).get_u32() as usize;
        if length == 0 {
            return Err(ProtocolError::EmptyFrame);
        }
        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(length));
        }

        // Wait for the rest of the frame
        let frame_len = LENGTH_PREFIX + length;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        frame.advance(LENGTH_PREFIX);
        let type_byte = frame.get_u8();
        let msg_type =
            MessageType::from_u8(type_byte).ok_or(ProtocolError::InvalidMessageType(type_byte))?;

        decode_payload(msg_type, &frame).map(Some)
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let payload = encode_payload(&item)?;

        let length = 1 + payload.len();
        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(length));
        }

        dst.reserve(LENGTH_PREFIX + length);
        dst.put_u32(length as u32);
        dst.put_u8(item.message_type().as_u8());
        dst.put_slice(&payload);

        Ok(())
    }
}

fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<Message> {
    Ok(match msg_type {
        MessageType::Submit => Message::Submit(bincode::deserialize(payload)?),
        MessageType::Claim => Message::Claim(bincode::deserialize(payload)?),
        MessageType::Report => Message::Report(bincode::deserialize(payload)?),
        MessageType::Heartbeat => Message::Heartbeat(bincode::deserialize(payload)?),
        MessageType::Query => Message::Query(bincode::deserialize(payload)?),
        MessageType::Ack => Message::Ack(bincode::deserialize(payload)?),
        MessageType::Nack => Message::Nack(bincode::deserialize(payload)?),
    })
}

fn encode_payload(message: &Message) -> Result<Vec<u8>> {
    Ok(match message {
        Message::Submit(req) => bincode::serialize(req)?,
        Message::Claim(req) => bincode::serialize(req)?,
        Message::Report(req) => bincode::serialize(req)?,
        Message::Heartbeat(req) => bincode::serialize(req)?,
        Message::Query(req) => bincode::serialize(req)?,
        Message::Ack(resp) => bincode::serialize(resp)?,
        Message::Nack(resp) => bincode::serialize(resp)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AckResponse, ReportRequest, SubmitRequest};
    use taskq_core::tasks;
    use taskq_core::{InvocationState, TaskFailure, TaskResult};

    #[test]
    fn test_submit_frame_decodes_to_same_invocation() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();

        let invocation = tasks::add_invocation(2, 3).unwrap();
        let message = Message::Submit(SubmitRequest {
            invocation: invocation.clone(),
        });

        codec.encode(message, &mut buffer).unwrap();

        match codec.decode(&mut buffer).unwrap() {
            Some(Message::Submit(req)) => {
                assert_eq!(req.invocation.id, invocation.id);
                assert_eq!(req.invocation.args(), invocation.args());
            }
            other => panic!("Wrong message: {:?}", other),
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_query_ack_carries_failure_payload() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();

        let mut invocation = tasks::run_violin_invocation("/data/experiment1").unwrap();
        invocation.claim("worker-1").unwrap();
        let result = TaskResult::failure(
            &invocation,
            TaskFailure::not_found("run_violin_plot.R not found in /data/experiment1"),
        );

        codec
            .encode(
                Message::Ack(AckResponse {
                    state: Some(InvocationState::Failed),
                    result: Some(result),
                    ..AckResponse::default()
                }),
                &mut buffer,
            )
            .unwrap();

        match codec.decode(&mut buffer).unwrap() {
            Some(Message::Ack(ack)) => {
                assert_eq!(ack.state, Some(InvocationState::Failed));
                let result = ack.result.unwrap();
                assert!(!result.is_success());
                assert!(result.error.unwrap().message.contains("run_violin_plot.R"));
            }
            other => panic!("Wrong message: {:?}", other),
        }
    }

    #[test]
    fn test_partial_frame_waits_for_more_data() {
        let mut codec = MessageCodec;
        let mut buffer = BytesMut::new();

        let invocation = tasks::add_invocation(1, 1).unwrap();
        let result = TaskResult::success(&invocation, b"2".to_vec());
        codec
            .encode(
                Message::Report(ReportRequest {
                    worker_id: "w".to_string(),
                    result,
                }),
                &mut buffer,
            )
            .unwrap();

        let full_len = buffer.len();
        let mut partial = buffer.split_to(full_len / 2);

        assert!(codec.decode(&mut partial).unwrap().is_none());

        // feeding the rest completes the frame
        partial.extend_from_slice(&buffer);
        assert!(matches!(
            codec.decode(&mut partial).unwrap(),
            Some(Message::Report(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_type_and_oversized_frames() {
        let mut codec = MessageCodec;

        let mut bad_type = BytesMut::new();
        bad_type.put_u32(1);
        bad_type.put_u8(42);
        assert!(matches!(
            codec.decode(&mut bad_type),
            Err(ProtocolError::InvalidMessageType(42))
        ));

        let mut oversized = BytesMut::new();
        oversized.put_u32((MAX_MESSAGE_SIZE + 1) as u32);
        oversized.put_u8(MessageType::Submit.as_u8());
        assert!(matches!(
            codec.decode(&mut oversized),
            Err(ProtocolError::MessageTooLarge(_))
        ));
    }
}
