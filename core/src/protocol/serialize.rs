//! Serialization layer - Convert protocol messages to/from JSON
//!
//! Operations and messages travel as JSON text frames; these helpers map
//! serde failures onto `SyncError::Protocol`.

use crate::error::{Result, SyncError};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize any protocol message to a JSON frame
pub fn encode_message<M: Serialize>(msg: &M) -> Result<String> {
    serde_json::to_string(msg)
        .map_err(|e| SyncError::Protocol(format!("Failed to encode message: {}", e)))
}

/// Deserialize a protocol message from a JSON frame
pub fn decode_message<M: DeserializeOwned>(frame: &str) -> Result<M> {
    serde_json::from_str(frame)
        .map_err(|e| SyncError::Protocol(format!("Failed to decode message: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ot::Operation;
    use crate::protocol::{ClientMessage, ServerMessage};

    #[test]
    fn test_message_frames() {
        let msg = ClientMessage::Submit {
            operation: Operation::insert(0, "a").with_version(2),
        };
        let frame = encode_message(&msg).unwrap();
        assert!(frame.contains("\"action\":\"submit\""));
        assert_eq!(decode_message::<ClientMessage>(&frame).unwrap(), msg);
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode_message::<ServerMessage>("{not json").unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[test]
    fn test_decode_negative_offset() {
        let frame = r#"{"type":"ack","message":{"kind":"insert","data":{"offset":-1,"text":"a"},"version":0}}"#;
        let err = decode_message::<ServerMessage>(frame).unwrap_err();
        assert!(err.to_string().contains("negative offset"));
    }
}
