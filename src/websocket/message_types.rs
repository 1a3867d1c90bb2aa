use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames a connected client may send. Conversation and user identity come
/// from the connection parameters, never from the frame.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsClientEvent {
    #[serde(rename = "typing.start")]
    TypingStart,

    #[serde(rename = "typing.stop")]
    TypingStop,

    #[serde(rename = "read.mark")]
    ReadMark { message_ids: Vec<Uuid> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typing_frames() {
        let evt: WsClientEvent = serde_json::from_str(r#"{"type":"typing.start"}"#).unwrap();
        assert!(matches!(evt, WsClientEvent::TypingStart));
    }

    #[test]
    fn parses_read_mark_frame() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"read.mark","message_ids":["{id}"]}}"#);
        let evt: WsClientEvent = serde_json::from_str(&raw).unwrap();
        match evt {
            WsClientEvent::ReadMark { message_ids } => assert_eq!(message_ids, vec![id]),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
