use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageView;

/// Events sent FROM server TO clients over the WebSocket gateway.
/// Framed as `{"event": "<name>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Full history, sent once right after connect
    #[serde(rename = "load messages")]
    LoadMessages(Vec<MessageView>),

    #[serde(rename = "chat message")]
    ChatMessage(MessageView),

    #[serde(rename = "file message")]
    FileMessage(MessageView),

    /// The message after its reaction was updated
    #[serde(rename = "chat reaction")]
    ChatReaction(MessageView),

    /// Acknowledgement for joining or leaving a private room
    #[serde(rename = "private status")]
    PrivateStatus(String),

    #[serde(rename = "private message")]
    PrivateMessage { sender: String, message: String },

    /// The triggering event could not be completed
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadMessages(_) => "load messages",
            Self::ChatMessage(_) => "chat message",
            Self::FileMessage(_) => "file message",
            Self::ChatReaction(_) => "chat reaction",
            Self::PrivateStatus(_) => "private status",
            Self::PrivateMessage { .. } => "private message",
            Self::Error { .. } => "error",
        }
    }
}

/// Commands sent FROM client TO server over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientCommand {
    #[serde(rename = "set username")]
    SetUsername(String),

    #[serde(rename = "chat message")]
    ChatMessage { text: String },

    #[serde(rename = "file message", rename_all = "camelCase")]
    FileMessage { file_url: String, file_name: String },

    #[serde(rename = "chat reaction", rename_all = "camelCase")]
    ChatReaction { message_id: Uuid, reaction: String },

    #[serde(rename = "join private", rename_all = "camelCase")]
    JoinPrivate { room_id: String },

    #[serde(rename = "leave private", rename_all = "camelCase")]
    LeavePrivate { room_id: String },

    /// `sender` is whatever label the client chose; it is relayed verbatim.
    #[serde(rename = "private message", rename_all = "camelCase")]
    PrivateMessage {
        room_id: String,
        sender: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_set_username() {
        let cmd: ClientCommand =
            serde_json::from_str(r#"{"event":"set username","data":"Nafij"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::SetUsername("Nafij".into()));
    }

    #[test]
    fn parses_camel_case_payloads() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"event":"file message","data":{"fileUrl":"/uploads/1-a.png","fileName":"a.png"}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            ClientCommand::FileMessage {
                file_url: "/uploads/1-a.png".into(),
                file_name: "a.png".into(),
            }
        );

        let cmd: ClientCommand = serde_json::from_str(
            r#"{"event":"private message","data":{"roomId":"r1","sender":"A","message":"secret"}}"#,
        )
        .unwrap();
        assert!(matches!(cmd, ClientCommand::PrivateMessage { ref room_id, .. } if room_id == "r1"));
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(serde_json::from_str::<ClientCommand>(r#"{"event":"chat message","data":{}}"#).is_err());
        assert!(serde_json::from_str::<ClientCommand>(r#"{"event":"join private"}"#).is_err());
        assert!(
            serde_json::from_str::<ClientCommand>(
                r#"{"event":"chat reaction","data":{"messageId":"nope","reaction":"+1"}}"#
            )
            .is_err()
        );
        assert!(serde_json::from_str::<ClientCommand>(r#"{"event":"dance","data":1}"#).is_err());
    }

    #[test]
    fn server_event_framing() {
        let json = serde_json::to_value(ServerEvent::PrivateStatus("Joined private room: r1".into()))
            .unwrap();
        assert_eq!(json["event"], "private status");
        assert_eq!(json["data"], "Joined private room: r1");

        let event = ServerEvent::PrivateMessage {
            sender: "A".into(),
            message: "secret".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["data"]["sender"], "A");
    }
}
