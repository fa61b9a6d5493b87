use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message as the store holds it. `timestamp` is the canonical instant;
/// presentation formatting happens in [`MessageView`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: Uuid,
    pub user: String,
    pub text: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub reaction: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Fields supplied by the relay when appending. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub user: String,
    pub text: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
}

impl NewMessage {
    pub fn text(user: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            text: Some(text.into()),
            file_url: None,
            file_name: None,
        }
    }

    pub fn file(
        user: impl Into<String>,
        file_url: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            text: None,
            file_url: Some(file_url.into()),
            file_name: Some(file_name.into()),
        }
    }
}

/// Client-facing shape of a message.
///
/// `timestamp` carries the clock presentation (`3:05 PM`) clients display,
/// `createdAt` the untouched instant so clients can still sort or reformat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<String>,
    pub timestamp: String,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    pub fn present(msg: StoredMessage, offset: &FixedOffset) -> Self {
        Self {
            timestamp: format_clock(msg.timestamp, offset),
            id: msg.id,
            user: msg.user,
            text: msg.text,
            file_url: msg.file_url,
            file_name: msg.file_name,
            reaction: msg.reaction,
            created_at: msg.timestamp,
        }
    }
}

/// Hour:minute with meridiem, e.g. `9:41 AM`, in the given offset.
pub fn format_clock(instant: DateTime<Utc>, offset: &FixedOffset) -> String {
    instant.with_timezone(offset).format("%-I:%M %p").to_string()
}
