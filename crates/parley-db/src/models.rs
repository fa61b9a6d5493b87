use anyhow::{Result, anyhow};
use chrono::DateTime;
use parley_types::models::StoredMessage;

/// Database row types; these map directly to SQLite rows.
/// Distinct from parley-types models to keep the DB layer independent.
pub struct MessageRow {
    pub id: String,
    pub user_name: String,
    pub text: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub reaction: Option<String>,
    pub created_at: i64,
}

impl MessageRow {
    pub const COLUMNS: &'static str =
        "id, user_name, text, file_url, file_name, reaction, created_at";

    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_name: row.get(1)?,
            text: row.get(2)?,
            file_url: row.get(3)?,
            file_name: row.get(4)?,
            reaction: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    pub fn into_stored(self) -> Result<StoredMessage> {
        let id = self
            .id
            .parse()
            .map_err(|e| anyhow!("Corrupt message id '{}': {}", self.id, e))?;
        let timestamp = DateTime::from_timestamp_millis(self.created_at)
            .ok_or_else(|| anyhow!("Corrupt created_at {} on message '{}'", self.created_at, self.id))?;

        Ok(StoredMessage {
            id,
            user: self.user_name,
            text: self.text,
            file_url: self.file_url,
            file_name: self.file_name,
            reaction: self.reaction,
            timestamp,
        })
    }
}
