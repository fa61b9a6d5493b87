use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use parley_types::models::{NewMessage, StoredMessage};

use crate::Database;
use crate::models::MessageRow;

impl Database {
    // -- Messages --

    /// Insert a message, assigning its id and creation time.
    ///
    /// The creation time never goes below the newest stored one, so ordering by
    /// `created_at` agrees with insertion order even if the wall clock steps back.
    pub fn insert_message(&self, msg: &NewMessage) -> Result<StoredMessage> {
        self.with_conn(|conn| {
            let newest: i64 = conn.query_row(
                "SELECT COALESCE(MAX(created_at), 0) FROM messages",
                [],
                |row| row.get(0),
            )?;
            let created_at = Utc::now().timestamp_millis().max(newest);
            let id = Uuid::new_v4();

            conn.execute(
                "INSERT INTO messages (id, user_name, text, file_url, file_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.to_string(),
                    msg.user,
                    msg.text,
                    msg.file_url,
                    msg.file_name,
                    created_at
                ],
            )?;

            query_message(conn, &id.to_string())?
                .ok_or_else(|| anyhow::anyhow!("Inserted message {} vanished", id))?
                .into_stored()
        })
    }

    /// Set the reaction on a message. Returns `None` when no message has that id.
    pub fn set_reaction(&self, id: &str, reaction: &str) -> Result<Option<StoredMessage>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET reaction = ?1 WHERE id = ?2",
                (reaction, id),
            )?;
            if changed == 0 {
                return Ok(None);
            }

            query_message(conn, id)?.map(MessageRow::into_stored).transpose()
        })
    }

    #[cfg(test)]
    fn get_message(&self, id: &str) -> Result<Option<StoredMessage>> {
        self.with_conn(|conn| query_message(conn, id)?.map(MessageRow::into_stored).transpose())
    }

    /// Every message, oldest first; equal timestamps keep insertion order.
    pub fn list_messages(&self) -> Result<Vec<StoredMessage>> {
        self.with_conn(|conn| {
            query_messages(conn)?
                .into_iter()
                .map(MessageRow::into_stored)
                .collect()
        })
    }
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let sql = format!("SELECT {} FROM messages WHERE id = ?1", MessageRow::COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([id], MessageRow::from_row).optional()?;
    Ok(row)
}

fn query_messages(conn: &Connection) -> Result<Vec<MessageRow>> {
    let sql = format!(
        "SELECT {} FROM messages ORDER BY created_at ASC, seq ASC",
        MessageRow::COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map([], MessageRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_assigns_unique_ids_and_lists_in_order() {
        let db = Database::open_in_memory().unwrap();
        let a = db.insert_message(&NewMessage::text("A", "first")).unwrap();
        let b = db.insert_message(&NewMessage::text("B", "second")).unwrap();
        let c = db
            .insert_message(&NewMessage::file("C", "/uploads/1-x.png", "x.png"))
            .unwrap();

        assert_ne!(a.id, b.id);
        assert_ne!(b.id, c.id);
        assert!(a.timestamp <= b.timestamp && b.timestamp <= c.timestamp);

        let all = db.list_messages().unwrap();
        let ids: Vec<Uuid> = all.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        assert_eq!(all[2].file_name.as_deref(), Some("x.png"));
        assert!(all[2].text.is_none());
    }

    #[test]
    fn equal_timestamps_keep_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        // Pin every row to the same far-future instant; inserts clamp up to it.
        let future = Utc::now().timestamp_millis() + 60_000;
        let first = db.insert_message(&NewMessage::text("A", "1")).unwrap();
        db.with_conn(|conn| {
            conn.execute("UPDATE messages SET created_at = ?1", [future])?;
            Ok(())
        })
        .unwrap();
        let second = db.insert_message(&NewMessage::text("A", "2")).unwrap();
        let third = db.insert_message(&NewMessage::text("A", "3")).unwrap();

        assert_eq!(second.timestamp.timestamp_millis(), future);
        assert_eq!(third.timestamp.timestamp_millis(), future);

        let texts: Vec<String> = db
            .list_messages()
            .unwrap()
            .into_iter()
            .filter_map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["1", "2", "3"]);
        assert_eq!(db.list_messages().unwrap()[0].id, first.id);
    }

    #[test]
    fn set_reaction_touches_only_reaction() {
        let db = Database::open_in_memory().unwrap();
        let original = db.insert_message(&NewMessage::text("A", "hi")).unwrap();

        let updated = db
            .set_reaction(&original.id.to_string(), "👍")
            .unwrap()
            .expect("message exists");

        assert_eq!(updated.reaction.as_deref(), Some("👍"));
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.text, original.text);
        assert_eq!(updated.user, original.user);
        assert_eq!(updated.timestamp, original.timestamp);
    }

    #[test]
    fn set_reaction_on_unknown_id_changes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let msg = db.insert_message(&NewMessage::text("A", "hi")).unwrap();

        let missing = db.set_reaction(&Uuid::new_v4().to_string(), "👍").unwrap();
        assert!(missing.is_none());
        assert_eq!(db.list_messages().unwrap(), vec![msg]);
    }

    #[test]
    fn reopening_file_database_keeps_history() {
        let dir = std::env::temp_dir().join(format!("parley_db_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("parley.db");

        let id = {
            let db = Database::open(&path).unwrap();
            db.insert_message(&NewMessage::text("A", "persisted")).unwrap().id
        };

        let db = Database::open(&path).unwrap();
        let msg = db.get_message(&id.to_string()).unwrap().expect("still there");
        assert_eq!(msg.text.as_deref(), Some("persisted"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
