use parley_types::models::{NewMessage, StoredMessage};
use tracing::error;
use uuid::Uuid;

use crate::Database;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not complete the operation. Backend details
    /// are logged where the failure happens and never carried here, since
    /// this text is shown to clients.
    #[error("message store unavailable")]
    Unavailable,

    #[error("message {0} not found")]
    NotFound(Uuid),
}

/// Read/write contract the relay persists through.
///
/// Calls are blocking; async callers run them on the blocking pool.
pub trait MessageStore: Send + Sync + 'static {
    /// Persist a new message, assigning its id and timestamp.
    fn append(&self, msg: NewMessage) -> Result<StoredMessage, StoreError>;

    /// Overwrite the reaction of message `id`.
    fn update_reaction(&self, id: Uuid, reaction: &str) -> Result<StoredMessage, StoreError>;

    /// All messages ordered by timestamp, ties in insertion order.
    fn list_ordered(&self) -> Result<Vec<StoredMessage>, StoreError>;
}

fn unavailable(op: &str, e: anyhow::Error) -> StoreError {
    error!("Store {} failed: {:#}", op, e);
    StoreError::Unavailable
}

impl MessageStore for Database {
    fn append(&self, msg: NewMessage) -> Result<StoredMessage, StoreError> {
        self.insert_message(&msg).map_err(|e| unavailable("append", e))
    }

    fn update_reaction(&self, id: Uuid, reaction: &str) -> Result<StoredMessage, StoreError> {
        self.set_reaction(&id.to_string(), reaction)
            .map_err(|e| unavailable("update_reaction", e))?
            .ok_or(StoreError::NotFound(id))
    }

    fn list_ordered(&self) -> Result<Vec<StoredMessage>, StoreError> {
        self.list_messages().map_err(|e| unavailable("list_ordered", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_list_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let stored = db.append(NewMessage::text("Nafij", "hi")).unwrap();

        let all = db.list_ordered().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].text.as_deref(), Some("hi"));
        assert!(all[0].reaction.is_none());
        assert_eq!(all[0].id, stored.id);
    }

    #[test]
    fn unknown_reaction_target_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        assert_eq!(db.update_reaction(id, "🔥"), Err(StoreError::NotFound(id)));
    }

    #[test]
    fn unavailable_hides_backend_details() {
        let err = unavailable("append", anyhow::anyhow!("disk I/O error at /var/lib/parley.db"));
        assert_eq!(err, StoreError::Unavailable);
        assert_eq!(err.to_string(), "message store unavailable");
    }

    #[test]
    fn concurrent_reactions_all_land() {
        use std::sync::Arc;

        let db = Arc::new(Database::open_in_memory().unwrap());
        let msg = db.append(NewMessage::text("A", "react to me")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                std::thread::spawn(move || db.update_reaction(msg.id, &format!("r{}", i)).unwrap())
            })
            .collect();
        let results: Vec<StoredMessage> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Every update succeeded and the final value is one of them.
        assert_eq!(results.len(), 8);
        let last = db.list_ordered().unwrap().remove(0);
        assert!(results.iter().any(|r| r.reaction == last.reaction));
        assert_eq!(last.text.as_deref(), Some("react to me"));
    }
}
