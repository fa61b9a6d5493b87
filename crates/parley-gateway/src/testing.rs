use std::sync::Arc;

use chrono::FixedOffset;
use parley_db::{Database, MessageStore, StoreError};
use parley_types::models::{NewMessage, StoredMessage};
use uuid::Uuid;

use crate::dispatcher::Dispatcher;
use crate::rooms::RoomTable;
use crate::sessions::SessionRegistry;

/// A store whose backend is always down.
pub struct DownStore;

impl MessageStore for DownStore {
    fn append(&self, _: NewMessage) -> Result<StoredMessage, StoreError> {
        Err(StoreError::Unavailable)
    }
    fn update_reaction(&self, _: Uuid, _: &str) -> Result<StoredMessage, StoreError> {
        Err(StoreError::Unavailable)
    }
    fn list_ordered(&self) -> Result<Vec<StoredMessage>, StoreError> {
        Err(StoreError::Unavailable)
    }
}

pub fn dispatcher_with(store: Arc<dyn MessageStore>) -> Dispatcher {
    Dispatcher::new(
        store,
        SessionRegistry::new(),
        RoomTable::new(),
        FixedOffset::east_opt(0).unwrap(),
    )
}

pub fn dispatcher() -> (Dispatcher, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    (dispatcher_with(db.clone()), db)
}
