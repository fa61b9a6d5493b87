use std::collections::HashMap;
use std::sync::Arc;

use chrono::FixedOffset;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parley_db::{MessageStore, StoreError};
use parley_types::events::ServerEvent;
use parley_types::models::{MessageView, NewMessage, StoredMessage};

use crate::rooms::RoomTable;
use crate::sessions::SessionRegistry;

/// Capacity of the global broadcast channel. Receivers that fall this far
/// behind skip ahead instead of holding up everyone else.
const BROADCAST_CAPACITY: usize = 1024;

/// The relay: persists inbound events and fans them out to every connection
/// or to the members of a private room.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    store: Arc<dyn MessageStore>,
    sessions: SessionRegistry,
    rooms: RoomTable,

    /// Broadcast channel for global events; every connection receives these
    broadcast_tx: broadcast::Sender<ServerEvent>,

    /// Per-connection targeted send channels: conn_id -> sender
    connections: RwLock<HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>>,

    /// Held across "persist, then broadcast" and across history snapshots so
    /// broadcast order matches append order and no message slips between a
    /// replay and the live feed.
    write_gate: Mutex<()>,

    /// Timezone used for the `h:mm AM/PM` presentation.
    utc_offset: FixedOffset,
}

/// What a freshly registered connection needs to start relaying.
pub struct Attachment {
    pub conn_id: Uuid,
    /// History snapshot taken atomically with the broadcast subscription.
    pub history: Result<Vec<MessageView>, StoreError>,
    pub broadcast_rx: broadcast::Receiver<ServerEvent>,
    pub direct_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn MessageStore>,
        sessions: SessionRegistry,
        rooms: RoomTable,
        utc_offset: FixedOffset,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner {
                store,
                sessions,
                rooms,
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
                write_gate: Mutex::new(()),
                utc_offset,
            }),
        }
    }

    // -- Lifecycle --

    /// Register a new connection and snapshot history for its replay.
    pub async fn connect(&self) -> Attachment {
        let conn_id = Uuid::new_v4();
        let (tx, direct_rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);

        let (broadcast_rx, history) = self.resubscribe().await;

        debug!("Connection {} registered", conn_id);
        Attachment {
            conn_id,
            history,
            broadcast_rx,
            direct_rx,
        }
    }

    /// Fresh broadcast receiver plus the history it continues from. Taken
    /// under the write gate, so the history ends exactly where the receiver
    /// starts. Used at connect and to recover a receiver that lagged.
    pub async fn resubscribe(
        &self,
    ) -> (broadcast::Receiver<ServerEvent>, Result<Vec<MessageView>, StoreError>) {
        let _gate = self.inner.write_gate.lock().await;
        let rx = self.inner.broadcast_tx.subscribe();
        (rx, self.history().await)
    }

    /// Forget everything held for the connection. Safe to call twice.
    ///
    /// The connections write lock is held throughout, so a concurrent
    /// `set_username` or `join_private` either lands before and is cleaned up
    /// here, or sees the connection gone and does nothing.
    pub async fn disconnect(&self, conn_id: Uuid) {
        let mut connections = self.inner.connections.write().await;
        connections.remove(&conn_id);
        self.inner.sessions.remove(conn_id).await;
        let rooms = self.inner.rooms.leave_all(conn_id).await;
        if !rooms.is_empty() {
            debug!("Connection {} left {} room(s) on disconnect", conn_id, rooms.len());
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    // -- Global events --

    pub async fn set_username(&self, conn_id: Uuid, name: String) {
        let connections = self.inner.connections.read().await;
        if !connections.contains_key(&conn_id) {
            debug!("Ignoring username for departed connection {}", conn_id);
            return;
        }
        info!("Connection {} is now known as {}", conn_id, name);
        self.inner.sessions.set_name(conn_id, name).await;
    }

    /// Persist a text message from the connection and broadcast it.
    pub async fn chat_message(&self, conn_id: Uuid, text: String) -> Result<MessageView, StoreError> {
        let user = self.inner.sessions.resolve(conn_id).await;
        self.publish(NewMessage::text(user, text), ServerEvent::ChatMessage)
            .await
    }

    /// Persist a file reference from the connection and broadcast it.
    pub async fn file_message(
        &self,
        conn_id: Uuid,
        file_url: String,
        file_name: String,
    ) -> Result<MessageView, StoreError> {
        let user = self.inner.sessions.resolve(conn_id).await;
        self.publish(NewMessage::file(user, file_url, file_name), ServerEvent::FileMessage)
            .await
    }

    /// Set a message's reaction and broadcast the updated message.
    /// Returns `Ok(None)` without broadcasting when the message doesn't exist.
    pub async fn chat_reaction(
        &self,
        message_id: Uuid,
        reaction: String,
    ) -> Result<Option<MessageView>, StoreError> {
        let _gate = self.inner.write_gate.lock().await;

        let store = self.inner.store.clone();
        let result = run_blocking(move || store.update_reaction(message_id, &reaction)).await;

        match result {
            Ok(stored) => {
                let view = self.present(stored);
                self.broadcast(ServerEvent::ChatReaction(view.clone()));
                Ok(Some(view))
            }
            Err(StoreError::NotFound(id)) => {
                debug!("Reaction for unknown message {} dropped", id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Full history, oldest first, in client presentation.
    pub async fn history(&self) -> Result<Vec<MessageView>, StoreError> {
        let store = self.inner.store.clone();
        let messages = run_blocking(move || store.list_ordered()).await?;
        Ok(messages.into_iter().map(|m| self.present(m)).collect())
    }

    /// Append, then broadcast the stored record. Nothing is broadcast if the
    /// append fails.
    async fn publish(
        &self,
        msg: NewMessage,
        to_event: fn(MessageView) -> ServerEvent,
    ) -> Result<MessageView, StoreError> {
        let _gate = self.inner.write_gate.lock().await;

        let store = self.inner.store.clone();
        let stored = run_blocking(move || store.append(msg)).await?;

        let view = self.present(stored);
        self.broadcast(to_event(view.clone()));
        Ok(view)
    }

    fn broadcast(&self, event: ServerEvent) {
        debug!("Broadcasting {}", event.name());
        // Err only means nobody is connected.
        let _ = self.inner.broadcast_tx.send(event);
    }

    fn present(&self, msg: StoredMessage) -> MessageView {
        MessageView::present(msg, &self.inner.utc_offset)
    }

    // -- Private rooms --

    pub async fn join_private(&self, conn_id: Uuid, room_id: String) {
        let joined = {
            let connections = self.inner.connections.read().await;
            if !connections.contains_key(&conn_id) {
                debug!("Ignoring join of {} for departed connection {}", room_id, conn_id);
                return;
            }
            self.inner.rooms.join(&room_id, conn_id).await
        };
        if joined {
            info!("Connection {} joined private room {}", conn_id, room_id);
        }
        self.send_to(conn_id, ServerEvent::PrivateStatus(format!("Joined private room: {}", room_id)))
            .await;
    }

    pub async fn leave_private(&self, conn_id: Uuid, room_id: String) {
        if self.inner.rooms.leave(&room_id, conn_id).await {
            info!("Connection {} left private room {}", conn_id, room_id);
        }
        self.send_to(conn_id, ServerEvent::PrivateStatus(format!("Left private room: {}", room_id)))
            .await;
    }

    /// Deliver to whoever is in the room right now. Not persisted.
    /// Returns how many connections it was handed to.
    pub async fn private_message(&self, room_id: &str, sender: String, message: String) -> usize {
        let members = self.inner.rooms.members_of(room_id).await;
        if members.is_empty() {
            debug!("Private message to empty room {} dropped", room_id);
            return 0;
        }

        let event = ServerEvent::PrivateMessage { sender, message };
        let connections = self.inner.connections.read().await;
        let mut delivered = 0;
        for conn_id in &members {
            if let Some(tx) = connections.get(conn_id) {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub async fn room_members(&self, room_id: &str) -> usize {
        self.inner.rooms.members_of(room_id).await.len()
    }

    // -- Targeted --

    /// Park every persist until the guard drops.
    #[cfg(test)]
    pub(crate) async fn lock_writes(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.inner.write_gate.lock().await
    }

    /// Send an event to one connection. Dropped if it is gone.
    pub async fn send_to(&self, conn_id: Uuid, event: ServerEvent) {
        let connections = self.inner.connections.read().await;
        match connections.get(&conn_id) {
            Some(tx) => {
                let _ = tx.send(event);
            }
            None => warn!("Dropping {} for departed connection {}", event.name(), conn_id),
        }
    }
}

/// Run a blocking store call on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("Store task failed: {}", e);
            StoreError::Unavailable
        })?
}
