use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use parley_types::ANONYMOUS;

/// Display names of live connections: conn_id -> name.
#[derive(Default)]
pub struct SessionRegistry {
    names: RwLock<HashMap<Uuid, String>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `name` with the connection, replacing any earlier name.
    /// Names are not validated and need not be unique.
    pub async fn set_name(&self, conn_id: Uuid, name: String) {
        self.names.write().await.insert(conn_id, name);
    }

    /// The connection's name, or "Anonymous" if it never set one.
    pub async fn resolve(&self, conn_id: Uuid) -> String {
        self.names
            .read()
            .await
            .get(&conn_id)
            .cloned()
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }

    pub async fn remove(&self, conn_id: Uuid) {
        self.names.write().await.remove(&conn_id);
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.names.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unnamed_connection_resolves_to_anonymous() {
        let sessions = SessionRegistry::new();
        assert_eq!(sessions.resolve(Uuid::new_v4()).await, "Anonymous");
    }

    #[tokio::test]
    async fn set_name_overwrites() {
        let sessions = SessionRegistry::new();
        let conn = Uuid::new_v4();
        sessions.set_name(conn, "first".into()).await;
        sessions.set_name(conn, "Nafij".into()).await;
        assert_eq!(sessions.resolve(conn).await, "Nafij");
        assert_eq!(sessions.len().await, 1);
    }

    #[tokio::test]
    async fn duplicate_names_are_allowed() {
        let sessions = SessionRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        sessions.set_name(a, "same".into()).await;
        sessions.set_name(b, "same".into()).await;
        assert_eq!(sessions.resolve(a).await, sessions.resolve(b).await);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let sessions = SessionRegistry::new();
        let conn = Uuid::new_v4();
        sessions.set_name(conn, "Nafij".into()).await;
        sessions.remove(conn).await;
        sessions.remove(conn).await;
        assert_eq!(sessions.resolve(conn).await, "Anonymous");
        assert_eq!(sessions.len().await, 0);
    }
}
