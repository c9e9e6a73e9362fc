//! Live connection registry
//!
//! Maps `ConnectionId` to the shared `Connection`. Add and remove take the
//! write lock; fan-out visits connections under the read lock, so a
//! connection whose removal has returned is never visited again.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::connection::Connection;
use crate::types::ConnectionId;

#[derive(Debug, Default)]
pub struct Registry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection around its outbound channel
    pub fn add(&self, sender: mpsc::Sender<Message>) -> Arc<Connection> {
        let connection = Arc::new(Connection::new(sender));
        let mut conns = self.connections.write();
        conns.insert(connection.id, Arc::clone(&connection));
        debug!("Registered {}, total connections: {}", connection.id, conns.len());
        connection
    }

    /// Remove a connection. Unknown ids are ignored.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let mut conns = self.connections.write();
        let removed = conns.remove(id);
        if removed.is_some() {
            debug!("Unregistered {}, total connections: {}", id, conns.len());
        }
        removed
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(id).cloned()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Snapshot of all live connections
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Visit every live connection while holding the read lock
    ///
    /// `f` must not block or touch the registry's write path.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Connection>),
    {
        let conns = self.connections.read();
        for conn in conns.values() {
            f(conn);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_connection(registry: &Registry) -> (Arc<Connection>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(8);
        (registry.add(tx), rx)
    }

    #[test]
    fn test_add_and_get() {
        let registry = Registry::new();
        let (conn, _rx) = add_connection(&registry);

        let found = registry.get(&conn.id).unwrap();
        assert!(Arc::ptr_eq(&found, &conn));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_generates_unique_ids() {
        let registry = Registry::new();
        let (a, _ra) = add_connection(&registry);
        let (b, _rb) = add_connection(&registry);

        assert_ne!(a.id, b.id);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = Registry::new();
        let (conn, _rx) = add_connection(&registry);

        assert!(registry.remove(&conn.id).is_some());
        assert!(registry.get(&conn.id).is_none());
        assert!(registry.remove(&conn.id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let registry = Registry::new();
        let (_conn, _rx) = add_connection(&registry);

        assert!(registry.remove(&ConnectionId::new()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_and_for_each() {
        let registry = Registry::new();
        let (a, _ra) = add_connection(&registry);
        let (b, _rb) = add_connection(&registry);

        let mut ids: Vec<_> = registry.snapshot().iter().map(|c| c.id).collect();
        ids.sort_by_key(|id| id.0);
        let mut expected = vec![a.id, b.id];
        expected.sort_by_key(|id| id.0);
        assert_eq!(ids, expected);

        let mut visited = 0;
        registry.for_each(|_| visited += 1);
        assert_eq!(visited, 2);
    }
}
