//! Connection registry: logical players to live connection handles
//!
//! A username may have several concurrent connections (multiple tabs); the
//! most recently registered one is the active connection used for gameplay
//! addressing.

use std::collections::HashMap;
use uuid::Uuid;

use crate::ws::ConnectionHandle;

struct Connection {
    username: Option<String>,
    handle: ConnectionHandle,
}

/// Registry of live connections and the active connection per username
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<Uuid, Connection>,
    active: HashMap<String, Uuid>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly opened connection before it registers a username
    pub fn attach(&mut self, handle: ConnectionHandle) {
        self.connections.insert(
            handle.id,
            Connection {
                username: None,
                handle,
            },
        );
    }

    /// Bind a username to a connection. The newest registration becomes the
    /// active connection for that username; repeats are idempotent.
    pub fn register(&mut self, username: &str, connection_id: Uuid) {
        if let Some(conn) = self.connections.get_mut(&connection_id) {
            conn.username = Some(username.to_string());
            self.active.insert(username.to_string(), connection_id);
        }
    }

    /// Active connection for a username
    pub fn resolve(&self, username: &str) -> Option<ConnectionHandle> {
        self.active
            .get(username)
            .and_then(|id| self.connections.get(id))
            .map(|conn| conn.handle.clone())
    }

    /// Username bound to a connection, if it registered one
    pub fn username_of(&self, connection_id: Uuid) -> Option<String> {
        self.connections
            .get(&connection_id)?
            .username
            .clone()
    }

    /// Drop a closed connection. Clears the active mapping only when it
    /// pointed at this connection. Returns the username it was bound to.
    pub fn unregister(&mut self, connection_id: Uuid) -> Option<String> {
        let conn = self.connections.remove(&connection_id)?;
        let username = conn.username?;
        if self.active.get(&username) == Some(&connection_id) {
            self.active.remove(&username);
        }
        Some(username)
    }

    /// Whether any connection remains bound to this username
    pub fn has_connection(&self, username: &str) -> bool {
        self.connections
            .values()
            .any(|conn| conn.username.as_deref() == Some(username))
    }

    /// Number of connections with a registered username
    pub fn registered_count(&self) -> usize {
        self.connections
            .values()
            .filter(|conn| conn.username.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attach_one(registry: &mut ConnectionRegistry) -> Uuid {
        let id = Uuid::new_v4();
        let (handle, _rx) = ConnectionHandle::new(id);
        registry.attach(handle);
        id
    }

    #[test]
    fn register_then_resolve() {
        let mut registry = ConnectionRegistry::new();
        let id = attach_one(&mut registry);
        registry.register("alice", id);

        assert_eq!(registry.resolve("alice").map(|h| h.id), Some(id));
        assert_eq!(registry.username_of(id), Some("alice".to_string()));
        assert!(registry.resolve("bob").is_none());
    }

    #[test]
    fn newest_registration_wins() {
        let mut registry = ConnectionRegistry::new();
        let first = attach_one(&mut registry);
        let second = attach_one(&mut registry);
        registry.register("alice", first);
        registry.register("alice", second);

        assert_eq!(registry.resolve("alice").map(|h| h.id), Some(second));
        assert!(registry.has_connection("alice"));
    }

    #[test]
    fn unregister_stale_tab_keeps_active_mapping() {
        let mut registry = ConnectionRegistry::new();
        let first = attach_one(&mut registry);
        let second = attach_one(&mut registry);
        registry.register("alice", first);
        registry.register("alice", second);

        assert_eq!(registry.unregister(first), Some("alice".to_string()));
        assert_eq!(registry.resolve("alice").map(|h| h.id), Some(second));
        assert!(registry.has_connection("alice"));
    }

    #[test]
    fn unregister_active_clears_mapping() {
        let mut registry = ConnectionRegistry::new();
        let id = attach_one(&mut registry);
        registry.register("alice", id);

        assert_eq!(registry.unregister(id), Some("alice".to_string()));
        assert!(registry.resolve("alice").is_none());
        assert!(!registry.has_connection("alice"));
    }

    #[test]
    fn unregister_unbound_connection_returns_none() {
        let mut registry = ConnectionRegistry::new();
        let id = attach_one(&mut registry);
        assert_eq!(registry.unregister(id), None);
    }
}
