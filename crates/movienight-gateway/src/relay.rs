use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use movienight_types::events::ServerEvent;

/// Identifies one live socket. A user may hold several.
pub type ConnId = Uuid;

/// In-memory room registry and fan-out for realtime events.
///
/// Rooms are keyed by watchlist id and exist only while at least one
/// connection is in them. Nothing here is persisted: a restart drops all
/// membership and clients must rejoin.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    /// Outbound queue per live connection
    connections: RwLock<HashMap<ConnId, mpsc::UnboundedSender<ServerEvent>>>,

    /// room -> (conn_id -> user id it joined with)
    rooms: RwLock<HashMap<String, HashMap<ConnId, Option<String>>>>,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RelayInner {
                connections: RwLock::new(HashMap::new()),
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a new connection. Returns its id and the queue of events addressed to it.
    pub async fn connect(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop a connection and leave every room it was in, telling the
    /// remaining members. Returns the rooms that were left.
    pub async fn disconnect(&self, conn_id: ConnId) -> Vec<String> {
        let left: Vec<(String, Option<String>)> = {
            let mut rooms = self.inner.rooms.write().await;
            let mut left = Vec::new();
            rooms.retain(|room_id, members| {
                if let Some(user_id) = members.remove(&conn_id) {
                    left.push((room_id.clone(), user_id));
                }
                !members.is_empty()
            });
            left
        };

        self.inner.connections.write().await.remove(&conn_id);

        for (room_id, user_id) in &left {
            self.emit(room_id, ServerEvent::UserLeft { user_id: user_id.clone() }).await;
        }

        left.into_iter().map(|(room_id, _)| room_id).collect()
    }

    /// Add a connection to a room and announce it to everyone already there.
    pub async fn join(&self, room_id: &str, conn_id: ConnId, user_id: Option<String>) {
        self.inner
            .rooms
            .write()
            .await
            .entry(room_id.to_string())
            .or_default()
            .insert(conn_id, user_id.clone());

        info!("Connection {} joined room {}", conn_id, room_id);
        self.emit_except(room_id, conn_id, ServerEvent::UserJoined { user_id }).await;
    }

    /// Remove a connection from a room. Remaining members are told only if it was actually in it.
    /// `user_id` overrides the id it joined with in the announcement.
    pub async fn leave(&self, room_id: &str, conn_id: ConnId, user_id: Option<String>) -> bool {
        let joined_as = {
            let mut rooms = self.inner.rooms.write().await;
            let Some(members) = rooms.get_mut(room_id) else {
                return false;
            };
            let joined_as = members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(room_id);
            }
            joined_as
        };

        let Some(joined_as) = joined_as else {
            return false;
        };

        info!("Connection {} left room {}", conn_id, room_id);
        self.emit(room_id, ServerEvent::UserLeft { user_id: user_id.or(joined_as) }).await;
        true
    }

    /// Deliver an event to a single connection.
    pub async fn send_to(&self, conn_id: ConnId, event: ServerEvent) {
        let connections = self.inner.connections.read().await;
        if let Some(tx) = connections.get(&conn_id) {
            let _ = tx.send(event);
        }
    }

    /// Deliver an event to every connection in a room.
    pub async fn emit(&self, room_id: &str, event: ServerEvent) {
        self.fan_out(room_id, None, event).await;
    }

    /// Deliver an event to every connection in a room except `except`.
    pub async fn emit_except(&self, room_id: &str, except: ConnId, event: ServerEvent) {
        self.fan_out(room_id, Some(except), event).await;
    }

    /// Number of connections currently in a room.
    #[cfg(test)]
    async fn room_size(&self, room_id: &str) -> usize {
        self.inner
            .rooms
            .read()
            .await
            .get(room_id)
            .map_or(0, |members| members.len())
    }

    #[cfg(test)]
    async fn is_in_room(&self, room_id: &str, conn_id: ConnId) -> bool {
        self.inner
            .rooms
            .read()
            .await
            .get(room_id)
            .is_some_and(|members| members.contains_key(&conn_id))
    }

    // Single loop per event under the read locks, so every member sees
    // events in the order the relay received them.
    async fn fan_out(&self, room_id: &str, except: Option<ConnId>, event: ServerEvent) {
        let rooms = self.inner.rooms.read().await;
        let Some(members) = rooms.get(room_id) else {
            return;
        };
        let connections = self.inner.connections.read().await;

        let mut delivered = 0;
        for conn_id in members.keys() {
            if Some(*conn_id) == except {
                continue;
            }
            if let Some(tx) = connections.get(conn_id) {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        debug!("Relayed event to {} connection(s) in room {}", delivered, room_id);
    }
}
