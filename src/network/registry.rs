//! Identity Registry
//!
//! Two layers of identity: transport connections come and go, persistent
//! players stay seated. The registry maps one to the other and owns each
//! connection's outbound channel. It never owns game data; the table keeps
//! every player record.
//!
//! A player is bound to at most one connection. Binding a player that is
//! already bound elsewhere moves the binding; the old connection stays
//! open but unbound.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::game::state::PlayerId;
use crate::network::protocol::ServerMessage;

/// Unique connection identifier.
pub type ConnectionId = [u8; 16];

/// Short hex form of a connection id for logs.
pub fn short_id(id: &ConnectionId) -> String {
    hex::encode(&id[..4])
}

/// A live transport connection.
#[derive(Debug)]
pub struct ConnectionEntry {
    /// Bound player, once joined.
    pub player_id: Option<PlayerId>,
    /// Outbound channel to this connection's writer.
    pub sender: mpsc::UnboundedSender<ServerMessage>,
    /// Last inbound message.
    pub last_activity: Instant,
}

/// What a bind changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rebind {
    /// Connection that previously held this player and lost it.
    pub superseded: Option<ConnectionId>,
    /// Player this connection was bound to before, now left unbound.
    pub released: Option<PlayerId>,
}

/// Connection ↔ player bindings.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    /// Live connections.
    connections: BTreeMap<ConnectionId, ConnectionEntry>,
    /// Player to connection mapping.
    players: BTreeMap<PlayerId, ConnectionId>,
}

impl IdentityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new, unbound connection.
    pub fn register(&mut self, id: ConnectionId, sender: mpsc::UnboundedSender<ServerMessage>) {
        self.connections.insert(id, ConnectionEntry {
            player_id: None,
            sender,
            last_activity: Instant::now(),
        });
    }

    /// Bind `player_id` to connection `id`.
    ///
    /// Returns `None` if the connection is unknown.
    pub fn bind(&mut self, id: ConnectionId, player_id: PlayerId) -> Option<Rebind> {
        let entry = self.connections.get_mut(&id)?;
        let mut rebind = Rebind::default();

        if let Some(previous) = entry.player_id.replace(player_id.clone()) {
            if previous != player_id {
                self.players.remove(&previous);
                rebind.released = Some(previous);
            }
        }

        if let Some(old_conn) = self.players.insert(player_id, id) {
            if old_conn != id {
                if let Some(old) = self.connections.get_mut(&old_conn) {
                    old.player_id = None;
                }
                rebind.superseded = Some(old_conn);
            }
        }

        Some(rebind)
    }

    /// Drop the binding for `player_id`, keeping the connection open.
    pub fn unbind_player(&mut self, player_id: &PlayerId) -> Option<ConnectionId> {
        let id = self.players.remove(player_id)?;
        if let Some(entry) = self.connections.get_mut(&id) {
            entry.player_id = None;
        }
        Some(id)
    }

    /// Forget a connection. Returns the player it was bound to.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<PlayerId> {
        let entry = self.connections.remove(id)?;
        let player_id = entry.player_id?;
        if self.players.get(&player_id) == Some(id) {
            self.players.remove(&player_id);
        }
        Some(player_id)
    }

    /// Record inbound activity. Returns false for unknown connections.
    pub fn touch(&mut self, id: &ConnectionId) -> bool {
        match self.connections.get_mut(id) {
            Some(entry) => {
                entry.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Player bound to a connection.
    pub fn player_of(&self, id: &ConnectionId) -> Option<&PlayerId> {
        self.connections.get(id).and_then(|e| e.player_id.as_ref())
    }

    /// Connection bound to a player.
    pub fn connection_of(&self, player_id: &PlayerId) -> Option<&ConnectionId> {
        self.players.get(player_id)
    }

    /// Outbound channel of a connection.
    pub fn sender(&self, id: &ConnectionId) -> Option<&mpsc::UnboundedSender<ServerMessage>> {
        self.connections.get(id).map(|e| &e.sender)
    }

    /// All live connections.
    pub fn connections(&self) -> impl Iterator<Item = (&ConnectionId, &ConnectionEntry)> {
        self.connections.iter()
    }

    /// Connections silent for longer than `timeout`.
    pub fn idle(&self, timeout: Duration) -> Vec<ConnectionId> {
        let now = Instant::now();
        self.connections
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_activity) > timeout)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Live connection count.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// No live connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
