//! Table Session
//!
//! Couples the one table with the identity registry. Each inbound request
//! is resolved to a player, applied to the table, and turned into a list
//! of outbound deliveries. All of that is synchronous and runs under the
//! server's write lock, and the deliveries are queued before the lock is
//! released, so every connection sees views in mutation order.
//!
//! Fan-out after an accepted mutation: one `duel_result` per settled duel
//! to every connection, then the public view to every connection and each
//! bound connection's private view. Rejections go to the sender only.

use std::time::{SystemTime, UNIX_EPOCH};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, warn, debug};

use crate::core::rng::derive_table_seed;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::state::{JoinKind, PlayerId, TableConfig, TableState, ValidationError};
use crate::game::view::{PrivateView, PublicView};
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage};
use crate::network::registry::{short_id, ConnectionId, IdentityRegistry};

/// Unique table identifier.
pub type TableId = [u8; 16];

/// One outbound message bound for one connection.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Recipient.
    pub connection: ConnectionId,
    /// Recipient's outbound channel.
    pub sender: mpsc::UnboundedSender<ServerMessage>,
    /// Message.
    pub message: ServerMessage,
}

/// Queue deliveries in order. Closed channels are skipped.
///
/// Never blocks; call it while still holding the session lock.
pub fn dispatch(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        if delivery.sender.send(delivery.message).is_err() {
            debug!("Dropped message for closed connection {}", short_id(&delivery.connection));
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The single table and its connections.
pub struct TableSession {
    /// Table identifier, used for seed derivation and logs.
    id: TableId,
    /// Canonical game state.
    table: TableState,
    /// Connection bindings.
    registry: IdentityRegistry,
    /// Reported in `joined`.
    server_version: String,
}

impl TableSession {
    /// Create the table. Without a configured seed one is derived from a
    /// fresh table id and the wall clock.
    pub fn new(config: TableConfig) -> Self {
        let id = uuid::Uuid::new_v4().into_bytes();
        let seed = config.rng_seed.unwrap_or_else(|| {
            let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
            derive_table_seed(&id, u128::from(nanos.unsigned_abs()))
        });

        info!(
            table = %hex::encode(&id[..4]),
            seed,
            fixed_seed = config.rng_seed.is_some(),
            max_players = config.max_players,
            "Table created"
        );

        Self {
            id,
            table: TableState::new(config, seed),
            registry: IdentityRegistry::new(),
            server_version: crate::VERSION.to_string(),
        }
    }

    /// Override the version string sent in `joined`.
    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = version.into();
        self
    }

    /// Table identifier.
    pub fn id(&self) -> &TableId {
        &self.id
    }

    /// Canonical state, read-only.
    pub fn table(&self) -> &TableState {
        &self.table
    }

    /// Connection bindings, read-only.
    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Live connection count.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    // =========================================================================
    // CONNECTION LIFECYCLE
    // =========================================================================

    /// Register a new connection and greet it with the public view.
    pub fn connect(&mut self, conn: ConnectionId, sender: mpsc::UnboundedSender<ServerMessage>) -> Vec<Delivery> {
        self.registry.register(conn, sender);
        debug!("Connection {} registered", short_id(&conn));
        self.reply(conn, ServerMessage::PublicState(PublicView::project(&self.table)))
    }

    /// Disconnect notice: forget the connection, keep the player seated.
    pub fn disconnect(&mut self, conn: &ConnectionId) -> Vec<Delivery> {
        match self.registry.remove(conn) {
            Some(player_id) => {
                self.table.set_connected(&player_id, false);
                info!("Player {} disconnected ({})", player_id, short_id(conn));
                self.broadcast_state()
            }
            None => Vec::new(),
        }
    }

    /// Transport-level keepalive. Returns false for unknown connections.
    pub fn touch(&mut self, conn: &ConnectionId) -> bool {
        self.registry.touch(conn)
    }

    /// Connections idle past `timeout`.
    pub fn idle_connections(&self, timeout: std::time::Duration) -> Vec<ConnectionId> {
        self.registry.idle(timeout)
    }

    /// Queue one message for one connection.
    pub fn notice(&self, conn: ConnectionId, message: ServerMessage) -> Vec<Delivery> {
        self.reply(conn, message)
    }

    /// Queue one message for every connection.
    pub fn notice_all(&self, message: ServerMessage) -> Vec<Delivery> {
        self.registry
            .connections()
            .map(|(id, entry)| Delivery {
                connection: *id,
                sender: entry.sender.clone(),
                message: message.clone(),
            })
            .collect()
    }

    /// Reply to a frame that did not parse.
    pub fn malformed(&mut self, conn: ConnectionId, reason: &str) -> Vec<Delivery> {
        self.registry.touch(&conn);
        self.reply(conn, ServerMessage::error(ErrorCode::InvalidMessage, reason))
    }

    // =========================================================================
    // REQUEST DISPATCH
    // =========================================================================

    /// Handle one parsed request from `conn`.
    pub fn handle(&mut self, conn: ConnectionId, msg: ClientMessage) -> Vec<Delivery> {
        if !self.registry.touch(&conn) {
            warn!("Message from unregistered connection {}", short_id(&conn));
            return Vec::new();
        }

        if let Err(err) = msg.validate() {
            debug!("Rejected {} from {}: {}", msg.kind(), short_id(&conn), err);
            return self.reply(conn, ServerMessage::rejection(&err));
        }

        match msg {
            ClientMessage::Ping { timestamp } => self.reply(conn, ServerMessage::Pong {
                timestamp,
                server_time: now_millis(),
            }),
            ClientMessage::SyncRequest => self.sync(conn),
            ClientMessage::JoinLobby { player_id, display_name } => {
                self.join(conn, player_id, &display_name)
            }
            request => {
                let Some(player_id) = self.registry.player_of(&conn).cloned() else {
                    return self.reply(
                        conn,
                        ServerMessage::error(ErrorCode::NotJoined, "join the lobby first"),
                    );
                };

                let kind = request.kind();
                match self.apply(&player_id, request) {
                    Ok(mut out) => {
                        debug!("Player {} {}", player_id, kind);
                        out.extend(self.after_mutation());
                        out
                    }
                    Err(err) => {
                        debug!("Rejected {} from {}: {}", kind, player_id, err);
                        self.reply(conn, ServerMessage::rejection(&err))
                    }
                }
            }
        }
    }

    /// Seat or rebind a player on this connection.
    fn join(&mut self, conn: ConnectionId, player_id: PlayerId, display_name: &str) -> Vec<Delivery> {
        let kind = match self.table.join(player_id.clone(), display_name) {
            Ok(kind) => kind,
            Err(err) => {
                debug!("Join rejected for {}: {}", player_id, err);
                return self.reply(conn, ServerMessage::rejection(&err));
            }
        };

        let Some(rebind) = self.registry.bind(conn, player_id.clone()) else {
            return Vec::new();
        };
        if let Some(released) = &rebind.released {
            self.table.set_connected(released, false);
        }
        if let Some(old) = &rebind.superseded {
            debug!("Connection {} superseded for {}", short_id(old), player_id);
        }
        self.table.set_connected(&player_id, true);

        info!(
            "Player {} {} on {}",
            player_id,
            if kind == JoinKind::Rejoined { "rejoined" } else { "joined" },
            short_id(&conn)
        );

        let mut out = self.reply(conn, ServerMessage::Joined {
            player_id,
            rejoined: kind == JoinKind::Rejoined,
            server_version: self.server_version.clone(),
        });
        out.extend(self.after_mutation());
        out
    }

    /// Apply a table operation for a bound player.
    fn apply(&mut self, player_id: &PlayerId, request: ClientMessage) -> Result<Vec<Delivery>, ValidationError> {
        let mut out = Vec::new();

        match request {
            ClientMessage::UpdateHouseRules(patch) => {
                self.table.update_house_rules(patch)?;
            }
            ClientMessage::StartGame => {
                self.table.start_game()?;
            }
            ClientMessage::Challenge { card_index, defender_id } => {
                self.table.challenge(player_id, card_index, &defender_id)?;
            }
            ClientMessage::RespondToChallenge { card_index } => {
                self.table.respond(player_id, card_index)?;
            }
            ClientMessage::WithdrawChallenge => {
                self.table.withdraw_challenge(player_id)?;
            }
            ClientMessage::CallLeaders { guessed_leader_ids } => {
                let guessed = ClientMessage::guessed_set(&guessed_leader_ids);
                self.table.call_leaders(player_id, &guessed)?;
            }
            ClientMessage::EndGame => {
                self.table.end_game();
            }
            ClientMessage::KickPlayer { player_id: target } => {
                self.table.kick(&target)?;
                if let Some(conn) = self.registry.unbind_player(&target) {
                    out.extend(self.reply(conn, ServerMessage::Kicked {
                        reason: format!("removed from the table by {}", player_id),
                    }));
                }
            }
            ClientMessage::JoinLobby { .. } | ClientMessage::SyncRequest | ClientMessage::Ping { .. } => {}
        }

        Ok(out)
    }

    /// Drain events, then fan out duel results and fresh views.
    fn after_mutation(&mut self) -> Vec<Delivery> {
        let mut out = Vec::new();

        for event in self.table.take_events() {
            self.log_event(&event);
            if let GameEventData::DuelResolved(record) = event.data {
                out.extend(self.notice_all(ServerMessage::DuelResult(record)));
            }
        }

        out.extend(self.broadcast_state());
        out
    }

    fn log_event(&self, event: &GameEvent) {
        match &event.data {
            GameEventData::GameStarted { game_number, deal, .. } if deal.exhausted => {
                warn!(
                    game = game_number,
                    attempts = deal.attempts,
                    "Deal constraints unsatisfied within budget; accepted fallback deal"
                );
            }
            GameEventData::GameStarted { game_number, deal, .. } => {
                info!(game = game_number, attempts = deal.attempts, "Game started");
            }
            GameEventData::LeadersCalled { caller_id, correct, winning_team } => {
                info!(caller = %caller_id, correct, winning_team = ?winning_team, "Leaders called");
            }
            _ => {
                debug!(sequence = event.sequence, kind = event.kind(), "Game event");
            }
        }
    }

    // =========================================================================
    // PROJECTION FAN-OUT
    // =========================================================================

    /// Public view to everyone, private view to each bound connection.
    fn broadcast_state(&self) -> Vec<Delivery> {
        let public = ServerMessage::PublicState(PublicView::project(&self.table));
        let mut out = Vec::new();

        for (id, entry) in self.registry.connections() {
            out.push(Delivery {
                connection: *id,
                sender: entry.sender.clone(),
                message: public.clone(),
            });
            if let Some(view) = entry
                .player_id
                .as_ref()
                .and_then(|p| PrivateView::project(&self.table, p))
            {
                out.push(Delivery {
                    connection: *id,
                    sender: entry.sender.clone(),
                    message: ServerMessage::PrivateState(view),
                });
            }
        }

        out
    }

    /// Current views for one connection only.
    fn sync(&self, conn: ConnectionId) -> Vec<Delivery> {
        let mut out = self.reply(conn, ServerMessage::PublicState(PublicView::project(&self.table)));
        if let Some(view) = self
            .registry
            .player_of(&conn)
            .and_then(|p| PrivateView::project(&self.table, p))
        {
            out.extend(self.reply(conn, ServerMessage::PrivateState(view)));
        }
        out
    }

    fn reply(&self, conn: ConnectionId, message: ServerMessage) -> Vec<Delivery> {
        match self.registry.sender(&conn) {
            Some(sender) => vec![Delivery { connection: conn, sender: sender.clone(), message }],
            None => Vec::new(),
        }
    }
}
