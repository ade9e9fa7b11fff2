//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object tagged by `type`.

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};

use crate::game::card::HAND_SIZE;
use crate::game::duel::DuelRecord;
use crate::game::state::{HouseRulesPatch, PlayerId, ValidationError, MAX_NAME_LEN};
use crate::game::view::{PrivateView, PublicView};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Take a seat, or bind this connection to a known player.
    JoinLobby {
        /// Persistent id chosen by the client.
        player_id: PlayerId,
        /// Name to show.
        display_name: String,
    },

    /// Change house rules (lobby only).
    UpdateHouseRules(HouseRulesPatch),

    /// Deal and start playing.
    StartGame,

    /// Open a duel on your turn.
    Challenge {
        /// Card to commit from your hand.
        card_index: usize,
        /// Player to challenge.
        defender_id: PlayerId,
    },

    /// Commit a card to the duel waiting on you.
    RespondToChallenge {
        /// Card to commit from your hand.
        card_index: usize,
    },

    /// Take back a challenge nobody has answered yet.
    WithdrawChallenge,

    /// Name the team leaders and end the game.
    CallLeaders {
        /// Guessed leaders, any order.
        guessed_leader_ids: Vec<PlayerId>,
    },

    /// Return the table to the lobby.
    EndGame,

    /// Remove a player (lobby only).
    KickPlayer {
        /// Player to remove.
        player_id: PlayerId,
    },

    /// Re-send current state to this connection.
    SyncRequest,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

impl ClientMessage {
    /// Check field-level constraints before the message reaches the table.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ClientMessage::JoinLobby { player_id, display_name } => {
                PlayerId::parse(player_id.as_str())?;
                let len = display_name.trim().chars().count();
                if len == 0 || len > MAX_NAME_LEN {
                    return Err(ValidationError::InvalidDisplayName);
                }
            }
            ClientMessage::Challenge { card_index, defender_id } => {
                check_card_index(*card_index)?;
                PlayerId::parse(defender_id.as_str())?;
            }
            ClientMessage::RespondToChallenge { card_index } => {
                check_card_index(*card_index)?;
            }
            ClientMessage::CallLeaders { guessed_leader_ids } => {
                for id in guessed_leader_ids {
                    PlayerId::parse(id.as_str())?;
                }
            }
            ClientMessage::KickPlayer { player_id } => {
                PlayerId::parse(player_id.as_str())?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Guessed leaders as a set; duplicates collapse.
    pub fn guessed_set(ids: &[PlayerId]) -> BTreeSet<PlayerId> {
        ids.iter().cloned().collect()
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::JoinLobby { .. } => "join_lobby",
            ClientMessage::UpdateHouseRules(_) => "update_house_rules",
            ClientMessage::StartGame => "start_game",
            ClientMessage::Challenge { .. } => "challenge",
            ClientMessage::RespondToChallenge { .. } => "respond_to_challenge",
            ClientMessage::WithdrawChallenge => "withdraw_challenge",
            ClientMessage::CallLeaders { .. } => "call_leaders",
            ClientMessage::EndGame => "end_game",
            ClientMessage::KickPlayer { .. } => "kick_player",
            ClientMessage::SyncRequest => "sync_request",
            ClientMessage::Ping { .. } => "ping",
        }
    }
}

fn check_card_index(index: usize) -> Result<(), ValidationError> {
    if index < HAND_SIZE {
        Ok(())
    } else {
        Err(ValidationError::CardIndexOutOfRange(index))
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// This connection is now bound to a player.
    Joined {
        /// Bound player.
        player_id: PlayerId,
        /// The player was already seated.
        rejoined: bool,
        /// Server version.
        server_version: String,
    },

    /// Table state everyone may see.
    PublicState(PublicView),

    /// The recipient's own hand and team.
    PrivateState(PrivateView),

    /// A duel was settled.
    DuelResult(DuelRecord),

    /// This connection's player was removed from the table.
    Kicked {
        /// Why.
        reason: String,
    },

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server wall clock in milliseconds.
        server_time: u64,
    },

    /// Request rejected.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be parsed.
    InvalidMessage,
    /// Connection has not joined the lobby.
    NotJoined,
    /// Not allowed in the current phase.
    WrongPhase,
    /// Fewer players than needed to start.
    NotEnoughPlayers,
    /// No free seat.
    TableFull,
    /// Player id not seated.
    UnknownPlayer,
    /// Not the current player.
    NotYourTurn,
    /// A duel is already live.
    DuelInProgress,
    /// No duel awaits a response.
    NoPendingDuel,
    /// The pending duel waits on someone else.
    NotAwaitingYou,
    /// Only the challenger may withdraw.
    NotChallenger,
    /// Card index out of range or already revealed.
    InvalidCard,
    /// Challenged yourself.
    SelfChallenge,
    /// Defender has no hidden cards.
    DefenderExhausted,
    /// House rules forbid naming yourself.
    SelfCallDisallowed,
    /// Display name rejected.
    InvalidDisplayName,
    /// Player id rejected.
    InvalidPlayerId,
    /// Server at connection capacity.
    ServerOverloaded,
}

impl From<&ValidationError> for ErrorCode {
    fn from(err: &ValidationError) -> Self {
        match err {
            ValidationError::WrongPhase { .. } => ErrorCode::WrongPhase,
            ValidationError::NotEnoughPlayers { .. } => ErrorCode::NotEnoughPlayers,
            ValidationError::TableFull { .. } => ErrorCode::TableFull,
            ValidationError::UnknownPlayer(_) => ErrorCode::UnknownPlayer,
            ValidationError::NotYourTurn => ErrorCode::NotYourTurn,
            ValidationError::DuelInProgress => ErrorCode::DuelInProgress,
            ValidationError::NoPendingDuel => ErrorCode::NoPendingDuel,
            ValidationError::NotAwaitingYou => ErrorCode::NotAwaitingYou,
            ValidationError::NotChallenger => ErrorCode::NotChallenger,
            ValidationError::CardIndexOutOfRange(_) | ValidationError::CardAlreadyRevealed(_) => {
                ErrorCode::InvalidCard
            }
            ValidationError::SelfChallenge => ErrorCode::SelfChallenge,
            ValidationError::DefenderExhausted => ErrorCode::DefenderExhausted,
            ValidationError::SelfCallDisallowed => ErrorCode::SelfCallDisallowed,
            ValidationError::InvalidDisplayName => ErrorCode::InvalidDisplayName,
            ValidationError::InvalidPlayerId => ErrorCode::InvalidPlayerId,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Error reply with an explicit code.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError { code, message: message.into() })
    }

    /// Error reply for a rejected request.
    pub fn rejection(err: &ValidationError) -> Self {
        Self::error(ErrorCode::from(err), err.to_string())
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
