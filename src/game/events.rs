//! Game Events
//!
//! Every accepted mutation records one or more events. The session drains
//! them after each request to log them and to fan out the duel-result
//! notice. Events may carry secrets (full duel cards are not among them,
//! but a finished game's result is), so they are never broadcast verbatim.

use serde::{Serialize, Deserialize};

use crate::game::card::Color;
use crate::game::deal::DealReport;
use crate::game::duel::DuelRecord;
use crate::game::state::{HouseRules, PlayerId};

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEventData {
    /// New player seated in the lobby.
    PlayerJoined {
        player_id: PlayerId,
        display_name: String,
    },

    /// Known player came back (possibly on a new connection).
    PlayerRejoined {
        player_id: PlayerId,
    },

    /// Player removed from the lobby.
    PlayerKicked {
        player_id: PlayerId,
    },

    /// House rules changed in the lobby.
    HouseRulesChanged {
        rules: HouseRules,
    },

    /// Cards dealt, turn order fixed.
    GameStarted {
        game_number: u32,
        turn_order: Vec<PlayerId>,
        deal: DealReport,
    },

    /// Duel opened by the current player.
    ChallengeIssued {
        challenger_id: PlayerId,
        defender_id: PlayerId,
    },

    /// Pending duel withdrawn by its challenger.
    ChallengeWithdrawn {
        challenger_id: PlayerId,
    },

    /// Duel compared and settled.
    DuelResolved(DuelRecord),

    /// Turn moved on after a duel.
    TurnAdvanced {
        current_player_id: Option<PlayerId>,
    },

    /// Leader call made; the game is finished.
    LeadersCalled {
        caller_id: PlayerId,
        correct: bool,
        winning_team: Option<Color>,
    },

    /// Table returned to the lobby.
    GameReset,
}

/// A game event with its position in the table's event stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Monotonic sequence number per table.
    pub sequence: u64,

    /// Player the event is about, if any.
    pub player_id: Option<PlayerId>,

    /// Event data.
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(sequence: u64, data: GameEventData) -> Self {
        let player_id = match &data {
            GameEventData::PlayerJoined { player_id, .. } => Some(player_id.clone()),
            GameEventData::PlayerRejoined { player_id } => Some(player_id.clone()),
            GameEventData::PlayerKicked { player_id } => Some(player_id.clone()),
            GameEventData::ChallengeIssued { challenger_id, .. } => Some(challenger_id.clone()),
            GameEventData::ChallengeWithdrawn { challenger_id } => Some(challenger_id.clone()),
            GameEventData::DuelResolved(record) => record.loser_id.clone(),
            GameEventData::TurnAdvanced { current_player_id } => current_player_id.clone(),
            GameEventData::LeadersCalled { caller_id, .. } => Some(caller_id.clone()),
            _ => None,
        };

        Self {
            sequence,
            player_id,
            data,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match &self.data {
            GameEventData::PlayerJoined { .. } => "player_joined",
            GameEventData::PlayerRejoined { .. } => "player_rejoined",
            GameEventData::PlayerKicked { .. } => "player_kicked",
            GameEventData::HouseRulesChanged { .. } => "house_rules_changed",
            GameEventData::GameStarted { .. } => "game_started",
            GameEventData::ChallengeIssued { .. } => "challenge_issued",
            GameEventData::ChallengeWithdrawn { .. } => "challenge_withdrawn",
            GameEventData::DuelResolved(_) => "duel_resolved",
            GameEventData::TurnAdvanced { .. } => "turn_advanced",
            GameEventData::LeadersCalled { .. } => "leaders_called",
            GameEventData::GameReset => "game_reset",
        }
    }
}
