//! Table State
//!
//! The single canonical game state and every operation that mutates it.
//! Operations validate completely before touching anything, so a request
//! is either applied in full or rejected with a [`ValidationError`] and no
//! effect. Uses BTreeMap for deterministic iteration order.
//!
//! Nothing here performs I/O or waits. Callers provide single-writer
//! access (the network layer holds the table behind one lock).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use chrono::Utc;
use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::card::{Hand, MAX_PLAYERS};
use crate::game::deal::{deal, DealConstraints, DealReport, DEFAULT_MAX_DEAL_ATTEMPTS};
use crate::game::duel::{settle, Duel, DuelRecord, PublicInfo};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::leaders::{judge_call, GameResult};
use crate::game::turn::TurnState;

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 24;

/// Longest accepted persistent player id, in characters.
pub const MAX_PLAYER_ID_LEN: usize = 64;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Persistent, self-asserted player identifier.
///
/// Opaque to the server; it survives reconnects while the transport
/// connection does not. Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Validate and wrap a client-supplied id.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let len = raw.chars().count();
        if len == 0 || len > MAX_PLAYER_ID_LEN || raw.chars().any(char::is_control) {
            return Err(ValidationError::InvalidPlayerId);
        }
        Ok(Self(raw.to_string()))
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// PHASE / HOUSE RULES
// =============================================================================

/// Table phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Players gather, rules are set.
    #[default]
    Lobby,
    /// Cards are dealt; duels and leader calls happen.
    Playing,
    /// A leader call decided the game; the result is on display.
    Finished,
}

/// Table-configurable variants, fixed before a deal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseRules {
    /// A caller may not name themselves as a leader.
    pub no_calling_self: bool,
    /// Every populated team has exactly one traitor.
    pub one_traitor: bool,
}

/// Partial house-rule update; absent fields keep their value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseRulesPatch {
    /// New value for `no_calling_self`.
    #[serde(default)]
    pub no_calling_self: Option<bool>,
    /// New value for `one_traitor`.
    #[serde(default)]
    pub one_traitor: Option<bool>,
}

impl HouseRules {
    /// Merge a patch into these rules.
    pub fn apply(&mut self, patch: HouseRulesPatch) {
        if let Some(v) = patch.no_calling_self {
            self.no_calling_self = v;
        }
        if let Some(v) = patch.one_traitor {
            self.one_traitor = v;
        }
    }
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// Persistent record for one seated player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Persistent id.
    pub id: PlayerId,

    /// Name shown to the table.
    pub display_name: String,

    /// Dealt hand; empty outside a game.
    pub hand: Hand,

    /// Indices of cards revealed by lost duels. Only grows within a game.
    pub revealed: BTreeSet<usize>,

    /// Public trail per card index, parallel to `hand`.
    pub public_info: Vec<PublicInfo>,

    /// Some transport connection is currently bound to this player.
    pub connected: bool,
}

impl PlayerState {
    /// Create a player with no hand.
    pub fn new(id: PlayerId, display_name: String) -> Self {
        Self {
            id,
            display_name,
            hand: Vec::new(),
            revealed: BTreeSet::new(),
            public_info: Vec::new(),
            connected: false,
        }
    }

    /// Replace the hand and reset all per-game state.
    pub fn deal(&mut self, hand: Hand) {
        self.public_info = vec![PublicInfo::default(); hand.len()];
        self.hand = hand;
        self.revealed.clear();
    }

    /// Drop the hand and all per-game state.
    pub fn clear_game(&mut self) {
        self.hand.clear();
        self.revealed.clear();
        self.public_info.clear();
    }

    /// Is card `index` revealed.
    #[inline]
    pub fn is_revealed(&self, index: usize) -> bool {
        self.revealed.contains(&index)
    }

    /// Indices of cards still hidden, ascending.
    pub fn unrevealed_indices(&self) -> Vec<usize> {
        (0..self.hand.len()).filter(|i| !self.is_revealed(*i)).collect()
    }

    /// Number of cards still hidden.
    pub fn unrevealed_count(&self) -> usize {
        self.hand.len() - self.revealed.len()
    }

    /// Check `index` names a hidden card in this hand.
    pub fn check_playable(&self, index: usize) -> Result<(), ValidationError> {
        if index >= self.hand.len() {
            return Err(ValidationError::CardIndexOutOfRange(index));
        }
        if self.is_revealed(index) {
            return Err(ValidationError::CardAlreadyRevealed(index));
        }
        Ok(())
    }
}

// =============================================================================
// CONFIG / ERRORS
// =============================================================================

/// Configuration for the table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableConfig {
    /// Players required to start.
    pub min_players: usize,
    /// Seats available; bounded by the deck.
    pub max_players: usize,
    /// Attempt budget for a constrained deal.
    pub max_deal_attempts: u32,
    /// Fixed RNG seed; derived at startup when absent.
    pub rng_seed: Option<u64>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: MAX_PLAYERS,
            max_deal_attempts: DEFAULT_MAX_DEAL_ATTEMPTS,
            rng_seed: None,
        }
    }
}

impl TableConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_deal_attempts: std::env::var("CASTLE_MAX_DEAL_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_deal_attempts),
            rng_seed: std::env::var("CASTLE_RNG_SEED")
                .ok()
                .and_then(|v| v.parse().ok()),
            ..defaults
        }
    }
}

/// A rejected request. Always recoverable; the table is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Operation not allowed in the current phase.
    #[error("not allowed while {actual:?}; requires {expected:?}")]
    WrongPhase {
        /// Phase the operation needs.
        expected: Phase,
        /// Phase the table is in.
        actual: Phase,
    },

    /// Too few players to deal.
    #[error("need at least {need} players, have {have}")]
    NotEnoughPlayers {
        /// Seated players.
        have: usize,
        /// Required players.
        need: usize,
    },

    /// No free seat.
    #[error("table is full ({max} players)")]
    TableFull {
        /// Seat count.
        max: usize,
    },

    /// Player id not seated at this table.
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    /// Only the current player may challenge.
    #[error("not your turn")]
    NotYourTurn,

    /// A duel is already live.
    #[error("a duel is already in progress")]
    DuelInProgress,

    /// No duel is waiting for a response.
    #[error("no duel is awaiting a response")]
    NoPendingDuel,

    /// The pending duel waits for someone else.
    #[error("the pending duel is not awaiting you")]
    NotAwaitingYou,

    /// Only the challenger may withdraw a duel.
    #[error("only the challenger can withdraw this duel")]
    NotChallenger,

    /// Card index past the end of the hand.
    #[error("card index {0} is out of range")]
    CardIndexOutOfRange(usize),

    /// Card already revealed.
    #[error("card {0} is already revealed")]
    CardAlreadyRevealed(usize),

    /// Challenger named themselves as defender.
    #[error("cannot challenge yourself")]
    SelfChallenge,

    /// Defender has nothing left to defend with.
    #[error("defender has no unrevealed cards")]
    DefenderExhausted,

    /// House rules forbid the caller naming themselves.
    #[error("house rules forbid naming yourself as a leader")]
    SelfCallDisallowed,

    /// Display name empty or too long.
    #[error("display name must be 1-{MAX_NAME_LEN} characters")]
    InvalidDisplayName,

    /// Player id empty, too long or containing control characters.
    #[error("player id must be 1-{MAX_PLAYER_ID_LEN} printable characters")]
    InvalidPlayerId,
}

/// Whether a join seated a new player or rebound a known one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    /// New record created.
    Joined,
    /// Existing record kept.
    Rejoined,
}

/// What a challenge did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// Waiting for the defender to pick a card.
    Pending,
    /// Defender had one card left; the duel resolved at once.
    Resolved(DuelRecord),
}

// =============================================================================
// TABLE STATE
// =============================================================================

/// Complete state of the one table.
#[derive(Clone, Debug)]
pub struct TableState {
    /// Current phase.
    phase: Phase,

    /// Seated players (BTreeMap for deterministic order).
    players: BTreeMap<PlayerId, PlayerState>,

    /// Current house rules.
    house_rules: HouseRules,

    /// Turn order; present while playing.
    turn: Option<TurnState>,

    /// The live duel, if any.
    duel: Option<Duel>,

    /// Result of the last leader call; kept until the next deal.
    result: Option<GameResult>,

    /// Report for the current deal.
    deal_report: Option<DealReport>,

    /// Games dealt so far.
    game_number: u32,

    /// Configuration.
    config: TableConfig,

    /// Shuffle and turn-order randomness.
    rng: DeterministicRng,

    /// Next event sequence number.
    next_sequence: u64,

    /// Events not yet drained.
    events: Vec<GameEvent>,
}

impl TableState {
    /// Create an empty table in the lobby.
    pub fn new(config: TableConfig, rng_seed: u64) -> Self {
        Self {
            phase: Phase::Lobby,
            players: BTreeMap::new(),
            house_rules: HouseRules::default(),
            turn: None,
            duel: None,
            result: None,
            deal_report: None,
            game_number: 0,
            config,
            rng: DeterministicRng::new(rng_seed),
            next_sequence: 0,
            events: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Seated players.
    pub fn players(&self) -> &BTreeMap<PlayerId, PlayerState> {
        &self.players
    }

    /// Look up one player.
    pub fn player(&self, id: &PlayerId) -> Option<&PlayerState> {
        self.players.get(id)
    }

    /// Current house rules.
    pub fn house_rules(&self) -> HouseRules {
        self.house_rules
    }

    /// Turn state, while playing.
    pub fn turn(&self) -> Option<&TurnState> {
        self.turn.as_ref()
    }

    /// Player to act, while playing.
    pub fn current_player(&self) -> Option<&PlayerId> {
        self.turn.as_ref().and_then(TurnState::current)
    }

    /// Live duel.
    pub fn duel(&self) -> Option<&Duel> {
        self.duel.as_ref()
    }

    /// Result of the last leader call.
    pub fn result(&self) -> Option<&GameResult> {
        self.result.as_ref()
    }

    /// Report for the current deal.
    pub fn deal_report(&self) -> Option<DealReport> {
        self.deal_report
    }

    /// Games dealt so far.
    pub fn game_number(&self) -> u32 {
        self.game_number
    }

    /// Table configuration.
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Drain recorded events.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    fn push_event(&mut self, data: GameEventData) {
        self.next_sequence += 1;
        self.events.push(GameEvent::new(self.next_sequence, data));
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), ValidationError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(ValidationError::WrongPhase { expected, actual: self.phase })
        }
    }

    fn require_player(&self, id: &PlayerId) -> Result<&PlayerState, ValidationError> {
        self.players
            .get(id)
            .ok_or_else(|| ValidationError::UnknownPlayer(id.clone()))
    }

    // -------------------------------------------------------------------------
    // Lobby
    // -------------------------------------------------------------------------

    /// Seat a new player, or refresh a known one.
    ///
    /// New players may only join in the lobby; known players may come
    /// back in any phase.
    pub fn join(&mut self, id: PlayerId, display_name: &str) -> Result<JoinKind, ValidationError> {
        let name = display_name.trim();
        let len = name.chars().count();
        if len == 0 || len > MAX_NAME_LEN {
            return Err(ValidationError::InvalidDisplayName);
        }

        if let Some(player) = self.players.get_mut(&id) {
            player.display_name = name.to_string();
            self.push_event(GameEventData::PlayerRejoined { player_id: id });
            return Ok(JoinKind::Rejoined);
        }

        self.expect_phase(Phase::Lobby)?;
        let max = self.config.max_players.min(MAX_PLAYERS);
        if self.players.len() >= max {
            return Err(ValidationError::TableFull { max });
        }

        self.players.insert(id.clone(), PlayerState::new(id.clone(), name.to_string()));
        self.push_event(GameEventData::PlayerJoined {
            player_id: id,
            display_name: name.to_string(),
        });
        Ok(JoinKind::Joined)
    }

    /// Record whether a connection is bound to `id`. Allowed in any phase.
    pub fn set_connected(&mut self, id: &PlayerId, connected: bool) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                player.connected = connected;
                true
            }
            None => false,
        }
    }

    /// Merge house-rule flags.
    pub fn update_house_rules(&mut self, patch: HouseRulesPatch) -> Result<HouseRules, ValidationError> {
        self.expect_phase(Phase::Lobby)?;
        self.house_rules.apply(patch);
        self.push_event(GameEventData::HouseRulesChanged { rules: self.house_rules });
        Ok(self.house_rules)
    }

    /// Remove a player from the lobby.
    pub fn kick(&mut self, target: &PlayerId) -> Result<PlayerState, ValidationError> {
        self.expect_phase(Phase::Lobby)?;
        let removed = self
            .players
            .remove(target)
            .ok_or_else(|| ValidationError::UnknownPlayer(target.clone()))?;
        self.push_event(GameEventData::PlayerKicked { player_id: target.clone() });
        Ok(removed)
    }

    /// Deal, fix a random turn order and start playing.
    pub fn start_game(&mut self) -> Result<DealReport, ValidationError> {
        self.expect_phase(Phase::Lobby)?;
        let have = self.players.len();
        let need = self.config.min_players.max(2);
        if have < need {
            return Err(ValidationError::NotEnoughPlayers { have, need });
        }

        let constraints = DealConstraints {
            one_traitor: self.house_rules.one_traitor,
            max_attempts: self.config.max_deal_attempts,
        };
        let outcome = deal(have, constraints, &mut self.rng);

        for (player, hand) in self.players.values_mut().zip(outcome.hands) {
            player.deal(hand);
        }

        let ids: Vec<PlayerId> = self.players.keys().cloned().collect();
        let turn = TurnState::shuffled(ids, &mut self.rng);

        self.game_number += 1;
        self.phase = Phase::Playing;
        self.duel = None;
        self.result = None;
        self.deal_report = Some(outcome.report);
        self.push_event(GameEventData::GameStarted {
            game_number: self.game_number,
            turn_order: turn.order.clone(),
            deal: outcome.report,
        });
        self.turn = Some(turn);

        Ok(outcome.report)
    }

    // -------------------------------------------------------------------------
    // Duels
    // -------------------------------------------------------------------------

    /// Open a duel as the current player.
    ///
    /// If the defender has exactly one hidden card it is committed for
    /// them and the duel resolves immediately.
    pub fn challenge(
        &mut self,
        challenger_id: &PlayerId,
        card_index: usize,
        defender_id: &PlayerId,
    ) -> Result<ChallengeOutcome, ValidationError> {
        self.expect_phase(Phase::Playing)?;
        if self.duel.is_some() {
            return Err(ValidationError::DuelInProgress);
        }

        let challenger = self.require_player(challenger_id)?;
        if self.current_player() != Some(challenger_id) {
            return Err(ValidationError::NotYourTurn);
        }
        challenger.check_playable(card_index)?;

        if defender_id == challenger_id {
            return Err(ValidationError::SelfChallenge);
        }
        let defender = self.require_player(defender_id)?;
        let hidden = defender.unrevealed_indices();
        if hidden.is_empty() {
            return Err(ValidationError::DefenderExhausted);
        }

        let duel = Duel {
            challenger_id: challenger_id.clone(),
            challenger_card_index: card_index,
            defender_id: defender_id.clone(),
            defender_card_index: None,
        };
        self.push_event(GameEventData::ChallengeIssued {
            challenger_id: challenger_id.clone(),
            defender_id: defender_id.clone(),
        });

        match hidden.as_slice() {
            [only] => Ok(ChallengeOutcome::Resolved(self.finish_duel(duel, *only))),
            _ => {
                self.duel = Some(duel);
                Ok(ChallengeOutcome::Pending)
            }
        }
    }

    /// Commit the defender's card and resolve the pending duel.
    pub fn respond(
        &mut self,
        defender_id: &PlayerId,
        card_index: usize,
    ) -> Result<DuelRecord, ValidationError> {
        self.expect_phase(Phase::Playing)?;
        let duel = match &self.duel {
            Some(duel) if duel.is_pending() => duel,
            _ => return Err(ValidationError::NoPendingDuel),
        };
        if &duel.defender_id != defender_id {
            return Err(ValidationError::NotAwaitingYou);
        }
        self.require_player(defender_id)?.check_playable(card_index)?;

        let Some(duel) = self.duel.take() else {
            return Err(ValidationError::NoPendingDuel);
        };
        Ok(self.finish_duel(duel, card_index))
    }

    /// Withdraw a pending duel. The turn stays with the challenger.
    pub fn withdraw_challenge(&mut self, challenger_id: &PlayerId) -> Result<(), ValidationError> {
        self.expect_phase(Phase::Playing)?;
        match &self.duel {
            Some(duel) if duel.is_pending() => {
                if &duel.challenger_id != challenger_id {
                    return Err(ValidationError::NotChallenger);
                }
            }
            _ => return Err(ValidationError::NoPendingDuel),
        }

        self.duel = None;
        self.push_event(GameEventData::ChallengeWithdrawn {
            challenger_id: challenger_id.clone(),
        });
        Ok(())
    }

    /// Settle a duel with the defender's committed card, apply the reveal
    /// and public trail, then advance the turn.
    ///
    /// Callers have validated both card indices.
    fn finish_duel(&mut self, mut duel: Duel, defender_card_index: usize) -> DuelRecord {
        duel.defender_card_index = Some(defender_card_index);

        let challenger_card = self.players[&duel.challenger_id].hand[duel.challenger_card_index];
        let defender_card = self.players[&duel.defender_id].hand[defender_card_index];

        let settlement = settle(&duel, defender_card_index, challenger_card, defender_card);

        if let Some((loser_id, index, _)) = &settlement.loser {
            if let Some(loser) = self.players.get_mut(loser_id) {
                loser.revealed.insert(*index);
            }
        }
        if let (Some((winner_id, index, _)), Some((_, _, defeated))) =
            (&settlement.winner, &settlement.loser)
        {
            if let Some(info) = self
                .players
                .get_mut(winner_id)
                .and_then(|w| w.public_info.get_mut(*index))
            {
                info.record_victory(*defeated);
            }
        }

        let record = settlement.record(&duel, defender_card_index);
        self.push_event(GameEventData::DuelResolved(record.clone()));
        self.advance_turn();

        record
    }

    /// Rotate to the next player with a hidden card, clearing the duel slot.
    pub fn advance_turn(&mut self) -> Option<&PlayerId> {
        self.duel = None;
        let players = &self.players;
        let current = self.turn.as_mut().and_then(|turn| {
            turn.advance(|id| players.get(id).is_some_and(|p| p.unrevealed_count() > 0))
                .cloned()
        });
        self.push_event(GameEventData::TurnAdvanced { current_player_id: current });
        self.current_player()
    }

    // -------------------------------------------------------------------------
    // Endgame
    // -------------------------------------------------------------------------

    /// Call the team leaders and finish the game.
    pub fn call_leaders(
        &mut self,
        caller_id: &PlayerId,
        guessed: &BTreeSet<PlayerId>,
    ) -> Result<&GameResult, ValidationError> {
        self.expect_phase(Phase::Playing)?;
        self.require_player(caller_id)?;
        if self.house_rules.no_calling_self && guessed.contains(caller_id) {
            return Err(ValidationError::SelfCallDisallowed);
        }
        if let Some(unknown) = guessed.iter().find(|id| !self.players.contains_key(*id)) {
            return Err(ValidationError::UnknownPlayer(unknown.clone()));
        }

        let deal = self
            .deal_report
            .unwrap_or(DealReport { attempts: 0, exhausted: false });
        let result = judge_call(caller_id, guessed, &self.players, deal, Utc::now());

        self.push_event(GameEventData::LeadersCalled {
            caller_id: caller_id.clone(),
            correct: result.correct,
            winning_team: result.winning_team,
        });
        self.duel = None;
        self.phase = Phase::Finished;

        Ok(self.result.insert(result))
    }

    /// Return to the lobby from any phase.
    ///
    /// Clears hands, reveals, public trails, turn order, any live duel and
    /// the result. Players, names and house rules are kept.
    pub fn end_game(&mut self) {
        for player in self.players.values_mut() {
            player.clear_game();
        }
        self.turn = None;
        self.duel = None;
        self.result = None;
        self.deal_report = None;
        self.phase = Phase::Lobby;
        self.push_event(GameEventData::GameReset);
    }
}

#[cfg(test)]
impl TableState {
    /// Overwrite hands and turn order for scripted tests.
    pub(crate) fn rig(&mut self, hands: Vec<(PlayerId, Hand)>, order: Vec<PlayerId>) {
        for (id, hand) in hands {
            if let Some(p) = self.players.get_mut(&id) {
                p.deal(hand);
            }
        }
        self.turn = Some(TurnState { order, current_index: 0 });
        self.duel = None;
        self.phase = Phase::Playing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::{Card, Color, Rank, HAND_SIZE};
    use crate::game::duel::DuelOutcome;

    fn pid(s: &str) -> PlayerId {
        PlayerId::from(s)
    }

    fn table_with(names: &[&str]) -> TableState {
        let mut table = TableState::new(TableConfig::default(), 42);
        for n in names {
            table.join(pid(n), n).unwrap();
        }
        table
    }

    /// a: red K soul; b: black A soul; c: red 9 soul.
    fn rigged() -> TableState {
        let mut table = table_with(&["a", "b", "c"]);
        table.rig(
            vec![
                (pid("a"), vec![Card::diamond(Rank::King), Card::diamond(Rank::Two), Card::spade(Rank::Three)]),
                (pid("b"), vec![Card::spade(Rank::Ace), Card::spade(Rank::Four), Card::diamond(Rank::Five)]),
                (pid("c"), vec![Card::diamond(Rank::Nine), Card::diamond(Rank::Six), Card::BLACK_JOKER]),
            ],
            vec![pid("a"), pid("b"), pid("c")],
        );
        table
    }

    #[test]
    fn test_player_id_validation() {
        assert!(PlayerId::parse("abc-123").is_ok());
        assert_eq!(PlayerId::parse(""), Err(ValidationError::InvalidPlayerId));
        assert_eq!(PlayerId::parse("a\nb"), Err(ValidationError::InvalidPlayerId));
        assert_eq!(PlayerId::parse(&"x".repeat(65)), Err(ValidationError::InvalidPlayerId));
    }

    #[test]
    fn test_join_and_rejoin() {
        let mut table = table_with(&["a"]);
        assert_eq!(table.join(pid("a"), "  Alice  "), Ok(JoinKind::Rejoined));
        assert_eq!(table.player(&pid("a")).unwrap().display_name, "Alice");
        assert_eq!(table.join(pid("b"), "   "), Err(ValidationError::InvalidDisplayName));
    }

    #[test]
    fn test_new_player_cannot_join_mid_game() {
        let mut table = table_with(&["a", "b"]);
        table.start_game().unwrap();
        assert!(matches!(
            table.join(pid("z"), "late"),
            Err(ValidationError::WrongPhase { .. })
        ));
        // Known players can always come back
        assert_eq!(table.join(pid("a"), "a"), Ok(JoinKind::Rejoined));
    }

    #[test]
    fn test_table_full() {
        let names: Vec<String> = (0..MAX_PLAYERS).map(|i| format!("p{}", i)).collect();
        let mut table = TableState::new(TableConfig::default(), 1);
        for n in &names {
            table.join(pid(n), n).unwrap();
        }
        assert_eq!(
            table.join(pid("extra"), "extra"),
            Err(ValidationError::TableFull { max: MAX_PLAYERS })
        );
    }

    #[test]
    fn test_start_requires_two_players() {
        let mut table = table_with(&["a"]);
        assert_eq!(
            table.start_game(),
            Err(ValidationError::NotEnoughPlayers { have: 1, need: 2 })
        );
        assert_eq!(table.phase(), Phase::Lobby);
    }

    #[test]
    fn test_start_deals_and_orders() {
        let mut table = table_with(&["a", "b", "c", "d"]);
        let report = table.start_game().unwrap();
        assert!(report.attempts >= 1);
        assert_eq!(table.phase(), Phase::Playing);
        assert_eq!(table.turn().unwrap().order.len(), 4);
        for p in table.players().values() {
            assert_eq!(p.hand.len(), HAND_SIZE);
            assert_eq!(p.public_info.len(), HAND_SIZE);
        }
        assert!(table.take_events().iter().any(|e| e.kind() == "game_started"));
    }

    #[test]
    fn test_house_rules_only_in_lobby() {
        let mut table = table_with(&["a", "b"]);
        let rules = table
            .update_house_rules(HouseRulesPatch { one_traitor: Some(true), ..Default::default() })
            .unwrap();
        assert!(rules.one_traitor);
        assert!(!rules.no_calling_self);

        table.start_game().unwrap();
        assert!(table
            .update_house_rules(HouseRulesPatch { no_calling_self: Some(true), ..Default::default() })
            .is_err());
        assert!(!table.house_rules().no_calling_self);
    }

    #[test]
    fn test_challenge_preconditions() {
        let mut table = rigged();
        assert_eq!(table.challenge(&pid("b"), 0, &pid("a")), Err(ValidationError::NotYourTurn));
        assert_eq!(table.challenge(&pid("a"), 0, &pid("a")), Err(ValidationError::SelfChallenge));
        assert_eq!(table.challenge(&pid("a"), 3, &pid("b")), Err(ValidationError::CardIndexOutOfRange(3)));
        assert_eq!(
            table.challenge(&pid("a"), 0, &pid("nobody")),
            Err(ValidationError::UnknownPlayer(pid("nobody")))
        );

        assert_eq!(table.challenge(&pid("a"), 0, &pid("b")), Ok(ChallengeOutcome::Pending));
        assert_eq!(table.challenge(&pid("a"), 1, &pid("c")), Err(ValidationError::DuelInProgress));
    }

    #[test]
    fn test_respond_resolves_and_reveals() {
        let mut table = rigged();
        table.challenge(&pid("a"), 0, &pid("b")).unwrap();

        assert_eq!(table.respond(&pid("c"), 0), Err(ValidationError::NotAwaitingYou));

        // a's K vs b's 4 -> a wins, b's card 1 revealed
        let record = table.respond(&pid("b"), 1).unwrap();
        assert_eq!(record.outcome, DuelOutcome::ChallengerWins);
        assert_eq!(record.loser_id, Some(pid("b")));
        assert_eq!(record.revealed_card, Some(Card::spade(Rank::Four)));

        assert!(table.player(&pid("b")).unwrap().is_revealed(1));
        let info = &table.player(&pid("a")).unwrap().public_info[0];
        assert!(info.defeated_ranks.contains(&Rank::Four));
        assert!(info.not_joker);

        assert!(table.duel().is_none());
        assert_eq!(table.current_player(), Some(&pid("b")));
    }

    #[test]
    fn test_tie_reveals_nothing() {
        let mut table = table_with(&["a", "b"]);
        table.rig(
            vec![
                (pid("a"), vec![Card::diamond(Rank::Nine), Card::diamond(Rank::Two), Card::spade(Rank::Three)]),
                (pid("b"), vec![Card::spade(Rank::Nine), Card::spade(Rank::Four), Card::diamond(Rank::Five)]),
            ],
            vec![pid("a"), pid("b")],
        );
        table.challenge(&pid("a"), 0, &pid("b")).unwrap();
        let record = table.respond(&pid("b"), 0).unwrap();
        assert_eq!(record.outcome, DuelOutcome::Tie);
        assert!(table.players().values().all(|p| p.revealed.is_empty()));
        assert_eq!(table.current_player(), Some(&pid("b")));
    }

    #[test]
    fn test_revealed_card_cannot_be_used() {
        let mut table = rigged();
        table.challenge(&pid("a"), 0, &pid("b")).unwrap();
        table.respond(&pid("b"), 1).unwrap();
        // b's turn now; card 1 is revealed
        assert_eq!(
            table.challenge(&pid("b"), 1, &pid("a")),
            Err(ValidationError::CardAlreadyRevealed(1))
        );
    }

    #[test]
    fn test_last_card_autoresolves_and_skips() {
        let mut table = rigged();
        // Reveal two of b's cards by hand
        table.players.get_mut(&pid("b")).unwrap().revealed.extend([1, 2]);

        // a's K vs b's only hidden card, the A -> b wins, a's K revealed
        let outcome = table.challenge(&pid("a"), 0, &pid("b")).unwrap();
        let ChallengeOutcome::Resolved(record) = outcome else {
            panic!("expected immediate resolution");
        };
        assert_eq!(record.defender_card_index, 0);
        assert_eq!(record.outcome, DuelOutcome::DefenderWins);
        assert!(table.player(&pid("a")).unwrap().is_revealed(0));
        assert!(table.duel().is_none());
        assert_eq!(table.current_player(), Some(&pid("b")));
    }

    #[test]
    fn test_last_card_loss_flips_one_flag_and_skips_defender() {
        let mut table = rigged();
        // b keeps only the 4 hidden
        table.players.get_mut(&pid("b")).unwrap().revealed.extend([0, 2]);
        let reveals = |t: &TableState| t.players().values().map(|p| p.revealed.len()).sum::<usize>();
        let before = reveals(&table);

        // a's K beats b's 4
        let ChallengeOutcome::Resolved(record) = table.challenge(&pid("a"), 0, &pid("b")).unwrap() else {
            panic!("expected immediate resolution");
        };
        assert_eq!(record.outcome, DuelOutcome::ChallengerWins);
        assert_eq!(record.loser_id, Some(pid("b")));
        assert_eq!(reveals(&table), before + 1);
        assert_eq!(table.player(&pid("b")).unwrap().unrevealed_count(), 0);
        assert!(!table.player(&pid("a")).unwrap().is_revealed(0));

        // b is fully revealed, so the turn goes from a straight to c
        assert_eq!(table.current_player(), Some(&pid("c")));
    }

    #[test]
    fn test_fully_revealed_defender_rejected_and_skipped() {
        let mut table = rigged();
        table.players.get_mut(&pid("b")).unwrap().revealed.extend([0, 1, 2]);
        assert_eq!(
            table.challenge(&pid("a"), 0, &pid("b")),
            Err(ValidationError::DefenderExhausted)
        );

        table.challenge(&pid("a"), 1, &pid("c")).unwrap();
        table.respond(&pid("c"), 1).unwrap();
        // b has nothing left, so the turn passes to c
        assert_eq!(table.current_player(), Some(&pid("c")));
    }

    #[test]
    fn test_withdraw_challenge() {
        let mut table = rigged();
        assert_eq!(table.withdraw_challenge(&pid("a")), Err(ValidationError::NoPendingDuel));
        table.challenge(&pid("a"), 0, &pid("b")).unwrap();
        assert_eq!(table.withdraw_challenge(&pid("b")), Err(ValidationError::NotChallenger));
        table.withdraw_challenge(&pid("a")).unwrap();
        assert!(table.duel().is_none());
        assert_eq!(table.current_player(), Some(&pid("a")));
    }

    #[test]
    fn test_call_leaders_finishes() {
        let mut table = rigged();
        let guess: BTreeSet<PlayerId> = [pid("a"), pid("b")].into_iter().collect();
        let result = table.call_leaders(&pid("c"), &guess).unwrap();
        assert!(result.correct);
        assert_eq!(result.winning_team, Some(Color::Red));
        assert_eq!(table.phase(), Phase::Finished);
        assert!(table.challenge(&pid("a"), 0, &pid("b")).is_err());
    }

    #[test]
    fn test_no_calling_self() {
        let mut table = table_with(&["a", "b", "c"]);
        table
            .update_house_rules(HouseRulesPatch { no_calling_self: Some(true), ..Default::default() })
            .unwrap();
        table.start_game().unwrap();
        table.take_events();

        let guess: BTreeSet<PlayerId> = [pid("a")].into_iter().collect();
        assert_eq!(table.call_leaders(&pid("a"), &guess), Err(ValidationError::SelfCallDisallowed));
        assert_eq!(table.phase(), Phase::Playing);
        assert!(table.result().is_none());
        assert!(table.take_events().is_empty());
    }

    #[test]
    fn test_end_game_resets_but_keeps_players() {
        let mut table = rigged();
        table.challenge(&pid("a"), 0, &pid("b")).unwrap();
        table.end_game();

        assert_eq!(table.phase(), Phase::Lobby);
        assert!(table.duel().is_none());
        assert!(table.turn().is_none());
        assert!(table.result().is_none());
        assert_eq!(table.players().len(), 3);
        for p in table.players().values() {
            assert!(p.hand.is_empty());
            assert!(p.revealed.is_empty());
            assert!(p.public_info.is_empty());
        }
    }

    #[test]
    fn test_kick_only_in_lobby() {
        let mut table = table_with(&["a", "b", "c"]);
        table.start_game().unwrap();
        assert!(table.kick(&pid("c")).is_err());
        table.end_game();
        table.kick(&pid("c")).unwrap();
        assert_eq!(table.players().len(), 2);
        assert_eq!(table.kick(&pid("c")), Err(ValidationError::UnknownPlayer(pid("c"))));
    }

    #[test]
    fn test_rejected_request_records_no_events() {
        let mut table = rigged();
        table.take_events();
        let _ = table.challenge(&pid("b"), 0, &pid("a"));
        assert!(table.take_events().is_empty());
    }
}
