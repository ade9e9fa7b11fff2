//! Duel Resolution
//!
//! A duel compares one challenger card with one defender card. The loser's
//! card is revealed to everyone; a tie reveals nothing. Every win also
//! leaves a public trail on the winning card (what it has beaten), which
//! is how hidden ranks leak over the course of a game.

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};

use crate::game::card::{Card, Rank};
use crate::game::state::PlayerId;

/// Result of comparing two cards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelOutcome {
    /// First card (the challenger's) wins.
    ChallengerWins,
    /// Second card (the defender's) wins.
    DefenderWins,
    /// Equal ranks.
    Tie,
}

/// Compare the challenger's card against the defender's.
///
/// Equal ranks tie. A lone joker loses to J, Q, K and A and beats
/// everything else. Otherwise the higher rank wins.
pub fn resolve(challenger: Card, defender: Card) -> DuelOutcome {
    let (a, b) = (challenger.rank, defender.rank);

    if a == b {
        return DuelOutcome::Tie;
    }

    let challenger_wins = match (a, b) {
        (Rank::Joker, other) => !other.is_face_or_ace(),
        (other, Rank::Joker) => other.is_face_or_ace(),
        _ => a > b,
    };

    if challenger_wins {
        DuelOutcome::ChallengerWins
    } else {
        DuelOutcome::DefenderWins
    }
}

/// Public inference trail for one card.
///
/// Only ever grows within a game: ranks are added, flags go false to true.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicInfo {
    /// Ranks this card has beaten.
    pub defeated_ranks: BTreeSet<Rank>,
    /// This card has beaten a joker.
    pub defeated_joker: bool,
    /// This card has beaten a plain (non-face, non-ace) rank.
    pub not_joker: bool,
}

impl PublicInfo {
    /// Record that this card beat `defeated`.
    pub fn record_victory(&mut self, defeated: Card) {
        if defeated.rank.is_joker() {
            self.defeated_joker = true;
        } else {
            self.defeated_ranks.insert(defeated.rank);
            if !defeated.rank.is_face_or_ace() {
                self.not_joker = true;
            }
        }
    }

    /// Nothing has been learned about this card yet.
    pub fn is_empty(&self) -> bool {
        self.defeated_ranks.is_empty() && !self.defeated_joker && !self.not_joker
    }
}

/// The single live duel, if any.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duel {
    /// Player who issued the challenge.
    pub challenger_id: PlayerId,
    /// Challenger's committed card.
    pub challenger_card_index: usize,
    /// Player being challenged.
    pub defender_id: PlayerId,
    /// Defender's card, `None` while awaiting their response.
    pub defender_card_index: Option<usize>,
}

impl Duel {
    /// Is the duel waiting on the defender.
    pub fn is_pending(&self) -> bool {
        self.defender_card_index.is_none()
    }

    /// Is `player_id` one of the two participants.
    pub fn involves(&self, player_id: &PlayerId) -> bool {
        &self.challenger_id == player_id || &self.defender_id == player_id
    }
}

/// What a resolved duel changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    /// Comparison result.
    pub outcome: DuelOutcome,
    /// (player, card index, card) of the winning card.
    pub winner: Option<(PlayerId, usize, Card)>,
    /// (player, card index, card) of the losing card, which is revealed.
    pub loser: Option<(PlayerId, usize, Card)>,
}

/// Public summary of a settled duel. Only the losing card appears in it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuelRecord {
    /// Challenger.
    pub challenger_id: PlayerId,
    /// Challenger's card index.
    pub challenger_card_index: usize,
    /// Defender.
    pub defender_id: PlayerId,
    /// Defender's card index.
    pub defender_card_index: usize,
    /// Result.
    pub outcome: DuelOutcome,
    /// Owner of the revealed card, `None` on a tie.
    pub loser_id: Option<PlayerId>,
    /// The card that was revealed, `None` on a tie.
    pub revealed_card: Option<Card>,
}

impl Settlement {
    /// Public record of this settlement.
    pub fn record(&self, duel: &Duel, defender_card_index: usize) -> DuelRecord {
        DuelRecord {
            challenger_id: duel.challenger_id.clone(),
            challenger_card_index: duel.challenger_card_index,
            defender_id: duel.defender_id.clone(),
            defender_card_index,
            outcome: self.outcome,
            loser_id: self.loser.as_ref().map(|(id, _, _)| id.clone()),
            revealed_card: self.loser.as_ref().map(|(_, _, card)| *card),
        }
    }
}

/// Settle a fully-specified duel given both committed cards.
pub fn settle(
    duel: &Duel,
    defender_card_index: usize,
    challenger_card: Card,
    defender_card: Card,
) -> Settlement {
    let challenger = (duel.challenger_id.clone(), duel.challenger_card_index, challenger_card);
    let defender = (duel.defender_id.clone(), defender_card_index, defender_card);

    match resolve(challenger_card, defender_card) {
        DuelOutcome::ChallengerWins => Settlement {
            outcome: DuelOutcome::ChallengerWins,
            winner: Some(challenger),
            loser: Some(defender),
        },
        DuelOutcome::DefenderWins => Settlement {
            outcome: DuelOutcome::DefenderWins,
            winner: Some(defender),
            loser: Some(challenger),
        },
        DuelOutcome::Tie => Settlement {
            outcome: DuelOutcome::Tie,
            winner: None,
            loser: None,
        },
    }
}
