//! Leader Calls and Game Results
//!
//! Each populated team has one leader: the member holding the highest
//! soul card. A leader call names the player(s) the caller believes are
//! the leaders; the guess is compared with the truth as a set and decides
//! who wins.
//!
//! Each face color has one card per rank, so the standard deck never gives
//! two teammates equal soul ranks. Hand-built tables can; the leader is
//! then the member with the lexicographically smallest player id, so the
//! same hands always give the same leaders.

use std::collections::{BTreeMap, BTreeSet};
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::card::{Card, Color, Hand};
use crate::game::deal::DealReport;
use crate::game::soul::{is_traitor, soul_card};
use crate::game::state::{PlayerId, PlayerState};

/// Leader of every populated team, keyed by team.
pub fn team_leaders(players: &BTreeMap<PlayerId, PlayerState>) -> BTreeMap<Color, PlayerId> {
    let mut best: BTreeMap<Color, (Card, &PlayerId)> = BTreeMap::new();

    // BTreeMap iteration is in id order, so a strict comparison keeps the
    // smallest id among equal ranks.
    for (id, player) in players {
        let Some(soul) = soul_card(&player.hand) else {
            continue;
        };
        match best.get(&soul.color) {
            Some((current, _)) if current.rank >= soul.rank => {}
            _ => {
                best.insert(soul.color, (soul, id));
            }
        }
    }

    best.into_iter().map(|(team, (_, id))| (team, id.clone())).collect()
}

/// One row of the final result table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Player.
    pub player_id: PlayerId,
    /// Name at the time of the call.
    pub display_name: String,
    /// Full hand, every card face up.
    pub hand: Hand,
    /// Soul card.
    pub soul_card: Card,
    /// Team (soul card color).
    pub team: Color,
    /// Leads their team.
    pub is_leader: bool,
    /// Soul color differs from the hand's majority color.
    pub is_traitor: bool,
}

/// Immutable snapshot produced by a leader call; kept until the next deal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    /// Who made the call.
    pub caller_id: PlayerId,
    /// What they guessed, sorted.
    pub guessed_leader_ids: Vec<PlayerId>,
    /// The actual leaders, sorted.
    pub leader_ids: Vec<PlayerId>,
    /// Guess matched the truth exactly.
    pub correct: bool,
    /// Every player was on the same team.
    pub single_team: bool,
    /// Team that won, if the outcome is team-based.
    pub winning_team: Option<Color>,
    /// Winners, sorted.
    pub winning_player_ids: Vec<PlayerId>,
    /// Losers, sorted.
    pub losing_player_ids: Vec<PlayerId>,
    /// Every hand, by team then soul rank (highest first).
    pub players: Vec<ResultEntry>,
    /// How the deal for this game went.
    pub deal: DealReport,
    /// When the call was made.
    pub decided_at: DateTime<Utc>,
}

/// Judge a leader call against the current hands.
///
/// The caller must be seated; the table checks that before calling in.
pub fn judge_call(
    caller_id: &PlayerId,
    guessed: &BTreeSet<PlayerId>,
    players: &BTreeMap<PlayerId, PlayerState>,
    deal: DealReport,
    decided_at: DateTime<Utc>,
) -> GameResult {
    let leaders = team_leaders(players);
    let leader_set: BTreeSet<PlayerId> = leaders.values().cloned().collect();
    let correct = *guessed == leader_set;

    let mut entries: Vec<ResultEntry> = players
        .iter()
        .filter_map(|(id, p)| {
            let soul = soul_card(&p.hand)?;
            Some(ResultEntry {
                player_id: id.clone(),
                display_name: p.display_name.clone(),
                hand: p.hand.clone(),
                soul_card: soul,
                team: soul.color,
                is_leader: leader_set.contains(id),
                is_traitor: is_traitor(&p.hand),
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        a.team
            .cmp(&b.team)
            .then(b.soul_card.rank.cmp(&a.soul_card.rank))
            .then(a.player_id.cmp(&b.player_id))
    });

    let single_team = leaders.len() <= 1;
    let caller_team = entries
        .iter()
        .find(|e| &e.player_id == caller_id)
        .map(|e| e.team);

    let winning_team = if single_team {
        leaders.keys().next().copied().filter(|_| correct)
    } else {
        caller_team.map(|team| if correct { team } else { team.opposite() })
    };

    let (winners, losers): (Vec<&ResultEntry>, Vec<&ResultEntry>) = if single_team {
        if correct {
            (entries.iter().collect(), Vec::new())
        } else {
            (Vec::new(), entries.iter().collect())
        }
    } else {
        entries.iter().partition(|e| Some(e.team) == winning_team)
    };

    let sorted_ids = |rows: Vec<&ResultEntry>| -> Vec<PlayerId> {
        let set: BTreeSet<PlayerId> = rows.into_iter().map(|e| e.player_id.clone()).collect();
        set.into_iter().collect()
    };

    GameResult {
        caller_id: caller_id.clone(),
        guessed_leader_ids: guessed.iter().cloned().collect(),
        leader_ids: leader_set.into_iter().collect(),
        correct,
        single_team,
        winning_team,
        winning_player_ids: sorted_ids(winners),
        losing_player_ids: sorted_ids(losers),
        players: entries,
        deal,
        decided_at,
    }
}
