//! State Projection
//!
//! Derives what a client may see from the canonical table. The public view
//! goes to everyone and never contains a hidden card's face. The private
//! view goes to one player and adds their own hand and team.
//!
//! While a duel is pending, the challenger's committed card is shown to
//! both participants through their private views and to nobody else.

use serde::{Serialize, Deserialize};

use crate::game::card::{Back, Card, Color, Hand};
use crate::game::deal::DealReport;
use crate::game::duel::{Duel, PublicInfo};
use crate::game::leaders::GameResult;
use crate::game::soul::{is_traitor, soul_card};
use crate::game::state::{HouseRules, Phase, PlayerId, PlayerState, TableState};

// =============================================================================
// PUBLIC VIEW
// =============================================================================

/// One card slot as seen by the whole table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PublicCard {
    /// Face down: only the back and what the card has beaten.
    Hidden {
        /// Position in the hand.
        index: usize,
        /// Back color.
        back: Back,
        /// Public trail.
        public_info: PublicInfo,
    },
    /// Face up after losing a duel.
    Revealed {
        /// Position in the hand.
        index: usize,
        /// The card.
        card: Card,
    },
}

/// A seated player as seen by the whole table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicPlayer {
    /// Persistent id.
    pub player_id: PlayerId,
    /// Display name.
    pub display_name: String,
    /// A connection is bound.
    pub connected: bool,
    /// Cards in hand order.
    pub cards: Vec<PublicCard>,
}

impl PublicPlayer {
    fn project(player: &PlayerState) -> Self {
        let cards = player
            .hand
            .iter()
            .enumerate()
            .map(|(index, card)| {
                if player.is_revealed(index) {
                    PublicCard::Revealed { index, card: *card }
                } else {
                    PublicCard::Hidden {
                        index,
                        back: card.back,
                        public_info: player.public_info.get(index).cloned().unwrap_or_default(),
                    }
                }
            })
            .collect();

        Self {
            player_id: player.id.clone(),
            display_name: player.display_name.clone(),
            connected: player.connected,
            cards,
        }
    }
}

/// Everything the whole table may see.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicView {
    /// Current phase.
    pub phase: Phase,
    /// Games dealt so far.
    pub game_number: u32,
    /// Current house rules.
    pub house_rules: HouseRules,
    /// Players in id order.
    pub players: Vec<PublicPlayer>,
    /// Turn order for this deal.
    pub turn_order: Vec<PlayerId>,
    /// Player to act.
    pub current_player_id: Option<PlayerId>,
    /// Live duel: participants and card indices only.
    pub duel: Option<Duel>,
    /// Outcome of the leader call, once finished.
    pub result: Option<GameResult>,
    /// Deal report for the current game.
    pub deal: Option<DealReport>,
}

impl PublicView {
    /// Project the table for everyone.
    pub fn project(table: &TableState) -> Self {
        Self {
            phase: table.phase(),
            game_number: table.game_number(),
            house_rules: table.house_rules(),
            players: table.players().values().map(PublicPlayer::project).collect(),
            turn_order: table.turn().map(|t| t.order.clone()).unwrap_or_default(),
            current_player_id: table.current_player().cloned(),
            duel: table.duel().cloned(),
            result: table.result().cloned(),
            deal: table.deal_report(),
        }
    }
}

// =============================================================================
// PRIVATE VIEW
// =============================================================================

/// Which side of the pending duel the viewer is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelRole {
    /// Viewer issued the challenge.
    Challenger,
    /// Viewer must respond.
    Defender,
}

/// Pending duel detail visible to its two participants only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateDuel {
    /// Viewer's side.
    pub role: DuelRole,
    /// The other participant.
    pub opponent_id: PlayerId,
    /// Card the challenger committed.
    pub challenger_card: Card,
}

/// What one player may see about themselves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateView {
    /// Viewer.
    pub player_id: PlayerId,
    /// Full hand, hidden cards included.
    pub hand: Hand,
    /// Soul card, once dealt.
    pub soul_card: Option<Card>,
    /// Team, once dealt.
    pub team: Option<Color>,
    /// Viewer's soul color differs from their majority color.
    pub is_traitor: bool,
    /// Indices still face down.
    pub unrevealed_indices: Vec<usize>,
    /// Set while the viewer is in a pending duel.
    pub duel: Option<PrivateDuel>,
}

impl PrivateView {
    /// Project the table for `player_id`; `None` if they are not seated.
    pub fn project(table: &TableState, player_id: &PlayerId) -> Option<Self> {
        let player = table.player(player_id)?;
        let soul = soul_card(&player.hand);

        let duel = table
            .duel()
            .filter(|d| d.is_pending() && d.involves(player_id))
            .and_then(|d| {
                let challenger_card = table
                    .player(&d.challenger_id)?
                    .hand
                    .get(d.challenger_card_index)
                    .copied()?;
                let (role, opponent_id) = if &d.challenger_id == player_id {
                    (DuelRole::Challenger, d.defender_id.clone())
                } else {
                    (DuelRole::Defender, d.challenger_id.clone())
                };
                Some(PrivateDuel { role, opponent_id, challenger_card })
            });

        Some(Self {
            player_id: player_id.clone(),
            hand: player.hand.clone(),
            soul_card: soul,
            team: soul.map(|c| c.color),
            is_traitor: !player.hand.is_empty() && is_traitor(&player.hand),
            unrevealed_indices: player.unrevealed_indices(),
            duel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::Rank;
    use crate::game::state::TableConfig;

    fn pid(s: &str) -> PlayerId {
        PlayerId::from(s)
    }

    fn playing_table() -> TableState {
        let mut table = TableState::new(TableConfig::default(), 9);
        for n in ["a", "b", "c"] {
            table.join(pid(n), n).unwrap();
        }
        table.start_game().unwrap();
        table
    }

    #[test]
    fn test_public_view_hides_faces() {
        let table = playing_table();
        let json = serde_json::to_string(&PublicView::project(&table)).unwrap();
        assert!(!json.contains("\"rank\""));
        assert!(!json.contains("\"suit\""));
        assert!(json.contains("\"back\""));
    }

    #[test]
    fn test_revealed_card_is_public() {
        let mut table = playing_table();
        let current = table.current_player().cloned().unwrap();
        let defender = table.players().keys().find(|id| **id != current).cloned().unwrap();

        table.challenge(&current, 0, &defender).unwrap();
        let record = table.respond(&defender, 0).unwrap();

        let view = PublicView::project(&table);
        let revealed: Vec<&PublicCard> = view
            .players
            .iter()
            .flat_map(|p| p.cards.iter())
            .filter(|c| matches!(c, PublicCard::Revealed { .. }))
            .collect();

        match record.revealed_card {
            Some(card) => {
                assert_eq!(revealed.len(), 1);
                assert_eq!(revealed[0], &PublicCard::Revealed { index: 0, card });
            }
            None => assert!(revealed.is_empty()),
        }
    }

    #[test]
    fn test_pending_duel_card_visible_to_participants_only() {
        let mut table = playing_table();
        let current = table.current_player().cloned().unwrap();
        let others: Vec<PlayerId> =
            table.players().keys().filter(|id| **id != current).cloned().collect();
        let (defender, bystander) = (&others[0], &others[1]);

        table.challenge(&current, 2, defender).unwrap();
        let committed = table.player(&current).unwrap().hand[2];

        let mine = PrivateView::project(&table, &current).unwrap().duel.unwrap();
        assert_eq!(mine.role, DuelRole::Challenger);
        assert_eq!(mine.challenger_card, committed);

        let theirs = PrivateView::project(&table, defender).unwrap().duel.unwrap();
        assert_eq!(theirs.role, DuelRole::Defender);
        assert_eq!(&theirs.opponent_id, &current);
        assert_eq!(theirs.challenger_card, committed);

        assert!(PrivateView::project(&table, bystander).unwrap().duel.is_none());

        // Public duel carries only ids and indices
        let duel = PublicView::project(&table).duel.unwrap();
        let json = serde_json::to_string(&duel).unwrap();
        assert!(!json.contains("rank"));
    }

    #[test]
    fn test_private_view_has_soul_and_team() {
        let mut table = TableState::new(TableConfig::default(), 1);
        table.join(pid("a"), "a").unwrap();
        let lobby = PrivateView::project(&table, &pid("a")).unwrap();
        assert!(lobby.hand.is_empty());
        assert!(lobby.soul_card.is_none());
        assert!(!lobby.is_traitor);

        table.join(pid("b"), "b").unwrap();
        table.start_game().unwrap();
        let view = PrivateView::project(&table, &pid("a")).unwrap();
        let soul = view.soul_card.unwrap();
        assert_eq!(view.team, Some(soul.color));
        assert_eq!(view.unrevealed_indices, vec![0, 1, 2]);
        assert!(PrivateView::project(&table, &pid("zz")).is_none());
    }

    #[test]
    fn test_hidden_card_carries_public_info() {
        let player = {
            let mut p = PlayerState::new(pid("a"), "a".into());
            p.deal(vec![Card::diamond(Rank::King), Card::spade(Rank::Two), Card::spade(Rank::Three)]);
            p.public_info[0].record_victory(Card::spade(Rank::Six));
            p
        };
        let public = PublicPlayer::project(&player);
        match &public.cards[0] {
            PublicCard::Hidden { public_info, .. } => {
                assert!(public_info.not_joker);
                assert!(public_info.defeated_ranks.contains(&Rank::Six));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
