//! Soul Card and Team Resolution
//!
//! A hand's soul card is its highest-ranked card, unless the two highest
//! ranks tie, in which case the remaining third card is the soul card.
//! Team, majority color and traitor status are always derived from the
//! hand and never stored.

use crate::game::card::{Card, Color};

/// Index (into the hand) of the soul card.
///
/// Sorting is stable, so equal ranks keep their dealt order. Returns
/// `None` for an empty hand.
pub fn soul_index(hand: &[Card]) -> Option<usize> {
    let mut order: Vec<usize> = (0..hand.len()).collect();
    order.sort_by(|a, b| hand[*b].rank.cmp(&hand[*a].rank));

    match order.as_slice() {
        [] => None,
        [top, second, third, ..] if hand[*top].rank == hand[*second].rank => Some(*third),
        [top, ..] => Some(*top),
    }
}

/// The soul card of a hand.
pub fn soul_card(hand: &[Card]) -> Option<Card> {
    soul_index(hand).map(|i| hand[i])
}

/// Team of a hand: the soul card's face color.
pub fn team(hand: &[Card]) -> Option<Color> {
    soul_card(hand).map(|c| c.color)
}

/// Majority face color of a hand.
///
/// Dealt hands are split 2-1, so there is always a strict majority; a
/// tie (only possible on malformed hands) resolves to red.
pub fn majority_color(hand: &[Card]) -> Option<Color> {
    if hand.is_empty() {
        return None;
    }
    let red = hand.iter().filter(|c| c.color == Color::Red).count();
    let black = hand.len() - red;
    Some(if black > red { Color::Black } else { Color::Red })
}

/// A traitor's soul card color differs from their hand's majority color.
pub fn is_traitor(hand: &[Card]) -> bool {
    match (team(hand), majority_color(hand)) {
        (Some(team), Some(majority)) => team != majority,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::Rank;

    #[test]
    fn test_top_rank_is_soul() {
        let hand = vec![
            Card::diamond(Rank::Five),
            Card::spade(Rank::King),
            Card::diamond(Rank::Nine),
        ];
        assert_eq!(soul_index(&hand), Some(1));
        assert_eq!(team(&hand), Some(Color::Black));
    }

    #[test]
    fn test_tied_top_ranks_pick_third_card() {
        // A♦ A♠ 5♦ -> soul card is 5♦
        let hand = vec![
            Card::diamond(Rank::Ace),
            Card::spade(Rank::Ace),
            Card::diamond(Rank::Five),
        ];
        assert_eq!(soul_card(&hand), Some(Card::diamond(Rank::Five)));
        assert_eq!(team(&hand), Some(Color::Red));
    }

    #[test]
    fn test_tie_below_top_is_ignored() {
        let hand = vec![
            Card::diamond(Rank::Four),
            Card::spade(Rank::Queen),
            Card::spade(Rank::Four),
        ];
        assert_eq!(soul_card(&hand), Some(Card::spade(Rank::Queen)));
    }

    #[test]
    fn test_tied_jokers_pick_third_card() {
        let hand = vec![Card::RED_JOKER, Card::BLACK_JOKER, Card::spade(Rank::Two)];
        // 2 outranks both jokers, so no tie at the top
        assert_eq!(soul_card(&hand), Some(Card::spade(Rank::Two)));
    }

    #[test]
    fn test_majority_and_traitor() {
        // Majority red, soul card black king -> traitor
        let traitor = vec![
            Card::diamond(Rank::Three),
            Card::spade(Rank::King),
            Card::diamond(Rank::Nine),
        ];
        assert_eq!(majority_color(&traitor), Some(Color::Red));
        assert!(is_traitor(&traitor));

        // Majority red, soul card red ace -> loyal
        let loyal = vec![
            Card::diamond(Rank::Ace),
            Card::spade(Rank::King),
            Card::diamond(Rank::Nine),
        ];
        assert!(!is_traitor(&loyal));
    }

    #[test]
    fn test_empty_hand() {
        assert_eq!(soul_index(&[]), None);
        assert_eq!(team(&[]), None);
        assert!(!is_traitor(&[]));
    }
}
