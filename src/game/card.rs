//! Card Definitions
//!
//! The Castle deck is fixed at 28 cards: thirteen diamonds (red face,
//! red back), thirteen spades (black face, blue back) and two jokers,
//! one per back color. The deck does not depend on the player count.

use serde::{Serialize, Deserialize};

/// Number of cards in every hand after a deal.
pub const HAND_SIZE: usize = 3;

/// Number of cards in the deck.
pub const DECK_SIZE: usize = 28;

/// Most players a single deck can serve with full hands.
pub const MAX_PLAYERS: usize = DECK_SIZE / HAND_SIZE;

// =============================================================================
// RANK
// =============================================================================

/// Card rank.
///
/// Declaration order is the duel order: joker lowest, ace highest.
/// The joker's special case against face cards lives in the duel engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Rank {
    #[serde(rename = "joker")]
    Joker,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
    #[serde(rename = "A")]
    Ace,
}

impl Rank {
    /// The thirteen suited ranks, low to high.
    pub const SUITED: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];

    /// J, Q, K or A.
    #[inline]
    pub fn is_face_or_ace(self) -> bool {
        matches!(self, Rank::Jack | Rank::Queen | Rank::King | Rank::Ace)
    }

    /// Is this the joker rank.
    #[inline]
    pub fn is_joker(self) -> bool {
        self == Rank::Joker
    }

    /// Short label used on the wire and in logs.
    pub fn label(self) -> &'static str {
        match self {
            Rank::Joker => "joker",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
        }
    }
}

// =============================================================================
// SUIT / COLOR / BACK
// =============================================================================

/// Card suit. Jokers carry their own pseudo-suit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suit {
    /// Red face, red back.
    Diamonds,
    /// Black face, blue back.
    Spades,
    /// Either joker.
    Joker,
}

/// Face color. A player's team is the color of their soul card.
///
/// Red sorts before black; result tables list the red team first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    /// Red team.
    Red,
    /// Black team.
    Black,
}

impl Color {
    /// The other color.
    #[inline]
    pub fn opposite(self) -> Color {
        match self {
            Color::Red => Color::Black,
            Color::Black => Color::Red,
        }
    }
}

/// Back color, the only thing visible about an unrevealed card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Back {
    /// Diamonds and the red joker.
    Red,
    /// Spades and the black joker.
    Blue,
}

impl Back {
    /// The other back color.
    #[inline]
    pub fn opposite(self) -> Back {
        match self {
            Back::Red => Back::Blue,
            Back::Blue => Back::Red,
        }
    }
}

// =============================================================================
// CARD
// =============================================================================

/// A single immutable card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    /// Duel rank.
    pub rank: Rank,
    /// Suit (or the joker pseudo-suit).
    pub suit: Suit,
    /// Face color, decides the team when this is the soul card.
    pub color: Color,
    /// Back color, public while the card is hidden.
    pub back: Back,
}

impl Card {
    /// A red-faced, red-backed diamond.
    pub const fn diamond(rank: Rank) -> Self {
        Self { rank, suit: Suit::Diamonds, color: Color::Red, back: Back::Red }
    }

    /// A black-faced, blue-backed spade.
    pub const fn spade(rank: Rank) -> Self {
        Self { rank, suit: Suit::Spades, color: Color::Black, back: Back::Blue }
    }

    /// The red joker (red back).
    pub const RED_JOKER: Card = Card {
        rank: Rank::Joker,
        suit: Suit::Joker,
        color: Color::Red,
        back: Back::Red,
    };

    /// The black joker (blue back).
    pub const BLACK_JOKER: Card = Card {
        rank: Rank::Joker,
        suit: Suit::Joker,
        color: Color::Black,
        back: Back::Blue,
    };
}

/// A dealt hand. Index position is the card's identity for reveals and duels.
pub type Hand = Vec<Card>;

/// Build the full 28-card deck in a fixed order.
pub fn create_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(DECK_SIZE);
    deck.extend(Rank::SUITED.iter().map(|r| Card::diamond(*r)));
    deck.extend(Rank::SUITED.iter().map(|r| Card::spade(*r)));
    deck.push(Card::RED_JOKER);
    deck.push(Card::BLACK_JOKER);
    deck
}

/// Count of red and blue backs in a hand.
pub fn back_counts(hand: &[Card]) -> (usize, usize) {
    let red = hand.iter().filter(|c| c.back == Back::Red).count();
    (red, hand.len() - red)
}

/// True when the hand has exactly three cards split 2-1 by back color.
pub fn has_back_split(hand: &[Card]) -> bool {
    let (red, blue) = back_counts(hand);
    hand.len() == HAND_SIZE && red.min(blue) == 1
}
