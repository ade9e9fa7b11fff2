//! Turn Order
//!
//! The order is a permutation of the seated players fixed at deal time.
//! Rotation skips anyone with no unrevealed cards left.

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::state::PlayerId;

/// Turn order and the current position in it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnState {
    /// Fixed rotation for this deal.
    pub order: Vec<PlayerId>,
    /// Index into `order` of the player to act.
    pub current_index: usize,
}

impl TurnState {
    /// Random order over `players`, starting at the first seat.
    pub fn shuffled(mut players: Vec<PlayerId>, rng: &mut DeterministicRng) -> Self {
        rng.shuffle(&mut players);
        Self { order: players, current_index: 0 }
    }

    /// Player whose turn it is.
    pub fn current(&self) -> Option<&PlayerId> {
        self.order.get(self.current_index)
    }

    /// Move to the next player who still has an unrevealed card.
    ///
    /// Scans at most one full cycle, ending back on the current player if
    /// nobody else qualifies. If nobody at all qualifies the index is left
    /// where it was. Returns the new current player.
    pub fn advance<F>(&mut self, has_unrevealed: F) -> Option<&PlayerId>
    where
        F: Fn(&PlayerId) -> bool,
    {
        let len = self.order.len();
        if len == 0 {
            return None;
        }

        for step in 1..=len {
            let idx = (self.current_index + step) % len;
            if has_unrevealed(&self.order[idx]) {
                self.current_index = idx;
                break;
            }
        }

        self.current()
    }
}
