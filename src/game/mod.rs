//! Game Logic Module
//!
//! The rules engine. Synchronous and free of I/O; randomness comes only
//! from the table's seeded RNG.
//!
//! ## Module Structure
//!
//! - `card`: Card model and the 28-card deck
//! - `soul`: Soul card, team and traitor derivation
//! - `deal`: Constrained dealing with a bounded retry budget
//! - `duel`: Card comparison and public inference trails
//! - `turn`: Turn order and rotation
//! - `leaders`: Team leaders and leader-call results
//! - `state`: Canonical table state and every mutating operation
//! - `view`: Public and private projections
//! - `events`: Game events for logging and fan-out

pub mod card;
pub mod soul;
pub mod deal;
pub mod duel;
pub mod turn;
pub mod leaders;
pub mod state;
pub mod view;
pub mod events;

// Re-export key types
pub use card::{Back, Card, Color, Hand, Rank, Suit};
pub use deal::{DealConstraints, DealReport};
pub use duel::{DuelOutcome, DuelRecord, PublicInfo};
pub use leaders::GameResult;
pub use state::{
    ChallengeOutcome, HouseRules, HouseRulesPatch, JoinKind, Phase, PlayerId, PlayerState,
    TableConfig, TableState, ValidationError,
};
pub use view::{PrivateView, PublicView};
pub use events::GameEvent;
