//! Core primitives.
//!
//! Everything random in the game flows through the seeded generator here,
//! so a table seed is enough to reproduce its deals and turn orders.

pub mod rng;

// Re-export core types
pub use rng::{DeterministicRng, derive_table_seed};
