//! # Castle Server
//!
//! Authoritative rules server for Castle, a social-deduction card game for
//! small groups with hidden team affiliation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       CASTLE SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  └── rng.rs      - Seeded Xorshift128+ PRNG, seed derivation │
//! │                                                              │
//! │  game/           - Rules engine (synchronous, no I/O)        │
//! │  ├── card.rs     - Cards and the 28-card deck                │
//! │  ├── soul.rs     - Soul card, team, traitor                  │
//! │  ├── deal.rs     - Constrained deal with bounded retries     │
//! │  ├── duel.rs     - Duel outcome and public trails            │
//! │  ├── turn.rs     - Turn rotation                             │
//! │  ├── leaders.rs  - Leader calls and results                  │
//! │  ├── state.rs    - Table state and operations                │
//! │  └── view.rs     - Public/private projections                │
//! │                                                              │
//! │  network/        - Networking (async)                        │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── registry.rs - Connection to player bindings             │
//! │  └── session.rs  - Request dispatch and fan-out              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Confidentiality
//!
//! Clients never see canonical state. Every outbound message is built from
//! a [`game::PublicView`] (same for everyone) or a [`game::PrivateView`]
//! (one player's own hand). A hidden card's face never appears in a public
//! projection.
//!
//! ## Determinism
//!
//! The `game/` modules use BTreeMap for sorted iteration and draw all
//! randomness from one seeded [`DeterministicRng`]. Given the same seed
//! and the same requests, a table deals and rotates identically.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::state::{PlayerId, PlayerState, TableConfig, TableState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
