//! Network Layer
//!
//! WebSocket server and request routing for the one table.
//! All game rules run through `game/`; this layer only binds connections to
//! players, serializes access to the table and fans out projections.

pub mod protocol;
pub mod registry;
pub mod session;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ServerError, ErrorCode};
pub use registry::{ConnectionId, IdentityRegistry};
pub use session::{Delivery, TableSession, dispatch};
pub use server::{GameServer, ServerConfig, GameServerError};
