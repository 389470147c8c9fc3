//! Network Layer
//!
//! Sessions, matchmaking, reconnection and the WebSocket front door.
//! This layer is **non-deterministic** - all rule checks run through `game/`.

pub mod matchmaker;
pub mod protocol;
pub mod reconnect;
pub mod runner;
pub mod server;
pub mod session;
pub mod transport;

pub use matchmaker::{Matchmaker, MatchmakerError, MatchmakerHandle, QueuedPlayer};
pub use protocol::{ClientMessage, ServerMessage};
pub use reconnect::{CachedSession, ReconnectionCache};
pub use runner::{MatchServices, SessionRunner};
pub use server::{ConfigError, GameServer, GameServerError, ServerConfig};
pub use session::{MatchSession, SessionConfig, SessionPlayer, SessionRegistry, BOT_NAME};
pub use transport::{Transport, TransportError, WsTransport};
