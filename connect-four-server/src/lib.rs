//! # Connect Four Game Server
//!
//! Real-time Connect Four over WebSocket, with matchmaking, a minimax bot,
//! and reconnection with forfeiture.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  CONNECT FOUR SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/            - Rules (synchronous, deterministic)       │
//! │  ├── board.rs     - Gravity grid, win and fill detection     │
//! │  ├── state.rs     - Per-match state, move application        │
//! │  └── search.rs    - Minimax bot with alpha-beta pruning      │
//! │                                                              │
//! │  network/         - Concurrency and I/O                      │
//! │  ├── protocol.rs  - JSON message types                       │
//! │  ├── transport.rs - Player connection abstraction            │
//! │  ├── session.rs   - Match sessions and live registry         │
//! │  ├── runner.rs    - Per-session task set                     │
//! │  ├── matchmaker.rs- Pairing and bot fallback                 │
//! │  ├── reconnect.rs - Suspended sessions, forfeiture timers    │
//! │  └── server.rs    - WebSocket front door, configuration      │
//! │                                                              │
//! │  ranking/         - Result sink boundary                     │
//! │  └── memory.rs    - In-memory win table and history          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Session Lifecycle
//!
//! `Active -> Over` on a win or draw. `Active -> Suspended` when a player
//! drops, then back to `Active` on reconnect or to `Over` when the
//! reconnection window lapses. Nothing leaves `Over`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;
pub mod ranking;

// Re-export commonly used types
pub use game::{Board, GameState, MoveError, MoveSearch, Seat, SessionStatus};
pub use network::{GameServer, ServerConfig};
pub use ranking::{GameRecord, MemoryResultSink, ResultSink};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
