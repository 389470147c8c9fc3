//! Game Logic Module
//!
//! Synchronous, deterministic game rules. No I/O and no clocks beyond the
//! session start instant.
//!
//! ## Module Structure
//!
//! - `board`: Gravity grid, seats, win and fill detection
//! - `state`: Per-match state and the turn-application algorithm
//! - `search`: Minimax bot with alpha-beta pruning

pub mod board;
pub mod search;
pub mod state;

// Re-export key types
pub use board::{Board, MoveError, Seat, CONNECT, DEFAULT_COLUMNS, DEFAULT_ROWS};
pub use search::{MoveSearch, WIN_SCORE};
pub use state::{GameState, MoveRecord, Outcome, SessionId, SessionStatus};
