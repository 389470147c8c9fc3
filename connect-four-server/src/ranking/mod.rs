//! Match Results
//!
//! Boundary to the ranking/history store. The match core only ever calls
//! [`ResultSink::record_win`] and [`ResultSink::record_game`]; failures are
//! reported back as [`SinkError`] so callers can log them and move on.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::state::MoveRecord;

pub use memory::MemoryResultSink;

/// Winner field value stored for a drawn game.
pub const DRAW_MARKER: &str = "draw";

/// Result store errors.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Store rejected or failed the write.
    #[error("result store unavailable: {0}")]
    Unavailable(String),
}

/// One finished match, as written to the history table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    /// Seat 1 username.
    pub player1: String,
    /// Seat 2 username.
    pub player2: String,
    /// Winner username, `None` for a draw.
    pub winner: Option<String>,
    /// Applied moves in order.
    pub moves: Vec<MoveRecord>,
    /// When the result was recorded.
    pub finished_at: DateTime<Utc>,
}

impl GameRecord {
    /// Build a record stamped with the current time.
    pub fn new(
        player1: impl Into<String>,
        player2: impl Into<String>,
        winner: Option<String>,
        moves: Vec<MoveRecord>,
    ) -> Self {
        Self {
            player1: player1.into(),
            player2: player2.into(),
            winner,
            moves,
            finished_at: Utc::now(),
        }
    }

    /// Winner column value: the username or [`DRAW_MARKER`].
    pub fn winner_field(&self) -> &str {
        self.winner.as_deref().unwrap_or(DRAW_MARKER)
    }

    /// Moves column value: comma-delimited `column:seat` pairs.
    pub fn moves_field(&self) -> String {
        self.moves
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A user's running win count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    /// Username.
    pub username: String,
    /// Games won.
    pub score: u32,
}

/// Where finished matches go.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Increment `username`'s win count, creating the entry if needed.
    async fn record_win(&self, username: &str) -> Result<(), SinkError>;

    /// Append a finished match to the history.
    async fn record_game(&self, record: &GameRecord) -> Result<(), SinkError>;
}
