//! Game State
//!
//! One match's mutable state and the turn-application algorithm.
//! Callers hold the per-session lock around every mutation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::game::board::{Board, MoveError, Seat};

/// Unique session identifier.
pub type SessionId = String;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Match in progress.
    Active,
    /// A player dropped; waiting for reconnection.
    Suspended,
    /// Terminal.
    Over,
}

/// Result of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A seat connected four.
    Win(Seat),
    /// Board filled without a winner.
    Draw,
}

/// One applied move, serialized as `column:seat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Column played.
    pub column: usize,
    /// Seat that played it.
    pub seat: Seat,
}

impl std::fmt::Display for MoveRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.column, self.seat)
    }
}

/// Mutable state of one match.
#[derive(Debug, Clone)]
pub struct GameState {
    /// Session identifier.
    pub id: SessionId,
    /// Seat 1 username.
    pub player1: String,
    /// Seat 2 username.
    pub player2: String,
    board: Board,
    turn: Seat,
    moves: Vec<MoveRecord>,
    status: SessionStatus,
    suspensions: u64,
    started_at: Instant,
}

impl GameState {
    /// Create an active game with an empty board. Seat 1 starts.
    pub fn new(
        id: SessionId,
        player1: impl Into<String>,
        player2: impl Into<String>,
        rows: usize,
        cols: usize,
    ) -> Self {
        Self {
            id,
            player1: player1.into(),
            player2: player2.into(),
            board: Board::new(rows, cols),
            turn: Seat::One,
            moves: Vec::new(),
            status: SessionStatus::Active,
            suspensions: 0,
            started_at: Instant::now(),
        }
    }

    /// Apply a move for `seat` and return the landing cell `(row, column)`.
    ///
    /// On success the move is logged and the turn passes to the other seat.
    /// Win and draw evaluation is left to the caller (see [`GameState::outcome_at`]),
    /// which must run before any other move is applied.
    pub fn apply_move(&mut self, seat: Seat, column: i32) -> Result<(usize, usize), MoveError> {
        if self.status != SessionStatus::Active {
            return Err(MoveError::SessionNotActive);
        }
        if seat != self.turn {
            return Err(MoveError::NotYourTurn);
        }
        let column = usize::try_from(column).map_err(|_| MoveError::InvalidColumn)?;

        let row = self.board.place(seat, column)?;
        self.moves.push(MoveRecord { column, seat });
        self.turn = self.turn.other();

        Ok((row, column))
    }

    /// Evaluate the disc just placed at (`row`, `column`) by `seat`.
    pub fn outcome_at(&self, row: usize, column: usize, seat: Seat) -> Option<Outcome> {
        if self.board.check_win(row, column, seat) {
            Some(Outcome::Win(seat))
        } else if self.board.is_full() {
            Some(Outcome::Draw)
        } else {
            None
        }
    }

    /// Username seated at `seat`.
    pub fn player_name(&self, seat: Seat) -> &str {
        match seat {
            Seat::One => &self.player1,
            Seat::Two => &self.player2,
        }
    }

    /// Current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Seat to move.
    pub fn turn(&self) -> Seat {
        self.turn
    }

    /// Applied moves in order.
    pub fn moves(&self) -> &[MoveRecord] {
        &self.moves
    }

    /// Lifecycle status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Whether the session has reached its terminal state.
    pub fn is_over(&self) -> bool {
        self.status == SessionStatus::Over
    }

    /// Whether the board is full.
    pub fn is_draw(&self) -> bool {
        self.board.is_full()
    }

    /// Time since the game was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// How many times the session has been suspended.
    pub fn suspensions(&self) -> u64 {
        self.suspensions
    }

    /// Active -> Suspended. Returns false if the session is not active.
    pub fn suspend(&mut self) -> bool {
        if self.status == SessionStatus::Active {
            self.status = SessionStatus::Suspended;
            self.suspensions += 1;
            true
        } else {
            false
        }
    }

    /// Suspended -> Active. Returns false if the session is not suspended.
    pub fn resume(&mut self) -> bool {
        if self.status == SessionStatus::Suspended {
            self.status = SessionStatus::Active;
            true
        } else {
            false
        }
    }

    /// Move to the terminal state. Returns false if already over.
    pub fn finish(&mut self) -> bool {
        if self.status == SessionStatus::Over {
            return false;
        }
        self.status = SessionStatus::Over;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn new_state() -> GameState {
        GameState::new("test".into(), "alice", "bob", 7, 6)
    }

    #[test]
    fn test_apply_move_flips_turn_and_logs() {
        let mut state = new_state();
        assert_eq!(state.apply_move(Seat::One, 2), Ok((6, 2)));
        assert_eq!(state.turn(), Seat::Two);
        assert_eq!(state.apply_move(Seat::Two, 2), Ok((5, 2)));
        assert_eq!(state.turn(), Seat::One);

        let log: Vec<String> = state.moves().iter().map(|m| m.to_string()).collect();
        assert_eq!(log, vec!["2:1", "2:2"]);
    }

    #[test]
    fn test_not_your_turn() {
        let mut state = new_state();
        assert_eq!(state.apply_move(Seat::Two, 0), Err(MoveError::NotYourTurn));
        assert!(state.moves().is_empty());
        assert_eq!(state.turn(), Seat::One);
    }

    #[test]
    fn test_negative_column_is_invalid() {
        let mut state = new_state();
        assert_eq!(state.apply_move(Seat::One, -1), Err(MoveError::InvalidColumn));
        assert_eq!(state.apply_move(Seat::One, 6), Err(MoveError::InvalidColumn));
        assert_eq!(state.turn(), Seat::One);
    }

    #[test]
    fn test_rejects_moves_unless_active() {
        let mut state = new_state();
        assert!(state.suspend());
        assert_eq!(state.apply_move(Seat::One, 0), Err(MoveError::SessionNotActive));
        assert!(state.resume());
        assert!(state.apply_move(Seat::One, 0).is_ok());
        assert!(state.finish());
        assert!(!state.finish());
        assert!(!state.resume());
        assert_eq!(state.apply_move(Seat::Two, 0), Err(MoveError::SessionNotActive));
    }

    #[test]
    fn test_suspensions_count_only_real_transitions() {
        let mut state = new_state();
        assert_eq!(state.suspensions(), 0);
        assert!(state.suspend());
        assert!(!state.suspend());
        assert!(state.resume());
        assert!(state.suspend());
        assert_eq!(state.suspensions(), 2);
    }

    #[test]
    fn test_vertical_win_scenario() {
        let mut state = new_state();
        for i in 0..3 {
            let (row, col) = state.apply_move(Seat::One, 3).unwrap();
            assert_eq!(state.outcome_at(row, col, Seat::One), None, "move {i}");
            let (row, col) = state.apply_move(Seat::Two, 0).unwrap();
            assert_eq!(state.outcome_at(row, col, Seat::Two), None);
        }
        let (row, col) = state.apply_move(Seat::One, 3).unwrap();
        assert_eq!((row, col), (3, 3));
        assert_eq!(state.outcome_at(row, col, Seat::One), Some(Outcome::Win(Seat::One)));
    }

    #[test]
    fn test_draw_on_last_cell() {
        // Final grid, top to bottom: 1212 / 1212 / 2121 / 2121.
        let mut state = GameState::new("draw".into(), "a", "b", 4, 4);
        let order = [1, 0, 1, 0, 0, 1, 0, 1, 3, 2, 3, 2, 2, 3, 2, 3];
        for (i, &col) in order.iter().enumerate() {
            let seat = state.turn();
            let (row, c) = state.apply_move(seat, col).unwrap();
            let outcome = state.outcome_at(row, c, seat);
            if i + 1 == order.len() {
                assert_eq!(outcome, Some(Outcome::Draw));
            } else {
                assert_eq!(outcome, None, "move {i}");
            }
        }
    }

    proptest! {
        #[test]
        fn prop_turn_parity(cols in proptest::collection::vec(0i32..6, 0..40)) {
            let mut state = new_state();
            let mut applied = 0usize;
            for col in cols {
                let seat = state.turn();
                if state.apply_move(seat, col).is_ok() {
                    applied += 1;
                }
            }
            let expected = if applied % 2 == 0 { Seat::One } else { Seat::Two };
            prop_assert_eq!(state.turn(), expected);
            prop_assert_eq!(state.moves().len(), applied);
        }
    }
}
