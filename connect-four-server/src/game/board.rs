//! Board Model
//!
//! Fixed-size gravity grid. Row 0 is the top row, row `rows - 1` the bottom.
//! Discs always land in the lowest empty row of a column, so the occupied
//! cells of every column are contiguous from the bottom up.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of rows.
pub const DEFAULT_ROWS: usize = 7;

/// Default number of columns.
pub const DEFAULT_COLUMNS: usize = 6;

/// Discs in a row needed to win.
pub const CONNECT: usize = 4;

// =============================================================================
// SEAT
// =============================================================================

/// Fixed identity of a player within one match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Seat {
    /// Seat 1, moves first.
    One,
    /// Seat 2.
    Two,
}

impl Seat {
    /// The other seat.
    #[inline]
    pub fn other(self) -> Seat {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }

    /// Wire number (1 or 2).
    #[inline]
    pub fn number(self) -> u8 {
        match self {
            Seat::One => 1,
            Seat::Two => 2,
        }
    }

    /// Array index (0 or 1).
    #[inline]
    pub fn index(self) -> usize {
        self.number() as usize - 1
    }

    /// Parse a wire number.
    pub fn from_number(number: u8) -> Option<Seat> {
        match number {
            1 => Some(Seat::One),
            2 => Some(Seat::Two),
            _ => None,
        }
    }
}

impl From<Seat> for u8 {
    fn from(seat: Seat) -> u8 {
        seat.number()
    }
}

impl TryFrom<u8> for Seat {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Seat::from_number(value).ok_or_else(|| format!("invalid seat number {value}"))
    }
}

impl std::fmt::Display for Seat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

// =============================================================================
// MOVE ERRORS
// =============================================================================

/// Rejections for a candidate move. None of these are fatal to a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    /// Column outside the board.
    #[error("invalid column")]
    InvalidColumn,
    /// Column has no empty cell.
    #[error("column is full")]
    ColumnFull,
    /// Seat does not hold the turn.
    #[error("not your turn")]
    NotYourTurn,
    /// Session is suspended or over.
    #[error("session is not active")]
    SessionNotActive,
}

// =============================================================================
// BOARD
// =============================================================================

/// A rows x columns grid of optional seats.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    rows: usize,
    cols: usize,
    cells: Vec<Option<Seat>>,
}

impl Board {
    /// Create an empty board.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![None; rows * cols],
        }
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Cell contents. Panics on out-of-range coordinates.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<Seat> {
        self.cells[row * self.cols + col]
    }

    #[inline]
    fn set(&mut self, row: usize, col: usize, seat: Seat) {
        self.cells[row * self.cols + col] = Some(seat);
    }

    /// Whether a column has no empty cell left.
    pub fn is_column_full(&self, col: usize) -> bool {
        col >= self.cols || self.get(0, col).is_some()
    }

    /// Number of discs in a column.
    pub fn column_height(&self, col: usize) -> usize {
        (0..self.rows).filter(|&row| self.get(row, col).is_some()).count()
    }

    /// Columns that can still take a disc, in ascending order.
    pub fn playable_columns(&self) -> Vec<usize> {
        (0..self.cols).filter(|&col| !self.is_column_full(col)).collect()
    }

    /// Drop a disc into `col` and return the row it landed in.
    ///
    /// Turn order is not checked here.
    pub fn place(&mut self, seat: Seat, col: usize) -> Result<usize, MoveError> {
        if col >= self.cols {
            return Err(MoveError::InvalidColumn);
        }

        for row in (0..self.rows).rev() {
            if self.get(row, col).is_none() {
                self.set(row, col, seat);
                return Ok(row);
            }
        }

        Err(MoveError::ColumnFull)
    }

    /// Whether the disc at (`row`, `col`) completes a line of four for `seat`.
    ///
    /// Scans the four axes outward in both directions from the placed cell.
    pub fn check_win(&self, row: usize, col: usize, seat: Seat) -> bool {
        const AXES: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

        AXES.iter().any(|&(dr, dc)| {
            let count = 1
                + self.run_length(row, col, dr, dc, seat)
                + self.run_length(row, col, -dr, -dc, seat);
            count >= CONNECT
        })
    }

    /// Contiguous `seat` cells starting one step from (`row`, `col`).
    fn run_length(&self, row: usize, col: usize, dr: isize, dc: isize, seat: Seat) -> usize {
        let mut count = 0;
        let mut r = row as isize + dr;
        let mut c = col as isize + dc;
        while r >= 0
            && c >= 0
            && (r as usize) < self.rows
            && (c as usize) < self.cols
            && self.get(r as usize, c as usize) == Some(seat)
        {
            count += 1;
            r += dr;
            c += dc;
        }
        count
    }

    /// Whether every cell is occupied.
    ///
    /// Only the top row needs checking: gravity fills a column bottom-up.
    pub fn is_full(&self) -> bool {
        (0..self.cols).all(|col| self.get(0, col).is_some())
    }

    /// Row-major grid of 0 (empty), 1 and 2 for the wire.
    pub fn to_grid(&self) -> Vec<Vec<u8>> {
        (0..self.rows)
            .map(|row| {
                (0..self.cols)
                    .map(|col| self.get(row, col).map(Seat::number).unwrap_or(0))
                    .collect()
            })
            .collect()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new(DEFAULT_ROWS, DEFAULT_COLUMNS)
    }
}
