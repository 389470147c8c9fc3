//! Move Search
//!
//! Minimax with alpha-beta pruning for the bot seat.
//!
//! Every ply works on its own copy of the board, so the live game is never
//! touched. Leaves are scored as `heuristic(bot) - heuristic(opponent)`;
//! an immediate connect-four short-circuits a branch with [`WIN_SCORE`],
//! and a full board scores exactly zero.

use crate::game::board::{Board, Seat, CONNECT};

/// Score for a forced win found during search.
pub const WIN_SCORE: i32 = 10_000;

/// Window weights.
const FOUR_SCORE: i32 = 100;
const THREE_SCORE: i32 = 5;
const TWO_SCORE: i32 = 2;
const OPPONENT_THREE_PENALTY: i32 = 4;
const CENTER_SCORE: i32 = 3;

/// Bot move picker.
#[derive(Debug, Clone, Copy)]
pub struct MoveSearch {
    /// Seat the bot plays.
    pub bot: Seat,
    /// Plies to search.
    pub depth: u32,
}

impl MoveSearch {
    /// Create a searcher for `bot` searching `depth` plies.
    pub fn new(bot: Seat, depth: u32) -> Self {
        Self { bot, depth }
    }

    /// Best column for the bot, or `None` when no column is playable.
    ///
    /// Ties keep the lowest column. A depth of zero searches one ply.
    pub fn best_move(&self, board: &Board) -> Option<usize> {
        if board.playable_columns().is_empty() {
            return None;
        }
        let (col, _) = self.minimax(board, self.depth.max(1), i32::MIN, i32::MAX, true);
        col
    }

    fn minimax(
        &self,
        board: &Board,
        depth: u32,
        mut alpha: i32,
        mut beta: i32,
        maximizing: bool,
    ) -> (Option<usize>, i32) {
        if board.is_full() {
            return (None, 0);
        }
        if depth == 0 {
            return (None, self.evaluate(board));
        }

        let columns = board.playable_columns();
        let mut best_col = columns[0];

        if maximizing {
            let mut value = i32::MIN;
            for col in columns {
                let mut child = board.clone();
                let Ok(row) = child.place(self.bot, col) else {
                    continue;
                };
                if child.check_win(row, col, self.bot) {
                    return (Some(col), WIN_SCORE);
                }
                let (_, score) = self.minimax(&child, depth - 1, alpha, beta, false);
                if score > value {
                    value = score;
                    best_col = col;
                }
                alpha = alpha.max(value);
                if alpha >= beta {
                    break;
                }
            }
            (Some(best_col), value)
        } else {
            let opponent = self.bot.other();
            let mut value = i32::MAX;
            for col in columns {
                let mut child = board.clone();
                let Ok(row) = child.place(opponent, col) else {
                    continue;
                };
                if child.check_win(row, col, opponent) {
                    return (Some(col), -WIN_SCORE);
                }
                let (_, score) = self.minimax(&child, depth - 1, alpha, beta, true);
                if score < value {
                    value = score;
                    best_col = col;
                }
                beta = beta.min(value);
                if alpha >= beta {
                    break;
                }
            }
            (Some(best_col), value)
        }
    }

    /// Leaf score from the bot's point of view.
    pub fn evaluate(&self, board: &Board) -> i32 {
        heuristic(board, self.bot) - heuristic(board, self.bot.other())
    }
}

/// Positional score of `board` for `seat`.
pub fn heuristic(board: &Board, seat: Seat) -> i32 {
    let rows = board.rows();
    let cols = board.cols();
    let mut score = 0;

    let center = cols / 2;
    let center_count = (0..rows).filter(|&r| board.get(r, center) == Some(seat)).count() as i32;
    score += center_count * CENTER_SCORE;

    // (row step, col step, first row, last row exclusive, first col, last col exclusive)
    let span = CONNECT - 1;
    let axes: [(isize, isize, usize, usize, usize, usize); 4] = [
        (0, 1, 0, rows, 0, cols.saturating_sub(span)),
        (1, 0, 0, rows.saturating_sub(span), 0, cols),
        (1, 1, 0, rows.saturating_sub(span), 0, cols.saturating_sub(span)),
        (-1, 1, span.min(rows), rows, 0, cols.saturating_sub(span)),
    ];

    for (dr, dc, r0, r1, c0, c1) in axes {
        for r in r0..r1 {
            for c in c0..c1 {
                let mut window = [None; CONNECT];
                for (i, cell) in window.iter_mut().enumerate() {
                    let row = (r as isize + dr * i as isize) as usize;
                    let col = (c as isize + dc * i as isize) as usize;
                    *cell = board.get(row, col);
                }
                score += score_window(&window, seat);
            }
        }
    }

    score
}

fn score_window(window: &[Option<Seat>; CONNECT], seat: Seat) -> i32 {
    let own = window.iter().filter(|&&c| c == Some(seat)).count();
    let opp = window.iter().filter(|&&c| c == Some(seat.other())).count();
    let empty = CONNECT - own - opp;

    let mut score = match (own, empty) {
        (4, _) => FOUR_SCORE,
        (3, 1) => THREE_SCORE,
        (2, 2) => TWO_SCORE,
        _ => 0,
    };
    // Penalty only; there is no matching bonus for blocking.
    if opp == 3 && empty == 1 {
        score -= OPPONENT_THREE_PENALTY;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: Seat = Seat::Two;
    const HUMAN: Seat = Seat::One;

    #[test]
    fn test_empty_board_scores_zero() {
        let search = MoveSearch::new(BOT, 4);
        assert_eq!(search.evaluate(&Board::default()), 0);
    }

    #[test]
    fn test_window_scoring() {
        let mut board = Board::default();
        for col in 0..3 {
            board.place(BOT, col).unwrap();
        }
        // Bot: +5 (three) +2 (two). Human: -4 for the bot's open three.
        assert_eq!(heuristic(&board, BOT), 7);
        assert_eq!(heuristic(&board, HUMAN), -4);
        assert_eq!(MoveSearch::new(BOT, 1).evaluate(&board), 11);
    }

    #[test]
    fn test_center_preference() {
        let mut board = Board::default();
        board.place(BOT, 3).unwrap();
        assert_eq!(heuristic(&board, BOT), 3);
        assert_eq!(MoveSearch::new(BOT, 1).best_move(&Board::default()), Some(3));
    }

    #[test]
    fn test_takes_immediate_win() {
        let mut board = Board::default();
        for _ in 0..3 {
            board.place(BOT, 5).unwrap();
        }
        board.place(HUMAN, 0).unwrap();
        board.place(HUMAN, 1).unwrap();
        for depth in 1..=4 {
            assert_eq!(MoveSearch::new(BOT, depth).best_move(&board), Some(5), "depth {depth}");
        }
    }

    #[test]
    fn test_blocks_opponent_win() {
        let mut board = Board::default();
        for col in 0..3 {
            board.place(HUMAN, col).unwrap();
        }
        board.place(BOT, 0).unwrap();
        board.place(BOT, 1).unwrap();
        for depth in 2..=4 {
            assert_eq!(MoveSearch::new(BOT, depth).best_move(&board), Some(3), "depth {depth}");
        }
    }

    #[test]
    fn test_never_picks_full_column() {
        let mut board = Board::default();
        let mut seat = HUMAN;
        for col in [3, 2] {
            for _ in 0..board.rows() {
                board.place(seat, col).unwrap();
                seat = seat.other();
            }
        }
        let col = MoveSearch::new(BOT, 3).best_move(&board).unwrap();
        assert!(!board.is_column_full(col));
    }

    #[test]
    fn test_full_board_has_no_move() {
        let mut board = Board::new(4, 4);
        let order = [1, 0, 1, 0, 0, 1, 0, 1, 3, 2, 3, 2, 2, 3, 2, 3];
        for (i, col) in order.into_iter().enumerate() {
            let seat = if i % 2 == 0 { Seat::One } else { Seat::Two };
            board.place(seat, col).unwrap();
        }
        let search = MoveSearch::new(BOT, 3);
        assert_eq!(search.best_move(&board), None);
        assert_eq!(search.minimax(&board, 3, i32::MIN, i32::MAX, true), (None, 0));
    }

    #[test]
    fn test_one_column_left() {
        let mut board = Board::new(4, 4);
        // Same fill as the draw board minus the last disc in column 3.
        let order = [1, 0, 1, 0, 0, 1, 0, 1, 3, 2, 3, 2, 2, 3, 2];
        for (i, col) in order.into_iter().enumerate() {
            let seat = if i % 2 == 0 { Seat::One } else { Seat::Two };
            board.place(seat, col).unwrap();
        }
        assert_eq!(MoveSearch::new(BOT, 6).best_move(&board), Some(3));
    }
}
