use serde::Serialize;

use crate::board::Board;
use crate::types::{Cell, Player};

const CORNER_BONUS: i32 = 100;
const EDGE_BONUS: i32 = 20;
const MOBILITY_WEIGHT: i32 = 2;

/// Fixed board heuristic exposed to analysis scripts as `evaluateBoard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardEvaluation {
    pub piece_score: i32,
    pub mobility_score: i32,
    pub corner_score: i32,
    pub edge_score: i32,
    pub total_score: i32,
}

/// Scores `board` from `player`'s point of view. Edges count at half
/// weight in the total.
pub fn evaluate_board(board: &Board, player: Player) -> BoardEvaluation {
    let count = board.count();
    let piece_score = i32::from(count.of(player)) - i32::from(count.of(player.opponent()));

    let mine = board.legal_moves(player).len() as i32;
    let theirs = board.legal_moves(player.opponent()).len() as i32;
    let mobility_score = MOBILITY_WEIGHT * (mine - theirs);

    let own = Cell::from(player);
    let mut corner_score = 0;
    let mut edge_score = 0;
    for row in 0..board.size() {
        for col in 0..board.size() {
            if board.cell(row, col) != Some(own) {
                continue;
            }
            match square_kind(board.size(), row, col) {
                SquareKind::Corner => corner_score += CORNER_BONUS,
                SquareKind::Edge | SquareKind::CSquare => edge_score += EDGE_BONUS,
                _ => {}
            }
        }
    }

    BoardEvaluation {
        piece_score,
        mobility_score,
        corner_score,
        edge_score,
        total_score: piece_score + mobility_score + corner_score + edge_score / 2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquareKind {
    Corner,
    /// Diagonal neighbour of a corner.
    XSquare,
    /// Edge neighbour of a corner.
    CSquare,
    Edge,
    Inner,
}

pub fn square_kind(size: u8, row: u8, col: u8) -> SquareKind {
    let last = size.saturating_sub(1);
    let on_edge = |v: u8| v == 0 || v == last;
    let near_edge = |v: u8| v == 1 || v + 2 == size;

    match (on_edge(row), on_edge(col)) {
        (true, true) => SquareKind::Corner,
        (true, false) if near_edge(col) => SquareKind::CSquare,
        (false, true) if near_edge(row) => SquareKind::CSquare,
        (true, false) | (false, true) => SquareKind::Edge,
        (false, false) if near_edge(row) && near_edge(col) => SquareKind::XSquare,
        (false, false) => SquareKind::Inner,
    }
}

/// Static square weight used by the positional strategy, for any board size.
pub fn square_weight(size: u8, row: u8, col: u8) -> i32 {
    match square_kind(size, row, col) {
        SquareKind::Corner => 100,
        SquareKind::XSquare => -50,
        SquareKind::CSquare => -20,
        SquareKind::Edge => 10,
        SquareKind::Inner => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_position_is_balanced() {
        let board = Board::new();

        let eval = evaluate_board(&board, Player::Black);

        assert_eq!(
            eval,
            BoardEvaluation {
                piece_score: 0,
                mobility_score: 0,
                corner_score: 0,
                edge_score: 0,
                total_score: 0,
            }
        );
    }

    #[test]
    fn corners_and_edges_are_rewarded() {
        let mut board = Board::new();
        board.set(0, 0, Cell::Black);
        board.set(0, 3, Cell::Black);

        let eval = evaluate_board(&board, Player::Black);

        assert_eq!(eval.corner_score, 100);
        assert_eq!(eval.edge_score, 20);
        assert_eq!(eval.piece_score, 2);
        assert_eq!(
            eval.total_score,
            eval.piece_score + eval.mobility_score + 100 + 10
        );
    }

    #[test]
    fn edge_cells_next_to_corners_still_count_as_edges() {
        let mut board = Board::new();
        board.set(0, 1, Cell::Black);
        board.set(6, 7, Cell::Black);
        board.set(1, 1, Cell::Black);

        let eval = evaluate_board(&board, Player::Black);

        assert_eq!(eval.edge_score, 40);
        assert_eq!(eval.corner_score, 0);
    }

    #[test]
    fn square_classes_scale_with_board_size() {
        assert_eq!(square_kind(8, 0, 0), SquareKind::Corner);
        assert_eq!(square_kind(8, 1, 1), SquareKind::XSquare);
        assert_eq!(square_kind(8, 0, 6), SquareKind::CSquare);
        assert_eq!(square_kind(8, 7, 3), SquareKind::Edge);
        assert_eq!(square_kind(8, 3, 4), SquareKind::Inner);
        assert_eq!(square_kind(6, 4, 4), SquareKind::XSquare);
        assert_eq!(square_weight(6, 5, 5), 100);
    }
}
