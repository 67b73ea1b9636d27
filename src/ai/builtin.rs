//! Trusted strategies that ship with the harness. They are deliberately
//! simple and never fail.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use web_time::Instant;

use crate::ai::heuristic::{SquareKind, square_kind, square_weight};
use crate::error::StrategyFault;
use crate::sandbox::{MoveSelector, TurnView};
use crate::types::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Random,
    Greedy,
    Corners,
    Positional,
}

impl BuiltinKind {
    /// Display order in strategy lists.
    pub const ALL: [Self; 4] = [Self::Random, Self::Greedy, Self::Corners, Self::Positional];

    pub fn name(self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Greedy => "greedy",
            Self::Corners => "corners",
            Self::Positional => "positional",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

pub struct BuiltinStrategy {
    kind: BuiltinKind,
    rng: Pcg64Mcg,
}

impl BuiltinStrategy {
    pub fn new(kind: BuiltinKind, seed: u64) -> Self {
        Self {
            kind,
            rng: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    pub fn kind(&self) -> BuiltinKind {
        self.kind
    }
}

impl MoveSelector for BuiltinStrategy {
    fn select_move(
        &mut self,
        view: &TurnView<'_>,
        _deadline: Instant,
    ) -> Result<Option<Position>, StrategyFault> {
        if view.legal_moves.is_empty() {
            return Ok(None);
        }
        let picked = match self.kind {
            BuiltinKind::Random => {
                view.legal_moves[self.rng.random_range(0..view.legal_moves.len())]
            }
            BuiltinKind::Greedy => best_by(view, |_, flips| flips),
            BuiltinKind::Corners => best_by(view, |pos, flips| {
                let rank = match square_kind(view.board.size(), pos.row, pos.col) {
                    SquareKind::Corner => 4,
                    SquareKind::Edge => 3,
                    SquareKind::Inner => 2,
                    SquareKind::CSquare => 1,
                    SquareKind::XSquare => 0,
                };
                rank * 1000 + flips
            }),
            BuiltinKind::Positional => best_by(view, |pos, flips| {
                square_weight(view.board.size(), pos.row, pos.col) * 1000 + flips
            }),
        };
        Ok(Some(picked))
    }
}

/// First legal move with the highest `score(pos, flips)`.
fn best_by(view: &TurnView<'_>, score: impl Fn(Position, i32) -> i32) -> Position {
    let mut best = view.legal_moves[0];
    let mut best_score = i32::MIN;
    for &pos in view.legal_moves {
        let flips = view
            .board
            .apply_move(view.player, pos.row, pos.col)
            .map_or(0, |(_, flipped)| flipped as i32);
        let s = score(pos, flips);
        if s > best_score {
            best = pos;
            best_score = s;
        }
    }
    best
}

/// Last-resort strategy: always the first legal move.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstLegalMoveSelector;

impl MoveSelector for FirstLegalMoveSelector {
    fn select_move(
        &mut self,
        view: &TurnView<'_>,
        _deadline: Instant,
    ) -> Result<Option<Position>, StrategyFault> {
        Ok(view.legal_moves.first().copied())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::board::Board;
    use crate::types::{Cell, Player};

    fn pick(selector: &mut dyn MoveSelector, board: &Board, player: Player) -> Option<Position> {
        let legal = board.legal_moves(player);
        let view = TurnView {
            board,
            player,
            legal_moves: &legal,
        };
        selector
            .select_move(&view, Instant::now() + Duration::from_secs(1))
            .unwrap()
    }

    #[test]
    fn every_builtin_picks_a_legal_move() {
        let board = Board::new();
        let legal = board.legal_moves(Player::Black);

        for kind in BuiltinKind::ALL {
            let mut strategy = BuiltinStrategy::new(kind, 9);
            let mv = pick(&mut strategy, &board, Player::Black).unwrap();
            assert!(legal.contains(&mv), "{} picked {mv:?}", kind.name());
        }
    }

    #[test]
    fn greedy_takes_the_biggest_capture() {
        let mut board = Board::empty(8);
        board.set(0, 0, Cell::Black);
        board.set(0, 1, Cell::White);
        board.set(0, 2, Cell::White);
        board.set(5, 5, Cell::Black);
        board.set(6, 5, Cell::White);

        let mv = pick(&mut BuiltinStrategy::new(BuiltinKind::Greedy, 1), &board, Player::Black);

        assert_eq!(mv, Some(Position::new(0, 3)));
    }

    #[test]
    fn corner_seeker_prefers_corners() {
        let mut board = Board::empty(8);
        board.set(7, 5, Cell::Black);
        board.set(7, 6, Cell::White);
        board.set(3, 3, Cell::Black);
        board.set(3, 4, Cell::White);
        board.set(3, 5, Cell::White);

        let corners = pick(&mut BuiltinStrategy::new(BuiltinKind::Corners, 1), &board, Player::Black);
        let positional =
            pick(&mut BuiltinStrategy::new(BuiltinKind::Positional, 1), &board, Player::Black);

        assert_eq!(corners, Some(Position::new(7, 7)));
        assert_eq!(positional, Some(Position::new(7, 7)));
    }

    #[test]
    fn no_legal_moves_means_no_move() {
        let board = Board::empty(8);

        assert_eq!(pick(&mut BuiltinStrategy::new(BuiltinKind::Random, 1), &board, Player::White), None);
        assert_eq!(pick(&mut FirstLegalMoveSelector, &board, Player::White), None);
    }

    #[test]
    fn names_round_trip() {
        for kind in BuiltinKind::ALL {
            assert_eq!(BuiltinKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(BuiltinKind::from_name("minimax"), None);
    }
}
