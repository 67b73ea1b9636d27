//! Stage definitions: board size, opening layout and rule toggles.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::board::{Board, MAX_SIZE, MIN_SIZE};
use crate::error::StageError;
use crate::types::{Cell, Player, Position};

/// Rule toggles that change how a stage is played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rules {
    /// Blocked squares are transparent to capture scans.
    pub ignore_occlusion: bool,
    /// The side with strictly fewer discs takes the next turn.
    pub fewer_pieces_continue: bool,
}

/// One disc in the opening layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub row: u8,
    pub col: u8,
    pub player: Player,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    pub name: String,
    pub size: u8,
    pub placements: Vec<Placement>,
    #[serde(default)]
    pub blocked: Vec<Position>,
    #[serde(flatten)]
    pub rules: Rules,
}

impl StageConfig {
    /// Standard centre opening for an even-sized board.
    pub fn standard(name: impl Into<String>, size: u8) -> Self {
        let hi = size / 2;
        let lo = hi - 1;
        Self {
            name: name.into(),
            size,
            placements: vec![
                Placement { row: lo, col: lo, player: Player::White },
                Placement { row: lo, col: hi, player: Player::Black },
                Placement { row: hi, col: lo, player: Player::Black },
                Placement { row: hi, col: hi, player: Player::White },
            ],
            blocked: Vec::new(),
            rules: Rules::default(),
        }
    }

    pub fn with_blocked(mut self, blocked: &[(u8, u8)]) -> Self {
        self.blocked = blocked.iter().map(|&(r, c)| Position::new(r, c)).collect();
        self
    }

    pub fn with_rules(mut self, rules: Rules) -> Self {
        self.rules = rules;
        self
    }

    pub fn from_json(text: &str) -> Result<Self, StageError> {
        let stage: Self = serde_json::from_str(text).map_err(|e| StageError::Parse(e.to_string()))?;
        stage.validate()?;
        Ok(stage)
    }

    pub fn validate(&self) -> Result<(), StageError> {
        if !(MIN_SIZE..=MAX_SIZE).contains(&self.size) {
            return Err(StageError::BadSize(self.size));
        }
        let in_bounds = |row: u8, col: u8| row < self.size && col < self.size;
        for p in &self.placements {
            if !in_bounds(p.row, p.col) {
                return Err(StageError::OutOfBounds(Position::new(p.row, p.col)));
            }
        }
        for b in &self.blocked {
            if !in_bounds(b.row, b.col) {
                return Err(StageError::OutOfBounds(*b));
            }
            if self.placements.iter().any(|p| p.row == b.row && p.col == b.col) {
                return Err(StageError::Overlap(*b));
            }
        }
        Ok(())
    }

    /// Builds the opening board. Callers validate first.
    pub fn initial_board(&self) -> Board {
        let mut board = Board::empty(self.size).with_ignore_occlusion(self.rules.ignore_occlusion);
        for b in &self.blocked {
            board.set(b.row, b.col, Cell::Blocked);
        }
        for p in &self.placements {
            board.set(p.row, p.col, Cell::from(p.player));
        }
        board
    }
}

static BUILTIN_STAGES: Lazy<Vec<StageConfig>> = Lazy::new(|| {
    vec![
        StageConfig::standard("standard", 8),
        StageConfig::standard("small", 6),
        StageConfig::standard("blocked", 8).with_blocked(&[(1, 1), (1, 6), (6, 1), (6, 6)]),
        StageConfig::standard("see-through", 8)
            .with_blocked(&[(2, 2), (2, 5), (5, 2), (5, 5), (0, 3), (7, 4)])
            .with_rules(Rules {
                ignore_occlusion: true,
                fewer_pieces_continue: false,
            }),
        StageConfig::standard("underdog", 8).with_rules(Rules {
            ignore_occlusion: false,
            fewer_pieces_continue: true,
        }),
    ]
});

/// Built-in stage catalogue in display order.
pub fn builtin_stages() -> &'static [StageConfig] {
    &BUILTIN_STAGES
}

pub fn find_builtin(name: &str) -> Option<&'static StageConfig> {
    BUILTIN_STAGES.iter().find(|s| s.name == name)
}
