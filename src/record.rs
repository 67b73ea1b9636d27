use serde::Serialize;

use crate::board::Board;
use crate::types::{GameResult, Player, Position};

/// One ply of history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlyRecord {
    Move {
        player: Player,
        position: Position,
        flipped: Vec<Position>,
        /// The strategy's own answer was replaced by a random legal move.
        fallback: bool,
    },
    Pass {
        player: Player,
    },
    Forfeit {
        player: Player,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TimeUsed {
    pub black: u64,
    pub white: u64,
}

/// Everything a persistence or export collaborator needs about one game.
/// `snapshots[0]` is the opening board; each ply appends the board after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub stage: String,
    pub black: String,
    pub white: String,
    pub moves: Vec<PlyRecord>,
    pub snapshots: Vec<Vec<u8>>,
    pub result: Option<GameResult>,
    pub time_used_ms: TimeUsed,
}

impl GameRecord {
    pub fn new(stage: &str, black: &str, white: &str, opening: &Board) -> Self {
        Self {
            stage: stage.to_string(),
            black: black.to_string(),
            white: white.to_string(),
            moves: Vec::new(),
            snapshots: vec![opening.to_codes()],
            result: None,
            time_used_ms: TimeUsed::default(),
        }
    }

    pub fn push(&mut self, ply: PlyRecord, after: &Board) {
        self.moves.push(ply);
        self.snapshots.push(after.to_codes());
    }

    pub fn fallback_count(&self, player: Player) -> usize {
        self.moves
            .iter()
            .filter(|ply| {
                matches!(ply, PlyRecord::Move { player: p, fallback: true, .. } if *p == player)
            })
            .count()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
