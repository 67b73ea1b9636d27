//! Othello arena: stage-configurable board engine, sandboxed script
//! strategies, a turn scheduler with time budgets, and an analysis
//! pipeline that turns uploaded programs into strategies.

pub mod ai;
pub mod analysis;
pub mod board;
pub mod config;
pub mod error;
pub mod game;
pub mod harness;
pub mod observer;
pub mod record;
pub mod registry;
pub mod sandbox;
pub mod script;
pub mod stage;
pub mod tournament;
pub mod types;
pub mod wasm;

pub use board::Board;
pub use config::{HarnessConfig, Mode};
pub use error::ArenaError;
pub use game::{Controller, GameSession, Phase, StepOutcome};
pub use harness::Harness;
pub use stage::{Rules, StageConfig};
pub use types::{GameResult, GameState, Player, Position, Winner};
