//! Collaborator interfaces: who gets told what while a game runs.

use serde::Serialize;

use crate::error::{AnalysisError, RegistryError, StrategyFault};
use crate::record::GameRecord;
use crate::types::{GameState, Player};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageClass {
    Info,
    Success,
    Error,
}

/// What happened, finer than [`MessageClass`], so a host can tell a crash
/// from a timeout from a bad return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Crashed,
    TimedOut,
    ReturnedGarbage,
    Rejected,
    Registered,
    Generated,
    Pass,
    Continuation,
    Forfeit,
    GameOver,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub class: MessageClass,
    pub kind: StatusKind,
    pub text: String,
}

impl StatusMessage {
    pub fn info(kind: StatusKind, text: impl Into<String>) -> Self {
        Self {
            class: MessageClass::Info,
            kind,
            text: text.into(),
        }
    }

    pub fn success(kind: StatusKind, text: impl Into<String>) -> Self {
        Self {
            class: MessageClass::Success,
            kind,
            text: text.into(),
        }
    }

    pub fn error(kind: StatusKind, text: impl Into<String>) -> Self {
        Self {
            class: MessageClass::Error,
            kind,
            text: text.into(),
        }
    }

    pub fn for_fault(strategy: &str, fault: &StrategyFault) -> Self {
        let kind = match fault {
            StrategyFault::Runtime(_) | StrategyFault::Unavailable(_) => StatusKind::Crashed,
            StrategyFault::Timeout => StatusKind::TimedOut,
            StrategyFault::BadReturn(_) => StatusKind::ReturnedGarbage,
        };
        Self::error(kind, format!("{strategy}: {fault}"))
    }

    pub fn for_analysis(system: &str, err: &AnalysisError) -> Self {
        let kind = match err {
            AnalysisError::Timeout(_) => StatusKind::TimedOut,
            AnalysisError::Runtime(_) => StatusKind::Crashed,
            AnalysisError::Upload(_) | AnalysisError::Compile(_) => StatusKind::Rejected,
        };
        Self::error(kind, format!("{system}: {err}"))
    }

    pub fn for_registry(name: &str, err: &RegistryError) -> Self {
        Self::error(StatusKind::Rejected, format!("{name}: {err}"))
    }
}

/// Rendering and persistence hooks. Every method has a no-op default.
pub trait GameObserver {
    /// Called after every applied move, pass or forfeit.
    fn on_board(&mut self, _state: &GameState) {}

    fn on_turn(&mut self, _player: Player) {}

    /// The finished game, ready for storage or export.
    fn on_game_over(&mut self, _record: &GameRecord) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl GameObserver for NullObserver {}
