//! One harness instance: configuration, the strategy registry, the live
//! game and the status queue a host drains.

use tracing::{info, instrument};

use crate::analysis::analyze;
use crate::config::HarnessConfig;
use crate::error::{ArenaError, SessionError};
use crate::game::{Controller, GameSession, Phase, StepOutcome};
use crate::observer::{StatusKind, StatusMessage};
use crate::record::GameRecord;
use crate::registry::{StoredStrategy, StrategyRegistry};
use crate::sandbox::flush_output;
use crate::stage::{StageConfig, builtin_stages, find_builtin};
use crate::tournament::{Tournament, TournamentReport};
use crate::types::{GameState, Position};

pub struct Harness {
    config: HarnessConfig,
    registry: StrategyRegistry,
    session: Option<GameSession>,
    messages: Vec<StatusMessage>,
    pending_record: Option<GameRecord>,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            registry: StrategyRegistry::new(&config),
            config,
            session: None,
            messages: Vec::new(),
            pending_record: None,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn register_strategy(&mut self, name: &str, source: &str) -> Result<(), ArenaError> {
        match self.registry.register(name, source) {
            Ok(()) => {
                self.messages.push(StatusMessage::success(
                    StatusKind::Registered,
                    format!("strategy `{}` saved", name.trim()),
                ));
                Ok(())
            }
            Err(err) => {
                self.messages.push(StatusMessage::for_registry(name, &err));
                Err(err.into())
            }
        }
    }

    /// Runs the analysis once for `stage` and registers what it returns.
    /// Returns the generated strategy name.
    #[instrument(skip(self, source))]
    pub fn upload_intelligent_system(
        &mut self,
        system: &str,
        source: &str,
        stage: &str,
    ) -> Result<String, ArenaError> {
        let stage = resolve_stage(stage)?;
        let generated = match analyze(system, source, &stage, &self.config) {
            Ok(generated) => generated,
            Err(err) => {
                self.messages.push(StatusMessage::for_analysis(system, &err));
                return Err(err.into());
            }
        };
        flush_output(&generated.output);
        self.messages.extend(generated.output.iter().map(|line| {
            StatusMessage::info(StatusKind::Output, format!("[{}] {}", line.strategy, line.text))
        }));
        self.registry
            .register_generated(&generated.name, source, generated.handle)?;
        self.messages.push(if generated.used_fallback {
            StatusMessage::info(
                StatusKind::Generated,
                format!(
                    "`{}` did not return a function; using the first legal move",
                    generated.name
                ),
            )
        } else {
            StatusMessage::success(
                StatusKind::Generated,
                format!("strategy `{}` generated", generated.name),
            )
        });
        Ok(generated.name)
    }

    pub fn delete_strategy(&mut self, name: &str) -> Result<(), ArenaError> {
        self.registry.delete(name).map_err(|err| {
            self.messages.push(StatusMessage::for_registry(name, &err));
            err.into()
        })
    }

    pub fn list_strategies(&self) -> Vec<String> {
        self.registry.list()
    }

    pub fn strategy_source(&self, name: &str) -> Option<String> {
        self.registry.get(name).map(str::to_string)
    }

    pub fn export_strategies(&self) -> Vec<StoredStrategy> {
        self.registry.export()
    }

    pub fn restore(&mut self, stored: &[StoredStrategy]) -> usize {
        let skipped = self.registry.restore(stored);
        for (name, err) in &skipped {
            self.messages.push(StatusMessage::for_registry(name, err));
        }
        stored.len() - skipped.len()
    }

    /// Replaces any running game. `stage` is a built-in name or stage JSON.
    #[instrument(skip(self))]
    pub fn start_game(
        &mut self,
        stage: &str,
        black: &str,
        white: &str,
    ) -> Result<GameState, ArenaError> {
        let stage = resolve_stage(stage)?;
        let mut session = GameSession::new(
            stage,
            Controller::parse(black),
            Controller::parse(white),
            &mut self.registry,
            self.config.clone(),
        )?;
        session.start();
        let state = session.to_game_state();
        self.session = Some(session);
        self.pending_record = None;
        Ok(state)
    }

    pub fn step(&mut self) -> Result<StepOutcome, ArenaError> {
        let session = self.session.as_mut().ok_or(SessionError::NotRunning)?;
        let was_over = session.phase() == Phase::GameOver;
        let outcome = session.step();
        self.after_ply(was_over);
        Ok(outcome?)
    }

    pub fn submit_human_move(&mut self, row: u8, col: u8) -> Result<StepOutcome, ArenaError> {
        let session = self.session.as_mut().ok_or(SessionError::NotRunning)?;
        let was_over = session.phase() == Phase::GameOver;
        let outcome = session.submit_human_move(row, col);
        self.after_ply(was_over);
        Ok(outcome?)
    }

    pub fn state(&self) -> Option<GameState> {
        self.session.as_ref().map(GameSession::to_game_state)
    }

    pub fn legal_moves(&self) -> Vec<Position> {
        self.session
            .as_ref()
            .map(GameSession::legal_moves)
            .unwrap_or_default()
    }

    pub fn drain_messages(&mut self) -> Vec<StatusMessage> {
        if let Some(session) = self.session.as_mut() {
            self.messages.extend(session.drain_messages());
        }
        std::mem::take(&mut self.messages)
    }

    /// Record of the last finished game, handed out once.
    pub fn take_record(&mut self) -> Option<GameRecord> {
        self.pending_record.take()
    }

    pub fn run_tournament(
        &mut self,
        stage: &str,
        names: &[String],
    ) -> Result<TournamentReport, ArenaError> {
        let stage = resolve_stage(stage)?;
        let report = Tournament::new(&mut self.registry, &self.config).run(&stage, names)?;
        self.messages.push(StatusMessage::success(
            StatusKind::GameOver,
            format!("tournament finished after {} games", report.games.len()),
        ));
        Ok(report)
    }

    fn after_ply(&mut self, was_over: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        self.messages.extend(session.drain_messages());
        if !was_over && session.phase() == Phase::GameOver {
            info!(stage = %session.stage().name, "game record ready");
            self.pending_record = Some(session.record().clone());
        }
    }
}

/// Built-in stage by name, or a full stage definition as JSON.
pub fn resolve_stage(stage: &str) -> Result<StageConfig, SessionError> {
    if let Some(stage) = find_builtin(stage) {
        return Ok(stage.clone());
    }
    if stage.trim_start().starts_with('{') {
        return Ok(StageConfig::from_json(stage)?);
    }
    Err(SessionError::UnknownStage(stage.to_string()))
}

pub fn stages() -> Vec<StageConfig> {
    builtin_stages().to_vec()
}
