//! Turn Scheduler.
//!
//! A [`GameSession`] owns the live board and drives one game ply by ply.
//! The host calls [`GameSession::step`] repeatedly, sleeping for the
//! returned delay in between, and feeds human moves through
//! [`GameSession::submit_human_move`].

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use web_time::Instant;

use crate::board::Board;
use crate::config::HarnessConfig;
use crate::error::SessionError;
use crate::observer::{GameObserver, NullObserver, StatusKind, StatusMessage};
use crate::record::{GameRecord, PlyRecord, TimeUsed};
use crate::registry::StrategyRegistry;
use crate::sandbox::{self, StrategyHandle, TurnView};
use crate::stage::StageConfig;
use crate::types::{EndReason, GameResult, GameState, Player, Position, Winner};

/// Who plays one colour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum Controller {
    Human,
    Strategy(String),
}

impl Controller {
    /// `"human"` or a strategy name.
    pub fn parse(text: &str) -> Self {
        if text.eq_ignore_ascii_case("human") {
            Self::Human
        } else {
            Self::Strategy(text.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Human => "human",
            Self::Strategy(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Running,
    AwaitingHuman,
    GameOver,
}

/// What the host should do after a call to [`GameSession::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Call `step` again after `delay_ms`.
    Continue { delay_ms: u64 },
    /// Nothing happens until `submit_human_move`.
    AwaitingHuman { player: Player },
    GameOver { result: GameResult },
}

struct Seat {
    controller: Controller,
    handle: Option<StrategyHandle>,
    time_used: Duration,
}

pub struct GameSession {
    stage: StageConfig,
    config: HarnessConfig,
    board: Board,
    current: Player,
    seats: [Seat; 2],
    phase: Phase,
    rng: Pcg64Mcg,
    record: GameRecord,
    flipped: Vec<Position>,
    last_move: Option<Position>,
    result: Option<GameResult>,
    messages: Vec<StatusMessage>,
    observer: Box<dyn GameObserver>,
}

impl GameSession {
    /// Sets up a game. Strategy handles are resolved now, so a missing
    /// strategy is reported before anything is played.
    pub fn new(
        stage: StageConfig,
        black: Controller,
        white: Controller,
        registry: &mut StrategyRegistry,
        config: HarnessConfig,
    ) -> Result<Self, SessionError> {
        stage.validate()?;
        let board = stage.initial_board();
        let record = GameRecord::new(&stage.name, black.label(), white.label(), &board);
        let seat = |controller: Controller, registry: &mut StrategyRegistry| {
            let handle = match &controller {
                Controller::Human => None,
                Controller::Strategy(name) => Some(registry.handle(name)?),
            };
            Ok::<_, SessionError>(Seat {
                controller,
                handle,
                time_used: Duration::ZERO,
            })
        };
        let seats = [seat(black, registry)?, seat(white, registry)?];

        Ok(Self {
            rng: Pcg64Mcg::seed_from_u64(config.rng_seed),
            stage,
            config,
            board,
            current: Player::Black,
            seats,
            phase: Phase::Idle,
            record,
            flipped: Vec::new(),
            last_move: None,
            result: None,
            messages: Vec::new(),
            observer: Box::new(NullObserver),
        })
    }

    pub fn set_observer(&mut self, observer: Box<dyn GameObserver>) {
        self.observer = observer;
    }

    /// Idle -> Running.
    pub fn start(&mut self) {
        if self.phase != Phase::Idle {
            return;
        }
        self.phase = Phase::Running;
        info!(
            stage = %self.stage.name,
            black = self.seats[0].controller.label(),
            white = self.seats[1].controller.label(),
            "game started"
        );
        self.observer.on_board(&self.to_game_state());
        self.observer.on_turn(self.current);
    }

    /// Advances the game by at most one ply. Passes are taken silently
    /// inside the same call.
    #[instrument(skip(self), fields(stage = %self.stage.name))]
    pub fn step(&mut self) -> Result<StepOutcome, SessionError> {
        loop {
            match self.phase {
                Phase::Idle => return Err(SessionError::NotRunning),
                Phase::AwaitingHuman => {
                    return Ok(StepOutcome::AwaitingHuman {
                        player: self.current,
                    });
                }
                Phase::GameOver => return self.game_over_outcome(),
                Phase::Running => {}
            }

            let player = self.current;
            let legal = self.board.legal_moves(player);
            if legal.is_empty() {
                if self.board.has_legal_move(player.opponent()) {
                    self.pass(player);
                } else {
                    self.finish(EndReason::NoMoves);
                }
                continue;
            }

            let Some(handle) = self.seats[seat_index(player)].handle.clone() else {
                self.phase = Phase::AwaitingHuman;
                return Ok(StepOutcome::AwaitingHuman { player });
            };
            self.play_strategy_turn(player, &handle, &legal);
            return match self.phase {
                Phase::GameOver => self.game_over_outcome(),
                _ => Ok(StepOutcome::Continue {
                    delay_ms: self.config.ply_delay_ms(),
                }),
            };
        }
    }

    /// Applies a human move. Illegal moves are rejected without any state
    /// change.
    #[instrument(skip(self))]
    pub fn submit_human_move(&mut self, row: u8, col: u8) -> Result<StepOutcome, SessionError> {
        match self.phase {
            Phase::Idle | Phase::GameOver => return Err(SessionError::NotRunning),
            Phase::Running | Phase::AwaitingHuman => {}
        }
        let player = self.current;
        if self.seats[seat_index(player)].controller != Controller::Human {
            return Err(SessionError::NotHumanTurn);
        }
        let pos = Position::new(row, col);
        if !self.board.is_legal_move(player, row, col) {
            debug!(row, col, "human move rejected");
            return Err(SessionError::IllegalMove(pos));
        }

        self.phase = Phase::Running;
        self.apply(player, pos, false);
        match self.phase {
            Phase::GameOver => self.game_over_outcome(),
            _ => Ok(StepOutcome::Continue {
                delay_ms: self.config.ply_delay_ms(),
            }),
        }
    }

    /// Steps until the game ends. Fails if a human seat needs input.
    pub fn run_to_end(&mut self) -> Result<GameResult, SessionError> {
        self.start();
        loop {
            match self.step()? {
                StepOutcome::Continue { .. } => {}
                StepOutcome::AwaitingHuman { .. } => return Err(SessionError::NeedsHuman),
                StepOutcome::GameOver { result } => return Ok(result),
            }
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_player(&self) -> Player {
        self.current
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn stage(&self) -> &StageConfig {
        &self.stage
    }

    pub fn legal_moves(&self) -> Vec<Position> {
        if matches!(self.phase, Phase::Running | Phase::AwaitingHuman) {
            self.board.legal_moves(self.current)
        } else {
            Vec::new()
        }
    }

    pub fn time_used(&self, player: Player) -> Duration {
        self.seats[seat_index(player)].time_used
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn record(&self) -> &GameRecord {
        &self.record
    }

    pub fn drain_messages(&mut self) -> Vec<StatusMessage> {
        std::mem::take(&mut self.messages)
    }

    pub fn to_game_state(&self) -> GameState {
        let count = self.board.count();
        GameState {
            size: self.board.size(),
            board: self.board.to_codes(),
            current_player: self.current,
            black_count: count.black,
            white_count: count.white,
            is_running: matches!(self.phase, Phase::Running | Phase::AwaitingHuman),
            is_game_over: self.phase == Phase::GameOver,
            awaiting_human: self.phase == Phase::AwaitingHuman,
            black_time_ms: millis(self.seats[0].time_used),
            white_time_ms: millis(self.seats[1].time_used),
            flipped: self.flipped.clone(),
            last_move: self.last_move,
        }
    }

    fn play_strategy_turn(&mut self, player: Player, handle: &StrategyHandle, legal: &[Position]) {
        let idx = seat_index(player);
        let name = self.seats[idx].controller.label().to_string();
        let budget = self.config.time_budget();
        let remaining = budget.saturating_sub(self.seats[idx].time_used);

        let started = Instant::now();
        let view = TurnView {
            board: &self.board,
            player,
            legal_moves: legal,
        };
        let call = sandbox::invoke(&name, handle, &view, started + remaining);
        self.seats[idx].time_used += started.elapsed();

        sandbox::flush_output(&call.output);
        self.messages.extend(call.output.iter().map(|line| {
            StatusMessage::info(StatusKind::Output, format!("[{}] {}", line.strategy, line.text))
        }));

        let chosen = match call.result {
            Ok(Some(pos)) if legal.contains(&pos) => Some(pos),
            Ok(Some(pos)) => {
                self.messages.push(StatusMessage::error(
                    StatusKind::ReturnedGarbage,
                    format!("{name}: illegal move ({}, {})", pos.row, pos.col),
                ));
                None
            }
            Ok(None) => {
                self.messages.push(StatusMessage::error(
                    StatusKind::ReturnedGarbage,
                    format!("{name}: no move returned"),
                ));
                None
            }
            Err(fault) => {
                self.messages.push(StatusMessage::for_fault(&name, &fault));
                None
            }
        };

        let (pos, fallback) = match chosen {
            Some(pos) => (pos, false),
            None => {
                self.seats[idx].time_used += self.config.fallback_penalty();
                let pick = legal[self.rng.random_range(0..legal.len())];
                warn!(strategy = %name, row = pick.row, col = pick.col, "fallback move");
                (pick, true)
            }
        };

        if self.seats[idx].time_used > budget {
            self.forfeit(player);
            return;
        }
        self.apply(player, pos, fallback);
    }

    fn apply(&mut self, player: Player, pos: Position, fallback: bool) {
        let flipped = self.board.place(player, pos.row, pos.col);
        debug!(
            player = player.label(),
            row = pos.row,
            col = pos.col,
            flipped = flipped.len(),
            fallback,
            "move applied"
        );
        self.record.push(
            PlyRecord::Move {
                player,
                position: pos,
                flipped: flipped.clone(),
                fallback,
            },
            &self.board,
        );
        self.flipped = flipped;
        self.last_move = Some(pos);
        self.observer.on_board(&self.to_game_state());

        if !self.board.has_legal_move(Player::Black) && !self.board.has_legal_move(Player::White) {
            self.finish(EndReason::NoMoves);
            return;
        }

        let next = self
            .board
            .next_player(player, self.stage.rules.fewer_pieces_continue);
        if next == player {
            self.messages.push(StatusMessage::info(
                StatusKind::Continuation,
                format!("{} has fewer discs and moves again", player.label()),
            ));
        }
        self.current = next;
        self.observer.on_turn(next);
    }

    fn pass(&mut self, player: Player) {
        debug!(player = player.label(), "pass");
        self.record.push(PlyRecord::Pass { player }, &self.board);
        self.flipped.clear();
        self.messages.push(StatusMessage::info(
            StatusKind::Pass,
            format!("{} has no legal move and passes", player.label()),
        ));
        self.current = player.opponent();
        self.observer.on_turn(self.current);
    }

    /// The offender's discs and every empty square go to the opponent.
    fn forfeit(&mut self, player: Player) {
        let winner = player.opponent();
        self.board.forfeit_to(winner);
        self.record.push(PlyRecord::Forfeit { player }, &self.board);
        self.flipped.clear();
        self.messages.push(StatusMessage::error(
            StatusKind::Forfeit,
            format!(
                "{} exceeded the {} ms budget and forfeits",
                player.label(),
                self.config.time_budget_ms
            ),
        ));
        self.finish(EndReason::TimeForfeit(player));
    }

    fn finish(&mut self, reason: EndReason) {
        let count = self.board.count();
        let winner = match reason {
            EndReason::NoMoves => Winner::from_counts(count),
            EndReason::TimeForfeit(Player::Black) => Winner::White,
            EndReason::TimeForfeit(Player::White) => Winner::Black,
        };
        let result = GameResult {
            winner,
            black_count: count.black,
            white_count: count.white,
            reason,
        };
        self.result = Some(result);
        self.phase = Phase::GameOver;
        self.record.result = Some(result);
        self.record.time_used_ms = TimeUsed {
            black: millis(self.seats[0].time_used),
            white: millis(self.seats[1].time_used),
        };
        info!(
            ?winner,
            black = count.black,
            white = count.white,
            "game over"
        );
        self.messages.push(StatusMessage::success(
            StatusKind::GameOver,
            format!(
                "game over: {} ({} black, {} white)",
                winner_label(winner),
                count.black,
                count.white
            ),
        ));
        self.observer.on_board(&self.to_game_state());
        self.observer.on_game_over(&self.record);
    }

    fn game_over_outcome(&self) -> Result<StepOutcome, SessionError> {
        self.result
            .map(|result| StepOutcome::GameOver { result })
            .ok_or(SessionError::NotRunning)
    }

    #[cfg(test)]
    fn set_board_for_test(&mut self, board: Board, current: Player) {
        self.board = board;
        self.current = current;
        self.phase = Phase::Running;
        self.flipped.clear();
    }
}

fn seat_index(player: Player) -> usize {
    match player {
        Player::Black => 0,
        Player::White => 1,
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn winner_label(winner: Winner) -> &'static str {
    match winner {
        Winner::Black => "black wins",
        Winner::White => "white wins",
        Winner::Draw => "draw",
    }
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("stage", &self.stage.name)
            .field("phase", &self.phase)
            .field("current", &self.current)
            .field("black", &self.seats[0].controller)
            .field("white", &self.seats[1].controller)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::stage::find_builtin;
    use crate::types::Cell;

    fn stage(name: &str) -> StageConfig {
        find_builtin(name).unwrap().clone()
    }

    fn config(budget_ms: u64) -> HarnessConfig {
        HarnessConfig {
            time_budget_ms: budget_ms,
            ..HarnessConfig::default()
        }
    }

    fn session(
        stage_name: &str,
        black: &str,
        white: &str,
        registry: &mut StrategyRegistry,
        config: HarnessConfig,
    ) -> GameSession {
        let mut game = GameSession::new(
            stage(stage_name),
            Controller::parse(black),
            Controller::parse(white),
            registry,
            config,
        )
        .unwrap();
        game.start();
        game
    }

    /// Black holds b1 and White every other square except a1, so only
    /// White can move.
    fn black_must_pass() -> Board {
        let mut board = Board::empty(8);
        for row in 0..8 {
            for col in 0..8 {
                board.set(row, col, Cell::White);
            }
        }
        board.set(0, 0, Cell::Empty);
        board.set(0, 1, Cell::Black);
        board
    }

    #[test]
    fn initial_state_is_correct() {
        let mut registry = StrategyRegistry::new(&HarnessConfig::default());
        let game = session("standard", "human", "greedy", &mut registry, config(10_000));
        let state = game.to_game_state();

        assert_eq!(state.current_player, Player::Black);
        assert_eq!(state.black_count, 2);
        assert_eq!(state.white_count, 2);
        assert!(state.is_running);
        assert!(!state.is_game_over);
        assert!(state.flipped.is_empty());
        assert_eq!(game.legal_moves().len(), 4);
    }

    #[test]
    fn step_before_start_is_rejected() {
        let mut registry = StrategyRegistry::new(&HarnessConfig::default());
        let mut game = GameSession::new(
            stage("standard"),
            Controller::parse("random"),
            Controller::parse("random"),
            &mut registry,
            HarnessConfig::default(),
        )
        .unwrap();

        assert_eq!(game.step(), Err(SessionError::NotRunning));
    }

    #[test]
    fn unknown_strategy_fails_at_setup() {
        let mut registry = StrategyRegistry::new(&HarnessConfig::default());

        let err = GameSession::new(
            stage("standard"),
            Controller::parse("ghost"),
            Controller::Human,
            &mut registry,
            HarnessConfig::default(),
        )
        .unwrap_err();

        assert_eq!(err.code(), "E_REGISTRY");
    }

    #[test]
    fn builtins_play_a_full_game() {
        let mut registry = StrategyRegistry::new(&HarnessConfig::default());
        let mut game = session("standard", "greedy", "random", &mut registry, config(10_000));

        let result = game.run_to_end().unwrap();
        let record = game.record();

        assert_eq!(result.reason, EndReason::NoMoves);
        assert_eq!(result.winner, Winner::from_counts(game.board().count()));
        assert_eq!(record.snapshots.len(), record.moves.len() + 1);
        assert_eq!(record.result, Some(result));
        assert!(game.legal_moves().is_empty());
        assert!(matches!(game.step(), Ok(StepOutcome::GameOver { .. })));
    }

    #[test]
    fn pass_switches_turn_without_consuming_time() {
        let mut registry = StrategyRegistry::new(&HarnessConfig::default());
        let mut game = session("standard", "random", "random", &mut registry, config(10_000));
        game.set_board_for_test(black_must_pass(), Player::Black);

        let outcome = game.step().unwrap();

        assert_eq!(outcome, StepOutcome::GameOver {
            result: game.result().unwrap()
        });
        assert!(matches!(game.record().moves[0], PlyRecord::Pass { player: Player::Black }));
        assert!(matches!(
            game.record().moves[1],
            PlyRecord::Move { player: Player::White, .. }
        ));
        assert_eq!(game.time_used(Player::Black), Duration::ZERO);
        assert!(
            game.drain_messages()
                .iter()
                .any(|m| m.kind == StatusKind::Pass)
        );
    }

    #[test]
    fn both_sides_stuck_ends_by_count() {
        let mut registry = StrategyRegistry::new(&HarnessConfig::default());
        let mut game = session("standard", "random", "random", &mut registry, config(10_000));
        let mut board = Board::empty(8);
        board.set(0, 0, Cell::Black);
        board.set(7, 7, Cell::White);
        board.set(7, 6, Cell::White);
        game.set_board_for_test(board, Player::Black);

        let result = match game.step().unwrap() {
            StepOutcome::GameOver { result } => result,
            other => panic!("unexpected {other:?}"),
        };

        assert_eq!(result.winner, Winner::White);
        assert_eq!(result.reason, EndReason::NoMoves);
        assert_eq!((result.black_count, result.white_count), (1, 2));
    }

    #[test]
    fn illegal_return_is_replaced_once_and_penalised() {
        let mut registry = StrategyRegistry::new(&HarnessConfig::default());
        registry
            .register("corner", "function studentStrategy() { return {row: 0, col: 0} }")
            .unwrap();
        let mut game = session("standard", "corner", "random", &mut registry, config(10_000));

        game.step().unwrap();

        let legal = Board::new().legal_moves(Player::Black);
        match &game.record().moves[..] {
            [PlyRecord::Move { position, fallback: true, .. }] => assert!(legal.contains(position)),
            other => panic!("unexpected history {other:?}"),
        }
        assert!(game.time_used(Player::Black) >= Duration::from_millis(100));
        assert_eq!(game.board().count().black, 4);
        assert!(
            game.drain_messages()
                .iter()
                .any(|m| m.kind == StatusKind::ReturnedGarbage)
        );
    }

    #[test]
    fn hung_strategy_forfeits_within_budget_plus_overhead() {
        let mut registry = StrategyRegistry::new(&HarnessConfig::default());
        registry
            .register("hang", "function studentStrategy() { while (true) {} }")
            .unwrap();
        let mut game = session("blocked", "hang", "greedy", &mut registry, config(50));

        let started = Instant::now();
        let outcome = game.step().unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        let StepOutcome::GameOver { result } = outcome else {
            panic!("expected forfeit, got {outcome:?}");
        };
        assert_eq!(result.reason, EndReason::TimeForfeit(Player::Black));
        assert_eq!(result.winner, Winner::White);
        assert_eq!(result.black_count, 0);
        assert_eq!(result.white_count, 60);
        assert!(game.time_used(Player::Black) > Duration::from_millis(50));
        let kinds: Vec<_> = game.drain_messages().iter().map(|m| m.kind).collect();
        assert!(kinds.contains(&StatusKind::TimedOut));
        assert!(kinds.contains(&StatusKind::Forfeit));
    }

    #[test]
    fn human_moves_are_validated() {
        let mut registry = StrategyRegistry::new(&HarnessConfig::default());
        let mut game = session("standard", "human", "greedy", &mut registry, config(10_000));

        assert_eq!(
            game.step(),
            Ok(StepOutcome::AwaitingHuman {
                player: Player::Black
            })
        );
        let before = game.to_game_state();
        assert_eq!(
            game.submit_human_move(0, 0),
            Err(SessionError::IllegalMove(Position::new(0, 0)))
        );
        assert_eq!(game.to_game_state(), before);

        game.submit_human_move(2, 3).unwrap();
        assert_eq!(game.current_player(), Player::White);
        assert_eq!(game.submit_human_move(2, 2), Err(SessionError::NotHumanTurn));
        assert!(matches!(game.step(), Ok(StepOutcome::Continue { .. })));
        assert_eq!(game.current_player(), Player::Black);
        assert_eq!(game.time_used(Player::Black), Duration::ZERO);
    }

    #[test]
    fn fewer_pieces_continue_keeps_the_turn() {
        let mut registry = StrategyRegistry::new(&HarnessConfig::default());
        let mut game = session("underdog", "human", "human", &mut registry, config(10_000));
        let mut board = Board::empty(8);
        // Black captures one disc but stays behind, 4 to 5.
        board.set(0, 0, Cell::Black);
        board.set(0, 1, Cell::White);
        board.set(3, 6, Cell::White);
        board.set(4, 6, Cell::White);
        board.set(5, 5, Cell::White);
        board.set(5, 6, Cell::White);
        board.set(6, 5, Cell::White);
        board.set(6, 6, Cell::Black);
        game.set_board_for_test(board, Player::Black);

        game.submit_human_move(0, 2).unwrap();

        assert_eq!(game.board().count().black, 4);
        assert_eq!(game.board().count().white, 5);
        assert_eq!(game.current_player(), Player::Black);
        assert!(
            game.drain_messages()
                .iter()
                .any(|m| m.kind == StatusKind::Continuation)
        );
    }

    #[test]
    fn observer_sees_every_board_and_the_final_record() {
        #[derive(Default)]
        struct Counting {
            boards: usize,
            finished: Option<usize>,
        }
        struct Shared(Rc<RefCell<Counting>>);
        impl GameObserver for Shared {
            fn on_board(&mut self, _state: &GameState) {
                self.0.borrow_mut().boards += 1;
            }
            fn on_game_over(&mut self, record: &GameRecord) {
                self.0.borrow_mut().finished = Some(record.moves.len());
            }
        }

        let seen = Rc::new(RefCell::new(Counting::default()));
        let mut registry = StrategyRegistry::new(&HarnessConfig::default());
        let mut game = GameSession::new(
            stage("small"),
            Controller::parse("greedy"),
            Controller::parse("corners"),
            &mut registry,
            config(10_000),
        )
        .unwrap();
        game.set_observer(Box::new(Shared(Rc::clone(&seen))));

        game.run_to_end().unwrap();

        let seen = seen.borrow();
        let plies = game.record().moves.len();
        assert_eq!(seen.finished, Some(plies));
        assert!(seen.boards >= plies);
    }

    #[test]
    fn same_strategy_can_play_both_colours() {
        let mut registry = StrategyRegistry::new(&HarnessConfig::default());
        let a = registry.handle("positional").unwrap();
        let b = registry.handle("positional").unwrap();
        let mut game = session("small", "positional", "positional", &mut registry, config(10_000));

        assert!(Rc::ptr_eq(&a, &b));
        assert!(game.run_to_end().is_ok());
    }
}
