use std::time::Duration;

use reversi_arena::board::Board;
use reversi_arena::config::HarnessConfig;
use reversi_arena::error::SessionError;
use reversi_arena::game::{Controller, GameSession, StepOutcome};
use reversi_arena::registry::StrategyRegistry;
use reversi_arena::stage::{StageConfig, find_builtin};
use reversi_arena::types::{Cell, EndReason, Player, Position, Winner};
use web_time::Instant;

fn strategy(name: &str) -> Controller {
    Controller::Strategy(name.to_string())
}

fn session(
    stage: &str,
    black: Controller,
    white: Controller,
    registry: &mut StrategyRegistry,
    config: HarnessConfig,
) -> GameSession {
    let stage = find_builtin(stage).unwrap().clone();
    GameSession::new(stage, black, white, registry, config).unwrap()
}

#[test]
fn standard_opening_has_four_moves() {
    let board = find_builtin("standard").unwrap().initial_board();

    assert_eq!(
        board.legal_moves(Player::Black),
        vec![
            Position::new(2, 3),
            Position::new(3, 2),
            Position::new(4, 5),
            Position::new(5, 4),
        ]
    );
}

#[test]
fn see_through_blocks_do_not_stop_captures() {
    let mut opaque = Board::empty(5);
    opaque.set(0, 0, Cell::Black);
    opaque.set(0, 1, Cell::White);
    opaque.set(0, 2, Cell::Blocked);
    opaque.set(0, 3, Cell::White);
    let mut see_through = opaque.clone().with_ignore_occlusion(true);

    assert!(!opaque.is_legal_move(Player::Black, 0, 4));
    assert!(opaque.apply_move(Player::Black, 0, 4).is_none());

    let flipped = see_through.place(Player::Black, 0, 4);

    assert_eq!(flipped, vec![Position::new(0, 3), Position::new(0, 1)]);
    assert_eq!(see_through.cell(0, 1), Some(Cell::Black));
    assert_eq!(see_through.cell(0, 2), Some(Cell::Blocked));
    assert_eq!(see_through.cell(0, 3), Some(Cell::Black));
}

#[test]
fn game_ends_when_neither_side_can_move() {
    let stage = StageConfig::from_json(
        r#"{"name":"stuck","size":4,"placements":[
            {"row":0,"col":0,"player":"black"},
            {"row":3,"col":3,"player":"white"}]}"#,
    )
    .unwrap();
    let mut registry = StrategyRegistry::new(&HarnessConfig::default());
    let mut game = GameSession::new(
        stage,
        strategy("greedy"),
        strategy("random"),
        &mut registry,
        HarnessConfig::default(),
    )
    .unwrap();

    let result = game.run_to_end().unwrap();

    assert_eq!(result.reason, EndReason::NoMoves);
    assert_eq!(result.winner, Winner::Draw);
    assert_eq!((result.black_count, result.white_count), (1, 1));
    assert!(game.record().moves.is_empty());
}

#[test]
fn hung_strategy_is_cut_off_and_forfeits() {
    let mut registry = StrategyRegistry::new(&HarnessConfig::default());
    registry
        .register("sleepy", "function studentStrategy() { while (true) {} }")
        .unwrap();
    let config = HarnessConfig {
        time_budget_ms: 50,
        ..HarnessConfig::default()
    };
    let mut game = session("standard", strategy("sleepy"), strategy("greedy"), &mut registry, config);

    let started = Instant::now();
    let result = game.run_to_end().unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.reason, EndReason::TimeForfeit(Player::Black));
    assert_eq!(result.winner, Winner::White);
    assert_eq!((result.black_count, result.white_count), (0, 64));
    assert!(game.time_used(Player::Black) > Duration::from_millis(50));
}

#[test]
fn strategy_stuck_in_sorting_is_cut_off() {
    let mut registry = StrategyRegistry::new(&HarnessConfig::default());
    registry
        .register(
            "sorter",
            "function studentStrategy(board, player, moves) {
                const a = [];
                for (let i = 30000; i > 0; i--) a.push(i);
                for (let k = 0; k < 50; k++) a.slice().sort();
                return moves[0];
            }",
        )
        .unwrap();
    let config = HarnessConfig {
        time_budget_ms: 50,
        ..HarnessConfig::default()
    };
    let mut game = session("standard", strategy("sorter"), strategy("greedy"), &mut registry, config);

    let started = Instant::now();
    let result = game.run_to_end().unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.reason, EndReason::TimeForfeit(Player::Black));
    assert_eq!(result.winner, Winner::White);
}

#[test]
fn illegal_answer_is_replaced_and_penalised() {
    let mut registry = StrategyRegistry::new(&HarnessConfig::default());
    registry
        .register("corner-dreamer", "function studentStrategy() { return {row: 0, col: 0} }")
        .unwrap();
    let mut game = session(
        "standard",
        strategy("corner-dreamer"),
        Controller::Human,
        &mut registry,
        HarnessConfig::default(),
    );
    game.start();

    let outcome = game.step().unwrap();

    assert!(matches!(outcome, StepOutcome::Continue { .. }));
    assert_eq!(game.record().fallback_count(Player::Black), 1);
    assert!(game.time_used(Player::Black) >= Duration::from_millis(100));
    let counts = game.to_game_state();
    assert_eq!((counts.black_count, counts.white_count), (4, 1));
    assert_eq!(game.current_player(), Player::White);
}

#[test]
fn fewer_pieces_side_keeps_the_turn() {
    let mut registry = StrategyRegistry::new(&HarnessConfig::default());
    let mut game = session(
        "underdog",
        Controller::Human,
        Controller::Human,
        &mut registry,
        HarnessConfig::default(),
    );
    game.start();

    game.submit_human_move(2, 3).unwrap();
    assert_eq!(game.current_player(), Player::White);

    game.submit_human_move(2, 2).unwrap();
    let state = game.to_game_state();
    assert_eq!((state.black_count, state.white_count), (3, 3));
    assert_eq!(game.current_player(), Player::Black);

    let mut behind = Board::from_codes(&[
        1, 2, 0, 0, //
        2, 2, 0, 0, //
        0, 0, 0, 0, //
        2, 2, 2, 2,
    ])
    .unwrap();
    behind.place(Player::Black, 0, 2);
    assert_eq!(behind.next_player(Player::Black, true), Player::Black);
    assert_eq!(behind.next_player(Player::Black, false), Player::White);
}

#[test]
fn legal_list_agrees_with_point_checks_through_a_game() {
    let mut board = find_builtin("blocked").unwrap().initial_board();
    let mut player = Player::Black;

    for _ in 0..40 {
        let legal = board.legal_moves(player);
        let mut scanned = Vec::new();
        for row in 0..board.size() {
            for col in 0..board.size() {
                if board.is_legal_move(player, row, col) {
                    scanned.push(Position::new(row, col));
                }
            }
        }
        assert_eq!(legal, scanned);
        assert_eq!(board.has_legal_move(player), !legal.is_empty());

        match legal.last() {
            Some(pos) => {
                assert!(!board.place(player, pos.row, pos.col).is_empty());
            }
            None if !board.has_legal_move(player.opponent()) => break,
            None => {}
        }
        player = player.opponent();
    }
}

#[test]
fn illegal_moves_change_nothing() {
    let mut board = Board::new();
    let before = board.clone();

    assert!(board.place(Player::Black, 3, 3).is_empty());
    assert!(board.place(Player::Black, 0, 0).is_empty());
    assert!(board.place(Player::Black, 9, 9).is_empty());
    assert!(board.apply_move(Player::White, 2, 3).is_none());
    assert_eq!(board, before);

    let mut registry = StrategyRegistry::new(&HarnessConfig::default());
    let mut game = session(
        "standard",
        Controller::Human,
        strategy("greedy"),
        &mut registry,
        HarnessConfig::default(),
    );
    game.start();
    let state = game.to_game_state();

    assert_eq!(
        game.submit_human_move(0, 0),
        Err(SessionError::IllegalMove(Position::new(0, 0)))
    );
    assert_eq!(game.to_game_state(), state);
}

#[test]
fn a_move_never_costs_the_mover_discs() {
    let mut board = find_builtin("see-through").unwrap().initial_board();
    let mut player = Player::Black;

    while let Some(&pos) = board.legal_moves(player).first() {
        let before = board.count();
        let (next, flipped) = board.apply_move(player, pos.row, pos.col).unwrap();
        let after = next.count();

        assert_eq!(after.of(player), before.of(player) + 1 + flipped as u16);
        assert_eq!(after.of(player.opponent()), before.of(player.opponent()) - flipped as u16);
        board = next;
        player = player.opponent();
    }
}
