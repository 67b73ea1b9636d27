//! Strategy Sandbox: the boundary between the scheduler and strategy code.
//!
//! Every strategy, trusted or uploaded, is reached through [`MoveSelector`].
//! Uploaded code runs inside the host-controlled [`Interpreter`], receives
//! fresh copies of the board, and can only hand back a typed result.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use tracing::{info, warn};
use web_time::Instant;

use crate::board::Board;
use crate::error::{CompileError, ScriptError, StrategyFault, UploadError};
use crate::script::{self, Interpreter, Limits, Value};
use crate::types::{Player, Position};

pub const PLAYER_ENTRY_POINT: &str = "studentStrategy";
pub const ANALYSIS_ENTRY_POINT: &str = "analyzeStage";

/// Everything a strategy is shown on its turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnView<'a> {
    pub board: &'a Board,
    pub player: Player,
    /// Row-major, as produced by [`Board::legal_moves`].
    pub legal_moves: &'a [Position],
}

pub trait MoveSelector {
    /// Picks a move, or `Ok(None)` for no move. The scheduler validates
    /// whatever comes back.
    fn select_move(
        &mut self,
        view: &TurnView<'_>,
        deadline: Instant,
    ) -> Result<Option<Position>, StrategyFault>;

    /// Output captured during the last call, oldest first.
    fn drain_output(&mut self) -> Vec<String> {
        Vec::new()
    }
}

/// Shared, stateful strategy. The same handle is reused across turns and
/// games until the registry evicts it.
pub type StrategyHandle = Rc<RefCell<dyn MoveSelector>>;

/// One line a strategy printed, tagged with who printed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedLine {
    pub strategy: String,
    pub text: String,
}

/// Result of a sandboxed call plus the output it produced.
#[derive(Debug)]
pub struct Invocation {
    pub result: Result<Option<Position>, StrategyFault>,
    pub output: Vec<CapturedLine>,
}

/// Calls `handle` and collects its output whatever the outcome.
pub fn invoke(
    name: &str,
    handle: &StrategyHandle,
    view: &TurnView<'_>,
    deadline: Instant,
) -> Invocation {
    let mut selector = match handle.try_borrow_mut() {
        Ok(selector) => selector,
        Err(_) => {
            return Invocation {
                result: Err(StrategyFault::Unavailable(format!("{name} is already running"))),
                output: Vec::new(),
            };
        }
    };
    let result = selector.select_move(view, deadline);
    let output = selector
        .drain_output()
        .into_iter()
        .map(|text| CapturedLine {
            strategy: name.to_string(),
            text,
        })
        .collect();
    if let Err(fault) = &result {
        warn!(strategy = name, error = %fault, "strategy fault");
    }
    Invocation { result, output }
}

/// Emits captured lines as log events, in order.
pub fn flush_output(lines: &[CapturedLine]) {
    for line in lines {
        info!(target: "reversi_arena::script", strategy = %line.strategy, "{}", line.text);
    }
}

/// Whether `source` contains `function <name>` as text. This is a pattern
/// check, not a parse: a match inside a comment or string still counts.
pub fn defines_function(source: &str, name: &str) -> bool {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
    let mut rest = source;
    while let Some(at) = rest.find("function") {
        let before_ok = rest[..at].chars().next_back().is_none_or(|c| !is_ident(c));
        let after = &rest[at + "function".len()..];
        let trimmed = after.trim_start();
        if before_ok
            && trimmed.len() < after.len()
            && let Some(tail) = trimmed.strip_prefix(name)
            && tail.chars().next().is_none_or(|c| !is_ident(c))
        {
            return true;
        }
        rest = after;
    }
    false
}

/// Text checks applied to a strategy upload before it is compiled.
pub fn validate_strategy_upload(source: &str) -> Result<(), UploadError> {
    if !defines_function(source, PLAYER_ENTRY_POINT) {
        return Err(UploadError::MissingEntryPoint(PLAYER_ENTRY_POINT));
    }
    Ok(())
}

/// Text checks applied to an analysis upload before it is compiled.
pub fn validate_analysis_upload(source: &str) -> Result<(), UploadError> {
    if !defines_function(source, ANALYSIS_ENTRY_POINT) {
        return Err(UploadError::MissingEntryPoint(ANALYSIS_ENTRY_POINT));
    }
    if defines_function(source, PLAYER_ENTRY_POINT) {
        return Err(UploadError::ReusesPlayerEntryPoint(PLAYER_ENTRY_POINT));
    }
    Ok(())
}

/// Uploaded strategy compiled into its own interpreter.
///
/// The interpreter lives as long as the strategy, so top-level variables
/// and closures keep their values from one turn to the next.
pub struct ScriptStrategy {
    interp: Interpreter,
    entry: Value,
}

impl ScriptStrategy {
    /// Runs the top level of `source` and extracts `entry_point`.
    pub fn compile(
        source: &str,
        entry_point: &str,
        limits: Limits,
        seed: u64,
        deadline: Instant,
    ) -> Result<Self, CompileError> {
        let program = script::parse(source)?;
        let mut interp = Interpreter::new(limits, seed);
        interp.set_deadline(Some(deadline));
        let top_level = interp.run(&program);
        for line in interp.take_output() {
            info!(target: "reversi_arena::script", entry_point, "{line}");
        }
        top_level.map_err(CompileError::TopLevel)?;
        let entry = interp
            .global(entry_point)
            .filter(Value::is_callable)
            .ok_or_else(|| CompileError::MissingEntryPoint(entry_point.to_string()))?;
        Ok(Self { interp, entry })
    }

    /// Wraps a callable produced by another script run on `interp`.
    pub(crate) fn from_callable(interp: Interpreter, entry: Value) -> Self {
        Self { interp, entry }
    }
}

impl MoveSelector for ScriptStrategy {
    fn select_move(
        &mut self,
        view: &TurnView<'_>,
        deadline: Instant,
    ) -> Result<Option<Position>, StrategyFault> {
        self.interp.set_deadline(Some(deadline));
        let args = [
            board_to_value(view.board),
            Value::Number(f64::from(view.player.code())),
            moves_to_value(view.legal_moves),
            simulate_native(view.board.ignores_occlusion()),
        ];
        let entry = self.entry.clone();
        let returned = self.interp.call(&entry, &args);
        self.interp.set_deadline(None);
        parse_move(&returned?)
    }

    fn drain_output(&mut self) -> Vec<String> {
        self.interp.take_output()
    }
}

// ---- value conversion ----

/// Fresh array-of-rows copy of `board`.
pub fn board_to_value(board: &Board) -> Value {
    Value::array(
        board
            .to_rows()
            .into_iter()
            .map(|row| {
                Value::array(row.into_iter().map(|c| Value::Number(f64::from(c))).collect())
            })
            .collect(),
    )
}

pub fn board_from_value(value: &Value, ignore_occlusion: bool) -> Result<Board, ScriptError> {
    let bad = || ScriptError::Type("board must be a square array of cell codes".into());
    let Value::Array(rows) = value else {
        return Err(bad());
    };
    let rows = rows.borrow();
    let mut codes = Vec::with_capacity(rows.len() * rows.len());
    for row in rows.iter() {
        let Value::Array(cells) = row else {
            return Err(bad());
        };
        let cells = cells.borrow();
        if cells.len() != rows.len() {
            return Err(bad());
        }
        for cell in cells.iter() {
            let code = cell
                .as_index()
                .and_then(|c| u8::try_from(c).ok())
                .ok_or_else(bad)?;
            codes.push(code);
        }
    }
    Board::from_codes(&codes)
        .map(|board| board.with_ignore_occlusion(ignore_occlusion))
        .ok_or_else(bad)
}

pub fn position_to_value(pos: Position) -> Value {
    Value::object([
        ("row", Value::Number(f64::from(pos.row))),
        ("col", Value::Number(f64::from(pos.col))),
    ])
}

pub fn moves_to_value(moves: &[Position]) -> Value {
    Value::array(moves.iter().copied().map(position_to_value).collect())
}

pub fn player_from_value(value: &Value) -> Result<Player, ScriptError> {
    value
        .as_index()
        .and_then(|code| u8::try_from(code).ok())
        .and_then(Player::from_code)
        .ok_or_else(|| ScriptError::Type(format!("player must be 1 or 2, got {value}")))
}

/// Accepts `{row, col}` or `[row, col]`; `null`/`undefined` mean no move.
fn parse_move(value: &Value) -> Result<Option<Position>, StrategyFault> {
    let (row, col) = match value {
        Value::Undefined | Value::Null => return Ok(None),
        Value::Object(_) => (value.field("row"), value.field("col")),
        Value::Array(items) => {
            let items = items.borrow();
            if items.len() != 2 {
                return Err(StrategyFault::BadReturn(value.to_string()));
            }
            (items[0].clone(), items[1].clone())
        }
        other => return Err(StrategyFault::BadReturn(other.to_string())),
    };
    let coord = |v: &Value| v.as_index().and_then(|n| u8::try_from(n).ok());
    match (coord(&row), coord(&col)) {
        (Some(row), Some(col)) => Ok(Some(Position::new(row, col))),
        _ => Err(StrategyFault::BadReturn(value.to_string())),
    }
}

fn coordinate(value: &Value) -> Result<u8, ScriptError> {
    value
        .as_index()
        .and_then(|n| u8::try_from(n).ok())
        .ok_or_else(|| ScriptError::Type(format!("invalid coordinate {value}")))
}

/// `simulate(board, player, row, col)`: plays a move on a copy and returns
/// `{valid, board, flipped}`. The argument board is never touched.
pub fn simulate_native(ignore_occlusion: bool) -> Value {
    Value::native("simulate", move |_, args| {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
        let board = board_from_value(&arg(0), ignore_occlusion)?;
        let player = player_from_value(&arg(1))?;
        let row = coordinate(&arg(2))?;
        let col = coordinate(&arg(3))?;
        let result = match board.apply_move(player, row, col) {
            Some((next, flipped)) => Value::object([
                ("valid", Value::Bool(true)),
                ("board", board_to_value(&next)),
                ("flipped", Value::Number(flipped as f64)),
            ]),
            None => Value::object([
                ("valid", Value::Bool(false)),
                ("board", board_to_value(&board)),
                ("flipped", Value::Number(0.0)),
            ]),
        };
        Ok(result)
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn compile(source: &str) -> Result<ScriptStrategy, CompileError> {
        ScriptStrategy::compile(
            source,
            PLAYER_ENTRY_POINT,
            Limits::default(),
            1,
            Instant::now() + Duration::from_secs(5),
        )
    }

    fn ask(strategy: &mut ScriptStrategy, budget: Duration) -> Result<Option<Position>, StrategyFault> {
        let board = Board::new();
        let legal = board.legal_moves(Player::Black);
        let view = TurnView {
            board: &board,
            player: Player::Black,
            legal_moves: &legal,
        };
        strategy.select_move(&view, Instant::now() + budget)
    }

    #[test]
    fn compiled_strategy_returns_object_or_pair() {
        let mut first = compile(
            "function studentStrategy(board, player, moves) { return moves[moves.length - 1] }",
        )
        .unwrap();
        let mut pair = compile("function studentStrategy() { return [2, 3] }").unwrap();

        assert_eq!(ask(&mut first, Duration::from_secs(1)), Ok(Some(Position::new(5, 4))));
        assert_eq!(ask(&mut pair, Duration::from_secs(1)), Ok(Some(Position::new(2, 3))));
    }

    #[test]
    fn missing_entry_point_and_syntax_errors_are_compile_errors() {
        assert!(matches!(
            compile("function other() {}"),
            Err(CompileError::MissingEntryPoint(_))
        ));
        assert_eq!(compile("function studentStrategy( {").err().unwrap().code(), "E_SYNTAX");
        assert!(matches!(
            compile("throw 'nope'; function studentStrategy() {}"),
            Err(CompileError::TopLevel(_))
        ));
    }

    #[test]
    fn top_level_state_survives_between_turns() {
        let mut strategy = compile(
            "let calls = 0;
             function studentStrategy(board, player, moves) { calls++; return moves[calls % moves.length] }",
        )
        .unwrap();

        let first = ask(&mut strategy, Duration::from_secs(1)).unwrap();
        let second = ask(&mut strategy, Duration::from_secs(1)).unwrap();

        assert_eq!(first, Some(Position::new(3, 2)));
        assert_eq!(second, Some(Position::new(4, 5)));
    }

    #[test]
    fn faults_are_typed() {
        let mut throws = compile("function studentStrategy() { throw 'bad' }").unwrap();
        let mut garbage = compile("function studentStrategy() { return 'e4' }").unwrap();
        let mut hangs = compile("function studentStrategy() { while (true) {} }").unwrap();

        assert!(matches!(
            ask(&mut throws, Duration::from_secs(1)),
            Err(StrategyFault::Runtime(_))
        ));
        assert!(matches!(
            ask(&mut garbage, Duration::from_secs(1)),
            Err(StrategyFault::BadReturn(_))
        ));
        assert_eq!(
            ask(&mut hangs, Duration::from_millis(20)),
            Err(StrategyFault::Timeout)
        );
    }

    #[test]
    fn strategies_get_copies_and_simulate_does_not_mutate() {
        let mut strategy = compile(
            "function studentStrategy(board, player, moves, simulate) {
                 const r = simulate(board, player, 2, 3);
                 board[0][0] = 2;
                 print(r.valid, r.flipped, board[2][3], r.board[2][3]);
                 return null;
             }",
        )
        .unwrap();

        assert_eq!(ask(&mut strategy, Duration::from_secs(1)), Ok(None));
        assert_eq!(strategy.drain_output(), vec!["true 1 0 1"]);
    }

    #[test]
    fn invoke_tags_and_keeps_output_even_on_fault() {
        let strategy = compile("function studentStrategy() { console.log('thinking'); throw 'x' }")
            .unwrap();
        let handle: StrategyHandle = Rc::new(RefCell::new(strategy));
        let board = Board::new();
        let legal = board.legal_moves(Player::Black);
        let view = TurnView {
            board: &board,
            player: Player::Black,
            legal_moves: &legal,
        };

        let call = invoke("bot", &handle, &view, Instant::now() + Duration::from_secs(1));

        assert!(call.result.is_err());
        assert_eq!(
            call.output,
            vec![CapturedLine {
                strategy: "bot".into(),
                text: "thinking".into()
            }]
        );
    }

    #[test]
    fn upload_checks_are_textual() {
        assert!(defines_function("function  studentStrategy(b) {}", "studentStrategy"));
        assert!(!defines_function("function studentStrategyX() {}", "studentStrategy"));
        assert!(!defines_function("myfunction studentStrategy() {}", "studentStrategy"));
        assert!(validate_strategy_upload("const f = 1").is_err());
        assert_eq!(
            validate_analysis_upload(
                "function analyzeStage() {} function studentStrategy() {}"
            ),
            Err(UploadError::ReusesPlayerEntryPoint(PLAYER_ENTRY_POINT))
        );
        // a mention inside a comment still counts
        assert!(validate_strategy_upload("// function studentStrategy() {}").is_ok());
    }
}
