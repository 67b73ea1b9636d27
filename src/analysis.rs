//! Analysis Pipeline: runs an uploaded "intelligent system" once against a
//! stage and turns the function it returns into a strategy.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{info, instrument, warn};
use web_time::Instant;

use crate::ai::builtin::FirstLegalMoveSelector;
use crate::ai::heuristic::evaluate_board;
use crate::config::HarnessConfig;
use crate::error::{AnalysisError, CompileError, ScriptError};
use crate::sandbox::{
    ANALYSIS_ENTRY_POINT, CapturedLine, ScriptStrategy, StrategyHandle, board_from_value,
    board_to_value, moves_to_value, player_from_value, simulate_native, validate_analysis_upload,
};
use crate::script::{self, Interpreter, Value};
use crate::stage::StageConfig;
use crate::types::Player;

/// A strategy synthesized by an analysis run.
pub struct GeneratedStrategy {
    /// `"<system> @ <stage>"`.
    pub name: String,
    pub handle: StrategyHandle,
    /// The analysis returned something other than a function, so the
    /// first-legal-move strategy stands in.
    pub used_fallback: bool,
    pub output: Vec<CapturedLine>,
}

pub fn generated_name(system: &str, stage: &str) -> String {
    format!("{} @ {}", system.trim(), stage)
}

/// Runs `analyzeStage(stage, api)` under the analysis deadline.
///
/// Nothing is registered here; on any error the caller's registry is left
/// exactly as it was.
#[instrument(skip(source, stage, config), fields(stage = %stage.name))]
pub fn analyze(
    system: &str,
    source: &str,
    stage: &StageConfig,
    config: &HarnessConfig,
) -> Result<GeneratedStrategy, AnalysisError> {
    validate_analysis_upload(source)?;
    let program = script::parse(source)?;
    let timeout_ms = config.analysis_timeout_ms;
    let name = generated_name(system, &stage.name);

    let mut interp = Interpreter::new(config.script_limits, config.rng_seed);
    interp.set_deadline(Some(Instant::now() + config.analysis_timeout()));

    let run = interp.run(&program);
    let mut output = capture(&name, &mut interp);
    match run {
        Ok(()) => {}
        Err(ScriptError::Timeout) => return Err(AnalysisError::Timeout(timeout_ms)),
        Err(err) => return Err(CompileError::TopLevel(err).into()),
    }

    let entry = interp
        .global(ANALYSIS_ENTRY_POINT)
        .filter(Value::is_callable)
        .ok_or_else(|| CompileError::MissingEntryPoint(ANALYSIS_ENTRY_POINT.to_string()))?;

    let args = [stage_value(stage), api_value(stage.rules.ignore_occlusion)];
    let returned = interp.call(&entry, &args);
    output.extend(capture(&name, &mut interp));
    interp.set_deadline(None);
    let returned = match returned {
        Ok(value) => value,
        Err(ScriptError::Timeout) => {
            warn!(system, timeout_ms, "analysis timed out");
            return Err(AnalysisError::Timeout(timeout_ms));
        }
        Err(err) => return Err(AnalysisError::Runtime(err)),
    };

    let used_fallback = !returned.is_callable();
    let handle: StrategyHandle = if used_fallback {
        warn!(system, returned = %returned, "analysis did not return a function");
        Rc::new(RefCell::new(FirstLegalMoveSelector))
    } else {
        Rc::new(RefCell::new(ScriptStrategy::from_callable(interp, returned)))
    };
    info!(name = %name, used_fallback, "analysis produced a strategy");
    Ok(GeneratedStrategy {
        name,
        handle,
        used_fallback,
        output,
    })
}

fn capture(name: &str, interp: &mut Interpreter) -> Vec<CapturedLine> {
    interp
        .take_output()
        .into_iter()
        .map(|text| CapturedLine {
            strategy: name.to_string(),
            text,
        })
        .collect()
}

/// `{name, size, board, player, validMoves, rules}` for the opening
/// position. Black moves first.
fn stage_value(stage: &StageConfig) -> Value {
    let board = stage.initial_board();
    let player = Player::Black;
    Value::object([
        ("name", Value::string(&stage.name)),
        ("size", Value::Number(f64::from(stage.size))),
        ("board", board_to_value(&board)),
        ("player", Value::Number(f64::from(player.code()))),
        ("validMoves", moves_to_value(&board.legal_moves(player))),
        (
            "rules",
            Value::object([
                ("ignoreOcclusion", Value::Bool(stage.rules.ignore_occlusion)),
                (
                    "fewerPiecesContinue",
                    Value::Bool(stage.rules.fewer_pieces_continue),
                ),
            ]),
        ),
    ])
}

/// `{simulateMove, getValidMoves, evaluateBoard}`, scanning capture lines
/// with the stage's occlusion rule.
fn api_value(ignore_occlusion: bool) -> Value {
    let get_valid_moves = Value::native("getValidMoves", move |_, args| {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
        let board = board_from_value(&arg(0), ignore_occlusion)?;
        let player = player_from_value(&arg(1))?;
        Ok(moves_to_value(&board.legal_moves(player)))
    });
    let evaluate = Value::native("evaluateBoard", move |_, args| {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
        let board = board_from_value(&arg(0), ignore_occlusion)?;
        let player = player_from_value(&arg(1))?;
        let eval = evaluate_board(&board, player);
        Ok(Value::object([
            ("pieceScore", Value::Number(f64::from(eval.piece_score))),
            ("mobilityScore", Value::Number(f64::from(eval.mobility_score))),
            ("cornerScore", Value::Number(f64::from(eval.corner_score))),
            ("edgeScore", Value::Number(f64::from(eval.edge_score))),
            ("totalScore", Value::Number(f64::from(eval.total_score))),
        ]))
    });
    Value::object([
        ("simulateMove", simulate_native(ignore_occlusion)),
        ("getValidMoves", get_valid_moves),
        ("evaluateBoard", evaluate),
    ])
}
