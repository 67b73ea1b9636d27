//! Error taxonomy. Every error exposes a stable `code()` so the browser
//! host can classify it without parsing messages.

use serde::Serialize;
use thiserror::Error;

use crate::types::Position;

/// Source location inside a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{span}: {message}")]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{span}: {message}")]
pub struct ParseError {
    pub span: Span,
    pub message: String,
}

/// Fault raised while a script runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("type error: {0}")]
    Type(String),
    #[error("reference error: {0} is not defined")]
    Reference(String),
    #[error("assignment to constant {0}")]
    ConstAssign(String),
    #[error("{0} is not a function")]
    NotCallable(String),
    #[error("uncaught: {0}")]
    Thrown(String),
    #[error("deadline exceeded")]
    Timeout,
    #[error("maximum call depth exceeded")]
    StackOverflow,
    #[error("resource limit: {0}")]
    ResourceLimit(String),
}

impl ScriptError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Type(_) => "E_TYPE",
            Self::Reference(_) => "E_REFERENCE",
            Self::ConstAssign(_) => "E_CONST",
            Self::NotCallable(_) => "E_NOT_CALLABLE",
            Self::Thrown(_) => "E_THROWN",
            Self::Timeout => "E_TIMEOUT",
            Self::StackOverflow => "E_STACK",
            Self::ResourceLimit(_) => "E_LIMIT",
        }
    }
}

/// Strategy or analysis source that could not be turned into a callable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("syntax error at {0}")]
    Lex(#[from] LexError),
    #[error("syntax error at {0}")]
    Parse(#[from] ParseError),
    #[error("entry point `{0}` is not defined as a function")]
    MissingEntryPoint(String),
    #[error("top-level evaluation failed: {0}")]
    TopLevel(ScriptError),
}

impl CompileError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Lex(_) | Self::Parse(_) => "E_SYNTAX",
            Self::MissingEntryPoint(_) => "E_ENTRY_POINT",
            Self::TopLevel(_) => "E_TOP_LEVEL",
        }
    }
}

/// What the sandbox reports to the scheduler instead of a move.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyFault {
    #[error("strategy crashed: {0}")]
    Runtime(String),
    #[error("strategy ran past its deadline")]
    Timeout,
    #[error("strategy returned an unusable value: {0}")]
    BadReturn(String),
    #[error("strategy could not be loaded: {0}")]
    Unavailable(String),
}

impl From<ScriptError> for StrategyFault {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::Timeout => Self::Timeout,
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// Upload rejected before compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("strategy name must not be empty")]
    EmptyName,
    #[error("`{0}` is a built-in name")]
    ReservedName(String),
    #[error("source must define `function {0}`")]
    MissingEntryPoint(&'static str),
    #[error("analysis source must not define `function {0}`")]
    ReusesPlayerEntryPoint(&'static str),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("analysis did not compile: {0}")]
    Compile(#[from] CompileError),
    #[error("analysis crashed: {0}")]
    Runtime(ScriptError),
    #[error("analysis exceeded {0} ms")]
    Timeout(u64),
}

impl AnalysisError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Upload(_) => "E_UPLOAD",
            Self::Compile(err) => err.code(),
            Self::Runtime(_) => "E_ANALYSIS_RUNTIME",
            Self::Timeout(_) => "E_ANALYSIS_TIMEOUT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("unknown strategy `{0}`")]
    UnknownStrategy(String),
    #[error("built-in strategy `{0}` cannot be changed")]
    BuiltinProtected(String),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownStrategy(_) => "E_UNKNOWN_STRATEGY",
            Self::BuiltinProtected(_) => "E_BUILTIN",
            Self::Upload(_) => "E_UPLOAD",
            Self::Compile(err) => err.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("stage JSON is invalid: {0}")]
    Parse(String),
    #[error("board size {0} is outside the supported range")]
    BadSize(u8),
    #[error("square {0:?} is off the board")]
    OutOfBounds(Position),
    #[error("square {0:?} is both occupied and blocked")]
    Overlap(Position),
}

/// Faults raised by the scheduler itself. These may reach the host, but
/// the live board is never left half-updated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("unknown stage `{0}`")]
    UnknownStage(String),
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("game is not running")]
    NotRunning,
    #[error("it is not a human player's turn")]
    NotHumanTurn,
    #[error("illegal move at ({}, {})", .0.row, .0.col)]
    IllegalMove(Position),
    #[error("a human seat needs input")]
    NeedsHuman,
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownStage(_) | Self::Stage(_) => "E_STAGE",
            Self::Registry(_) => "E_REGISTRY",
            Self::NotRunning => "E_NOT_RUNNING",
            Self::NotHumanTurn => "E_NOT_HUMAN_TURN",
            Self::IllegalMove(_) => "E_ILLEGAL_MOVE",
            Self::NeedsHuman => "E_NEEDS_HUMAN",
            Self::Config(_) => "E_CONFIG",
        }
    }
}

/// Anything the browser facade can report.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArenaError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ArenaError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Registry(err) => err.code(),
            Self::Analysis(err) => err.code(),
            Self::Session(err) => err.code(),
        }
    }
}
