//! A small JavaScript-flavoured language evaluated entirely by the host.
//!
//! Uploaded strategies are parsed into an AST and walked by [`Interpreter`],
//! which can stop a script at any step once its deadline passes.

pub mod ast;
mod builtins;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod value;

pub use interp::{Interpreter, Limits};
pub use value::Value;

use crate::error::CompileError;

/// Lexes and parses `source` into a program.
pub fn parse(source: &str) -> Result<ast::Program, CompileError> {
    let tokens = lexer::Lexer::tokenize(source)?;
    Ok(parser::Parser::parse(tokens)?)
}
