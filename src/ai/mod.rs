pub mod builtin;
pub mod heuristic;
