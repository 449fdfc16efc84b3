//! Core library for Sharpling, an interpreter for a subset of C#.
//! Source text flows through the lexer and segmenter into the declaration
//! extractor and statement parser, then runs against a [`Console`].

pub mod ast;
pub mod config;
pub mod console;
pub mod declarations;
pub mod diagnostics;
pub mod environment;
mod evaluator;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod segmenter;
mod stack;
pub mod stdlib;
pub mod value;

pub use config::RunConfig;
pub use console::{BufferConsole, Console, StdConsole};
pub use diagnostics::{Diagnostic, DiagnosticKind, SharplingError, SourceSpan};
pub use repl::Repl;
pub use runtime::{CallOutcome, Interpreter, RunOutcome};
pub use value::{Value, ValueKind};
