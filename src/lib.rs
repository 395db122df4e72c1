pub mod ast;
pub mod error;
pub mod interpreter;
pub mod parser;
pub mod repl;
pub mod scanner;

use std::collections::HashMap;

use ast::{ExprId, Program};
use interpreter::Interpreter;
use interpreter::resolver::Resolver;
use parser::Parser;

// Re-export error types for convenience
pub use error::{CompileError, RunError, RuntimeError};

/// Scan, parse and resolve `source`. Each stage reports every error it finds;
/// a failing stage stops the pipeline.
pub fn compile(source: &str) -> Result<(Program, HashMap<ExprId, usize>), Vec<CompileError>> {
    let tokens = scanner::scan(source)?;
    let program = Parser::new(tokens).parse()?;
    let locals = Resolver::new().resolve(&program)?;
    Ok((program, locals))
}

/// Compile `source` and run it on `interpreter`.
pub fn run(source: &str, interpreter: &mut Interpreter) -> Result<(), RunError> {
    let (program, locals) = compile(source)?;
    interpreter.interpret(&program, locals)?;
    Ok(())
}
