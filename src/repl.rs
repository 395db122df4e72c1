use std::collections::HashMap;

use anyhow::{Context, Result};
use log::debug;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::error::CompileError;
use crate::interpreter::Interpreter;
use crate::interpreter::resolver::Resolver;
use crate::parser::Parser;
use crate::scanner;

const PROMPT: &str = "> ";

/// Run the interactive REPL. Environment persists across lines.
pub fn run_repl() -> Result<()> {
    let mut editor = DefaultEditor::new().context("start line editor")?;
    let mut interpreter = Interpreter::new();

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("read REPL input"),
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        // In-memory history only.
        let _ = editor.add_history_entry(trimmed);

        let source = if is_bare_expression(trimmed) {
            format!("print {trimmed};")
        } else {
            trimmed.to_string()
        };
        eval_line(&mut interpreter, &source);
    }

    debug!("REPL session ended");
    Ok(())
}

/// Compile and run one REPL entry, reporting errors to stderr. Resolutions
/// go straight into the interpreter so earlier lines stay valid.
fn eval_line(interpreter: &mut Interpreter, source: &str) {
    let compiled = scanner::scan(source)
        .and_then(|tokens| Parser::new(tokens).parse())
        .and_then(|program| {
            Resolver::new()
                .resolve_into(&program, interpreter)
                .map(|()| program)
        });

    match compiled {
        Ok(program) => {
            if let Err(e) = interpreter.interpret(&program, HashMap::new()) {
                eprintln!("{e}");
            }
        }
        Err(errors) => report(errors, source),
    }
}

fn report(errors: Vec<CompileError>, source: &str) {
    for e in errors {
        let report = miette::Report::new(e.with_source_code("<repl>", source));
        eprintln!("{report:?}");
    }
}

/// Heuristic: treat the line as a bare expression if it doesn't end with
/// ';' or '}' and doesn't start with a keyword that begins a declaration
/// or statement.
fn is_bare_expression(line: &str) -> bool {
    if line.ends_with(';') || line.ends_with('}') {
        return false;
    }
    let first_word = line.split_whitespace().next().unwrap_or("");
    !matches!(
        first_word,
        "var" | "fun" | "class" | "if" | "while" | "for" | "print" | "return" | "{"
    )
}
