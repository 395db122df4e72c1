use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use log::{LevelFilter, debug};

use tiny_lang::ast::printer;
use tiny_lang::error::{CompileError, RunError};
use tiny_lang::interpreter::Interpreter;
use tiny_lang::parser::Parser as TinyParser;
use tiny_lang::scanner;

/// Exit status for bad command-line usage.
const EX_USAGE: u8 = 64;
/// Exit status for malformed input: scan, syntax and resolution errors.
const EX_DATAERR: u8 = 65;
/// Exit status for an input file that can't be read.
const EX_NOINPUT: u8 = 66;
/// Exit status for runtime errors.
const EX_SOFTWARE: u8 = 70;

#[derive(Parser, Debug)]
#[command(name = "tl", version, about = "Interpreter for the tiny scripting language")]
struct Cli {
    /// Source file to run (omit for REPL)
    file: Option<PathBuf>,

    /// Dump tokens and exit
    #[arg(long, requires = "file")]
    dump_tokens: bool,

    /// Dump AST and exit
    #[arg(long, requires = "file")]
    dump_ast: bool,

    /// AST output format
    #[arg(long, value_enum, default_value_t = AstFormat::Sexp)]
    ast_format: AstFormat,

    /// Log more (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AstFormat {
    Sexp,
    Json,
}

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read source file '{}'", path.display()))
}

fn report_compile_errors(errors: Vec<CompileError>, name: &str, source: &str) -> ExitCode {
    for e in errors {
        let report = miette::Report::new(e.with_source_code(name, source));
        eprintln!("{report:?}");
    }
    ExitCode::from(EX_DATAERR)
}

fn dump_tokens(name: &str, source: &str) -> ExitCode {
    match scanner::scan(source) {
        Ok(tokens) => {
            for token in &tokens {
                println!("{token}");
            }
            ExitCode::SUCCESS
        }
        Err(errors) => report_compile_errors(errors, name, source),
    }
}

fn dump_ast(name: &str, source: &str, format: AstFormat) -> Result<ExitCode> {
    let parsed = scanner::scan(source).and_then(|tokens| TinyParser::new(tokens).parse());
    let program = match parsed {
        Ok(program) => program,
        Err(errors) => return Ok(report_compile_errors(errors, name, source)),
    };
    match format {
        AstFormat::Json => println!("{}", printer::to_json(&program).context("serialize AST")?),
        AstFormat::Sexp => print!("{}", printer::to_sexp(&program)),
    }
    Ok(ExitCode::SUCCESS)
}

fn run_file(name: &str, source: &str) -> ExitCode {
    let mut interpreter = Interpreter::new();
    match tiny_lang::run(source, &mut interpreter) {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Compile(errors)) => report_compile_errors(errors, name, source),
        Err(RunError::Runtime(e)) => {
            eprintln!("{e}");
            ExitCode::from(EX_SOFTWARE)
        }
    }
}

fn try_main(cli: Cli) -> Result<ExitCode> {
    let Some(path) = cli.file else {
        tiny_lang::repl::run_repl()?;
        return Ok(ExitCode::SUCCESS);
    };

    let source = read_source(&path)?;
    let name = path.display().to_string();
    debug!("read {} bytes from {name}", source.len());

    if cli.dump_tokens {
        return Ok(dump_tokens(&name, &source));
    }
    if cli.dump_ast {
        return dump_ast(&name, &source, cli.ast_format);
    }
    Ok(run_file(&name, &source))
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version also land here, on stdout.
            return if e.use_stderr() {
                ExitCode::from(EX_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_logger(cli.verbose);
    debug!("CLI arguments: {cli:?}");

    match try_main(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EX_NOINPUT)
        }
    }
}
