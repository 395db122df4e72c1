use log::debug;
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::scanner::token::{Span, Token, TokenKind};

// ============= Compile-time errors (with miette diagnostics) =============

#[derive(Error, Debug, Diagnostic)]
pub enum CompileError {
    #[error("[line {line}] scan error: {message}")]
    #[diagnostic(code(tl::scan))]
    Scan {
        message: String,
        line: usize,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("[line {line}] syntax error at {location}: {message}")]
    #[diagnostic(code(tl::syntax))]
    Syntax {
        message: String,
        /// `'lexeme'` of the offending token, or `end` at end of input.
        location: String,
        line: usize,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("[line {line}] resolution error at '{name}': {message}")]
    #[diagnostic(code(tl::resolve))]
    Resolve {
        message: String,
        name: String,
        line: usize,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },
}

impl CompileError {
    pub fn scan(message: impl Into<String>, span: Span) -> Self {
        let message = message.into();
        debug!("scan error: line={}, msg={}", span.line, message);
        Self::Scan {
            message,
            line: span.line,
            span: span.into(),
            src: miette::NamedSource::new("input", String::new()),
        }
    }

    /// Syntax error reported at `token`.
    pub fn syntax(message: impl Into<String>, token: &Token) -> Self {
        let message = message.into();
        let location = if token.kind == TokenKind::Eof {
            "end".to_string()
        } else {
            format!("'{}'", token.lexeme)
        };
        debug!(
            "syntax error: line={}, at={}, msg={}",
            token.span.line, location, message
        );
        let span = Span::new(token.span.offset, token.span.len.max(1), token.span.line);
        Self::Syntax {
            message,
            location,
            line: span.line,
            span: span.into(),
            src: miette::NamedSource::new("input", String::new()),
        }
    }

    pub fn resolve(message: impl Into<String>, name: impl Into<String>, span: Span) -> Self {
        let message = message.into();
        let name = name.into();
        debug!(
            "resolution error: line={}, name={}, msg={}",
            span.line, name, message
        );
        Self::Resolve {
            message,
            name,
            line: span.line,
            span: span.into(),
            src: miette::NamedSource::new("input", String::new()),
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Self::Scan { line, .. } | Self::Syntax { line, .. } | Self::Resolve { line, .. } => {
                *line
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Scan { message, .. }
            | Self::Syntax { message, .. }
            | Self::Resolve { message, .. } => message,
        }
    }

    /// Attach source code for fancy miette diagnostics
    pub fn with_source_code(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        let src = miette::NamedSource::new(name.into(), source.into());
        match self {
            Self::Scan {
                message,
                line,
                span,
                ..
            } => Self::Scan {
                message,
                line,
                span,
                src,
            },
            Self::Syntax {
                message,
                location,
                line,
                span,
                ..
            } => Self::Syntax {
                message,
                location,
                line,
                span,
                src,
            },
            Self::Resolve {
                message,
                name,
                line,
                span,
                ..
            } => Self::Resolve {
                message,
                name,
                line,
                span,
                src,
            },
        }
    }
}

// ============= Runtime errors (simple, no miette) =============

/// A runtime failure. Fatal to the current program run.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}\n[line {}]", span.line)]
pub struct RuntimeError {
    pub message: String,
    pub span: Span,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    pub fn line(&self) -> usize {
        self.span.line
    }
}

// ============= Pipeline errors =============

/// Failure of a whole source run: either compilation stopped before anything
/// executed, or execution hit a runtime error.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("{} compile error(s)", .0.len())]
    Compile(Vec<CompileError>),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl From<Vec<CompileError>> for RunError {
    fn from(errors: Vec<CompileError>) -> Self {
        Self::Compile(errors)
    }
}

// ============= Tests =============
