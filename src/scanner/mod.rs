pub mod lexer;
pub mod token;

use crate::error::CompileError;
use token::Token;

/// Scan source code into a list of tokens terminated by `Eof`.
pub fn scan(source: &str) -> Result<Vec<Token>, Vec<CompileError>> {
    let result = lexer::scan_all(source);
    if let Ok(ref tokens) = result {
        log::debug!("scanned {} tokens", tokens.len());
    }
    result
}
