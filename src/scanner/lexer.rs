use winnow::combinator::{alt, opt};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::stream::{LocatingSlice, Location};
use winnow::token::{any, take_till, take_until, take_while};

use crate::error::CompileError;
use crate::scanner::token::{Literal, Span, Token, TokenKind, keyword_kind};

type Input<'a> = LocatingSlice<&'a str>;

fn cut() -> ErrMode<ContextError> {
    ErrMode::Cut(ContextError::new())
}

/// Maps byte offsets to 1-based line numbers.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { starts }
    }

    fn line_at(&self, offset: usize) -> usize {
        self.starts.partition_point(|&start| start <= offset)
    }
}

fn shebang<'a>(input: &mut Input<'a>) -> ModalResult<()> {
    ("#!", take_till(0.., '\n'), opt('\n'))
        .void()
        .parse_next(input)
}

fn whitespace_and_comments<'a>(input: &mut Input<'a>) -> ModalResult<()> {
    loop {
        let before = input.current_token_start();
        take_while(0.., |c: char| {
            c == ' ' || c == '\t' || c == '\r' || c == '\n'
        })
        .void()
        .parse_next(input)?;

        if input.starts_with("//") {
            take_while(0.., |c: char| c != '\n')
                .void()
                .parse_next(input)?;
        } else if input.starts_with("/*") {
            let checkpoint = input.checkpoint();
            let closed: ModalResult<()> = ("/*", take_until(0.., "*/"), "*/")
                .void()
                .parse_next(input);
            if closed.is_err() {
                // leave the input at the comment so the caller can report it
                input.reset(&checkpoint);
                return Err(cut());
            }
        } else if input.current_token_start() == before {
            break;
        }
    }
    Ok(())
}

fn string_literal<'a>(input: &mut Input<'a>) -> ModalResult<Token> {
    let start = input.current_token_start();
    let quote = alt(('"', '\'')).parse_next(input)?;
    let mut raw = String::from(quote);
    let mut value = String::new();
    loop {
        let c = any
            .parse_next(input)
            .map_err(|_: ErrMode<ContextError>| cut())?;
        raw.push(c);
        match c {
            c if c == quote => break,
            '\\' => {
                let esc = any
                    .parse_next(input)
                    .map_err(|_: ErrMode<ContextError>| cut())?;
                raw.push(esc);
                match esc {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    '\'' => value.push('\''),
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
            }
            other => value.push(other),
        }
    }
    let end = input.current_token_start();
    Ok(
        Token::new(TokenKind::String, raw, Span::new(start, end - start, 0))
            .with_literal(Literal::Str(value)),
    )
}

fn number_literal<'a>(input: &mut Input<'a>) -> ModalResult<Token> {
    let start = input.current_token_start();
    let whole: &str = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let mut lexeme = whole.to_string();

    let checkpoint = input.checkpoint();
    let dot_result: Result<char, ErrMode<ContextError>> = '.'.parse_next(input);
    if dot_result.is_ok() {
        match take_while::<_, _, ContextError>(1.., |c: char| c.is_ascii_digit()).parse_next(input)
        {
            Ok(frac) => {
                lexeme.push('.');
                lexeme.push_str(frac);
            }
            Err(_) => {
                input.reset(&checkpoint);
            }
        }
    }

    let value: f64 = lexeme.parse().map_err(|_| cut())?;
    let end = input.current_token_start();
    Ok(
        Token::new(TokenKind::Number, lexeme, Span::new(start, end - start, 0))
            .with_literal(Literal::Number(value)),
    )
}

fn identifier_or_keyword<'a>(input: &mut Input<'a>) -> ModalResult<Token> {
    let start = input.current_token_start();
    let first: char = any
        .verify(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .parse_next(input)?;
    let rest: &str =
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)?;
    let end = input.current_token_start();
    let mut lexeme = String::with_capacity(1 + rest.len());
    lexeme.push(first);
    lexeme.push_str(rest);
    let kind = keyword_kind(&lexeme).unwrap_or(TokenKind::Identifier);
    Ok(Token::new(kind, lexeme, Span::new(start, end - start, 0)))
}

fn two_char_token<'a>(input: &mut Input<'a>) -> ModalResult<Token> {
    let start = input.current_token_start();
    let (kind, lexeme) = alt((
        "!=".value((TokenKind::BangEqual, "!=")),
        "==".value((TokenKind::EqualEqual, "==")),
        ">=".value((TokenKind::GreaterEqual, ">=")),
        "<=".value((TokenKind::LessEqual, "<=")),
    ))
    .parse_next(input)?;
    Ok(Token::new(kind, lexeme, Span::new(start, 2, 0)))
}

fn single_char_token<'a>(input: &mut Input<'a>) -> ModalResult<Token> {
    let start = input.current_token_start();
    let kind = any
        .verify_map(|c: char| match c {
            '(' => Some(TokenKind::LeftParen),
            ')' => Some(TokenKind::RightParen),
            '{' => Some(TokenKind::LeftBrace),
            '}' => Some(TokenKind::RightBrace),
            ',' => Some(TokenKind::Comma),
            '.' => Some(TokenKind::Dot),
            '-' => Some(TokenKind::Minus),
            '+' => Some(TokenKind::Plus),
            ';' => Some(TokenKind::Semicolon),
            '/' => Some(TokenKind::Slash),
            '*' => Some(TokenKind::Star),
            '?' => Some(TokenKind::Question),
            ':' => Some(TokenKind::Colon),
            '!' => Some(TokenKind::Bang),
            '=' => Some(TokenKind::Equal),
            '<' => Some(TokenKind::Less),
            '>' => Some(TokenKind::Greater),
            _ => None,
        })
        .parse_next(input)?;
    Ok(Token::new(kind, kind.to_string(), Span::new(start, 1, 0)))
}

fn scan_token<'a>(input: &mut Input<'a>) -> ModalResult<Token> {
    alt((
        string_literal,
        number_literal,
        identifier_or_keyword,
        two_char_token,
        single_char_token,
    ))
    .parse_next(input)
}

/// Scan all tokens from source, returning either a token list or scan errors.
pub fn scan_all(source: &str) -> Result<Vec<Token>, Vec<CompileError>> {
    let lines = LineIndex::new(source);
    let mut input = LocatingSlice::new(source);
    let _ = opt(shebang).parse_next(&mut input);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    loop {
        if whitespace_and_comments(&mut input).is_err() {
            let offset = input.current_token_start();
            errors.push(CompileError::scan(
                "unterminated block comment",
                Span::new(offset, 2, lines.line_at(offset)),
            ));
            break;
        }
        if input.is_empty() {
            break;
        }
        let checkpoint = input.checkpoint();
        match scan_token(&mut input) {
            Ok(mut token) => {
                token.span.line = lines.line_at(token.span.offset);
                tokens.push(token);
            }
            Err(_) => {
                input.reset(&checkpoint);
                let offset = input.current_token_start();
                let span = Span::new(offset, 1, lines.line_at(offset));
                let ch = any::<_, ContextError>.parse_next(&mut input).ok();
                match ch {
                    Some('"' | '\'') => {
                        errors.push(CompileError::scan("unterminated string", span));
                        break;
                    }
                    Some(c) => {
                        errors.push(CompileError::scan(
                            format!("unexpected character '{c}'"),
                            span,
                        ));
                    }
                    None => break,
                }
            }
        }
    }

    let eof_offset = source.len();
    tokens.push(Token::new(
        TokenKind::Eof,
        "",
        Span::new(eof_offset, 0, lines.line_at(eof_offset)),
    ));

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn scan_ok(source: &str) -> Vec<Token> {
        scan_all(source).expect("scan should succeed")
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn single_char_tokens() {
        let tokens = scan_ok("(){},.-+;*/?:");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::Minus,
                TokenKind::Plus,
                TokenKind::Semicolon,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Question,
                TokenKind::Colon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_char_tokens() {
        let tokens = scan_ok("!= == >= <=");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::BangEqual,
                TokenKind::EqualEqual,
                TokenKind::GreaterEqual,
                TokenKind::LessEqual,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn single_then_equal() {
        let tokens = scan_ok("! = < >");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Bang,
                TokenKind::Equal,
                TokenKind::Less,
                TokenKind::Greater,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_literal_keeps_quotes_in_lexeme() {
        let tokens = scan_ok("\"hello world\"");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, "\"hello world\"");
        assert_eq!(
            tokens[0].literal,
            Some(Literal::Str("hello world".to_string()))
        );
    }

    #[test]
    fn single_quoted_string() {
        let tokens = scan_ok("'it said \"hi\"'");
        assert_eq!(
            tokens[0].literal,
            Some(Literal::Str("it said \"hi\"".to_string()))
        );
    }

    #[test]
    fn string_with_escapes() {
        let tokens = scan_ok("\"hello\\nworld\\t!\"");
        assert_eq!(
            tokens[0].literal,
            Some(Literal::Str("hello\nworld\t!".to_string()))
        );
    }

    #[rstest]
    #[case("42", 42.0)]
    #[case("3.14", 3.14)]
    #[case("007", 7.0)]
    fn number_literals(#[case] source: &str, #[case] expected: f64) {
        let tokens = scan_ok(source);
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].lexeme, source);
        assert_eq!(tokens[0].literal, Some(Literal::Number(expected)));
    }

    #[test]
    fn number_no_trailing_dot() {
        let tokens = scan_ok("42.foo");
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].lexeme, "42");
        assert_eq!(tokens[1].kind, TokenKind::Dot);
        assert_eq!(tokens[2].kind, TokenKind::Identifier);
    }

    #[test]
    fn all_keywords() {
        let source =
            "and class else false fun for if nil or print return super this true var while";
        let tokens = scan_ok(source);
        let expected = vec![
            TokenKind::And,
            TokenKind::Class,
            TokenKind::Else,
            TokenKind::False,
            TokenKind::Fun,
            TokenKind::For,
            TokenKind::If,
            TokenKind::Nil,
            TokenKind::Or,
            TokenKind::Print,
            TokenKind::Return,
            TokenKind::Super,
            TokenKind::This,
            TokenKind::True,
            TokenKind::Var,
            TokenKind::While,
            TokenKind::Eof,
        ];
        assert_eq!(kinds(&tokens), expected);
    }

    #[test]
    fn line_comments_ignored() {
        let tokens = scan_ok("var x // this is a comment\nvar y");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn block_comments_ignored_and_lines_counted() {
        let tokens = scan_ok("var /* one\ntwo\n */ x");
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Var, TokenKind::Identifier, TokenKind::Eof]
        );
        assert_eq!(tokens[1].line(), 3);
    }

    #[test]
    fn unterminated_block_comment_error() {
        let errors = scan_all("var x; /* never closed").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("unterminated block comment"));
    }

    #[test]
    fn spans_and_lines_are_correct() {
        let tokens = scan_ok("var x = 42;\nprint x;");
        assert_eq!(tokens[0].span, Span::new(0, 3, 1)); // var
        assert_eq!(tokens[1].span, Span::new(4, 1, 1)); // x
        assert_eq!(tokens[3].span, Span::new(8, 2, 1)); // 42
        assert_eq!(tokens[5].span, Span::new(12, 5, 2)); // print
        assert_eq!(tokens.last().map(Token::line), Some(2));
    }

    #[test]
    fn unexpected_characters_all_reported() {
        let errors = scan_all("var x = @; var y = #;").unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().contains('@'));
        assert!(errors[1].to_string().contains('#'));
    }

    #[test]
    fn unterminated_string_error() {
        let errors = scan_all("print \"unterminated").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("unterminated string"));
    }

    #[rstest]
    #[case("shebang only", "#!/usr/bin/env tl", &[TokenKind::Eof])]
    #[case(
        "shebang with newline and code",
        "#!/usr/bin/env tl\nprint 1;",
        &[TokenKind::Print, TokenKind::Number, TokenKind::Semicolon, TokenKind::Eof]
    )]
    #[case(
        "no shebang unaffected",
        "print 1;",
        &[TokenKind::Print, TokenKind::Number, TokenKind::Semicolon, TokenKind::Eof]
    )]
    fn shebang_cases(#[case] _label: &str, #[case] source: &str, #[case] expected: &[TokenKind]) {
        let tokens = scan_ok(source);
        assert_eq!(kinds(&tokens), expected);
    }

    #[test]
    fn line_index_maps_offsets() {
        let index = LineIndex::new("a\nbc\n\nd");
        assert_eq!(index.line_at(0), 1);
        assert_eq!(index.line_at(1), 1); // the '\n' itself
        assert_eq!(index.line_at(2), 2);
        assert_eq!(index.line_at(5), 3);
        assert_eq!(index.line_at(6), 4);
    }
}
