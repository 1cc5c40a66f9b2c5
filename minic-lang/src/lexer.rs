//! Source text to tokens.
//!
//! The scanner skips whitespace and `//` comments, then tries each token
//! class in a fixed order: number, string, identifier or keyword, operator,
//! separator. Anything else stops the scan with a lex error.
//!
//! Positions come from [`LocatedSpan`]: byte offsets for spans, 1-based
//! lines, and 0-based columns that reset after every newline.
use log::trace;
use nom::{
    branch::alt,
    bytes::complete::{tag, take, take_till, take_while},
    character::complete::{char, digit1, one_of, satisfy},
    combinator::{opt, recognize},
    sequence::pair,
    IResult,
};
use nom_locate::LocatedSpan;
use serde::Serialize;

use crate::error::Error;

type Input<'a> = LocatedSpan<&'a str>;

pub const KEYWORDS: [&str; 15] = [
    "int", "double", "string", "bool", "void", "if", "else", "while", "for", "return", "class",
    "function", "const", "let", "var",
];

const OPERATOR_CHARS: &str = "+-*/%=<>!&|";
const SEPARATOR_CHARS: &str = "{}()[];,";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Keyword,
    Identifier,
    Literal,
    Operator,
    Separator,
    /// Never produced: comments are dropped while scanning.
    Comment,
}

/// Byte range `[start, end)` into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// From the start of `self` to the end of `other`.
    pub fn to(self, other: SourceSpan) -> SourceSpan {
        SourceSpan::new(self.start, other.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: u32,
    pub span: SourceSpan,
}

impl Token {
    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }
}

fn line_of(input: &Input) -> u32 {
    input.location_line()
}

fn column_of(input: &Input) -> u32 {
    input.get_utf8_column() as u32 - 1
}

fn whitespace(input: Input) -> IResult<Input, Input> {
    take_while(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'))(input)
}

fn line_comment(input: Input) -> IResult<Input, Input> {
    recognize(pair(tag("//"), take_till(|c: char| c == '\n')))(input)
}

// A dot only belongs to the number when a digit follows it.
fn number(input: Input) -> IResult<Input, Input> {
    recognize(pair(digit1, opt(pair(char('.'), digit1))))(input)
}

fn word(input: Input) -> IResult<Input, Input> {
    recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

fn operator(input: Input) -> IResult<Input, Input> {
    alt((
        tag("=="),
        tag("!="),
        tag("<="),
        tag(">="),
        tag("&&"),
        tag("||"),
        tag("++"),
        tag("--"),
        tag("+="),
        tag("-="),
        tag("*="),
        tag("/="),
        recognize(one_of(OPERATOR_CHARS)),
    ))(input)
}

fn separator(input: Input) -> IResult<Input, Input> {
    recognize(one_of(SEPARATOR_CHARS))(input)
}

/// Scan a quoted string starting at `input`. The quote character has
/// already been seen but not consumed.
fn string(input: Input, quote: char) -> Result<(Input, String), Error> {
    let unterminated = || {
        Error::lex(
            line_of(&input),
            column_of(&input),
            "unterminated string literal",
        )
    };
    let (rest, _) = take::<usize, Input, ()>(1)(input).map_err(|_| unterminated())?;
    let (rest, content) = take_till::<_, Input, ()>(|c: char| c == quote || c == '\n')(rest)
        .map_err(|_| unterminated())?;
    match rest.fragment().chars().next() {
        Some('\n') => Err(Error::lex(
            line_of(&rest),
            column_of(&rest),
            "string literal cannot span lines",
        )),
        Some(_) => {
            let (rest, _) = take::<usize, Input, ()>(1)(rest).map_err(|_| unterminated())?;
            Ok((rest, format!("\"{}\"", content.fragment())))
        }
        None => Err(unterminated()),
    }
}

struct Lexer<'a> {
    input: Input<'a>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            input: Input::new(source),
            tokens: Vec::new(),
        }
    }

    fn emit(&mut self, rest: Input<'a>, kind: TokenKind, text: String) {
        let start = self.input;
        self.tokens.push(Token {
            kind,
            text,
            line: line_of(&start),
            column: column_of(&start),
            span: SourceSpan::new(start.location_offset(), rest.location_offset()),
        });
        self.input = rest;
    }

    fn run(mut self) -> Result<Vec<Token>, Error> {
        loop {
            if let Ok((rest, _)) = whitespace(self.input) {
                self.input = rest;
            }
            let first = match self.input.fragment().chars().next() {
                Some(c) => c,
                None => break,
            };

            if let Ok((rest, _)) = line_comment(self.input) {
                self.input = rest;
            } else if let Ok((rest, digits)) = number(self.input) {
                self.emit(rest, TokenKind::Literal, digits.fragment().to_string());
            } else if first == '"' || first == '\'' {
                let (rest, text) = string(self.input, first)?;
                self.emit(rest, TokenKind::Literal, text);
            } else if let Ok((rest, name)) = word(self.input) {
                let kind = if KEYWORDS.contains(name.fragment()) {
                    TokenKind::Keyword
                } else {
                    TokenKind::Identifier
                };
                self.emit(rest, kind, name.fragment().to_string());
            } else if let Ok((rest, op)) = operator(self.input) {
                self.emit(rest, TokenKind::Operator, op.fragment().to_string());
            } else if let Ok((rest, sep)) = separator(self.input) {
                self.emit(rest, TokenKind::Separator, sep.fragment().to_string());
            } else {
                return Err(Error::lex(
                    line_of(&self.input),
                    column_of(&self.input),
                    format!("unrecognized character '{}'", first),
                ));
            }
        }
        Ok(self.tokens)
    }
}

/// Split `source` into tokens, failing on the first character that does
/// not start any token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, Error> {
    let tokens = Lexer::new(source).run()?;
    trace!("scanned {} tokens", tokens.len());
    Ok(tokens)
}
