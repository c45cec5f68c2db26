use std::fmt::{self, Display};

use nom::error::ErrorKind as NomErrorKind;

use crate::codegen::CodegenError;
use crate::source::{LexError, SyntaxError};
use crate::tree::InvariantViolation;
use crate::treefile::TreefileErrorKind;

/// Union of everything the pipeline can fail with, for callers that drive
/// several stages in a row.
#[derive(Debug, Clone)]
pub enum Error {
    Lex(LexError),
    Syntax(SyntaxError),
    Codegen(CodegenError),
    Invariant(InvariantViolation),
    Treefile(ParseError<TreefileErrorKind>),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Lex(e) => write!(f, "lexical error: {}", e),
            Error::Syntax(e) => write!(f, "syntax error: {}", e),
            Error::Codegen(e) => write!(f, "{}", e),
            Error::Invariant(e) => write!(f, "{}", e),
            Error::Treefile(e) => write!(f, "tree file error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<LexError> for Error {
    fn from(e: LexError) -> Error {
        Error::Lex(e)
    }
}

impl From<SyntaxError> for Error {
    fn from(e: SyntaxError) -> Error {
        Error::Syntax(e)
    }
}

impl From<CodegenError> for Error {
    fn from(e: CodegenError) -> Error {
        Error::Codegen(e)
    }
}

impl From<InvariantViolation> for Error {
    fn from(e: InvariantViolation) -> Error {
        Error::Invariant(e)
    }
}

impl From<ParseError<TreefileErrorKind>> for Error {
    fn from(e: ParseError<TreefileErrorKind>) -> Error {
        Error::Treefile(e)
    }
}

#[derive(Debug, Clone)]
enum InnerError<Kind> {
    Incomplete,
    Context(&'static str),
    Other(Kind),
    Nom(NomErrorKind),
}

impl<Kind: Display> fmt::Display for InnerError<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InnerError::Context(ctx) => write!(f, "invalid {}", ctx),
            InnerError::Nom(_err) => write!(f, "unexpected input"),
            InnerError::Other(kind) => fmt::Display::fmt(kind, f),
            InnerError::Incomplete => write!(f, "expected more input"),
        }
    }
}

/// Error type for the text formats parsed with nom: carries the reason and
/// the unconsumed input.
///
/// For error location information see [ParseError::verbose].
#[derive(Clone, Debug)]
pub struct ParseError<Kind> {
    stack: Vec<(String, InnerError<Kind>)>,
}

impl<Kind> ParseError<Kind> {
    pub(crate) fn from_kind(input: String, kind: Kind) -> ParseError<Kind> {
        ParseError {
            stack: vec![(input, InnerError::Other(kind))],
        }
    }

    pub(crate) fn incomplete() -> ParseError<Kind> {
        ParseError {
            stack: vec![(String::new(), InnerError::Incomplete)],
        }
    }
}

/// Error type containing location information in addition to the reason.
///
/// Created from a [ParseError] with [ParseError::verbose].
#[derive(Clone, Debug)]
pub struct VerboseParseError<'a, Kind> {
    /// The line number of the error location.
    pub line: usize,
    /// The column number of the error location.
    pub column: usize,
    kind: InnerError<Kind>,
    rest: &'a str,
}

impl<'a, Kind: Display> fmt::Display for VerboseParseError<'a, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "at line {} col {}: {}, at '{}'",
            self.line, self.column, self.kind, self.rest,
        )
    }
}

impl<Kind> ParseError<Kind> {
    /// Calculates the error location from the [ParseError] and the original
    /// input buffer.
    ///
    /// # Parameters
    /// - `input`: The original input buffer or an exact copy of it.
    pub fn verbose(self, input: &str) -> VerboseParseError<Kind> {
        for (rest, kind) in self.stack {
            let consumed = input.len().saturating_sub(rest.len());

            let mut line = 1;
            let mut column = 1;
            for ch in input[..consumed].chars() {
                if ch == '\n' {
                    line += 1;
                    column = 0;
                }
                column += 1;
            }

            let mut end = consumed;
            for ch in input[consumed..].chars() {
                if ch == '\n' || end - consumed > 20 {
                    break;
                }
                end += ch.len_utf8();
            }

            return VerboseParseError {
                line,
                column,
                kind,
                rest: &input[consumed..end],
            };
        }

        unreachable!("a parse error always carries at least one frame");
    }
}

impl<Kind: Display> fmt::Display for ParseError<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (input, kind) = &self.stack[0];

        let end = input
            .char_indices()
            .find_map(|(i, c)| match c {
                '\n' => Some(i),
                _ => None,
            })
            .unwrap_or_else(|| input.len());

        let end = std::cmp::min(end, 20);

        write!(f, "{} at: {}", kind, &input[..end])
    }
}

impl<Kind> nom::error::ParseError<&str> for ParseError<Kind> {
    fn from_error_kind(input: &str, kind: NomErrorKind) -> Self {
        ParseError {
            stack: vec![(input.to_string(), InnerError::Nom(kind))],
        }
    }

    fn append(input: &str, kind: NomErrorKind, mut other: Self) -> Self {
        other.stack.push((input.to_string(), InnerError::Nom(kind)));
        other
    }

    fn add_context(input: &str, ctx: &'static str, mut other: Self) -> Self {
        other.stack.push((input.to_string(), InnerError::Context(ctx)));
        other
    }
}
