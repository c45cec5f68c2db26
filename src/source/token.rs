//! Tokens and the scanner for the source language.
//!
//! The on-disk format is written back to front, so the scanner consumes the
//! text right to left: it mirrors the input once and runs the lexer forward
//! over the mirrored buffer. Identifier and numeral runs therefore come out
//! in logical order directly, and all spans are mapped back to positions in
//! the original text before they reach an error.
//!
//! The scanner does name resolution on the fly: declarations register
//! entries in the symbol tables, scope-area markers drive the scope stack,
//! and the emitted tokens reuse the tree's [NodeKind] with the table index
//! already in the payload.

use logos::{Lexer, Logos};

use std::fmt;

use crate::numeral::{self, NumeralError};
use crate::symbol_table::{suggest, FuncTable, ScopeStack, VarTable};
use crate::tree::{fic, NodeKind, Op};

pub type Span = std::ops::Range<usize>;

/// Raw lexical shapes over the mirrored text.
#[derive(Logos, Debug, PartialEq, Clone)]
enum RawToken<'a> {
    /// Errorneous token that could not be interpreted as any of the other
    /// variants.
    #[error]
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    #[regex(r"#[^#]*#", logos::skip)]
    Error,

    /// An identifier.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", Lexer::slice)]
    Name(&'a str),

    /// A run over the numeral alphabet; decoded by [numeral::decode].
    /// Keyword digit-strings use the digits 6-9 and never collide.
    #[regex(r"[0-2'|]+", Lexer::slice)]
    Numeral(&'a str),

    #[token("69")]
    If,
    #[token("79")]
    Else,
    #[token("88888888")]
    While,
    #[token("~~~~")]
    VarDeclMarker,

    #[token("^")]
    FuncMarker,
    #[token("<")]
    CallMarker,
    #[token(">")]
    Return,

    #[token("(")]
    Add,
    #[token(")")]
    Sub,
    #[token("[")]
    Mul,
    #[token("]")]
    Div,
    #[token("%")]
    Sqrt,
    #[token("?")]
    In,
    #[token("!")]
    Out,

    #[token("-")]
    Assign,
    #[token("+")]
    Or,
    #[token("*")]
    And,

    #[token("\"")]
    Equal,
    #[token("=")]
    NotEqual,
    #[token(",")]
    Less,
    #[token(";")]
    LessEq,
    #[token(".")]
    Greater,
    #[token(":")]
    GreaterEq,

    #[token("/")]
    AreaOpen,
    #[token("\\")]
    AreaClose,
    #[token("{")]
    GroupOpen,
    #[token("}")]
    GroupClose,

    #[token("&")]
    ArgSeparator,
    /// Statement separator: a comma directly followed by a dot. A lone
    /// comma is the less-than operator.
    #[token(",.")]
    Semicolon,
}

/// A resolved token: the tree's node type reused as a token, plus the span
/// of the lexeme in the original (unmirrored) text.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: NodeKind,
    pub payload: i64,
    pub span: Span,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            NodeKind::Fic => match self.payload {
                fic::COMMA => write!(f, "argument separator"),
                fic::SEMICOLON => write!(f, "statement separator"),
                fic::OPEN_BRACKET => write!(f, "'{{'"),
                fic::CLOSE_BRACKET => write!(f, "'}}'"),
                fic::OPEN_BRACE => write!(f, "area opener"),
                fic::CLOSE_BRACE => write!(f, "area closer"),
                _ => write!(f, "sequencer"),
            },
            NodeKind::Number => write!(f, "number {}", self.payload),
            NodeKind::Var => write!(f, "variable"),
            NodeKind::If => write!(f, "'if'"),
            NodeKind::Else => write!(f, "'else'"),
            NodeKind::While => write!(f, "'while'"),
            NodeKind::Op => match Op::from_payload(self.payload) {
                Some(op) => write!(f, "operator {:?}", op),
                None => write!(f, "operator"),
            },
            NodeKind::VarDecl => write!(f, "variable declaration"),
            NodeKind::FuncDecl => write!(f, "function declaration"),
            NodeKind::Call => write!(f, "call"),
            NodeKind::Return => write!(f, "'return'"),
        }
    }
}

/// The scanner's output: the token sequence together with the symbol tables
/// it built. The tables are read-only from here on.
#[derive(Clone, Debug)]
pub struct TokenSeq {
    pub tokens: Vec<Token>,
    pub vars: VarTable,
    pub funcs: FuncTable,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LexError {
    UnknownSymbol { symbol: char, span: Span },
    UnterminatedComment { span: Span },
    MalformedNumber { reason: NumeralError, span: Span },
    /// An area closer with no matching opener, or (with `span` absent)
    /// areas still open at the start of the text.
    UnbalancedScope { span: Option<Span> },
    UndeclaredIdentifier {
        name: String,
        suggestion: Option<String>,
        span: Span,
    },
    DuplicateDeclaration { name: String, span: Span },
    DuplicateFunction { name: String, span: Span },
    /// A declaration or call marker not followed by an identifier.
    MissingName { span: Span },
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LexError::UnknownSymbol { symbol, span } => {
                write!(f, "unknown symbol '{}' at {}..{}", symbol, span.start, span.end)
            }
            LexError::UnterminatedComment { span } => {
                write!(f, "comment opened at {} has no closer", span.start)
            }
            LexError::MalformedNumber { reason, span } => {
                write!(f, "malformed number at {}..{}: {}", span.start, span.end, reason)
            }
            LexError::UnbalancedScope { span: Some(span) } => {
                write!(f, "area closed at {} was never opened", span.start)
            }
            LexError::UnbalancedScope { span: None } => {
                write!(f, "not every area is closed")
            }
            LexError::UndeclaredIdentifier { name, suggestion, span } => {
                write!(f, "'{}' at {}..{} is not declared", name, span.start, span.end)?;
                if let Some(suggestion) = suggestion {
                    write!(f, " (did you mean '{}'?)", suggestion)?;
                }
                Ok(())
            }
            LexError::DuplicateDeclaration { name, span } => write!(
                f,
                "'{}' at {}..{} is already declared in this area",
                name, span.start, span.end,
            ),
            LexError::DuplicateFunction { name, span } => write!(
                f,
                "function '{}' at {}..{} is already declared",
                name, span.start, span.end,
            ),
            LexError::MissingName { span } => {
                write!(f, "expected a name at {}..{}", span.start, span.end)
            }
        }
    }
}

impl std::error::Error for LexError {}

/// What the next identifier will be taken for.
#[derive(Clone, Debug, PartialEq)]
enum Pending {
    None,
    VarName(Span),
    FuncName(Span),
    CalleeName(Span),
}

struct Scanner {
    vars: VarTable,
    funcs: FuncTable,
    scopes: ScopeStack,
    pending: Pending,
    /// Function index whose parameter group opens with the next `{`.
    awaiting_params: Option<usize>,
    /// Function index whose parameter group we are inside.
    in_params: Option<usize>,
    tokens: Vec<Token>,
}

impl Scanner {
    fn new() -> Scanner {
        Scanner {
            vars: VarTable::new(),
            funcs: FuncTable::new(),
            scopes: ScopeStack::new(),
            pending: Pending::None,
            awaiting_params: None,
            in_params: None,
            tokens: Vec::new(),
        }
    }

    fn push(&mut self, kind: NodeKind, payload: i64, span: Span) {
        self.tokens.push(Token { kind, payload, span });
    }

    fn resolve_name(&mut self, name: &str, span: Span) -> Result<(), LexError> {
        match std::mem::replace(&mut self.pending, Pending::None) {
            Pending::FuncName(_) => {
                let index = self.funcs.declare(name).map_err(|_| {
                    LexError::DuplicateFunction {
                        name: name.to_string(),
                        span: span.clone(),
                    }
                })?;
                self.awaiting_params = Some(index);
                self.push(NodeKind::FuncDecl, index as i64, span);
            }
            Pending::VarName(_) => {
                if self.vars.declared_since(name, self.scopes.innermost_base()) {
                    return Err(LexError::DuplicateDeclaration {
                        name: name.to_string(),
                        span,
                    });
                }
                let index = self.vars.declare(name);
                self.push(NodeKind::VarDecl, index as i64, span);
            }
            Pending::CalleeName(_) => {
                let index = self.funcs.lookup(name).ok_or_else(|| {
                    LexError::UndeclaredIdentifier {
                        name: name.to_string(),
                        suggestion: suggest(name, self.funcs.names()),
                        span: span.clone(),
                    }
                })?;
                self.push(NodeKind::Call, index as i64, span);
            }
            Pending::None => {
                if let Some(func) = self.in_params {
                    if self.vars.declared_since(name, self.scopes.innermost_base()) {
                        return Err(LexError::DuplicateDeclaration {
                            name: name.to_string(),
                            span,
                        });
                    }
                    let index = self.vars.declare(name);
                    self.funcs
                        .get_mut(func)
                        .expect("parameter group of an undeclared function")
                        .arg_slots
                        .push(index);
                    // Parameters never reach the token stream; the parser
                    // reads them back from the function table.
                } else {
                    let index = self.vars.lookup_visible(name).ok_or_else(|| {
                        LexError::UndeclaredIdentifier {
                            name: name.to_string(),
                            suggestion: suggest(name, self.vars.visible_names()),
                            span: span.clone(),
                        }
                    })?;
                    self.push(NodeKind::Var, index as i64, span);
                }
            }
        }

        Ok(())
    }
}

/// Tokenize the source text, consumed right to left.
pub fn scan(source: &str) -> Result<TokenSeq, LexError> {
    if let Some((position, symbol)) = source.char_indices().find(|(_, c)| !c.is_ascii()) {
        return Err(LexError::UnknownSymbol {
            symbol,
            span: position..position + symbol.len_utf8(),
        });
    }

    let mirrored: String = source.chars().rev().collect();
    let length = source.len();
    // A lexeme at `s..e` of the mirror sits at `length-e..length-s` in the
    // original text.
    let unmirror = |span: Span| length - span.end..length - span.start;

    let mut scanner = Scanner::new();
    let mut lexer = RawToken::lexer(&mirrored);

    while let Some(raw) = lexer.next() {
        let span = unmirror(lexer.span());

        if scanner.pending != Pending::None && !matches!(raw, RawToken::Name(_)) {
            let marker = match std::mem::replace(&mut scanner.pending, Pending::None) {
                Pending::VarName(s) | Pending::FuncName(s) | Pending::CalleeName(s) => s,
                Pending::None => unreachable!(),
            };
            return Err(LexError::MissingName { span: marker });
        }

        match raw {
            RawToken::Error => {
                let slice = lexer.slice();
                if slice.starts_with('#') {
                    return Err(LexError::UnterminatedComment { span });
                }
                return Err(LexError::UnknownSymbol {
                    symbol: slice.chars().next().unwrap_or('?'),
                    span,
                });
            }

            RawToken::Name(name) => scanner.resolve_name(name, span)?,

            RawToken::Numeral(text) => {
                let value = numeral::decode(text).map_err(|reason| {
                    LexError::MalformedNumber {
                        reason,
                        span: span.clone(),
                    }
                })?;
                scanner.push(NodeKind::Number, value, span);
            }

            RawToken::VarDeclMarker => scanner.pending = Pending::VarName(span),
            RawToken::FuncMarker => {
                scanner.scopes.open_function(scanner.vars.len());
                scanner.pending = Pending::FuncName(span);
            }
            RawToken::CallMarker => scanner.pending = Pending::CalleeName(span),

            RawToken::GroupOpen => match scanner.awaiting_params.take() {
                Some(func) => scanner.in_params = Some(func),
                None => scanner.push(NodeKind::Fic, fic::OPEN_BRACKET, span),
            },
            RawToken::GroupClose => {
                if scanner.in_params.take().is_none() {
                    scanner.push(NodeKind::Fic, fic::CLOSE_BRACKET, span);
                }
            }

            RawToken::AreaOpen => {
                scanner.scopes.open(scanner.vars.len());
                scanner.push(NodeKind::Fic, fic::OPEN_BRACE, span);
            }
            RawToken::AreaClose => {
                if !scanner.scopes.close(&mut scanner.vars) {
                    return Err(LexError::UnbalancedScope { span: Some(span) });
                }
                scanner.push(NodeKind::Fic, fic::CLOSE_BRACE, span);
            }

            RawToken::If => scanner.push(NodeKind::If, 0, span),
            RawToken::Else => scanner.push(NodeKind::Else, 0, span),
            RawToken::While => scanner.push(NodeKind::While, 0, span),
            RawToken::Return => scanner.push(NodeKind::Return, 0, span),

            RawToken::Semicolon => scanner.push(NodeKind::Fic, fic::SEMICOLON, span),
            RawToken::ArgSeparator => scanner.push(NodeKind::Fic, fic::COMMA, span),

            RawToken::Add => scanner.push(NodeKind::Op, Op::Add.payload(), span),
            RawToken::Sub => scanner.push(NodeKind::Op, Op::Sub.payload(), span),
            RawToken::Mul => scanner.push(NodeKind::Op, Op::Mul.payload(), span),
            RawToken::Div => scanner.push(NodeKind::Op, Op::Div.payload(), span),
            RawToken::Sqrt => scanner.push(NodeKind::Op, Op::Sqrt.payload(), span),
            RawToken::In => scanner.push(NodeKind::Op, Op::In.payload(), span),
            RawToken::Out => scanner.push(NodeKind::Op, Op::Out.payload(), span),
            RawToken::Assign => scanner.push(NodeKind::Op, Op::Assign.payload(), span),
            RawToken::Or => scanner.push(NodeKind::Op, Op::Or.payload(), span),
            RawToken::And => scanner.push(NodeKind::Op, Op::And.payload(), span),
            RawToken::Equal => scanner.push(NodeKind::Op, Op::Equal.payload(), span),
            RawToken::NotEqual => scanner.push(NodeKind::Op, Op::NotEqual.payload(), span),
            RawToken::Less => scanner.push(NodeKind::Op, Op::Less.payload(), span),
            RawToken::LessEq => scanner.push(NodeKind::Op, Op::LessEq.payload(), span),
            RawToken::Greater => scanner.push(NodeKind::Op, Op::Greater.payload(), span),
            RawToken::GreaterEq => scanner.push(NodeKind::Op, Op::GreaterEq.payload(), span),
        }
    }

    if let Pending::VarName(span) | Pending::FuncName(span) | Pending::CalleeName(span) =
        scanner.pending
    {
        return Err(LexError::MissingName { span });
    }

    if scanner.scopes.depth() != 0 {
        return Err(LexError::UnbalancedScope { span: None });
    }

    Ok(TokenSeq {
        tokens: scanner.tokens,
        vars: scanner.vars,
        funcs: scanner.funcs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests write sources in scan order; the on-disk format is the mirror.
    fn mirror(logical: &str) -> String {
        logical.chars().rev().collect()
    }

    fn kinds(seq: &TokenSeq) -> Vec<(NodeKind, i64)> {
        seq.tokens.iter().map(|t| (t.kind, t.payload)).collect()
    }

    #[test]
    fn scans_a_minimal_program() {
        let seq = scan(&mirror("/ ~~~~x ,. x - |1 ,. \\")).unwrap();

        assert_eq!(
            kinds(&seq),
            vec![
                (NodeKind::Fic, fic::OPEN_BRACE),
                (NodeKind::VarDecl, 0),
                (NodeKind::Fic, fic::SEMICOLON),
                (NodeKind::Var, 0),
                (NodeKind::Op, Op::Assign.payload()),
                (NodeKind::Number, 3),
                (NodeKind::Fic, fic::SEMICOLON),
                (NodeKind::Fic, fic::CLOSE_BRACE),
            ],
        );
        assert_eq!(seq.vars.get(0).unwrap().name, "x");
    }

    #[test]
    fn function_parameters_stay_out_of_the_token_stream() {
        let seq = scan(&mirror("^dup {x } / > {x ( x} ,. \\ / \\")).unwrap();

        assert_eq!(seq.funcs.len(), 1);
        let func = seq.funcs.get(0).unwrap();
        assert_eq!(func.name, "dup");
        assert_eq!(func.arity(), 1);

        // FuncDecl is directly followed by the body opener.
        assert_eq!(seq.tokens[0].kind, NodeKind::FuncDecl);
        assert_eq!(
            (seq.tokens[1].kind, seq.tokens[1].payload),
            (NodeKind::Fic, fic::OPEN_BRACE),
        );
    }

    #[test]
    fn comma_dot_is_one_separator_but_a_lone_comma_compares() {
        let seq = scan(&mirror("/ ~~~~a ,. a , |0 ,. \\")).unwrap();

        let comparisons: Vec<_> = seq
            .tokens
            .iter()
            .filter(|t| t.kind == NodeKind::Op && t.payload == Op::Less.payload())
            .collect();
        assert_eq!(comparisons.len(), 1);
    }

    #[test]
    fn keyword_digit_strings_resolve() {
        let seq = scan(&mirror("/ 69 / \\ {|0} 79 / \\ 88888888 {|0} / \\ \\")).unwrap();

        let keyword_kinds: Vec<_> = seq
            .tokens
            .iter()
            .filter(|t| {
                matches!(t.kind, NodeKind::If | NodeKind::Else | NodeKind::While)
            })
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            keyword_kinds,
            vec![NodeKind::If, NodeKind::Else, NodeKind::While],
        );
    }

    #[test]
    fn variables_fall_out_of_scope_at_area_close() {
        let err = scan(&mirror("/ / ~~~~v ,. \\ v - | ,. \\")).unwrap_err();

        assert!(matches!(
            err,
            LexError::UndeclaredIdentifier { ref name, .. } if name == "v"
        ));
    }

    #[test]
    fn redeclaration_in_the_same_area_is_rejected() {
        let err = scan(&mirror("/ ~~~~v ,. ~~~~v ,. \\")).unwrap_err();

        assert!(matches!(
            err,
            LexError::DuplicateDeclaration { ref name, .. } if name == "v"
        ));
    }

    #[test]
    fn shadowing_in_a_nested_area_is_allowed() {
        let seq = scan(&mirror("/ ~~~~v ,. / ~~~~v ,. v - | ,. \\ v - | ,. \\")).unwrap();

        let var_payloads: Vec<_> = seq
            .tokens
            .iter()
            .filter(|t| t.kind == NodeKind::Var)
            .map(|t| t.payload)
            .collect();
        // Inner use resolves to the inner entry, outer use to the outer one.
        assert_eq!(var_payloads, vec![1, 0]);
    }

    #[test]
    fn undeclared_identifier_comes_with_a_suggestion() {
        let err = scan(&mirror("/ ~~~~counter ,. countr - | ,. \\")).unwrap_err();

        match err {
            LexError::UndeclaredIdentifier { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("counter"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn malformed_numeral_is_reported_with_its_span() {
        // "0'1" has no group delimiter.
        let source = mirror("/ ~~~~x ,. x - 0'1 ,. \\");
        let err = scan(&source).unwrap_err();

        match err {
            LexError::MalformedNumber { reason, span } => {
                assert_eq!(reason, NumeralError::MissingDelimiter);
                // The span points at the literal in the on-disk text, where
                // it reads mirrored.
                assert_eq!(&source[span], "1'0");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn unterminated_comment_is_its_own_error() {
        let err = scan(&mirror("/ # lost \\")).unwrap_err();
        assert!(matches!(err, LexError::UnterminatedComment { .. }));
    }

    #[test]
    fn comments_are_skipped() {
        let seq = scan(&mirror("/ #note# ~~~~x ,. \\")).unwrap();
        assert_eq!(seq.tokens.len(), 4);
    }

    #[test]
    fn stray_area_closer_is_unbalanced() {
        let err = scan(&mirror("\\ /")).unwrap_err();
        assert!(matches!(err, LexError::UnbalancedScope { span: Some(_) }));
    }

    #[test]
    fn unclosed_area_is_unbalanced() {
        let err = scan(&mirror("/ ~~~~x ,.")).unwrap_err();
        assert_eq!(err, LexError::UnbalancedScope { span: None });
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let err = scan(&mirror("/ @ \\")).unwrap_err();
        assert!(matches!(err, LexError::UnknownSymbol { symbol: '@', .. }));
    }
}
