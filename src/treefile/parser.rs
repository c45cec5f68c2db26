//! nom parser for the persisted tree format.
//!
//! The format has three sections: the variable-name table, the function
//! table, and one recursive bracket-delimited tree literal. Whitespace and
//! `[`-delimited comments may appear between any two items. A node literal
//! with a single child always means the *left* child.

use std::result::Result as StdResult;

use nom::{
    bytes::complete::{tag, take_while1},
    combinator::{map_res, opt},
    sequence::tuple,
    IResult,
};

use std::fmt;

use crate::tree::InvariantViolation;

#[derive(Debug, Clone)]
pub enum TreefileErrorKind {
    /// A node literal with a kind tag outside the known range.
    UnknownKind(i64),
    /// An operator node with an unknown operator code.
    UnknownOperator(i64),
    /// A node payload indexing past the tables the file itself declared.
    IndexOutOfRange { tag: i64, payload: i64 },
    /// The function table names the same function twice.
    DuplicateFunction(String),
    /// Content after the tree literal.
    TrailingContent,
    /// The reconstructed tree failed verification.
    Corrupt(InvariantViolation),
}

impl fmt::Display for TreefileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TreefileErrorKind::UnknownKind(tag) => write!(f, "unknown node kind {}", tag),
            TreefileErrorKind::UnknownOperator(code) => {
                write!(f, "unknown operator code {}", code)
            }
            TreefileErrorKind::IndexOutOfRange { tag, payload } => {
                write!(f, "node of kind {} indexes missing table entry {}", tag, payload)
            }
            TreefileErrorKind::DuplicateFunction(name) => {
                write!(f, "function '{}' declared twice", name)
            }
            TreefileErrorKind::TrailingContent => write!(f, "content after the tree literal"),
            TreefileErrorKind::Corrupt(violation) => write!(f, "{}", violation),
        }
    }
}

pub type ParseError = crate::error::ParseError<TreefileErrorKind>;
type Res<'a, T> = IResult<&'a str, T, ParseError>;

#[derive(Debug, Clone)]
pub(super) struct RawFunction {
    pub name: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
pub(super) struct RawNode {
    pub kind: i64,
    pub payload: i64,
    pub left: Option<Box<RawNode>>,
    pub right: Option<Box<RawNode>>,
}

#[derive(Debug, Clone)]
pub(super) struct RawFile {
    pub vars: Vec<String>,
    pub funcs: Vec<RawFunction>,
    pub tree: RawNode,
}

/// Skip whitespace and `[`-comments. An unterminated comment swallows the
/// rest of the input.
fn skip(input: &str) -> Res<()> {
    let mut rest = input;
    loop {
        let trimmed = rest.trim_start();
        match trimmed.strip_prefix('[') {
            Some(comment) => match comment.find(']') {
                Some(end) => rest = &comment[end + 1..],
                None => rest = "",
            },
            None => return Ok((trimmed, ())),
        }
    }
}

fn take_i64(input: &str) -> Res<i64> {
    map_res(
        tuple((
            opt(tag("-")),
            take_while1(|c: char| c.is_ascii_digit()),
        )),
        |(sign, digits): (Option<&str>, &str)| {
            digits
                .parse::<i64>()
                .map(|value| if sign.is_some() { -value } else { value })
        },
    )(input)
}

fn take_count(input: &str) -> Res<usize> {
    map_res(take_while1(|c: char| c.is_ascii_digit()), |digits: &str| {
        digits.parse::<usize>()
    })(input)
}

fn take_name(input: &str) -> Res<&str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn node(input: &str) -> Res<RawNode> {
    let (input, _) = skip(input)?;
    let (input, _) = tag("{")(input)?;
    let (input, _) = skip(input)?;
    let (input, kind) = take_i64(input)?;
    let (input, _) = skip(input)?;
    let (input, payload) = take_i64(input)?;
    let (input, left) = opt(node)(input)?;
    let (input, right) = opt(node)(input)?;
    let (input, _) = skip(input)?;
    let (input, _) = tag("}")(input)?;

    Ok((
        input,
        RawNode {
            kind,
            payload,
            left: left.map(Box::new),
            right: right.map(Box::new),
        },
    ))
}

fn parse_sections(input: &str) -> Res<RawFile> {
    let (input, _) = skip(input)?;
    let (mut input, var_count) = take_count(input)?;

    let mut vars = Vec::with_capacity(var_count);
    for _ in 0..var_count {
        let (rest, _) = skip(input)?;
        let (rest, name) = take_name(rest)?;
        vars.push(name.to_string());
        input = rest;
    }

    let (rest, _) = skip(input)?;
    let (mut input, func_count) = take_count(rest)?;

    let mut funcs = Vec::with_capacity(func_count);
    for _ in 0..func_count {
        let (rest, _) = skip(input)?;
        let (rest, name) = take_name(rest)?;
        let (rest, _) = skip(rest)?;
        let (mut rest, arity) = take_count(rest)?;

        let mut args = Vec::with_capacity(arity);
        for _ in 0..arity {
            let (after, _) = skip(rest)?;
            let (after, arg) = take_name(after)?;
            args.push(arg.to_string());
            rest = after;
        }

        funcs.push(RawFunction {
            name: name.to_string(),
            args,
        });
        input = rest;
    }

    let (input, tree) = node(input)?;

    Ok((input, RawFile { vars, funcs, tree }))
}

pub(super) fn parse_treefile(input: &str) -> StdResult<RawFile, ParseError> {
    match parse_sections(input) {
        Ok((rest, file)) => {
            let (rest, _) = skip(rest).map_err(|_| ParseError::incomplete())?;
            if !rest.is_empty() {
                return Err(ParseError::from_kind(
                    rest.to_string(),
                    TreefileErrorKind::TrailingContent,
                ));
            }
            Ok(file)
        }
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => Err(err),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::incomplete()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_three_sections() {
        let text = r#"
            2
            x y
            1
            double 1 x
            [the tree]
            { 0 0 { 8 0 { 0 0 } { 0 0 } } }
        "#;

        let file = parse_treefile(text).unwrap();
        assert_eq!(file.vars, vec!["x", "y"]);
        assert_eq!(file.funcs.len(), 1);
        assert_eq!(file.funcs[0].name, "double");
        assert_eq!(file.funcs[0].args, vec!["x"]);
        assert_eq!(file.tree.kind, 0);
        assert!(file.tree.left.is_some());
        assert!(file.tree.right.is_none());
    }

    #[test]
    fn a_sole_child_is_the_left_one() {
        let file = parse_treefile("0 0 { 10 0 { 1 5 } }").unwrap();
        let left = file.tree.left.as_ref().unwrap();
        assert_eq!((left.kind, left.payload), (1, 5));
        assert!(file.tree.right.is_none());
    }

    #[test]
    fn rejects_trailing_content() {
        let err = parse_treefile("0 0 { 0 0 } { 0 0 }").unwrap_err();
        assert!(format!("{}", err).contains("content after the tree literal"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_treefile("not a tree file").is_err());
        assert!(parse_treefile("0 0 { 0").is_err());
    }
}
