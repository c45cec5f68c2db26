//! Recursive-descent parser over the scanner's token sequence.
//!
//! Names were already resolved by the scanner, so the grammar here is purely
//! structural: every rule is driven by one token of lookahead (two for the
//! assignment head) and either commits or reports exactly what it expected.
//! The whole token sequence must be consumed.

use std::fmt;

use super::token::{Span, Token, TokenSeq};
use super::Module;
use crate::symbol_table::{FuncTable, VarTable};
use crate::tree::{fic, NodeId, NodeKind, Op, Tree};

#[derive(Clone, Debug, PartialEq)]
pub enum SyntaxError {
    UnexpectedToken {
        expected: &'static str,
        found: String,
        span: Span,
    },
    UnexpectedEnd { expected: &'static str },
    /// Tokens left over after the program body.
    TrailingInput { span: Span },
    ArityMismatch {
        function: String,
        expected: usize,
        got: usize,
        span: Span,
    },
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyntaxError::UnexpectedToken { expected, found, span } => write!(
                f,
                "expected {}, found {} at {}..{}",
                expected, found, span.start, span.end,
            ),
            SyntaxError::UnexpectedEnd { expected } => {
                write!(f, "expected {}, found the end of the program", expected)
            }
            SyntaxError::TrailingInput { span } => {
                write!(f, "nothing may follow the program body (at {}..{})", span.start, span.end)
            }
            SyntaxError::ArityMismatch { function, expected, got, span } => write!(
                f,
                "'{}' takes {} argument(s), {} supplied at {}..{}",
                function, expected, got, span.start, span.end,
            ),
        }
    }
}

impl std::error::Error for SyntaxError {}

/// Parse a scanned token sequence into a [Module].
pub fn parse(seq: TokenSeq) -> Result<Module, SyntaxError> {
    let TokenSeq { tokens, vars, funcs } = seq;

    let mut parser = Parser {
        tokens,
        position: 0,
        tree: Tree::new(),
        vars,
        funcs,
    };

    parser.program()?;

    if let Some(token) = parser.peek() {
        return Err(SyntaxError::TrailingInput {
            span: token.span.clone(),
        });
    }

    Ok(Module {
        tree: parser.tree,
        vars: parser.vars,
        funcs: parser.funcs,
    })
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    tree: Tree,
    vars: VarTable,
    funcs: FuncTable,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_second(&self) -> Option<&Token> {
        self.tokens.get(self.position + 1)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn at_fic(&self, payload: i64) -> bool {
        matches!(
            self.peek(),
            Some(token) if token.kind == NodeKind::Fic && token.payload == payload
        )
    }

    fn at_op(&self) -> Option<Op> {
        match self.peek() {
            Some(token) if token.kind == NodeKind::Op => Op::from_payload(token.payload),
            _ => None,
        }
    }

    fn unexpected(&self, expected: &'static str) -> SyntaxError {
        match self.peek() {
            Some(token) => SyntaxError::UnexpectedToken {
                expected,
                found: token.to_string(),
                span: token.span.clone(),
            },
            None => SyntaxError::UnexpectedEnd { expected },
        }
    }

    fn expect_fic(&mut self, payload: i64, expected: &'static str) -> Result<(), SyntaxError> {
        if self.at_fic(payload) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn join(&mut self, op: Op, lhs: NodeId, rhs: NodeId) -> NodeId {
        let node = self.tree.alloc(NodeKind::Op, op.payload());
        self.tree.link_left(node, lhs);
        self.tree.link_right(node, rhs);
        node
    }

    /// `Program := FuncDecl* Body`; the pieces are chained under the root
    /// through sequencer cells, the main body forming the chain's tail.
    fn program(&mut self) -> Result<(), SyntaxError> {
        let root = self.tree.root();
        let mut cursor: Option<NodeId> = None;

        while matches!(self.peek(), Some(token) if token.kind == NodeKind::FuncDecl) {
            let func = self.func_decl()?;
            let cell = self.tree.alloc(NodeKind::Fic, fic::CHAIN);
            match cursor {
                None => self.tree.link_left(root, cell),
                Some(previous) => self.tree.link_right(previous, cell),
            }
            self.tree.link_left(cell, func);
            cursor = Some(cell);
        }

        let body = self.body()?;
        match cursor {
            None => self.tree.link_left(root, body),
            Some(previous) => self.tree.link_right(previous, body),
        }

        Ok(())
    }

    /// The scanner swallowed the parameter group, so a declaration is its
    /// token followed directly by the body; the parameter chain is rebuilt
    /// here from the function table.
    fn func_decl(&mut self) -> Result<NodeId, SyntaxError> {
        let token = self.advance().expect("checked by the caller");
        let index = token.payload;

        let node = self.tree.alloc(NodeKind::FuncDecl, index);

        let arg_slots = self
            .funcs
            .get(index as usize)
            .expect("scanner produced an unknown function index")
            .arg_slots
            .clone();

        // Like every chain, the parameter list ends in a childless cell.
        let mut cursor = self.tree.alloc(NodeKind::Fic, fic::CHAIN);
        self.tree.link_left(node, cursor);
        for slot in arg_slots {
            let var = self.tree.alloc(NodeKind::Var, slot as i64);
            self.tree.link_left(cursor, var);
            let next = self.tree.alloc(NodeKind::Fic, fic::CHAIN);
            self.tree.link_right(cursor, next);
            cursor = next;
        }

        let body = self.body()?;
        self.tree.link_right(node, body);

        Ok(node)
    }

    /// `Body := '/' Stmt* '\'`. Statements chain through sequencer cells;
    /// the chain always ends in a childless cell, so an empty body is a
    /// single bare sequencer.
    fn body(&mut self) -> Result<NodeId, SyntaxError> {
        self.expect_fic(fic::OPEN_BRACE, "an area opener")?;

        let head = self.tree.alloc(NodeKind::Fic, fic::CHAIN);
        let mut cursor = head;

        loop {
            if self.at_fic(fic::CLOSE_BRACE) {
                self.advance();
                break;
            }
            if self.peek().is_none() {
                return Err(SyntaxError::UnexpectedEnd {
                    expected: "a statement or an area closer",
                });
            }

            let statement = self.statement()?;
            self.tree.link_left(cursor, statement);
            let next = self.tree.alloc(NodeKind::Fic, fic::CHAIN);
            self.tree.link_right(cursor, next);
            cursor = next;
        }

        Ok(head)
    }

    fn statement(&mut self) -> Result<NodeId, SyntaxError> {
        match self.peek().map(|token| token.kind) {
            Some(NodeKind::If) => self.if_statement(),
            Some(NodeKind::While) => self.while_statement(),
            Some(NodeKind::VarDecl) => {
                let token = self.advance().expect("just peeked");
                let node = self.tree.alloc(NodeKind::VarDecl, token.payload);
                self.expect_fic(fic::SEMICOLON, "a statement separator")?;
                Ok(node)
            }
            Some(NodeKind::Return) => {
                self.advance();
                let value = self.group()?;
                self.expect_fic(fic::SEMICOLON, "a statement separator")?;
                let node = self.tree.alloc(NodeKind::Return, 0);
                self.tree.link_left(node, value);
                Ok(node)
            }
            Some(NodeKind::Fic) if self.at_fic(fic::OPEN_BRACE) => self.body(),
            Some(_) => {
                let expression = self.expression()?;
                self.expect_fic(fic::SEMICOLON, "a statement separator")?;
                Ok(expression)
            }
            None => Err(SyntaxError::UnexpectedEnd {
                expected: "a statement",
            }),
        }
    }

    /// In this language the condition follows the true branch.
    fn if_statement(&mut self) -> Result<NodeId, SyntaxError> {
        self.advance();

        let then_branch = self.body()?;
        let condition = self.group()?;

        let else_branch = if matches!(self.peek(), Some(token) if token.kind == NodeKind::Else)
        {
            self.advance();
            Some(self.body()?)
        } else {
            None
        };

        let decision = self.tree.alloc(NodeKind::Else, 0);
        self.tree.link_left(decision, then_branch);
        if let Some(else_branch) = else_branch {
            self.tree.link_right(decision, else_branch);
        }

        let node = self.tree.alloc(NodeKind::If, 0);
        self.tree.link_left(node, condition);
        self.tree.link_right(node, decision);

        Ok(node)
    }

    fn while_statement(&mut self) -> Result<NodeId, SyntaxError> {
        self.advance();

        let condition = self.group()?;
        let body = self.body()?;

        let node = self.tree.alloc(NodeKind::While, 0);
        self.tree.link_left(node, condition);
        self.tree.link_right(node, body);

        Ok(node)
    }

    /// `'{' Expr '}'`: used for conditions, return values, grouping and
    /// the operands of the unary operators.
    fn group(&mut self) -> Result<NodeId, SyntaxError> {
        self.expect_fic(fic::OPEN_BRACKET, "'{'")?;
        let inner = self.expression()?;
        self.expect_fic(fic::CLOSE_BRACKET, "'}'")?;
        Ok(inner)
    }

    fn expression(&mut self) -> Result<NodeId, SyntaxError> {
        let assign_head = matches!(self.peek(), Some(token) if token.kind == NodeKind::Var)
            && matches!(
                self.peek_second(),
                Some(token) if token.kind == NodeKind::Op
                    && token.payload == Op::Assign.payload()
            );

        if assign_head {
            let target = self.advance().expect("just peeked");
            let variable = self.tree.alloc(NodeKind::Var, target.payload);
            self.advance();

            let value = self.expression()?;
            return Ok(self.join(Op::Assign, variable, value));
        }

        self.logic_or()
    }

    fn logic_or(&mut self) -> Result<NodeId, SyntaxError> {
        let mut lhs = self.logic_and()?;
        while self.at_op() == Some(Op::Or) {
            self.advance();
            let rhs = self.logic_and()?;
            lhs = self.join(Op::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn logic_and(&mut self) -> Result<NodeId, SyntaxError> {
        let mut lhs = self.comparison()?;
        while self.at_op() == Some(Op::And) {
            self.advance();
            let rhs = self.comparison()?;
            lhs = self.join(Op::And, lhs, rhs);
        }
        Ok(lhs)
    }

    /// Comparison chains fold left: `a , b , c` is `(a < b) < c`, the
    /// boolean outcome of the first comparison feeding the second.
    fn comparison(&mut self) -> Result<NodeId, SyntaxError> {
        let mut lhs = self.sum()?;
        while let Some(op) = self.at_op().filter(|op| op.is_comparison()) {
            self.advance();
            let rhs = self.sum()?;
            lhs = self.join(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn sum(&mut self) -> Result<NodeId, SyntaxError> {
        let mut lhs = self.term()?;
        while let Some(op) = self.at_op().filter(|op| matches!(op, Op::Add | Op::Sub)) {
            self.advance();
            let rhs = self.term()?;
            lhs = self.join(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<NodeId, SyntaxError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.at_op().filter(|op| matches!(op, Op::Mul | Op::Div)) {
            self.advance();
            let rhs = self.unary()?;
            lhs = self.join(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<NodeId, SyntaxError> {
        if self.at_op() == Some(Op::Sqrt) {
            self.advance();
            let operand = self.group()?;
            let node = self.tree.alloc(NodeKind::Op, Op::Sqrt.payload());
            self.tree.link_left(node, operand);
            return Ok(node);
        }

        self.primary()
    }

    fn primary(&mut self) -> Result<NodeId, SyntaxError> {
        match self.peek().map(|token| (token.kind, token.payload)) {
            Some((NodeKind::Fic, fic::OPEN_BRACKET)) => self.group(),
            Some((NodeKind::Number, value)) => {
                self.advance();
                Ok(self.tree.alloc(NodeKind::Number, value))
            }
            Some((NodeKind::Var, index)) => {
                self.advance();
                Ok(self.tree.alloc(NodeKind::Var, index))
            }
            Some((NodeKind::Call, _)) => self.call(),
            Some((NodeKind::Op, payload)) if payload == Op::In.payload() => {
                self.advance();
                Ok(self.tree.alloc(NodeKind::Op, Op::In.payload()))
            }
            Some((NodeKind::Op, payload)) if payload == Op::Out.payload() => {
                self.advance();
                let operand = self.group()?;
                let node = self.tree.alloc(NodeKind::Op, Op::Out.payload());
                self.tree.link_left(node, operand);
                Ok(node)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// A call must supply exactly the declared number of arguments.
    fn call(&mut self) -> Result<NodeId, SyntaxError> {
        let token = self.advance().expect("checked by the caller");
        let index = token.payload as usize;

        self.expect_fic(fic::OPEN_BRACKET, "'{'")?;

        let mut arguments = Vec::new();
        if !self.at_fic(fic::CLOSE_BRACKET) {
            loop {
                arguments.push(self.expression()?);
                if self.at_fic(fic::COMMA) {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        self.expect_fic(fic::CLOSE_BRACKET, "'}' or an argument separator")?;

        let function = self
            .funcs
            .get(index)
            .expect("scanner produced an unknown function index");
        if arguments.len() != function.arity() {
            return Err(SyntaxError::ArityMismatch {
                function: function.name.clone(),
                expected: function.arity(),
                got: arguments.len(),
                span: token.span,
            });
        }

        let node = self.tree.alloc(NodeKind::Call, index as i64);

        let mut cursor = self.tree.alloc(NodeKind::Fic, fic::CHAIN);
        self.tree.link_left(node, cursor);
        for argument in arguments {
            self.tree.link_left(cursor, argument);
            let next = self.tree.alloc(NodeKind::Fic, fic::CHAIN);
            self.tree.link_right(cursor, next);
            cursor = next;
        }

        Ok(node)
    }
}
