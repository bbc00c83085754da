//! Recursive-descent parser: token stream to [`Block`].
//!
//! Statements live in `parse_stmt.rs`, expressions in `parse_expr.rs`; this
//! file holds the cursor and the entry points.

use crate::ast::{Block, Expr};
use crate::error::{ScriptError, ScriptResult};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Maximum nesting of parenthesised or unary sub-expressions.
pub(crate) const MAX_NESTING: usize = 64;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pub(crate) nesting: usize,
}

/// Parse a whole program.
pub fn parse_program(source: &str) -> ScriptResult<Block> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_module()
}

/// Parse a single expression (an f-string field).
pub(crate) fn parse_expression(source: &str, line: usize) -> ScriptResult<Expr> {
    let tokens = Lexer::new(source.trim()).starting_at(line).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_testlist()?;
    parser.eat(&TokenKind::Newline);
    if !parser.check(&TokenKind::Eof) {
        return Err(parser.unexpected("end of f-string expression"));
    }
    Ok(expr)
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            nesting: 0,
        }
    }

    pub fn parse_module(&mut self) -> ScriptResult<Block> {
        let mut body = Vec::new();
        while !self.check(&TokenKind::Eof) {
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            if self.check(&TokenKind::Indent) {
                return Err(self.syntax("unexpected indent"));
            }
            body.extend(self.parse_statement()?);
        }
        Ok(body)
    }

    // ── Cursor ────────────────────────────────────────────────

    pub(crate) fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    pub(crate) fn peek_at(&self, offset: usize) -> &TokenKind {
        match self.tokens.get(self.pos + offset).or_else(|| self.tokens.last()) {
            Some(token) => &token.kind,
            None => &TokenKind::Eof,
        }
    }

    pub(crate) fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(0)
    }

    pub(crate) fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> ScriptResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    pub(crate) fn expect_name(&mut self) -> ScriptResult<String> {
        match self.peek().clone() {
            TokenKind::Name(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    // ── Errors ────────────────────────────────────────────────

    pub(crate) fn syntax(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax(message.into()).at(self.line())
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ScriptError {
        self.syntax(format!("expected {expected}, got {}", self.peek()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, StmtKind, Target};

    #[test]
    fn test_parse_function_with_nested_blocks() {
        let body = parse_program(
            "def f(a, b=2):\n    if a:\n        return a + b\n    return 0\n",
        )
        .expect("parse");
        let StmtKind::FunctionDef(def) = &body[0].kind else {
            panic!("expected def");
        };
        assert_eq!(def.name, "f");
        assert_eq!(def.params.len(), 2);
        assert!(def.params[1].default.is_some());
        assert_eq!(def.body.len(), 2);
    }

    #[test]
    fn test_parse_tuple_unpacking_and_chained_assignment() {
        let body = parse_program("a, b = 1, 2\nx = y = 0\n").expect("parse");
        assert!(matches!(
            &body[0].kind,
            StmtKind::Assign { targets, .. } if matches!(&targets[0], Target::Tuple(t) if t.len() == 2)
        ));
        assert!(matches!(&body[1].kind, StmtKind::Assign { targets, .. } if targets.len() == 2));
    }

    #[test]
    fn test_parse_single_line_suite() {
        let body = parse_program("def f(g):\n    if not g: return 0\n    return 1\n").expect("parse");
        let StmtKind::FunctionDef(def) = &body[0].kind else {
            panic!("expected def");
        };
        assert_eq!(def.body.len(), 2);
    }

    #[test]
    fn test_parse_comprehension_and_generator_argument() {
        let body = parse_program("x = [i for i in y if i]\nz = sum(v * v for v in y)\n").expect("parse");
        assert!(matches!(
            &body[0].kind,
            StmtKind::Assign { value, .. } if matches!(value.kind, ExprKind::ListComp { .. })
        ));
        let StmtKind::Assign { value, .. } = &body[1].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(&value.kind, ExprKind::Call { args, .. } if args.len() == 1));
    }

    #[test]
    fn test_comparison_chain() {
        let expr = parse_expression("0 <= i < n", 1).expect("parse");
        assert!(matches!(expr.kind, ExprKind::Compare { ref rest, .. } if rest.len() == 2));
    }

    #[test]
    fn test_class_is_rejected() {
        let err = parse_program("class A:\n    pass\n").unwrap_err();
        assert!(err.to_string().starts_with("line 1: SyntaxError"));
    }

    #[test]
    fn test_missing_colon_reports_line() {
        let err = parse_program("x = 1\nif x\n    y = 2\n").unwrap_err();
        assert!(err.to_string().starts_with("line 2: SyntaxError"), "{err}");
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("x = {}1{}\n", "(".repeat(500), ")".repeat(500));
        let err = parse_program(&source).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));
    }
}
