//! Expression parsing, lowest to highest precedence:
//!
//! ```text
//! lambda, if-else < or < and < not < comparisons < | < ^ < & < << >>
//!   < + - < * / // % < unary - + ~ < ** < call, subscript, attribute
//! ```

use std::rc::Rc;

use crate::ast::{
    Arg, BinOp, CmpOp, Comprehension, Expr, ExprKind, FStringSegment, FunctionDef, Stmt,
    StmtKind, UnaryOp,
};
use crate::error::ScriptResult;
use crate::parse_stmt::augmented_op;
use crate::parser::{parse_expression, Parser, MAX_NESTING};
use crate::token::{FStringPart, TokenKind};

impl Parser {
    /// `test (',' test)* [',']`, producing a tuple when a comma is present.
    pub(crate) fn parse_testlist(&mut self) -> ScriptResult<Expr> {
        let line = self.line();
        let first = self.parse_test()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if !self.starts_expression() {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    fn starts_expression(&self) -> bool {
        !matches!(
            self.peek(),
            TokenKind::Newline
                | TokenKind::Eof
                | TokenKind::Semicolon
                | TokenKind::Assign
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::Colon
                | TokenKind::In
        ) && augmented_op(self.peek()).is_none()
    }

    pub(crate) fn parse_test(&mut self) -> ScriptResult<Expr> {
        if self.check(&TokenKind::Lambda) {
            return self.parse_lambda();
        }
        let line = self.line();
        let body = self.parse_or()?;
        if !self.eat(&TokenKind::If) {
            return Ok(body);
        }
        let test = self.parse_or()?;
        self.expect(&TokenKind::Else)?;
        let orelse = self.parse_test()?;
        Ok(Expr::new(
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            line,
        ))
    }

    fn parse_lambda(&mut self) -> ScriptResult<Expr> {
        let line = self.line();
        self.expect(&TokenKind::Lambda)?;
        let params = self.parse_params(&TokenKind::Colon, false)?;
        self.expect(&TokenKind::Colon)?;
        let body = self.parse_test()?;
        let def = FunctionDef {
            name: "<lambda>".into(),
            params,
            body: vec![Stmt {
                kind: StmtKind::Return(Some(body)),
                line,
            }],
            line,
        };
        Ok(Expr::new(ExprKind::Lambda(Rc::new(def)), line))
    }

    fn parse_or(&mut self) -> ScriptResult<Expr> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            let line = self.line();
            self.advance();
            let right = self.parse_and()?;
            left = Expr::new(
                ExprKind::Logical {
                    and: false,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                line,
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ScriptResult<Expr> {
        let mut left = self.parse_not()?;
        while self.check(&TokenKind::And) {
            let line = self.line();
            self.advance();
            let right = self.parse_not()?;
            left = Expr::new(
                ExprKind::Logical {
                    and: true,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                line,
            );
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ScriptResult<Expr> {
        if !self.check(&TokenKind::Not) {
            return self.parse_comparison();
        }
        let line = self.line();
        self.advance();
        let operand = self.nested(|p| p.parse_not())?;
        Ok(Expr::new(
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            },
            line,
        ))
    }

    fn parse_comparison(&mut self) -> ScriptResult<Expr> {
        let line = self.line();
        let left = self.parse_bitor()?;
        let mut rest = Vec::new();
        loop {
            let op = match (self.peek(), self.peek_at(1)) {
                (TokenKind::EqEq, _) => CmpOp::Eq,
                (TokenKind::NotEq, _) => CmpOp::NotEq,
                (TokenKind::Lt, _) => CmpOp::Lt,
                (TokenKind::Le, _) => CmpOp::Le,
                (TokenKind::Gt, _) => CmpOp::Gt,
                (TokenKind::Ge, _) => CmpOp::Ge,
                (TokenKind::In, _) => CmpOp::In,
                (TokenKind::Not, TokenKind::In) => {
                    self.advance();
                    CmpOp::NotIn
                }
                (TokenKind::Is, TokenKind::Not) => {
                    self.advance();
                    CmpOp::IsNot
                }
                (TokenKind::Is, _) => CmpOp::Is,
                _ => break,
            };
            self.advance();
            rest.push((op, self.parse_bitor()?));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::new(
                ExprKind::Compare {
                    left: Box::new(left),
                    rest,
                },
                line,
            ))
        }
    }

    fn binary_level(
        &mut self,
        ops: &[(TokenKind, BinOp)],
        next: fn(&mut Parser) -> ScriptResult<Expr>,
    ) -> ScriptResult<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.check(token) {
                    let line = self.line();
                    self.advance();
                    let right = next(self)?;
                    left = Expr::new(
                        ExprKind::Binary {
                            op: *op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        line,
                    );
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    pub(crate) fn parse_bitor(&mut self) -> ScriptResult<Expr> {
        self.binary_level(&[(TokenKind::Pipe, BinOp::BitOr)], Parser::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> ScriptResult<Expr> {
        self.binary_level(&[(TokenKind::Caret, BinOp::BitXor)], Parser::parse_bitand)
    }

    fn parse_bitand(&mut self) -> ScriptResult<Expr> {
        self.binary_level(&[(TokenKind::Amp, BinOp::BitAnd)], Parser::parse_shift)
    }

    fn parse_shift(&mut self) -> ScriptResult<Expr> {
        self.binary_level(
            &[(TokenKind::Shl, BinOp::Shl), (TokenKind::Shr, BinOp::Shr)],
            Parser::parse_arith,
        )
    }

    fn parse_arith(&mut self) -> ScriptResult<Expr> {
        self.binary_level(
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
            Parser::parse_term,
        )
    }

    fn parse_term(&mut self) -> ScriptResult<Expr> {
        self.binary_level(
            &[
                (TokenKind::Star, BinOp::Mul),
                (TokenKind::Slash, BinOp::Div),
                (TokenKind::DoubleSlash, BinOp::FloorDiv),
                (TokenKind::Percent, BinOp::Mod),
            ],
            Parser::parse_factor,
        )
    }

    fn parse_factor(&mut self) -> ScriptResult<Expr> {
        let op = match self.peek() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            TokenKind::Tilde => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        let line = self.line();
        self.advance();
        let operand = self.nested(|p| p.parse_factor())?;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            line,
        ))
    }

    fn parse_power(&mut self) -> ScriptResult<Expr> {
        let base = self.parse_primary()?;
        if !self.check(&TokenKind::DoubleStar) {
            return Ok(base);
        }
        let line = self.line();
        self.advance();
        // Right-associative and binds tighter than a unary minus on its left.
        let exponent = self.nested(|p| p.parse_factor())?;
        Ok(Expr::new(
            ExprKind::Binary {
                op: BinOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            },
            line,
        ))
    }

    fn parse_primary(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            let line = self.line();
            match self.peek() {
                TokenKind::LParen => {
                    self.advance();
                    let args = self.nested(|p| p.parse_call_args())?;
                    self.expect(&TokenKind::RParen)?;
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                        },
                        line,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.nested(|p| p.parse_subscript())?;
                    self.expect(&TokenKind::RBracket)?;
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        line,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_name()?;
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        line,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> ScriptResult<Vec<Arg>> {
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if self.eat(&TokenKind::Star) {
                args.push(Arg::Star(self.parse_test()?));
            } else if self.check(&TokenKind::DoubleStar) {
                return Err(self.syntax("'**' arguments are not supported"));
            } else if matches!(self.peek(), TokenKind::Name(_))
                && self.peek_at(1) == &TokenKind::Assign
            {
                let name = self.expect_name()?;
                self.advance();
                args.push(Arg::Keyword(name, self.parse_test()?));
            } else {
                let line = self.line();
                let value = self.parse_test()?;
                if self.check(&TokenKind::For) {
                    let clauses = self.parse_comprehension_clauses()?;
                    args.push(Arg::Positional(Expr::new(
                        ExprKind::Generator {
                            element: Box::new(value),
                            clauses,
                        },
                        line,
                    )));
                } else {
                    if args.iter().any(|a| matches!(a, Arg::Keyword(..))) {
                        return Err(self.syntax("positional argument follows keyword argument"));
                    }
                    args.push(Arg::Positional(value));
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn parse_subscript(&mut self) -> ScriptResult<Expr> {
        let line = self.line();
        let first = self.parse_slice_item()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            items.push(self.parse_slice_item()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    fn parse_slice_item(&mut self) -> ScriptResult<Expr> {
        let line = self.line();
        let lower = if self.check(&TokenKind::Colon) {
            None
        } else {
            let expr = self.parse_test()?;
            if !self.check(&TokenKind::Colon) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect(&TokenKind::Colon)?;
        let bound = |p: &mut Parser| -> ScriptResult<Option<Box<Expr>>> {
            if matches!(
                p.peek(),
                TokenKind::Colon | TokenKind::RBracket | TokenKind::Comma
            ) {
                Ok(None)
            } else {
                Ok(Some(Box::new(p.parse_test()?)))
            }
        };
        let upper = bound(self)?;
        let step = if self.eat(&TokenKind::Colon) {
            bound(self)?
        } else {
            None
        };
        Ok(Expr::new(ExprKind::Slice { lower, upper, step }, line))
    }

    pub(crate) fn parse_comprehension_clauses(&mut self) -> ScriptResult<Vec<Comprehension>> {
        let mut clauses = Vec::new();
        while self.eat(&TokenKind::For) {
            let target = self.parse_target_list()?;
            self.expect(&TokenKind::In)?;
            let iter = self.parse_or()?;
            let mut conditions = Vec::new();
            while self.eat(&TokenKind::If) {
                conditions.push(self.parse_or()?);
            }
            clauses.push(Comprehension {
                target,
                iter,
                conditions,
            });
        }
        Ok(clauses)
    }

    // ── Atoms ─────────────────────────────────────────────────

    fn parse_atom(&mut self) -> ScriptResult<Expr> {
        let line = self.line();
        let kind = match self.peek().clone() {
            TokenKind::Int(i) => {
                self.advance();
                ExprKind::Int(i)
            }
            TokenKind::Float(f) => {
                self.advance();
                ExprKind::Float(f)
            }
            TokenKind::Str(_) | TokenKind::FString(_) => return self.parse_strings(),
            TokenKind::True => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokenKind::None => {
                self.advance();
                ExprKind::None
            }
            TokenKind::Name(name) => {
                self.advance();
                ExprKind::Name(name)
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.nested(|p| p.parse_paren(line))?;
                self.expect(&TokenKind::RParen)?;
                return Ok(expr);
            }
            TokenKind::LBracket => {
                self.advance();
                let expr = self.nested(|p| p.parse_list(line))?;
                self.expect(&TokenKind::RBracket)?;
                return Ok(expr);
            }
            TokenKind::LBrace => {
                self.advance();
                let expr = self.nested(|p| p.parse_brace(line))?;
                self.expect(&TokenKind::RBrace)?;
                return Ok(expr);
            }
            TokenKind::Yield => return Err(self.syntax("generators ('yield') are not supported")),
            _ => return Err(self.unexpected("an expression")),
        };
        Ok(Expr::new(kind, line))
    }

    fn parse_paren(&mut self, line: usize) -> ScriptResult<Expr> {
        if self.check(&TokenKind::RParen) {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), line));
        }
        let first = self.parse_test()?;
        if self.check(&TokenKind::For) {
            let clauses = self.parse_comprehension_clauses()?;
            return Ok(Expr::new(
                ExprKind::Generator {
                    element: Box::new(first),
                    clauses,
                },
                line,
            ));
        }
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RParen) {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    fn parse_list(&mut self, line: usize) -> ScriptResult<Expr> {
        if self.check(&TokenKind::RBracket) {
            return Ok(Expr::new(ExprKind::List(Vec::new()), line));
        }
        let first = self.parse_test()?;
        if self.check(&TokenKind::For) {
            let clauses = self.parse_comprehension_clauses()?;
            return Ok(Expr::new(
                ExprKind::ListComp {
                    element: Box::new(first),
                    clauses,
                },
                line,
            ));
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBracket) {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr::new(ExprKind::List(items), line))
    }

    fn parse_brace(&mut self, line: usize) -> ScriptResult<Expr> {
        if self.check(&TokenKind::RBrace) {
            return Ok(Expr::new(ExprKind::Dict(Vec::new()), line));
        }
        let first = self.parse_test()?;

        if self.eat(&TokenKind::Colon) {
            let value = self.parse_test()?;
            if self.check(&TokenKind::For) {
                let clauses = self.parse_comprehension_clauses()?;
                return Ok(Expr::new(
                    ExprKind::DictComp {
                        key: Box::new(first),
                        value: Box::new(value),
                        clauses,
                    },
                    line,
                ));
            }
            let mut entries = vec![(first, value)];
            while self.eat(&TokenKind::Comma) {
                if self.check(&TokenKind::RBrace) {
                    break;
                }
                let key = self.parse_test()?;
                self.expect(&TokenKind::Colon)?;
                entries.push((key, self.parse_test()?));
            }
            return Ok(Expr::new(ExprKind::Dict(entries), line));
        }

        if self.check(&TokenKind::For) {
            let clauses = self.parse_comprehension_clauses()?;
            return Ok(Expr::new(
                ExprKind::SetComp {
                    element: Box::new(first),
                    clauses,
                },
                line,
            ));
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.check(&TokenKind::RBrace) {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr::new(ExprKind::Set(items), line))
    }

    /// Adjacent string literals concatenate; any f-string makes the whole
    /// run an f-string.
    fn parse_strings(&mut self) -> ScriptResult<Expr> {
        let line = self.line();
        let mut segments: Vec<FStringSegment> = Vec::new();
        let mut formatted = false;
        loop {
            match self.peek().clone() {
                TokenKind::Str(s) => {
                    self.advance();
                    push_text(&mut segments, s);
                }
                TokenKind::FString(parts) => {
                    let part_line = self.line();
                    self.advance();
                    formatted = true;
                    for part in parts {
                        match part {
                            FStringPart::Text(t) => push_text(&mut segments, t),
                            FStringPart::Expr { source, spec, repr } => {
                                let expr = parse_expression(&source, part_line)?;
                                segments.push(FStringSegment::Expr {
                                    expr: Box::new(expr),
                                    spec,
                                    repr,
                                });
                            }
                        }
                    }
                }
                _ => break,
            }
        }

        if formatted {
            return Ok(Expr::new(ExprKind::FString(segments), line));
        }
        let text = match segments.into_iter().next() {
            Some(FStringSegment::Text(t)) => t,
            _ => String::new(),
        };
        Ok(Expr::new(ExprKind::Str(Rc::from(text)), line))
    }

    /// Run `f` one nesting level deeper, rejecting pathological input.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Parser) -> ScriptResult<T>) -> ScriptResult<T> {
        if self.nesting >= MAX_NESTING {
            return Err(self.syntax("expression is nested too deeply"));
        }
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }
}

fn push_text(segments: &mut Vec<FStringSegment>, text: String) {
    if let Some(FStringSegment::Text(last)) = segments.last_mut() {
        last.push_str(&text);
    } else {
        segments.push(FStringSegment::Text(text));
    }
}
